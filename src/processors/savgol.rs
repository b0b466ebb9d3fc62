//! Savitzky-Golay smoothing and differentiation.
//!
//! Each output sample is the value (or derivative) at the window centre of a
//! least-squares polynomial fitted over `window_size` neighbouring samples.
//! The convolution coefficients depend only on the window and polynomial
//! order, so they are computed once per call from the pseudo-inverse of the
//! window's Vandermonde matrix.

use log::debug;
use nalgebra::DMatrix;
use thiserror::Error;

use crate::config::SmoothingConfig;

/// Errors that can occur while filtering.
#[derive(Debug, Error, PartialEq)]
pub enum FilterError {
    #[error("invalid filter parameter: {0}")]
    InvalidParameter(String),

    #[error("cannot filter an empty sequence")]
    EmptyInput,

    #[error("{len} samples are too few for a window of {window_size}")]
    InputTooShort { len: usize, window_size: usize },
}

/// Result type for filter operations.
pub type Result<T> = std::result::Result<T, FilterError>;

fn factorial(n: usize) -> f64 {
    (1..=n).map(|k| k as f64).product()
}

fn validate(params: &SmoothingConfig) -> Result<()> {
    let w = params.window_size;
    if w == 0 || w % 2 == 0 {
        return Err(FilterError::InvalidParameter(format!(
            "window size must be a positive odd number, got {}",
            w
        )));
    }
    if w < params.order + 2 {
        return Err(FilterError::InvalidParameter(format!(
            "window size {} is too small for polynomial order {}",
            w, params.order
        )));
    }
    if params.derivative > params.order {
        return Err(FilterError::InvalidParameter(format!(
            "derivative order {} exceeds polynomial order {}",
            params.derivative, params.order
        )));
    }
    if !params.rate.is_finite() {
        return Err(FilterError::InvalidParameter(format!(
            "sampling rate must be finite, got {}",
            params.rate
        )));
    }
    Ok(())
}

/// Convolution coefficients for the given window, order and derivative.
///
/// # Errors
///
/// Returns `InvalidParameter` if the window is not a positive odd number, is
/// smaller than `order + 2`, or the derivative exceeds the polynomial order.
pub fn coefficients(params: &SmoothingConfig) -> Result<Vec<f64>> {
    validate(params)?;

    let half = (params.window_size - 1) / 2;
    let design = DMatrix::from_fn(params.window_size, params.order + 1, |r, c| {
        (r as f64 - half as f64).powi(c as i32)
    });

    let pinv = design
        .pseudo_inverse(1e-12)
        .map_err(|e| FilterError::InvalidParameter(e.to_string()))?;

    let scale = params.rate.powi(params.derivative as i32) * factorial(params.derivative);

    Ok(pinv
        .row(params.derivative)
        .iter()
        .map(|c| c * scale)
        .collect())
}

/// Pad both ends with values mirrored through the boundary sample and
/// correlate with the coefficients.
fn apply(samples: &[f64], coeffs: &[f64]) -> Result<Vec<f64>> {
    let n = samples.len();
    let window_size = coeffs.len();
    let half = (window_size - 1) / 2;

    if n == 0 {
        return Err(FilterError::EmptyInput);
    }
    if n <= half {
        return Err(FilterError::InputTooShort {
            len: n,
            window_size,
        });
    }

    let first = samples[0];
    let last = samples[n - 1];

    let mut padded = Vec::with_capacity(n + 2 * half);
    padded.extend((1..=half).rev().map(|k| first - (samples[k] - first).abs()));
    padded.extend_from_slice(samples);
    padded.extend((1..=half).map(|k| last + (samples[n - 1 - k] - last).abs()));

    Ok(padded
        .windows(window_size)
        .map(|window| window.iter().zip(coeffs).map(|(v, c)| v * c).sum())
        .collect())
}

/// Smooth (or differentiate) a sequence with a Savitzky-Golay filter.
///
/// The output has the same length as the input. Edges are handled by
/// padding, not by shortening the window.
///
/// # Errors
///
/// Returns `InvalidParameter` for malformed parameters, `EmptyInput` for an
/// empty sequence and `InputTooShort` if the sequence cannot fill half a
/// window.
pub fn savitzky_golay(samples: &[f64], params: &SmoothingConfig) -> Result<Vec<f64>> {
    let coeffs = coefficients(params)?;
    let smoothed = apply(samples, &coeffs)?;
    debug!(
        "Smoothed {} samples with window {}, order {}, derivative {}, rate {}",
        samples.len(),
        params.window_size,
        params.order,
        params.derivative,
        params.rate
    );
    Ok(smoothed)
}

/// Smooth a series with gaps.
///
/// Each maximal run of present values is filtered on its own; runs too short
/// for the window pass through unchanged and missing values stay missing.
pub fn smooth_series(values: &[Option<f64>], params: &SmoothingConfig) -> Result<Vec<Option<f64>>> {
    let coeffs = coefficients(params)?;
    let half = (params.window_size - 1) / 2;
    let mut out = values.to_vec();

    let mut i = 0;
    while i < values.len() {
        if values[i].is_none() {
            i += 1;
            continue;
        }

        let start = i;
        let run: Vec<f64> = values[start..].iter().map_while(|v| *v).collect();
        i += run.len();

        if run.len() <= half {
            continue;
        }
        let smoothed = apply(&run, &coeffs)?;
        for (slot, v) in out[start..i].iter_mut().zip(smoothed) {
            *slot = Some(v);
        }
    }

    Ok(out)
}
