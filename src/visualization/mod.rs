//! Visualization of consolidated trials.
//!
//! Each subject's (X, Y) positions are drawn as a scatter trace in its own
//! colour, which makes tracking dropouts and swapped identities easy to spot.

use std::path::Path;

use log::debug;
use plotters::prelude::*;
use plotters_bitmap::BitMapBackend;
use thiserror::Error;

use crate::core::table::TrialTable;

/// Errors that can occur during visualization.
#[derive(Error, Debug)]
pub enum VisualizationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Plotting error: {0}")]
    PlottingError(String),

    #[error("Trial has no coordinates to plot")]
    EmptyTrial,
}

/// Result type for visualization operations.
pub type Result<T> = std::result::Result<T, VisualizationError>;

/// Default plot width in pixels.
const DEFAULT_WIDTH: u32 = 1600;

/// Default plot height in pixels.
const DEFAULT_HEIGHT: u32 = 1200;

/// One colour per subject, reused cyclically.
const SUBJECT_COLORS: &[(u8, u8, u8)] = &[
    (228, 26, 28),   // Red
    (55, 126, 184),  // Blue
    (77, 175, 74),   // Green
    (152, 78, 163),  // Purple
    (255, 127, 0),   // Orange
    (166, 86, 40),   // Brown
    (247, 129, 191), // Pink
    (0, 206, 209),   // Turquoise
];

/// Positions of one subject, rows with a missing coordinate skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectSeries {
    pub subject_type: String,
    pub points: Vec<(f64, f64)>,
}

/// Pair every `X_<type>` column with its `Y_<type>` column.
pub fn subject_series(table: &TrialTable) -> Vec<SubjectSeries> {
    table
        .coordinate_columns()
        .iter()
        .filter_map(|column| {
            let subject_type = column.name.strip_prefix("X_")?;
            let ys = table.coordinate(&format!("Y_{}", subject_type))?;
            let points = column
                .values
                .iter()
                .zip(ys)
                .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
                .collect();
            Some(SubjectSeries {
                subject_type: subject_type.to_string(),
                points,
            })
        })
        .collect()
}

/// Plot every subject's trajectory of a trial and save as PNG.
///
/// # Arguments
///
/// * `output_path` - Path to save the PNG image
/// * `table` - The consolidated trial
/// * `max_points` - Maximum points per subject (subsamples if exceeded)
pub fn plot_trial(output_path: &Path, table: &TrialTable, max_points: usize) -> Result<()> {
    let series = subject_series(table);
    if series.iter().all(|s| s.points.is_empty()) {
        return Err(VisualizationError::EmptyTrial);
    }

    let max_points = max_points.max(1);
    let mut points: Vec<(f64, f64, RGBColor)> = Vec::new();

    for (idx, subject) in series.iter().enumerate() {
        let n = subject.points.len();
        let step = if n > max_points { n / max_points } else { 1 };
        let c = SUBJECT_COLORS[idx % SUBJECT_COLORS.len()];

        debug!("Plotting {} ({} points, step {})", subject.subject_type, n, step);

        points.extend(
            subject
                .points
                .iter()
                .step_by(step)
                .map(|&(x, y)| (x, y, RGBColor(c.0, c.1, c.2))),
        );
    }

    let (x_min, x_max, y_min, y_max) = compute_bounds(&points);
    let x_padding = (x_max - x_min) * 0.05;
    let y_padding = (y_max - y_min) * 0.05;

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let root = BitMapBackend::new(output_path, (DEFAULT_WIDTH, DEFAULT_HEIGHT))
        .into_drawing_area();

    root.fill(&WHITE).map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .build_cartesian_2d(
            (x_min - x_padding)..(x_max + x_padding),
            (y_min - y_padding)..(y_max + y_padding),
        )
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    // No font backend is compiled in, so the mesh is drawn without labels
    chart
        .configure_mesh()
        .disable_x_mesh()
        .disable_y_mesh()
        .x_labels(0)
        .y_labels(0)
        .draw()
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    chart
        .draw_series(points.iter().map(|(x, y, color)| {
            Circle::new((*x, *y), 2, color.filled())
        }))
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    root.present().map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    Ok(())
}

/// Compute the bounds (min/max) for x and y coordinates.
fn compute_bounds(points: &[(f64, f64, RGBColor)]) -> (f64, f64, f64, f64) {
    let mut x_min = f64::MAX;
    let mut x_max = f64::MIN;
    let mut y_min = f64::MAX;
    let mut y_max = f64::MIN;

    for (x, y, _) in points {
        x_min = x_min.min(*x);
        x_max = x_max.max(*x);
        y_min = y_min.min(*y);
        y_max = y_max.max(*y);
    }

    if (x_max - x_min).abs() < f64::EPSILON {
        x_min -= 1.0;
        x_max += 1.0;
    }
    if (y_max - y_min).abs() < f64::EPSILON {
        y_min -= 1.0;
        y_max += 1.0;
    }

    (x_min, x_max, y_min, y_max)
}
