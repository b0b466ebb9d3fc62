//! Splitting a raw sheet into metadata and a cleaned coordinate track.

use std::collections::HashMap;

use log::warn;
use thiserror::Error;

use super::table::{
    Cell, CoordinateTrack, Metadata, RawSheet, Sample, DATA_SENTINEL, MARKER_COLUMN_TITLE,
    RECORDING_TIME_COLUMN, TRIAL_TIME_COLUMN, X_CENTER_COLUMN, Y_CENTER_COLUMN,
};
use crate::config::CleaningConfig;

/// Errors raised while cleaning a raw sheet.
#[derive(Debug, Error, PartialEq)]
pub enum SheetFormatError {
    #[error("sentinel row \"{0}\" not found")]
    SentinelNotFound(String),

    #[error("missing required column \"{0}\"")]
    MissingColumn(String),

    #[error("invalid value {value:?} in column \"{column}\" at sheet row {row}")]
    InvalidValue {
        row: usize,
        column: String,
        value: String,
    },
}

/// Result type for sheet cleaning.
pub type Result<T> = std::result::Result<T, SheetFormatError>;

/// Row index of the sentinel that opens the data block.
///
/// Row 0 carries the marker column title and is never the sentinel. A
/// different title is tolerated but logged, since the sheet may not be a
/// tracking export.
pub fn find_sentinel_row(raw: &RawSheet) -> Result<usize> {
    if !raw.cell(0, 0).is_text(MARKER_COLUMN_TITLE) {
        warn!(
            "row 0 does not start with \"{}\", reading the sheet anyway",
            MARKER_COLUMN_TITLE
        );
    }

    (1..raw.num_rows())
        .find(|&row| raw.cell(row, 0).is_text(DATA_SENTINEL))
        .ok_or_else(|| SheetFormatError::SentinelNotFound(DATA_SENTINEL.to_string()))
}

/// Metadata rows sit between the title row and the sentinel.
fn extract_metadata(raw: &RawSheet, sentinel: usize) -> Metadata {
    let mut meta = Metadata::new();
    for row in 1..sentinel {
        if let Some(key) = raw.cell(row, 0).to_value_string() {
            meta.push(key, raw.cell(row, 1).to_value_string());
        }
    }
    meta
}

fn column_index(header: &HashMap<String, usize>, name: &str) -> Result<usize> {
    header
        .get(name)
        .copied()
        .ok_or_else(|| SheetFormatError::MissingColumn(name.to_string()))
}

fn read_time(cell: &Cell, row: usize, column: &str) -> Result<f64> {
    match cell {
        Cell::Number(v) => Ok(*v),
        Cell::Text(s) => s.trim().parse().map_err(|_| SheetFormatError::InvalidValue {
            row,
            column: column.to_string(),
            value: s.clone(),
        }),
        Cell::Empty => Err(SheetFormatError::InvalidValue {
            row,
            column: column.to_string(),
            value: String::new(),
        }),
    }
}

fn read_coordinate(cell: &Cell, marker: &str, row: usize, column: &str) -> Result<Option<f64>> {
    match cell {
        Cell::Number(v) if v.is_finite() => Ok(Some(*v)),
        Cell::Number(_) | Cell::Empty => Ok(None),
        Cell::Text(s) if s.trim() == marker => Ok(None),
        Cell::Text(s) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| SheetFormatError::InvalidValue {
                row,
                column: column.to_string(),
                value: s.clone(),
            }),
    }
}

/// Linearly fill interior gaps of at most `limit` consecutive missing values.
///
/// Interpolation is by sample index. Longer gaps and gaps touching either end
/// of the series are left missing.
pub fn interpolate_gaps(values: &mut [Option<f64>], limit: usize) {
    let mut last_valid: Option<usize> = None;

    for i in 0..values.len() {
        let Some(current) = values[i] else {
            continue;
        };

        if let Some(start) = last_valid {
            let gap = i - start - 1;
            if gap > 0 && gap <= limit {
                if let Some(begin) = values[start] {
                    let step = (current - begin) / (gap + 1) as f64;
                    for (k, slot) in values[start + 1..i].iter_mut().enumerate() {
                        *slot = Some(begin + step * (k + 1) as f64);
                    }
                }
            }
        }
        last_valid = Some(i);
    }
}

/// Clean a raw sheet into a coordinate track and its metadata.
///
/// The sentinel row supplies the column names; `header_rows` rows starting at
/// the sentinel are dropped before the data is read.
pub fn clean_sheet(raw: &RawSheet, options: &CleaningConfig) -> Result<(CoordinateTrack, Metadata)> {
    let sentinel = find_sentinel_row(raw)?;
    let metadata = extract_metadata(raw, sentinel);

    let header: HashMap<String, usize> = raw.rows[sentinel]
        .iter()
        .enumerate()
        .filter_map(|(i, cell)| cell.to_value_string().map(|name| (name, i)))
        .collect();

    let trial_idx = column_index(&header, TRIAL_TIME_COLUMN)?;
    let recording_idx = column_index(&header, RECORDING_TIME_COLUMN)?;
    let x_idx = column_index(&header, X_CENTER_COLUMN)?;
    let y_idx = column_index(&header, Y_CENTER_COLUMN)?;

    let first_data_row = sentinel + options.header_rows.max(1);
    let mut samples = Vec::with_capacity(raw.num_rows().saturating_sub(first_data_row));

    for row in first_data_row..raw.num_rows() {
        // Trailing blank rows are common in exported workbooks
        if raw.rows[row].iter().all(|c| *c == Cell::Empty) {
            continue;
        }

        let trial_time = read_time(raw.cell(row, trial_idx), row, TRIAL_TIME_COLUMN)?;
        let recording_time = read_time(raw.cell(row, recording_idx), row, RECORDING_TIME_COLUMN)?;
        let x = read_coordinate(raw.cell(row, x_idx), &options.missing_marker, row, X_CENTER_COLUMN)?;
        let y = read_coordinate(raw.cell(row, y_idx), &options.missing_marker, row, Y_CENTER_COLUMN)?;

        samples.push(Sample::new(trial_time, recording_time, x, y));
    }

    let mut track = CoordinateTrack::new(samples);
    let mut xs = track.xs();
    let mut ys = track.ys();
    interpolate_gaps(&mut xs, options.interpolation_limit);
    interpolate_gaps(&mut ys, options.interpolation_limit);
    track.set_coordinates(&xs, &ys);

    Ok((track, metadata))
}
