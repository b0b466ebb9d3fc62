//! Data loaders for raw workbooks and intermediate track tables.
//!
//! This module provides:
//! - The [`SheetSource`] seam through which raw sheets are read
//! - An `.xlsx`/`.xls`/`.ods` adapter built on calamine
//! - Parsers for the tab-delimited coordinate and metadata tables written
//!   during preprocessing

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};
use csv::ReaderBuilder;
use thiserror::Error;

use super::table::{
    Cell, CoordinateTrack, Metadata, RawSheet, Sample, RECORDING_TIME_COLUMN, TRIAL_TIME_COLUMN,
    X_CENTER_COLUMN, Y_CENTER_COLUMN,
};

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to open workbook {path}: {message}")]
    Workbook { path: PathBuf, message: String },

    #[error("Sheet {sheet_no} not found in {path}")]
    SheetNotFound { path: PathBuf, sheet_no: usize },

    #[error("Missing required columns: {0}")]
    MissingColumns(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Source of raw worksheets.
///
/// Spreadsheet parsing lives behind this trait so the cleaning and
/// consolidation logic never depends on a file format.
pub trait SheetSource {
    /// Number of worksheets in the file.
    fn sheet_count(&self, path: &Path) -> Result<usize>;

    /// Read worksheet `sheet_no` (0-based) as a cell grid.
    fn read_sheet(&self, path: &Path, sheet_no: usize) -> Result<RawSheet>;
}

/// Reads spreadsheet workbooks with calamine.
#[derive(Debug, Clone, Copy, Default)]
pub struct XlsxSheetSource;

fn convert_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::Int(v) => Cell::Number(*v as f64),
        Data::Float(v) => Cell::Number(*v),
        Data::String(s) if s.trim().is_empty() => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        other => Cell::Text(other.to_string()),
    }
}

impl SheetSource for XlsxSheetSource {
    fn sheet_count(&self, path: &Path) -> Result<usize> {
        let workbook = open_workbook_auto(path).map_err(|e| LoaderError::Workbook {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(workbook.sheet_names().len())
    }

    fn read_sheet(&self, path: &Path, sheet_no: usize) -> Result<RawSheet> {
        let mut workbook = open_workbook_auto(path).map_err(|e| LoaderError::Workbook {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let range = workbook
            .worksheet_range_at(sheet_no)
            .ok_or_else(|| LoaderError::SheetNotFound {
                path: path.to_path_buf(),
                sheet_no,
            })?
            .map_err(|e| LoaderError::Workbook {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        let rows = range
            .rows()
            .map(|row| row.iter().map(convert_cell).collect())
            .collect();

        Ok(RawSheet::new(rows))
    }
}

/// Parse an optional float field; blanks and `nan` are missing.
fn parse_optional(field: &str) -> Result<Option<f64>> {
    let trimmed = field.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    trimmed
        .parse::<f64>()
        .map(Some)
        .map_err(|_| LoaderError::ParseError(format!("Invalid number: {}", trimmed)))
}

fn parse_required(field: &str, column: &str) -> Result<f64> {
    parse_optional(field)?
        .ok_or_else(|| LoaderError::ParseError(format!("Missing value in column {}", column)))
}

/// Load a cleaned coordinate table written during preprocessing.
///
/// The table is tab-delimited with a header row naming at least the
/// `Trial time`, `Recording time`, `X center` and `Y center` columns.
///
/// # Errors
///
/// Returns an error if the file cannot be read, a required column is absent,
/// or a time value is not numeric.
pub fn load_track_csv<P: AsRef<Path>>(path: P) -> Result<CoordinateTrack> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let headers = reader.headers()?.clone();
    let col_map: HashMap<&str, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, name)| (name.trim(), i))
        .collect();

    let lookup = |name: &str| {
        col_map
            .get(name)
            .copied()
            .ok_or_else(|| LoaderError::MissingColumns(format!("{} in {}", name, path.display())))
    };
    let trial_idx = lookup(TRIAL_TIME_COLUMN)?;
    let recording_idx = lookup(RECORDING_TIME_COLUMN)?;
    let x_idx = lookup(X_CENTER_COLUMN)?;
    let y_idx = lookup(Y_CENTER_COLUMN)?;

    let mut samples = Vec::new();
    for result in reader.records() {
        let record = result?;
        let field = |i: usize| record.get(i).unwrap_or("");

        samples.push(Sample::new(
            parse_required(field(trial_idx), TRIAL_TIME_COLUMN)?,
            parse_required(field(recording_idx), RECORDING_TIME_COLUMN)?,
            parse_optional(field(x_idx))?,
            parse_optional(field(y_idx))?,
        ));
    }

    Ok(CoordinateTrack::new(samples))
}

/// Load a metadata table (no header, key TAB value per line).
pub fn load_metadata_csv<P: AsRef<Path>>(path: P) -> Result<Metadata> {
    let file = File::open(path.as_ref())?;
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let mut meta = Metadata::new();
    for result in reader.records() {
        let record = result?;
        let Some(key) = record.get(0) else {
            continue;
        };
        if key.trim().is_empty() {
            continue;
        }
        meta.push(key, record.get(1).map(str::to_string));
    }

    Ok(meta)
}
