//! Data writers for the tab-delimited track, metadata and trial tables.
//!
//! All floats are written with five decimals; missing coordinates are
//! written as empty fields.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use thiserror::Error;

use super::table::{
    CoordinateTrack, Metadata, TrialTable, RECORDING_TIME_COLUMN, TRIAL_TIME_COLUMN,
    X_CENTER_COLUMN, Y_CENTER_COLUMN,
};

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Tab-delimited writer over a buffered file.
struct TsvWriter {
    inner: csv::Writer<BufWriter<File>>,
    path: String,
}

impl TsvWriter {
    fn create(path: &Path) -> Result<Self> {
        ensure_parent_dirs(path)?;
        let file = File::create(path).map_err(|e| WriteError::CreateFile {
            path: path.display().to_string(),
            source: e,
        })?;
        let inner = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .from_writer(BufWriter::new(file));
        Ok(Self {
            inner,
            path: path.display().to_string(),
        })
    }

    fn record<I, T>(&mut self, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        self.inner
            .write_record(fields)
            .map_err(|e| WriteError::CsvError {
                path: self.path.clone(),
                source: e,
            })
    }

    fn finish(mut self) -> Result<()> {
        self.inner.flush().map_err(|e| WriteError::WriteFile {
            path: self.path,
            source: e,
        })
    }
}

fn format_value(v: f64) -> String {
    format!("{:.5}", v)
}

fn format_optional(v: Option<f64>) -> String {
    v.map(format_value).unwrap_or_default()
}

/// Write a cleaned coordinate track with a header row.
///
/// # Errors
///
/// Returns an error if:
/// - Parent directories cannot be created
/// - File cannot be created or written to
pub fn write_track_csv(path: &Path, track: &CoordinateTrack) -> Result<()> {
    let mut writer = TsvWriter::create(path)?;

    writer.record([
        TRIAL_TIME_COLUMN,
        RECORDING_TIME_COLUMN,
        X_CENTER_COLUMN,
        Y_CENTER_COLUMN,
    ])?;

    for sample in &track.samples {
        writer.record([
            format_value(sample.trial_time),
            format_value(sample.recording_time),
            format_optional(sample.x),
            format_optional(sample.y),
        ])?;
    }

    writer.finish()
}

/// Write metadata as key/value lines without a header.
pub fn write_metadata_csv(path: &Path, metadata: &Metadata) -> Result<()> {
    let mut writer = TsvWriter::create(path)?;
    for (key, value) in metadata.entries() {
        writer.record([key, value.unwrap_or("")])?;
    }
    writer.finish()
}

/// Write a consolidated trial table with a header row.
///
/// Constant columns repeat their value on every row.
pub fn write_trial_table(path: &Path, table: &TrialTable) -> Result<()> {
    let mut writer = TsvWriter::create(path)?;
    writer.record(table.column_names())?;

    for row in 0..table.num_rows() {
        let mut fields = Vec::with_capacity(table.num_columns());
        fields.push(format_value(table.trialtime[row]));
        fields.extend(
            table
                .columns
                .iter()
                .map(|column| format_optional(column.values[row])),
        );
        fields.extend(table.constants.iter().map(|(_, value)| value.clone()));
        writer.record(fields)?;
    }

    writer.finish()
}
