//! Batch preprocessing of raw tracking workbooks.
//!
//! Every discovered workbook is read sheet by sheet. Each sheet is cleaned,
//! optionally smoothed, and written to the intermediate directory as a
//! coordinate table plus a metadata table. A failing sheet is logged and
//! skipped; the rest of the batch still runs.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{error, info, warn};
use regex::Regex;

use super::savgol::{smooth_series, FilterError};
use crate::config::{PipelineConfig, SmoothingConfig};
use crate::core::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticLog};
use crate::core::loaders::SheetSource;
use crate::core::sheet::clean_sheet;
use crate::core::table::CoordinateTrack;
use crate::core::writers::{write_metadata_csv, write_track_csv};

/// Which processing lineage an intermediate table belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lineage {
    Smoothed,
    Unsmoothed,
}

impl Lineage {
    /// File name prefix of the lineage.
    pub fn prefix(self) -> &'static str {
        match self {
            Lineage::Smoothed => "smoo",
            Lineage::Unsmoothed => "unsmoo",
        }
    }
}

/// Paths of the intermediate tables for one (workbook, sheet).
#[derive(Debug, Clone, PartialEq)]
pub struct IntermediatePaths {
    pub smoothed: PathBuf,
    pub unsmoothed: PathBuf,
    pub metadata: PathBuf,
}

impl IntermediatePaths {
    pub fn new(output_dir: &Path, raw_file: &Path, sheet_no: usize) -> Self {
        let basename = raw_file
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let name = |prefix: &str| output_dir.join(format!("{}_{}sheet_{}.csv", prefix, basename, sheet_no));
        Self {
            smoothed: name(Lineage::Smoothed.prefix()),
            unsmoothed: name(Lineage::Unsmoothed.prefix()),
            metadata: name("meta"),
        }
    }

    pub fn coordinates(&self, lineage: Lineage) -> &Path {
        match lineage {
            Lineage::Smoothed => &self.smoothed,
            Lineage::Unsmoothed => &self.unsmoothed,
        }
    }
}

/// A sheet that could not be processed.
#[derive(Debug, Clone)]
pub struct SheetFailure {
    pub path: PathBuf,
    pub sheet: usize,
    pub message: String,
}

/// Outcome of a batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub files: usize,
    pub sheets_processed: usize,
    pub tables_written: usize,
    pub failures: Vec<SheetFailure>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Translate a `*`/`?` wildcard pattern into an anchored regex.
pub fn wildcard_regex(pattern: &str) -> Result<Regex> {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    expr.push('$');
    Regex::new(&expr).with_context(|| format!("Invalid file pattern: {}", pattern))
}

/// Files in `directory` whose name matches `pattern`, sorted.
pub fn discover_files(directory: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let matcher = wildcard_regex(pattern)?;
    list_matching(directory, &matcher)
}

/// Files in `directory` whose name matches `matcher`, sorted.
pub fn list_matching(directory: &Path, matcher: &Regex) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(directory)
        .with_context(|| format!("Failed to read directory: {}", directory.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| matcher.is_match(n))
                .unwrap_or(false)
        })
        .collect();

    files.sort();
    Ok(files)
}

/// Smooth the x and y series of a track independently.
pub fn smooth_track(
    track: &CoordinateTrack,
    params: &SmoothingConfig,
) -> std::result::Result<CoordinateTrack, FilterError> {
    let xs = smooth_series(&track.xs(), params)?;
    let ys = smooth_series(&track.ys(), params)?;
    let mut smoothed = track.clone();
    smoothed.set_coordinates(&xs, &ys);
    Ok(smoothed)
}

/// Clean one sheet and write its intermediate tables.
///
/// Returns the number of tables written.
pub fn preprocess_sheet(
    source: &dyn SheetSource,
    raw_file: &Path,
    sheet_no: usize,
    config: &PipelineConfig,
    diagnostics: &mut DiagnosticLog,
) -> Result<usize> {
    let raw = source
        .read_sheet(raw_file, sheet_no)
        .with_context(|| format!("Failed to read sheet {} of {}", sheet_no, raw_file.display()))?;
    let (track, metadata) = clean_sheet(&raw, &config.cleaning)
        .with_context(|| format!("Sheet {} of {} is malformed", sheet_no, raw_file.display()))?;

    let paths = IntermediatePaths::new(&config.paths.intermediate_path(), raw_file, sheet_no);
    let mut written = 0;

    write_metadata_csv(&paths.metadata, &metadata)?;
    written += 1;

    if config.preprocessing.extract_all_unsmoothed {
        write_track_csv(&paths.unsmoothed, &track)?;
        written += 1;
    }

    if config.preprocessing.smoothe_all {
        let smoothed = if track.is_empty() {
            let trial_id = raw_file
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            diagnostics.push(Diagnostic::new(
                trial_id,
                sheet_no,
                sheet_no,
                DiagnosticKind::SmoothingSkipped {
                    reason: "track has no samples".to_string(),
                },
            ));
            track
        } else {
            smooth_track(&track, &config.smoothing)?
        };
        write_track_csv(&paths.smoothed, &smoothed)?;
        written += 1;
    }

    Ok(written)
}

/// Preprocess every raw workbook found under the configured directory.
///
/// Does nothing unless smoothing or unsmoothed extraction is enabled.
///
/// # Errors
///
/// Fails only if the raw directory cannot be listed, the output directory
/// cannot be created, or the smoothing parameters are invalid. Per-sheet
/// failures are collected in the summary.
pub fn preprocess_batch(config: &PipelineConfig, source: &dyn SheetSource) -> Result<BatchSummary> {
    let mut summary = BatchSummary::default();
    let prep = &config.preprocessing;

    if !prep.smoothe_all && !prep.extract_all_unsmoothed {
        info!("Neither smoothing nor unsmoothed extraction requested, nothing to do");
        return Ok(summary);
    }

    if prep.smoothe_all {
        super::savgol::coefficients(&config.smoothing).context("Invalid smoothing parameters")?;
    }

    let files = discover_files(&config.paths.rawfilepath, &config.paths.raw_pattern)?;
    info!("Number of raw files: {}", files.len());
    if files.is_empty() {
        warn!(
            "No files matching {} in {}",
            config.paths.raw_pattern,
            config.paths.rawfilepath.display()
        );
    }

    let output_dir = config.paths.intermediate_path();
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;

    let mut diagnostics = DiagnosticLog::new();
    summary.files = files.len();

    for raw_file in &files {
        let subjects = config.consolidation.subjects_per_trial;
        if let Ok(count) = source.sheet_count(raw_file) {
            if count < subjects {
                warn!(
                    "{} has {} sheets, expected {} subjects",
                    raw_file.display(),
                    count,
                    subjects
                );
            }
        }

        for sheet_no in 0..subjects {
            match preprocess_sheet(source, raw_file, sheet_no, config, &mut diagnostics) {
                Ok(written) => {
                    summary.sheets_processed += 1;
                    summary.tables_written += written;
                    info!("{} sheet {}: {} tables written", raw_file.display(), sheet_no, written);
                }
                Err(e) => {
                    error!("{} sheet {}: {:#}", raw_file.display(), sheet_no, e);
                    summary.failures.push(SheetFailure {
                        path: raw_file.clone(),
                        sheet: sheet_no,
                        message: format!("{:#}", e),
                    });
                }
            }
        }
    }

    summary.diagnostics = diagnostics.into_vec();
    Ok(summary)
}
