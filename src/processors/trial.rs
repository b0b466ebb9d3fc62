//! Loading one trial's intermediate tables and writing the merged result.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::consolidator::{
    consolidate_trial, ConsolidatedTrial, ConsolidationError, ConsolidationOptions, SubjectInput,
};
use super::normalizer::NormalizeOptions;
use super::preprocess::{list_matching, Lineage};
use crate::config::PipelineConfig;
use crate::core::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticLog};
use crate::core::loaders::{load_metadata_csv, load_track_csv, LoaderError};
use crate::core::writers::{write_trial_table, WriteError};

/// Errors that abort a trial.
#[derive(Debug, Error)]
pub enum TrialError {
    #[error("trial {trial_id}: no {kind} file for sheet {sheet} in {}", .dir.display())]
    MissingIntermediate {
        trial_id: String,
        sheet: usize,
        kind: &'static str,
        dir: PathBuf,
    },

    #[error("trial {trial_id} sheet {sheet}: failed to load {}: {source}", .path.display())]
    Load {
        trial_id: String,
        sheet: usize,
        path: PathBuf,
        #[source]
        source: LoaderError,
    },

    #[error("intermediate file lookup failed: {0:#}")]
    Discovery(anyhow::Error),

    #[error(transparent)]
    Consolidation(#[from] ConsolidationError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("failed to write report {}: {message}", .path.display())]
    Report { path: PathBuf, message: String },
}

/// Result type for trial operations.
pub type Result<T> = std::result::Result<T, TrialError>;

/// Summary of a consolidated trial, written next to the trial table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialReport {
    pub trial_id: String,
    pub rows: usize,
    pub columns: Vec<String>,
    pub frame_duration: Option<f64>,
    pub clean: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl From<&ConsolidatedTrial> for TrialReport {
    fn from(trial: &ConsolidatedTrial) -> Self {
        Self {
            trial_id: trial.trial_id.clone(),
            rows: trial.table.num_rows(),
            columns: trial.table.column_names(),
            frame_duration: trial.frame_duration,
            clean: trial.is_clean(),
            diagnostics: trial.diagnostics.clone(),
        }
    }
}

/// Files of one kind for one (trial, sheet).
///
/// Names look like `<prefix>... <trial_id>sheet_<sheet>.csv`; the space
/// before the trial id keeps trial 7 from matching trial 17.
fn intermediate_regex(prefix: &str, trial_id: &str, sheet: usize) -> Result<Regex> {
    let expr = format!(
        r"^{}.* {}sheet_{}\.csv$",
        regex::escape(prefix),
        regex::escape(trial_id),
        sheet
    );
    Regex::new(&expr).map_err(|e| TrialError::Discovery(e.into()))
}

/// Locate the intermediate file of one kind.
///
/// Returns the first match in name order and the names of any others.
pub fn find_intermediate(
    dir: &Path,
    prefix: &str,
    trial_id: &str,
    sheet: usize,
    kind: &'static str,
) -> Result<(PathBuf, Vec<PathBuf>)> {
    let matcher = intermediate_regex(prefix, trial_id, sheet)?;
    let mut matches = list_matching(dir, &matcher).map_err(TrialError::Discovery)?;

    if matches.is_empty() {
        return Err(TrialError::MissingIntermediate {
            trial_id: trial_id.to_string(),
            sheet,
            kind,
            dir: dir.to_path_buf(),
        });
    }

    let first = matches.remove(0);
    Ok((first, matches))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Read the intermediate tables of the configured trial and consolidate them.
///
/// # Errors
///
/// Returns `MissingIntermediate` naming the trial and sheet when a table is
/// absent, `Load` when one cannot be parsed, and consolidation errors as is.
pub fn load_trial(config: &PipelineConfig) -> Result<ConsolidatedTrial> {
    let settings = &config.consolidation;
    let trial_id = settings.trial_id.as_str();
    let dir = config.paths.intermediate_path();
    let lineage = if settings.use_smoothed_data {
        Lineage::Smoothed
    } else {
        Lineage::Unsmoothed
    };

    info!("Selected trial: {}", trial_id);

    if settings.subjects_per_trial > 0 && !dir.is_dir() {
        return Err(TrialError::MissingIntermediate {
            trial_id: trial_id.to_string(),
            sheet: 0,
            kind: "coordinate",
            dir,
        });
    }

    let mut subjects = Vec::with_capacity(settings.subjects_per_trial);
    let mut duplicates = DiagnosticLog::new();

    for sheet in 0..settings.subjects_per_trial {
        let (coords_path, extra_coords) =
            find_intermediate(&dir, lineage.prefix(), trial_id, sheet, "coordinate")?;
        let (meta_path, extra_meta) = find_intermediate(&dir, "meta", trial_id, sheet, "metadata")?;

        for (used, ignored) in [(&coords_path, extra_coords), (&meta_path, extra_meta)] {
            if !ignored.is_empty() {
                duplicates.push(Diagnostic::new(
                    trial_id,
                    sheet,
                    sheet,
                    DiagnosticKind::DuplicateIntermediate {
                        used: file_name(used),
                        ignored: ignored.iter().map(|p| file_name(p)).collect(),
                    },
                ));
            }
        }

        let load_error = |path: &Path, source: LoaderError| TrialError::Load {
            trial_id: trial_id.to_string(),
            sheet,
            path: path.to_path_buf(),
            source,
        };
        let track = load_track_csv(&coords_path).map_err(|e| load_error(&coords_path, e))?;
        let metadata = load_metadata_csv(&meta_path).map_err(|e| load_error(&meta_path, e))?;

        subjects.push(SubjectInput {
            sheet,
            track,
            metadata,
        });
    }

    let options = ConsolidationOptions {
        normalize: NormalizeOptions {
            drop_missing: settings.drop_missing_rows,
        },
        require_matching_keys: settings.require_matching_keys,
    };

    let mut trial = consolidate_trial(trial_id, subjects, &options)?;
    let mut diagnostics = duplicates.into_vec();
    diagnostics.append(&mut trial.diagnostics);
    trial.diagnostics = diagnostics;
    Ok(trial)
}

/// Default location of a trial table: `trial_<id>.csv` in the intermediate directory.
pub fn default_output_path(config: &PipelineConfig) -> PathBuf {
    config
        .paths
        .intermediate_path()
        .join(format!("trial_{}.csv", config.consolidation.trial_id))
}

/// Write the trial report as YAML.
pub fn write_report(path: &Path, report: &TrialReport) -> Result<()> {
    let content = serde_yaml::to_string(report).map_err(|e| TrialError::Report {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    fs::write(path, content).map_err(|e| TrialError::Report {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Consolidate the configured trial and write its table and report.
///
/// The report is written as `report_<trial_id>.yaml` beside the table.
/// Returns the trial and the report path.
pub fn run_consolidation(config: &PipelineConfig, output: &Path) -> Result<(ConsolidatedTrial, PathBuf)> {
    let trial = load_trial(config)?;

    write_trial_table(output, &trial.table)?;

    let report_path = output.with_file_name(format!("report_{}.yaml", trial.trial_id));
    write_report(&report_path, &TrialReport::from(&trial))?;

    if trial.is_clean() {
        info!("Data checked, all clear");
    } else {
        warn!(
            "Trial {}: {} data-quality issues, please check {}",
            trial.trial_id,
            trial.diagnostics.len(),
            report_path.display()
        );
    }

    Ok((trial, report_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::table::{CoordinateTrack, Metadata, Sample};
    use crate::core::writers::{write_metadata_csv, write_track_csv};
    use tempfile::TempDir;

    fn write_subject(dir: &Path, prefix: &str, trial: &str, sheet: usize, times: &[f64], subject_type: &str) {
        let track = CoordinateTrack::new(
            times
                .iter()
                .enumerate()
                .map(|(i, &t)| Sample::new(t, t, Some(sheet as f64 + i as f64), Some(1.0)))
                .collect(),
        );
        let name = format!("Exp-Trial {}sheet_{}.csv", trial, sheet);
        write_track_csv(&dir.join(format!("{}_{}", prefix, name)), &track).unwrap();
        let meta = Metadata::from_pairs(vec![
            ("subject_type", subject_type),
            ("User-defined Independent Variable", ""),
            ("Condition", "A"),
            ("Dose", "nan"),
        ]);
        write_metadata_csv(&dir.join(format!("meta_{}", name)), &meta).unwrap();
    }

    fn config_for(dir: &Path, trial: &str) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.paths.rawfilepath = dir.to_path_buf();
        config.consolidation.trial_id = trial.to_string();
        config.consolidation.subjects_per_trial = 2;
        config
    }

    #[test]
    fn test_intermediate_regex_respects_trial_boundary() {
        let re = intermediate_regex("smoo", "7", 0).unwrap();
        assert!(re.is_match("smoo_Exp-Trial 7sheet_0.csv"));
        assert!(!re.is_match("smoo_Exp-Trial 17sheet_0.csv"));
        assert!(!re.is_match("unsmoo_Exp-Trial 7sheet_0.csv"));
        assert!(!re.is_match("smoo_Exp-Trial 7sheet_01.csv"));
    }

    #[test]
    fn test_load_trial_end_to_end() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("preprocessed_tracks");
        fs::create_dir_all(&dir).unwrap();
        let times = [0.0, 0.04, 0.08];
        write_subject(&dir, "unsmoo", "7", 0, &times, "prey");
        write_subject(&dir, "unsmoo", "7", 1, &times, "predator");
        // Another trial in the same directory must be ignored
        write_subject(&dir, "unsmoo", "17", 0, &[0.0], "prey");

        let trial = load_trial(&config_for(temp_dir.path(), "7")).unwrap();

        assert_eq!(trial.table.num_rows(), 3);
        assert_eq!(
            trial.table.column_names(),
            vec!["Trialtime", "X_prey", "Y_prey", "X_predator", "Y_predator", "Condition"]
        );
        assert_eq!(trial.table.constant("Condition"), Some("A"));
        assert_eq!(trial.frame_duration, Some(0.04));
        assert!(trial.is_clean());
    }

    #[test]
    fn test_missing_intermediate_names_trial_and_sheet() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("preprocessed_tracks");
        fs::create_dir_all(&dir).unwrap();
        write_subject(&dir, "unsmoo", "7", 0, &[0.0, 0.04], "prey");

        let err = load_trial(&config_for(temp_dir.path(), "7")).unwrap_err();
        match err {
            TrialError::MissingIntermediate {
                trial_id, sheet, ..
            } => {
                assert_eq!(trial_id, "7");
                assert_eq!(sheet, 1);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_missing_intermediate_directory_names_trial() {
        let temp_dir = TempDir::new().unwrap();

        let err = load_trial(&config_for(temp_dir.path(), "4")).unwrap_err();

        assert!(matches!(
            &err,
            TrialError::MissingIntermediate { trial_id, sheet: 0, .. } if trial_id == "4"
        ));
        let message = err.to_string();
        assert!(message.contains("trial 4"));
        assert!(message.contains("sheet 0"));
    }

    #[test]
    fn test_duplicate_intermediate_uses_first() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("preprocessed_tracks");
        fs::create_dir_all(&dir).unwrap();
        let times = [0.0, 0.04, 0.08];
        write_subject(&dir, "unsmoo", "5", 0, &times, "prey");
        write_subject(&dir, "unsmoo", "5", 1, &times, "predator");
        fs::copy(
            dir.join("unsmoo_Exp-Trial 5sheet_1.csv"),
            dir.join("unsmoo_Backup-Trial 5sheet_1.csv"),
        )
        .unwrap();

        let trial = load_trial(&config_for(temp_dir.path(), "5")).unwrap();

        assert_eq!(trial.diagnostics.len(), 1);
        assert_eq!(trial.diagnostics[0].sheet, 1);
        assert_eq!(
            trial.diagnostics[0].kind,
            DiagnosticKind::DuplicateIntermediate {
                used: "unsmoo_Backup-Trial 5sheet_1.csv".to_string(),
                ignored: vec!["unsmoo_Exp-Trial 5sheet_1.csv".to_string()],
            }
        );
        assert_eq!(trial.table.num_rows(), 3);
    }

    #[test]
    fn test_smoothed_lineage_selected() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("preprocessed_tracks");
        fs::create_dir_all(&dir).unwrap();
        write_subject(&dir, "unsmoo", "2", 0, &[0.0, 0.04], "prey");
        write_subject(&dir, "unsmoo", "2", 1, &[0.0, 0.04], "predator");

        let mut config = config_for(temp_dir.path(), "2");
        config.consolidation.use_smoothed_data = true;

        let err = load_trial(&config).unwrap_err();
        assert!(matches!(
            err,
            TrialError::MissingIntermediate {
                kind: "coordinate",
                sheet: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_run_consolidation_writes_table_and_report() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("preprocessed_tracks");
        fs::create_dir_all(&dir).unwrap();
        write_subject(&dir, "unsmoo", "3", 0, &[0.0, 0.04, 0.08, 0.12], "prey");
        write_subject(&dir, "unsmoo", "3", 1, &[0.0, 0.04, 0.08], "predator");

        let config = config_for(temp_dir.path(), "3");
        let output = default_output_path(&config);
        let (trial, report_path) = run_consolidation(&config, &output).unwrap();

        assert_eq!(trial.table.num_rows(), 3);
        assert!(output.exists());
        assert_eq!(report_path, dir.join("report_3.yaml"));

        let report: TrialReport =
            serde_yaml::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
        assert_eq!(report.rows, 3);
        assert!(!report.clean);
        assert!(report
            .diagnostics
            .iter()
            .any(|d| matches!(d.kind, DiagnosticKind::FrameCountMismatch { expected: 4, observed: 3 })));
    }
}
