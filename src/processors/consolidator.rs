//! Merging the subject tracks of one trial into a single wide table.
//!
//! Subject 0 seeds the table. Every further subject is inner-joined on the
//! `Trialtime` key, so rows missing from any subject drop out of the result.
//! By default this shrinking is only reported; `require_matching_keys` turns
//! a key-set difference into an error instead.

use std::collections::{HashMap, HashSet};

use log::{debug, info};
use thiserror::Error;

use super::normalizer::{normalize_track, NormalizeOptions};
use crate::core::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticLog};
use crate::core::table::{CoordinateColumn, CoordinateTrack, Metadata, SubjectTrack, TrialTable};

/// Errors that abort the consolidation of a trial.
#[derive(Debug, Error, PartialEq)]
pub enum ConsolidationError {
    #[error("trial {trial_id}: no subjects to consolidate")]
    NoSubjects { trial_id: String },

    #[error(
        "trial {trial_id}: subject {subject} covers {unmatched} time keys not shared with the other subjects"
    )]
    KeyMismatch {
        trial_id: String,
        subject: usize,
        unmatched: usize,
    },
}

/// Result type for consolidation.
pub type Result<T> = std::result::Result<T, ConsolidationError>;

/// Options for [`consolidate_trial`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsolidationOptions {
    pub normalize: NormalizeOptions,
    /// Reject subjects whose time keys differ from the merged table
    pub require_matching_keys: bool,
}

/// One subject's cleaned data as read for consolidation.
#[derive(Debug, Clone)]
pub struct SubjectInput {
    /// Worksheet the track came from
    pub sheet: usize,
    pub track: CoordinateTrack,
    pub metadata: Metadata,
}

/// Result of consolidating a trial.
#[derive(Debug, Clone)]
pub struct ConsolidatedTrial {
    pub trial_id: String,
    pub table: TrialTable,
    /// Frame duration of subject 0
    pub frame_duration: Option<f64>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ConsolidatedTrial {
    /// True if no data-quality problem was reported.
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Key for exact float equality; `-0.0` and `0.0` map to the same key.
#[inline]
fn time_key(t: f64) -> u64 {
    if t == 0.0 {
        0f64.to_bits()
    } else {
        t.to_bits()
    }
}

fn unique_name(name: String, taken: &HashSet<String>, subject: usize) -> String {
    if taken.contains(&name) {
        format!("{}_{}", name, subject)
    } else {
        name
    }
}

/// Accumulating merge state.
struct MergedTable {
    trialtime: Vec<f64>,
    columns: Vec<CoordinateColumn>,
    names: HashSet<String>,
}

impl MergedTable {
    fn seed(track: SubjectTrack) -> Self {
        let x_name = track.x_column();
        let y_name = track.y_column();
        let names = [x_name.clone(), y_name.clone()].into_iter().collect();
        Self {
            trialtime: track.trial_time,
            columns: vec![
                CoordinateColumn {
                    name: x_name,
                    values: track.x,
                },
                CoordinateColumn {
                    name: y_name,
                    values: track.y,
                },
            ],
            names,
        }
    }

    #[inline]
    fn len(&self) -> usize {
        self.trialtime.len()
    }

    /// Number of distinct keys present on only one side of the join.
    fn unmatched_keys(&self, track: &SubjectTrack) -> usize {
        let left: HashSet<u64> = self.trialtime.iter().map(|&t| time_key(t)).collect();
        let right: HashSet<u64> = track.trial_time.iter().map(|&t| time_key(t)).collect();
        left.symmetric_difference(&right).count()
    }

    /// Inner join on trial time.
    ///
    /// Rows keep the order of the accumulated table; a key present several
    /// times yields every left/right pairing.
    fn join(&mut self, track: SubjectTrack, subject: usize) {
        let mut right_rows: HashMap<u64, Vec<usize>> = HashMap::with_capacity(track.len());
        for (i, &t) in track.trial_time.iter().enumerate() {
            right_rows.entry(time_key(t)).or_default().push(i);
        }

        let pairs: Vec<(usize, usize)> = self
            .trialtime
            .iter()
            .enumerate()
            .flat_map(|(li, &t)| {
                right_rows
                    .get(&time_key(t))
                    .into_iter()
                    .flatten()
                    .map(move |&ri| (li, ri))
            })
            .collect();

        self.trialtime = pairs.iter().map(|&(li, _)| self.trialtime[li]).collect();
        for column in &mut self.columns {
            column.values = pairs.iter().map(|&(li, _)| column.values[li]).collect();
        }

        let x_name = unique_name(track.x_column(), &self.names, subject);
        let y_name = unique_name(track.y_column(), &self.names, subject);
        self.names.insert(x_name.clone());
        self.names.insert(y_name.clone());

        self.columns.push(CoordinateColumn {
            name: x_name,
            values: pairs.iter().map(|&(_, ri)| track.x[ri]).collect(),
        });
        self.columns.push(CoordinateColumn {
            name: y_name,
            values: pairs.iter().map(|&(_, ri)| track.y[ri]).collect(),
        });
    }
}

/// Merge the subjects of one trial into a [`TrialTable`].
///
/// Subjects are processed in order. Independent variables come from the
/// metadata of the last subject and are appended as constant columns.
///
/// # Errors
///
/// Returns `NoSubjects` for an empty input and, in strict mode, `KeyMismatch`
/// when a subject's time keys differ from those merged so far.
pub fn consolidate_trial(
    trial_id: &str,
    subjects: Vec<SubjectInput>,
    options: &ConsolidationOptions,
) -> Result<ConsolidatedTrial> {
    if subjects.is_empty() {
        return Err(ConsolidationError::NoSubjects {
            trial_id: trial_id.to_string(),
        });
    }

    info!("Consolidating trial {} ({} subjects)", trial_id, subjects.len());

    let mut log = DiagnosticLog::new();
    let mut merged: Option<MergedTable> = None;
    let mut frame_duration = None;
    let mut last_metadata = Metadata::new();

    for (subject, input) in subjects.into_iter().enumerate() {
        let normalized = normalize_track(&input.track, &input.metadata, &options.normalize);

        for warning in normalized.warnings {
            log.push(Diagnostic::new(trial_id, subject, input.sheet, warning));
        }
        if normalized.track.is_empty() {
            log.push(Diagnostic::new(
                trial_id,
                subject,
                input.sheet,
                DiagnosticKind::EmptyTrack,
            ));
        }

        merged = Some(match merged {
            None => {
                frame_duration = normalized.frame_duration;
                MergedTable::seed(normalized.track)
            }
            Some(mut table) => {
                if options.require_matching_keys {
                    let unmatched = table.unmatched_keys(&normalized.track);
                    if unmatched > 0 {
                        return Err(ConsolidationError::KeyMismatch {
                            trial_id: trial_id.to_string(),
                            subject,
                            unmatched,
                        });
                    }
                }
                if normalized.track.len() != table.len() {
                    log.push(Diagnostic::new(
                        trial_id,
                        subject,
                        input.sheet,
                        DiagnosticKind::FrameCountMismatch {
                            expected: table.len(),
                            observed: normalized.track.len(),
                        },
                    ));
                }
                table.join(normalized.track, subject);
                debug!("Trial {}: {} rows after subject {}", trial_id, table.len(), subject);
                table
            }
        });
        last_metadata = input.metadata;
    }

    let merged = merged.ok_or_else(|| ConsolidationError::NoSubjects {
        trial_id: trial_id.to_string(),
    })?;

    let mut names = merged.names;
    let constants: Vec<(String, String)> = last_metadata
        .independent_variables()
        .into_iter()
        .filter(|(name, _)| names.insert(name.clone()))
        .collect();

    let table = TrialTable {
        trialtime: merged.trialtime,
        columns: merged.columns,
        constants,
    };

    info!(
        "Trial {}: {} rows, {} columns",
        trial_id,
        table.num_rows(),
        table.num_columns()
    );

    Ok(ConsolidatedTrial {
        trial_id: trial_id.to_string(),
        table,
        frame_duration,
        diagnostics: log.into_vec(),
    })
}
