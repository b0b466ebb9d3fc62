//! Data-quality diagnostics attributed to a (trial, subject, sheet).
//!
//! Diagnostics never abort processing. They are logged as they are raised
//! and collected so a trial report can tell downstream consumers whether the
//! trial is trustworthy.

use std::fmt;

use log::warn;
use serde::{Deserialize, Serialize};

/// Kind of data-quality problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Trial time and recording time disagree; `index` is the first sample
    /// affected and `count` the number of affected samples.
    TimeSync {
        index: usize,
        trial_time: f64,
        recording_time: f64,
        count: usize,
    },
    /// Inter-sample deltas deviate from the frame duration; `index` is the
    /// first deviating frame and `count` the number of such frames.
    FrameGap {
        index: usize,
        expected: f64,
        observed: f64,
        count: usize,
    },
    /// Subject row count differs from the rows merged so far.
    FrameCountMismatch { expected: usize, observed: usize },
    /// Subject has no samples at all.
    EmptyTrack,
    /// More than one intermediate file matched; the first was used.
    DuplicateIntermediate { used: String, ignored: Vec<String> },
    /// Smoothing was skipped and the data passed through unchanged.
    SmoothingSkipped { reason: String },
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::TimeSync {
                index,
                trial_time,
                recording_time,
                count,
            } => write!(
                f,
                "trial time {:.3} not in sync with recording time {:.3} at sample {} ({} samples affected)",
                trial_time, recording_time, index, count
            ),
            DiagnosticKind::FrameGap {
                index,
                expected,
                observed,
                count,
            } => write!(
                f,
                "frame duration {:.2} deviates from {:.2} after sample {} ({} frames affected)",
                observed, expected, index, count
            ),
            DiagnosticKind::FrameCountMismatch { expected, observed } => write!(
                f,
                "{} recorded frames, {} merged so far",
                observed, expected
            ),
            DiagnosticKind::EmptyTrack => write!(f, "no tracking data recovered"),
            DiagnosticKind::DuplicateIntermediate { used, ignored } => write!(
                f,
                "several intermediate files match, using {} and ignoring {}",
                used,
                ignored.join(", ")
            ),
            DiagnosticKind::SmoothingSkipped { reason } => {
                write!(f, "smoothing skipped: {}", reason)
            }
        }
    }
}

/// A diagnostic with its origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub trial_id: String,
    pub subject: usize,
    pub sheet: usize,
    #[serde(flatten)]
    pub kind: DiagnosticKind,
}

impl Diagnostic {
    pub fn new(trial_id: impl Into<String>, subject: usize, sheet: usize, kind: DiagnosticKind) -> Self {
        Self {
            trial_id: trial_id.into(),
            subject,
            sheet,
            kind,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "trial {} subject {} sheet {}: {}",
            self.trial_id, self.subject, self.sheet, self.kind
        )
    }
}

/// Collects diagnostics, logging each one as it arrives.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticLog {
    entries: Vec<Diagnostic>,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        warn!("{}", diagnostic);
        self.entries.push(diagnostic);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_origin() {
        let d = Diagnostic::new("7", 1, 1, DiagnosticKind::EmptyTrack);
        assert_eq!(
            d.to_string(),
            "trial 7 subject 1 sheet 1: no tracking data recovered"
        );
    }

    #[test]
    fn test_yaml_tagging() {
        let d = Diagnostic::new(
            "3",
            0,
            0,
            DiagnosticKind::FrameCountMismatch {
                expected: 100,
                observed: 90,
            },
        );
        let yaml = serde_yaml::to_string(&d).unwrap();
        assert!(yaml.contains("kind: frame_count_mismatch"));
        assert!(yaml.contains("observed: 90"));
    }

    #[test]
    fn test_log_collects() {
        let mut log = DiagnosticLog::new();
        assert!(log.is_empty());
        log.push(Diagnostic::new("1", 0, 0, DiagnosticKind::EmptyTrack));
        assert_eq!(log.len(), 1);
        assert_eq!(log.into_vec()[0].subject, 0);
    }
}
