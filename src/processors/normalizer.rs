//! Per-subject timing validation and column namespacing.

use crate::core::diagnostics::DiagnosticKind;
use crate::core::table::{CoordinateTrack, Metadata, SubjectTrack};

/// Options for [`normalize_track`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeOptions {
    /// Drop samples where both coordinates are missing
    pub drop_missing: bool,
}

/// A subject track ready for merging, with what its validation found.
#[derive(Debug, Clone)]
pub struct NormalizedSubject {
    pub track: SubjectTrack,
    /// Duration of the first frame, `None` with fewer than two samples
    pub frame_duration: Option<f64>,
    pub warnings: Vec<DiagnosticKind>,
}

/// Value rounded to `decimals`, as an integer count of that unit.
///
/// Comparing these avoids equality tests on rounded floats.
#[inline]
fn rounded_units(value: f64, decimals: i32) -> i64 {
    (value * 10f64.powi(decimals)).round() as i64
}

#[inline]
fn round_to(value: f64, decimals: i32) -> f64 {
    rounded_units(value, decimals) as f64 / 10f64.powi(decimals)
}

/// Check that trial time tracks recording time for every sample with a
/// successor (3 decimal places).
///
/// Returns one warning for the whole track, located at the first mismatch.
pub fn check_time_sync(track: &CoordinateTrack) -> Option<DiagnosticKind> {
    let n = track.len();
    let mut mismatches = track.samples[..n.saturating_sub(1)]
        .iter()
        .enumerate()
        .filter(|(_, s)| rounded_units(s.trial_time, 3) != rounded_units(s.recording_time, 3));

    let (index, first) = mismatches.next()?;
    Some(DiagnosticKind::TimeSync {
        index,
        trial_time: first.trial_time,
        recording_time: first.recording_time,
        count: 1 + mismatches.count(),
    })
}

/// Frame duration of the first frame rounded to 2 decimals, plus one warning
/// if any later frame's rounded duration differs from it.
pub fn check_frame_gaps(track: &CoordinateTrack) -> (Option<f64>, Option<DiagnosticKind>) {
    if track.len() < 2 {
        return (None, None);
    }

    let first = track.samples[1].recording_time - track.samples[0].recording_time;
    let expected_units = rounded_units(first, 2);
    let expected = round_to(first, 2);

    let mut gaps = track
        .samples
        .windows(2)
        .map(|pair| pair[1].recording_time - pair[0].recording_time)
        .enumerate()
        .filter(|(_, delta)| rounded_units(*delta, 2) != expected_units);

    let Some((index, delta)) = gaps.next() else {
        return (Some(expected), None);
    };
    let warning = DiagnosticKind::FrameGap {
        index,
        expected,
        observed: round_to(delta, 2),
        count: 1 + gaps.count(),
    };

    (Some(expected), Some(warning))
}

/// Turn a cleaned track and its metadata into a [`SubjectTrack`].
///
/// Timing problems are reported as warnings; the track is always returned.
pub fn normalize_track(
    track: &CoordinateTrack,
    metadata: &Metadata,
    options: &NormalizeOptions,
) -> NormalizedSubject {
    let filtered;
    let track = if options.drop_missing {
        filtered = CoordinateTrack::new(
            track
                .samples
                .iter()
                .filter(|s| !s.is_lost())
                .copied()
                .collect(),
        );
        &filtered
    } else {
        track
    };

    let (frame_duration, gap) = check_frame_gaps(track);
    let warnings: Vec<DiagnosticKind> = check_time_sync(track).into_iter().chain(gap).collect();

    let subject = SubjectTrack {
        subject_type: metadata.subject_type(),
        trial_time: track.samples.iter().map(|s| s.trial_time).collect(),
        x: track.xs(),
        y: track.ys(),
    };

    NormalizedSubject {
        track: subject,
        frame_duration,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::table::Sample;

    fn regular_track(n: usize, dt: f64) -> CoordinateTrack {
        CoordinateTrack::new(
            (0..n)
                .map(|i| {
                    let t = i as f64 * dt;
                    Sample::new(t, t, Some(i as f64), Some(-(i as f64)))
                })
                .collect(),
        )
    }

    #[test]
    fn test_clean_track_has_no_warnings() {
        let track = regular_track(50, 0.04);
        let result = normalize_track(&track, &Metadata::new(), &NormalizeOptions::default());

        assert!(result.warnings.is_empty());
        assert_eq!(result.frame_duration, Some(0.04));
        assert_eq!(result.track.len(), 50);
        assert_eq!(result.track.x_column(), "X_subject");
    }

    #[test]
    fn test_frame_gap_warning() {
        let mut track = regular_track(10, 0.04);
        // Sample 3 arrives a full frame late, doubling the 2->3 delta
        for s in track.samples[3..].iter_mut() {
            s.trial_time += 0.04;
            s.recording_time += 0.04;
        }

        let result = normalize_track(&track, &Metadata::new(), &NormalizeOptions::default());

        assert_eq!(result.frame_duration, Some(0.04));
        assert_eq!(
            result.warnings,
            vec![DiagnosticKind::FrameGap {
                index: 2,
                expected: 0.04,
                observed: 0.08,
                count: 1,
            }]
        );
        assert_eq!(result.track.len(), 10);
    }

    #[test]
    fn test_time_sync_warning() {
        let mut track = regular_track(5, 0.04);
        track.samples[2].trial_time = 0.5;

        let warning = check_time_sync(&track);
        assert!(matches!(
            warning,
            Some(DiagnosticKind::TimeSync { index: 2, count: 1, .. })
        ));
    }

    #[test]
    fn test_time_offset_reported_once() {
        let mut track = regular_track(5000, 0.04);
        for s in track.samples.iter_mut() {
            s.recording_time = s.trial_time + 2.0;
        }

        let result = normalize_track(&track, &Metadata::new(), &NormalizeOptions::default());

        assert_eq!(
            result.warnings,
            vec![DiagnosticKind::TimeSync {
                index: 0,
                trial_time: 0.0,
                recording_time: 2.0,
                count: 4999,
            }]
        );
    }

    #[test]
    fn test_repeated_frame_gaps_reported_once() {
        let mut track = regular_track(20, 0.04);
        // Every frame from sample 5 on lasts twice as long
        for (i, s) in track.samples.iter_mut().enumerate().skip(5) {
            let t = 0.16 + (i - 4) as f64 * 0.08;
            s.trial_time = t;
            s.recording_time = t;
        }

        let (duration, gap) = check_frame_gaps(&track);
        assert_eq!(duration, Some(0.04));
        assert!(matches!(
            gap,
            Some(DiagnosticKind::FrameGap { index: 4, count: 15, .. })
        ));
    }

    #[test]
    fn test_time_sync_ignores_last_sample() {
        let mut track = regular_track(4, 0.04);
        track.samples[3].trial_time = 9.0;
        assert!(check_time_sync(&track).is_none());
    }

    #[test]
    fn test_rounding_tolerates_float_noise() {
        let mut track = regular_track(4, 0.04);
        track.samples[2].recording_time += 1e-7;
        let (duration, gap) = check_frame_gaps(&track);
        assert_eq!(duration, Some(0.04));
        assert!(gap.is_none());
        assert!(check_time_sync(&track).is_none());
    }

    #[test]
    fn test_drop_missing_rows() {
        let mut track = regular_track(6, 0.04);
        track.samples[2].x = None;
        track.samples[2].y = None;
        track.samples[4].x = None;

        let options = NormalizeOptions { drop_missing: true };
        let result = normalize_track(&track, &Metadata::new(), &options);

        assert_eq!(result.track.len(), 5);
        assert_eq!(result.track.x[3], None);
        // Dropping a row leaves a visible hole in the timing
        assert!(result
            .warnings
            .iter()
            .any(|w| matches!(w, DiagnosticKind::FrameGap { index: 1, .. })));
    }

    #[test]
    fn test_subject_type_from_metadata() {
        let meta = Metadata::from_pairs(vec![("subject_type", "predator")]);
        let result = normalize_track(&regular_track(3, 0.04), &meta, &NormalizeOptions::default());
        assert_eq!(result.track.x_column(), "X_predator");
        assert_eq!(result.track.y_column(), "Y_predator");
    }

    #[test]
    fn test_single_sample_has_no_frame_duration() {
        let result = normalize_track(&regular_track(1, 0.04), &Metadata::new(), &NormalizeOptions::default());
        assert_eq!(result.frame_duration, None);
        assert!(result.warnings.is_empty());
    }
}
