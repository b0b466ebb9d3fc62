//! Data processing modules.

pub mod consolidator;
pub mod normalizer;
pub mod preprocess;
pub mod savgol;
pub mod trial;

// Re-export key types for convenience
pub use consolidator::{
    consolidate_trial, ConsolidatedTrial, ConsolidationError, ConsolidationOptions, SubjectInput,
};
pub use normalizer::{check_frame_gaps, check_time_sync, normalize_track, NormalizeOptions, NormalizedSubject};
pub use preprocess::{
    discover_files, preprocess_batch, preprocess_sheet, smooth_track, BatchSummary,
    IntermediatePaths, Lineage,
};
pub use savgol::{savitzky_golay, smooth_series, FilterError};
pub use trial::{
    default_output_path, load_trial, run_consolidation, write_report, TrialError, TrialReport,
};
