//! Core data types and I/O operations.

pub mod diagnostics;
pub mod loaders;
pub mod sheet;
pub mod table;
pub mod writers;

pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticLog};
pub use loaders::{load_metadata_csv, load_track_csv, LoaderError, SheetSource, XlsxSheetSource};
pub use sheet::{clean_sheet, interpolate_gaps, SheetFormatError};
pub use table::{CoordinateTrack, Metadata, RawSheet, Sample, SubjectTrack, TrialTable};
pub use writers::{write_metadata_csv, write_track_csv, write_trial_table, WriteError};
