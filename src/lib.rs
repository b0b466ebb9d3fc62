//! Preprocessing and consolidation pipeline for behavioral tracking exports.
//!
//! This crate provides tools for:
//! - Cleaning raw tracking spreadsheets into per-subject coordinate tables
//! - Savitzky-Golay smoothing of coordinate series
//! - Validating trial timing and merging subjects into one table per trial
//! - Plotting consolidated trajectories
//!
//! # Example
//!
//! ```no_run
//! use etho_pipeline::{processors::trial::load_trial, PipelineConfig};
//!
//! let mut config = PipelineConfig::default();
//! config.consolidation.trial_id = "7".to_string();
//! let trial = load_trial(&config).unwrap();
//! println!("{} rows", trial.table.num_rows());
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;
pub mod visualization;

pub use config::{
    CleaningConfig, ConsolidationConfig, PathsConfig, PipelineConfig, PreprocessingConfig,
    SmoothingConfig,
};
pub use core::table::{CoordinateTrack, Metadata, TrialTable};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
