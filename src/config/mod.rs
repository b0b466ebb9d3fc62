//! Configuration types for the tracking pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Locations of raw and intermediate files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory containing the raw tracking exports
    #[serde(default = "default_rawfilepath")]
    pub rawfilepath: PathBuf,

    /// Directory for intermediate per-subject tables.
    /// Relative paths are resolved against `rawfilepath`.
    #[serde(default = "default_intermediate_dir")]
    pub intermediate_dir: PathBuf,

    /// Glob pattern (only `*` and `?` wildcards) selecting raw workbooks
    #[serde(default = "default_raw_pattern")]
    pub raw_pattern: String,
}

fn default_rawfilepath() -> PathBuf {
    PathBuf::from(".")
}

fn default_intermediate_dir() -> PathBuf {
    PathBuf::from("preprocessed_tracks")
}

fn default_raw_pattern() -> String {
    "*Trial*.xlsx".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            rawfilepath: default_rawfilepath(),
            intermediate_dir: default_intermediate_dir(),
            raw_pattern: default_raw_pattern(),
        }
    }
}

impl PathsConfig {
    /// Resolved directory holding the intermediate tables.
    pub fn intermediate_path(&self) -> PathBuf {
        if self.intermediate_dir.is_absolute() {
            self.intermediate_dir.clone()
        } else {
            self.rawfilepath.join(&self.intermediate_dir)
        }
    }
}

/// Options controlling how raw sheets are cleaned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleaningConfig {
    /// Number of rows forming the column header block, starting at the
    /// "Trial time" row (header + units row in most exports)
    #[serde(default = "default_header_rows")]
    pub header_rows: usize,

    /// Placeholder the instrument writes for lost samples
    #[serde(default = "default_missing_marker")]
    pub missing_marker: String,

    /// Longest run of missing samples that is interpolated
    #[serde(default = "default_interpolation_limit")]
    pub interpolation_limit: usize,
}

fn default_header_rows() -> usize {
    2
}

fn default_missing_marker() -> String {
    "-".to_string()
}

fn default_interpolation_limit() -> usize {
    5
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            header_rows: default_header_rows(),
            missing_marker: default_missing_marker(),
            interpolation_limit: default_interpolation_limit(),
        }
    }
}

/// Savitzky-Golay filter settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmoothingConfig {
    /// Window length in samples, must be odd
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Order of the fitted polynomial
    #[serde(default = "default_order")]
    pub order: usize,

    /// Derivative order (0 smooths only)
    #[serde(default)]
    pub derivative: usize,

    /// Sampling rate used to scale derivatives
    #[serde(default = "default_rate")]
    pub rate: f64,
}

fn default_window_size() -> usize {
    5
}

fn default_order() -> usize {
    3
}

fn default_rate() -> f64 {
    1.0
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            order: default_order(),
            derivative: 0,
            rate: default_rate(),
        }
    }
}

/// Batch preprocessing switches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    /// Write smoothed copies of every track
    #[serde(default)]
    pub smoothe_all: bool,

    /// Write unsmoothed copies of every track
    #[serde(default)]
    pub extract_all_unsmoothed: bool,
}

/// Trial consolidation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationConfig {
    /// Number of tracked subjects (sheets) per trial
    #[serde(default = "default_subjects_per_trial")]
    pub subjects_per_trial: usize,

    /// Read the smoothed lineage instead of the unsmoothed one
    #[serde(default)]
    pub use_smoothed_data: bool,

    /// Trial identifier as it appears in the raw file name
    #[serde(default)]
    pub trial_id: String,

    /// Drop rows where both coordinates are missing before merging
    #[serde(default)]
    pub drop_missing_rows: bool,

    /// Fail instead of intersecting when subjects cover different time keys
    #[serde(default)]
    pub require_matching_keys: bool,
}

fn default_subjects_per_trial() -> usize {
    2
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            subjects_per_trial: default_subjects_per_trial(),
            use_smoothed_data: false,
            trial_id: String::new(),
            drop_missing_rows: false,
            require_matching_keys: false,
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub cleaning: CleaningConfig,

    #[serde(default)]
    pub smoothing: SmoothingConfig,

    #[serde(default)]
    pub preprocessing: PreprocessingConfig,

    #[serde(default)]
    pub consolidation: ConsolidationConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pipeline_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.cleaning.interpolation_limit, 5);
        assert_eq!(config.smoothing.window_size, 5);
        assert_eq!(config.smoothing.order, 3);
        assert_eq!(config.paths.raw_pattern, "*Trial*.xlsx");
        assert!(!config.consolidation.require_matching_keys);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "consolidation:\n  trial_id: \"7\"\n  subjects_per_trial: 3\n";
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.consolidation.trial_id, "7");
        assert_eq!(config.consolidation.subjects_per_trial, 3);
        assert_eq!(config.cleaning.header_rows, 2);
        assert_eq!(config.cleaning.missing_marker, "-");
    }

    #[test]
    fn test_yaml_round_trip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.yaml");

        let mut config = PipelineConfig::default();
        config.preprocessing.smoothe_all = true;
        config.to_yaml(&path).unwrap();

        let loaded = PipelineConfig::from_yaml(&path).unwrap();
        assert!(loaded.preprocessing.smoothe_all);
    }

    #[test]
    fn test_intermediate_path_resolution() {
        let mut paths = PathsConfig {
            rawfilepath: PathBuf::from("/data/raw"),
            ..PathsConfig::default()
        };
        assert_eq!(
            paths.intermediate_path(),
            PathBuf::from("/data/raw/preprocessed_tracks")
        );

        paths.intermediate_dir = PathBuf::from("/scratch/tracks");
        assert_eq!(paths.intermediate_path(), PathBuf::from("/scratch/tracks"));
    }
}
