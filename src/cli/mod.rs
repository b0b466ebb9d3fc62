//! Command-line interface for the tracking pipeline.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::PathBuf;
use std::time::Instant;

use crate::core::loaders::XlsxSheetSource;
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "etho-pipeline")]
#[command(about = "Behavioral tracking preprocessing and trial consolidation", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean raw tracking workbooks into per-subject intermediate tables
    Preprocess {
        /// Directory containing the raw workbooks
        #[arg(long)]
        rawfilepath: Option<PathBuf>,
        /// File name pattern selecting raw workbooks
        #[arg(long)]
        pattern: Option<String>,
        /// Directory for intermediate tables
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Write smoothed tracks
        #[arg(long)]
        smooth: bool,
        /// Write unsmoothed tracks
        #[arg(long)]
        unsmoothed: bool,
        /// Smoothing window size (odd)
        #[arg(long)]
        window_size: Option<usize>,
        /// Smoothing polynomial order
        #[arg(long)]
        order: Option<usize>,
        /// Number of sheets (subjects) per workbook
        #[arg(long)]
        subjects: Option<usize>,
    },

    /// Merge the intermediate tables of one trial into a single table
    Consolidate {
        /// Trial identifier as it appears in the raw file name
        trial_id: Option<String>,
        /// Output CSV path (defaults to trial_<id>.csv in the intermediate directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Use the smoothed lineage
        #[arg(long)]
        smoothed: bool,
        /// Number of subjects in the trial
        #[arg(long)]
        subjects: Option<usize>,
        /// Fail when subjects cover different time keys
        #[arg(long)]
        strict: bool,
        /// Drop rows where both coordinates are missing
        #[arg(long)]
        drop_missing: bool,
    },

    /// Plot the trajectories of one trial as a PNG
    Visualize {
        /// Trial identifier as it appears in the raw file name
        trial_id: Option<String>,
        /// Output PNG file path (defaults to trial_<id>.png in the intermediate directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Use the smoothed lineage
        #[arg(long)]
        smoothed: bool,
        /// Maximum number of points per subject (subsamples if exceeded)
        #[arg(long, default_value_t = 100_000)]
        max_points: usize,
    },

    /// Write a config file with all defaults
    InitConfig {
        /// Destination of the YAML file
        #[arg(default_value = "pipeline.yaml")]
        path: PathBuf,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            format!("{}...", value.chars().take(36).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Load config
    let mut config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("Failed to load config from {}: {}, using defaults", path.display(), e);
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    // Dispatch to subcommands
    match cli.command {
        Commands::Preprocess {
            rawfilepath,
            pattern,
            output_dir,
            smooth,
            unsmoothed,
            window_size,
            order,
            subjects,
        } => {
            if let Some(dir) = rawfilepath {
                config.paths.rawfilepath = dir;
            }
            if let Some(pattern) = pattern {
                config.paths.raw_pattern = pattern;
            }
            if let Some(dir) = output_dir {
                config.paths.intermediate_dir = dir;
            }
            config.preprocessing.smoothe_all |= smooth;
            config.preprocessing.extract_all_unsmoothed |= unsmoothed;
            if let Some(w) = window_size {
                config.smoothing.window_size = w;
            }
            if let Some(o) = order {
                config.smoothing.order = o;
            }
            if let Some(n) = subjects {
                config.consolidation.subjects_per_trial = n;
            }
            cmd_preprocess(&config);
        }
        Commands::Consolidate {
            trial_id,
            output,
            smoothed,
            subjects,
            strict,
            drop_missing,
        } => {
            apply_trial_overrides(&mut config, trial_id, smoothed, subjects);
            config.consolidation.require_matching_keys |= strict;
            config.consolidation.drop_missing_rows |= drop_missing;
            cmd_consolidate(&config, output);
        }
        Commands::Visualize {
            trial_id,
            output,
            smoothed,
            max_points,
        } => {
            apply_trial_overrides(&mut config, trial_id, smoothed, None);
            cmd_visualize(&config, output, max_points);
        }
        Commands::InitConfig { path } => {
            cmd_init_config(&config, &path);
        }
    }
}

fn apply_trial_overrides(
    config: &mut PipelineConfig,
    trial_id: Option<String>,
    smoothed: bool,
    subjects: Option<usize>,
) {
    if let Some(id) = trial_id {
        config.consolidation.trial_id = id;
    }
    config.consolidation.use_smoothed_data |= smoothed;
    if let Some(n) = subjects {
        config.consolidation.subjects_per_trial = n;
    }
    if config.consolidation.trial_id.is_empty() {
        error!("No trial id given on the command line or in the config");
        std::process::exit(1);
    }
}

fn cmd_preprocess(config: &PipelineConfig) {
    use crate::processors::preprocess;

    let start = Instant::now();

    println!("Preprocessing raw tracking files...");
    println!("Input directory: {}", config.paths.rawfilepath.display());
    println!("Output directory: {}", config.paths.intermediate_path().display());
    println!("Smoothed: {}", config.preprocessing.smoothe_all);
    println!("Unsmoothed: {}", config.preprocessing.extract_all_unsmoothed);

    let spinner = create_spinner("Cleaning sheets...");

    match preprocess::preprocess_batch(config, &XlsxSheetSource) {
        Ok(summary) => {
            spinner.finish_and_clear();

            print_summary(
                "Preprocessing Complete",
                &[
                    ("Input directory", config.paths.rawfilepath.display().to_string()),
                    ("Files", summary.files.to_string()),
                    ("Sheets processed", summary.sheets_processed.to_string()),
                    ("Tables written", summary.tables_written.to_string()),
                    ("Failed sheets", summary.failures.len().to_string()),
                    ("Diagnostics", summary.diagnostics.len().to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );

            for failure in &summary.failures {
                println!(
                    "  failed: {} sheet {}: {}",
                    failure.path.display(),
                    failure.sheet,
                    failure.message
                );
            }
        }
        Err(e) => {
            spinner.finish_and_clear();
            error!("Preprocessing failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_consolidate(config: &PipelineConfig, output: Option<PathBuf>) {
    use crate::processors::trial;

    let start = Instant::now();

    let output_path = output.unwrap_or_else(|| trial::default_output_path(config));

    println!("Consolidating trial {}...", config.consolidation.trial_id);
    println!("Intermediate directory: {}", config.paths.intermediate_path().display());
    println!("Output: {}", output_path.display());

    let spinner = create_spinner("Merging subject tracks...");

    match trial::run_consolidation(config, &output_path) {
        Ok((consolidated, report_path)) => {
            spinner.finish_and_clear();

            let frame_duration = consolidated
                .frame_duration
                .map_or_else(|| "n/a".to_string(), |d| d.to_string());

            print_summary(
                "Consolidation Complete",
                &[
                    ("Trial", consolidated.trial_id.clone()),
                    ("Output CSV", output_path.display().to_string()),
                    ("Report", report_path.display().to_string()),
                    ("Rows", consolidated.table.num_rows().to_string()),
                    ("Columns", consolidated.table.num_columns().to_string()),
                    ("Frame duration", frame_duration),
                    ("Diagnostics", consolidated.diagnostics.len().to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            spinner.finish_and_clear();
            error!("Consolidation failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_visualize(config: &PipelineConfig, output: Option<PathBuf>, max_points: usize) {
    use crate::processors::trial;
    use crate::visualization;

    let start = Instant::now();

    let output_path = output.unwrap_or_else(|| {
        let mut path = trial::default_output_path(config);
        path.set_extension("png");
        path
    });

    println!("Visualizing trial {}...", config.consolidation.trial_id);
    println!("Output: {}", output_path.display());
    println!("Max points: {}", max_points);

    let spinner = create_spinner("Loading trial...");

    let consolidated = match trial::load_trial(config) {
        Ok(t) => t,
        Err(e) => {
            spinner.finish_and_clear();
            error!("Failed to load trial: {}", e);
            std::process::exit(1);
        }
    };

    spinner.set_message("Generating plot...");

    match visualization::plot_trial(&output_path, &consolidated.table, max_points) {
        Ok(()) => {
            spinner.finish_and_clear();

            print_summary(
                "Visualization Complete",
                &[
                    ("Trial", consolidated.trial_id.clone()),
                    ("Output PNG", output_path.display().to_string()),
                    ("Rows", consolidated.table.num_rows().to_string()),
                    ("Max points plotted", max_points.to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            spinner.finish_and_clear();
            error!("Visualization failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_init_config(config: &PipelineConfig, path: &PathBuf) {
    if path.exists() {
        error!("Refusing to overwrite existing file: {}", path.display());
        std::process::exit(1);
    }

    match config.to_yaml(path) {
        Ok(()) => println!("Wrote config to {}", path.display()),
        Err(e) => {
            error!("Failed to write config: {}", e);
            std::process::exit(1);
        }
    }
}
