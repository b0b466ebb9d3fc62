use std::fs::{self, File};
use std::path::Path;

use etho_pipeline::core::loaders::{self, LoaderError, SheetSource};
use etho_pipeline::core::table::RawSheet;
use etho_pipeline::processors::preprocess::preprocess_batch;
use etho_pipeline::processors::trial::{
    default_output_path, load_trial, run_consolidation, TrialError, TrialReport,
};
use etho_pipeline::PipelineConfig;
use tempfile::TempDir;

/// One workbook held in memory.
struct Workbook {
    sheets: Vec<RawSheet>,
}

impl SheetSource for Workbook {
    fn sheet_count(&self, _path: &Path) -> loaders::Result<usize> {
        Ok(self.sheets.len())
    }

    fn read_sheet(&self, path: &Path, sheet_no: usize) -> loaders::Result<RawSheet> {
        self.sheets
            .get(sheet_no)
            .cloned()
            .ok_or_else(|| LoaderError::SheetNotFound {
                path: path.to_path_buf(),
                sheet_no,
            })
    }
}

fn raw_sheet(subject_type: &str, condition: &str, xs: &[&str], y: &str) -> RawSheet {
    let mut rows: Vec<Vec<String>> = vec![
        vec!["Number of header lines:".into(), "36".into()],
        vec!["Experiment".into(), "Predation".into()],
        vec!["subject_type".into(), subject_type.into()],
        vec!["User-defined Independent Variable".into(), "".into()],
        vec!["Condition".into(), condition.into()],
        vec!["Dose".into(), "".into()],
        vec![
            "Trial time".into(),
            "Recording time".into(),
            "X center".into(),
            "Y center".into(),
        ],
        vec!["s".into(), "s".into(), "cm".into(), "cm".into()],
    ];
    for (i, x) in xs.iter().enumerate() {
        let t = format!("{:.2}", i as f64 * 0.04);
        rows.push(vec![t.clone(), t, x.to_string(), y.to_string()]);
    }
    RawSheet::from_text_rows(rows)
}

fn setup(dir: &Path) -> (PipelineConfig, Workbook) {
    File::create(dir.join("Raw data-Predation-Trial     7.xlsx")).unwrap();
    File::create(dir.join("notes.txt")).unwrap();

    let workbook = Workbook {
        sheets: vec![
            raw_sheet("prey", "light", &["1", "2", "-", "4", "5", "6", "7"], "10"),
            raw_sheet("predator", "light", &["20", "21", "22", "23", "24", "25", "26"], "-5"),
        ],
    };

    let mut config = PipelineConfig::default();
    config.paths.rawfilepath = dir.to_path_buf();
    config.preprocessing.smoothe_all = true;
    config.preprocessing.extract_all_unsmoothed = true;
    config.consolidation.trial_id = "7".to_string();

    (config, workbook)
}

#[test]
fn test_preprocess_then_consolidate() {
    let temp_dir = TempDir::new().unwrap();
    let (config, workbook) = setup(temp_dir.path());

    let summary = preprocess_batch(&config, &workbook).unwrap();
    assert_eq!(summary.files, 1);
    assert_eq!(summary.sheets_processed, 2);
    assert_eq!(summary.tables_written, 6);
    assert!(summary.failures.is_empty());

    let trial = load_trial(&config).unwrap();
    let table = &trial.table;

    assert_eq!(table.num_rows(), 7);
    assert_eq!(
        table.column_names(),
        vec!["Trialtime", "X_prey", "Y_prey", "X_predator", "Y_predator", "Condition"]
    );
    assert_eq!(table.constant("Condition"), Some("light"));
    assert_eq!(trial.frame_duration, Some(0.04));
    assert!(trial.is_clean(), "{:?}", trial.diagnostics);

    // The interior gap is interpolated during cleaning
    let x_prey = table.coordinate("X_prey").unwrap();
    assert!((x_prey[2].unwrap() - 3.0).abs() < 1e-9);
}

#[test]
fn test_smoothed_lineage_reproduces_linear_tracks() {
    let temp_dir = TempDir::new().unwrap();
    let (mut config, workbook) = setup(temp_dir.path());
    preprocess_batch(&config, &workbook).unwrap();

    config.consolidation.use_smoothed_data = true;
    let trial = load_trial(&config).unwrap();

    let x_predator = trial.table.coordinate("X_predator").unwrap();
    for (i, x) in x_predator.iter().enumerate() {
        assert!((x.unwrap() - (20.0 + i as f64)).abs() < 1e-4);
    }
    let y_prey = trial.table.coordinate("Y_prey").unwrap();
    assert!(y_prey.iter().all(|y| (y.unwrap() - 10.0).abs() < 1e-4));
}

#[test]
fn test_run_consolidation_outputs() {
    let temp_dir = TempDir::new().unwrap();
    let (config, workbook) = setup(temp_dir.path());
    preprocess_batch(&config, &workbook).unwrap();

    let output = default_output_path(&config);
    let (trial, report_path) = run_consolidation(&config, &output).unwrap();

    let content = fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 1 + trial.table.num_rows());
    assert_eq!(
        lines[0],
        "Trialtime\tX_prey\tY_prey\tX_predator\tY_predator\tCondition"
    );
    assert!(lines[1].starts_with("0.00000\t1.00000\t10.00000\t20.00000\t-5.00000\tlight"));

    let report: TrialReport =
        serde_yaml::from_str(&fs::read_to_string(report_path).unwrap()).unwrap();
    assert_eq!(report.trial_id, "7");
    assert_eq!(report.rows, 7);
    assert!(report.clean);
}

#[test]
fn test_unknown_trial_reports_missing_sheet() {
    let temp_dir = TempDir::new().unwrap();
    let (mut config, workbook) = setup(temp_dir.path());
    preprocess_batch(&config, &workbook).unwrap();

    config.consolidation.trial_id = "8".to_string();
    let err = load_trial(&config).unwrap_err();

    assert!(matches!(
        err,
        TrialError::MissingIntermediate { sheet: 0, .. }
    ));
    let message = err.to_string();
    assert!(message.contains("trial 8"));
    assert!(message.contains("sheet 0"));
}
