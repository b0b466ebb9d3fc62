//! Typed tables for each pipeline stage.
//!
//! A raw sheet is turned into a [`CoordinateTrack`] plus [`Metadata`], a
//! track is normalized into a [`SubjectTrack`], and the subject tracks of one
//! trial are merged into a [`TrialTable`]. Missing coordinates are `None`
//! everywhere; no stage uses a float sentinel.

/// Title of the marker column in row 0 of a raw sheet.
pub const MARKER_COLUMN_TITLE: &str = "Number of header lines:";

/// Marker-column value that opens the data block.
pub const DATA_SENTINEL: &str = "Trial time";

/// Metadata key after which trial-level independent variables are listed.
pub const IV_SENTINEL: &str = "User-defined Independent Variable";

/// Metadata key naming the subject type.
pub const SUBJECT_TYPE_KEY: &str = "subject_type";

/// Subject type used when the metadata does not name one.
pub const DEFAULT_SUBJECT_TYPE: &str = "subject";

pub const TRIAL_TIME_COLUMN: &str = "Trial time";
pub const RECORDING_TIME_COLUMN: &str = "Recording time";
pub const X_CENTER_COLUMN: &str = "X center";
pub const Y_CENTER_COLUMN: &str = "Y center";

/// Key column of a merged trial table.
pub const TRIALTIME_KEY: &str = "Trialtime";

/// A single spreadsheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
}

impl Cell {
    /// Cell from spreadsheet text; blank text is empty.
    ///
    /// Numeric-looking text stays text so identifiers like `007` keep their
    /// spelling. Time and coordinate columns parse it when read.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().is_empty() {
            Cell::Empty
        } else {
            Cell::Text(raw.to_string())
        }
    }

    /// True if the cell holds exactly `text` (ignoring surrounding whitespace).
    pub fn is_text(&self, text: &str) -> bool {
        matches!(self, Cell::Text(s) if s.trim() == text)
    }

    /// Cell content as a display string, `None` for empty cells.
    pub fn to_value_string(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Number(v) => Some(v.to_string()),
            Cell::Text(s) => Some(s.trim().to_string()),
        }
    }
}

/// Cell grid of one worksheet, row-major.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSheet {
    pub rows: Vec<Vec<Cell>>,
}

static EMPTY_CELL: Cell = Cell::Empty;

impl RawSheet {
    pub fn new(rows: Vec<Vec<Cell>>) -> Self {
        Self { rows }
    }

    /// Build a sheet from textual rows; blank cells become empty.
    pub fn from_text_rows<R, S>(rows: R) -> Self
    where
        R: IntoIterator,
        R::Item: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(|c| Cell::parse(c.as_ref())).collect())
            .collect();
        Self { rows }
    }

    #[inline]
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Cell at (row, col); out-of-range positions read as empty.
    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY_CELL)
    }
}

/// Normalize a metadata value: blank and `nan` become missing.
fn normalize_value(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Ordered name/value pairs read from the rows above the data block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    entries: Vec<(String, Option<String>)>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build metadata from string pairs; `"nan"` and blank values become missing.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let mut meta = Self::new();
        for (key, value) in pairs {
            meta.push(key, normalize_value(value.as_ref()));
        }
        meta
    }

    pub fn push(&mut self, key: impl Into<String>, value: Option<String>) {
        let value = value.and_then(|v| normalize_value(&v));
        self.entries.push((key.into().trim().to_string(), value));
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Value of the first entry named `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.as_deref())
    }

    /// Subject type label, defaulting to `"subject"`.
    pub fn subject_type(&self) -> String {
        self.get(SUBJECT_TYPE_KEY)
            .unwrap_or(DEFAULT_SUBJECT_TYPE)
            .to_string()
    }

    /// Independent variables listed after the IV sentinel that carry a value.
    ///
    /// The subject type is never returned even if it appears in that range.
    /// Without the sentinel there are no independent variables.
    pub fn independent_variables(&self) -> Vec<(String, String)> {
        let Some(start) = self.entries.iter().position(|(k, _)| k == IV_SENTINEL) else {
            return Vec::new();
        };

        self.entries[start + 1..]
            .iter()
            .filter(|(k, _)| k != SUBJECT_TYPE_KEY)
            .filter_map(|(k, v)| v.as_ref().map(|v| (k.clone(), v.clone())))
            .collect()
    }
}

/// One tracked sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub trial_time: f64,
    pub recording_time: f64,
    pub x: Option<f64>,
    pub y: Option<f64>,
}

impl Sample {
    pub fn new(trial_time: f64, recording_time: f64, x: Option<f64>, y: Option<f64>) -> Self {
        Self {
            trial_time,
            recording_time,
            x,
            y,
        }
    }

    /// True if neither coordinate is present.
    #[inline]
    pub fn is_lost(&self) -> bool {
        self.x.is_none() && self.y.is_none()
    }
}

/// Cleaned per-subject time series, ordered by trial time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoordinateTrack {
    pub samples: Vec<Sample>,
}

impl CoordinateTrack {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn xs(&self) -> Vec<Option<f64>> {
        self.samples.iter().map(|s| s.x).collect()
    }

    pub fn ys(&self) -> Vec<Option<f64>> {
        self.samples.iter().map(|s| s.y).collect()
    }

    /// Replace both coordinate series.
    ///
    /// # Panics
    ///
    /// Panics if either series length differs from the track length.
    pub fn set_coordinates(&mut self, xs: &[Option<f64>], ys: &[Option<f64>]) {
        assert_eq!(xs.len(), self.samples.len(), "x series length mismatch");
        assert_eq!(ys.len(), self.samples.len(), "y series length mismatch");
        for ((sample, &x), &y) in self.samples.iter_mut().zip(xs).zip(ys) {
            sample.x = x;
            sample.y = y;
        }
    }
}

/// Track of one subject with subject-namespaced column names.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectTrack {
    pub subject_type: String,
    pub trial_time: Vec<f64>,
    pub x: Vec<Option<f64>>,
    pub y: Vec<Option<f64>>,
}

impl SubjectTrack {
    #[inline]
    pub fn len(&self) -> usize {
        self.trial_time.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.trial_time.is_empty()
    }

    pub fn x_column(&self) -> String {
        format!("X_{}", self.subject_type)
    }

    pub fn y_column(&self) -> String {
        format!("Y_{}", self.subject_type)
    }
}

/// Named coordinate column of a trial table.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateColumn {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

/// Wide per-trial table keyed on `Trialtime`.
///
/// Independent variables are stored once and read as constant columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrialTable {
    pub(crate) trialtime: Vec<f64>,
    pub(crate) columns: Vec<CoordinateColumn>,
    pub(crate) constants: Vec<(String, String)>,
}

impl TrialTable {
    #[inline]
    pub fn num_rows(&self) -> usize {
        self.trialtime.len()
    }

    /// Column count including the key and constant columns.
    pub fn num_columns(&self) -> usize {
        1 + self.columns.len() + self.constants.len()
    }

    pub fn column_names(&self) -> Vec<String> {
        std::iter::once(TRIALTIME_KEY.to_string())
            .chain(self.columns.iter().map(|c| c.name.clone()))
            .chain(self.constants.iter().map(|(k, _)| k.clone()))
            .collect()
    }

    pub fn trialtime(&self) -> &[f64] {
        &self.trialtime
    }

    pub fn coordinate_columns(&self) -> &[CoordinateColumn] {
        &self.columns
    }

    pub fn coordinate(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    pub fn constants(&self) -> &[(String, String)] {
        &self.constants
    }

    /// Value of a constant column (identical on every row).
    pub fn constant(&self, name: &str) -> Option<&str> {
        self.constants
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_column(&self, name: &str) -> bool {
        name == TRIALTIME_KEY
            || self.columns.iter().any(|c| c.name == name)
            || self.constants.iter().any(|(k, _)| k == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_parse() {
        assert_eq!(Cell::parse(""), Cell::Empty);
        assert_eq!(Cell::parse("  "), Cell::Empty);
        assert_eq!(Cell::parse("007"), Cell::Text("007".to_string()));
        assert_eq!(Cell::parse("007").to_value_string().as_deref(), Some("007"));
        assert_eq!(Cell::parse("-"), Cell::Text("-".to_string()));
        assert!(Cell::parse("Trial time").is_text("Trial time"));
    }

    #[test]
    fn test_raw_sheet_out_of_range_cell_is_empty() {
        let sheet = RawSheet::from_text_rows(vec![vec!["a", "1"]]);
        assert_eq!(sheet.cell(0, 1), &Cell::Text("1".to_string()));
        assert_eq!(sheet.cell(0, 5), &Cell::Empty);
        assert_eq!(sheet.cell(9, 0), &Cell::Empty);
    }

    #[test]
    fn test_metadata_subject_type_default() {
        let meta = Metadata::from_pairs(vec![("Experiment", "E1")]);
        assert_eq!(meta.subject_type(), "subject");

        let meta = Metadata::from_pairs(vec![("subject_type", "prey")]);
        assert_eq!(meta.subject_type(), "prey");
    }

    #[test]
    fn test_independent_variables_skip_missing_and_subject_type() {
        let meta = Metadata::from_pairs(vec![
            ("Experiment", "E1"),
            (IV_SENTINEL, ""),
            ("Condition", "A"),
            ("Dose", "nan"),
            ("subject_type", "predator"),
            ("Arena", "2"),
        ]);

        let ivs = meta.independent_variables();
        assert_eq!(
            ivs,
            vec![
                ("Condition".to_string(), "A".to_string()),
                ("Arena".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn test_independent_variables_without_sentinel() {
        let meta = Metadata::from_pairs(vec![("Condition", "A")]);
        assert!(meta.independent_variables().is_empty());
    }

    #[test]
    fn test_subject_track_column_names() {
        let track = SubjectTrack {
            subject_type: "prey".to_string(),
            trial_time: vec![],
            x: vec![],
            y: vec![],
        };
        assert_eq!(track.x_column(), "X_prey");
        assert_eq!(track.y_column(), "Y_prey");
        assert!(track.is_empty());
    }
}
