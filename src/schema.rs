use crate::error::{ConsumptionError, Result};
use crate::utils::{month_name, parse_source_path};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// A single cell as handed over by the file reader. Spreadsheet readers yield
/// numbers, CSV readers yield text; both are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Empty,
    Number(f64),
    Text(String),
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

/// One input row, keyed by the header names of its source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    /// 0-based position within the source file. Order is meaningful.
    pub ordinal: usize,
    pub cells: BTreeMap<String, CellValue>,
}

impl RawRow {
    pub fn new(ordinal: usize) -> Self {
        Self {
            ordinal,
            cells: BTreeMap::new(),
        }
    }

    pub fn with_cell(mut self, header: &str, value: impl Into<CellValue>) -> Self {
        self.cells.insert(header.to_string(), value.into());
        self
    }

    pub fn get(&self, header: &str) -> Option<&CellValue> {
        self.cells.get(header)
    }
}

/// Identity of one export file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceFile {
    /// Unique identifier of the file (usually its path).
    pub name: String,
    /// Department attributed to articles that appear before any Department row.
    pub fallback_department: String,
    /// Month encoded in the file name (`details_04_...`), used when rows carry no month.
    pub month_hint: Option<String>,
    /// Year encoded in the file or directory name.
    pub year_hint: Option<String>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, fallback_department: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fallback_department: fallback_department.into().trim().to_string(),
            month_hint: None,
            year_hint: None,
        }
    }

    /// Derives the fallback department and period hints from an export path
    /// such as `consumi/BAR_Consumi_2024/details_04_BAR_APRILE_2024.csv`.
    pub fn from_path(path: &Path) -> Self {
        let parsed = parse_source_path(path);
        Self {
            name: path.to_string_lossy().to_string(),
            fallback_department: parsed.department,
            month_hint: parsed.month,
            year_hint: parsed.year,
        }
    }

    pub fn with_month_hint(mut self, month: impl Into<String>) -> Self {
        self.month_hint = Some(month.into());
        self
    }

    pub fn with_year_hint(mut self, year: impl Into<String>) -> Self {
        self.year_hint = Some(year.into());
        self
    }

    /// The department used when no explicit Department row is in scope. Never empty.
    pub fn fallback(&self) -> &str {
        if self.fallback_department.is_empty() {
            &self.name
        } else {
            &self.fallback_department
        }
    }
}

/// All rows of one source file, in file order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceBatch {
    pub source: SourceFile,
    pub rows: Vec<RawRow>,
}

impl SourceBatch {
    pub fn new(source: SourceFile, rows: Vec<RawRow>) -> Self {
        Self { source, rows }
    }
}

/// Hierarchy level of a row. `Unknown` is a valid terminal classification
/// (blank separators, totals lines), never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum RowKind {
    Department,
    Class,
    Category,
    Article,
    Unknown,
}

impl RowKind {
    pub fn label(&self) -> &'static str {
        match self {
            RowKind::Department => "Department",
            RowKind::Class => "Class",
            RowKind::Category => "Category",
            RowKind::Article => "Article",
            RowKind::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for RowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct Period {
    pub year: i32,
    #[schemars(description = "Calendar month, 1 = January")]
    pub month: u32,
}

impl Period {
    /// `YYYY-MM`
    pub fn label(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }

    pub fn month_padded(&self) -> String {
        format!("{:02}", self.month)
    }

    pub fn month_name(&self, names: MonthNames) -> &'static str {
        month_name(self.month, names).unwrap_or("")
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Where a leaf record's department came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum AncestorOrigin {
    #[schemars(description = "A Department row preceded the article in its file")]
    Explicit,

    #[schemars(description = "No Department row preceded the article; the department was derived from the source file")]
    FileFallback,
}

/// A fully resolved Article-level record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LeafRecord {
    #[schemars(description = "Identifier of the source file the article was read from")]
    pub source: String,

    #[schemars(description = "0-based row position within the source file")]
    pub ordinal: usize,

    #[schemars(description = "Resolved department, never empty")]
    pub department: String,

    #[schemars(description = "Resolved class, empty when no Class row was in scope")]
    pub class: String,

    #[schemars(description = "Resolved category, empty when no Category row was in scope")]
    pub category: String,

    pub code: String,
    pub description: String,

    #[schemars(description = "Consumption value in currency units")]
    pub value: f64,

    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub period: Period,
    pub origin: AncestorOrigin,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[schemars(description = "Source columns outside the canonical field set, passed through unchanged")]
    pub extras: BTreeMap<String, String>,
}

impl LeafRecord {
    pub fn ancestor_path(&self) -> (&str, &str, &str) {
        (&self.department, &self.class, &self.category)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(LeafRecord)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::generate_json_schema())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum MonthNames {
    #[default]
    English,
    Italian,
}

fn default_tolerance() -> f64 {
    0.01
}

fn default_true() -> bool {
    true
}

fn default_top_n() -> usize {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PipelineConfig {
    #[serde(default = "default_tolerance")]
    #[schemars(description = "Absolute tolerance, in currency units, for reconciliation comparisons")]
    pub tolerance: f64,

    #[serde(default)]
    #[schemars(description = "Year applied when neither the row nor the source file carries one")]
    pub default_year: Option<i32>,

    #[serde(default)]
    #[schemars(
        description = "Drop a leaf record identical to one already taken from a different source file. Dropped value fails reconciliation"
    )]
    pub deduplicate: bool,

    #[serde(default = "default_true")]
    #[schemars(description = "Propagate independent source files on the rayon thread pool")]
    pub parallel_sources: bool,

    #[serde(default = "default_top_n")]
    #[schemars(description = "Number of entries in the top-N summary views")]
    pub top_n: usize,

    #[serde(default)]
    pub month_names: MonthNames,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
            default_year: None,
            deduplicate: false,
            parallel_sources: true,
            top_n: default_top_n(),
            month_names: MonthNames::default(),
        }
    }
}

impl PipelineConfig {
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_default_year(mut self, year: i32) -> Self {
        self.default_year = Some(year);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(ConsumptionError::InvalidTolerance(self.tolerance));
        }
        if self.top_n == 0 {
            return Err(ConsumptionError::InvalidConfig(
                "top_n must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(PipelineConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::generate_json_schema())
    }
}
