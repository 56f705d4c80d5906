//! Record-level findings. None of these abort processing: a record is either
//! excluded and counted, or kept with a warning attached.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum RecordIssue {
    #[error("field '{field}' has unparseable numeric value '{raw}'")]
    MalformedNumericField { field: String, raw: String },

    #[error("malformed period: {details}")]
    MalformedPeriod { details: String },

    #[error("article '{code}' has no value")]
    MissingValue { code: String },

    #[error("article '{code}' resolved to fallback department '{fallback}' (no Department row precedes it)")]
    MissingAncestorContext { code: String, fallback: String },

    #[error("article '{code}' duplicates an earlier record ({value:.2} dropped)")]
    DuplicateRecord { code: String, value: f64 },

    #[error("source was already loaded; skipping")]
    DuplicateSource,
}

impl RecordIssue {
    /// Whether the affected record is left out of the leaf table.
    pub fn excludes_record(&self) -> bool {
        !matches!(self, RecordIssue::MissingAncestorContext { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub source: String,
    /// Row position in the source; `None` for file-level findings.
    pub ordinal: Option<usize>,
    pub issue: RecordIssue,
}

impl Diagnostic {
    pub fn for_row(source: &str, ordinal: usize, issue: RecordIssue) -> Self {
        Self {
            source: source.to_string(),
            ordinal: Some(ordinal),
            issue,
        }
    }

    pub fn for_source(source: &str, issue: RecordIssue) -> Self {
        Self {
            source: source.to_string(),
            ordinal: None,
            issue,
        }
    }
}

/// Per-source counters collected during propagation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceCounts {
    pub rows: usize,
    pub departments: usize,
    pub classes: usize,
    pub categories: usize,
    pub articles: usize,
    pub unknown: usize,
    pub leaf_records: usize,
    pub malformed_numeric: usize,
    pub malformed_period: usize,
    pub missing_value: usize,
    pub missing_ancestor_context: usize,
    /// Sum of parseable values on article rows that were excluded with a
    /// recorded diagnostic (period or quantity problems).
    pub excluded_value: f64,
}

impl SourceCounts {
    pub fn excluded_records(&self) -> usize {
        self.malformed_numeric + self.malformed_period + self.missing_value
    }

    pub fn absorb(&mut self, other: &SourceCounts) {
        self.rows += other.rows;
        self.departments += other.departments;
        self.classes += other.classes;
        self.categories += other.categories;
        self.articles += other.articles;
        self.unknown += other.unknown;
        self.leaf_records += other.leaf_records;
        self.malformed_numeric += other.malformed_numeric;
        self.malformed_period += other.malformed_period;
        self.missing_value += other.missing_value;
        self.missing_ancestor_context += other.missing_ancestor_context;
        self.excluded_value += other.excluded_value;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceDiagnostics {
    pub source: String,
    pub counts: SourceCounts,
    pub entries: Vec<Diagnostic>,
}

/// Diagnostics for a whole run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsReport {
    pub sources: Vec<SourceDiagnostics>,
    pub totals: SourceCounts,
    pub duplicate_sources: usize,
    pub duplicate_records: usize,
    /// Value of duplicate leaf records dropped during merging.
    pub duplicate_value: f64,
    /// Entries not tied to a single propagation pass (duplicate sources and records).
    pub merge_entries: Vec<Diagnostic>,
}

impl DiagnosticsReport {
    /// Value the pipeline knowingly left out of the leaf table.
    pub fn excluded_value(&self) -> f64 {
        self.totals.excluded_value + self.duplicate_value
    }

    pub fn all_entries(&self) -> impl Iterator<Item = &Diagnostic> {
        self.sources
            .iter()
            .flat_map(|s| s.entries.iter())
            .chain(self.merge_entries.iter())
    }

    pub fn count_where(&self, predicate: impl Fn(&RecordIssue) -> bool) -> usize {
        self.all_entries().filter(|d| predicate(&d.issue)).count()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} rows in {} sources: {} leaf records, {} unknown rows, {} malformed numeric, {} malformed period, {} missing value, {} fallback department, {} duplicate records, {} duplicate sources",
            self.totals.rows,
            self.sources.len(),
            self.totals.leaf_records,
            self.totals.unknown,
            self.totals.malformed_numeric,
            self.totals.malformed_period,
            self.totals.missing_value,
            self.totals.missing_ancestor_context,
            self.duplicate_records,
            self.duplicate_sources,
        )
    }
}
