use crate::classifier::matching_rule;
use crate::diagnostics::{Diagnostic, RecordIssue, SourceCounts, SourceDiagnostics};
use crate::normalizer::{ColumnMap, NormalizedRow, Normalizer, NumericField, PeriodField};
use crate::schema::{AncestorOrigin, LeafRecord, PipelineConfig, RawRow, RowKind, SourceBatch, SourceFile};
use log::{debug, trace, warn};
use rayon::prelude::*;
use std::borrow::Borrow;

/// Ancestors in scope at a given point of a file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HierarchyState {
    pub department: Option<String>,
    pub class: Option<String>,
    pub category: Option<String>,
}

impl HierarchyState {
    /// Next state after reading a row of the given kind. Articles and unknown
    /// rows leave the state untouched.
    pub fn transition(self, kind: RowKind, row: &NormalizedRow) -> Self {
        match kind {
            RowKind::Department => Self {
                department: row.department.clone(),
                class: None,
                category: None,
            },
            RowKind::Class => Self {
                class: row.class.clone(),
                category: None,
                ..self
            },
            RowKind::Category => Self {
                category: row.category.clone(),
                ..self
            },
            RowKind::Article | RowKind::Unknown => self,
        }
    }

    pub fn resolve(&self, fallback: &str) -> (String, String, String, AncestorOrigin) {
        let (department, origin) = match &self.department {
            Some(d) => (d.clone(), AncestorOrigin::Explicit),
            None => (fallback.to_string(), AncestorOrigin::FileFallback),
        };
        (
            department,
            self.class.clone().unwrap_or_default(),
            self.category.clone().unwrap_or_default(),
            origin,
        )
    }
}

/// A classified row stamped with its ancestors. Only lives for the duration
/// of one file's pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRecord {
    pub kind: RowKind,
    pub row: NormalizedRow,
    pub department: String,
    pub class: String,
    pub category: String,
    pub origin: AncestorOrigin,
}

/// Result of propagating one source file.
#[derive(Debug, Clone, PartialEq)]
pub struct FilePropagation {
    pub source: String,
    pub leaves: Vec<LeafRecord>,
    pub diagnostics: SourceDiagnostics,
}

// Accumulator threaded through the fold
struct Propagation<'s> {
    source: &'s SourceFile,
    state: HierarchyState,
    leaves: Vec<LeafRecord>,
    counts: SourceCounts,
    entries: Vec<Diagnostic>,
}

impl<'s> Propagation<'s> {
    fn new(source: &'s SourceFile) -> Self {
        Self {
            source,
            state: HierarchyState::default(),
            leaves: Vec::new(),
            counts: SourceCounts::default(),
            entries: Vec::new(),
        }
    }

    fn step(mut self, row: NormalizedRow) -> Self {
        self.counts.rows += 1;
        let rule = matching_rule(&row.presence());
        let kind = rule.map_or(RowKind::Unknown, |r| r.kind);
        trace!(
            "{} row {}: {} ({})",
            self.source.name,
            row.ordinal,
            kind,
            rule.map_or("no rule matched", |r| r.description)
        );
        match kind {
            RowKind::Department => self.counts.departments += 1,
            RowKind::Class => self.counts.classes += 1,
            RowKind::Category => self.counts.categories += 1,
            RowKind::Article => self.counts.articles += 1,
            RowKind::Unknown => self.counts.unknown += 1,
        }

        self.state = self.state.transition(kind, &row);

        if kind == RowKind::Article {
            let (department, class, category, origin) = self.state.resolve(self.source.fallback());
            self.emit(ResolvedRecord {
                kind,
                row,
                department,
                class,
                category,
                origin,
            });
        }

        self
    }

    fn emit(&mut self, record: ResolvedRecord) {
        let ordinal = record.row.ordinal;
        let code = record.row.code.clone().unwrap_or_default();

        let value = match &record.row.value {
            NumericField::Present(v) => *v,
            NumericField::Absent => {
                self.counts.missing_value += 1;
                self.push(ordinal, RecordIssue::MissingValue { code });
                return;
            }
            NumericField::Malformed(raw) => {
                self.counts.malformed_numeric += 1;
                self.push(
                    ordinal,
                    RecordIssue::MalformedNumericField {
                        field: "value".to_string(),
                        raw: raw.clone(),
                    },
                );
                return;
            }
        };

        if let NumericField::Malformed(raw) = &record.row.quantity {
            self.counts.malformed_numeric += 1;
            self.counts.excluded_value += value;
            self.push(
                ordinal,
                RecordIssue::MalformedNumericField {
                    field: "quantity".to_string(),
                    raw: raw.clone(),
                },
            );
            return;
        }

        let period = match &record.row.period {
            PeriodField::Resolved(p) => *p,
            PeriodField::Malformed(details) => {
                self.counts.malformed_period += 1;
                self.counts.excluded_value += value;
                self.push(
                    ordinal,
                    RecordIssue::MalformedPeriod {
                        details: details.clone(),
                    },
                );
                return;
            }
        };

        if record.origin == AncestorOrigin::FileFallback {
            self.counts.missing_ancestor_context += 1;
            self.push(
                ordinal,
                RecordIssue::MissingAncestorContext {
                    code: code.clone(),
                    fallback: record.department.clone(),
                },
            );
        }

        self.counts.leaf_records += 1;
        let row = record.row;
        self.leaves.push(LeafRecord {
            source: self.source.name.clone(),
            ordinal,
            department: record.department,
            class: record.class,
            category: record.category,
            code,
            description: row.description.unwrap_or_default(),
            value,
            quantity: row.quantity.value(),
            unit: row.unit,
            period,
            origin: record.origin,
            extras: row.extras,
        });
    }

    fn push(&mut self, ordinal: usize, issue: RecordIssue) {
        debug!("{} row {}: {}", self.source.name, ordinal, issue);
        self.entries.push(Diagnostic::for_row(&self.source.name, ordinal, issue));
    }

    fn finish(self) -> FilePropagation {
        FilePropagation {
            source: self.source.name.clone(),
            leaves: self.leaves,
            diagnostics: SourceDiagnostics {
                source: self.source.name.clone(),
                counts: self.counts,
                entries: self.entries,
            },
        }
    }
}

pub struct Propagator<'a> {
    source: &'a SourceFile,
    default_year: Option<i32>,
}

impl<'a> Propagator<'a> {
    pub fn new(source: &'a SourceFile, config: &PipelineConfig) -> Self {
        Self {
            source,
            default_year: config.default_year,
        }
    }

    /// Walks the rows strictly in file order. Each row's ancestors depend on
    /// every header row before it, so this must never be reordered.
    pub fn propagate(&self, rows: &[RawRow]) -> FilePropagation {
        let normalizer = Normalizer::new(self.source, ColumnMap::from_rows(rows), self.default_year);

        let result = rows
            .iter()
            .map(|row| normalizer.normalize(row))
            .fold(Propagation::new(self.source), Propagation::step)
            .finish();

        let counts = &result.diagnostics.counts;
        debug!(
            "{}: {} rows ({} departments, {} classes, {} categories, {} articles, {} unknown) -> {} leaf records",
            result.source,
            counts.rows,
            counts.departments,
            counts.classes,
            counts.categories,
            counts.articles,
            counts.unknown,
            counts.leaf_records
        );
        if counts.missing_ancestor_context > 0 {
            warn!(
                "{}: {} articles attributed to fallback department '{}'",
                result.source,
                counts.missing_ancestor_context,
                self.source.fallback()
            );
        }
        if counts.excluded_records() > 0 {
            warn!(
                "{}: {} article rows excluded ({} malformed numeric, {} malformed period, {} missing value)",
                result.source,
                counts.excluded_records(),
                counts.malformed_numeric,
                counts.malformed_period,
                counts.missing_value
            );
        }

        result
    }
}

pub fn propagate_batch(batch: &SourceBatch, config: &PipelineConfig) -> FilePropagation {
    Propagator::new(&batch.source, config).propagate(&batch.rows)
}

/// Propagates every batch. Files are independent, so they may run in
/// parallel; results come back in input order either way.
pub fn propagate_batches<B>(batches: &[B], config: &PipelineConfig) -> Vec<FilePropagation>
where
    B: Borrow<SourceBatch> + Sync,
{
    if config.parallel_sources {
        batches
            .par_iter()
            .map(|batch| propagate_batch(<B as Borrow<SourceBatch>>::borrow(batch), config))
            .collect()
    } else {
        batches
            .iter()
            .map(|batch| propagate_batch(<B as Borrow<SourceBatch>>::borrow(batch), config))
            .collect()
    }
}
