use crate::aggregator::{AggregateRow, AggregateSet};
use crate::error::{ConsumptionError, Result};
use crate::normalizer::{cell_number, cell_text, CanonicalField, ColumnMap, NumericField};
use crate::schema::{PipelineConfig, RawRow, SourceBatch};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;

/// Article totals read straight off the raw rows, without classification or
/// propagation. A row counts when it carries both a code and a description,
/// whatever else it carries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTotals {
    pub article_rows: usize,
    pub value: f64,
    /// Article rows whose value cell could not be parsed; not part of `value`.
    pub unparseable_values: usize,
}

pub fn raw_article_totals<B: Borrow<SourceBatch>>(batches: &[B]) -> RawTotals {
    let mut totals = RawTotals::default();

    for batch in batches {
        let batch = <B as Borrow<SourceBatch>>::borrow(batch);
        let columns = ColumnMap::from_rows(&batch.rows);
        let present = |row: &RawRow, field: CanonicalField| columns.cell(row, field).and_then(cell_text).is_some();

        for row in &batch.rows {
            if !(present(row, CanonicalField::Code) && present(row, CanonicalField::Description)) {
                continue;
            }
            totals.article_rows += 1;
            match columns.cell(row, CanonicalField::Value).map(cell_number) {
                Some(NumericField::Present(v)) => totals.value += v,
                Some(NumericField::Malformed(_)) => totals.unparseable_values += 1,
                Some(NumericField::Absent) | None => {}
            }
        }
    }

    totals
}

/// A named expectation: two amounts that must agree within tolerance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclaredComparison {
    pub name: String,
    pub expected: f64,
    pub actual: f64,
}

impl DeclaredComparison {
    pub fn new(name: impl Into<String>, expected: f64, actual: f64) -> Self {
        Self {
            name: name.into(),
            expected,
            actual,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub name: String,
    pub expected: f64,
    pub actual: f64,
    /// `actual - expected`
    pub difference: f64,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub tolerance: f64,
    pub comparisons: Vec<Comparison>,
    pub passed: bool,
}

impl ValidationReport {
    pub fn failures(&self) -> impl Iterator<Item = &Comparison> {
        self.comparisons.iter().filter(|c| !c.passed)
    }

    pub fn comparison(&self, name: &str) -> Option<&Comparison> {
        self.comparisons.iter().find(|c| c.name == name)
    }

    /// Turns the first failed comparison into an error.
    pub fn ensure_passed(&self) -> Result<()> {
        match self.failures().next() {
            Some(failure) => Err(ConsumptionError::ReconciliationMismatch {
                comparison: failure.name.clone(),
                expected: failure.expected,
                actual: failure.actual,
                difference: failure.difference,
            }),
            None => Ok(()),
        }
    }

    /// Process exit status for command-line drivers.
    pub fn exit_code(&self) -> i32 {
        if self.passed {
            0
        } else {
            1
        }
    }

    pub fn summary(&self) -> String {
        let mut output = format!(
            "Reconciliation {} ({} comparisons, tolerance {})\n",
            if self.passed { "PASSED" } else { "FAILED" },
            self.comparisons.len(),
            self.tolerance
        );
        for c in &self.comparisons {
            output.push_str(&format!(
                "  [{}] {}: expected {:.2}, actual {:.2}, difference {:.4}\n",
                if c.passed { "ok" } else { "FAIL" },
                c.name,
                c.expected,
                c.actual,
                c.difference
            ));
        }
        output
    }
}

pub struct ReconciliationValidator {
    tolerance: f64,
}

impl ReconciliationValidator {
    pub fn new(tolerance: f64) -> Result<Self> {
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(ConsumptionError::InvalidTolerance(tolerance));
        }
        Ok(Self { tolerance })
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Self::new(config.tolerance)
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn compare(&self, declared: &DeclaredComparison) -> Comparison {
        let difference = declared.actual - declared.expected;
        Comparison {
            name: declared.name.clone(),
            expected: declared.expected,
            actual: declared.actual,
            difference,
            passed: difference.abs() <= self.tolerance,
        }
    }

    /// Runs every comparison. Failures are reported, never raised.
    pub fn run(&self, declared: &[DeclaredComparison]) -> ValidationReport {
        let comparisons: Vec<Comparison> = declared.iter().map(|d| self.compare(d)).collect();
        let passed = comparisons.iter().all(|c| c.passed);

        for failure in comparisons.iter().filter(|c| !c.passed) {
            warn!(
                "reconciliation '{}' failed: expected {:.2}, actual {:.2}, difference {:.4}",
                failure.name, failure.expected, failure.actual, failure.difference
            );
        }
        info!(
            "reconciliation {}: {} of {} comparisons within tolerance {}",
            if passed { "passed" } else { "failed" },
            comparisons.iter().filter(|c| c.passed).count(),
            comparisons.len(),
            self.tolerance
        );

        ValidationReport {
            tolerance: self.tolerance,
            comparisons,
            passed,
        }
    }

    /// Raw article total against the leaf grand total, plus every rollup
    /// level against the one above it.
    pub fn validate(
        &self,
        raw: &RawTotals,
        excluded_value: f64,
        aggregates: &AggregateSet,
    ) -> ValidationReport {
        self.run(&declare_comparisons(raw, excluded_value, aggregates))
    }
}

// Starts from +0.0; `Iterator::sum` over no f64s yields -0.0.
fn sum_values<'a>(rows: impl IntoIterator<Item = &'a AggregateRow>) -> f64 {
    rows.into_iter().fold(0.0, |acc, r| acc + r.value)
}

/// The raw article total must equal the bare leaf grand total. The value of
/// article rows dropped with a diagnostic (bad period or quantity,
/// duplicates) is checked separately and must be zero, so any loss fails.
pub fn declare_comparisons(
    raw: &RawTotals,
    excluded_value: f64,
    aggregates: &AggregateSet,
) -> Vec<DeclaredComparison> {
    let grand = aggregates.grand_total();
    let mut declared = vec![
        DeclaredComparison::new("raw_articles_vs_grand_total", raw.value, grand),
        DeclaredComparison::new("excluded_article_value", 0.0, excluded_value),
        DeclaredComparison::new("departments_vs_grand_total", grand, sum_values(&aggregates.departments)),
        DeclaredComparison::new("classes_vs_grand_total", grand, sum_values(&aggregates.classes)),
        DeclaredComparison::new("categories_vs_grand_total", grand, sum_values(&aggregates.categories)),
    ];

    for department in &aggregates.departments {
        let name = &department.key[0];
        declared.push(DeclaredComparison::new(
            format!("classes_within_department:{}", name),
            department.value,
            sum_values(aggregates.classes_in(name)),
        ));
    }

    for class in &aggregates.classes {
        declared.push(DeclaredComparison::new(
            format!("categories_within_class:{}/{}", class.key[0], class.key[1]),
            class.value,
            sum_values(aggregates.categories_in(&class.key[0], &class.key[1])),
        ));
    }

    declared
}
