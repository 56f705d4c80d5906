//! # Consumption Rollup
//!
//! Rebuilds a flat, fully attributed table of article consumption from
//! hierarchical inventory exports, aggregates it by reporting level and
//! reconciles the result against the raw input.
//!
//! ## Core Concepts
//!
//! - **Header rows**: Department, Class and Category rows carry no amounts; they
//!   set the context for the article rows that follow them in the same file
//! - **Leaf records**: Article rows stamped with their resolved ancestors and period
//! - **Fallback department**: The department derived from the source file, used
//!   until the first explicit Department row appears
//! - **Reconciliation**: The raw article total must match the leaf grand total, and
//!   every rollup level must sum to the level above it, within a tolerance
//!
//! ## Example
//!
//! ```rust,ignore
//! use consumption_rollup::*;
//!
//! let source = SourceFile::new("BAR_Consumi_2024/details_04_BAR.csv", "BAR")
//!     .with_month_hint("04")
//!     .with_year_hint("2024");
//!
//! let rows = vec![
//!     RawRow::new(0).with_cell("Reparto", "BAR"),
//!     RawRow::new(1).with_cell("Classe", "Beverages"),
//!     RawRow::new(2).with_cell("Categoria", "Spirits"),
//!     RawRow::new(3)
//!         .with_cell("Codice", "A1")
//!         .with_cell("Descrizione", "Gin")
//!         .with_cell("Primo Per.", "10,00"),
//! ];
//!
//! let config = PipelineConfig::default();
//! let output = process_sources(&[SourceBatch::new(source, rows)], &config).unwrap();
//! assert_eq!(output.aggregates.grand_total(), 10.0);
//! assert!(output.validation.passed);
//! ```

pub mod aggregator;
pub mod classifier;
pub mod diagnostics;
pub mod error;
pub mod ingestion;
pub mod merge;
pub mod normalizer;
pub mod propagator;
pub mod report;
pub mod schema;
pub mod utils;
pub mod validator;

pub use aggregator::{aggregate, AggregateRow, AggregateSet, Grouping};
pub use classifier::{classify, matching_rule, ClassificationRule, FieldPresence, CLASSIFICATION_RULES};
pub use diagnostics::*;
pub use error::{ConsumptionError, Result};
pub use ingestion::{load_batches, rows_from_table, InMemorySource, RowSource};
pub use merge::{merge_propagations, unique_sources, MergedRecords};
pub use normalizer::{parse_locale_number, CanonicalField, ColumnMap, Normalizer};
pub use propagator::{propagate_batch, propagate_batches, FilePropagation, HierarchyState, Propagator};
pub use report::{PeriodTotal, SummaryReport};
pub use schema::*;
pub use utils::*;
pub use validator::{
    declare_comparisons, raw_article_totals, Comparison, DeclaredComparison, RawTotals,
    ReconciliationValidator, ValidationReport,
};

use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Everything one run produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub records: Vec<LeafRecord>,
    pub aggregates: AggregateSet,
    pub raw_totals: RawTotals,
    pub validation: ValidationReport,
    pub diagnostics: DiagnosticsReport,
}

impl PipelineOutput {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn records_to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.records)?)
    }

    pub fn summary_report(&self, config: &PipelineConfig) -> SummaryReport {
        SummaryReport::from_records(&self.records, config)
    }
}

pub struct ConsumptionPipeline<'a> {
    config: &'a PipelineConfig,
}

impl<'a> ConsumptionPipeline<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    /// Runs every stage over the given batches. A failed reconciliation is
    /// reported in the output, not returned as an error.
    pub fn run(&self, batches: &[SourceBatch]) -> Result<PipelineOutput> {
        self.config.validate()?;
        let validator = ReconciliationValidator::from_config(self.config)?;

        info!("Processing {} source files", batches.len());

        let (unique, duplicate_sources) = unique_sources(batches);
        let propagations = propagate_batches(&unique, self.config);
        let merged = merge_propagations(propagations, duplicate_sources, self.config);

        debug!("{}", merged.diagnostics.summary());

        let aggregates = AggregateSet::from_records(&merged.records);
        let raw_totals = raw_article_totals(&unique);
        let validation = validator.validate(
            &raw_totals,
            merged.diagnostics.excluded_value(),
            &aggregates,
        );

        info!(
            "Built {} leaf records across {} departments, grand total {:.2}",
            merged.records.len(),
            aggregates.departments.len(),
            aggregates.grand_total()
        );

        Ok(PipelineOutput {
            records: merged.records,
            aggregates,
            raw_totals,
            validation,
            diagnostics: merged.diagnostics,
        })
    }

    pub fn run_from_source<R: RowSource + ?Sized>(
        &self,
        reader: &R,
        sources: &[SourceFile],
    ) -> Result<PipelineOutput> {
        let batches = load_batches(reader, sources)?;
        self.run(&batches)
    }
}

pub fn process_sources(batches: &[SourceBatch], config: &PipelineConfig) -> Result<PipelineOutput> {
    ConsumptionPipeline::new(config).run(batches)
}

/// Like `process_sources`, but a failed reconciliation becomes
/// `ConsumptionError::ReconciliationMismatch`.
pub fn process_with_verification(
    batches: &[SourceBatch],
    config: &PipelineConfig,
) -> Result<PipelineOutput> {
    let output = process_sources(batches, config)?;
    output.validation.ensure_passed()?;
    Ok(output)
}
