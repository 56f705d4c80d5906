use crate::diagnostics::{Diagnostic, DiagnosticsReport, RecordIssue};
use crate::propagator::FilePropagation;
use crate::schema::{LeafRecord, Period, PipelineConfig, SourceBatch};
use log::warn;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

/// The owned leaf table for a run plus everything learned while building it.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRecords {
    pub records: Vec<LeafRecord>,
    pub diagnostics: DiagnosticsReport,
}

/// Drops batches whose source name was already seen, keeping the first.
pub fn unique_sources(batches: &[SourceBatch]) -> (Vec<&SourceBatch>, Vec<Diagnostic>) {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut unique = Vec::with_capacity(batches.len());
    let mut duplicates = Vec::new();

    for batch in batches {
        if seen.insert(batch.source.name.as_str()) {
            unique.push(batch);
        } else {
            warn!("source '{}' supplied more than once; ignoring repeat", batch.source.name);
            duplicates.push(Diagnostic::for_source(
                &batch.source.name,
                RecordIssue::DuplicateSource,
            ));
        }
    }

    (unique, duplicates)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RecordKey {
    period: Period,
    department: String,
    class: String,
    category: String,
    code: String,
    description: String,
    value_bits: u64,
    quantity_bits: Option<u64>,
}

impl RecordKey {
    fn of(record: &LeafRecord) -> Self {
        Self {
            period: record.period,
            department: record.department.clone(),
            class: record.class.clone(),
            category: record.category.clone(),
            code: record.code.clone(),
            description: record.description.clone(),
            value_bits: record.value.to_bits(),
            quantity_bits: record.quantity.map(f64::to_bits),
        }
    }
}

/// Concatenates per-file results in input order.
///
/// With `deduplicate` set, a record identical to one already taken from a
/// different source is dropped and reported. Identical lines within the same
/// file are repeated consumption and are always kept.
pub fn merge_propagations(
    propagations: Vec<FilePropagation>,
    duplicate_sources: Vec<Diagnostic>,
    config: &PipelineConfig,
) -> MergedRecords {
    let mut report = DiagnosticsReport {
        duplicate_sources: duplicate_sources.len(),
        merge_entries: duplicate_sources,
        ..Default::default()
    };
    let mut records = Vec::new();
    // Source that first supplied each key
    let mut seen: HashMap<RecordKey, String> = HashMap::new();

    for propagation in propagations {
        report.totals.absorb(&propagation.diagnostics.counts);

        for leaf in propagation.leaves {
            if !config.deduplicate {
                records.push(leaf);
                continue;
            }

            let cross_source = match seen.entry(RecordKey::of(&leaf)) {
                Entry::Vacant(entry) => {
                    entry.insert(leaf.source.clone());
                    false
                }
                Entry::Occupied(entry) if *entry.get() == leaf.source => {
                    warn!(
                        "{} row {}: identical to an earlier line of the same file, keeping both ({})",
                        leaf.source, leaf.ordinal, leaf.code
                    );
                    false
                }
                Entry::Occupied(_) => true,
            };

            if cross_source {
                report.duplicate_records += 1;
                report.duplicate_value += leaf.value;
                report.merge_entries.push(Diagnostic::for_row(
                    &leaf.source,
                    leaf.ordinal,
                    RecordIssue::DuplicateRecord {
                        code: leaf.code.clone(),
                        value: leaf.value,
                    },
                ));
                continue;
            }
            records.push(leaf);
        }

        report.sources.push(propagation.diagnostics);
    }

    if report.duplicate_records > 0 {
        warn!(
            "dropped {} duplicate records ({:.2} total value)",
            report.duplicate_records, report.duplicate_value
        );
    }

    MergedRecords {
        records,
        diagnostics: report,
    }
}
