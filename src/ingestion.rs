use crate::error::{ConsumptionError, Result};
use crate::schema::{CellValue, RawRow, SourceBatch, SourceFile};
use log::debug;
use std::collections::BTreeMap;

/// Supplies the rows of one export file. Implementations decide how files are
/// opened and decoded; the pipeline only ever sees ordered `RawRow`s.
pub trait RowSource {
    fn read_rows(&self, source: &SourceFile) -> Result<Vec<RawRow>>;
}

impl<F> RowSource for F
where
    F: Fn(&SourceFile) -> Result<Vec<RawRow>>,
{
    fn read_rows(&self, source: &SourceFile) -> Result<Vec<RawRow>> {
        self(source)
    }
}

/// Rows registered up front, keyed by source name.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    tables: BTreeMap<String, Vec<RawRow>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source_name: impl Into<String>, rows: Vec<RawRow>) {
        self.tables.insert(source_name.into(), rows);
    }

    pub fn with_rows(mut self, source_name: impl Into<String>, rows: Vec<RawRow>) -> Self {
        self.insert(source_name, rows);
        self
    }
}

impl RowSource for InMemorySource {
    fn read_rows(&self, source: &SourceFile) -> Result<Vec<RawRow>> {
        self.tables
            .get(&source.name)
            .cloned()
            .ok_or_else(|| ConsumptionError::SourceRead {
                source_name: source.name.clone(),
                details: "no rows registered for this source".to_string(),
            })
    }
}

/// Builds rows from a header line and text records, the shape CSV readers
/// produce. Ordinals follow record order. Cells past the last header are
/// dropped; short records simply lack the trailing cells.
pub fn rows_from_table<H, R, C>(headers: &[H], records: R) -> Vec<RawRow>
where
    H: AsRef<str>,
    R: IntoIterator,
    R::Item: IntoIterator<Item = C>,
    C: AsRef<str>,
{
    records
        .into_iter()
        .enumerate()
        .map(|(ordinal, record)| {
            let cells = headers
                .iter()
                .zip(record)
                .map(|(header, cell)| {
                    let text = cell.as_ref();
                    let value = if text.trim().is_empty() {
                        CellValue::Empty
                    } else {
                        CellValue::Text(text.to_string())
                    };
                    (header.as_ref().to_string(), value)
                })
                .collect();
            RawRow { ordinal, cells }
        })
        .collect()
}

/// Reads every source through `reader`, keeping the given order.
pub fn load_batches<R: RowSource + ?Sized>(
    reader: &R,
    sources: &[SourceFile],
) -> Result<Vec<SourceBatch>> {
    sources
        .iter()
        .map(|source| {
            let rows = reader.read_rows(source)?;
            debug!("loaded {} rows from {}", rows.len(), source.name);
            Ok(SourceBatch::new(source.clone(), rows))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_from_table() {
        let headers = ["Reparto", "Codice", "Descrizione", "Primo Per."];
        let records = vec![
            vec!["BAR", "", "", ""],
            vec!["", "A1", "Gin", "12,50"],
            vec!["", "A2"],
        ];
        let rows = rows_from_table(&headers, records);

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].get("Reparto"), Some(&CellValue::Text("BAR".to_string())));
        assert_eq!(rows[0].get("Codice"), Some(&CellValue::Empty));
        assert_eq!(rows[1].ordinal, 1);
        assert_eq!(rows[1].get("Primo Per."), Some(&CellValue::Text("12,50".to_string())));
        assert_eq!(rows[2].get("Descrizione"), None);
    }

    #[test]
    fn test_in_memory_source() {
        let source = SourceFile::new("BAR/details_04.csv", "BAR");
        let reader = InMemorySource::new().with_rows(&source.name, vec![RawRow::new(0)]);

        let batches = load_batches(&reader, &[source]).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].rows.len(), 1);

        let missing = SourceFile::new("SALA/details_04.csv", "SALA");
        match load_batches(&reader, &[missing]) {
            Err(ConsumptionError::SourceRead { source_name, .. }) => {
                assert_eq!(source_name, "SALA/details_04.csv")
            }
            other => panic!("expected SourceRead error, got {:?}", other),
        }
    }

    #[test]
    fn test_closure_as_row_source() {
        let reader = |source: &SourceFile| -> Result<Vec<RawRow>> {
            Ok(vec![RawRow::new(0).with_cell("Reparto", source.fallback())])
        };
        let batches = load_batches(&reader, &[SourceFile::new("x.csv", "CUCINA")]).unwrap();
        assert_eq!(
            batches[0].rows[0].get("Reparto"),
            Some(&CellValue::Text("CUCINA".to_string()))
        );
    }
}
