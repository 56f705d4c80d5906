use crate::classifier::FieldPresence;
use crate::schema::{CellValue, Period, RawRow, SourceFile};
use crate::utils::{month_from_number, normalize_header, parse_month_number, parse_year};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    Department,
    Class,
    Category,
    Code,
    Description,
    Value,
    Quantity,
    UnitOfMeasure,
    PeriodMonth,
    PeriodYear,
}

/// Header spellings per canonical field, compared after `normalize_header`.
/// Order matters: when a file carries several aliases of the same field, the
/// first one listed wins and the others are kept as extras. This is how the
/// duplicated `Primo Per.` / `Sec. Per.` value columns collapse to one value.
pub const FIELD_ALIASES: [(CanonicalField, &[&str]); 10] = [
    (
        CanonicalField::Department,
        &["reparto", "dipartimento", "department", "dept"],
    ),
    (CanonicalField::Class, &["classe", "class"]),
    (CanonicalField::Category, &["categoria", "category"]),
    (
        CanonicalField::Code,
        &["codice", "codicearticolo", "code", "articlecode", "sku"],
    ),
    (
        CanonicalField::Description,
        &["descrizione", "description", "desc"],
    ),
    (
        CanonicalField::Value,
        &[
            "valore",
            "primoper",
            "primoperiodo",
            "costototale",
            "costo",
            "value",
            "amount",
        ],
    ),
    (
        CanonicalField::Quantity,
        &["quantita", "quantità", "qta", "qty", "quantity"],
    ),
    (
        CanonicalField::UnitOfMeasure,
        &["umc", "uma", "um", "unitofmeasure", "unit"],
    ),
    (CanonicalField::PeriodMonth, &["mese", "month"]),
    (CanonicalField::PeriodYear, &["anno", "year"]),
];

/// Resolved header for each canonical field of one source file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    fields: BTreeMap<CanonicalField, String>,
}

impl ColumnMap {
    pub fn resolve<'a>(headers: impl IntoIterator<Item = &'a str>) -> Self {
        let by_key: Vec<(String, &str)> = headers
            .into_iter()
            .map(|h| (normalize_header(h), h))
            .collect();

        let mut fields = BTreeMap::new();
        for (field, aliases) in FIELD_ALIASES.iter() {
            let chosen = aliases.iter().find_map(|alias| {
                by_key
                    .iter()
                    .find(|(key, _)| key == alias)
                    .map(|(_, header)| header.to_string())
            });
            if let Some(header) = chosen {
                fields.insert(*field, header);
            }
        }

        Self { fields }
    }

    /// Resolves against the union of headers seen in `rows`.
    pub fn from_rows(rows: &[RawRow]) -> Self {
        let headers: BTreeSet<&str> = rows
            .iter()
            .flat_map(|r| r.cells.keys().map(String::as_str))
            .collect();
        Self::resolve(headers)
    }

    pub fn header_for(&self, field: CanonicalField) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    pub fn is_mapped(&self, header: &str) -> bool {
        self.fields.values().any(|h| h == header)
    }

    pub fn cell<'r>(&self, row: &'r RawRow, field: CanonicalField) -> Option<&'r CellValue> {
        self.header_for(field).and_then(|h| row.get(h))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NumericField {
    Absent,
    Present(f64),
    /// Holds the raw text that failed to parse.
    Malformed(String),
}

impl NumericField {
    pub fn value(&self) -> Option<f64> {
        match self {
            NumericField::Present(v) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PeriodField {
    Resolved(Period),
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRow {
    pub ordinal: usize,
    pub department: Option<String>,
    pub class: Option<String>,
    pub category: Option<String>,
    pub code: Option<String>,
    pub description: Option<String>,
    pub value: NumericField,
    pub quantity: NumericField,
    pub unit: Option<String>,
    pub period: PeriodField,
    /// Columns outside the canonical set, carried through untouched.
    pub extras: BTreeMap<String, String>,
}

impl NormalizedRow {
    pub fn presence(&self) -> FieldPresence {
        FieldPresence {
            department: self.department.is_some(),
            class: self.class.is_some(),
            category: self.category.is_some(),
            code: self.code.is_some(),
            description: self.description.is_some(),
        }
    }
}

pub struct Normalizer<'a> {
    columns: ColumnMap,
    source: &'a SourceFile,
    default_year: Option<i32>,
}

impl<'a> Normalizer<'a> {
    pub fn new(source: &'a SourceFile, columns: ColumnMap, default_year: Option<i32>) -> Self {
        Self {
            columns,
            source,
            default_year,
        }
    }

    pub fn normalize(&self, row: &RawRow) -> NormalizedRow {
        let text = |field| self.columns.cell(row, field).and_then(cell_text);
        let number = |field| {
            self.columns
                .cell(row, field)
                .map(cell_number)
                .unwrap_or(NumericField::Absent)
        };

        let extras = row
            .cells
            .iter()
            .filter(|(header, _)| !self.columns.is_mapped(header))
            .filter_map(|(header, cell)| cell_text(cell).map(|v| (header.clone(), v)))
            .collect();

        NormalizedRow {
            ordinal: row.ordinal,
            department: text(CanonicalField::Department),
            class: text(CanonicalField::Class),
            category: text(CanonicalField::Category),
            code: text(CanonicalField::Code),
            description: text(CanonicalField::Description),
            value: number(CanonicalField::Value),
            quantity: number(CanonicalField::Quantity),
            unit: text(CanonicalField::UnitOfMeasure),
            period: self.resolve_period(
                text(CanonicalField::PeriodMonth),
                text(CanonicalField::PeriodYear),
            ),
            extras,
        }
    }

    fn resolve_period(&self, month_cell: Option<String>, year_cell: Option<String>) -> PeriodField {
        let raw_month = match month_cell.or_else(|| self.source.month_hint.clone()) {
            Some(m) => m,
            None => return PeriodField::Malformed("no month in row or source name".to_string()),
        };
        let month = match parse_month_number(&raw_month) {
            Some(n) => n,
            None => return PeriodField::Malformed(format!("month '{}' is not a number", raw_month)),
        };
        let month = match u32::try_from(month).ok().filter(|m| month_from_number(*m).is_some()) {
            Some(m) => m,
            None => return PeriodField::Malformed(format!("month {} outside 1-12", month)),
        };

        let year = match year_cell {
            Some(raw) => match parse_year(&raw) {
                Some(y) => y,
                None => return PeriodField::Malformed(format!("year '{}' is not valid", raw)),
            },
            None => match self
                .source
                .year_hint
                .as_deref()
                .and_then(parse_year)
                .or(self.default_year)
            {
                Some(y) => y,
                None => return PeriodField::Malformed("no year in row, source name or configuration".to_string()),
            },
        };

        PeriodField::Resolved(Period { year, month })
    }
}

/// Trimmed text of a cell; `None` when empty after trimming.
pub fn cell_text(cell: &CellValue) -> Option<String> {
    match cell {
        CellValue::Empty => None,
        CellValue::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        CellValue::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 => {
            Some(format!("{}", *n as i64))
        }
        CellValue::Number(n) if n.is_finite() => Some(n.to_string()),
        CellValue::Number(_) => None,
    }
}

pub fn cell_number(cell: &CellValue) -> NumericField {
    match cell {
        CellValue::Empty => NumericField::Absent,
        CellValue::Number(n) if n.is_finite() => NumericField::Present(*n),
        CellValue::Number(n) => NumericField::Malformed(n.to_string()),
        CellValue::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                NumericField::Absent
            } else {
                match parse_locale_number(trimmed) {
                    Some(v) => NumericField::Present(v),
                    None => NumericField::Malformed(trimmed.to_string()),
                }
            }
        }
    }
}

/// Parses an amount written with either decimal convention.
///
/// When both `,` and `.` appear, the rightmost one is the decimal separator.
/// A single separator of one kind is decimal (`12,50`, `12.50`); repeated
/// separators are thousands groupings (`1.234.567`). Thousands groups must be
/// three digits wide. Spaces, apostrophes and currency symbols are ignored.
///
/// A lone separator is therefore never a thousands mark: `1.234` and `1,234`
/// both read as 1.234. Exports that group thousands without decimals must
/// be written with a decimal part (`1.234,00`) to be read as 1234.
pub fn parse_locale_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '€' | '$' | '\''))
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let (sign, body) = match cleaned.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", cleaned.strip_prefix('+').unwrap_or(&cleaned)),
    };

    let decimal_sep = match (body.rfind(','), body.rfind('.')) {
        (Some(c), Some(d)) => Some(if c > d { ',' } else { '.' }),
        (Some(_), None) if body.matches(',').count() == 1 => Some(','),
        (None, Some(_)) if body.matches('.').count() == 1 => Some('.'),
        _ => None,
    };

    let (int_part, frac_part) = match decimal_sep {
        Some(sep) => {
            let idx = body.rfind(sep)?;
            (&body[..idx], Some(&body[idx + 1..]))
        }
        None => (body, None),
    };

    let group_sep = match decimal_sep {
        Some(',') => '.',
        Some(_) => ',',
        None if int_part.contains(',') => ',',
        None => '.',
    };

    let digits = strip_grouping(int_part, group_sep)?;
    let normalized = match frac_part {
        Some(frac) => {
            if frac.is_empty() || !frac.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            let int_digits = if digits.is_empty() { "0" } else { digits.as_str() };
            format!("{}{}.{}", sign, int_digits, frac)
        }
        None => {
            if digits.is_empty() {
                return None;
            }
            format!("{}{}", sign, digits)
        }
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn strip_grouping(int_part: &str, sep: char) -> Option<String> {
    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());

    if !int_part.contains(sep) {
        return all_digits(int_part).then(|| int_part.to_string());
    }

    let groups: Vec<&str> = int_part.split(sep).collect();
    let (first, rest) = groups.split_first()?;
    let valid = !first.is_empty()
        && first.len() <= 3
        && all_digits(first)
        && rest.iter().all(|g| g.len() == 3 && all_digits(g));

    valid.then(|| groups.concat())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RawRow;

    fn source() -> SourceFile {
        SourceFile::new("BAR_Consumi_2024/details_04_BAR.csv", "BAR")
            .with_month_hint("04")
            .with_year_hint("2024")
    }

    #[test]
    fn test_parse_locale_number() {
        assert_eq!(parse_locale_number("12,50"), Some(12.5));
        assert_eq!(parse_locale_number("12.50"), Some(12.5));
        assert_eq!(parse_locale_number("1.234,56"), Some(1234.56));
        assert_eq!(parse_locale_number("1,234.56"), Some(1234.56));
        assert_eq!(parse_locale_number("1.234.567"), Some(1_234_567.0));
        assert_eq!(parse_locale_number("1 234,5"), Some(1234.5));
        assert_eq!(parse_locale_number("€ 7,00"), Some(7.0));
        assert_eq!(parse_locale_number("-3,25"), Some(-3.25));
        assert_eq!(parse_locale_number("42"), Some(42.0));
    }

    #[test]
    fn test_parse_locale_number_rejects_garbage() {
        assert_eq!(parse_locale_number("abc"), None);
        assert_eq!(parse_locale_number(""), None);
        assert_eq!(parse_locale_number("-"), None);
        assert_eq!(parse_locale_number("1,2,3"), None);
        assert_eq!(parse_locale_number("12,"), None);
        assert_eq!(parse_locale_number("NaN"), None);
        assert_eq!(parse_locale_number("inf"), None);
    }

    #[test]
    fn test_single_separator_is_always_decimal() {
        assert_eq!(parse_locale_number("1.234"), Some(1.234));
        assert_eq!(parse_locale_number("1,234"), Some(1.234));
        assert_eq!(parse_locale_number("1.234,00"), Some(1234.0));
        assert_eq!(parse_locale_number("1,234.00"), Some(1234.0));
        assert_eq!(parse_locale_number("1.234.567"), Some(1234567.0));
    }

    #[test]
    fn test_malformed_is_not_zero() {
        assert_eq!(
            cell_number(&CellValue::from("abc")),
            NumericField::Malformed("abc".to_string())
        );
        assert_eq!(cell_number(&CellValue::from("   ")), NumericField::Absent);
        assert_eq!(cell_number(&CellValue::Empty), NumericField::Absent);
        assert_eq!(
            cell_number(&CellValue::Number(f64::NAN)),
            NumericField::Malformed("NaN".to_string())
        );
    }

    #[test]
    fn test_cell_text_trims_and_formats_numbers() {
        assert_eq!(cell_text(&CellValue::from("  Gin  ")), Some("Gin".to_string()));
        assert_eq!(cell_text(&CellValue::from("   ")), None);
        assert_eq!(cell_text(&CellValue::Number(1001.0)), Some("1001".to_string()));
        assert_eq!(cell_text(&CellValue::Number(2.5)), Some("2.5".to_string()));
    }

    #[test]
    fn test_column_map_prefers_first_alias() {
        let map = ColumnMap::resolve(vec![
            "Reparto",
            "Classe",
            "Categoria",
            "Codice",
            "Descrizione",
            "Sec. Per.",
            "Primo Per.",
            "Quantita",
            "U.M.A.",
            "U.M.C.",
            "Coeff Conv",
        ]);
        assert_eq!(map.header_for(CanonicalField::Value), Some("Primo Per."));
        assert_eq!(map.header_for(CanonicalField::UnitOfMeasure), Some("U.M.C."));
        assert_eq!(map.header_for(CanonicalField::Department), Some("Reparto"));
        assert!(!map.is_mapped("Sec. Per."));
        assert!(!map.is_mapped("Coeff Conv"));
        assert_eq!(map.header_for(CanonicalField::PeriodMonth), None);
    }

    #[test]
    fn test_column_map_english_headers() {
        let map = ColumnMap::resolve(vec!["Department", "CLASS", "category", "Code", "Description", "Amount", "Qty"]);
        assert_eq!(map.header_for(CanonicalField::Class), Some("CLASS"));
        assert_eq!(map.header_for(CanonicalField::Value), Some("Amount"));
        assert_eq!(map.header_for(CanonicalField::Quantity), Some("Qty"));
    }

    #[test]
    fn test_normalize_article_row() {
        let row = RawRow::new(3)
            .with_cell("Codice", "A1")
            .with_cell("Descrizione", " Gin ")
            .with_cell("Primo Per.", "12,50")
            .with_cell("Sec. Per.", "12,50")
            .with_cell("Reparto", "");
        let src = source();
        let normalizer = Normalizer::new(&src, ColumnMap::from_rows(std::slice::from_ref(&row)), None);
        let normalized = normalizer.normalize(&row);

        assert_eq!(normalized.ordinal, 3);
        assert_eq!(normalized.code.as_deref(), Some("A1"));
        assert_eq!(normalized.description.as_deref(), Some("Gin"));
        assert_eq!(normalized.department, None);
        assert_eq!(normalized.value, NumericField::Present(12.5));
        assert_eq!(normalized.extras.get("Sec. Per.").map(String::as_str), Some("12,50"));
        assert_eq!(
            normalized.period,
            PeriodField::Resolved(Period { year: 2024, month: 4 })
        );

        let presence = normalized.presence();
        assert!(presence.code && presence.description);
        assert!(!presence.department);
    }

    #[test]
    fn test_period_from_cells_overrides_hints() {
        let row = RawRow::new(0).with_cell("Mese", "11").with_cell("Anno", 2023.0);
        let src = source();
        let normalizer = Normalizer::new(&src, ColumnMap::from_rows(std::slice::from_ref(&row)), None);
        assert_eq!(
            normalizer.normalize(&row).period,
            PeriodField::Resolved(Period { year: 2023, month: 11 })
        );
    }

    #[test]
    fn test_period_out_of_range_is_malformed() {
        let row = RawRow::new(0).with_cell("Mese", "13");
        let src = source();
        let normalizer = Normalizer::new(&src, ColumnMap::from_rows(std::slice::from_ref(&row)), None);
        assert!(matches!(
            normalizer.normalize(&row).period,
            PeriodField::Malformed(details) if details.contains("outside 1-12")
        ));
    }

    #[test]
    fn test_period_year_falls_back_to_config() {
        let row = RawRow::new(0).with_cell("Mese", "2");
        let src = SourceFile::new("export.csv", "BAR");
        let columns = ColumnMap::from_rows(std::slice::from_ref(&row));

        let without_default = Normalizer::new(&src, columns.clone(), None);
        assert!(matches!(
            without_default.normalize(&row).period,
            PeriodField::Malformed(_)
        ));

        let with_default = Normalizer::new(&src, columns, Some(2024));
        assert_eq!(
            with_default.normalize(&row).period,
            PeriodField::Resolved(Period { year: 2024, month: 2 })
        );
    }
}
