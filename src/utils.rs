use crate::schema::MonthNames;
use chrono::Month;
use std::path::Path;

const ITALIAN_MONTHS: [&str; 12] = [
    "Gennaio",
    "Febbraio",
    "Marzo",
    "Aprile",
    "Maggio",
    "Giugno",
    "Luglio",
    "Agosto",
    "Settembre",
    "Ottobre",
    "Novembre",
    "Dicembre",
];

/// Returns the month for a 1-based month number, or `None` outside 1..=12.
pub fn month_from_number(month: u32) -> Option<Month> {
    u8::try_from(month).ok().and_then(|m| Month::try_from(m).ok())
}

pub fn month_name(month: u32, names: MonthNames) -> Option<&'static str> {
    let month = month_from_number(month)?;
    match names {
        MonthNames::English => Some(month.name()),
        MonthNames::Italian => Some(ITALIAN_MONTHS[month.number_from_month() as usize - 1]),
    }
}

/// Parses a month cell such as `4`, `04` or `4.0`. Returns the raw number even
/// when it is outside 1..=12 so callers can report it; `None` when not numeric.
pub fn parse_month_number(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(n) = trimmed.parse::<i64>() {
        return Some(n);
    }
    let as_float = trimmed.replace(',', ".").parse::<f64>().ok()?;
    if as_float.fract() == 0.0 && as_float.is_finite() {
        Some(as_float as i64)
    } else {
        None
    }
}

pub fn parse_year(raw: &str) -> Option<i32> {
    let trimmed = raw.trim();
    let year = match trimmed.parse::<i32>() {
        Ok(y) => y,
        Err(_) => {
            let as_float = trimmed.parse::<f64>().ok()?;
            if as_float.fract() != 0.0 {
                return None;
            }
            as_float as i32
        }
    };
    if (1900..=9999).contains(&year) {
        Some(year)
    } else {
        None
    }
}

/// Lowercases a header and strips everything but letters and digits, so that
/// `Primo Per.`, `primo_per` and `PRIMO PER` compare equal.
pub fn normalize_header(header: &str) -> String {
    header
        .trim()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedSourcePath {
    pub department: String,
    pub month: Option<String>,
    pub year: Option<String>,
}

/// Splits an export path into its department, month and year hints.
///
/// The department is the first `_`-separated token of the parent directory
/// (`BAR_Consumi_2024` gives `BAR`). The month is the second token of a
/// `details_MM_...` file name. The year is the first four-digit token found in
/// the file name, then in the directory name.
pub fn parse_source_path(path: &Path) -> ParsedSourcePath {
    let dir_name = path
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("");
    let stem = path.file_stem().and_then(|n| n.to_str()).unwrap_or("");

    let department = dir_name
        .split('_')
        .next()
        .map(|s| s.trim().to_string())
        .unwrap_or_default();

    let file_tokens: Vec<&str> = stem.split('_').collect();
    let month = if file_tokens.first() == Some(&"details") {
        file_tokens
            .get(1)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    } else {
        None
    };

    let year = file_tokens
        .iter()
        .copied()
        .chain(dir_name.split('_'))
        .find(|t| t.len() == 4 && t.chars().all(|c| c.is_ascii_digit()))
        .map(|t| t.to_string());

    ParsedSourcePath {
        department,
        month,
        year,
    }
}
