use crate::schema::LeafRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Grouping keys over the leaf table. The first four are the reporting
/// levels checked by the validator; the rest feed the summary views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grouping {
    Department,
    Class,
    Category,
    Total,
    Period,
    DepartmentPeriod,
    Article,
}

impl Grouping {
    pub fn key_columns(&self) -> &'static [&'static str] {
        match self {
            Grouping::Department => &["Department"],
            Grouping::Class => &["Department", "Class"],
            Grouping::Category => &["Department", "Class", "Category"],
            Grouping::Total => &[],
            Grouping::Period => &["Period"],
            Grouping::DepartmentPeriod => &["Period", "Department"],
            Grouping::Article => &["Code", "Description"],
        }
    }

    pub fn key_of(&self, record: &LeafRecord) -> Vec<String> {
        match self {
            Grouping::Department => vec![record.department.clone()],
            Grouping::Class => vec![record.department.clone(), record.class.clone()],
            Grouping::Category => vec![
                record.department.clone(),
                record.class.clone(),
                record.category.clone(),
            ],
            Grouping::Total => Vec::new(),
            Grouping::Period => vec![record.period.label()],
            Grouping::DepartmentPeriod => {
                vec![record.period.label(), record.department.clone()]
            }
            Grouping::Article => vec![record.code.clone(), record.description.clone()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub grouping: Grouping,
    pub key: Vec<String>,
    pub value: f64,
    /// Sum of the quantities that were present; records without one add nothing.
    pub quantity: f64,
    pub record_count: usize,
}

impl AggregateRow {
    pub fn label(&self) -> String {
        if self.key.is_empty() {
            "TOTAL".to_string()
        } else {
            self.key.join(" / ")
        }
    }
}

#[derive(Default)]
struct Accumulator {
    value: f64,
    quantity: f64,
    record_count: usize,
}

/// Sums value and quantity per group. Records are added in the order given,
/// so the same input always produces bit-identical sums.
///
/// Rows come back sorted by value descending; equal values fall back to key
/// order. `Grouping::Total` always yields exactly one row, zero for no input.
pub fn aggregate(records: &[LeafRecord], grouping: Grouping) -> Vec<AggregateRow> {
    let mut groups: BTreeMap<Vec<String>, Accumulator> = BTreeMap::new();

    if grouping == Grouping::Total {
        groups.insert(Vec::new(), Accumulator::default());
    }

    for record in records {
        let entry = groups.entry(grouping.key_of(record)).or_default();
        entry.value += record.value;
        entry.quantity += record.quantity.unwrap_or(0.0);
        entry.record_count += 1;
    }

    let mut rows: Vec<AggregateRow> = groups
        .into_iter()
        .map(|(key, acc)| AggregateRow {
            grouping,
            key,
            value: acc.value,
            quantity: acc.quantity,
            record_count: acc.record_count,
        })
        .collect();

    sort_by_value(&mut rows);
    rows
}

pub fn sort_by_value(rows: &mut [AggregateRow]) {
    rows.sort_by(|a, b| b.value.total_cmp(&a.value).then_with(|| a.key.cmp(&b.key)));
}

/// The four reporting levels computed from one leaf table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSet {
    pub departments: Vec<AggregateRow>,
    pub classes: Vec<AggregateRow>,
    pub categories: Vec<AggregateRow>,
    pub total: AggregateRow,
}

impl AggregateSet {
    pub fn from_records(records: &[LeafRecord]) -> Self {
        let total = aggregate(records, Grouping::Total)
            .into_iter()
            .next()
            .unwrap_or(AggregateRow {
                grouping: Grouping::Total,
                key: Vec::new(),
                value: 0.0,
                quantity: 0.0,
                record_count: 0,
            });

        Self {
            departments: aggregate(records, Grouping::Department),
            classes: aggregate(records, Grouping::Class),
            categories: aggregate(records, Grouping::Category),
            total,
        }
    }

    pub fn grand_total(&self) -> f64 {
        self.total.value
    }

    pub fn department(&self, name: &str) -> Option<&AggregateRow> {
        self.departments.iter().find(|row| row.key[0] == name)
    }

    pub fn classes_in<'a>(&'a self, department: &'a str) -> impl Iterator<Item = &'a AggregateRow> {
        self.classes.iter().filter(move |row| row.key[0] == department)
    }

    pub fn categories_in<'a>(
        &'a self,
        department: &'a str,
        class: &'a str,
    ) -> impl Iterator<Item = &'a AggregateRow> {
        self.categories
            .iter()
            .filter(move |row| row.key[0] == department && row.key[1] == class)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_csv(&self) -> String {
        let mut output = String::new();
        output.push_str("Level,Department,Class,Category,Value,Quantity,Records\n");

        let levels = [
            ("Department", &self.departments),
            ("Class", &self.classes),
            ("Category", &self.categories),
        ];
        for (level, rows) in levels {
            for row in rows.iter() {
                let cell = |i: usize| csv_field(row.key.get(i).map(String::as_str).unwrap_or(""));
                output.push_str(&format!(
                    "{},{},{},{},{:.2},{},{}\n",
                    level,
                    cell(0),
                    cell(1),
                    cell(2),
                    row.value,
                    row.quantity,
                    row.record_count
                ));
            }
        }

        output.push_str(&format!(
            "Total,,,,{:.2},{},{}\n",
            self.total.value, self.total.quantity, self.total.record_count
        ));

        output
    }

    pub fn to_markdown(&self) -> String {
        let mut output = String::new();
        output.push_str("# Consumption by Department\n\n");
        output.push_str("| Department | Class | Category | Value | Records |\n");
        output.push_str("|---|---|---|---:|---:|\n");

        for department in &self.departments {
            let dept = &department.key[0];
            output.push_str(&format!(
                "| **{}** | | | **{:.2}** | {} |\n",
                dept, department.value, department.record_count
            ));
            for class in self.classes_in(dept) {
                output.push_str(&format!(
                    "| | {} | | {:.2} | {} |\n",
                    class.key[1], class.value, class.record_count
                ));
                for category in self.categories_in(dept, &class.key[1]) {
                    output.push_str(&format!(
                        "| | | {} | {:.2} | {} |\n",
                        category.key[2], category.value, category.record_count
                    ));
                }
            }
        }

        output.push_str(&format!(
            "\n**Grand total:** {:.2} ({} records)\n",
            self.total.value, self.total.record_count
        ));
        output
    }
}

fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}
