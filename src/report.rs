use crate::aggregator::{aggregate, AggregateRow, Grouping};
use crate::schema::{LeafRecord, MonthNames, Period, PipelineConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const CURRENCY: &str = "EUR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodTotal {
    pub period: Period,
    pub month_name: String,
    pub value: f64,
    pub quantity: f64,
    pub record_count: usize,
}

/// Read-only views over the leaf table for people rather than for the
/// validator: trends by month and the largest contributors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryReport {
    pub month_names: MonthNames,
    /// Chronological.
    pub monthly_totals: Vec<PeriodTotal>,
    /// Chronological, then by value descending within a month.
    pub department_by_month: Vec<AggregateRow>,
    pub top_articles: Vec<AggregateRow>,
    pub top_articles_by_department: BTreeMap<String, Vec<AggregateRow>>,
    pub top_departments: Vec<AggregateRow>,
    pub top_classes: Vec<AggregateRow>,
}

impl SummaryReport {
    pub fn from_records(records: &[LeafRecord], config: &PipelineConfig) -> Self {
        let top_n = config.top_n;
        let periods: BTreeMap<String, Period> = records
            .iter()
            .map(|r| (r.period.label(), r.period))
            .collect();

        let mut monthly_totals: Vec<PeriodTotal> = aggregate(records, Grouping::Period)
            .into_iter()
            .filter_map(|row| {
                let period = *periods.get(&row.key[0])?;
                Some(PeriodTotal {
                    period,
                    month_name: period.month_name(config.month_names).to_string(),
                    value: row.value,
                    quantity: row.quantity,
                    record_count: row.record_count,
                })
            })
            .collect();
        monthly_totals.sort_by_key(|t| t.period);

        let mut department_by_month = aggregate(records, Grouping::DepartmentPeriod);
        department_by_month.sort_by(|a, b| {
            a.key[0]
                .cmp(&b.key[0])
                .then_with(|| b.value.total_cmp(&a.value))
                .then_with(|| a.key[1].cmp(&b.key[1]))
        });

        let mut by_department: BTreeMap<String, Vec<LeafRecord>> = BTreeMap::new();
        for record in records {
            by_department
                .entry(record.department.clone())
                .or_default()
                .push(record.clone());
        }
        let top_articles_by_department = by_department
            .into_iter()
            .map(|(department, recs)| (department, top(aggregate(&recs, Grouping::Article), top_n)))
            .collect();

        Self {
            month_names: config.month_names,
            monthly_totals,
            department_by_month,
            top_articles: top(aggregate(records, Grouping::Article), top_n),
            top_articles_by_department,
            top_departments: top(aggregate(records, Grouping::Department), top_n),
            top_classes: top(aggregate(records, Grouping::Class), top_n),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn render_text(&self) -> String {
        let mut output = String::new();

        output.push_str("# TOP ARTICLES OVERALL\n");
        for row in &self.top_articles {
            output.push_str(&format!(
                "{}: {} - {:.2} {}\n",
                row.key[0], row.key[1], row.value, CURRENCY
            ));
        }

        output.push_str("\n# TOP DEPARTMENTS\n");
        for row in &self.top_departments {
            output.push_str(&format!("{}: {:.2} {}\n", row.label(), row.value, CURRENCY));
        }

        output.push_str("\n# TOP CLASSES\n");
        for row in &self.top_classes {
            output.push_str(&format!("{}: {:.2} {}\n", row.label(), row.value, CURRENCY));
        }

        output.push_str("\n# MONTHLY TOTALS\n");
        for total in &self.monthly_totals {
            output.push_str(&format!(
                "{} ({}): {:.2} {} over {} records\n",
                total.period, total.month_name, total.value, CURRENCY, total.record_count
            ));
        }

        output.push_str("\n# TOP ARTICLES BY DEPARTMENT\n");
        for (department, rows) in &self.top_articles_by_department {
            output.push_str(&format!("## {}\n", department));
            for row in rows {
                output.push_str(&format!(
                    "{}: {} - {:.2} {}\n",
                    row.key[0], row.key[1], row.value, CURRENCY
                ));
            }
        }

        output
    }
}

fn top(mut rows: Vec<AggregateRow>, n: usize) -> Vec<AggregateRow> {
    rows.truncate(n);
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AncestorOrigin;

    fn leaf(dept: &str, class: &str, code: &str, value: f64, month: u32) -> LeafRecord {
        LeafRecord {
            source: "test.csv".to_string(),
            ordinal: 0,
            department: dept.to_string(),
            class: class.to_string(),
            category: "General".to_string(),
            code: code.to_string(),
            description: format!("Item {}", code),
            value,
            quantity: Some(1.0),
            unit: None,
            period: Period { year: 2024, month },
            origin: AncestorOrigin::Explicit,
            extras: Default::default(),
        }
    }

    fn records() -> Vec<LeafRecord> {
        vec![
            leaf("BAR", "Beverages", "A1", 10.0, 5),
            leaf("BAR", "Beverages", "A2", 4.0, 4),
            leaf("CUCINA", "Food", "F1", 20.0, 4),
            leaf("CUCINA", "Food", "F2", 1.0, 5),
            leaf("SALA", "Linen", "L1", 3.0, 4),
        ]
    }

    #[test]
    fn test_monthly_totals_are_chronological() {
        let report = SummaryReport::from_records(&records(), &PipelineConfig::default());
        assert_eq!(report.monthly_totals.len(), 2);
        assert_eq!(report.monthly_totals[0].period.month, 4);
        assert_eq!(report.monthly_totals[0].value, 27.0);
        assert_eq!(report.monthly_totals[0].month_name, "April");
        assert_eq!(report.monthly_totals[1].value, 11.0);
    }

    #[test]
    fn test_italian_month_names() {
        let config = PipelineConfig {
            month_names: MonthNames::Italian,
            ..PipelineConfig::default()
        };
        let report = SummaryReport::from_records(&records(), &config);
        assert_eq!(report.monthly_totals[1].month_name, "Maggio");
    }

    #[test]
    fn test_department_by_month_ordering() {
        let report = SummaryReport::from_records(&records(), &PipelineConfig::default());
        let keys: Vec<(&str, &str)> = report
            .department_by_month
            .iter()
            .map(|r| (r.key[0].as_str(), r.key[1].as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("2024-04", "CUCINA"),
                ("2024-04", "BAR"),
                ("2024-04", "SALA"),
                ("2024-05", "BAR"),
                ("2024-05", "CUCINA"),
            ]
        );
    }

    #[test]
    fn test_top_n_limits() {
        let config = PipelineConfig {
            top_n: 2,
            ..PipelineConfig::default()
        };
        let report = SummaryReport::from_records(&records(), &config);
        assert_eq!(report.top_articles.len(), 2);
        assert_eq!(report.top_articles[0].key[0], "F1");
        assert_eq!(report.top_departments[0].label(), "CUCINA");
        assert_eq!(report.top_articles_by_department["BAR"].len(), 2);
        assert_eq!(report.top_articles_by_department["SALA"].len(), 1);
    }

    #[test]
    fn test_render_text_sections() {
        let report = SummaryReport::from_records(&records(), &PipelineConfig::default());
        let text = report.render_text();
        assert!(text.starts_with("# TOP ARTICLES OVERALL\nF1: Item F1 - 20.00 EUR\n"));
        assert!(text.contains("# TOP DEPARTMENTS\nCUCINA: 21.00 EUR\n"));
        assert!(text.contains("CUCINA / Food: 21.00 EUR"));
        assert!(text.contains("2024-05 (May): 11.00 EUR over 2 records"));
        assert!(text.contains("## SALA\nL1: Item L1 - 3.00 EUR\n"));
    }
}
