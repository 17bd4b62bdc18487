use std::fmt;

use serde::{Serialize, Serializer};

use crate::pnl::ProfitLossTable;

/// A single reported figure. Values coming out of extracted tables are kept
/// verbatim, so a malformed cell renders exactly as it was read.
#[derive(Debug, Clone, PartialEq)]
pub enum Figure {
    Integer(i64),
    Number(f64),
    Raw(String),
}

impl Figure {
    pub fn from_cell(cell: &str) -> Self {
        Figure::Raw(cell.trim().to_string())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Figure::Integer(value) => Some(*value as f64),
            Figure::Number(value) => Some(*value),
            Figure::Raw(raw) => raw.replace(',', "").trim().parse().ok(),
        }
    }
}

impl fmt::Display for Figure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Figure::Integer(value) => write!(f, "{value}"),
            Figure::Number(value) => write!(f, "{value}"),
            Figure::Raw(raw) => f.write_str(raw),
        }
    }
}

impl Serialize for Figure {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Figure::Integer(value) => serializer.serialize_i64(*value),
            Figure::Number(value) => serializer.serialize_f64(*value),
            Figure::Raw(raw) => serializer.serialize_str(raw),
        }
    }
}

impl From<i64> for Figure {
    fn from(value: i64) -> Self {
        Figure::Integer(value)
    }
}

impl From<f64> for Figure {
    fn from(value: f64) -> Self {
        Figure::Number(value)
    }
}

impl From<&str> for Figure {
    fn from(value: &str) -> Self {
        Figure::from_cell(value)
    }
}

/// The six source fields a record is rendered from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordFields {
    pub quarter: String,
    pub revenue: Figure,
    pub operating_expenses: Figure,
    pub net_income: Figure,
    pub gross_profit: Figure,
    pub ebt: Figure,
}

impl RecordFields {
    pub fn describe(&self) -> String {
        format!(
            "Quarter: {}, Revenue: {}, Operating Expenses: {}, Net Income: {}, Gross Profit: {}, EBT: {}",
            self.quarter,
            self.revenue,
            self.operating_expenses,
            self.net_income,
            self.gross_profit,
            self.ebt
        )
    }
}

/// One profit-and-loss row. The description is the unit of embedding and is
/// re-rendered on every field change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinancialRecord {
    id: u64,
    #[serde(flatten)]
    fields: RecordFields,
    description: String,
}

impl FinancialRecord {
    pub fn new(id: u64, fields: RecordFields) -> Self {
        let description = fields.describe();
        Self {
            id,
            fields,
            description,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn fields(&self) -> &RecordFields {
        &self.fields
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn update(&mut self, edit: impl FnOnce(&mut RecordFields)) {
        edit(&mut self.fields);
        self.description = self.fields.describe();
    }
}

pub fn records_from_fields<I>(id_base: u64, rows: I) -> Vec<FinancialRecord>
where
    I: IntoIterator<Item = RecordFields>,
{
    rows.into_iter()
        .enumerate()
        .map(|(idx, fields)| FinancialRecord::new(id_base + idx as u64, fields))
        .collect()
}

/// The built-in quarterly dataset: `count` consecutive quarters from Q1 2000
/// with linearly growing figures.
pub fn canned_dataset(count: usize) -> Vec<FinancialRecord> {
    let rows = (0..count as i64).map(|i| RecordFields {
        quarter: format!("Q{} {}", (i % 4) + 1, 2000 + i / 4),
        revenue: Figure::from(150_000 + i * 30_000),
        operating_expenses: Figure::from(80_000 + i * 10_000),
        net_income: Figure::from(70_000 + i * 5_000),
        gross_profit: Figure::from(100_000 + i * 10_000),
        ebt: Figure::from(65_000 + i * 5_000),
    });
    records_from_fields(0, rows)
}

pub const CANNED_DATASET_LEN: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Quarter,
    Revenue,
    OperatingExpenses,
    NetIncome,
    GrossProfit,
    Ebt,
}

fn classify_header(header: &str) -> Option<Field> {
    let lower = header.trim().to_lowercase();
    let has_word = |word: &str| {
        lower
            .split(|c: char| !c.is_alphanumeric())
            .any(|token| token == word)
    };
    // Order matters: "gross profit" and "net income" must win over the looser
    // revenue/ebt spellings below.
    if lower.contains("gross profit") {
        Some(Field::GrossProfit)
    } else if lower.contains("net income") || lower.contains("net profit") {
        Some(Field::NetIncome)
    } else if lower.contains("operating expense") || lower == "opex" {
        Some(Field::OperatingExpenses)
    } else if lower.starts_with("ebt")
        || lower.contains("earnings before tax")
        || lower.contains("profit before tax")
    {
        Some(Field::Ebt)
    } else if !has_word("cost")
        && (has_word("revenue") || has_word("revenues") || has_word("sales"))
    {
        Some(Field::Revenue)
    } else if lower.contains("quarter") || lower.contains("period") || lower == "year" {
        Some(Field::Quarter)
    } else {
        None
    }
}

/// Maps the rows of a filtered profit/loss table onto records. Columns are
/// matched by header name; an unmatched field renders empty and the quarter
/// falls back to the first cell of the row.
pub fn records_from_table(table: &ProfitLossTable, id_base: u64) -> Vec<FinancialRecord> {
    let mut positions: Vec<(Field, usize)> = Vec::new();
    for (idx, header) in table.columns().iter().enumerate() {
        if let Some(field) = classify_header(header) {
            if !positions.iter().any(|(seen, _)| *seen == field) {
                positions.push((field, idx));
            }
        }
    }
    let lookup = |row: &[String], field: Field| -> Option<String> {
        positions
            .iter()
            .find(|(candidate, _)| *candidate == field)
            .and_then(|(_, idx)| row.get(*idx))
            .map(|cell| cell.trim().to_string())
    };
    let rows = table.rows().iter().map(|row| {
        let cell = |field: Field| Figure::from_cell(&lookup(row, field).unwrap_or_default());
        RecordFields {
            quarter: lookup(row, Field::Quarter)
                .or_else(|| row.first().map(|c| c.trim().to_string()))
                .unwrap_or_default(),
            revenue: cell(Field::Revenue),
            operating_expenses: cell(Field::OperatingExpenses),
            net_income: cell(Field::NetIncome),
            gross_profit: cell(Field::GrossProfit),
            ebt: cell(Field::Ebt),
        }
    });
    records_from_fields(id_base, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ExtractedTable;

    fn first_quarter() -> RecordFields {
        RecordFields {
            quarter: "Q1 2000".to_string(),
            revenue: 150_000i64.into(),
            operating_expenses: 80_000i64.into(),
            net_income: 70_000i64.into(),
            gross_profit: 100_000i64.into(),
            ebt: 65_000i64.into(),
        }
    }

    #[test]
    fn renders_fixed_template() {
        let record = FinancialRecord::new(0, first_quarter());
        assert_eq!(
            record.description(),
            "Quarter: Q1 2000, Revenue: 150000, Operating Expenses: 80000, Net Income: 70000, Gross Profit: 100000, EBT: 65000"
        );
    }

    #[test]
    fn update_rerenders_description() {
        let mut record = FinancialRecord::new(7, first_quarter());
        record.update(|fields| fields.revenue = 1.5.into());
        assert!(record.description().contains("Revenue: 1.5,"));
        assert_eq!(record.id(), 7);
    }

    #[test]
    fn canned_dataset_matches_growth_schedule() {
        let records = canned_dataset(CANNED_DATASET_LEN);
        assert_eq!(records.len(), 100);
        assert_eq!(records[0], FinancialRecord::new(0, first_quarter()));
        let last = &records[99];
        assert_eq!(last.id(), 99);
        assert_eq!(last.fields().quarter, "Q4 2024");
        assert_eq!(last.fields().revenue.as_f64(), Some(3_120_000.0));
        assert_eq!(last.fields().ebt.to_string(), "560000");
    }

    #[test]
    fn malformed_cells_are_kept_verbatim() {
        let figure = Figure::from_cell(" (1,200) ");
        assert_eq!(figure.to_string(), "(1,200)");
        assert_eq!(figure.as_f64(), None);
        assert_eq!(Figure::from_cell("1,200").as_f64(), Some(1200.0));
    }

    #[test]
    fn table_rows_map_by_header() {
        let table = ExtractedTable::from_rows(
            0,
            vec![
                vec!["Period", "Net Income", "Revenue", "Gross Profit"],
                vec!["FY23", "10", "100", "40"],
            ]
            .into_iter()
            .map(|row| row.into_iter().map(String::from).collect())
            .collect(),
        )
        .unwrap();
        let pnl = ProfitLossTable::from_tables(&[table], "summary");
        let records = records_from_table(&pnl, 500);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id(), 500);
        assert_eq!(
            records[0].description(),
            "Quarter: FY23, Revenue: 100, Operating Expenses: , Net Income: 10, Gross Profit: 40, EBT: "
        );
    }

    #[test]
    fn serializes_flat_record() {
        let record = FinancialRecord::new(3, first_quarter());
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["id"], 3);
        assert_eq!(value["quarter"], "Q1 2000");
        assert_eq!(value["revenue"], 150000);
        assert!(value["revenue"].is_i64());
        assert!(value["description"].as_str().unwrap().starts_with("Quarter: Q1 2000"));
    }

    #[test]
    fn large_integers_render_exactly() {
        let figure = Figure::from(i64::MAX);
        assert_eq!(figure.to_string(), "9223372036854775807");
        assert_eq!(serde_json::to_value(&figure).unwrap(), i64::MAX);
        assert_eq!(Figure::from(9_007_199_254_740_993i64).to_string(), "9007199254740993");
    }

    #[test]
    fn cost_columns_are_not_revenue() {
        let table = ExtractedTable::from_rows(
            0,
            vec![
                vec!["Quarter", "Cost of sales", "Revenue", "Gross Profit"],
                vec!["Q1", "60", "100", "40"],
            ]
            .into_iter()
            .map(|row| row.into_iter().map(String::from).collect())
            .collect(),
        )
        .unwrap();
        let pnl = ProfitLossTable::from_tables(&[table], "");
        let records = records_from_table(&pnl, 0);
        assert_eq!(records[0].fields().revenue.to_string(), "100");
        assert_eq!(classify_header("Cost of goods sold"), None);
        assert_eq!(classify_header("Net sales"), Some(Field::Revenue));
        assert_eq!(classify_header("Salesforce fees"), None);
    }

    proptest::proptest! {
        #[test]
        fn description_depends_only_on_fields(
            quarter in "Q[1-4] 20[0-9]{2}",
            figures in proptest::array::uniform5(-1_000_000i64..1_000_000),
            ids in (0u64..1000, 0u64..1000),
        ) {
            let fields = RecordFields {
                quarter,
                revenue: figures[0].into(),
                operating_expenses: figures[1].into(),
                net_income: figures[2].into(),
                gross_profit: figures[3].into(),
                ebt: figures[4].into(),
            };
            let a = FinancialRecord::new(ids.0, fields.clone());
            let b = FinancialRecord::new(ids.1, fields);
            proptest::prop_assert_eq!(a.description(), b.description());
            let revenue_part = format!("Revenue: {}, ", figures[0]);
            proptest::prop_assert!(a.description().contains(&revenue_part));
        }
    }
}
