use std::path::Path;

use indexmap::IndexSet;
use serde::Serialize;

use crate::error::Result;
use crate::table::ExtractedTable;

pub const INSIGHTS_COLUMN: &str = "Insights";

const PNL_KEYWORDS: [&str; 2] = ["profit", "loss"];

/// Every extracted table that mentions profit or loss, stacked into one grid,
/// plus the document's insight summary repeated on each row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfitLossTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
    insights: String,
}

impl ProfitLossTable {
    /// Columns are the union of table headers in first-seen order; a table
    /// without one of them leaves that cell empty.
    pub fn from_tables(tables: &[ExtractedTable], insights: &str) -> Self {
        let selected: Vec<&ExtractedTable> = tables
            .iter()
            .filter(|table| table.mentions_any(&PNL_KEYWORDS))
            .collect();
        let mut columns: IndexSet<String> = IndexSet::new();
        for table in &selected {
            for header in &table.headers {
                columns.insert(header.clone());
            }
        }
        let mut rows = Vec::new();
        for table in selected {
            let positions: Vec<usize> = table
                .headers
                .iter()
                .filter_map(|header| columns.get_index_of(header))
                .collect();
            for source in &table.rows {
                let mut row = vec![String::new(); columns.len()];
                for (cell, position) in source.iter().zip(positions.iter()) {
                    row[*position] = cell.clone();
                }
                rows.push(row);
            }
        }
        Self {
            columns: columns.into_iter().collect(),
            rows,
            insights: insights.to_string(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn insights(&self) -> &str {
        &self.insights
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Header row of the persisted form; always ends with `Insights`.
    pub fn headers(&self) -> Vec<String> {
        let mut headers = self.columns.clone();
        headers.push(INSIGHTS_COLUMN.to_string());
        headers
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::WriterBuilder::new().flexible(true).from_path(path)?;
        writer.write_record(self.headers())?;
        for row in &self.rows {
            let mut record = row.clone();
            record.push(self.insights.clone());
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }
}
