use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::Result;

/// A table region found on one page. Row 0 of the detected region becomes
/// `headers`; data rows may be ragged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedTable {
    pub page: usize,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ExtractedTable {
    /// Promotes the first row to headers. Returns `None` for an empty region.
    pub fn from_rows(page: usize, rows: Vec<Vec<String>>) -> Option<Self> {
        let mut rows = rows.into_iter().filter(|row| !row.is_empty());
        let header_row = rows.next()?;
        Some(Self {
            page,
            headers: unique_headers(header_row),
            rows: rows.collect(),
        })
    }

    /// Flat text used for keyword matching: headers first, then each row.
    pub fn to_text(&self) -> String {
        let mut out = self.headers.join(" ");
        for row in &self.rows {
            out.push('\n');
            out.push_str(&row.join(" "));
        }
        out
    }

    pub fn mentions_any(&self, needles: &[&str]) -> bool {
        let lower = self.to_text().to_lowercase();
        needles.iter().any(|needle| lower.contains(needle))
    }
}

fn unique_headers(raw: Vec<String>) -> Vec<String> {
    let mut seen: Vec<String> = Vec::with_capacity(raw.len());
    for (idx, header) in raw.into_iter().enumerate() {
        let base = match header.trim() {
            "" => format!("column_{idx}"),
            trimmed => trimmed.to_string(),
        };
        let mut name = base.clone();
        let mut suffix = 1;
        while seen.contains(&name) {
            name = format!("{base}.{suffix}");
            suffix += 1;
        }
        seen.push(name);
    }
    seen
}

/// The text layer of one PDF page, as handed to a table detector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLayer {
    pub index: usize,
    pub text: String,
}

pub trait TableDetector: Send + Sync {
    /// Returns every table region on the page as raw rows of cells.
    fn extract_tables(&self, page: &PageLayer) -> Result<Vec<Vec<Vec<String>>>>;
}

/// Detects tables from the column layout of a page's text layer: consecutive
/// lines that split into at least two columns on tabs, pipes, or wide space
/// gaps form one region.
#[derive(Debug, Clone, Copy)]
pub struct LayoutTableDetector {
    pub min_gap: usize,
    pub min_rows: usize,
    pub min_columns: usize,
}

impl Default for LayoutTableDetector {
    fn default() -> Self {
        Self {
            min_gap: 2,
            min_rows: 2,
            min_columns: 2,
        }
    }
}

static RULE_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\|?[\s:|+=-]+\|?\s*$").unwrap());

impl LayoutTableDetector {
    fn split_columns(&self, line: &str) -> Vec<String> {
        if line.contains('|') {
            let trimmed = line.trim().trim_matches('|');
            return trimmed.split('|').map(|c| c.trim().to_string()).collect();
        }
        let mut cells = Vec::new();
        let mut current = String::new();
        let mut gap = 0usize;
        for ch in line.trim().chars() {
            if ch == '\t' {
                gap = self.min_gap.max(1);
                continue;
            }
            if ch == ' ' {
                gap += 1;
                continue;
            }
            if gap > 0 {
                if gap >= self.min_gap {
                    cells.push(std::mem::take(&mut current));
                } else {
                    current.push(' ');
                }
                gap = 0;
            }
            current.push(ch);
        }
        if !current.is_empty() {
            cells.push(current);
        }
        cells
    }

    fn flush(&self, region: &mut Vec<Vec<String>>, out: &mut Vec<Vec<Vec<String>>>) {
        if region.len() >= self.min_rows {
            out.push(std::mem::take(region));
        } else {
            region.clear();
        }
    }
}

impl TableDetector for LayoutTableDetector {
    fn extract_tables(&self, page: &PageLayer) -> Result<Vec<Vec<Vec<String>>>> {
        let mut tables = Vec::new();
        let mut region: Vec<Vec<String>> = Vec::new();
        for line in page.text.lines() {
            if line.trim().is_empty() {
                self.flush(&mut region, &mut tables);
                continue;
            }
            if RULE_LINE.is_match(line) && line.contains(|c: char| c == '-' || c == '=') {
                continue;
            }
            let cells = self.split_columns(line);
            if cells.len() >= self.min_columns {
                region.push(cells);
            } else {
                self.flush(&mut region, &mut tables);
            }
        }
        self.flush(&mut region, &mut tables);
        Ok(tables)
    }
}
