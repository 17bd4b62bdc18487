use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::error::Result;
use crate::extract::{DocumentExtractor, Extraction};
use crate::pnl::ProfitLossTable;
use crate::record::{records_from_table, FinancialRecord};
use crate::summarize::InsightSummarizer;

#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Where the profit/loss CSV is written; `None` skips the artifact.
    pub csv_path: Option<PathBuf>,
    /// First record id handed to rows of the extracted table; `None` derives
    /// it from the document bytes with [`document_id_base`].
    pub id_base: Option<u64>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            csv_path: Some(PathBuf::from("profit_loss_table.csv")),
            id_base: None,
        }
    }
}

/// Lowest id handed to ingested rows; the canned dataset lives below it.
pub const INGEST_ID_FLOOR: u64 = 10_000;
/// Width of the id range each document owns.
pub const ROWS_PER_DOCUMENT: u64 = 1_000;
const DOCUMENT_SLOTS: u64 = 1_000_000_000;

/// Id base owned by one document: a slot picked by the SHA-256 of its bytes.
/// Re-ingesting the same file reuses its ids; distinct files land in
/// disjoint ranges unless their digests collide modulo the slot count.
pub fn document_id_base(bytes: &[u8]) -> u64 {
    let digest = Sha256::digest(bytes);
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    let slot = u64::from_be_bytes(head) % DOCUMENT_SLOTS;
    INGEST_ID_FLOOR + slot * ROWS_PER_DOCUMENT
}

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub extraction: Extraction,
    pub summary: String,
    pub table: ProfitLossTable,
    pub records: Vec<FinancialRecord>,
    pub csv_path: Option<PathBuf>,
}

/// One ingestion run over a PDF: extract, summarise, filter, persist.
///
/// A summarisation failure is logged and replaced with an empty summary; only
/// an unreadable input or a failed CSV write is returned as an error.
pub fn ingest_document(
    extractor: &DocumentExtractor,
    summarizer: &InsightSummarizer,
    input: &Path,
    opts: &IngestOptions,
) -> Result<IngestOutcome> {
    info!(path = %input.display(), "extracting document");
    let extraction = extractor.extract(input)?;

    let summary = match summarizer.summarize(&extraction.full_text()) {
        Ok(summary) => summary,
        Err(err) => {
            warn!("insight summarization failed, continuing without: {err}");
            String::new()
        }
    };

    let table = ProfitLossTable::from_tables(&extraction.tables, &summary);
    info!(rows = table.rows().len(), columns = table.columns().len(), "profit/loss table built");
    if let Some(path) = &opts.csv_path {
        table.write_csv(path)?;
        info!(path = %path.display(), "profit/loss table saved");
    }
    let id_base = match opts.id_base {
        Some(base) => base,
        None => document_id_base(&std::fs::read(input)?),
    };
    if table.rows().len() as u64 > ROWS_PER_DOCUMENT {
        warn!(rows = table.rows().len(), "table exceeds the per-document id range");
    }
    let records = records_from_table(&table, id_base);

    Ok(IngestOutcome {
        extraction,
        summary,
        table,
        records,
        csv_path: opts.csv_path.clone(),
    })
}
