mod embedding;
mod error;
mod extract;
mod ingest;
mod ocr;
mod pnl;
mod record;
mod summarize;
mod table;

pub use embedding::{HashEmbedder, HashEmbedderConfig};
pub use error::{FinqaError, Result};
pub use extract::{
    read_text_layer, DocumentExtractor, Extraction, OcrMode, PageRenderer, PageText,
    PdfTextLayer, PdfiumRenderer, TextLayerReader,
};
pub use ingest::{
    document_id_base, ingest_document, IngestOptions, IngestOutcome, INGEST_ID_FLOOR,
    ROWS_PER_DOCUMENT,
};
pub use ocr::{OcrEngine, TesseractOcr};
pub use pnl::{ProfitLossTable, INSIGHTS_COLUMN};
pub use record::{
    canned_dataset, records_from_fields, records_from_table, FinancialRecord, Figure,
    RecordFields, CANNED_DATASET_LEN,
};
pub use summarize::{chunk_text, InsightSummarizer, Summarizer, SummaryParams, DEFAULT_CHUNK_CHARS};
pub use table::{ExtractedTable, LayoutTableDetector, PageLayer, TableDetector};
