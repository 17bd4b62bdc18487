use std::path::Path;
use std::sync::Arc;

use finqa_core::{
    document_id_base, ingest_document, DocumentExtractor, FinqaError, IngestOptions,
    InsightSummarizer, LayoutTableDetector, OcrEngine, PageLayer, PageRenderer, Summarizer, SummaryParams,
    TextLayerReader, INGEST_ID_FLOOR, INSIGHTS_COLUMN, ROWS_PER_DOCUMENT,
};
use image::DynamicImage;
use tempfile::tempdir;

struct CannedLayer(Vec<&'static str>);

impl TextLayerReader for CannedLayer {
    fn read_pages(&self, _path: &Path) -> finqa_core::Result<Vec<PageLayer>> {
        Ok(self
            .0
            .iter()
            .enumerate()
            .map(|(index, text)| PageLayer {
                index,
                text: text.to_string(),
            })
            .collect())
    }
}

struct TwoPages;

impl PageRenderer for TwoPages {
    fn render_pages(&self, _path: &Path) -> finqa_core::Result<Vec<DynamicImage>> {
        Ok(vec![DynamicImage::new_rgba8(2, 2), DynamicImage::new_rgba8(2, 2)])
    }
}

struct EchoOcr;

impl OcrEngine for EchoOcr {
    fn recognize(&self, image: &DynamicImage) -> finqa_core::Result<String> {
        Ok(format!("scanned {}px page", image.width()))
    }
}

struct Truncating;

impl Summarizer for Truncating {
    fn summarize(&self, text: &str, _params: &SummaryParams) -> finqa_core::Result<Vec<String>> {
        Ok(vec![text.split_whitespace().take(2).collect::<Vec<_>>().join(" ")])
    }
}

struct Offline;

impl Summarizer for Offline {
    fn summarize(&self, _text: &str, _params: &SummaryParams) -> finqa_core::Result<Vec<String>> {
        Err(FinqaError::Summarization("connection refused".to_string()))
    }
}

const STATEMENT: &str = "Income statement\n\nQuarter      Revenue    Net Income    Gross Profit\nQ1 2023      1200       300           500\nQ2 2023      1300       (40)          520\n";

fn extractor(pages: Vec<&'static str>) -> DocumentExtractor {
    DocumentExtractor::new(
        Box::new(LayoutTableDetector::default()),
        Box::new(TwoPages),
        Box::new(EchoOcr),
    )
    .with_text_layer(Box::new(CannedLayer(pages)))
}

#[test]
fn ingest_builds_table_records_and_csv() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("statement.pdf");
    std::fs::write(&input, b"%PDF-1.4 placeholder").unwrap();
    let csv_path = dir.path().join("profit_loss_table.csv");

    let outcome = ingest_document(
        &extractor(vec![STATEMENT, "Notes page without figures"]),
        &InsightSummarizer::new(Arc::new(Truncating)),
        &input,
        &IngestOptions {
            csv_path: Some(csv_path.clone()),
            id_base: Some(200),
        },
    )
    .unwrap();

    assert_eq!(outcome.extraction.pages.len(), 2);
    assert_eq!(outcome.summary, "scanned 2px");
    assert_eq!(outcome.table.rows().len(), 2);
    assert_eq!(outcome.records.len(), 2);
    assert_eq!(outcome.records[1].id(), 201);
    assert_eq!(
        outcome.records[1].description(),
        "Quarter: Q2 2023, Revenue: 1300, Operating Expenses: , Net Income: (40), Gross Profit: 520, EBT: "
    );

    let csv = std::fs::read_to_string(&csv_path).unwrap();
    let header = csv.lines().next().unwrap();
    assert_eq!(header, "Quarter,Revenue,Net Income,Gross Profit,Insights");
    assert!(csv.lines().nth(1).unwrap().ends_with(",scanned 2px"));
}

#[test]
fn summarization_failure_does_not_abort_ingestion() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("statement.pdf");
    std::fs::write(&input, b"%PDF-1.4 placeholder").unwrap();

    let outcome = ingest_document(
        &extractor(vec![STATEMENT]),
        &InsightSummarizer::new(Arc::new(Offline)),
        &input,
        &IngestOptions {
            csv_path: None,
            id_base: Some(0),
        },
    )
    .unwrap();

    assert_eq!(outcome.summary, "");
    assert_eq!(outcome.table.insights(), "");
    assert_eq!(outcome.table.rows().len(), 2);
}

#[test]
fn document_without_pnl_tables_still_has_insights_column() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("memo.pdf");
    std::fs::write(&input, b"%PDF-1.4 placeholder").unwrap();
    let csv_path = dir.path().join("out.csv");

    let outcome = ingest_document(
        &extractor(vec!["Team      Lead\nOps       Kim\n"]),
        &InsightSummarizer::new(Arc::new(Truncating)),
        &input,
        &IngestOptions {
            csv_path: Some(csv_path.clone()),
            id_base: Some(0),
        },
    )
    .unwrap();

    assert_eq!(outcome.extraction.tables.len(), 1);
    assert!(outcome.table.is_empty());
    assert!(outcome.records.is_empty());
    assert_eq!(outcome.table.headers(), vec![INSIGHTS_COLUMN.to_string()]);
    assert_eq!(std::fs::read_to_string(&csv_path).unwrap(), "Insights\n");
}

#[test]
fn separate_documents_get_disjoint_ids() {
    let dir = tempdir().unwrap();
    let first = dir.path().join("q1.pdf");
    let second = dir.path().join("q2.pdf");
    std::fs::write(&first, b"%PDF-1.4 first report").unwrap();
    std::fs::write(&second, b"%PDF-1.4 second report").unwrap();
    let summarizer = InsightSummarizer::new(Arc::new(Truncating));
    let opts = IngestOptions {
        csv_path: None,
        ..IngestOptions::default()
    };

    let run = |input: &Path| {
        ingest_document(&extractor(vec![STATEMENT]), &summarizer, input, &opts)
            .unwrap()
            .records
            .iter()
            .map(|record| record.id())
            .collect::<Vec<_>>()
    };
    let a = run(&first);
    let b = run(&second);

    assert_eq!(a.len(), 2);
    assert_eq!(b.len(), 2);
    assert!(a.iter().all(|id| *id >= INGEST_ID_FLOOR));
    assert!(a.iter().all(|id| !b.contains(id)));
    assert_eq!(a[0], document_id_base(b"%PDF-1.4 first report"));
    assert_eq!(a[0] % ROWS_PER_DOCUMENT, INGEST_ID_FLOOR % ROWS_PER_DOCUMENT);
    assert_eq!(run(&first), a);
}
