use anyhow::{bail, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use finqa_core::{
    canned_dataset, ingest_document, DocumentExtractor, FinancialRecord, IngestOptions,
    IngestOutcome, InsightSummarizer, LayoutTableDetector, PdfiumRenderer, SummaryParams,
    TesseractOcr, CANNED_DATASET_LEN,
};

use crate::config::FinqaConfig;
use crate::embedding::{Embedder, EmbeddingClient};
use crate::indexer::EmbeddingIndexer;
use crate::models::{llm_client, LlmSummarizer};
use crate::pipeline::{AnswerSynthesizer, GenerationParams, Generator};
use crate::retriever::Retriever;
use crate::store::{open_vector_store, VectorStore};

/// Every long-lived handle the pipeline needs, built once at startup.
pub struct FinqaServices {
    config: FinqaConfig,
    indexer: EmbeddingIndexer,
    synthesizer: AnswerSynthesizer,
    summarizer: InsightSummarizer,
}

impl FinqaServices {
    pub fn from_config(config: FinqaConfig) -> Result<Self> {
        let embedder: Arc<dyn Embedder> = Arc::new(EmbeddingClient::from_config(&config.embedding)?);
        let store = open_vector_store(&config.index)?;
        let generator: Arc<dyn Generator> = Arc::new(llm_client(
            &config.generation.provider,
            config.generation.model.as_deref(),
        )?);
        let summary_model = LlmSummarizer::new(llm_client(
            &config.summary.provider,
            config.summary.model.as_deref(),
        )?);
        Self::assemble(config, embedder, store, generator, Arc::new(summary_model))
    }

    /// Wires explicit model and store handles, checking the embedder and
    /// index agree on dimension.
    pub fn assemble(
        config: FinqaConfig,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        generator: Arc<dyn Generator>,
        summary_model: Arc<dyn finqa_core::Summarizer>,
    ) -> Result<Self> {
        if embedder.dimensions() != config.index.dimension {
            bail!(
                "embedding dimension {} does not match index dimension {}",
                embedder.dimensions(),
                config.index.dimension
            );
        }
        let indexer = EmbeddingIndexer::new(embedder.clone(), store.clone());
        let synthesizer = AnswerSynthesizer::new(Retriever::new(embedder, store), generator)
            .params(GenerationParams {
                max_length: config.generation.max_length,
                max_input_chars: config.generation.max_input_chars,
            })
            .top_k(config.generation.top_k);
        let summarizer = InsightSummarizer::new(summary_model)
            .chunk_chars(config.summary.chunk_chars)
            .params(SummaryParams {
                max_length: config.summary.max_length,
                min_length: config.summary.min_length,
                deterministic: true,
            });
        Ok(Self {
            config,
            indexer,
            synthesizer,
            summarizer,
        })
    }

    pub fn config(&self) -> &FinqaConfig {
        &self.config
    }

    pub fn indexer(&self) -> &EmbeddingIndexer {
        &self.indexer
    }

    pub fn synthesizer(&self) -> &AnswerSynthesizer {
        &self.synthesizer
    }

    pub fn records(&self) -> Vec<FinancialRecord> {
        canned_dataset(CANNED_DATASET_LEN)
    }

    /// Indexes the canned dataset. Safe to repeat: ids are stable.
    pub fn seed(&self) -> Result<Vec<FinancialRecord>> {
        let records = self.records();
        self.indexer.index(&records)?;
        info!(records = records.len(), "seeded canned dataset");
        Ok(records)
    }

    pub fn document_extractor(&self) -> DocumentExtractor {
        let ingest = &self.config.ingest;
        DocumentExtractor::new(
            Box::new(LayoutTableDetector::default()),
            Box::new(PdfiumRenderer {
                target_width: ingest.render_width,
                target_height: ingest.render_height,
            }),
            Box::new(TesseractOcr::new(ingest.ocr_langs.clone())),
        )
        .with_ocr_mode(ingest.ocr_mode)
    }

    /// Runs one ingestion and, when `index` is set, upserts the table records.
    /// Without an explicit `id_base` the ids come from the document digest.
    pub fn ingest(&self, input: &Path, index: bool, id_base: Option<u64>) -> Result<IngestOutcome> {
        self.ingest_with(&self.document_extractor(), input, index, id_base)
    }

    pub fn ingest_with(
        &self,
        extractor: &DocumentExtractor,
        input: &Path,
        index: bool,
        id_base: Option<u64>,
    ) -> Result<IngestOutcome> {
        let outcome = ingest_document(
            extractor,
            &self.summarizer,
            input,
            &IngestOptions {
                csv_path: Some(self.config.ingest.csv_path.clone()),
                id_base,
            },
        )?;
        if index {
            self.indexer.index_exclusive(&outcome.records)?;
        }
        Ok(outcome)
    }
}
