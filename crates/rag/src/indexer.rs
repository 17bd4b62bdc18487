use anyhow::{anyhow, bail, Result};
use std::sync::Arc;
use tracing::info;

use finqa_core::FinancialRecord;

use crate::embedding::Embedder;
use crate::store::{EmbeddingVector, VectorMetadata, VectorStore};

/// Embeds record descriptions and upserts them keyed by record id.
pub struct EmbeddingIndexer {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl EmbeddingIndexer {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    pub fn vectors(&self, records: &[FinancialRecord]) -> Result<Vec<EmbeddingVector>> {
        let descriptions: Vec<String> = records
            .iter()
            .map(|record| record.description().to_string())
            .collect();
        let embeddings = self.embedder.embed_batch(&descriptions)?;
        if embeddings.len() != records.len() {
            return Err(anyhow!(
                "embedder returned {} vectors for {} records",
                embeddings.len(),
                records.len()
            ));
        }
        Ok(records
            .iter()
            .zip(descriptions)
            .zip(embeddings)
            .map(|((record, text), values)| EmbeddingVector {
                id: record.id().to_string(),
                values,
                metadata: VectorMetadata { text },
            })
            .collect())
    }

    /// One batch upsert. A failed batch may be partially applied by the store.
    pub fn index(&self, records: &[FinancialRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let vectors = self.vectors(records)?;
        let count = self.store.upsert(&vectors)?;
        info!(records = records.len(), upserted = count, "indexed records");
        Ok(count)
    }

    /// Like [`index`](Self::index), but fails before upserting when an id is
    /// already indexed under a different description.
    pub fn index_exclusive(&self, records: &[FinancialRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let ids: Vec<String> = records.iter().map(|record| record.id().to_string()).collect();
        let existing = self.store.fetch(&ids)?;
        for (record, id) in records.iter().zip(&ids) {
            if let Some(metadata) = existing.get(id) {
                if metadata.text != record.description() {
                    bail!("record id {id} is already indexed with a different description");
                }
            }
        }
        self.index(records)
    }
}
