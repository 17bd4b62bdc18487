use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::embedding::Embedder;
use crate::store::VectorStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryMatch {
    pub text: String,
    pub score: f32,
}

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Matches in the order the index returns them. An unreachable store
    /// yields no matches; only a failure to embed the query is an error.
    pub fn search(&self, query: &str, top_k: usize) -> Result<Vec<QueryMatch>> {
        let vector = self.embedder.embed(query)?;
        let matches = match self.store.query(&vector, top_k, true) {
            Ok(matches) => matches,
            Err(err) => {
                warn!("vector store unavailable, answering without context: {err:#}");
                return Ok(Vec::new());
            }
        };
        debug!(query, hits = matches.len(), "retrieved matches");
        Ok(matches
            .into_iter()
            .take(top_k)
            .filter_map(|hit| {
                hit.metadata.map(|metadata| QueryMatch {
                    text: metadata.text,
                    score: hit.score,
                })
            })
            .collect())
    }

    pub fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<String>> {
        Ok(self
            .search(query, top_k)?
            .into_iter()
            .map(|hit| hit.text)
            .collect())
    }
}
