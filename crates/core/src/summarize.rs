use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FinqaError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryParams {
    pub max_length: usize,
    pub min_length: usize,
    /// Greedy decoding; no sampling.
    pub deterministic: bool,
}

impl Default for SummaryParams {
    fn default() -> Self {
        Self {
            max_length: 200,
            min_length: 50,
            deterministic: true,
        }
    }
}

/// An abstractive summarization model. Returns candidate summaries, best
/// first.
pub trait Summarizer: Send + Sync {
    fn summarize(&self, text: &str, params: &SummaryParams) -> Result<Vec<String>>;
}

pub const DEFAULT_CHUNK_CHARS: usize = 1000;

/// Condenses a document's page text into a short profit/loss narrative.
#[derive(Clone)]
pub struct InsightSummarizer {
    model: Arc<dyn Summarizer>,
    chunk_chars: usize,
    params: SummaryParams,
}

impl InsightSummarizer {
    pub fn new(model: Arc<dyn Summarizer>) -> Self {
        Self {
            model,
            chunk_chars: DEFAULT_CHUNK_CHARS,
            params: SummaryParams::default(),
        }
    }

    pub fn chunk_chars(mut self, chars: usize) -> Self {
        self.chunk_chars = chars.max(1);
        self
    }

    pub fn params(mut self, params: SummaryParams) -> Self {
        self.params = params;
        self
    }

    /// Summarises every chunk independently and joins the results with a
    /// single space, in chunk order. Empty input never reaches the model.
    pub fn summarize(&self, text: &str) -> Result<String> {
        if text.is_empty() {
            return Ok(String::new());
        }
        let chunks = chunk_text(text, self.chunk_chars);
        debug!(chunks = chunks.len(), "summarising text");
        let summaries = chunks
            .par_iter()
            .map(|chunk| self.summarize_chunk(chunk))
            .collect::<Result<Vec<_>>>()?;
        Ok(summaries.join(" "))
    }

    fn summarize_chunk(&self, chunk: &str) -> Result<String> {
        self.model
            .summarize(chunk, &self.params)?
            .into_iter()
            .next()
            .ok_or_else(|| FinqaError::Summarization("model returned no summary".to_string()))
    }
}

/// Hard cut every `size` characters, ignoring sentence boundaries.
pub fn chunk_text(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}
