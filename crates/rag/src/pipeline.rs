use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::retriever::Retriever;

#[derive(Debug, Clone, Copy)]
pub struct GenerationParams {
    /// Upper bound on the generated answer, in tokens.
    pub max_length: u32,
    /// Prompts longer than this are cut, keeping the head.
    pub max_input_chars: usize,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_length: 100,
            max_input_chars: 2048,
        }
    }
}

/// Text-generation model: candidates for one prompt, best first.
pub trait Generator: Send + Sync {
    fn generate(&self, prompt: &str, params: &GenerationParams) -> anyhow::Result<Vec<String>>;
}

#[derive(Debug, Error)]
pub enum AnswerError {
    #[error("retrieval unavailable: {0}")]
    RetrievalUnavailable(String),
    #[error("generation failed: {0}")]
    GenerationFailed(String),
    #[error("generation returned no candidates")]
    EmptyGeneration,
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub query: String,
    pub answer: String,
    pub context: Vec<String>,
}

pub const DEFAULT_TOP_K: usize = 3;

pub struct AnswerSynthesizer {
    retriever: Retriever,
    generator: Arc<dyn Generator>,
    params: GenerationParams,
    top_k: usize,
}

impl AnswerSynthesizer {
    pub fn new(retriever: Retriever, generator: Arc<dyn Generator>) -> Self {
        Self {
            retriever,
            generator,
            params: GenerationParams::default(),
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn answer(&self, query: &str) -> Result<Answer, AnswerError> {
        self.answer_with_top_k(query, self.top_k)
    }

    pub fn answer_with_top_k(&self, query: &str, top_k: usize) -> Result<Answer, AnswerError> {
        let context = self
            .retriever
            .retrieve(query, top_k)
            .map_err(|err| AnswerError::RetrievalUnavailable(format!("{err:#}")))?;
        let prompt = build_prompt(&context, query);
        let candidates = self
            .generator
            .generate(truncate_chars(&prompt, self.params.max_input_chars), &self.params)
            .map_err(|err| AnswerError::GenerationFailed(format!("{err:#}")))?;
        let answer = candidates
            .into_iter()
            .next()
            .ok_or(AnswerError::EmptyGeneration)?;
        info!(context = context.len(), "answer generated");
        Ok(Answer {
            query: query.to_string(),
            answer,
            context,
        })
    }

    /// The answer, or `Error: {message}` in its place.
    pub fn answer_text(&self, query: &str) -> String {
        render_answer(self.answer(query))
    }
}

pub fn render_answer(result: Result<Answer, AnswerError>) -> String {
    match result {
        Ok(answer) => answer.answer,
        Err(err) => {
            warn!("answer synthesis failed: {err}");
            format!("Error: {err}")
        }
    }
}

pub fn build_prompt(context: &[String], query: &str) -> String {
    format!("Context: {} Question: {}", context.join(" "), query)
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
