use anyhow::{anyhow, Result};

use finqa_core::{FinqaError, Summarizer, SummaryParams};
use finqa_llm::{LlmClient, LlmProvider, LlmRequest};

use crate::pipeline::{GenerationParams, Generator};

/// Resolves a provider name and optional model to a client. Keys come from
/// the environment.
pub fn llm_client(provider: &str, model: Option<&str>) -> Result<LlmClient> {
    let provider = LlmProvider::from_str(provider)
        .ok_or_else(|| anyhow!("unknown llm provider '{provider}'"))?;
    let model = model.unwrap_or_else(|| provider.default_model());
    LlmClient::new(provider, model)
}

impl Generator for LlmClient {
    fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<Vec<String>> {
        let response = self.chat_blocking(&LlmRequest {
            system: None,
            user: prompt.to_string(),
            max_tokens: Some(params.max_length),
            temperature: None,
        })?;
        Ok(response.candidates)
    }
}

/// Abstractive summarization through a chat model.
#[derive(Clone)]
pub struct LlmSummarizer {
    client: LlmClient,
}

impl LlmSummarizer {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }

    fn instructions(params: &SummaryParams) -> String {
        format!(
            "Summarize the following excerpt of a financial document in plain prose. \
             Use between {} and {} words and report only what the text states.",
            params.min_length, params.max_length
        )
    }
}

impl Summarizer for LlmSummarizer {
    fn summarize(&self, text: &str, params: &SummaryParams) -> finqa_core::Result<Vec<String>> {
        let request = LlmRequest {
            system: Some(Self::instructions(params)),
            user: text.to_string(),
            max_tokens: Some(params.max_length as u32),
            temperature: params.deterministic.then_some(0.0),
        };
        let response = self
            .client
            .chat_blocking(&request)
            .map_err(|err| FinqaError::Summarization(format!("{err:#}")))?;
        Ok(response.candidates)
    }
}
