use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::env;
use tokio::runtime::Runtime;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Local,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "openai",
            LlmProvider::Anthropic => "anthropic",
            LlmProvider::Local => "local",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "openai" => Some(LlmProvider::OpenAi),
            "anthropic" => Some(LlmProvider::Anthropic),
            "local" => Some(LlmProvider::Local),
            _ => None,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "gpt-4.1-mini",
            LlmProvider::Anthropic => "claude-3-5-sonnet",
            LlmProvider::Local => "local",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    pub system: Option<String>,
    pub user: String,
    /// Upper bound on generated tokens.
    pub max_tokens: Option<u32>,
    /// `Some(0.0)` requests greedy decoding.
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Candidate completions, best first. Never empty on success.
    pub candidates: Vec<String>,
}

impl LlmResponse {
    pub fn content(&self) -> &str {
        self.candidates.first().map(String::as_str).unwrap_or_default()
    }
}

#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    provider: LlmProvider,
    model: String,
    config: ProviderConfig,
}

#[derive(Clone)]
enum ProviderConfig {
    OpenAi(OpenAiConfig),
    Anthropic(AnthropicConfig),
    Local,
}

#[derive(Clone)]
struct OpenAiConfig {
    api_key: String,
    base_url: String,
}

#[derive(Clone)]
struct AnthropicConfig {
    api_key: String,
    base_url: String,
}

const DEFAULT_MAX_TOKENS: u32 = 512;

impl LlmClient {
    pub fn new(provider: LlmProvider, model: impl Into<String>) -> Result<Self> {
        let config = match provider {
            LlmProvider::OpenAi => ProviderConfig::OpenAi(OpenAiConfig {
                api_key: read_api_key("OPENAI_API_KEY")?,
                base_url: env::var("OPENAI_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            }),
            LlmProvider::Anthropic => ProviderConfig::Anthropic(AnthropicConfig {
                api_key: read_api_key("ANTHROPIC_API_KEY")?,
                base_url: env::var("ANTHROPIC_BASE_URL")
                    .unwrap_or_else(|_| "https://api.anthropic.com/v1".to_string()),
            }),
            LlmProvider::Local => ProviderConfig::Local,
        };
        Ok(Self {
            http: Client::new(),
            provider,
            model: model.into(),
            config,
        })
    }

    /// Offline deterministic backend.
    pub fn local() -> Self {
        Self {
            http: Client::new(),
            provider: LlmProvider::Local,
            model: LlmProvider::Local.default_model().to_string(),
            config: ProviderConfig::Local,
        }
    }

    pub async fn chat(&self, req: &LlmRequest) -> Result<LlmResponse> {
        debug!(provider = self.provider.as_str(), model = %self.model, "llm request");
        match &self.config {
            ProviderConfig::OpenAi(cfg) => self.chat_openai(cfg, req).await,
            ProviderConfig::Anthropic(cfg) => self.chat_anthropic(cfg, req).await,
            ProviderConfig::Local => Ok(chat_local(req)),
        }
    }

    /// Runs [`chat`](Self::chat) on a private runtime. Must not be called from
    /// inside an async context.
    pub fn chat_blocking(&self, req: &LlmRequest) -> Result<LlmResponse> {
        if let ProviderConfig::Local = self.config {
            return Ok(chat_local(req));
        }
        let rt = Runtime::new().context("failed to create tokio runtime")?;
        rt.block_on(self.chat(req))
    }

    async fn chat_openai(&self, cfg: &OpenAiConfig, req: &LlmRequest) -> Result<LlmResponse> {
        let url = format!("{}/chat/completions", cfg.base_url.trim_end_matches('/'));
        let mut messages = Vec::new();
        if let Some(system) = &req.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": req.user }));
        let mut payload = json!({
            "model": self.model,
            "messages": messages,
        });
        if let Some(max_tokens) = req.max_tokens {
            payload["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = req.temperature {
            payload["temperature"] = json!(temperature);
        }
        let response = self
            .http
            .post(&url)
            .bearer_auth(&cfg.api_key)
            .json(&payload)
            .send()
            .await
            .context("openai request failed")?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(anyhow!("openai returned error (status {status}): {body}"));
        }
        let value: Value = serde_json::from_str(&body).context("failed to decode openai response")?;
        let candidates = extract_openai_choices(&value);
        if candidates.is_empty() {
            return Err(anyhow!("missing text in OpenAI response"));
        }
        Ok(LlmResponse { candidates })
    }

    async fn chat_anthropic(&self, cfg: &AnthropicConfig, req: &LlmRequest) -> Result<LlmResponse> {
        let mut payload = json!({
            "model": self.model,
            "max_tokens": req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "messages": [ { "role": "user", "content": req.user } ],
        });
        if let Some(system) = &req.system {
            payload["system"] = json!(system);
        }
        if let Some(temperature) = req.temperature {
            payload["temperature"] = json!(temperature);
        }
        let response = self
            .http
            .post(format!("{}/messages", cfg.base_url.trim_end_matches('/')))
            .header("x-api-key", &cfg.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&payload)
            .send()
            .await
            .context("anthropic request failed")?
            .error_for_status()
            .context("anthropic returned an error")?
            .json::<AnthropicResponse>()
            .await
            .context("failed to decode anthropic response")?;
        let candidates: Vec<String> = response
            .content
            .into_iter()
            .filter_map(|part| part.text)
            .collect();
        if candidates.is_empty() {
            return Err(anyhow!("missing text in Anthropic response"));
        }
        Ok(LlmResponse {
            candidates: vec![candidates.join("")],
        })
    }
}

const LOCAL_DEFAULT_WORDS: usize = 40;

fn chat_local(req: &LlmRequest) -> LlmResponse {
    let max_words = req
        .max_tokens
        .map(|tokens| tokens as usize)
        .unwrap_or(LOCAL_DEFAULT_WORDS);
    LlmResponse {
        candidates: vec![synthesize_local_response(&req.user, max_words)],
    }
}

/// Question prompts are answered with the leading words of their context;
/// anything else is condensed to its leading words.
fn synthesize_local_response(user: &str, max_words: usize) -> String {
    if let (Some(_), Some(_)) = (user.find("Context:"), user.find("Question:")) {
        let context = extract_context_block(user, "Context:", "Question:");
        if context.is_empty() {
            return "No matching records were found.".to_string();
        }
        return leading_words(&context, max_words);
    }
    leading_words(user, max_words)
}

fn extract_context_block(text: &str, start_marker: &str, stop_marker: &str) -> String {
    if let Some(start_idx) = text.find(start_marker) {
        let after = &text[start_idx + start_marker.len()..];
        if let Some(end_idx) = after.find(stop_marker) {
            return after[..end_idx].trim().to_string();
        }
        return after.trim().to_string();
    }
    text.trim().to_string()
}

fn leading_words(text: &str, max_words: usize) -> String {
    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<&str>>()
        .join(" ")
}

fn read_api_key(var: &str) -> Result<String> {
    let value = env::var(var).map_err(|_| anyhow!("{var} is not set"))?;
    validate_api_key(var, &value)?;
    Ok(value)
}

fn validate_api_key(var: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("{var} is empty"));
    }
    if var.contains("OPENAI") && !value.starts_with("sk-") {
        return Err(anyhow!(
            "{var} must start with 'sk-' (see https://platform.openai.com/)"
        ));
    }
    if var.contains("ANTHROPIC") && !value.starts_with("sk-ant-") {
        return Err(anyhow!("{var} must start with 'sk-ant-'"));
    }
    Ok(())
}

fn extract_openai_choices(value: &Value) -> Vec<String> {
    let Some(choices) = value.get("choices").and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    choices
        .iter()
        .filter_map(|choice| {
            if let Some(text) = choice.get("text").and_then(|t| t.as_str()) {
                return Some(text.to_string());
            }
            let content = choice.get("message")?.get("content")?;
            if let Some(text) = content.as_str() {
                return Some(text.to_string());
            }
            content
                .as_array()?
                .iter()
                .find_map(|part| part.get("text").and_then(|t| t.as_str()))
                .map(str::to_string)
        })
        .collect()
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    text: Option<String>,
}
