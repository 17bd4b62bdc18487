use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use finqa_core::OcrMode;

pub const DEFAULT_CONFIG_FILE: &str = "finqa.toml";
pub const DEFAULT_INDEX_NAME: &str = "financial-qa-index";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FinqaConfig {
    pub index: IndexConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub summary: SummaryConfig,
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    Sqlite,
    Pinecone,
}

impl IndexBackend {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "sqlite" => Ok(IndexBackend::Sqlite),
            "pinecone" => Ok(IndexBackend::Pinecone),
            other => Err(anyhow!("unknown index backend '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub backend: IndexBackend,
    pub name: String,
    /// SQLite file holding the local index.
    pub path: PathBuf,
    /// Data-plane host of a hosted index, e.g. `https://<index>-<project>.svc.<env>.pinecone.io`.
    pub host: Option<String>,
    pub dimension: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: IndexBackend::Sqlite,
            name: DEFAULT_INDEX_NAME.to_string(),
            path: PathBuf::from("finqa.sqlite"),
            host: None,
            dimension: 384,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `hash` or `openai`.
    pub provider: String,
    pub model: String,
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "hash".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: 384,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub provider: String,
    pub model: Option<String>,
    pub max_length: u32,
    pub max_input_chars: usize,
    pub top_k: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: "local".to_string(),
            model: None,
            max_length: 100,
            max_input_chars: 2048,
            top_k: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    pub provider: String,
    pub model: Option<String>,
    pub chunk_chars: usize,
    pub max_length: usize,
    pub min_length: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            provider: "local".to_string(),
            model: None,
            chunk_chars: finqa_core::DEFAULT_CHUNK_CHARS,
            max_length: 200,
            min_length: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub ocr_mode: OcrMode,
    pub ocr_langs: Vec<String>,
    pub render_width: u32,
    pub render_height: u32,
    pub csv_path: PathBuf,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            ocr_mode: OcrMode::default(),
            ocr_langs: vec!["eng".to_string()],
            render_width: 1400,
            render_height: 2000,
            csv_path: PathBuf::from("profit_loss_table.csv"),
        }
    }
}

impl FinqaConfig {
    /// Loads `path` (or `FINQA_CONFIG`, or `finqa.toml`) and applies env
    /// overrides. A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => env::var("FINQA_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE)),
        };
        let mut config = if path.exists() {
            let data = fs::read_to_string(&path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            Self::from_toml(&data)
                .with_context(|| format!("failed to parse config {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env_overrides(|key| env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml(data: &str) -> Result<Self> {
        Ok(toml::from_str(data)?)
    }

    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(backend) = lookup("FINQA_INDEX_BACKEND") {
            self.index.backend = IndexBackend::parse(&backend)?;
        }
        if let Some(path) = lookup("FINQA_INDEX_PATH") {
            self.index.path = PathBuf::from(path);
        }
        if let Some(host) = lookup("FINQA_INDEX_HOST") {
            self.index.host = Some(host);
        }
        if let Some(provider) = lookup("FINQA_LLM_PROVIDER") {
            self.generation.provider = provider.clone();
            self.summary.provider = provider;
        }
        if let Some(model) = lookup("FINQA_LLM_MODEL") {
            self.generation.model = Some(model.clone());
            self.summary.model = Some(model);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = FinqaConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.index.name, DEFAULT_INDEX_NAME);
        assert_eq!(config.generation.top_k, 3);
        assert_eq!(config.generation.max_length, 100);
        assert_eq!(config.summary.chunk_chars, 1000);
        assert_eq!(config.ingest.ocr_mode, OcrMode::Always);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = FinqaConfig::from_toml(
            r#"
            [index]
            backend = "pinecone"
            host = "https://financial-qa-index.svc.example.pinecone.io"

            [ingest]
            ocr_mode = "missing_text_layer"
            "#,
        )
        .unwrap();
        assert_eq!(config.index.backend, IndexBackend::Pinecone);
        assert_eq!(config.index.dimension, 384);
        assert_eq!(config.ingest.ocr_mode, OcrMode::MissingTextLayer);
        assert_eq!(config.ingest.ocr_langs, vec!["eng".to_string()]);
    }

    #[test]
    fn env_overrides_win() {
        let vars: HashMap<&str, &str> = [
            ("FINQA_INDEX_BACKEND", "SQLite"),
            ("FINQA_INDEX_PATH", "/tmp/other.sqlite"),
            ("FINQA_LLM_PROVIDER", "openai"),
        ]
        .into_iter()
        .collect();
        let mut config = FinqaConfig::default();
        config.index.backend = IndexBackend::Pinecone;
        config
            .apply_env_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.index.backend, IndexBackend::Sqlite);
        assert_eq!(config.index.path, PathBuf::from("/tmp/other.sqlite"));
        assert_eq!(config.generation.provider, "openai");
        assert_eq!(config.summary.provider, "openai");
    }

    #[test]
    fn rejects_unknown_backend() {
        let mut config = FinqaConfig::default();
        let err = config
            .apply_env_overrides(|key| (key == "FINQA_INDEX_BACKEND").then(|| "redis".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("redis"));
    }
}
