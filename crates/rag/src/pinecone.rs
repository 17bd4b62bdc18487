use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::store::{EmbeddingVector, StoreMatch, VectorMetadata, VectorStore};

const API_VERSION: &str = "2024-07";

/// Data-plane client for an existing hosted index. Index creation is left to
/// the provider console.
#[derive(Clone)]
pub struct PineconeIndex {
    http: Client,
    host: String,
    api_key: String,
    dimension: usize,
}

impl PineconeIndex {
    pub fn from_env(host: &str, dimension: usize) -> Result<Self> {
        let api_key = env::var("PINECONE_API_KEY")
            .map_err(|_| anyhow!("PINECONE_API_KEY is required for the pinecone backend"))?;
        Self::new(host, api_key, dimension)
    }

    pub fn new(host: &str, api_key: impl Into<String>, dimension: usize) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(anyhow!("pinecone api key is empty"));
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            http,
            host: normalize_host(host),
            api_key,
            dimension,
        })
    }

    fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<reqwest::blocking::Response> {
        self.send(path, self.http.post(format!("{}{path}", self.host)).json(body))
    }

    fn send(
        &self,
        path: &str,
        request: reqwest::blocking::RequestBuilder,
    ) -> Result<reqwest::blocking::Response> {
        let response = request
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .send()
            .with_context(|| format!("pinecone request to {path} failed"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(anyhow!("pinecone {path} returned {status}: {body}"));
        }
        Ok(response)
    }
}

impl VectorStore for PineconeIndex {
    fn upsert(&self, vectors: &[EmbeddingVector]) -> Result<usize> {
        if let Some(bad) = vectors.iter().find(|v| v.values.len() != self.dimension) {
            return Err(anyhow!(
                "vector '{}' has dimension {}, index expects {}",
                bad.id,
                bad.values.len(),
                self.dimension
            ));
        }
        if vectors.is_empty() {
            return Ok(0);
        }
        let parsed: UpsertResponse = self
            .post("/vectors/upsert", &json!({ "vectors": vectors }))?
            .json()
            .context("failed to decode pinecone upsert response")?;
        Ok(parsed.upserted_count.unwrap_or(vectors.len()))
    }

    fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<StoreMatch>> {
        let parsed: QueryResponse = self
            .post(
                "/query",
                &json!({
                    "vector": vector,
                    "topK": top_k,
                    "includeMetadata": include_metadata,
                    "includeValues": false,
                }),
            )?
            .json()
            .context("failed to decode pinecone query response")?;
        let mut matches = parsed.matches;
        matches.truncate(top_k);
        Ok(matches)
    }

    fn fetch(&self, ids: &[String]) -> Result<HashMap<String, VectorMetadata>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let params: Vec<(&str, &str)> = ids.iter().map(|id| ("ids", id.as_str())).collect();
        let request = self
            .http
            .get(format!("{}/vectors/fetch", self.host))
            .query(&params);
        let parsed: FetchResponse = self
            .send("/vectors/fetch", request)?
            .json()
            .context("failed to decode pinecone fetch response")?;
        Ok(parsed.into_metadata())
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    upserted_count: Option<usize>,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<StoreMatch>,
}

#[derive(Deserialize)]
struct FetchResponse {
    #[serde(default)]
    vectors: HashMap<String, FetchedVector>,
}

#[derive(Deserialize)]
struct FetchedVector {
    #[serde(default)]
    metadata: Option<VectorMetadata>,
}

impl FetchResponse {
    fn into_metadata(self) -> HashMap<String, VectorMetadata> {
        self.vectors
            .into_iter()
            .filter_map(|(id, vector)| vector.metadata.map(|metadata| (id, metadata)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_gets_scheme() {
        assert_eq!(
            normalize_host("financial-qa-index.svc.example.pinecone.io/"),
            "https://financial-qa-index.svc.example.pinecone.io"
        );
        assert_eq!(normalize_host("http://localhost:5080"), "http://localhost:5080");
    }

    #[test]
    fn decodes_query_matches() {
        let parsed: QueryResponse = serde_json::from_str(
            r#"{"matches":[{"id":"0","score":0.91,"metadata":{"text":"Quarter: Q1 2000"}},{"id":"7","score":0.5}],"namespace":""}"#,
        )
        .unwrap();
        assert_eq!(parsed.matches.len(), 2);
        assert_eq!(parsed.matches[0].metadata.as_ref().unwrap().text, "Quarter: Q1 2000");
        assert!(parsed.matches[1].metadata.is_none());
    }

    #[test]
    fn decodes_fetched_vectors() {
        let parsed: FetchResponse = serde_json::from_str(
            r#"{"vectors":{"10000":{"id":"10000","values":[0.1],"metadata":{"text":"Quarter: FY23"}}},"namespace":""}"#,
        )
        .unwrap();
        let found = parsed.into_metadata();
        assert_eq!(found.len(), 1);
        assert_eq!(found["10000"].text, "Quarter: FY23");
    }

    #[test]
    fn rejects_empty_key() {
        assert!(PineconeIndex::new("localhost", "  ", 3).is_err());
    }
}
