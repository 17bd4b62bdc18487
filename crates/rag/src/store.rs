use anyhow::{anyhow, bail, Context, Result};
use bytemuck::cast_slice;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::config::{IndexBackend, IndexConfig};
use crate::pinecone::PineconeIndex;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMetadata {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingVector {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: VectorMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMatch {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: Option<VectorMetadata>,
}

/// A named similarity index. Upserting an existing id overwrites it.
pub trait VectorStore: Send + Sync {
    fn upsert(&self, vectors: &[EmbeddingVector]) -> Result<usize>;

    /// Up to `top_k` matches, best first.
    fn query(&self, vector: &[f32], top_k: usize, include_metadata: bool)
        -> Result<Vec<StoreMatch>>;

    /// Metadata of the ids already present; absent ids are left out.
    fn fetch(&self, ids: &[String]) -> Result<HashMap<String, VectorMetadata>>;
}

pub fn open_vector_store(config: &IndexConfig) -> Result<Arc<dyn VectorStore>> {
    match config.backend {
        IndexBackend::Sqlite => Ok(Arc::new(SqliteVectorStore::open(
            &config.path,
            &config.name,
            config.dimension,
        )?)),
        IndexBackend::Pinecone => {
            let host = config
                .host
                .as_deref()
                .ok_or_else(|| anyhow!("index.host is required for the pinecone backend"))?;
            Ok(Arc::new(PineconeIndex::from_env(host, config.dimension)?))
        }
    }
}

/// Cosine-scored index persisted in SQLite. Several named indices can share
/// one file; each keeps the dimension it was created with.
#[derive(Clone)]
pub struct SqliteVectorStore {
    path: PathBuf,
    name: String,
    dimension: usize,
}

impl SqliteVectorStore {
    pub fn open<P: AsRef<Path>>(path: P, name: &str, dimension: usize) -> Result<Self> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
            name: name.to_string(),
            dimension,
        };
        store.init()?;
        Ok(store)
    }

    fn connection(&self) -> Result<Connection> {
        Connection::open(&self.path)
            .with_context(|| format!("failed to open index file {}", self.path.display()))
    }

    fn init(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            CREATE TABLE IF NOT EXISTS indices (
                name TEXT PRIMARY KEY,
                dimension INTEGER NOT NULL,
                metric TEXT NOT NULL DEFAULT 'cosine',
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE IF NOT EXISTS vectors (
                index_name TEXT NOT NULL,
                id TEXT NOT NULL,
                embedding BLOB NOT NULL,
                text TEXT NOT NULL,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (index_name, id),
                FOREIGN KEY(index_name) REFERENCES indices(name)
            );
            "#,
        )?;
        let existing: Option<i64> = conn
            .query_row(
                "SELECT dimension FROM indices WHERE name = ?1",
                [&self.name],
                |row| row.get(0),
            )
            .optional()?;
        match existing {
            Some(dimension) if dimension as usize != self.dimension => bail!(
                "index '{}' has dimension {dimension}, requested {}",
                self.name,
                self.dimension
            ),
            Some(_) => {}
            None => {
                conn.execute(
                    "INSERT INTO indices (name, dimension) VALUES (?1, ?2)",
                    params![self.name, self.dimension as i64],
                )?;
                debug!(index = %self.name, dimension = self.dimension, "created index");
            }
        }
        Ok(())
    }

    pub fn len(&self) -> Result<usize> {
        let conn = self.connection()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM vectors WHERE index_name = ?1",
            [&self.name],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl VectorStore for SqliteVectorStore {
    fn upsert(&self, vectors: &[EmbeddingVector]) -> Result<usize> {
        if let Some(bad) = vectors.iter().find(|v| v.values.len() != self.dimension) {
            bail!(
                "vector '{}' has dimension {}, index '{}' expects {}",
                bad.id,
                bad.values.len(),
                self.name,
                self.dimension
            );
        }
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        for vector in vectors {
            let embedding_blob = cast_slice::<f32, u8>(&vector.values);
            tx.execute(
                r#"
                INSERT INTO vectors (index_name, id, embedding, text) VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(index_name, id) DO UPDATE SET
                    embedding = excluded.embedding,
                    text = excluded.text,
                    updated_at = CURRENT_TIMESTAMP
                "#,
                params![self.name, vector.id, embedding_blob, vector.metadata.text],
            )?;
        }
        tx.commit()?;
        Ok(vectors.len())
    }

    fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<StoreMatch>> {
        if vector.len() != self.dimension {
            bail!(
                "query vector has dimension {}, index '{}' expects {}",
                vector.len(),
                self.name,
                self.dimension
            );
        }
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT id, embedding, text FROM vectors WHERE index_name = ?1 ORDER BY rowid",
        )?;
        let mut rows = stmt.query([&self.name])?;
        let mut hits = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let embedding_blob: Vec<u8> = row.get(1)?;
            if embedding_blob.len() % std::mem::size_of::<f32>() != 0 {
                bail!("invalid embedding stored for '{id}'");
            }
            let embedding: Vec<f32> = bytemuck::allocation::pod_collect_to_vec(&embedding_blob);
            let text: String = row.get(2)?;
            hits.push(StoreMatch {
                id,
                score: cosine_similarity(vector, &embedding),
                metadata: include_metadata.then(|| VectorMetadata { text }),
            });
        }
        // Stable sort keeps insertion order among equal scores.
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }

    fn fetch(&self, ids: &[String]) -> Result<HashMap<String, VectorMetadata>> {
        let conn = self.connection()?;
        let mut stmt =
            conn.prepare("SELECT text FROM vectors WHERE index_name = ?1 AND id = ?2")?;
        let mut found = HashMap::new();
        for id in ids {
            let text: Option<String> = stmt
                .query_row(params![self.name, id], |row| row.get(0))
                .optional()?;
            if let Some(text) = text {
                found.insert(id.clone(), VectorMetadata { text });
            }
        }
        Ok(found)
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut a_norm = 0.0f32;
    let mut b_norm = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        a_norm += x * x;
        b_norm += y * y;
    }
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    dot / (a_norm.sqrt() * b_norm.sqrt())
}
