pub mod config;
pub mod embedding;
pub mod indexer;
pub mod models;
pub mod pinecone;
pub mod pipeline;
pub mod retriever;
pub mod services;
pub mod store;

pub use config::{
    EmbeddingConfig, FinqaConfig, GenerationConfig, IndexBackend, IndexConfig, IngestConfig,
    SummaryConfig, DEFAULT_CONFIG_FILE, DEFAULT_INDEX_NAME,
};
pub use embedding::{Embedder, EmbeddingBackend, EmbeddingClient, OpenAiEmbeddingClient};
pub use finqa_llm::{LlmClient, LlmProvider, LlmRequest, LlmResponse};
pub use indexer::EmbeddingIndexer;
pub use models::{llm_client, LlmSummarizer};
pub use pinecone::PineconeIndex;
pub use pipeline::{
    build_prompt, render_answer, Answer, AnswerError, AnswerSynthesizer, GenerationParams,
    Generator, DEFAULT_TOP_K,
};
pub use retriever::{QueryMatch, Retriever};
pub use services::FinqaServices;
pub use store::{
    cosine_similarity, open_vector_store, EmbeddingVector, SqliteVectorStore, StoreMatch,
    VectorMetadata, VectorStore,
};
