use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use finqa_core::{canned_dataset, records_from_fields, RecordFields};
use finqa_rag::{
    AnswerError, AnswerSynthesizer, EmbeddingClient, EmbeddingIndexer, EmbeddingVector,
    GenerationParams, Generator, Retriever, SqliteVectorStore, StoreMatch, VectorMetadata,
    VectorStore,
};
use proptest::prelude::*;
use tempfile::{tempdir, TempDir};

const DIMS: usize = 64;

fn sqlite_store(dir: &TempDir) -> Arc<SqliteVectorStore> {
    let path = dir.path().join("index.sqlite");
    Arc::new(SqliteVectorStore::open(path, "financial-qa-index", DIMS).unwrap())
}

fn first_quarter() -> RecordFields {
    RecordFields {
        quarter: "Q1 2000".to_string(),
        revenue: 150000i64.into(),
        operating_expenses: 80000i64.into(),
        net_income: 70000i64.into(),
        gross_profit: 100000i64.into(),
        ebt: 65000i64.into(),
    }
}

#[derive(Default)]
struct RecordingGenerator {
    prompts: Mutex<Vec<String>>,
}

impl Generator for RecordingGenerator {
    fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<Vec<String>> {
        assert_eq!(params.max_length, 100);
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(vec!["Revenue was 150000.".to_string(), "second".to_string()])
    }
}

struct FailingGenerator;

impl Generator for FailingGenerator {
    fn generate(&self, _prompt: &str, _params: &GenerationParams) -> Result<Vec<String>> {
        Err(anyhow!("model server unreachable"))
    }
}

struct SilentGenerator;

impl Generator for SilentGenerator {
    fn generate(&self, _prompt: &str, _params: &GenerationParams) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

struct UnreachableStore;

impl VectorStore for UnreachableStore {
    fn upsert(&self, _vectors: &[EmbeddingVector]) -> Result<usize> {
        Err(anyhow!("connection refused"))
    }

    fn query(&self, _vector: &[f32], _top_k: usize, _include: bool) -> Result<Vec<StoreMatch>> {
        Err(anyhow!("connection refused"))
    }

    fn fetch(&self, _ids: &[String]) -> Result<HashMap<String, VectorMetadata>> {
        Err(anyhow!("connection refused"))
    }
}

#[test]
fn single_record_index_returns_one_match() {
    let dir = tempdir().unwrap();
    let store = sqlite_store(&dir);
    let embedder = Arc::new(EmbeddingClient::hash(DIMS));
    let records = records_from_fields(0, vec![first_quarter()]);
    EmbeddingIndexer::new(embedder.clone(), store.clone())
        .index(&records)
        .unwrap();

    let retriever = Retriever::new(embedder, store);
    for query in ["revenue in Q1 2000", "completely unrelated words", ""] {
        let context = retriever.retrieve(query, 3).unwrap();
        assert_eq!(
            context,
            vec!["Quarter: Q1 2000, Revenue: 150000, Operating Expenses: 80000, Net Income: 70000, Gross Profit: 100000, EBT: 65000".to_string()]
        );
    }
}

#[test]
fn reindexing_is_idempotent() {
    let dir = tempdir().unwrap();
    let store = sqlite_store(&dir);
    let embedder = Arc::new(EmbeddingClient::hash(DIMS));
    let indexer = EmbeddingIndexer::new(embedder.clone(), store.clone());
    let retriever = Retriever::new(embedder, store.clone());
    let records = canned_dataset(20);

    indexer.index(&records).unwrap();
    let before = retriever.search("Net Income in Q3 2002", 5).unwrap();
    indexer.index(&records).unwrap();
    let after = retriever.search("Net Income in Q3 2002", 5).unwrap();

    assert_eq!(store.len().unwrap(), 20);
    assert_eq!(before, after);
}

#[test]
fn answer_uses_context_and_first_candidate() {
    let dir = tempdir().unwrap();
    let store = sqlite_store(&dir);
    let embedder = Arc::new(EmbeddingClient::hash(DIMS));
    EmbeddingIndexer::new(embedder.clone(), store.clone())
        .index(&records_from_fields(0, vec![first_quarter()]))
        .unwrap();
    let generator = Arc::new(RecordingGenerator::default());
    let synthesizer = AnswerSynthesizer::new(Retriever::new(embedder, store), generator.clone());

    let answer = synthesizer.answer("What was revenue?").unwrap();
    assert_eq!(answer.answer, "Revenue was 150000.");
    assert_eq!(answer.context.len(), 1);
    let prompts = generator.prompts.lock().unwrap();
    assert_eq!(
        prompts[0],
        "Context: Quarter: Q1 2000, Revenue: 150000, Operating Expenses: 80000, Net Income: 70000, Gross Profit: 100000, EBT: 65000 Question: What was revenue?"
    );
}

#[test]
fn long_prompts_are_truncated() {
    let dir = tempdir().unwrap();
    let store = sqlite_store(&dir);
    let embedder = Arc::new(EmbeddingClient::hash(DIMS));
    EmbeddingIndexer::new(embedder.clone(), store.clone())
        .index(&canned_dataset(10))
        .unwrap();
    let generator = Arc::new(RecordingGenerator::default());
    let synthesizer = AnswerSynthesizer::new(Retriever::new(embedder, store), generator.clone())
        .params(GenerationParams {
            max_length: 100,
            max_input_chars: 40,
        });

    synthesizer.answer("Revenue?").unwrap();
    let prompts = generator.prompts.lock().unwrap();
    assert_eq!(prompts[0].chars().count(), 40);
    assert!(prompts[0].starts_with("Context: Quarter: "));
}

#[test]
fn generation_failure_becomes_error_text() {
    let dir = tempdir().unwrap();
    let embedder = Arc::new(EmbeddingClient::hash(DIMS));
    let synthesizer = AnswerSynthesizer::new(
        Retriever::new(embedder, sqlite_store(&dir)),
        Arc::new(FailingGenerator),
    );

    assert!(matches!(
        synthesizer.answer("Revenue?"),
        Err(AnswerError::GenerationFailed(_))
    ));
    let text = synthesizer.answer_text("Revenue?");
    assert!(text.starts_with("Error: "));
    assert!(text.contains("model server unreachable"));
}

#[test]
fn empty_generation_is_reported() {
    let dir = tempdir().unwrap();
    let embedder = Arc::new(EmbeddingClient::hash(DIMS));
    let synthesizer = AnswerSynthesizer::new(
        Retriever::new(embedder, sqlite_store(&dir)),
        Arc::new(SilentGenerator),
    );
    assert!(matches!(
        synthesizer.answer("Revenue?"),
        Err(AnswerError::EmptyGeneration)
    ));
}

#[test]
fn unreachable_store_answers_without_context() {
    let embedder = Arc::new(EmbeddingClient::hash(DIMS));
    let generator = Arc::new(RecordingGenerator::default());
    let synthesizer = AnswerSynthesizer::new(
        Retriever::new(embedder.clone(), Arc::new(UnreachableStore)),
        generator.clone(),
    );

    let answer = synthesizer.answer("Revenue?").unwrap();
    assert!(answer.context.is_empty());
    assert_eq!(generator.prompts.lock().unwrap()[0], "Context:  Question: Revenue?");

    let indexer = EmbeddingIndexer::new(embedder, Arc::new(UnreachableStore));
    assert!(indexer.index(&canned_dataset(2)).is_err());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn retrieval_is_bounded_and_sorted(query in "[a-zA-Z0-9 ]{0,40}", top_k in 0usize..12) {
        let dir = tempdir().unwrap();
        let store = sqlite_store(&dir);
        let embedder = Arc::new(EmbeddingClient::hash(DIMS));
        EmbeddingIndexer::new(embedder.clone(), store.clone())
            .index(&canned_dataset(8))
            .unwrap();

        let hits = Retriever::new(embedder, store).search(&query, top_k).unwrap();
        prop_assert!(hits.len() <= top_k);
        prop_assert_eq!(hits.len(), top_k.min(8));
        for pair in hits.windows(2) {
            prop_assert!(pair[0].score >= pair[1].score);
        }
    }
}
