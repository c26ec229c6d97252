//! Deterministic embedders and fixtures shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use paper_rag::{
    BatchEmbedder, ChunkHit, EmbeddingProvider, IndexSpec, IndexState, InMemoryStore,
    NearestQuery, RagConfig, RagError, Result, RetrievalEngine, VectorIndexManager, VectorStore,
};

/// Words the keyword embedder has an axis for.
pub const VOCAB: [&str; 7] =
    ["neural", "network", "graph", "transformer", "attention", "protein", "climate"];

/// Embedding width of [`KeywordEmbedder`]: one axis per word plus a bias.
pub const DIMS: usize = VOCAB.len() + 1;

/// Counts vocabulary words. Texts sharing words land close together.
pub struct KeywordEmbedder;

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(keyword_vector(text))
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

pub fn keyword_vector(text: &str) -> Vec<f32> {
    let text = text.to_lowercase();
    let mut vector: Vec<f32> = VOCAB.iter().map(|w| text.matches(w).count() as f32).collect();
    vector.push(0.1);
    vector
}

/// Always fails, like a provider that is down.
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RagError::EmbeddingError {
            provider: "failing".to_string(),
            message: "service unavailable".to_string(),
        })
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Succeeds for the first `healthy_batches` batch calls, then fails.
pub struct FlakyEmbedder {
    pub healthy_batches: usize,
    pub calls: AtomicUsize,
}

impl FlakyEmbedder {
    pub fn new(healthy_batches: usize) -> Self {
        Self { healthy_batches, calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl EmbeddingProvider for FlakyEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(keyword_vector(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.healthy_batches {
            return Err(RagError::EmbeddingError {
                provider: "flaky".to_string(),
                message: "rate limited".to_string(),
            });
        }
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }

    fn dimensions(&self) -> usize {
        DIMS
    }
}

/// Delegates to an [`InMemoryStore`] with switchable faults.
pub struct FaultyStore {
    pub inner: InMemoryStore,
    /// Fail every index build.
    pub fail_create: AtomicBool,
    /// Fail builds with this `m`; zero disables.
    pub fail_m: AtomicU32,
    /// Report ready indexes as invalid.
    pub report_invalid: AtomicBool,
    pub dropped: Mutex<Vec<String>>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryStore::new(DIMS),
            fail_create: AtomicBool::new(false),
            fail_m: AtomicU32::new(0),
            report_invalid: AtomicBool::new(false),
            dropped: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl VectorStore for FaultyStore {
    async fn create_index(&self, spec: &IndexSpec) -> Result<()> {
        if self.fail_create.load(Ordering::SeqCst)
            || self.fail_m.load(Ordering::SeqCst) == spec.params.m
        {
            return Err(RagError::StoreError {
                backend: "faulty".into(),
                message: "could not allocate memory for index build".into(),
            });
        }
        self.inner.create_index(spec).await
    }

    async fn index_state(&self, name: &str) -> Result<IndexState> {
        let state = self.inner.index_state(name).await?;
        if state == IndexState::Ready && self.report_invalid.load(Ordering::SeqCst) {
            return Ok(IndexState::Invalid);
        }
        Ok(state)
    }

    async fn drop_index(&self, name: &str) -> Result<()> {
        self.dropped.lock().unwrap().push(name.to_string());
        self.inner.drop_index(name).await
    }

    async fn swap_index(&self, live: &str, staged: &str) -> Result<()> {
        self.inner.swap_index(live, staged).await
    }

    async fn index_size_bytes(&self, name: &str) -> Result<u64> {
        self.inner.index_size_bytes(name).await
    }

    async fn nearest(&self, query: &NearestQuery<'_>) -> Result<Vec<ChunkHit>> {
        self.inner.nearest(query).await
    }

    async fn nearest_ids(&self, query: &NearestQuery<'_>) -> Result<Vec<i64>> {
        self.inner.nearest_ids(query).await
    }

    async fn sample_embeddings(&self, count: usize) -> Result<Vec<(i64, Vec<f32>)>> {
        self.inner.sample_embeddings(count).await
    }
}

pub fn index_manager(store: Arc<InMemoryStore>, config: &RagConfig) -> Arc<VectorIndexManager> {
    Arc::new(
        VectorIndexManager::new(store, config.index_spec().unwrap(), config.ef_search).unwrap(),
    )
}

pub fn engine(store: Arc<InMemoryStore>, provider: Arc<dyn EmbeddingProvider>) -> RetrievalEngine {
    let config = RagConfig::default();
    RetrievalEngine::builder()
        .index_manager(index_manager(store.clone(), &config))
        .embedder(BatchEmbedder::new(provider, config.embedding_batch_size))
        .repository(store)
        .config(config)
        .build()
        .unwrap()
}
