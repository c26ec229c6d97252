//! HNSW index lifecycle through the manager.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{FaultyStore, KeywordEmbedder, keyword_vector};
use paper_rag::{
    BatchEmbedder, DistanceMetric, HnswParams, IndexSpec, IndexState, InMemoryStore, NewChunk,
    NewPaper, PaperRepository, RagConfig, RagError, RetrievalEngine, ScanMode, VectorIndexManager,
    VectorStore,
};

fn manager(store: Arc<dyn VectorStore>) -> VectorIndexManager {
    let config = RagConfig::default();
    VectorIndexManager::new(store, config.index_spec().unwrap(), config.ef_search).unwrap()
}

#[tokio::test]
async fn creation_is_idempotent() {
    let store = Arc::new(InMemoryStore::new(common::DIMS));
    let index = manager(store.clone());

    assert_eq!(index.status().await.unwrap(), IndexState::Missing);
    assert_eq!(index.ensure_index().await.unwrap(), IndexState::Ready);
    assert_eq!(index.ensure_index().await.unwrap(), IndexState::Ready);
    assert_eq!(index.status().await.unwrap(), IndexState::Ready);
    assert_eq!(index.spec().params, HnswParams::default());
}

#[tokio::test]
async fn scan_mode_follows_readiness() {
    let store = Arc::new(InMemoryStore::new(common::DIMS));
    let index = manager(store);

    assert_eq!(index.scan_mode(None), ScanMode::Exact);
    index.ensure_index().await.unwrap();
    assert_eq!(index.scan_mode(None), ScanMode::Approximate { ef_search: 40 });
    assert_eq!(index.scan_mode(Some(200)), ScanMode::Approximate { ef_search: 200 });

    index.drop_index().await.unwrap();
    assert!(!index.is_ready());
    assert_eq!(index.scan_mode(None), ScanMode::Exact);
    assert_eq!(index.status().await.unwrap(), IndexState::Missing);
}

#[tokio::test]
async fn failed_creation_leaves_retrieval_working() {
    let store = Arc::new(FaultyStore::new());
    store
        .inner
        .insert_paper(
            &NewPaper::new("Graph Neural Networks"),
            &[NewChunk {
                text: "Graph neural network message passing.".into(),
                page_number: Some(1),
                embedding: Some(keyword_vector("Graph neural network message passing.")),
            }],
        )
        .await
        .unwrap();
    store.fail_create.store(true, Ordering::SeqCst);

    let index = Arc::new(manager(store.clone()));
    let err = index.ensure_index().await.unwrap_err();
    assert!(matches!(err, RagError::IndexUnavailable { .. }));
    assert!(!index.is_ready());

    let config = RagConfig::default();
    let engine = RetrievalEngine::builder()
        .repository(Arc::new(InMemoryStore::new(common::DIMS)))
        .index_manager(index)
        .embedder(BatchEmbedder::new(Arc::new(KeywordEmbedder), config.embedding_batch_size))
        .config(config)
        .build()
        .unwrap();
    let results = engine.semantic_search("graph neural", 5, None).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(store.inner.stats().await.unwrap().total_chunks, 1);
}

#[tokio::test]
async fn invalid_index_is_dropped() {
    let store = Arc::new(FaultyStore::new());
    store.report_invalid.store(true, Ordering::SeqCst);
    let index = manager(store.clone());

    let err = index.ensure_index().await.unwrap_err();
    assert!(matches!(err, RagError::IndexUnavailable { .. }));
    assert_eq!(store.inner.index_state(&index.spec().name).await.unwrap(), IndexState::Missing);
}

#[tokio::test]
async fn rebuild_swaps_in_new_parameters() {
    let store = Arc::new(InMemoryStore::new(common::DIMS));
    let index = manager(store.clone());
    index.ensure_index().await.unwrap();

    index.rebuild(HnswParams::new(32, 128)).await.unwrap();

    let spec = index.spec();
    assert_eq!(spec.name, "ix_paper_chunks_embedding");
    assert_eq!(spec.params, HnswParams::new(32, 128));
    assert!(index.is_ready());
    assert_eq!(store.index_state("ix_paper_chunks_embedding_next").await.unwrap(), IndexState::Missing);
    assert_eq!(store.index_state(&spec.name).await.unwrap(), IndexState::Ready);
}

#[tokio::test]
async fn rebuild_without_existing_index_creates_it() {
    let store = Arc::new(InMemoryStore::new(common::DIMS));
    let index = manager(store.clone());

    index.rebuild(HnswParams::new(24, 96)).await.unwrap();
    assert_eq!(index.status().await.unwrap(), IndexState::Ready);
}

#[tokio::test]
async fn failed_rebuild_keeps_live_index() {
    let store = Arc::new(FaultyStore::new());
    let index = manager(store.clone());
    index.ensure_index().await.unwrap();

    store.fail_create.store(true, Ordering::SeqCst);
    let err = index.rebuild(HnswParams::new(32, 128)).await.unwrap_err();
    assert!(matches!(err, RagError::IndexUnavailable { .. }));
    assert_eq!(index.spec().params, HnswParams::default());
    assert_eq!(index.status().await.unwrap(), IndexState::Ready);
}

#[tokio::test]
async fn invalid_parameters_are_rejected_before_any_build() {
    let store = Arc::new(InMemoryStore::new(common::DIMS));
    let index = manager(store);

    assert!(matches!(
        index.rebuild(HnswParams::new(64, 64)).await.unwrap_err(),
        RagError::ConfigError(_)
    ));
}

#[test]
fn scratch_prefix_is_reserved() {
    let store: Arc<dyn VectorStore> = Arc::new(InMemoryStore::new(common::DIMS));
    let spec = IndexSpec::scratch(DistanceMetric::Cosine, HnswParams::default()).unwrap();
    assert!(VectorIndexManager::new(store, spec, 40).is_err());
}

#[tokio::test]
async fn first_query_picks_up_an_index_built_elsewhere() {
    let store = Arc::new(InMemoryStore::new(common::DIMS));
    store
        .insert_paper(
            &NewPaper::new("Graph Neural Networks"),
            &[NewChunk {
                text: "Graph neural network message passing.".into(),
                page_number: Some(1),
                embedding: Some(keyword_vector("Graph neural network message passing.")),
            }],
        )
        .await
        .unwrap();
    let index = Arc::new(manager(store.clone()));
    store.create_index(&index.spec()).await.unwrap();
    assert!(!index.is_ready());

    let config = RagConfig::default();
    let engine = RetrievalEngine::builder()
        .repository(store.clone())
        .index_manager(index.clone())
        .embedder(BatchEmbedder::new(Arc::new(KeywordEmbedder), config.embedding_batch_size))
        .config(config)
        .build()
        .unwrap();
    engine.semantic_search("graph neural", 5, None).await.unwrap();

    assert!(index.is_ready());
}

#[tokio::test]
async fn readiness_is_cached_until_the_ttl_expires() {
    let store = Arc::new(InMemoryStore::new(common::DIMS));
    let index = manager(store.clone());
    assert_eq!(index.status().await.unwrap(), IndexState::Missing);

    store.create_index(&index.spec()).await.unwrap();
    assert_eq!(index.query_scan_mode(None).await, ScanMode::Exact);

    let index = manager(store.clone()).with_readiness_ttl(Duration::ZERO);
    assert_eq!(index.status().await.unwrap(), IndexState::Ready);
    store.drop_index(&index.spec().name).await.unwrap();
    assert_eq!(index.query_scan_mode(None).await, ScanMode::Exact);
}
