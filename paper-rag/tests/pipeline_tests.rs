//! Ingestion: chunk, embed, store, and the failure paths between them.

mod common;

use std::sync::Arc;

use common::{FailingEmbedder, FlakyEmbedder, KeywordEmbedder};
use paper_rag::{
    BatchEmbedder, EmbeddingProvider, InMemoryStore, IngestOutcome, IngestPipeline, NewPaper,
    PaperRepository, ParagraphChunker, RagError,
};

fn pipeline(
    store: Arc<InMemoryStore>,
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
) -> IngestPipeline {
    IngestPipeline::builder()
        .chunker(Arc::new(ParagraphChunker::new(60)))
        .embedder(BatchEmbedder::new(provider, batch_size))
        .repository(store)
        .build()
        .unwrap()
}

fn pages(texts: &[&str]) -> Vec<String> {
    texts.iter().map(|t| t.to_string()).collect()
}

#[tokio::test]
async fn ingest_records_page_numbers_and_embeddings() {
    let store = Arc::new(InMemoryStore::new(common::DIMS));
    let pipeline = pipeline(store.clone(), Arc::new(KeywordEmbedder), 16);

    let outcome = pipeline
        .ingest(
            NewPaper::new("  Graph Neural Networks  "),
            &pages(&["Message passing on graphs.", "", "Attention over neighbours."]),
        )
        .await
        .unwrap();

    let IngestOutcome::Ingested { paper, chunk_count } = outcome else {
        panic!("expected a fresh ingest");
    };
    assert_eq!(paper.title, "Graph Neural Networks");
    assert_eq!(chunk_count, 2);

    let chunks = store.chunks_for_paper(paper.id).await.unwrap();
    let page_numbers: Vec<_> = chunks.iter().map(|c| c.page_number).collect();
    assert_eq!(page_numbers, vec![Some(1), Some(3)]);
    assert!(chunks.iter().all(|c| c.embedding.as_ref().is_some_and(|e| e.len() == common::DIMS)));
}

#[tokio::test]
async fn embedding_failure_stores_nothing() {
    let store = Arc::new(InMemoryStore::new(common::DIMS));
    let pipeline = pipeline(store.clone(), Arc::new(FlakyEmbedder::new(1)), 1);

    let err = pipeline
        .ingest(NewPaper::new("Paper"), &pages(&["First page.", "Second page.", "Third page."]))
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::EmbeddingError { .. }));

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total_papers, 0);
    assert_eq!(stats.total_chunks, 0);
}

#[tokio::test]
async fn existing_title_is_skipped() {
    let store = Arc::new(InMemoryStore::new(common::DIMS));
    let pipeline = pipeline(store.clone(), Arc::new(KeywordEmbedder), 16);

    let first = pipeline.ingest(NewPaper::new("Paper"), &pages(&["Only page."])).await.unwrap();
    let second = pipeline.ingest(NewPaper::new("Paper"), &pages(&["Other page."])).await.unwrap();

    assert!(matches!(second, IngestOutcome::Skipped { .. }));
    assert_eq!(second.paper().id, first.paper().id);
    assert_eq!(store.stats().await.unwrap().total_chunks, 1);
}

#[tokio::test]
async fn reingest_replaces_chunks() {
    let store = Arc::new(InMemoryStore::new(common::DIMS));
    let pipeline = pipeline(store.clone(), Arc::new(KeywordEmbedder), 16);

    let outcome = pipeline
        .ingest(NewPaper::new("Paper"), &pages(&["Old page one.", "Old page two."]))
        .await
        .unwrap();
    let id = outcome.paper().id;

    let chunks = pipeline.reingest(id, &pages(&["New text."])).await.unwrap();
    assert_eq!(chunks.len(), 1);

    let stored = store.chunks_for_paper(id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].text, "New text.");
}

#[tokio::test]
async fn failed_reingest_keeps_old_chunks() {
    let store = Arc::new(InMemoryStore::new(common::DIMS));
    let good = pipeline(store.clone(), Arc::new(KeywordEmbedder), 16);
    let outcome = good.ingest(NewPaper::new("Paper"), &pages(&["Old text."])).await.unwrap();

    let bad = pipeline(store.clone(), Arc::new(FailingEmbedder), 16);
    assert!(bad.reingest(outcome.paper().id, &pages(&["New text."])).await.is_err());

    let stored = store.chunks_for_paper(outcome.paper().id).await.unwrap();
    assert_eq!(stored[0].text, "Old text.");
}

#[tokio::test]
async fn reingest_of_unknown_paper_is_not_found() {
    let store = Arc::new(InMemoryStore::new(common::DIMS));
    let pipeline = pipeline(store, Arc::new(KeywordEmbedder), 16);

    let err = pipeline.reingest(42, &pages(&["text"])).await.unwrap_err();
    assert!(matches!(err, RagError::NotFound { entity: "paper", .. }));
    assert!(err.is_client_error());
}

#[tokio::test]
async fn batch_stops_at_first_failure() {
    let store = Arc::new(InMemoryStore::new(common::DIMS));
    let pipeline = pipeline(store.clone(), Arc::new(KeywordEmbedder), 16);

    let err = pipeline
        .ingest_batch(vec![
            (NewPaper::new("First"), pages(&["one"])),
            (NewPaper::new("   "), pages(&["two"])),
            (NewPaper::new("Third"), pages(&["three"])),
        ])
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::ValidationError { .. }));

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total_papers, 1);
    assert!(store.find_paper_by_title("Third").await.unwrap().is_none());
}

#[tokio::test]
async fn paper_without_text_is_stored_without_chunks() {
    let store = Arc::new(InMemoryStore::new(common::DIMS));
    let pipeline = pipeline(store.clone(), Arc::new(FailingEmbedder), 16);

    let outcome = pipeline.ingest(NewPaper::new("Metadata only"), &[]).await.unwrap();
    assert!(matches!(outcome, IngestOutcome::Ingested { chunk_count: 0, .. }));
}
