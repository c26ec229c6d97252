//! HNSW parameter tuning against the in-memory store.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use common::FaultyStore;
use paper_rag::tuning::score_runs;
use paper_rag::{
    DistanceMetric, HnswParams, IndexSpec, IndexState, InMemoryStore, NewChunk, NewPaper,
    PaperRepository, ParameterTuner, RagError, TuningConfig, TuningParams, VectorStore,
};

fn corpus(count: usize) -> Vec<NewChunk> {
    (0..count)
        .map(|i| NewChunk {
            text: format!("chunk {i}"),
            page_number: Some(1 + (i / 10) as i32),
            embedding: Some(
                (0..common::DIMS).map(|d| ((i * 7 + d * 13) % 17) as f32 + 1.0).collect(),
            ),
        })
        .collect()
}

async fn seed(store: &InMemoryStore, count: usize) {
    store.insert_paper(&NewPaper::new("Corpus"), &corpus(count)).await.unwrap();
}

fn two_point_config() -> TuningConfig {
    TuningConfig {
        sample_size: 50,
        top_k: 10,
        combinations: vec![
            TuningParams::new(16, 64),
            TuningParams::new(32, 128).with_ef_search(100),
        ],
    }
}

#[tokio::test]
async fn two_combinations_yield_a_best_scoring_recommendation() {
    let store = Arc::new(InMemoryStore::new(common::DIMS));
    seed(&store, 60).await;
    let before = store.stats().await.unwrap();

    let tuner = ParameterTuner::new(store.clone(), DistanceMetric::Cosine, two_point_config());
    let report = tuner.run().await.unwrap();

    assert_eq!(report.sample_size, 50);
    assert_eq!(report.runs.len(), 2);
    for run in &report.runs {
        assert!(run.build_time_secs >= 0.0);
        assert!(run.mean_latency_ms >= 0.0);
        assert!(run.index_size_bytes > 0);
        // the in-memory store answers approximate queries exactly
        assert_eq!(run.precision_at_k, 1.0);
    }

    let best = report.recommendation.clone().unwrap();
    let scores = score_runs(&report.runs);
    assert!(scores.iter().all(|&s| best.score >= s));
    assert!(report.runs.iter().any(|r| r.params == best.params));

    for name in ["tune_hnsw_m16_efc64", "tune_hnsw_m32_efc128"] {
        assert_eq!(store.index_state(name).await.unwrap(), IndexState::Missing);
    }
    assert_eq!(store.stats().await.unwrap(), before);
}

#[tokio::test]
async fn production_index_is_left_alone() {
    let store = Arc::new(InMemoryStore::new(common::DIMS));
    seed(&store, 30).await;
    let live = paper_rag::RagConfig::default().index_spec().unwrap();
    store.create_index(&live).await.unwrap();

    let tuner = ParameterTuner::new(store.clone(), DistanceMetric::Cosine, two_point_config());
    let report = tuner.run().await.unwrap();

    assert_eq!(store.index_state(&live.name).await.unwrap(), IndexState::Ready);
    assert!(report.production_index_ready);
}

#[tokio::test]
async fn report_is_clean_without_a_production_index() {
    let store = Arc::new(InMemoryStore::new(common::DIMS));
    seed(&store, 30).await;
    let live = IndexSpec::new("ix_custom", DistanceMetric::Cosine, HnswParams::default()).unwrap();
    store.create_index(&live).await.unwrap();

    let report = ParameterTuner::new(store.clone(), DistanceMetric::Cosine, two_point_config())
        .run()
        .await
        .unwrap();
    assert!(!report.production_index_ready);

    let report = ParameterTuner::new(store, DistanceMetric::Cosine, two_point_config())
        .with_production_index("ix_custom")
        .run()
        .await
        .unwrap();
    assert!(report.production_index_ready);
}

#[tokio::test]
async fn failed_combination_is_skipped_and_cleaned_up() {
    let store = Arc::new(FaultyStore::new());
    seed(&store.inner, 60).await;
    store.fail_m.store(32, Ordering::SeqCst);

    let tuner = ParameterTuner::new(store.clone(), DistanceMetric::Cosine, two_point_config());
    let report = tuner.run().await.unwrap();

    assert_eq!(report.runs.len(), 1);
    assert_eq!(report.runs[0].params, TuningParams::new(16, 64));
    assert_eq!(report.recommendation.unwrap().params, TuningParams::new(16, 64));

    let dropped = store.dropped.lock().unwrap();
    assert!(dropped.iter().any(|n| n == "tune_hnsw_m32_efc128"));
}

#[tokio::test]
async fn shared_construction_params_share_one_build() {
    let store = Arc::new(FaultyStore::new());
    seed(&store.inner, 40).await;

    let config = TuningConfig {
        sample_size: 20,
        top_k: 5,
        combinations: vec![
            TuningParams::new(16, 64).with_ef_search(32),
            TuningParams::new(16, 64).with_ef_search(128),
        ],
    };
    let report = ParameterTuner::new(store.clone(), DistanceMetric::L2, config).run().await.unwrap();

    assert_eq!(report.runs.len(), 2);
    assert_eq!(report.runs[0].build_time_secs, report.runs[1].build_time_secs);
    // one drop before the build and one after
    assert_eq!(store.dropped.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn empty_corpus_cannot_be_tuned() {
    let store = Arc::new(InMemoryStore::new(common::DIMS));
    let tuner = ParameterTuner::new(store, DistanceMetric::Cosine, two_point_config());
    assert!(matches!(tuner.run().await.unwrap_err(), RagError::ValidationError { .. }));
}

#[tokio::test]
async fn invalid_grid_is_rejected() {
    let store = Arc::new(InMemoryStore::new(common::DIMS));
    seed(&store, 10).await;

    let config = TuningConfig { combinations: vec![TuningParams::new(64, 64)], ..two_point_config() };
    let tuner = ParameterTuner::new(store, DistanceMetric::Cosine, config);
    assert!(matches!(tuner.run().await.unwrap_err(), RagError::ConfigError(_)));
}
