//! Empirical HNSW parameter search.
//!
//! The [`ParameterTuner`] samples embedded chunks, records their exact
//! nearest neighbours as ground truth, then builds a scratch index per
//! construction setting and measures latency, Precision@k, build time and
//! size at each requested `ef_search`. Runs are scored with
//! [`score_runs`] and summarised in a [`TuningReport`].
//!
//! Tuning only reads chunk rows. Scratch indexes use the
//! [`SCRATCH_INDEX_PREFIX`](crate::index::SCRATCH_INDEX_PREFIX) and are
//! always dropped afterwards. The planner may still prefer a live production
//! index on the same column, so measurements are cleanest with it dropped;
//! [`ParameterTuner::run`] warns and flags the report when it is present.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{RagError, Result};
use crate::index::{
    DEFAULT_EF_SEARCH, DEFAULT_INDEX_NAME, DistanceMetric, HnswParams, IndexSpec, IndexState,
    ScanMode, validate_ef_search,
};
use crate::vectorstore::{NearestQuery, VectorStore};

const ACCURACY_WEIGHT: f64 = 0.4;
const LATENCY_WEIGHT: f64 = 0.4;
const BUILD_TIME_WEIGHT: f64 = 0.2;

/// One point in the parameter grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TuningParams {
    pub m: u32,
    pub ef_construction: u32,
    pub ef_search: u32,
}

impl TuningParams {
    /// Grid point searched with the default `ef_search`.
    pub fn new(m: u32, ef_construction: u32) -> Self {
        Self { m, ef_construction, ef_search: DEFAULT_EF_SEARCH }
    }

    pub fn with_ef_search(mut self, ef_search: u32) -> Self {
        self.ef_search = ef_search;
        self
    }

    /// The construction half of the point.
    pub fn hnsw(&self) -> HnswParams {
        HnswParams::new(self.m, self.ef_construction)
    }

    fn validate(&self) -> Result<()> {
        self.hnsw().validate()?;
        validate_ef_search(self.ef_search)
    }
}

impl fmt::Display for TuningParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m={}, ef_construction={}, ef_search={}", self.m, self.ef_construction, self.ef_search)
    }
}

/// What to measure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningConfig {
    /// Number of chunks sampled as queries.
    pub sample_size: usize,
    /// Neighbours per query for Precision@k.
    pub top_k: usize,
    pub combinations: Vec<TuningParams>,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self { sample_size: 100, top_k: 10, combinations: default_combinations() }
    }
}

impl TuningConfig {
    fn validate(&self) -> Result<()> {
        if self.sample_size == 0 || self.top_k == 0 {
            return Err(RagError::ConfigError(
                "sample_size and top_k must be greater than zero".to_string(),
            ));
        }
        if self.combinations.is_empty() {
            return Err(RagError::ConfigError("no parameter combinations to test".to_string()));
        }
        self.combinations.iter().try_for_each(TuningParams::validate)
    }
}

/// The grid searched when none is given: `m` sweep, `ef_construction`
/// sweep, `ef_search` sweep, then two balanced points.
pub fn default_combinations() -> Vec<TuningParams> {
    vec![
        TuningParams::new(8, 64).with_ef_search(64),
        TuningParams::new(16, 64).with_ef_search(64),
        TuningParams::new(32, 64).with_ef_search(64),
        TuningParams::new(64, 128).with_ef_search(64),
        TuningParams::new(16, 32).with_ef_search(64),
        TuningParams::new(16, 128).with_ef_search(64),
        TuningParams::new(16, 200).with_ef_search(64),
        TuningParams::new(16, 64).with_ef_search(32),
        TuningParams::new(16, 64).with_ef_search(128),
        TuningParams::new(16, 64).with_ef_search(200),
        TuningParams::new(32, 128).with_ef_search(128),
        TuningParams::new(24, 96).with_ef_search(96),
    ]
}

/// A sampled query vector and its exact top-k neighbour ids.
#[derive(Debug, Clone)]
pub struct TuningQuery {
    pub chunk_id: i64,
    pub embedding: Vec<f32>,
    pub truth: Vec<i64>,
}

/// Measurements for one grid point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningRun {
    pub params: TuningParams,
    pub build_time_secs: f64,
    pub index_size_bytes: u64,
    pub mean_latency_ms: f64,
    pub precision_at_k: f64,
    pub queries_per_second: f64,
}

/// The best-scoring run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub params: TuningParams,
    pub score: f64,
}

/// Everything a tuning session produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningReport {
    pub metric: DistanceMetric,
    pub sample_size: usize,
    pub top_k: usize,
    pub runs: Vec<TuningRun>,
    /// `None` when every combination failed.
    pub recommendation: Option<Recommendation>,
    pub lowest_latency: Option<TuningParams>,
    pub highest_accuracy: Option<TuningParams>,
    pub highest_throughput: Option<TuningParams>,
    pub fastest_build: Option<TuningParams>,
    pub smallest_index: Option<TuningParams>,
    /// The production index was live during the session and may have served
    /// some of the approximate queries.
    #[serde(default)]
    pub production_index_ready: bool,
    pub generated_at: DateTime<Utc>,
}

impl TuningReport {
    /// Summarise a set of runs.
    pub fn from_runs(
        metric: DistanceMetric,
        sample_size: usize,
        top_k: usize,
        runs: Vec<TuningRun>,
    ) -> Self {
        let best_by = |key: fn(&TuningRun) -> f64| {
            runs.iter().min_by(|a, b| key(a).total_cmp(&key(b))).map(|r| r.params)
        };
        Self {
            metric,
            sample_size,
            top_k,
            recommendation: recommend(&runs),
            lowest_latency: best_by(|r| r.mean_latency_ms),
            highest_accuracy: best_by(|r| -r.precision_at_k),
            highest_throughput: best_by(|r| -r.queries_per_second),
            fastest_build: best_by(|r| r.build_time_secs),
            smallest_index: best_by(|r| r.index_size_bytes as f64),
            production_index_ready: false,
            runs,
            generated_at: Utc::now(),
        }
    }
}

/// Weighted score per run: `0.4 * accuracy + 0.4 * latency + 0.2 * build time`,
/// each min-max normalised across `runs` so that 1.0 is best. A measure that
/// does not vary normalises to 1.0 for every run.
pub fn score_runs(runs: &[TuningRun]) -> Vec<f64> {
    let accuracy = normalise(runs, |r| r.precision_at_k, false);
    let latency = normalise(runs, |r| r.mean_latency_ms, true);
    let build = normalise(runs, |r| r.build_time_secs, true);
    (0..runs.len())
        .map(|i| ACCURACY_WEIGHT * accuracy[i] + LATENCY_WEIGHT * latency[i] + BUILD_TIME_WEIGHT * build[i])
        .collect()
}

fn normalise(runs: &[TuningRun], key: fn(&TuningRun) -> f64, lower_is_better: bool) -> Vec<f64> {
    let values: Vec<f64> = runs.iter().map(key).collect();
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    values
        .into_iter()
        .map(|v| {
            if range <= 0.0 {
                1.0
            } else if lower_is_better {
                (max - v) / range
            } else {
                (v - min) / range
            }
        })
        .collect()
}

/// The highest-scoring run; the earliest wins a tie.
pub fn recommend(runs: &[TuningRun]) -> Option<Recommendation> {
    let scores = score_runs(runs);
    let mut best: Option<(usize, f64)> = None;
    for (i, &score) in scores.iter().enumerate() {
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((i, score));
        }
    }
    best.map(|(i, score)| Recommendation { params: runs[i].params, score })
}

/// Fraction of `truth` found in `found`, over `min(k, |truth|)`.
pub fn precision_at_k(found: &[i64], truth: &[i64], k: usize) -> f64 {
    let denominator = k.min(truth.len());
    if denominator == 0 {
        return 1.0;
    }
    let truth: HashSet<i64> = truth.iter().copied().collect();
    let hits = found.iter().take(k).filter(|id| truth.contains(id)).count();
    hits as f64 / denominator as f64
}

/// Measures HNSW parameter combinations against exact search.
pub struct ParameterTuner {
    store: Arc<dyn VectorStore>,
    metric: DistanceMetric,
    config: TuningConfig,
    production_index: String,
}

impl ParameterTuner {
    pub fn new(store: Arc<dyn VectorStore>, metric: DistanceMetric, config: TuningConfig) -> Self {
        Self { store, metric, config, production_index: DEFAULT_INDEX_NAME.to_string() }
    }

    /// Name of the live index checked before measuring. Defaults to
    /// [`DEFAULT_INDEX_NAME`].
    pub fn with_production_index(mut self, name: impl Into<String>) -> Self {
        self.production_index = name.into();
        self
    }

    pub fn config(&self) -> &TuningConfig {
        &self.config
    }

    /// Sample query vectors and compute their exact top-k neighbours.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ValidationError`] if the corpus has no embedded
    /// chunks.
    pub async fn prepare_ground_truth(&self) -> Result<Vec<TuningQuery>> {
        let sample = self.store.sample_embeddings(self.config.sample_size).await?;
        if sample.is_empty() {
            return Err(RagError::validation("corpus", "no embedded chunks to sample"));
        }

        let mut queries = Vec::with_capacity(sample.len());
        for (chunk_id, embedding) in sample {
            let truth = self
                .store
                .nearest_ids(&NearestQuery {
                    embedding: &embedding,
                    metric: self.metric,
                    limit: self.config.top_k,
                    scan: ScanMode::Exact,
                })
                .await?;
            queries.push(TuningQuery { chunk_id, embedding, truth });
        }
        info!(queries = queries.len(), top_k = self.config.top_k, "ground truth ready");
        Ok(queries)
    }

    /// Measure a single combination against prepared queries.
    pub async fn evaluate(&self, params: TuningParams, queries: &[TuningQuery]) -> Result<TuningRun> {
        params.validate()?;
        let mut runs = self.evaluate_build(params.hnsw(), &[params.ef_search], queries).await?;
        runs.pop().ok_or_else(|| RagError::ConfigError("no ef_search to evaluate".to_string()))
    }

    /// Run the whole grid and summarise it.
    ///
    /// Combinations sharing `m` and `ef_construction` share one scratch
    /// build. A combination whose build or queries fail is logged and left
    /// out of the report.
    pub async fn run(&self) -> Result<TuningReport> {
        self.config.validate()?;
        let production_index_ready = self.production_index_ready().await;
        let queries = self.prepare_ground_truth().await?;

        let mut groups: Vec<(HnswParams, Vec<u32>)> = Vec::new();
        for params in &self.config.combinations {
            let hnsw = params.hnsw();
            match groups.iter_mut().find(|(h, _)| *h == hnsw) {
                Some((_, ef_searches)) => ef_searches.push(params.ef_search),
                None => groups.push((hnsw, vec![params.ef_search])),
            }
        }

        let mut runs = Vec::with_capacity(self.config.combinations.len());
        for (hnsw, ef_searches) in &groups {
            match self.evaluate_build(*hnsw, ef_searches, &queries).await {
                Ok(group_runs) => runs.extend(group_runs),
                Err(e) => warn!(params = %hnsw, error = %e, "combination failed, skipping"),
            }
        }

        let mut report =
            TuningReport::from_runs(self.metric, queries.len(), self.config.top_k, runs);
        report.production_index_ready = production_index_ready;
        if let Some(best) = &report.recommendation {
            info!(params = %best.params, score = best.score, "recommended parameters");
        }
        Ok(report)
    }

    async fn production_index_ready(&self) -> bool {
        match self.store.index_state(&self.production_index).await {
            Ok(IndexState::Ready) => {
                warn!(
                    index = %self.production_index,
                    "production index is live; approximate measurements may use it instead of the scratch index"
                );
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!(index = %self.production_index, error = %e, "could not check production index");
                false
            }
        }
    }

    async fn evaluate_build(
        &self,
        hnsw: HnswParams,
        ef_searches: &[u32],
        queries: &[TuningQuery],
    ) -> Result<Vec<TuningRun>> {
        let spec = IndexSpec::scratch(self.metric, hnsw)?;
        let outcome = self.measure_build(&spec, ef_searches, queries).await;
        if let Err(e) = self.store.drop_index(&spec.name).await {
            warn!(index = %spec.name, error = %e, "failed to drop scratch index");
        }
        outcome
    }

    async fn measure_build(
        &self,
        spec: &IndexSpec,
        ef_searches: &[u32],
        queries: &[TuningQuery],
    ) -> Result<Vec<TuningRun>> {
        // A leftover from an interrupted session would make the build a no-op.
        self.store.drop_index(&spec.name).await?;

        let started = Instant::now();
        self.store.create_index(spec).await?;
        let build_time = started.elapsed();
        if self.store.index_state(&spec.name).await? != IndexState::Ready {
            return Err(RagError::IndexUnavailable {
                index: spec.name.clone(),
                message: "scratch build did not complete".into(),
            });
        }
        let index_size_bytes = self.store.index_size_bytes(&spec.name).await?;
        info!(index = %spec.name, build_secs = build_time.as_secs_f64(), index_size_bytes, "scratch index built");

        let mut runs = Vec::with_capacity(ef_searches.len());
        for &ef_search in ef_searches {
            let (elapsed, precision) = self.measure_queries(ef_search, queries).await?;
            let total_secs = elapsed.as_secs_f64();
            let run = TuningRun {
                params: TuningParams {
                    m: spec.params.m,
                    ef_construction: spec.params.ef_construction,
                    ef_search,
                },
                build_time_secs: build_time.as_secs_f64(),
                index_size_bytes,
                mean_latency_ms: total_secs * 1000.0 / queries.len() as f64,
                precision_at_k: precision,
                queries_per_second: queries.len() as f64 / total_secs.max(f64::EPSILON),
            };
            info!(
                params = %run.params,
                latency_ms = run.mean_latency_ms,
                precision = run.precision_at_k,
                "combination measured"
            );
            runs.push(run);
        }
        Ok(runs)
    }

    /// Total query time and mean Precision@k at one `ef_search`.
    async fn measure_queries(
        &self,
        ef_search: u32,
        queries: &[TuningQuery],
    ) -> Result<(Duration, f64)> {
        let mut elapsed = Duration::ZERO;
        let mut precision_sum = 0.0;
        for query in queries {
            let started = Instant::now();
            let found = self
                .store
                .nearest_ids(&NearestQuery {
                    embedding: &query.embedding,
                    metric: self.metric,
                    limit: self.config.top_k,
                    scan: ScanMode::Approximate { ef_search },
                })
                .await?;
            elapsed += started.elapsed();
            precision_sum += precision_at_k(&found, &query.truth, self.config.top_k);
        }
        Ok((elapsed, precision_sum / queries.len().max(1) as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(m: u32, latency: f64, precision: f64, build: f64) -> TuningRun {
        TuningRun {
            params: TuningParams::new(m, 4 * m),
            build_time_secs: build,
            index_size_bytes: u64::from(m) * 1000,
            mean_latency_ms: latency,
            precision_at_k: precision,
            queries_per_second: 1000.0 / latency,
        }
    }

    #[test]
    fn default_grid_is_valid() {
        TuningConfig::default().validate().unwrap();
        assert_eq!(default_combinations().len(), 12);
    }

    #[test]
    fn precision_counts_overlap() {
        assert_eq!(precision_at_k(&[1, 2, 3, 4], &[1, 2, 5, 6], 4), 0.5);
        assert_eq!(precision_at_k(&[1, 2], &[1, 2], 10), 1.0);
        assert_eq!(precision_at_k(&[], &[], 10), 1.0);
    }

    #[test]
    fn scores_follow_weights() {
        let runs = vec![run(8, 1.0, 0.5, 1.0), run(16, 2.0, 1.0, 2.0)];
        let scores = score_runs(&runs);
        // fastest everywhere but least accurate
        assert!((scores[0] - 0.6).abs() < 1e-9);
        assert!((scores[1] - 0.4).abs() < 1e-9);
    }

    #[test]
    fn flat_measures_normalise_to_one() {
        let runs = vec![run(8, 1.0, 0.9, 1.0), run(16, 1.0, 0.9, 1.0)];
        assert_eq!(score_runs(&runs), vec![1.0, 1.0]);
        assert_eq!(recommend(&runs).unwrap().params.m, 8);
    }

    #[test]
    fn report_picks_best_per_measure() {
        let runs = vec![run(8, 1.0, 0.5, 3.0), run(16, 2.0, 1.0, 1.0)];
        let report = TuningReport::from_runs(DistanceMetric::Cosine, 50, 10, runs);
        assert_eq!(report.lowest_latency.unwrap().m, 8);
        assert_eq!(report.highest_accuracy.unwrap().m, 16);
        assert_eq!(report.highest_throughput.unwrap().m, 8);
        assert_eq!(report.fastest_build.unwrap().m, 16);
        assert_eq!(report.smallest_index.unwrap().m, 8);
    }

    #[test]
    fn empty_runs_have_no_recommendation() {
        assert!(recommend(&[]).is_none());
    }
}
