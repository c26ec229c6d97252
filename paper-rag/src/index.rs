//! HNSW index parameters and lifecycle management.
//!
//! The index is derived data: it can be dropped and rebuilt from chunk rows
//! at any time. While it is missing, retrieval falls back to an exact scan.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

/// Name of the production index over `paper_chunks.embedding`.
pub const DEFAULT_INDEX_NAME: &str = "ix_paper_chunks_embedding";

/// Prefix reserved for the tuner's scratch indexes.
pub const SCRATCH_INDEX_PREFIX: &str = "tune_";

/// pgvector's default `hnsw.ef_search`.
pub const DEFAULT_EF_SEARCH: u32 = 40;

const MIN_M: u32 = 2;
const MAX_M: u32 = 100;
const MIN_EF_CONSTRUCTION: u32 = 4;
const MAX_EF_CONSTRUCTION: u32 = 1000;
const MAX_EF_SEARCH: u32 = 1000;
const MAX_IDENTIFIER_LEN: usize = 63;

/// How long a readiness check is trusted before queries re-read it.
pub const DEFAULT_READINESS_TTL: Duration = Duration::from_secs(30);

/// Suffix for an index built in the background before being swapped in.
const STAGED_SUFFIX: &str = "_next";

/// Similarity metric for the embedding column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Cosine distance, `1 - cos(a, b)`.
    #[default]
    Cosine,
    /// Euclidean distance.
    L2,
}

impl DistanceMetric {
    /// pgvector distance operator.
    pub fn operator(self) -> &'static str {
        match self {
            Self::Cosine => "<=>",
            Self::L2 => "<->",
        }
    }

    /// pgvector operator class for HNSW indexes.
    pub fn operator_class(self) -> &'static str {
        match self {
            Self::Cosine => "vector_cosine_ops",
            Self::L2 => "vector_l2_ops",
        }
    }

    /// Distance between two vectors. Lower is closer.
    ///
    /// Cosine distance against a zero vector is `1.0`.
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => {
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    return 1.0;
                }
                1.0 - dot / (norm_a * norm_b)
            }
            Self::L2 => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt(),
        }
    }

    /// Map a distance to a similarity where higher is closer.
    ///
    /// Cosine gives `1 - distance`; L2 gives `1 / (1 + distance)`.
    pub fn similarity(self, distance: f32) -> f32 {
        match self {
            Self::Cosine => 1.0 - distance,
            Self::L2 => 1.0 / (1.0 + distance),
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cosine => f.write_str("cosine"),
            Self::L2 => f.write_str("l2"),
        }
    }
}

impl FromStr for DistanceMetric {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "l2" | "euclidean" => Ok(Self::L2),
            other => Err(RagError::ConfigError(format!(
                "unknown distance metric '{other}' (expected cosine or l2)"
            ))),
        }
    }
}

/// HNSW graph-construction parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HnswParams {
    /// Maximum neighbours per node.
    pub m: u32,
    /// Candidate list size while building.
    pub ef_construction: u32,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self { m: 16, ef_construction: 64 }
    }
}

impl HnswParams {
    pub fn new(m: u32, ef_construction: u32) -> Self {
        Self { m, ef_construction }
    }

    /// Check the parameters against pgvector's accepted ranges.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_M..=MAX_M).contains(&self.m) {
            return Err(RagError::ConfigError(format!(
                "m ({}) must be between {MIN_M} and {MAX_M}",
                self.m
            )));
        }
        if !(MIN_EF_CONSTRUCTION..=MAX_EF_CONSTRUCTION).contains(&self.ef_construction) {
            return Err(RagError::ConfigError(format!(
                "ef_construction ({}) must be between {MIN_EF_CONSTRUCTION} and {MAX_EF_CONSTRUCTION}",
                self.ef_construction
            )));
        }
        if self.ef_construction < 2 * self.m {
            return Err(RagError::ConfigError(format!(
                "ef_construction ({}) must be at least 2 * m ({})",
                self.ef_construction,
                2 * self.m
            )));
        }
        Ok(())
    }
}

impl fmt::Display for HnswParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m={}, ef_construction={}", self.m, self.ef_construction)
    }
}

/// Check a query-time `ef_search` value.
pub fn validate_ef_search(ef_search: u32) -> Result<()> {
    if !(1..=MAX_EF_SEARCH).contains(&ef_search) {
        return Err(RagError::ConfigError(format!(
            "ef_search ({ef_search}) must be between 1 and {MAX_EF_SEARCH}"
        )));
    }
    Ok(())
}

/// Check that a name is a safe, unquoted PostgreSQL identifier.
pub fn validate_index_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars.next().is_some_and(|c| c.is_ascii_lowercase() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !valid_start || !valid_rest || name.len() > MAX_IDENTIFIER_LEN {
        return Err(RagError::ConfigError(format!(
            "invalid index name '{name}': use at most {MAX_IDENTIFIER_LEN} lowercase letters, digits or underscores"
        )));
    }
    Ok(())
}

/// A fully specified HNSW index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub metric: DistanceMetric,
    pub params: HnswParams,
}

impl IndexSpec {
    /// Build and validate a spec.
    pub fn new(name: impl Into<String>, metric: DistanceMetric, params: HnswParams) -> Result<Self> {
        let name = name.into();
        validate_index_name(&name)?;
        params.validate()?;
        Ok(Self { name, metric, params })
    }

    /// The spec for a scratch index used while tuning.
    pub fn scratch(metric: DistanceMetric, params: HnswParams) -> Result<Self> {
        Self::new(
            format!("{SCRATCH_INDEX_PREFIX}hnsw_m{}_efc{}", params.m, params.ef_construction),
            metric,
            params,
        )
    }

    /// Whether this is a tuner scratch index.
    pub fn is_scratch(&self) -> bool {
        self.name.starts_with(SCRATCH_INDEX_PREFIX)
    }
}

/// How a nearest-neighbour query is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanMode {
    /// Full scan. Always correct, used for ground truth and as a fallback.
    Exact,
    /// Through the HNSW index with the given candidate list size.
    Approximate { ef_search: u32 },
}

/// Observed state of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    /// No index with that name.
    Missing,
    /// Exists but unusable, e.g. left behind by a failed concurrent build.
    Invalid,
    /// Built and used by the planner.
    Ready,
}

/// Owns the lifecycle of the production HNSW index.
///
/// Creation is idempotent and does not block readers. Drop and rebuild are
/// serialized against each other; a rebuild builds a staged index first and
/// swaps it in atomically.
pub struct VectorIndexManager {
    store: Arc<dyn VectorStore>,
    spec: RwLock<IndexSpec>,
    ef_search: u32,
    ready: AtomicBool,
    checked_at: StdMutex<Option<Instant>>,
    readiness_ttl: Duration,
    mutation: Mutex<()>,
}

impl VectorIndexManager {
    /// Create a manager for `spec`, querying with `ef_search` by default.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] for a scratch-prefixed name or an
    /// out-of-range `ef_search`.
    pub fn new(store: Arc<dyn VectorStore>, spec: IndexSpec, ef_search: u32) -> Result<Self> {
        if spec.is_scratch() {
            return Err(RagError::ConfigError(format!(
                "production index name '{}' uses the reserved prefix '{SCRATCH_INDEX_PREFIX}'",
                spec.name
            )));
        }
        validate_ef_search(ef_search)?;
        Ok(Self {
            store,
            spec: RwLock::new(spec),
            ef_search,
            ready: AtomicBool::new(false),
            checked_at: StdMutex::new(None),
            readiness_ttl: DEFAULT_READINESS_TTL,
            mutation: Mutex::new(()),
        })
    }

    /// Set how long a readiness check stays valid for
    /// [`query_scan_mode`](Self::query_scan_mode).
    pub fn with_readiness_ttl(mut self, ttl: Duration) -> Self {
        self.readiness_ttl = ttl;
        self
    }

    /// The current index definition.
    pub fn spec(&self) -> IndexSpec {
        self.spec.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// The metric queries must use to hit the index.
    pub fn metric(&self) -> DistanceMetric {
        self.spec().metric
    }

    /// Default query-time `ef_search`.
    pub fn default_ef_search(&self) -> u32 {
        self.ef_search
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Whether the last check found the index ready.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Scan mode for the next query from the cached readiness.
    ///
    /// Approximate with `ef_search` (or the default) when the index is ready,
    /// exact otherwise.
    pub fn scan_mode(&self, ef_search: Option<u32>) -> ScanMode {
        if self.is_ready() {
            ScanMode::Approximate { ef_search: ef_search.unwrap_or(self.ef_search) }
        } else {
            ScanMode::Exact
        }
    }

    /// Like [`scan_mode`](Self::scan_mode), but first re-reads the index
    /// state if it was never checked or the last check is older than the
    /// readiness TTL. A failed check keeps the cached value.
    pub async fn query_scan_mode(&self, ef_search: Option<u32>) -> ScanMode {
        if self.readiness_is_stale() {
            if let Err(e) = self.status().await {
                warn!(index = %self.spec().name, error = %e, "index state check failed");
                self.mark_checked();
            }
        }
        self.scan_mode(ef_search)
    }

    fn readiness_is_stale(&self) -> bool {
        let checked_at = self.checked_at.lock().unwrap_or_else(|e| e.into_inner());
        checked_at.is_none_or(|at| at.elapsed() >= self.readiness_ttl)
    }

    fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
        self.mark_checked();
    }

    fn mark_checked(&self) {
        *self.checked_at.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
    }

    /// Create the index if it does not exist.
    ///
    /// Calling this repeatedly is safe. An existing index is kept as is, even
    /// if its parameters differ; use [`rebuild`](Self::rebuild) to change them.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexUnavailable`] if the build fails or leaves an
    /// invalid index behind. Chunk data is unaffected.
    pub async fn ensure_index(&self) -> Result<IndexState> {
        let spec = self.spec();
        if let Err(e) = self.store.create_index(&spec).await {
            error!(index = %spec.name, error = %e, "index creation failed, falling back to exact scan");
            self.set_ready(false);
            return Err(unavailable(&spec.name, e));
        }

        let state = self.status().await?;
        match state {
            IndexState::Ready => {
                info!(index = %spec.name, params = %spec.params, metric = %spec.metric, "index ready");
                Ok(state)
            }
            IndexState::Invalid => {
                warn!(index = %spec.name, "index build left an invalid index, dropping it");
                let _guard = self.mutation.lock().await;
                self.store.drop_index(&spec.name).await?;
                Err(RagError::IndexUnavailable {
                    index: spec.name,
                    message: "build did not complete; dropped the invalid index".into(),
                })
            }
            IndexState::Missing => Err(RagError::IndexUnavailable {
                index: spec.name,
                message: "index missing after creation".into(),
            }),
        }
    }

    /// Query the store for the index state and refresh the cached readiness.
    pub async fn status(&self) -> Result<IndexState> {
        let name = self.spec().name;
        let state = self.store.index_state(&name).await?;
        self.set_ready(state == IndexState::Ready);
        Ok(state)
    }

    /// Drop the index. Retrieval falls back to exact scan afterwards.
    pub async fn drop_index(&self) -> Result<()> {
        let _guard = self.mutation.lock().await;
        let name = self.spec().name;
        self.set_ready(false);
        self.store.drop_index(&name).await?;
        info!(index = %name, "index dropped");
        Ok(())
    }

    /// Rebuild the index with new construction parameters.
    ///
    /// The new index is built under a staged name while the old one keeps
    /// serving, then swapped in atomically. If no index exists yet the staged
    /// index simply becomes the live one.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] for invalid parameters and
    /// [`RagError::IndexUnavailable`] if the staged build fails. The live
    /// index is untouched in both cases.
    pub async fn rebuild(&self, params: HnswParams) -> Result<()> {
        params.validate()?;
        let _guard = self.mutation.lock().await;

        let live = self.spec();
        let staged = IndexSpec::new(format!("{}{STAGED_SUFFIX}", live.name), live.metric, params)?;

        // A leftover staged index from an interrupted rebuild may have other params.
        self.store.drop_index(&staged.name).await?;
        if let Err(e) = self.store.create_index(&staged).await {
            error!(index = %staged.name, error = %e, "staged index build failed");
            return Err(unavailable(&staged.name, e));
        }
        if self.store.index_state(&staged.name).await? != IndexState::Ready {
            self.store.drop_index(&staged.name).await?;
            return Err(RagError::IndexUnavailable {
                index: staged.name,
                message: "staged build did not complete".into(),
            });
        }

        self.store.swap_index(&live.name, &staged.name).await?;

        let mut spec = self.spec.write().unwrap_or_else(|e| e.into_inner());
        spec.params = params;
        drop(spec);
        self.set_ready(true);
        info!(index = %live.name, from = %live.params, to = %params, "index rebuilt");
        Ok(())
    }
}

fn unavailable(index: &str, cause: RagError) -> RagError {
    RagError::IndexUnavailable { index: index.to_string(), message: cause.to_string() }
}
