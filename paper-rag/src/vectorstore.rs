//! Vector store trait: nearest-neighbour queries and ANN index lifecycle.

use async_trait::async_trait;

use crate::document::ChunkHit;
use crate::error::Result;
use crate::index::{DistanceMetric, IndexSpec, IndexState, ScanMode};

/// A nearest-neighbour query against the chunk embeddings.
#[derive(Debug, Clone, Copy)]
pub struct NearestQuery<'a> {
    /// The query vector.
    pub embedding: &'a [f32],
    /// Metric to order by. Must match the index metric for the index to be used.
    pub metric: DistanceMetric,
    /// Maximum number of hits.
    pub limit: usize,
    /// Exact full scan, or approximate through the HNSW index.
    pub scan: ScanMode,
}

/// A storage backend for chunk embeddings with an HNSW index.
///
/// Index lifecycle calls take a validated [`IndexSpec`] or an index name
/// that has passed [`IndexSpec`] name validation.
///
/// # Example
///
/// ```rust,ignore
/// use paper_rag::{DistanceMetric, NearestQuery, ScanMode, VectorStore};
///
/// store.create_index(&spec).await?;
/// let hits = store
///     .nearest(&NearestQuery {
///         embedding: &query_vector,
///         metric: DistanceMetric::Cosine,
///         limit: 5,
///         scan: ScanMode::Approximate { ef_search: 40 },
///     })
///     .await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Build an index. No-op if an index with that name already exists.
    ///
    /// The build must not block concurrent readers.
    async fn create_index(&self, spec: &IndexSpec) -> Result<()>;

    /// Report whether the named index exists and is usable.
    async fn index_state(&self, name: &str) -> Result<IndexState>;

    /// Drop the named index. No-op if it does not exist.
    async fn drop_index(&self, name: &str) -> Result<()>;

    /// Atomically replace the `live` index with the `staged` one.
    ///
    /// Afterwards `staged` no longer exists and `live` has its definition.
    /// Readers see either the old or the new index, never neither.
    async fn swap_index(&self, live: &str, staged: &str) -> Result<()>;

    /// On-disk (or estimated in-memory) size of the named index in bytes.
    async fn index_size_bytes(&self, name: &str) -> Result<u64>;

    /// Nearest chunks to the query vector, closest first, joined with their papers.
    async fn nearest(&self, query: &NearestQuery<'_>) -> Result<Vec<ChunkHit>>;

    /// Ids of the nearest chunks, closest first. No join.
    async fn nearest_ids(&self, query: &NearestQuery<'_>) -> Result<Vec<i64>>;

    /// A random sample of embedded chunks as `(chunk id, embedding)` pairs.
    async fn sample_embeddings(&self, count: usize) -> Result<Vec<(i64, Vec<f32>)>>;
}
