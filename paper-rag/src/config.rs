//! Configuration for chunking, embedding, indexing and retrieval.

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::index::{
    DEFAULT_EF_SEARCH, DEFAULT_INDEX_NAME, DistanceMetric, HnswParams, IndexSpec,
    validate_ef_search, validate_index_name,
};

/// Configuration parameters shared by the ingest pipeline and retrieval engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Maximum number of texts sent to the embedding provider per call.
    pub embedding_batch_size: usize,
    /// Result count used when the caller does not pass one.
    pub default_limit: usize,
    /// Largest result count a caller may request.
    pub max_limit: usize,
    /// Name of the production HNSW index.
    pub index_name: String,
    /// Similarity metric for both the index and queries.
    pub metric: DistanceMetric,
    /// HNSW construction parameters.
    pub hnsw: HnswParams,
    /// Default query-time candidate list size.
    pub ef_search: u32,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            embedding_batch_size: 256,
            default_limit: 10,
            max_limit: 50,
            index_name: DEFAULT_INDEX_NAME.to_string(),
            metric: DistanceMetric::Cosine,
            hnsw: HnswParams::default(),
            ef_search: DEFAULT_EF_SEARCH,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// The production index described by this configuration.
    pub fn index_spec(&self) -> Result<IndexSpec> {
        IndexSpec::new(self.index_name.clone(), self.metric, self.hnsw)
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the number of texts per embedding request.
    pub fn embedding_batch_size(mut self, size: usize) -> Self {
        self.config.embedding_batch_size = size;
        self
    }

    /// Set the default result count.
    pub fn default_limit(mut self, limit: usize) -> Self {
        self.config.default_limit = limit;
        self
    }

    /// Set the largest result count a caller may request.
    pub fn max_limit(mut self, limit: usize) -> Self {
        self.config.max_limit = limit;
        self
    }

    /// Set the production index name.
    pub fn index_name(mut self, name: impl Into<String>) -> Self {
        self.config.index_name = name.into();
        self
    }

    /// Set the similarity metric.
    pub fn metric(mut self, metric: DistanceMetric) -> Self {
        self.config.metric = metric;
        self
    }

    /// Set the HNSW construction parameters.
    pub fn hnsw(mut self, params: HnswParams) -> Self {
        self.config.hnsw = params;
        self
    }

    /// Set the default query-time `ef_search`.
    pub fn ef_search(mut self, ef_search: u32) -> Self {
        self.config.ef_search = ef_search;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_size == 0` or `embedding_batch_size == 0`
    /// - `default_limit` is zero or exceeds `max_limit`
    /// - the index name, HNSW parameters or `ef_search` are out of range
    pub fn build(self) -> Result<RagConfig> {
        let config = self.config;
        if config.chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if config.embedding_batch_size == 0 {
            return Err(RagError::ConfigError(
                "embedding_batch_size must be greater than zero".to_string(),
            ));
        }
        if config.default_limit == 0 || config.default_limit > config.max_limit {
            return Err(RagError::ConfigError(format!(
                "default_limit ({}) must be between 1 and max_limit ({})",
                config.default_limit, config.max_limit
            )));
        }
        validate_index_name(&config.index_name)?;
        config.hnsw.validate()?;
        validate_ef_search(config.ef_search)?;
        Ok(config)
    }
}
