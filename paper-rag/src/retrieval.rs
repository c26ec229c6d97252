//! Semantic, lexical and hybrid search over the chunk corpus.
//!
//! The [`RetrievalEngine`] composes a [`PaperRepository`] for lexical
//! matches, a [`VectorIndexManager`] (and through it the [`VectorStore`])
//! for nearest-neighbour queries, and a [`BatchEmbedder`] for query vectors.
//!
//! # Example
//!
//! ```rust,ignore
//! use paper_rag::{RagConfig, RetrievalEngine};
//!
//! let engine = RetrievalEngine::builder()
//!     .config(RagConfig::default())
//!     .repository(store.clone())
//!     .index_manager(index.clone())
//!     .embedder(embedder)
//!     .build()?;
//!
//! let results = engine.hybrid_search("graph neural networks", 0.7, 0.3, 10).await?;
//! ```
//!
//! [`VectorStore`]: crate::VectorStore

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::RagConfig;
use crate::document::{ChunkHit, PaperFilter, SearchResult};
use crate::embedding::BatchEmbedder;
use crate::error::{RagError, Result};
use crate::index::{VectorIndexManager, validate_ef_search};
use crate::repository::PaperRepository;
use crate::validation::{
    validate_limit, validate_question, validate_search_query, validate_threshold, validate_weights,
};
use crate::vectorstore::NearestQuery;

/// Characters stripped from the ends of title words when building suggestions.
const SUGGESTION_PUNCTUATION: [char; 6] = ['.', ',', '!', '?', ';', ':'];

/// Shortest word offered as a suggestion.
const MIN_SUGGESTION_LEN: usize = 3;

/// Answers search queries. Construct one via [`RetrievalEngine::builder()`].
///
/// Every method validates its input before any I/O. An empty result is
/// `Ok(vec![])`; a failed embedding call is always an error.
pub struct RetrievalEngine {
    config: RagConfig,
    repository: Arc<dyn PaperRepository>,
    index: Arc<VectorIndexManager>,
    embedder: BatchEmbedder,
}

impl RetrievalEngine {
    /// Create a new [`RetrievalEngineBuilder`].
    pub fn builder() -> RetrievalEngineBuilder {
        RetrievalEngineBuilder::default()
    }

    /// Return a reference to the engine configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return the index manager queries are routed through.
    pub fn index_manager(&self) -> &Arc<VectorIndexManager> {
        &self.index
    }

    /// Nearest chunks to the query by embedding distance, closest first.
    ///
    /// When `similarity_threshold` is set, hits below it are dropped. The
    /// index is approximate, so the floor is advisory: a qualifying chunk the
    /// graph search missed is not recovered.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ValidationError`] for a bad query, limit or
    /// threshold, and [`RagError::EmbeddingError`] if the query could not be
    /// embedded.
    pub async fn semantic_search(
        &self,
        query: &str,
        limit: usize,
        similarity_threshold: Option<f32>,
    ) -> Result<Vec<SearchResult>> {
        self.semantic_search_with(query, limit, similarity_threshold, None).await
    }

    /// [`semantic_search`](Self::semantic_search) with a per-query
    /// `ef_search` override.
    pub async fn semantic_search_with(
        &self,
        query: &str,
        limit: usize,
        similarity_threshold: Option<f32>,
        ef_search: Option<u32>,
    ) -> Result<Vec<SearchResult>> {
        let query = validate_search_query(query)?;
        validate_limit(limit, self.config.max_limit)?;
        validate_threshold(similarity_threshold)?;
        if let Some(ef) = ef_search {
            validate_ef_search(ef).map_err(|e| RagError::validation("ef_search", e.to_string()))?;
        }

        let hits = self.semantic_hits(&query, limit, similarity_threshold, ef_search).await?;
        let results: Vec<SearchResult> = hits.into_iter().map(SearchResult::from).collect();
        info!(mode = "semantic", result_count = results.len(), "search completed");
        Ok(results)
    }

    /// Chunks whose text contains the query, case-insensitively.
    ///
    /// Results are ordered by chunk id, not by relevance.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ValidationError`] for a bad query or limit.
    pub async fn text_search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let query = validate_search_query(query)?;
        validate_limit(limit, self.config.max_limit)?;

        let hits = self.lexical_hits(&query, limit).await?;
        let results: Vec<SearchResult> = hits.into_iter().map(SearchResult::from).collect();
        info!(mode = "text", result_count = results.len(), "search completed");
        Ok(results)
    }

    /// Semantic and lexical search merged into one deduplicated list.
    ///
    /// Both sub-queries run concurrently with `2 * limit` candidates each. A
    /// source with zero weight is not queried. See [`fuse_results`] for the
    /// merge order.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ValidationError`] for a bad query, limit or
    /// weights, and [`RagError::EmbeddingError`] if the semantic side could
    /// not embed the query.
    pub async fn hybrid_search(
        &self,
        query: &str,
        semantic_weight: f32,
        lexical_weight: f32,
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        let query = validate_search_query(query)?;
        validate_limit(limit, self.config.max_limit)?;
        validate_weights(semantic_weight, lexical_weight)?;

        let candidates = limit * 2;
        let semantic = async {
            if semantic_weight > 0.0 {
                self.semantic_hits(&query, candidates, None, None).await
            } else {
                Ok(Vec::new())
            }
        };
        let lexical = async {
            if lexical_weight > 0.0 {
                self.lexical_hits(&query, candidates).await
            } else {
                Ok(Vec::new())
            }
        };
        let (semantic, lexical) = tokio::try_join!(semantic, lexical)?;

        let results = fuse_results(
            semantic.into_iter().map(SearchResult::from).collect(),
            lexical.into_iter().map(SearchResult::from).collect(),
            semantic_weight,
            lexical_weight,
            limit,
        );
        info!(
            mode = "hybrid",
            semantic_weight,
            lexical_weight,
            result_count = results.len(),
            "search completed"
        );
        Ok(results)
    }

    /// Nearest chunks to ground a generated answer, closest first.
    ///
    /// The question only goes to the embedder, so it is checked for length
    /// but not for the characters [`text_search`](Self::text_search) rejects.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ValidationError`] for a blank question or a bad
    /// limit, and [`RagError::EmbeddingError`] if it could not be embedded.
    pub async fn context_for(&self, question: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let question = validate_question(question)?;
        validate_limit(limit, self.config.max_limit)?;

        let hits = self.semantic_hits(&question, limit, None, None).await?;
        debug!(context_chunks = hits.len(), "answer context retrieved");
        Ok(hits.into_iter().map(SearchResult::from).collect())
    }

    /// Lowercased title words containing `partial`, for search-as-you-type.
    ///
    /// At most `max_limit` words are returned. Never fails: store errors are
    /// logged and yield an empty list.
    pub async fn suggest(&self, partial: &str, limit: usize) -> Vec<String> {
        let partial = partial.trim().to_lowercase();
        if partial.chars().count() < 2 || limit == 0 {
            return Vec::new();
        }

        let limit = limit.min(self.config.max_limit);
        let filter = PaperFilter {
            query: Some(partial.clone()),
            limit: limit.saturating_mul(2),
            ..Default::default()
        };
        let papers = match self.repository.list_papers(&filter).await {
            Ok(papers) => papers,
            Err(e) => {
                warn!(error = %e, "suggestion lookup failed");
                return Vec::new();
            }
        };

        let mut seen = HashSet::new();
        let mut suggestions = Vec::new();
        for paper in &papers {
            for word in paper.title.split_whitespace() {
                let word = word.trim_matches(SUGGESTION_PUNCTUATION.as_slice()).to_lowercase();
                if word.chars().count() >= MIN_SUGGESTION_LEN
                    && word.contains(&partial)
                    && seen.insert(word.clone())
                {
                    suggestions.push(word);
                    if suggestions.len() >= limit {
                        return suggestions;
                    }
                }
            }
        }
        suggestions
    }

    async fn semantic_hits(
        &self,
        query: &str,
        limit: usize,
        similarity_threshold: Option<f32>,
        ef_search: Option<u32>,
    ) -> Result<Vec<ChunkHit>> {
        let embedding = self.embedder.embed_query(query).await.map_err(|e| {
            error!(error = %e, "query embedding failed");
            e
        })?;

        let metric = self.index.metric();
        let scan = self.index.query_scan_mode(ef_search).await;
        let hits = self
            .index
            .store()
            .nearest(&NearestQuery { embedding: &embedding, metric, limit, scan })
            .await?;

        Ok(match similarity_threshold {
            Some(floor) => hits
                .into_iter()
                .filter(|hit| hit.distance.is_some_and(|d| metric.similarity(d) >= floor))
                .collect(),
            None => hits,
        })
    }

    async fn lexical_hits(&self, query: &str, limit: usize) -> Result<Vec<ChunkHit>> {
        self.repository.search_chunk_text(query, limit).await
    }
}

/// Merge semantic and lexical results.
///
/// The list of the higher-weighted source comes first, semantic on a tie. A
/// source with weight zero contributes nothing. Later duplicates of a
/// (paper title, chunk text) pair are dropped, and the output is truncated
/// to `limit`.
pub fn fuse_results(
    semantic: Vec<SearchResult>,
    lexical: Vec<SearchResult>,
    semantic_weight: f32,
    lexical_weight: f32,
    limit: usize,
) -> Vec<SearchResult> {
    let semantic = if semantic_weight > 0.0 { semantic } else { Vec::new() };
    let lexical = if lexical_weight > 0.0 { lexical } else { Vec::new() };
    let ordered = if lexical_weight > semantic_weight {
        lexical.into_iter().chain(semantic)
    } else {
        semantic.into_iter().chain(lexical)
    };

    let mut seen: HashSet<(String, String)> = HashSet::new();
    ordered
        .filter(|r| seen.insert((r.paper_title.clone(), r.chunk_text.clone())))
        .take(limit)
        .collect()
}

/// Builder for constructing a [`RetrievalEngine`].
///
/// All fields except `config` are required; `config` defaults to
/// [`RagConfig::default()`].
#[derive(Default)]
pub struct RetrievalEngineBuilder {
    config: Option<RagConfig>,
    repository: Option<Arc<dyn PaperRepository>>,
    index: Option<Arc<VectorIndexManager>>,
    embedder: Option<BatchEmbedder>,
}

impl RetrievalEngineBuilder {
    /// Set the engine configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the paper repository used for lexical search and suggestions.
    pub fn repository(mut self, repository: Arc<dyn PaperRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Set the index manager used for nearest-neighbour queries.
    pub fn index_manager(mut self, index: Arc<VectorIndexManager>) -> Self {
        self.index = Some(index);
        self
    }

    /// Set the query embedder.
    pub fn embedder(mut self, embedder: BatchEmbedder) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Build the [`RetrievalEngine`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if any required field is missing.
    pub fn build(self) -> Result<RetrievalEngine> {
        let repository = self
            .repository
            .ok_or_else(|| RagError::ConfigError("repository is required".to_string()))?;
        let index = self
            .index
            .ok_or_else(|| RagError::ConfigError("index_manager is required".to_string()))?;
        let embedder =
            self.embedder.ok_or_else(|| RagError::ConfigError("embedder is required".to_string()))?;

        Ok(RetrievalEngine { config: self.config.unwrap_or_default(), repository, index, embedder })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(title: &str, text: &str) -> SearchResult {
        SearchResult {
            paper_title: title.into(),
            chunk_text: text.into(),
            page_number: None,
            pdf_path: None,
            distance: None,
        }
    }

    fn texts(results: &[SearchResult]) -> Vec<&str> {
        results.iter().map(|r| r.chunk_text.as_str()).collect()
    }

    #[test]
    fn semantic_first_on_tie() {
        let fused = fuse_results(
            vec![result("A", "s1"), result("A", "s2")],
            vec![result("B", "l1")],
            0.5,
            0.5,
            10,
        );
        assert_eq!(texts(&fused), vec!["s1", "s2", "l1"]);
    }

    #[test]
    fn lexical_first_when_heavier() {
        let fused =
            fuse_results(vec![result("A", "s1")], vec![result("B", "l1")], 0.3, 0.7, 10);
        assert_eq!(texts(&fused), vec!["l1", "s1"]);
    }

    #[test]
    fn duplicates_keep_first_occurrence() {
        let fused = fuse_results(
            vec![result("A", "same"), result("A", "s2")],
            vec![result("A", "same"), result("B", "l1")],
            0.7,
            0.3,
            10,
        );
        assert_eq!(texts(&fused), vec!["same", "s2", "l1"]);
    }

    #[test]
    fn same_text_in_different_papers_is_kept() {
        let fused =
            fuse_results(vec![result("A", "same")], vec![result("B", "same")], 0.7, 0.3, 10);
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn zero_weight_source_contributes_nothing() {
        let fused =
            fuse_results(vec![result("A", "s1")], vec![result("B", "l1")], 1.0, 0.0, 10);
        assert_eq!(texts(&fused), vec!["s1"]);
    }

    #[test]
    fn output_is_truncated() {
        let semantic = (0..5).map(|i| result("A", &format!("s{i}"))).collect();
        let lexical = (0..5).map(|i| result("B", &format!("l{i}"))).collect();
        assert_eq!(fuse_results(semantic, lexical, 0.7, 0.3, 3).len(), 3);
    }

    #[test]
    fn builder_requires_components() {
        assert!(matches!(RetrievalEngine::builder().build(), Err(RagError::ConfigError(_))));
    }
}
