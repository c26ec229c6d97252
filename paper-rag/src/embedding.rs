//! Embedding provider trait and the batching embedder built on top of it.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::error::{RagError, Result};

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends (OpenAI, local models)
/// behind a unified async interface. The default
/// [`embed_batch`](EmbeddingProvider::embed_batch) implementation calls
/// [`embed`](EmbeddingProvider::embed) sequentially; backends that support
/// native batching should override it.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs, in input order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// Short provider name used in errors and logs.
    fn name(&self) -> &str {
        "embedding"
    }
}

/// Splits inputs into provider-sized batches and checks every response.
///
/// A batch whose response has the wrong length, or contains a vector of the
/// wrong dimension, fails the whole call. Nothing is returned unless every
/// batch succeeds, so callers never persist a half-embedded document.
#[derive(Clone)]
pub struct BatchEmbedder {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl BatchEmbedder {
    /// Wrap a provider, sending at most `batch_size` texts per call.
    ///
    /// A `batch_size` of zero is treated as one.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        Self { provider, batch_size: batch_size.max(1) }
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Dimensionality every returned vector is checked against.
    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    /// Embed all texts, returning vectors in input order.
    ///
    /// An empty input returns an empty output without calling the provider.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingError`] if any batch fails or returns
    /// malformed vectors.
    pub async fn embed_all(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batch_count = texts.len().div_ceil(self.batch_size);
        debug!(
            provider = self.provider.name(),
            text_count = texts.len(),
            batch_count,
            "embedding texts"
        );

        let mut embeddings = Vec::with_capacity(texts.len());
        for (batch_index, batch) in texts.chunks(self.batch_size).enumerate() {
            let vectors = self.provider.embed_batch(batch).await.map_err(|e| {
                error!(provider = self.provider.name(), batch_index, error = %e, "batch failed");
                e
            })?;
            self.check_batch(batch.len(), &vectors)?;
            embeddings.extend(vectors);
        }

        Ok(embeddings)
    }

    /// Embed a single query string.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let vector = self.provider.embed(text).await?;
        self.check_batch(1, std::slice::from_ref(&vector))?;
        Ok(vector)
    }

    fn check_batch(&self, expected: usize, vectors: &[Vec<f32>]) -> Result<()> {
        if vectors.len() != expected {
            return Err(self.malformed(format!(
                "expected {expected} embeddings, provider returned {}",
                vectors.len()
            )));
        }
        let dimensions = self.provider.dimensions();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimensions) {
            return Err(self.malformed(format!(
                "expected {dimensions}-dimensional embeddings, got {}",
                bad.len()
            )));
        }
        Ok(())
    }

    fn malformed(&self, message: String) -> RagError {
        RagError::EmbeddingError { provider: self.provider.name().to_string(), message }
    }
}
