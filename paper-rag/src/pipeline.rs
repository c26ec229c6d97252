//! Paper ingestion orchestrator.
//!
//! The [`IngestPipeline`] coordinates chunk → embed → store for one paper at
//! a time by composing a [`Chunker`], a [`BatchEmbedder`] and a
//! [`PaperRepository`].
//!
//! # Example
//!
//! ```rust,ignore
//! use paper_rag::{IngestPipeline, NewPaper, ParagraphChunker};
//!
//! let pipeline = IngestPipeline::builder()
//!     .chunker(Arc::new(ParagraphChunker::new(500)))
//!     .embedder(embedder)
//!     .repository(store.clone())
//!     .build()?;
//!
//! let outcome = pipeline.ingest(NewPaper::new("Attention Is All You Need"), &pages).await?;
//! ```

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use crate::chunking::Chunker;
use crate::document::{Chunk, NewChunk, NewPaper, Paper};
use crate::embedding::BatchEmbedder;
use crate::error::{RagError, Result};
use crate::repository::PaperRepository;

/// What happened to a paper handed to [`IngestPipeline::ingest`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestOutcome {
    /// The paper and its chunks were stored.
    Ingested { paper: Paper, chunk_count: usize },
    /// A paper with the same title already existed; nothing was written.
    Skipped { paper: Paper },
}

impl IngestOutcome {
    /// The stored paper, new or pre-existing.
    pub fn paper(&self) -> &Paper {
        match self {
            Self::Ingested { paper, .. } | Self::Skipped { paper } => paper,
        }
    }
}

/// The paper ingestion orchestrator.
///
/// Embedding happens before anything is written. If any batch fails, the
/// paper is not stored at all; otherwise the paper and every chunk land in
/// one transaction.
pub struct IngestPipeline {
    chunker: Arc<dyn Chunker>,
    embedder: BatchEmbedder,
    repository: Arc<dyn PaperRepository>,
}

impl IngestPipeline {
    /// Create a new [`IngestPipelineBuilder`].
    pub fn builder() -> IngestPipelineBuilder {
        IngestPipelineBuilder::default()
    }

    /// Chunk, embed and store one paper.
    ///
    /// `pages` holds the extracted text of each page in order; chunks record
    /// the 1-based page they came from. A paper whose title already exists
    /// is skipped.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ValidationError`] for invalid metadata,
    /// [`RagError::EmbeddingError`] if embedding fails and
    /// [`RagError::StoreError`] if the write fails. Nothing is persisted in
    /// any of these cases.
    pub async fn ingest(&self, paper: NewPaper, pages: &[String]) -> Result<IngestOutcome> {
        let paper = paper.validate()?;
        if let Some(existing) = self.repository.find_paper_by_title(&paper.title).await? {
            info!(paper.id = existing.id, title = %existing.title, "paper already ingested, skipping");
            return Ok(IngestOutcome::Skipped { paper: existing });
        }

        let chunks = self.embedded_chunks(&paper.title, pages).await?;
        let (stored, chunks) = self.repository.insert_paper(&paper, &chunks).await.map_err(|e| {
            error!(title = %paper.title, error = %e, "storing paper failed");
            e
        })?;

        let chunk_count = chunks.len();
        info!(paper.id = stored.id, chunk_count, "ingested paper");
        Ok(IngestOutcome::Ingested { paper: stored, chunk_count })
    }

    /// Ingest papers one after another, stopping at the first failure.
    ///
    /// Papers before the failing one stay ingested.
    pub async fn ingest_batch(
        &self,
        papers: Vec<(NewPaper, Vec<String>)>,
    ) -> Result<Vec<IngestOutcome>> {
        let mut outcomes = Vec::with_capacity(papers.len());
        for (paper, pages) in papers {
            outcomes.push(self.ingest(paper, &pages).await?);
        }
        Ok(outcomes)
    }

    /// Re-chunk and re-embed an existing paper, replacing its chunks atomically.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::NotFound`] if the paper does not exist. On any
    /// failure the old chunks are kept.
    pub async fn reingest(&self, paper_id: i64, pages: &[String]) -> Result<Vec<Chunk>> {
        let paper = self
            .repository
            .get_paper(paper_id)
            .await?
            .ok_or_else(|| RagError::NotFound { entity: "paper", id: paper_id.to_string() })?;

        let chunks = self.embedded_chunks(&paper.title, pages).await?;
        let stored = self.repository.replace_chunks(paper_id, &chunks).await?;
        info!(paper.id = paper_id, chunk_count = stored.len(), "re-ingested paper");
        Ok(stored)
    }

    async fn embedded_chunks(&self, title: &str, pages: &[String]) -> Result<Vec<NewChunk>> {
        let mut chunks = self.chunker.chunk_pages(pages);
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = self.embedder.embed_all(&texts).await.map_err(|e| {
            error!(title, error = %e, "embedding failed during ingestion");
            e
        })?;

        for (chunk, embedding) in chunks.iter_mut().zip(embeddings) {
            chunk.embedding = Some(embedding);
        }
        Ok(chunks)
    }
}

/// Builder for constructing an [`IngestPipeline`].
///
/// All fields are required.
#[derive(Default)]
pub struct IngestPipelineBuilder {
    chunker: Option<Arc<dyn Chunker>>,
    embedder: Option<BatchEmbedder>,
    repository: Option<Arc<dyn PaperRepository>>,
}

impl IngestPipelineBuilder {
    /// Set the chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the batching embedder.
    pub fn embedder(mut self, embedder: BatchEmbedder) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Set the paper repository.
    pub fn repository(mut self, repository: Arc<dyn PaperRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Build the [`IngestPipeline`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if any required field is missing.
    pub fn build(self) -> Result<IngestPipeline> {
        let chunker =
            self.chunker.ok_or_else(|| RagError::ConfigError("chunker is required".to_string()))?;
        let embedder =
            self.embedder.ok_or_else(|| RagError::ConfigError("embedder is required".to_string()))?;
        let repository = self
            .repository
            .ok_or_else(|| RagError::ConfigError("repository is required".to_string()))?;

        Ok(IngestPipeline { chunker, embedder, repository })
    }
}
