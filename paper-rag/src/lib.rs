//! # paper-rag
//!
//! Chunking, embedding and HNSW-backed retrieval over an academic paper corpus.
//!
//! ## Overview
//!
//! - [`ParagraphChunker`] splits extracted text into paragraph- and
//!   sentence-aligned chunks.
//! - [`BatchEmbedder`] turns chunks and queries into vectors through an
//!   [`EmbeddingProvider`].
//! - [`VectorIndexManager`] owns the lifecycle of the HNSW index.
//! - [`RetrievalEngine`] answers semantic, text and hybrid queries.
//! - [`ParameterTuner`] measures HNSW settings against exact search.
//! - [`IngestPipeline`] ties chunking, embedding and storage together.
//! - [`AnswerEngine`] answers questions from retrieved chunks through a
//!   [`ChatProvider`].
//!
//! Storage sits behind the [`PaperRepository`] and [`VectorStore`] traits.
//! [`InMemoryStore`] implements both for tests and local runs; with the
//! `pgvector` feature, [`pgvector::PgStore`] implements them on PostgreSQL.
//!
//! ## Features
//!
//! - `openai`: [`openai::OpenAIEmbeddingProvider`] and [`openai::OpenAIChatProvider`]
//! - `pgvector`: [`pgvector::PgStore`]
//! - `pdf`: [`pdf::extract_pdf_pages`]
//! - `full`: all of the above
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use paper_rag::*;
//!
//! let config = RagConfig::default();
//! let store = Arc::new(InMemoryStore::new(1536));
//! let embedder = BatchEmbedder::new(provider, config.embedding_batch_size);
//! let index = Arc::new(VectorIndexManager::new(store.clone(), config.index_spec()?, config.ef_search)?);
//!
//! let engine = RetrievalEngine::builder()
//!     .config(config)
//!     .repository(store.clone())
//!     .index_manager(index)
//!     .embedder(embedder)
//!     .build()?;
//! let results = engine.semantic_search("graph neural networks", 5, None).await?;
//! ```

pub mod answer;
pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod index;
pub mod inmemory;
pub mod pipeline;
pub mod repository;
pub mod retrieval;
pub mod tuning;
pub mod validation;
pub mod vectorstore;

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "pdf")]
pub mod pdf;

#[cfg(feature = "pgvector")]
pub mod pgvector;

pub use answer::{
    Answer, AnswerEngine, AnswerEngineBuilder, ChatMessage, ChatProvider, ChatRole,
};
pub use chunking::{Chunker, ParagraphChunker, split_pages, split_text_into_chunks};
pub use config::{RagConfig, RagConfigBuilder};
pub use document::{
    Chunk, ChunkHit, CorpusStats, NewChunk, NewPaper, Paper, PaperFilter, PaperUpdate,
    SearchResult,
};
pub use embedding::{BatchEmbedder, EmbeddingProvider};
pub use error::{RagError, Result};
pub use index::{
    DistanceMetric, HnswParams, IndexSpec, IndexState, ScanMode, VectorIndexManager,
};
pub use inmemory::InMemoryStore;
pub use pipeline::{IngestOutcome, IngestPipeline, IngestPipelineBuilder};
pub use repository::PaperRepository;
pub use retrieval::{RetrievalEngine, RetrievalEngineBuilder, fuse_results};
pub use tuning::{
    ParameterTuner, Recommendation, TuningConfig, TuningParams, TuningReport, TuningRun,
};
pub use validation::{validate_question, validate_search_query};
pub use vectorstore::{NearestQuery, VectorStore};
