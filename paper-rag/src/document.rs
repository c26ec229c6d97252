//! Data types for papers, chunks, and search results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Longest title accepted on create or update.
pub const MAX_TITLE_LEN: usize = 500;

/// Longest abstract accepted on create or update.
pub const MAX_ABSTRACT_LEN: usize = 2000;

/// A stored academic paper.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Paper {
    /// Primary key.
    pub id: i64,
    /// Paper title.
    pub title: String,
    /// Primary author.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Publisher or journal name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    /// Publication date as published by the source (formats vary).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<String>,
    /// Original source URL. Unique across the corpus.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Local path to the downloaded PDF.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_path: Option<String>,
    /// Abstract or summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
}

/// Metadata for a paper that has not been stored yet.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NewPaper {
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub publication_date: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub pdf_path: Option<String>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
}

impl NewPaper {
    /// Create metadata with just a title.
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: title.into(), ..Default::default() }
    }

    /// Trim the title and check field bounds.
    pub fn validate(mut self) -> Result<Self> {
        self.title = validate_title(&self.title)?;
        if let Some(abstract_text) = &self.abstract_text {
            validate_abstract(abstract_text)?;
        }
        Ok(self)
    }
}

/// An explicit set of metadata corrections for an existing paper.
///
/// Only the fields listed here can change after ingest. `None` leaves a
/// field untouched; `Some(None)` on an optional field clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PaperUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_path: Option<Option<String>>,
    #[serde(default, rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<Option<String>>,
}

impl PaperUpdate {
    /// Returns `true` if the update would change nothing.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.author.is_none()
            && self.publisher.is_none()
            && self.publication_date.is_none()
            && self.url.is_none()
            && self.pdf_path.is_none()
            && self.abstract_text.is_none()
    }

    /// Normalize and bound-check the update before it reaches a store.
    pub fn validate(mut self) -> Result<Self> {
        if self.is_empty() {
            return Err(RagError::validation("update", "no fields to update"));
        }
        if let Some(title) = &self.title {
            self.title = Some(validate_title(title)?);
        }
        if let Some(Some(abstract_text)) = &self.abstract_text {
            validate_abstract(abstract_text)?;
        }
        Ok(self)
    }

    /// Apply the update to an in-memory copy of a paper.
    pub fn apply_to(&self, paper: &mut Paper) {
        if let Some(title) = &self.title {
            paper.title = title.clone();
        }
        if let Some(author) = &self.author {
            paper.author = author.clone();
        }
        if let Some(publisher) = &self.publisher {
            paper.publisher = publisher.clone();
        }
        if let Some(date) = &self.publication_date {
            paper.publication_date = date.clone();
        }
        if let Some(url) = &self.url {
            paper.url = url.clone();
        }
        if let Some(pdf_path) = &self.pdf_path {
            paper.pdf_path = pdf_path.clone();
        }
        if let Some(abstract_text) = &self.abstract_text {
            paper.abstract_text = abstract_text.clone();
        }
    }
}

fn validate_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(RagError::validation("title", "title cannot be empty"));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(RagError::validation(
            "title",
            format!("title must be at most {MAX_TITLE_LEN} characters"),
        ));
    }
    Ok(title.to_string())
}

fn validate_abstract(abstract_text: &str) -> Result<()> {
    if abstract_text.chars().count() > MAX_ABSTRACT_LEN {
        return Err(RagError::validation(
            "abstract",
            format!("abstract must be at most {MAX_ABSTRACT_LEN} characters"),
        ));
    }
    Ok(())
}

/// Filters for listing papers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaperFilter {
    /// Case-insensitive substring of the title, author, or publisher.
    pub query: Option<String>,
    /// Case-insensitive substring of the author.
    pub author: Option<String>,
    /// Case-insensitive substring of the publisher.
    pub publisher: Option<String>,
    /// Only papers that have a downloaded PDF.
    pub with_pdf: bool,
    /// Most recently created first instead of by id.
    pub newest_first: bool,
    pub skip: usize,
    pub limit: usize,
}

impl Default for PaperFilter {
    fn default() -> Self {
        Self {
            query: None,
            author: None,
            publisher: None,
            with_pdf: false,
            newest_first: false,
            skip: 0,
            limit: 10,
        }
    }
}

impl PaperFilter {
    /// Returns `true` if the paper satisfies every filter predicate.
    ///
    /// Paging (`skip`/`limit`) and ordering are not considered.
    pub fn matches(&self, paper: &Paper) -> bool {
        fn contains(haystack: Option<&str>, needle: &str) -> bool {
            haystack.is_some_and(|h| h.to_lowercase().contains(&needle.to_lowercase()))
        }

        if let Some(q) = &self.query {
            let hit = contains(Some(&paper.title), q)
                || contains(paper.author.as_deref(), q)
                || contains(paper.publisher.as_deref(), q);
            if !hit {
                return false;
            }
        }
        if let Some(author) = &self.author {
            if !contains(paper.author.as_deref(), author) {
                return false;
            }
        }
        if let Some(publisher) = &self.publisher {
            if !contains(paper.publisher.as_deref(), publisher) {
                return false;
            }
        }
        !self.with_pdf || paper.pdf_path.is_some()
    }
}

/// A stored chunk of a paper's text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Primary key.
    pub id: i64,
    /// The owning [`Paper`].
    pub paper_id: i64,
    /// The chunk text.
    pub text: String,
    /// 1-based page the chunk was taken from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<i32>,
    /// Embedding vector. `None` until embedding completes, and omitted by
    /// search queries that have no use for it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// A chunk ready to be written alongside its paper.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewChunk {
    pub text: String,
    pub page_number: Option<i32>,
    pub embedding: Option<Vec<f32>>,
}

/// A chunk returned by a store query, joined with its owning paper.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkHit {
    pub chunk: Chunk,
    pub paper: Paper,
    /// Distance to the query vector. `None` for lexical matches.
    pub distance: Option<f32>,
}

/// A single retrieval result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// Title of the source paper.
    pub paper_title: String,
    /// The matching chunk text.
    pub chunk_text: String,
    /// Page the chunk was taken from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<i32>,
    /// Path to the source PDF.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_path: Option<String>,
    /// Vector distance to the query (lower is closer). Lexical hits have none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
}

impl SearchResult {
    /// The key hybrid search deduplicates on.
    pub fn dedup_key(&self) -> (&str, &str) {
        (&self.paper_title, &self.chunk_text)
    }
}

impl From<ChunkHit> for SearchResult {
    fn from(hit: ChunkHit) -> Self {
        Self {
            paper_title: hit.paper.title,
            chunk_text: hit.chunk.text,
            page_number: hit.chunk.page_number,
            pdf_path: hit.paper.pdf_path,
            distance: hit.distance,
        }
    }
}

/// Corpus-level counts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct CorpusStats {
    pub total_papers: u64,
    pub papers_with_pdf: u64,
    pub total_chunks: u64,
    pub embedded_chunks: u64,
}

impl CorpusStats {
    /// Percentage of papers with a PDF, `0.0` for an empty corpus.
    pub fn pdf_coverage_percentage(&self) -> f64 {
        if self.total_papers == 0 {
            return 0.0;
        }
        self.papers_with_pdf as f64 / self.total_papers as f64 * 100.0
    }
}
