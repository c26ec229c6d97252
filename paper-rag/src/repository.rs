//! Relational storage for papers and their chunks.

use async_trait::async_trait;

use crate::document::{
    Chunk, ChunkHit, CorpusStats, NewChunk, NewPaper, Paper, PaperFilter, PaperUpdate,
};
use crate::error::Result;

/// Persistence for papers and chunks.
///
/// Writes that touch several rows run in a single transaction: either every
/// row lands or none does.
#[async_trait]
pub trait PaperRepository: Send + Sync {
    /// Insert a paper together with its chunks.
    async fn insert_paper(
        &self,
        paper: &NewPaper,
        chunks: &[NewChunk],
    ) -> Result<(Paper, Vec<Chunk>)>;

    /// Replace every chunk of a paper with `chunks`.
    ///
    /// Returns [`RagError::NotFound`](crate::RagError::NotFound) if the paper does not exist.
    async fn replace_chunks(&self, paper_id: i64, chunks: &[NewChunk]) -> Result<Vec<Chunk>>;

    /// Look a paper up by id.
    async fn get_paper(&self, id: i64) -> Result<Option<Paper>>;

    /// Look a paper up by exact title.
    async fn find_paper_by_title(&self, title: &str) -> Result<Option<Paper>>;

    /// List papers matching a filter.
    async fn list_papers(&self, filter: &PaperFilter) -> Result<Vec<Paper>>;

    /// Apply a validated metadata update.
    ///
    /// Returns [`RagError::NotFound`](crate::RagError::NotFound) if the paper does not exist.
    async fn update_paper(&self, id: i64, update: &PaperUpdate) -> Result<Paper>;

    /// Delete a paper and, by cascade, its chunks. Returns `false` if it did not exist.
    async fn delete_paper(&self, id: i64) -> Result<bool>;

    /// Chunks of one paper ordered by page, then id.
    async fn chunks_for_paper(&self, paper_id: i64) -> Result<Vec<Chunk>>;

    /// Case-insensitive substring match over chunk text, ordered by chunk id.
    async fn search_chunk_text(&self, needle: &str, limit: usize) -> Result<Vec<ChunkHit>>;

    /// Corpus-level counts.
    async fn stats(&self) -> Result<CorpusStats>;
}
