//! In-memory paper and vector store.
//!
//! [`InMemoryStore`] keeps papers, chunks and index definitions behind a
//! single `tokio::sync::RwLock`. It is suitable for development, tests and
//! small corpora. Nearest-neighbour queries are always answered by an exact
//! scan; index definitions are tracked so that lifecycle calls behave like
//! the PostgreSQL backend.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use rand::seq::IndexedRandom;
use tokio::sync::RwLock;

use crate::document::{
    Chunk, ChunkHit, CorpusStats, NewChunk, NewPaper, Paper, PaperFilter, PaperUpdate,
};
use crate::error::{RagError, Result};
use crate::index::{IndexSpec, IndexState};
use crate::repository::PaperRepository;
use crate::vectorstore::{NearestQuery, VectorStore};

const BACKEND: &str = "InMemory";

#[derive(Debug, Default)]
struct State {
    papers: BTreeMap<i64, Paper>,
    chunks: BTreeMap<i64, Chunk>,
    indexes: HashMap<String, IndexSpec>,
    next_paper_id: i64,
    next_chunk_id: i64,
}

impl State {
    fn url_taken(&self, url: &str, except: Option<i64>) -> bool {
        self.papers.values().any(|p| Some(p.id) != except && p.url.as_deref() == Some(url))
    }

    fn push_chunks(&mut self, paper_id: i64, chunks: &[NewChunk]) -> Vec<Chunk> {
        chunks
            .iter()
            .map(|new| {
                self.next_chunk_id += 1;
                let chunk = Chunk {
                    id: self.next_chunk_id,
                    paper_id,
                    text: new.text.clone(),
                    page_number: new.page_number,
                    embedding: new.embedding.clone(),
                };
                self.chunks.insert(chunk.id, chunk.clone());
                chunk
            })
            .collect()
    }

    fn hit(&self, chunk: &Chunk, distance: Option<f32>) -> Option<ChunkHit> {
        let paper = self.papers.get(&chunk.paper_id)?.clone();
        Some(ChunkHit { chunk: Chunk { embedding: None, ..chunk.clone() }, paper, distance })
    }

    fn ranked(&self, query: &NearestQuery<'_>) -> Vec<(f32, &Chunk)> {
        let mut scored: Vec<(f32, &Chunk)> = self
            .chunks
            .values()
            .filter_map(|chunk| {
                let embedding = chunk.embedding.as_deref()?;
                Some((query.metric.distance(embedding, query.embedding), chunk))
            })
            .collect();
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal).then(a.1.id.cmp(&b.1.id)));
        scored.truncate(query.limit);
        scored
    }
}

/// An in-memory implementation of [`PaperRepository`] and [`VectorStore`].
///
/// # Example
///
/// ```rust
/// use paper_rag::InMemoryStore;
///
/// let store = InMemoryStore::new(1536);
/// assert_eq!(store.dimensions(), 1536);
/// ```
#[derive(Debug)]
pub struct InMemoryStore {
    dimensions: usize,
    state: RwLock<State>,
}

impl InMemoryStore {
    /// Create an empty store that accepts embeddings of `dimensions` floats.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions, state: RwLock::new(State::default()) }
    }

    /// The embedding dimensionality enforced on writes.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn check_chunks(&self, chunks: &[NewChunk]) -> Result<()> {
        for chunk in chunks {
            if let Some(embedding) = &chunk.embedding {
                if embedding.len() != self.dimensions {
                    return Err(store_error(format!(
                        "expected {} dimensions, not {}",
                        self.dimensions,
                        embedding.len()
                    )));
                }
            }
        }
        Ok(())
    }
}

fn store_error(message: impl Into<String>) -> RagError {
    RagError::StoreError { backend: BACKEND.to_string(), message: message.into() }
}

fn paper_not_found(id: i64) -> RagError {
    RagError::NotFound { entity: "paper", id: id.to_string() }
}

#[async_trait]
impl PaperRepository for InMemoryStore {
    async fn insert_paper(
        &self,
        paper: &NewPaper,
        chunks: &[NewChunk],
    ) -> Result<(Paper, Vec<Chunk>)> {
        self.check_chunks(chunks)?;
        let mut state = self.state.write().await;
        if let Some(url) = &paper.url {
            if state.url_taken(url, None) {
                return Err(store_error(format!("duplicate url '{url}'")));
            }
        }

        state.next_paper_id += 1;
        let stored = Paper {
            id: state.next_paper_id,
            title: paper.title.clone(),
            author: paper.author.clone(),
            publisher: paper.publisher.clone(),
            publication_date: paper.publication_date.clone(),
            url: paper.url.clone(),
            pdf_path: paper.pdf_path.clone(),
            abstract_text: paper.abstract_text.clone(),
            created_at: Utc::now(),
        };
        state.papers.insert(stored.id, stored.clone());
        let chunks = state.push_chunks(stored.id, chunks);
        Ok((stored, chunks))
    }

    async fn replace_chunks(&self, paper_id: i64, chunks: &[NewChunk]) -> Result<Vec<Chunk>> {
        self.check_chunks(chunks)?;
        let mut state = self.state.write().await;
        if !state.papers.contains_key(&paper_id) {
            return Err(paper_not_found(paper_id));
        }
        state.chunks.retain(|_, c| c.paper_id != paper_id);
        Ok(state.push_chunks(paper_id, chunks))
    }

    async fn get_paper(&self, id: i64) -> Result<Option<Paper>> {
        Ok(self.state.read().await.papers.get(&id).cloned())
    }

    async fn find_paper_by_title(&self, title: &str) -> Result<Option<Paper>> {
        let state = self.state.read().await;
        Ok(state.papers.values().find(|p| p.title == title).cloned())
    }

    async fn list_papers(&self, filter: &PaperFilter) -> Result<Vec<Paper>> {
        let state = self.state.read().await;
        let mut papers: Vec<&Paper> = state.papers.values().filter(|p| filter.matches(p)).collect();
        if filter.newest_first {
            papers.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        }
        Ok(papers.into_iter().skip(filter.skip).take(filter.limit).cloned().collect())
    }

    async fn update_paper(&self, id: i64, update: &PaperUpdate) -> Result<Paper> {
        let mut state = self.state.write().await;
        if let Some(Some(url)) = &update.url {
            if state.url_taken(url, Some(id)) {
                return Err(store_error(format!("duplicate url '{url}'")));
            }
        }
        let paper = state.papers.get_mut(&id).ok_or_else(|| paper_not_found(id))?;
        update.apply_to(paper);
        Ok(paper.clone())
    }

    async fn delete_paper(&self, id: i64) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.papers.remove(&id).is_none() {
            return Ok(false);
        }
        state.chunks.retain(|_, c| c.paper_id != id);
        Ok(true)
    }

    async fn chunks_for_paper(&self, paper_id: i64) -> Result<Vec<Chunk>> {
        let state = self.state.read().await;
        let mut chunks: Vec<Chunk> =
            state.chunks.values().filter(|c| c.paper_id == paper_id).cloned().collect();
        chunks.sort_by_key(|c| (c.page_number, c.id));
        Ok(chunks)
    }

    async fn search_chunk_text(&self, needle: &str, limit: usize) -> Result<Vec<ChunkHit>> {
        let needle = needle.to_lowercase();
        let state = self.state.read().await;
        Ok(state
            .chunks
            .values()
            .filter(|c| c.text.to_lowercase().contains(&needle))
            .filter_map(|c| state.hit(c, None))
            .take(limit)
            .collect())
    }

    async fn stats(&self) -> Result<CorpusStats> {
        let state = self.state.read().await;
        Ok(CorpusStats {
            total_papers: state.papers.len() as u64,
            papers_with_pdf: state.papers.values().filter(|p| p.pdf_path.is_some()).count() as u64,
            total_chunks: state.chunks.len() as u64,
            embedded_chunks: state.chunks.values().filter(|c| c.embedding.is_some()).count()
                as u64,
        })
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn create_index(&self, spec: &IndexSpec) -> Result<()> {
        let mut state = self.state.write().await;
        state.indexes.entry(spec.name.clone()).or_insert_with(|| spec.clone());
        Ok(())
    }

    async fn index_state(&self, name: &str) -> Result<IndexState> {
        let state = self.state.read().await;
        Ok(if state.indexes.contains_key(name) { IndexState::Ready } else { IndexState::Missing })
    }

    async fn drop_index(&self, name: &str) -> Result<()> {
        self.state.write().await.indexes.remove(name);
        Ok(())
    }

    async fn swap_index(&self, live: &str, staged: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let mut spec = state
            .indexes
            .remove(staged)
            .ok_or_else(|| store_error(format!("staged index '{staged}' does not exist")))?;
        spec.name = live.to_string();
        state.indexes.insert(live.to_string(), spec);
        Ok(())
    }

    async fn index_size_bytes(&self, name: &str) -> Result<u64> {
        let state = self.state.read().await;
        let Some(spec) = state.indexes.get(name) else {
            return Ok(0);
        };
        // Vector payload plus two neighbour lists of `m` 8-byte tuple ids per node.
        let per_node = self.dimensions * 4 + 2 * spec.params.m as usize * 8;
        let nodes = state.chunks.values().filter(|c| c.embedding.is_some()).count();
        Ok((nodes * per_node) as u64)
    }

    async fn nearest(&self, query: &NearestQuery<'_>) -> Result<Vec<ChunkHit>> {
        let state = self.state.read().await;
        Ok(state
            .ranked(query)
            .into_iter()
            .filter_map(|(distance, chunk)| state.hit(chunk, Some(distance)))
            .collect())
    }

    async fn nearest_ids(&self, query: &NearestQuery<'_>) -> Result<Vec<i64>> {
        let state = self.state.read().await;
        Ok(state.ranked(query).into_iter().map(|(_, chunk)| chunk.id).collect())
    }

    async fn sample_embeddings(&self, count: usize) -> Result<Vec<(i64, Vec<f32>)>> {
        let state = self.state.read().await;
        let embedded: Vec<(i64, &Vec<f32>)> = state
            .chunks
            .values()
            .filter_map(|c| c.embedding.as_ref().map(|e| (c.id, e)))
            .collect();
        let sample = embedded
            .choose_multiple(&mut rand::rng(), count)
            .map(|(id, embedding)| (*id, (*embedding).clone()))
            .collect();
        Ok(sample)
    }
}
