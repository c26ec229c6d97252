//! Paragraph-then-sentence text chunking.
//!
//! Text is split on paragraph boundaries first. Paragraphs longer than the
//! chunk budget are split at sentence boundaries and re-packed greedily, so a
//! chunk never ends mid-sentence. A single sentence longer than the budget is
//! kept whole rather than truncated.
//!
//! Sizes are measured in characters, not bytes.

use crate::document::NewChunk;

/// Separator between paragraphs.
const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// Sentence terminator used to split oversized paragraphs.
const SENTENCE_SEPARATOR: &str = ". ";

/// Page break emitted by most PDF text extractors.
const PAGE_BREAK: char = '\u{000C}';

/// A strategy for splitting document text into chunks.
pub trait Chunker: Send + Sync {
    /// Split text into ordered, non-empty chunks.
    ///
    /// Returns an empty `Vec` for empty or whitespace-only text.
    fn chunk(&self, text: &str) -> Vec<String>;

    /// Chunk each page separately, recording 1-based page numbers.
    ///
    /// The returned chunks carry no embeddings yet.
    fn chunk_pages(&self, pages: &[String]) -> Vec<NewChunk> {
        pages
            .iter()
            .enumerate()
            .flat_map(|(index, page)| {
                let page_number = i32::try_from(index + 1).ok();
                self.chunk(page).into_iter().map(move |text| NewChunk {
                    text,
                    page_number,
                    embedding: None,
                })
            })
            .collect()
    }
}

/// Splits text by paragraphs, then by sentences for paragraphs over budget.
///
/// # Example
///
/// ```rust
/// use paper_rag::{Chunker, ParagraphChunker};
///
/// let chunker = ParagraphChunker::new(500);
/// let chunks = chunker.chunk("First paragraph.\n\nSecond paragraph.");
/// assert_eq!(chunks.len(), 1);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ParagraphChunker {
    chunk_size: usize,
}

impl ParagraphChunker {
    /// Create a chunker with the given budget in characters.
    pub fn new(chunk_size: usize) -> Self {
        Self { chunk_size }
    }

    /// The configured budget in characters.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

impl Chunker for ParagraphChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        split_text_into_chunks(text, self.chunk_size)
    }
}

/// Split `text` into chunks of at most `chunk_size` characters.
///
/// Text that already fits is returned trimmed as a single chunk.
pub fn split_text_into_chunks(text: &str, chunk_size: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    if char_len(text) <= chunk_size {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    for paragraph in text.split(PARAGRAPH_SEPARATOR) {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        if char_len(paragraph) <= chunk_size {
            chunks.push(paragraph.to_string());
        } else {
            pack_sentences(paragraph, chunk_size, &mut chunks);
        }
    }
    chunks
}

/// Split extracted document text into pages on form-feed characters.
///
/// Text without page breaks is a single page. Trailing empty pages are
/// dropped, but empty pages in the middle are kept so numbering stays true
/// to the source.
pub fn split_pages(text: &str) -> Vec<String> {
    let mut pages: Vec<String> = text.split(PAGE_BREAK).map(str::to_string).collect();
    while pages.last().is_some_and(|p| p.trim().is_empty()) {
        pages.pop();
    }
    pages
}

/// Greedily pack sentences into chunks that respect `chunk_size`.
fn pack_sentences(paragraph: &str, chunk_size: usize, chunks: &mut Vec<String>) {
    let mut current = String::new();
    let mut current_len = 0;

    for sentence in split_keeping_separator(paragraph, SENTENCE_SEPARATOR) {
        let sentence_len = char_len(sentence);
        if current_len > 0 && current_len + sentence_len > chunk_size {
            push_trimmed(chunks, &current);
            current.clear();
            current_len = 0;
        }
        current.push_str(sentence);
        current_len += sentence_len;
    }

    push_trimmed(chunks, &current);
}

/// Split text at a separator while keeping the separator attached to the preceding segment.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut result = Vec::new();
    let mut start = 0;

    while let Some(pos) = text[start..].find(separator) {
        let end = start + pos + separator.len();
        result.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        result.push(&text[start..]);
    }

    result
}

fn push_trimmed(chunks: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
