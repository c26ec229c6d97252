//! Answers grounded in retrieved chunks.
//!
//! The [`AnswerEngine`] takes the closest chunks for a question from a
//! [`RetrievalEngine`], formats them as context and asks a [`ChatProvider`]
//! to answer from that context only.
//!
//! # Example
//!
//! ```rust,ignore
//! use paper_rag::answer::AnswerEngine;
//!
//! let answers = AnswerEngine::builder()
//!     .retrieval(engine.clone())
//!     .chat(Arc::new(chat_provider))
//!     .context_chunks(3)
//!     .build()?;
//!
//! let answer = answers
//!     .answer_streaming("How do GNNs aggregate neighbours?", &mut |delta| print!("{delta}"))
//!     .await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::document::SearchResult;
use crate::error::{RagError, Result};
use crate::retrieval::RetrievalEngine;

/// Chunks used as context when none is configured.
pub const DEFAULT_CONTEXT_CHUNKS: usize = 3;

/// Instructions sent ahead of every question.
pub const SYSTEM_PROMPT: &str = "You are a research paper assistant. Answer the user's question \
using only the context provided. If the context does not contain the answer, say so. Do not \
mention anything that is not in the context.";

/// Who wrote a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One message of a chat completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }
}

/// A chat completion model.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Complete the conversation and return the assistant's reply.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Complete the conversation, handing each piece of the reply to
    /// `on_delta` as it arrives, and return the full reply.
    ///
    /// The default implementation delivers the whole reply at once.
    async fn complete_streaming(
        &self,
        messages: &[ChatMessage],
        on_delta: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<String> {
        let reply = self.complete(messages).await?;
        on_delta(&reply);
        Ok(reply)
    }

    /// Provider name for logs and errors.
    fn name(&self) -> &str {
        "unknown"
    }
}

/// A generated answer and the chunks it was grounded on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub question: String,
    /// `None` when there were no embedded chunks to answer from; the chat
    /// model is not called in that case.
    pub answer: Option<String>,
    pub sources: Vec<SearchResult>,
}

/// Format retrieved chunks as model context, one block per chunk.
pub fn build_context(sources: &[SearchResult]) -> String {
    sources
        .iter()
        .map(|source| match source.page_number {
            Some(page) => {
                format!("Document: {} (p.{page})\nContent: {}", source.paper_title, source.chunk_text)
            }
            None => format!("Document: {}\nContent: {}", source.paper_title, source.chunk_text),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// The system prompt followed by the context and question.
pub fn build_messages(context: &str, question: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(format!("Context:\n{context}\n\nQuestion: {question}")),
    ]
}

/// Retrieval-augmented question answering. Construct one via
/// [`AnswerEngine::builder()`].
pub struct AnswerEngine {
    retrieval: Arc<RetrievalEngine>,
    chat: Arc<dyn ChatProvider>,
    context_chunks: usize,
}

impl AnswerEngine {
    pub fn builder() -> AnswerEngineBuilder {
        AnswerEngineBuilder::default()
    }

    pub fn context_chunks(&self) -> usize {
        self.context_chunks
    }

    /// Answer `question` from the closest chunks.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ValidationError`] for a blank question,
    /// [`RagError::EmbeddingError`] if it could not be embedded and
    /// [`RagError::GenerationError`] if the chat call failed.
    pub async fn answer(&self, question: &str) -> Result<Answer> {
        self.answer_streaming(question, &mut |_: &str| {}).await
    }

    /// [`answer`](Self::answer), passing reply pieces to `on_delta` as the
    /// provider produces them.
    pub async fn answer_streaming(
        &self,
        question: &str,
        on_delta: &mut (dyn FnMut(&str) + Send),
    ) -> Result<Answer> {
        let sources = self.retrieval.context_for(question, self.context_chunks).await?;
        let question = question.trim().to_string();
        if sources.is_empty() {
            info!("no context found, skipping generation");
            return Ok(Answer { question, answer: None, sources });
        }

        let messages = build_messages(&build_context(&sources), &question);
        let reply = self.chat.complete_streaming(&messages, on_delta).await.map_err(|e| {
            error!(provider = self.chat.name(), error = %e, "answer generation failed");
            e
        })?;

        info!(
            provider = self.chat.name(),
            context_chunks = sources.len(),
            answer_len = reply.len(),
            "answer generated"
        );
        Ok(Answer { question, answer: Some(reply), sources })
    }
}

/// Builder for constructing an [`AnswerEngine`].
///
/// `retrieval` and `chat` are required; `context_chunks` defaults to
/// [`DEFAULT_CONTEXT_CHUNKS`].
#[derive(Default)]
pub struct AnswerEngineBuilder {
    retrieval: Option<Arc<RetrievalEngine>>,
    chat: Option<Arc<dyn ChatProvider>>,
    context_chunks: Option<usize>,
}

impl AnswerEngineBuilder {
    /// Set the engine that supplies context chunks.
    pub fn retrieval(mut self, retrieval: Arc<RetrievalEngine>) -> Self {
        self.retrieval = Some(retrieval);
        self
    }

    /// Set the chat model.
    pub fn chat(mut self, chat: Arc<dyn ChatProvider>) -> Self {
        self.chat = Some(chat);
        self
    }

    /// Set how many chunks are sent as context.
    pub fn context_chunks(mut self, count: usize) -> Self {
        self.context_chunks = Some(count);
        self
    }

    /// Build the [`AnswerEngine`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required field is missing or
    /// `context_chunks` is zero or above the retrieval `max_limit`.
    pub fn build(self) -> Result<AnswerEngine> {
        let retrieval = self
            .retrieval
            .ok_or_else(|| RagError::ConfigError("retrieval is required".to_string()))?;
        let chat = self.chat.ok_or_else(|| RagError::ConfigError("chat is required".to_string()))?;

        let context_chunks = self.context_chunks.unwrap_or(DEFAULT_CONTEXT_CHUNKS);
        let max_limit = retrieval.config().max_limit;
        if context_chunks == 0 || context_chunks > max_limit {
            return Err(RagError::ConfigError(format!(
                "context_chunks must be between 1 and {max_limit}, got {context_chunks}"
            )));
        }

        Ok(AnswerEngine { retrieval, chat, context_chunks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(title: &str, text: &str, page: Option<i32>) -> SearchResult {
        SearchResult {
            paper_title: title.into(),
            chunk_text: text.into(),
            page_number: page,
            pdf_path: None,
            distance: Some(0.1),
        }
    }

    #[test]
    fn context_names_title_and_page() {
        let context = build_context(&[
            source("GNN Survey", "Message passing.", Some(4)),
            source("Untitled Notes", "No page here.", None),
        ]);
        assert_eq!(
            context,
            "Document: GNN Survey (p.4)\nContent: Message passing.\n\n\
             Document: Untitled Notes\nContent: No page here."
        );
    }

    #[test]
    fn messages_put_instructions_first() {
        let messages = build_messages("ctx", "why?");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, ChatRole::System);
        assert_eq!(messages[1], ChatMessage::user("Context:\nctx\n\nQuestion: why?"));
    }

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_string(&ChatMessage::system("hi")).unwrap();
        assert_eq!(json, r#"{"role":"system","content":"hi"}"#);
    }
}
