//! Error types for the `paper-rag` crate.

use thiserror::Error;

/// Errors that can occur while ingesting, indexing, or retrieving papers.
#[derive(Debug, Error)]
pub enum RagError {
    /// The external embedding call failed, or returned malformed vectors.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The chat model call behind a generated answer failed.
    #[error("Generation error ({provider}): {message}")]
    GenerationError {
        /// The chat provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A source document could not be read or its text extracted.
    #[error("Document error ({source_name}): {message}")]
    DocumentError {
        /// File name or other label of the document.
        source_name: String,
        /// A description of the failure.
        message: String,
    },

    /// Input rejected before any I/O took place.
    #[error("Validation error ({field}): {message}")]
    ValidationError {
        /// The offending input field.
        field: String,
        /// Why the value was rejected.
        message: String,
    },

    /// The underlying persistence layer failed.
    #[error("Store error ({backend}): {message}")]
    StoreError {
        /// The store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The ANN index is missing or could not be built.
    ///
    /// Retrieval keeps working through an exact scan when this happens.
    #[error("Index '{index}' unavailable: {message}")]
    IndexUnavailable {
        /// Name of the index.
        index: String,
        /// A description of the failure.
        message: String,
    },

    /// A referenced entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of entity, e.g. `paper`.
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl RagError {
    /// Shorthand for a [`RagError::ValidationError`].
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError { field: field.into(), message: message.into() }
    }

    /// Returns `true` when the caller, not the service, is at fault.
    ///
    /// An API layer maps these to 4xx responses.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::ValidationError { .. } | Self::NotFound { .. })
    }

    /// A short message that is safe to show to end users.
    ///
    /// Technical detail stays in [`Display`](std::fmt::Display) for the logs.
    pub fn user_message(&self) -> String {
        match self {
            Self::ValidationError { field, message } => format!("Invalid {field}: {message}"),
            Self::NotFound { entity, .. } => format!("The requested {entity} could not be found."),
            Self::EmbeddingError { .. } => {
                "Text processing failed. Please try again shortly.".to_string()
            }
            Self::DocumentError { source_name, .. } => {
                format!("The document {source_name} could not be read.")
            }
            Self::GenerationError { .. } => {
                "The answer could not be generated. Please try again shortly.".to_string()
            }
            Self::StoreError { .. } | Self::IndexUnavailable { .. } => {
                "The database is temporarily unavailable. Please try again shortly.".to_string()
            }
            Self::ConfigError(_) => {
                "The server is misconfigured. Please contact an administrator.".to_string()
            }
        }
    }
}

/// A convenience result type for `paper-rag` operations.
pub type Result<T> = std::result::Result<T, RagError>;
