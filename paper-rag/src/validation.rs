//! Input checks applied before any query reaches the embedder or the store.
//!
//! These sit on top of parameterized queries; they do not replace them.

use crate::error::{RagError, Result};

/// Shortest accepted query, in characters, after trimming.
pub const MIN_QUERY_LEN: usize = 2;

/// Longest accepted query, in characters, after trimming.
pub const MAX_QUERY_LEN: usize = 100;

/// Longest accepted question for a generated answer, in characters.
pub const MAX_QUESTION_LEN: usize = 2000;

/// Substrings rejected outright.
const FORBIDDEN_PATTERNS: [&str; 6] = ["'", "\"", ";", "--", "/*", "*/"];

/// Trim and validate a search query, returning the trimmed text.
///
/// # Errors
///
/// Returns [`RagError::ValidationError`] if the query is blank, shorter than
/// [`MIN_QUERY_LEN`], longer than [`MAX_QUERY_LEN`], or contains quote,
/// semicolon or comment characters.
pub fn validate_search_query(query: &str) -> Result<String> {
    let query = query.trim();
    if query.is_empty() {
        return Err(RagError::validation("query", "query must not be empty"));
    }

    let len = query.chars().count();
    if len < MIN_QUERY_LEN {
        return Err(RagError::validation(
            "query",
            format!("query must be at least {MIN_QUERY_LEN} characters"),
        ));
    }
    if len > MAX_QUERY_LEN {
        return Err(RagError::validation(
            "query",
            format!("query must be at most {MAX_QUERY_LEN} characters"),
        ));
    }

    if let Some(pattern) = FORBIDDEN_PATTERNS.iter().find(|p| query.contains(*p)) {
        return Err(RagError::validation("query", format!("query contains forbidden '{pattern}'")));
    }

    Ok(query.to_string())
}

/// Trim and validate a question for a generated answer.
///
/// Questions only feed the embedder and the chat model, never a text match,
/// so they may contain quotes and punctuation.
///
/// # Errors
///
/// Returns [`RagError::ValidationError`] if the question is blank or longer
/// than [`MAX_QUESTION_LEN`].
pub fn validate_question(question: &str) -> Result<String> {
    let question = question.trim();
    if question.is_empty() {
        return Err(RagError::validation("question", "question must not be empty"));
    }
    if question.chars().count() > MAX_QUESTION_LEN {
        return Err(RagError::validation(
            "question",
            format!("question must be at most {MAX_QUESTION_LEN} characters"),
        ));
    }
    Ok(question.to_string())
}

/// Validate a result limit against the configured maximum.
pub fn validate_limit(limit: usize, max_limit: usize) -> Result<()> {
    if limit == 0 || limit > max_limit {
        return Err(RagError::validation("limit", format!("limit must be between 1 and {max_limit}")));
    }
    Ok(())
}

/// Validate hybrid search weights.
///
/// Each weight must be finite and within `[0, 1]`, and at least one must be
/// positive.
pub fn validate_weights(semantic_weight: f32, lexical_weight: f32) -> Result<()> {
    for (field, weight) in [("semantic_weight", semantic_weight), ("lexical_weight", lexical_weight)]
    {
        if !weight.is_finite() || !(0.0..=1.0).contains(&weight) {
            return Err(RagError::validation(field, "weight must be between 0.0 and 1.0"));
        }
    }
    if semantic_weight == 0.0 && lexical_weight == 0.0 {
        return Err(RagError::validation("weights", "at least one weight must be positive"));
    }
    Ok(())
}

/// Validate an optional similarity floor.
pub fn validate_threshold(threshold: Option<f32>) -> Result<()> {
    match threshold {
        Some(t) if !t.is_finite() || !(-1.0..=1.0).contains(&t) => Err(RagError::validation(
            "similarity_threshold",
            "threshold must be between -1.0 and 1.0",
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn questions_allow_quotes_but_not_blanks() {
        assert_eq!(validate_question("  What's new in GNNs?  ").unwrap(), "What's new in GNNs?");
        assert!(validate_question("   ").is_err());
        assert!(validate_question(&"q".repeat(MAX_QUESTION_LEN + 1)).is_err());
    }

    #[test]
    fn too_short_query_fails() {
        assert!(validate_search_query("a").is_err());
    }

    #[test]
    fn too_long_query_fails() {
        assert!(validate_search_query(&"x".repeat(101)).is_err());
        assert!(validate_search_query(&"x".repeat(100)).is_ok());
    }

    #[test]
    fn injection_characters_fail() {
        let err = validate_search_query("test'; DROP TABLE x; --").unwrap_err();
        assert!(matches!(err, RagError::ValidationError { .. }));
        assert!(validate_search_query("a /* b").is_err());
        assert!(validate_search_query("say \"hi\"").is_err());
    }

    #[test]
    fn query_is_trimmed() {
        assert_eq!(validate_search_query(" hi ").unwrap(), "hi");
    }

    #[test]
    fn length_counts_characters() {
        assert!(validate_search_query("딥러닝").is_ok());
        assert!(validate_search_query(&"가".repeat(100)).is_ok());
    }

    #[test]
    fn limits() {
        assert!(validate_limit(0, 50).is_err());
        assert!(validate_limit(51, 50).is_err());
        assert!(validate_limit(50, 50).is_ok());
    }

    #[test]
    fn weights() {
        assert!(validate_weights(0.7, 0.3).is_ok());
        assert!(validate_weights(1.0, 0.0).is_ok());
        assert!(validate_weights(0.0, 0.0).is_err());
        assert!(validate_weights(1.5, 0.0).is_err());
        assert!(validate_weights(f32::NAN, 0.5).is_err());
    }

    #[test]
    fn thresholds() {
        assert!(validate_threshold(None).is_ok());
        assert!(validate_threshold(Some(0.8)).is_ok());
        assert!(validate_threshold(Some(f32::INFINITY)).is_err());
    }
}
