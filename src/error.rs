//! # Errors
//!
//! A single error type for the whole retrieval core. Every condition a caller
//! may need to react to differently gets its own variant, so the chat layer can
//! tell "you typed nothing" apart from "the training file is broken" apart from
//! "the model never loaded".
//!
//! None of these are fatal by themselves except [`FaqError::ModelUnavailable`],
//! which the binary treats as a startup failure.

use thiserror::Error;

/// Errors produced by the knowledge store, embedder, index and engine.
#[derive(Debug, Error)]
pub enum FaqError {
    /// Empty or unusable question, answer or query text.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The knowledge source could not be read or parsed.
    ///
    /// `line` is the 1-based line in the source where parsing stopped, when known.
    #[error("malformed training data{}: {reason}", line.map(|l| format!(" at line {l}")).unwrap_or_default())]
    MalformedTrainingData { line: Option<usize>, reason: String },

    /// The sentence-embedding model could not be loaded.
    #[error("embedding model unavailable: {0}")]
    ModelUnavailable(String),

    /// A search was attempted before the index was built, or the index
    /// no longer lines up with the knowledge store.
    #[error("vector index is not ready")]
    IndexNotReady,

    /// A vector did not have the dimension the index was built with.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Inference failed for an individual text.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// Configuration value out of range or unparsable.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Index snapshot could not be encoded or decoded.
    #[error("index snapshot error: {0}")]
    Snapshot(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FaqError {
    pub(crate) fn malformed(line: Option<usize>, reason: impl Into<String>) -> Self {
        FaqError::MalformedTrainingData {
            line,
            reason: reason.into(),
        }
    }
}

impl From<candle_core::Error> for FaqError {
    fn from(e: candle_core::Error) -> Self {
        FaqError::Embedding(e.to_string())
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, FaqError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_display_includes_line() {
        let err = FaqError::malformed(Some(7), "question without an answer");
        assert_eq!(
            err.to_string(),
            "malformed training data at line 7: question without an answer"
        );

        let err = FaqError::malformed(None, "unreadable");
        assert_eq!(err.to_string(), "malformed training data: unreadable");
    }
}
