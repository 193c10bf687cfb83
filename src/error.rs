//! Custom error types for semcode
//!
//! Uses thiserror for ergonomic error definitions. Every variant maps to a
//! stable kind tag so callers can switch on [`ErrorKind`] instead of matching
//! variants directly.

use thiserror::Error;

/// Application-specific errors for semcode
#[derive(Error, Debug)]
pub enum SemcodeError {
    /// IO operations failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Embedding model failed to download or initialize
    #[error("model load failed: {0}")]
    ModelLoad(String),

    /// Embedding generation failed for a query or document batch
    #[error("embedding generation failed: {0}")]
    EmbeddingGeneration(String),

    /// A path resolved outside the configured root
    #[error("path escapes the indexed root: {0}")]
    PathTraversal(String),

    /// A user-supplied filter pattern failed validation
    #[error("invalid filter pattern: {0}")]
    InvalidFilter(String),

    /// A record id failed validation
    #[error("invalid record id: {0}")]
    InvalidId(String),

    /// Vector store operations failed
    #[error("store error: {0}")]
    Store(String),

    /// The store was closed; no further operations are accepted
    #[error("store is closed")]
    StoreClosed,

    /// Chunking failed for a single file (non-fatal during scans)
    #[error("chunker error in {file}: {message}")]
    Chunker { file: String, message: String },

    /// Serialization/deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// JSON parsing failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File watcher errors
    #[error("watch error: {0}")]
    Watch(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),
}

/// Stable error-kind tags surfaced to tool clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ModelLoadFailure,
    EmbeddingGenerationFailure,
    PathTraversal,
    InvalidFilter,
    InvalidId,
    StoreFailure,
    StoreClosed,
    ChunkerFailure,
    WatchFailure,
    ConfigFailure,
    IoFailure,
    SerializationFailure,
}

impl ErrorKind {
    /// Wire representation of the kind tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModelLoadFailure => "model-load-failure",
            Self::EmbeddingGenerationFailure => "embedding-generation-failure",
            Self::PathTraversal => "path-traversal",
            Self::InvalidFilter => "invalid-filter",
            Self::InvalidId => "invalid-id",
            Self::StoreFailure => "store-failure",
            Self::StoreClosed => "store-closed",
            Self::ChunkerFailure => "chunker-failure",
            Self::WatchFailure => "watch-failure",
            Self::ConfigFailure => "config-failure",
            Self::IoFailure => "io-failure",
            Self::SerializationFailure => "serialization-failure",
        }
    }
}

impl SemcodeError {
    /// The stable kind tag for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::IoFailure,
            Self::ModelLoad(_) => ErrorKind::ModelLoadFailure,
            Self::EmbeddingGeneration(_) => ErrorKind::EmbeddingGenerationFailure,
            Self::PathTraversal(_) => ErrorKind::PathTraversal,
            Self::InvalidFilter(_) => ErrorKind::InvalidFilter,
            Self::InvalidId(_) => ErrorKind::InvalidId,
            Self::Store(_) => ErrorKind::StoreFailure,
            Self::StoreClosed => ErrorKind::StoreClosed,
            Self::Chunker { .. } => ErrorKind::ChunkerFailure,
            Self::Serialization(_) => ErrorKind::SerializationFailure,
            Self::Json(_) => ErrorKind::SerializationFailure,
            Self::Watch(_) => ErrorKind::WatchFailure,
            Self::Config(_) => ErrorKind::ConfigFailure,
        }
    }

    /// True for any failure of the embedding layer (model load or generation).
    ///
    /// The retrieval pipeline uses this to decide whether keyword fallback
    /// applies.
    pub fn is_embedder_failure(&self) -> bool {
        matches!(self, Self::ModelLoad(_) | Self::EmbeddingGeneration(_))
    }

    /// True for security failures. These are always fatal to the enclosing
    /// request and never degrade silently.
    pub fn is_security_failure(&self) -> bool {
        matches!(
            self,
            Self::PathTraversal(_) | Self::InvalidFilter(_) | Self::InvalidId(_)
        )
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, SemcodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags_are_stable() {
        assert_eq!(
            SemcodeError::ModelLoad("x".into()).kind().as_str(),
            "model-load-failure"
        );
        assert_eq!(
            SemcodeError::InvalidFilter("x".into()).kind().as_str(),
            "invalid-filter"
        );
        assert_eq!(SemcodeError::StoreClosed.kind().as_str(), "store-closed");
    }

    #[test]
    fn embedder_failure_parent_covers_both_kinds() {
        assert!(SemcodeError::ModelLoad("x".into()).is_embedder_failure());
        assert!(SemcodeError::EmbeddingGeneration("x".into()).is_embedder_failure());
        assert!(!SemcodeError::StoreClosed.is_embedder_failure());
    }

    #[test]
    fn security_failure_parent_covers_all_specializations() {
        assert!(SemcodeError::PathTraversal("x".into()).is_security_failure());
        assert!(SemcodeError::InvalidFilter("x".into()).is_security_failure());
        assert!(SemcodeError::InvalidId("x".into()).is_security_failure());
        assert!(!SemcodeError::Watch("x".into()).is_security_failure());
    }
}
