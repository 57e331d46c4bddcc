//! Error types for chunking, embedding, and index operations.
//!
//! Embedding failures are kept distinct from "no results": a query against
//! a missing collection returns an empty list, while an unreachable embedder
//! surfaces as [`IndexError::Embedding`].

use thiserror::Error;

/// Invalid chunker configuration.
#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("max_chars must be > 0")]
    ZeroWindow,

    #[error("overlap ({overlap}) must be smaller than max_chars ({max_chars})")]
    OverlapTooLarge { max_chars: usize, overlap: usize },
}

/// Failure reported by an [`Embedder`](crate::embedding::Embedder).
#[derive(Debug, Error)]
pub enum EmbedError {
    /// The embedding backend could not be reached or kept failing after retries.
    #[error("embedding service unavailable: {0}")]
    Unavailable(String),

    /// The backend did not answer within the configured timeout.
    #[error("embedding request timed out after {0}s")]
    Timeout(u64),

    /// The backend answered with a non-retryable error.
    #[error("embedding request rejected: {0}")]
    Rejected(String),

    /// The backend answered, but not with what we asked for.
    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding model error: {0}")]
    Model(String),
}

/// Errors surfaced by [`VectorIndex`](crate::index::VectorIndex).
#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Embedding(#[from] EmbedError),

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(
        "collection '{collection}' was built with model '{built_with}' ({built_dims} dims), \
         but the current embedder is '{current}' ({current_dims} dims); re-run ingestion"
    )]
    ModelMismatch {
        collection: String,
        built_with: String,
        built_dims: usize,
        current: String,
        current_dims: usize,
    },

    #[error("duplicate chunk id in rebuild: {0}")]
    DuplicateId(String),

    #[error("k must be >= 1")]
    InvalidK,

    #[error("store error: {0:#}")]
    Store(anyhow::Error),
}

impl IndexError {
    /// True when the failure came from the embedding backend rather than
    /// the index itself.
    pub fn is_embedding(&self) -> bool {
        matches!(self, IndexError::Embedding(_))
    }
}
