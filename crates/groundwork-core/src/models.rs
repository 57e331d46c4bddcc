//! Core data models shared by ingestion and retrieval.

use serde::Serialize;

/// A chunk of a document's text, ready to be embedded and indexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Deterministic id: `"{source}-{index}"`.
    pub id: String,
    /// Trimmed, non-empty window text.
    pub content: String,
    /// Originating document name.
    pub source: String,
    /// SHA-256 hex digest of `content`.
    pub hash: String,
}

/// A record as handed to an [`IndexStore`](crate::store::IndexStore):
/// a chunk plus its embedding vector.
#[derive(Debug, Clone)]
pub struct IndexRecord {
    pub id: String,
    pub content: String,
    pub source: String,
    pub hash: String,
    pub embedding: Vec<f32>,
}

/// A retrieved passage at the retrieval boundary.
///
/// This is the only shape consumers see; backend rows never leak past
/// [`VectorIndex::query`](crate::index::VectorIndex::query).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Retrieved {
    pub content: String,
    pub source: String,
}

/// A retrieved passage with its id and cosine similarity, for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub id: String,
    pub content: String,
    pub source: String,
    pub score: f32,
}

impl From<ScoredChunk> for Retrieved {
    fn from(s: ScoredChunk) -> Self {
        Retrieved {
            content: s.content,
            source: s.source,
        }
    }
}

/// Metadata about the live generation of a collection.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionInfo {
    pub name: String,
    /// Opaque id of the live generation.
    pub generation: String,
    /// Embedding model the collection was built with.
    pub model: String,
    /// Embedding dimensionality the collection was built with.
    pub dims: usize,
    pub record_count: usize,
    /// Unix timestamp (seconds) of the rebuild that produced this generation.
    pub created_at: i64,
}
