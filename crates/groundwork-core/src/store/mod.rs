//! Storage abstraction for the vector index.
//!
//! An [`IndexStore`] keeps named collections, each pointing at one *live
//! generation* of records. A rebuild writes a new generation that no reader
//! can see, then [`promote`](IndexStore::promote)s it: the collection is
//! repointed and the previous generation deleted in one atomic step. Readers
//! therefore always see either the whole old generation or the whole new one.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`begin_generation`](IndexStore::begin_generation) | Allocate an invisible staging generation |
//! | [`write_records`](IndexStore::write_records) | Append records to a staging generation |
//! | [`promote`](IndexStore::promote) | Atomically make a generation live for a collection |
//! | [`discard_generation`](IndexStore::discard_generation) | Delete an unpromoted generation |
//! | [`drop_collection`](IndexStore::drop_collection) | Delete a collection and its live records |
//! | [`collection_info`](IndexStore::collection_info) | Live generation metadata |
//! | [`snapshot`](IndexStore::snapshot) | Consistent read of the live generation |

pub mod memory;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{CollectionInfo, IndexRecord};

/// Embedding metadata recorded with a promoted generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationMeta {
    pub model: String,
    pub dims: usize,
}

/// A consistent view of a collection's live generation.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub info: CollectionInfo,
    pub records: Arc<Vec<IndexRecord>>,
}

/// Abstract storage backend for collections of embedded chunks.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Allocate a fresh staging generation and return its id.
    async fn begin_generation(&self) -> Result<String>;

    /// Append records to a staging generation.
    async fn write_records(&self, generation: &str, records: &[IndexRecord]) -> Result<()>;

    /// Point `collection` at `generation` and delete the generation it
    /// replaces, atomically. Returns the replaced generation id, if any.
    async fn promote(
        &self,
        collection: &str,
        generation: &str,
        meta: &GenerationMeta,
    ) -> Result<Option<String>>;

    /// Delete a staging generation that will never be promoted.
    async fn discard_generation(&self, generation: &str) -> Result<()>;

    /// Delete a collection. Returns `false` if it did not exist.
    async fn drop_collection(&self, collection: &str) -> Result<bool>;

    /// Metadata of the live generation, or `None` if the collection does not exist.
    async fn collection_info(&self, collection: &str) -> Result<Option<CollectionInfo>>;

    /// Metadata and records of the live generation, read consistently.
    async fn snapshot(&self, collection: &str) -> Result<Option<Snapshot>>;
}

#[async_trait]
impl<T: IndexStore + ?Sized> IndexStore for Arc<T> {
    async fn begin_generation(&self) -> Result<String> {
        (**self).begin_generation().await
    }

    async fn write_records(&self, generation: &str, records: &[IndexRecord]) -> Result<()> {
        (**self).write_records(generation, records).await
    }

    async fn promote(
        &self,
        collection: &str,
        generation: &str,
        meta: &GenerationMeta,
    ) -> Result<Option<String>> {
        (**self).promote(collection, generation, meta).await
    }

    async fn discard_generation(&self, generation: &str) -> Result<()> {
        (**self).discard_generation(generation).await
    }

    async fn drop_collection(&self, collection: &str) -> Result<bool> {
        (**self).drop_collection(collection).await
    }

    async fn collection_info(&self, collection: &str) -> Result<Option<CollectionInfo>> {
        (**self).collection_info(collection).await
    }

    async fn snapshot(&self, collection: &str) -> Result<Option<Snapshot>> {
        (**self).snapshot(collection).await
    }
}
