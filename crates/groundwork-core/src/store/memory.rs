//! In-memory [`IndexStore`] implementation for tests and embedding in
//! other processes.
//!
//! Staging generations live in a `HashMap` until promoted; a live
//! generation is an `Arc<Vec<IndexRecord>>` swapped in under a write lock,
//! so readers holding an older snapshot keep a complete view.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{CollectionInfo, IndexRecord};

use super::{GenerationMeta, IndexStore, Snapshot};

struct Live {
    info: CollectionInfo,
    records: Arc<Vec<IndexRecord>>,
}

/// In-memory index store.
#[derive(Default)]
pub struct InMemoryStore {
    staging: RwLock<HashMap<String, Vec<IndexRecord>>>,
    live: RwLock<HashMap<String, Live>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of staging generations not yet promoted or discarded.
    pub fn pending_generations(&self) -> usize {
        self.staging.read().map(|s| s.len()).unwrap_or(0)
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

#[async_trait]
impl IndexStore for InMemoryStore {
    async fn begin_generation(&self) -> Result<String> {
        let generation = Uuid::new_v4().to_string();
        write(&self.staging)?.insert(generation.clone(), Vec::new());
        Ok(generation)
    }

    async fn write_records(&self, generation: &str, records: &[IndexRecord]) -> Result<()> {
        let mut staging = write(&self.staging)?;
        let pending = staging
            .get_mut(generation)
            .ok_or_else(|| anyhow!("unknown staging generation: {}", generation))?;
        pending.extend_from_slice(records);
        Ok(())
    }

    async fn promote(
        &self,
        collection: &str,
        generation: &str,
        meta: &GenerationMeta,
    ) -> Result<Option<String>> {
        let records = match write(&self.staging)?.remove(generation) {
            Some(r) => r,
            None => bail!("unknown staging generation: {}", generation),
        };

        let info = CollectionInfo {
            name: collection.to_string(),
            generation: generation.to_string(),
            model: meta.model.clone(),
            dims: meta.dims,
            record_count: records.len(),
            created_at: chrono::Utc::now().timestamp(),
        };

        let previous = write(&self.live)?.insert(
            collection.to_string(),
            Live {
                info,
                records: Arc::new(records),
            },
        );
        Ok(previous.map(|p| p.info.generation))
    }

    async fn discard_generation(&self, generation: &str) -> Result<()> {
        write(&self.staging)?.remove(generation);
        Ok(())
    }

    async fn drop_collection(&self, collection: &str) -> Result<bool> {
        Ok(write(&self.live)?.remove(collection).is_some())
    }

    async fn collection_info(&self, collection: &str) -> Result<Option<CollectionInfo>> {
        Ok(read(&self.live)?.get(collection).map(|l| l.info.clone()))
    }

    async fn snapshot(&self, collection: &str) -> Result<Option<Snapshot>> {
        Ok(read(&self.live)?.get(collection).map(|l| Snapshot {
            info: l.info.clone(),
            records: Arc::clone(&l.records),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> IndexRecord {
        IndexRecord {
            id: id.to_string(),
            content: format!("content of {}", id),
            source: "a.txt".to_string(),
            hash: String::new(),
            embedding: vec![1.0, 0.0],
        }
    }

    fn meta() -> GenerationMeta {
        GenerationMeta {
            model: "test".to_string(),
            dims: 2,
        }
    }

    #[tokio::test]
    async fn test_staged_records_invisible_until_promoted() {
        let store = InMemoryStore::new();
        let generation = store.begin_generation().await.unwrap();
        store
            .write_records(&generation, &[record("a-0")])
            .await
            .unwrap();
        assert!(store.snapshot("kb").await.unwrap().is_none());

        let replaced = store.promote("kb", &generation, &meta()).await.unwrap();
        assert!(replaced.is_none());
        let snap = store.snapshot("kb").await.unwrap().unwrap();
        assert_eq!(snap.records.len(), 1);
        assert_eq!(snap.info.record_count, 1);
        assert_eq!(store.pending_generations(), 0);
    }

    #[tokio::test]
    async fn test_old_snapshot_survives_promotion() {
        let store = InMemoryStore::new();
        let g1 = store.begin_generation().await.unwrap();
        store.write_records(&g1, &[record("a-0")]).await.unwrap();
        store.promote("kb", &g1, &meta()).await.unwrap();
        let old = store.snapshot("kb").await.unwrap().unwrap();

        let g2 = store.begin_generation().await.unwrap();
        store
            .write_records(&g2, &[record("b-0"), record("b-1")])
            .await
            .unwrap();
        let replaced = store.promote("kb", &g2, &meta()).await.unwrap();
        assert_eq!(replaced.as_deref(), Some(g1.as_str()));

        assert_eq!(old.records.len(), 1);
        let new = store.snapshot("kb").await.unwrap().unwrap();
        assert_eq!(new.records.len(), 2);
    }

    #[tokio::test]
    async fn test_discard_and_drop() {
        let store = InMemoryStore::new();
        let g = store.begin_generation().await.unwrap();
        store.discard_generation(&g).await.unwrap();
        assert!(store.promote("kb", &g, &meta()).await.is_err());
        assert!(!store.drop_collection("kb").await.unwrap());
    }
}
