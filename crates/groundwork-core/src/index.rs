//! The vector index: full-rebuild ingestion and k-nearest-neighbor query
//! over one [`IndexStore`], with one shared [`Embedder`].
//!
//! # Rebuild
//!
//! 1. Reject duplicate chunk ids.
//! 2. Empty input drops the collection and reports [`RebuildOutcome::Empty`].
//! 3. Embed chunks in batches into a fresh staging generation.
//! 4. Promote the generation; the previous one is deleted in the same step.
//!
//! Any failure before step 4 discards the staging generation and leaves the
//! previous collection live and queryable.
//!
//! # Query
//!
//! Exact cosine-similarity search over the live generation. Results are
//! ordered by score descending, then chunk id ascending, so ties are
//! reproducible. A missing collection yields an empty result.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::embedding::{cosine_similarity, embed_one, Embedder};
use crate::error::{EmbedError, IndexError};
use crate::models::{Chunk, CollectionInfo, IndexRecord, Retrieved, ScoredChunk};
use crate::store::{GenerationMeta, IndexStore};

/// Default number of texts per embedder call.
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Result of [`VectorIndex::rebuild`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildOutcome {
    /// Nothing to ingest. The collection no longer exists.
    Empty { dropped_previous: bool },
    /// A new generation is live.
    Rebuilt {
        generation: String,
        records: usize,
        replaced: Option<String>,
    },
}

/// Vector index over a store backend.
pub struct VectorIndex<S> {
    store: S,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    writer: Mutex<()>,
}

impl<S: IndexStore> VectorIndex<S> {
    pub fn new(store: S, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            embedder,
            batch_size: DEFAULT_BATCH_SIZE,
            writer: Mutex::new(()),
        }
    }

    /// Number of chunks sent to the embedder per call (minimum 1).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Replace `collection` with exactly `chunks`.
    pub async fn rebuild(
        &self,
        collection: &str,
        chunks: &[Chunk],
    ) -> Result<RebuildOutcome, IndexError> {
        let mut seen = HashSet::with_capacity(chunks.len());
        for c in chunks {
            if !seen.insert(c.id.as_str()) {
                return Err(IndexError::DuplicateId(c.id.clone()));
            }
        }

        let _writer = self.writer.lock().await;

        if chunks.is_empty() {
            let dropped_previous = self
                .store
                .drop_collection(collection)
                .await
                .map_err(IndexError::Store)?;
            warn!(collection, dropped_previous, "no chunks to ingest");
            return Ok(RebuildOutcome::Empty { dropped_previous });
        }

        let generation = self
            .store
            .begin_generation()
            .await
            .map_err(IndexError::Store)?;
        debug!(collection, %generation, chunks = chunks.len(), "staging generation");

        if let Err(e) = self.populate(&generation, chunks).await {
            self.discard(&generation).await;
            return Err(e);
        }

        let meta = GenerationMeta {
            model: self.embedder.model_name().to_string(),
            dims: self.embedder.dims(),
        };
        let replaced = match self.store.promote(collection, &generation, &meta).await {
            Ok(r) => r,
            Err(e) => {
                self.discard(&generation).await;
                return Err(IndexError::Store(e));
            }
        };

        info!(
            collection,
            %generation,
            records = chunks.len(),
            model = %meta.model,
            "collection rebuilt"
        );

        Ok(RebuildOutcome::Rebuilt {
            generation,
            records: chunks.len(),
            replaced,
        })
    }

    /// Top-`k` passages for `query_text`, most relevant first.
    pub async fn query(
        &self,
        collection: &str,
        query_text: &str,
        k: usize,
    ) -> Result<Vec<Retrieved>, IndexError> {
        Ok(self
            .query_scored(collection, query_text, k)
            .await?
            .into_iter()
            .map(Retrieved::from)
            .collect())
    }

    /// Like [`query`](Self::query), keeping ids and similarity scores.
    pub async fn query_scored(
        &self,
        collection: &str,
        query_text: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        if k == 0 {
            return Err(IndexError::InvalidK);
        }

        let snapshot = match self
            .store
            .snapshot(collection)
            .await
            .map_err(IndexError::Store)?
        {
            Some(s) => s,
            None => {
                debug!(collection, "collection not found, returning no context");
                return Ok(Vec::new());
            }
        };

        self.check_model(&snapshot.info)?;

        let query_vec = embed_one(self.embedder.as_ref(), query_text).await?;
        self.check_dims(&query_vec)?;

        Ok(rank(&query_vec, &snapshot.records, k))
    }

    /// Live generation metadata.
    pub async fn info(&self, collection: &str) -> Result<Option<CollectionInfo>, IndexError> {
        self.store
            .collection_info(collection)
            .await
            .map_err(IndexError::Store)
    }

    /// Delete a collection. Serialized against rebuilds.
    pub async fn drop_collection(&self, collection: &str) -> Result<bool, IndexError> {
        let _writer = self.writer.lock().await;
        self.store
            .drop_collection(collection)
            .await
            .map_err(IndexError::Store)
    }

    async fn populate(&self, generation: &str, chunks: &[Chunk]) -> Result<(), IndexError> {
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(EmbedError::InvalidResponse(format!(
                    "expected {} vectors, got {}",
                    batch.len(),
                    vectors.len()
                ))
                .into());
            }

            let mut records = Vec::with_capacity(batch.len());
            for (chunk, embedding) in batch.iter().zip(vectors) {
                self.check_dims(&embedding)?;
                records.push(IndexRecord {
                    id: chunk.id.clone(),
                    content: chunk.content.clone(),
                    source: chunk.source.clone(),
                    hash: chunk.hash.clone(),
                    embedding,
                });
            }

            self.store
                .write_records(generation, &records)
                .await
                .map_err(IndexError::Store)?;
            debug!(%generation, batch = records.len(), "records staged");
        }
        Ok(())
    }

    async fn discard(&self, generation: &str) {
        if let Err(e) = self.store.discard_generation(generation).await {
            warn!(%generation, error = %e, "failed to discard staging generation");
        }
    }

    fn check_dims(&self, vector: &[f32]) -> Result<(), IndexError> {
        let expected = self.embedder.dims();
        if vector.len() != expected {
            return Err(IndexError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(
                EmbedError::InvalidResponse("embedding has non-finite values".to_string()).into(),
            );
        }
        Ok(())
    }

    fn check_model(&self, info: &CollectionInfo) -> Result<(), IndexError> {
        let current = self.embedder.model_name();
        let current_dims = self.embedder.dims();
        if info.model != current || info.dims != current_dims {
            return Err(IndexError::ModelMismatch {
                collection: info.name.clone(),
                built_with: info.model.clone(),
                built_dims: info.dims,
                current: current.to_string(),
                current_dims,
            });
        }
        Ok(())
    }
}

/// Exact top-`k` by cosine similarity; ties broken by ascending id.
pub fn rank(query_vec: &[f32], records: &[IndexRecord], k: usize) -> Vec<ScoredChunk> {
    let mut scored: Vec<ScoredChunk> = records
        .iter()
        .map(|r| ScoredChunk {
            id: r.id.clone(),
            content: r.content.clone(),
            source: r.source.clone(),
            score: cosine_similarity(query_vec, &r.embedding),
        })
        .collect();

    scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    scored.truncate(k);
    scored
}
