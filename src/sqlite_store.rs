//! SQLite-backed [`IndexStore`].
//!
//! Collections are rows in `collections`, each naming its live generation;
//! records of every generation share the `records` table. Promotion
//! repoints the collection row and deletes the replaced generation inside
//! one transaction, and snapshots read the pointer and its records inside
//! one read transaction, so a reader never sees a half-built or
//! half-deleted generation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use groundwork_core::embedding::{blob_to_vec, vec_to_blob};
use groundwork_core::models::{CollectionInfo, IndexRecord};
use groundwork_core::store::{GenerationMeta, IndexStore, Snapshot};

use crate::config::IndexConfig;
use crate::db;
use crate::migrate;

/// How long a staging generation may go without a written batch before
/// garbage collection treats its rebuild as abandoned.
pub const STAGING_GRACE: Duration = Duration::from_secs(30 * 60);

/// SQLite implementation of [`IndexStore`].
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the index database and make sure the schema exists.
    pub async fn open(index: &IndexConfig) -> Result<Self> {
        let pool = db::connect(index)
            .await
            .with_context(|| format!("Failed to open index at {}", index.dir.display()))?;
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Delete records of generations no collection points to, left behind
    /// by an interrupted rebuild. Returns the number of records removed.
    ///
    /// A staging generation that wrote a batch within `grace` belongs to a
    /// rebuild still in progress (possibly in another process) and is kept.
    pub async fn collect_garbage(&self, grace: Duration) -> Result<u64> {
        let cutoff = chrono::Utc::now().timestamp() - grace.as_secs() as i64;
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM staging WHERE touched_at < ?")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query(
            r#"
            DELETE FROM records
            WHERE generation NOT IN (SELECT generation FROM collections)
              AND generation NOT IN (SELECT generation FROM staging)
            "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn touch_staging<'e, E>(executor: E, generation: &str) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO staging (generation, touched_at) VALUES (?, ?)
        ON CONFLICT(generation) DO UPDATE SET touched_at = excluded.touched_at
        "#,
    )
    .bind(generation)
    .bind(chrono::Utc::now().timestamp())
    .execute(executor)
    .await?;
    Ok(())
}

fn row_to_info(name: &str, row: &SqliteRow) -> CollectionInfo {
    CollectionInfo {
        name: name.to_string(),
        generation: row.get("generation"),
        model: row.get("model"),
        dims: row.get::<i64, _>("dims") as usize,
        record_count: row.get::<i64, _>("record_count") as usize,
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl IndexStore for SqliteStore {
    async fn begin_generation(&self) -> Result<String> {
        // Invisible to readers until a collection row points at it.
        let generation = Uuid::new_v4().to_string();
        touch_staging(&self.pool, &generation).await?;
        Ok(generation)
    }

    async fn write_records(&self, generation: &str, records: &[IndexRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        touch_staging(&mut *tx, generation).await?;

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO records (generation, id, source, content, hash, embedding)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(generation)
            .bind(&record.id)
            .bind(&record.source)
            .bind(&record.content)
            .bind(&record.hash)
            .bind(vec_to_blob(&record.embedding))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn promote(
        &self,
        collection: &str,
        generation: &str,
        meta: &GenerationMeta,
    ) -> Result<Option<String>> {
        let mut tx = self.pool.begin().await?;

        let previous: Option<String> =
            sqlx::query_scalar("SELECT generation FROM collections WHERE name = ?")
                .bind(collection)
                .fetch_optional(&mut *tx)
                .await?;

        let record_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE generation = ?")
                .bind(generation)
                .fetch_one(&mut *tx)
                .await?;

        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO collections (name, generation, model, dims, record_count, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                generation = excluded.generation,
                model = excluded.model,
                dims = excluded.dims,
                record_count = excluded.record_count,
                created_at = excluded.created_at
            "#,
        )
        .bind(collection)
        .bind(generation)
        .bind(&meta.model)
        .bind(meta.dims as i64)
        .bind(record_count)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM staging WHERE generation = ?")
            .bind(generation)
            .execute(&mut *tx)
            .await?;

        if let Some(ref old) = previous {
            if old != generation {
                sqlx::query("DELETE FROM records WHERE generation = ?")
                    .bind(old)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(previous)
    }

    async fn discard_generation(&self, generation: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            DELETE FROM records
            WHERE generation = ?
              AND generation NOT IN (SELECT generation FROM collections)
            "#,
        )
        .bind(generation)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM staging WHERE generation = ?")
            .bind(generation)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn drop_collection(&self, collection: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let generation: Option<String> =
            sqlx::query_scalar("SELECT generation FROM collections WHERE name = ?")
                .bind(collection)
                .fetch_optional(&mut *tx)
                .await?;

        let Some(generation) = generation else {
            tx.commit().await?;
            return Ok(false);
        };

        sqlx::query("DELETE FROM collections WHERE name = ?")
            .bind(collection)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM records WHERE generation = ?")
            .bind(&generation)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn collection_info(&self, collection: &str) -> Result<Option<CollectionInfo>> {
        let row = sqlx::query(
            "SELECT generation, model, dims, record_count, created_at FROM collections WHERE name = ?",
        )
        .bind(collection)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| row_to_info(collection, &r)))
    }

    async fn snapshot(&self, collection: &str) -> Result<Option<Snapshot>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT generation, model, dims, record_count, created_at FROM collections WHERE name = ?",
        )
        .bind(collection)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };
        let info = row_to_info(collection, &row);

        let rows = sqlx::query(
            r#"
            SELECT id, source, content, hash, embedding
            FROM records
            WHERE generation = ?
            ORDER BY id
            "#,
        )
        .bind(&info.generation)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let records = rows
            .iter()
            .map(|r| {
                let blob: Vec<u8> = r.get("embedding");
                IndexRecord {
                    id: r.get("id"),
                    source: r.get("source"),
                    content: r.get("content"),
                    hash: r.get("hash"),
                    embedding: blob_to_vec(&blob),
                }
            })
            .collect();

        Ok(Some(Snapshot {
            info,
            records: Arc::new(records),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_store() -> (TempDir, SqliteStore) {
        let tmp = TempDir::new().unwrap();
        let index = IndexConfig {
            dir: tmp.path().join(".index"),
            collection: "kb".to_string(),
        };
        let store = SqliteStore::open(&index).await.unwrap();
        (tmp, store)
    }

    fn record(id: &str, embedding: Vec<f32>) -> IndexRecord {
        IndexRecord {
            id: id.to_string(),
            content: format!("content {}", id),
            source: "a.txt".to_string(),
            hash: "h".to_string(),
            embedding,
        }
    }

    fn meta() -> GenerationMeta {
        GenerationMeta {
            model: "hash-bow-2".to_string(),
            dims: 2,
        }
    }

    #[tokio::test]
    async fn test_promote_and_snapshot() {
        let (_tmp, store) = open_store().await;
        let g = store.begin_generation().await.unwrap();
        store
            .write_records(&g, &[record("a-1", vec![0.0, 1.0]), record("a-0", vec![1.0, 0.5])])
            .await
            .unwrap();

        assert!(store.snapshot("kb").await.unwrap().is_none());
        assert!(store.promote("kb", &g, &meta()).await.unwrap().is_none());

        let snap = store.snapshot("kb").await.unwrap().unwrap();
        assert_eq!(snap.info.record_count, 2);
        assert_eq!(snap.info.model, "hash-bow-2");
        assert_eq!(snap.records[0].id, "a-0");
        assert_eq!(snap.records[0].embedding, vec![1.0, 0.5]);
    }

    #[tokio::test]
    async fn test_promote_deletes_replaced_generation() {
        let (_tmp, store) = open_store().await;
        let g1 = store.begin_generation().await.unwrap();
        store
            .write_records(&g1, &[record("old-0", vec![1.0, 0.0])])
            .await
            .unwrap();
        store.promote("kb", &g1, &meta()).await.unwrap();

        let g2 = store.begin_generation().await.unwrap();
        store
            .write_records(&g2, &[record("new-0", vec![0.0, 1.0])])
            .await
            .unwrap();
        let replaced = store.promote("kb", &g2, &meta()).await.unwrap();
        assert_eq!(replaced.as_deref(), Some(g1.as_str()));

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn test_discard_and_garbage_collection() {
        let (_tmp, store) = open_store().await;
        let live = store.begin_generation().await.unwrap();
        store
            .write_records(&live, &[record("a-0", vec![1.0, 0.0])])
            .await
            .unwrap();
        store.promote("kb", &live, &meta()).await.unwrap();

        // Discarding the live generation is a no-op.
        store.discard_generation(&live).await.unwrap();
        assert_eq!(store.collection_info("kb").await.unwrap().unwrap().record_count, 1);

        let orphan = store.begin_generation().await.unwrap();
        store
            .write_records(&orphan, &[record("x-0", vec![1.0, 1.0]), record("x-1", vec![1.0, 1.0])])
            .await
            .unwrap();

        // Abandoned an hour ago.
        sqlx::query("UPDATE staging SET touched_at = touched_at - 3600 WHERE generation = ?")
            .bind(&orphan)
            .execute(store.pool())
            .await
            .unwrap();
        assert_eq!(store.collect_garbage(STAGING_GRACE).await.unwrap(), 2);
        assert_eq!(store.snapshot("kb").await.unwrap().unwrap().records.len(), 1);
    }

    #[tokio::test]
    async fn test_garbage_collection_spares_active_staging() {
        let (_tmp, store) = open_store().await;
        let staging = store.begin_generation().await.unwrap();
        store
            .write_records(&staging, &[record("s-0", vec![1.0, 0.0])])
            .await
            .unwrap();

        assert_eq!(store.collect_garbage(STAGING_GRACE).await.unwrap(), 0);

        // The rebuild can still finish with every record it staged.
        store
            .write_records(&staging, &[record("s-1", vec![0.0, 1.0])])
            .await
            .unwrap();
        store.promote("kb", &staging, &meta()).await.unwrap();
        assert_eq!(store.collection_info("kb").await.unwrap().unwrap().record_count, 2);

        let left: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM staging")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(left, 0);
    }

    #[tokio::test]
    async fn test_garbage_collection_removes_untracked_records() {
        let (_tmp, store) = open_store().await;
        sqlx::query(
            "INSERT INTO records (generation, id, source, content, hash, embedding) VALUES ('lost', 'x-0', 'x.txt', 'x', 'h', x'')",
        )
        .execute(store.pool())
        .await
        .unwrap();
        assert_eq!(store.collect_garbage(STAGING_GRACE).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_drop_collection() {
        let (_tmp, store) = open_store().await;
        assert!(!store.drop_collection("kb").await.unwrap());

        let g = store.begin_generation().await.unwrap();
        store
            .write_records(&g, &[record("a-0", vec![1.0, 0.0])])
            .await
            .unwrap();
        store.promote("kb", &g, &meta()).await.unwrap();

        assert!(store.drop_collection("kb").await.unwrap());
        assert!(store.collection_info("kb").await.unwrap().is_none());
        assert!(store.snapshot("kb").await.unwrap().is_none());
    }
}
