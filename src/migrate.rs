use anyhow::Result;
use sqlx::SqlitePool;

/// Create the index schema. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // One row per collection, pointing at its live generation.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collections (
            name TEXT PRIMARY KEY,
            generation TEXT NOT NULL,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            record_count INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Records of every generation, live or staging.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            generation TEXT NOT NULL,
            id TEXT NOT NULL,
            source TEXT NOT NULL,
            content TEXT NOT NULL,
            hash TEXT NOT NULL,
            embedding BLOB NOT NULL,
            PRIMARY KEY (generation, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // In-progress rebuilds, refreshed on every staged batch.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS staging (
            generation TEXT PRIMARY KEY,
            touched_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_source ON records(generation, source)")
        .execute(pool)
        .await?;

    Ok(())
}
