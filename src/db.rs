use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::config::IndexConfig;

/// Open (creating if needed) the index database inside `index.dir`.
pub async fn connect(index: &IndexConfig) -> Result<SqlitePool> {
    std::fs::create_dir_all(&index.dir)?;

    let options = SqliteConnectOptions::new()
        .filename(index.db_path())
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}
