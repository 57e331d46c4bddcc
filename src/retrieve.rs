//! Index commands: `gw init`, `gw query`, `gw status`, `gw drop`.

use anyhow::Result;
use serde::Serialize;

use groundwork_core::index::VectorIndex;
use groundwork_core::models::{Retrieved, ScoredChunk};

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::sqlite_store::{SqliteStore, STAGING_GRACE};

/// Open the SQLite index with the configured embedder.
pub async fn open_index(config: &Config) -> Result<VectorIndex<SqliteStore>> {
    let store = SqliteStore::open(&config.index).await?;
    let embedder = create_embedder(&config.embedding)?;
    Ok(VectorIndex::new(store, embedder).with_batch_size(config.embedding.batch_size))
}

/// `gw init`: create the index directory and schema.
pub async fn run_init(config: &Config) -> Result<()> {
    let store = SqliteStore::open(&config.index).await?;
    let orphans = store.collect_garbage(STAGING_GRACE).await?;
    store.close().await;

    println!("Index initialized at {}", config.index.db_path().display());
    if orphans > 0 {
        println!("  removed {} records of abandoned generations", orphans);
    }
    Ok(())
}

#[derive(Serialize)]
struct QueryOutput<T> {
    results: Vec<T>,
}

/// `gw query`.
pub async fn run_query(
    config: &Config,
    question: &str,
    k: Option<usize>,
    json: bool,
    scores: bool,
) -> Result<()> {
    let index = open_index(config).await?;
    let k = k.unwrap_or(config.retrieval.top_k);
    let result = index
        .query_scored(&config.index.collection, question, k)
        .await;
    index.store().close().await;
    let results = result?;

    if json {
        let out = if scores {
            serde_json::to_string_pretty(&QueryOutput { results })?
        } else {
            let results: Vec<Retrieved> = results.into_iter().map(Retrieved::from).collect();
            serde_json::to_string_pretty(&QueryOutput { results })?
        };
        println!("{}", out);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, r) in results.iter().enumerate() {
        print_result(i, r, scores);
    }
    Ok(())
}

fn print_result(i: usize, result: &ScoredChunk, scores: bool) {
    if scores {
        println!("{}. [{:.4}] {}", i + 1, result.score, result.source);
        println!("    id: {}", result.id);
    } else {
        println!("{}. {}", i + 1, result.source);
    }
    for line in result.content.lines() {
        println!("    {}", line);
    }
    println!();
}

/// `gw status`.
pub async fn run_status(config: &Config) -> Result<()> {
    let index = open_index(config).await?;
    let collection = &config.index.collection;
    let info = index.info(collection).await;
    index.store().close().await;
    let info = info?;

    let db_path = config.index.db_path();
    let db_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    println!("Groundwork — Index Status");
    println!("=========================");
    println!();
    println!("  Database:    {}", db_path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Collection:  {}", collection);
    println!();

    match info {
        Some(info) => {
            println!("  Records:     {}", info.record_count);
            println!("  Model:       {} ({} dims)", info.model, info.dims);
            println!("  Built:       {}", format_ts_iso(info.created_at));
            println!("  Generation:  {}", info.generation);
        }
        None => {
            println!("  Not built yet. Run `gw ingest`.");
        }
    }
    println!();
    Ok(())
}

/// `gw drop`.
pub async fn run_drop(config: &Config) -> Result<()> {
    let index = open_index(config).await?;
    let collection = &config.index.collection;
    let dropped = index.drop_collection(collection).await;
    index.store().close().await;

    if dropped? {
        println!("Dropped collection {}", collection);
    } else {
        println!("Collection {} does not exist", collection);
    }
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_format_ts_iso() {
        assert_eq!(format_ts_iso(0), "1970-01-01 00:00 UTC");
    }
}
