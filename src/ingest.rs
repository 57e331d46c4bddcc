//! Ingestion pipeline.
//!
//! documents dir → extract text → chunk → embed → full rebuild of the
//! collection. Files that cannot be read or hold no text are skipped with a
//! diagnostic; they never abort the run. A missing documents directory or
//! one with no recognized files leaves the index untouched.

use anyhow::Result;
use serde::Serialize;

use groundwork_core::chunk::{chunk_document, SplitParams};
use groundwork_core::index::{RebuildOutcome, VectorIndex};
use groundwork_core::models::Chunk;
use groundwork_core::store::IndexStore;

use crate::config::Config;
use crate::documents::{scan_documents, DocumentFile};
use crate::extract::extract_file;
use crate::retrieve::open_index;
use crate::sqlite_store::STAGING_GRACE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    /// A new generation is live.
    Indexed,
    /// Documents were found but none produced text; the collection was dropped.
    Emptied,
    /// No recognized files; index untouched.
    NoDocuments,
    /// `documents.dir` does not exist; index untouched.
    MissingDirectory,
    /// Dry run: nothing embedded or written.
    DryRun,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub status: IngestStatus,
    pub files_found: usize,
    pub skipped: Vec<SkippedFile>,
    pub chunks: usize,
    #[serde(skip)]
    pub outcome: Option<RebuildOutcome>,
}

impl IngestReport {
    fn untouched(status: IngestStatus) -> Self {
        Self {
            status,
            files_found: 0,
            skipped: Vec::new(),
            chunks: 0,
            outcome: None,
        }
    }
}

/// Chunks gathered from the documents directory, before embedding.
#[derive(Debug)]
pub enum Collected {
    MissingDirectory,
    Documents {
        files_found: usize,
        skipped: Vec<SkippedFile>,
        chunks: Vec<Chunk>,
    },
}

/// Scan, extract, and chunk every recognized document.
pub fn collect_chunks(config: &Config) -> Result<Collected> {
    let params = config.chunking.split_params()?;
    let files = match scan_documents(&config.documents)? {
        Some(files) => files,
        None => return Ok(Collected::MissingDirectory),
    };

    let mut skipped = Vec::new();
    let mut chunks = Vec::new();
    for file in &files {
        match chunk_file(file, params) {
            Ok(mut file_chunks) => {
                tracing::debug!(file = %file.name, chunks = file_chunks.len(), "chunked");
                chunks.append(&mut file_chunks);
            }
            Err(reason) => {
                tracing::warn!(file = %file.name, %reason, "skipping document");
                skipped.push(SkippedFile {
                    name: file.name.clone(),
                    reason,
                });
            }
        }
    }

    Ok(Collected::Documents {
        files_found: files.len(),
        skipped,
        chunks,
    })
}

fn chunk_file(file: &DocumentFile, params: SplitParams) -> Result<Vec<Chunk>, String> {
    let ext = file.extension();
    let text = extract_file(&file.path, ext.as_deref()).map_err(|e| e.to_string())?;
    if text.trim().is_empty() {
        return Err("no text extracted".to_string());
    }
    Ok(chunk_document(&file.name, &text, params))
}

/// Rebuild `index.collection` from the documents directory.
pub async fn ingest<S: IndexStore>(index: &VectorIndex<S>, config: &Config) -> Result<IngestReport> {
    let collection = &config.index.collection;

    let (files_found, skipped, chunks) = match collect_chunks(config)? {
        Collected::MissingDirectory => {
            tracing::warn!(
                dir = %config.documents.dir.display(),
                "documents directory not found, nothing to ingest"
            );
            return Ok(IngestReport::untouched(IngestStatus::MissingDirectory));
        }
        Collected::Documents {
            files_found: 0, ..
        } => {
            tracing::warn!(
                dir = %config.documents.dir.display(),
                "no recognized documents, nothing to ingest"
            );
            return Ok(IngestReport::untouched(IngestStatus::NoDocuments));
        }
        Collected::Documents {
            files_found,
            skipped,
            chunks,
        } => (files_found, skipped, chunks),
    };

    let outcome = index.rebuild(collection, &chunks).await?;
    let status = match outcome {
        RebuildOutcome::Empty { .. } => IngestStatus::Emptied,
        RebuildOutcome::Rebuilt { .. } => IngestStatus::Indexed,
    };

    tracing::info!(
        collection = %collection,
        files = files_found,
        skipped = skipped.len(),
        chunks = chunks.len(),
        "ingestion finished"
    );

    Ok(IngestReport {
        status,
        files_found,
        skipped,
        chunks: chunks.len(),
        outcome: Some(outcome),
    })
}

/// `gw ingest`.
pub async fn run_ingest(config: &Config, dry_run: bool) -> Result<()> {
    let collection = &config.index.collection;

    let report = if dry_run {
        match collect_chunks(config)? {
            Collected::MissingDirectory => {
                IngestReport::untouched(IngestStatus::MissingDirectory)
            }
            Collected::Documents {
                files_found,
                skipped,
                chunks,
            } => IngestReport {
                status: IngestStatus::DryRun,
                files_found,
                skipped,
                chunks: chunks.len(),
                outcome: None,
            },
        }
    } else {
        let index = open_index(config).await?;
        let orphans = index.store().collect_garbage(STAGING_GRACE).await?;
        if orphans > 0 {
            tracing::info!(records = orphans, "removed records of abandoned generations");
        }
        let report = ingest(&index, config).await;
        index.store().close().await;
        report?
    };

    print_report(collection, &report, config);
    Ok(())
}

fn print_report(collection: &str, report: &IngestReport, config: &Config) {
    match report.status {
        IngestStatus::MissingDirectory => {
            println!(
                "Documents directory not found: {}",
                config.documents.dir.display()
            );
            println!("Nothing ingested");
            return;
        }
        IngestStatus::NoDocuments => {
            println!(
                "No documents found in {} (extensions: {})",
                config.documents.dir.display(),
                config.documents.extensions.join(", ")
            );
            println!("Nothing ingested");
            return;
        }
        _ => {}
    }

    if report.status == IngestStatus::DryRun {
        println!("ingest {} (dry-run)", collection);
    } else {
        println!("ingest {}", collection);
    }
    println!("  files found: {}", report.files_found);
    println!("  skipped: {}", report.skipped.len());
    for s in &report.skipped {
        println!("    {}: {}", s.name, s.reason);
    }
    println!("  chunks: {}", report.chunks);

    match &report.outcome {
        Some(RebuildOutcome::Rebuilt { generation, .. }) => {
            println!("  generation: {}", generation);
            println!("ok");
        }
        Some(RebuildOutcome::Empty { .. }) => println!("Nothing ingested"),
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use groundwork_core::embedding::HashEmbedder;
    use groundwork_core::store::memory::InMemoryStore;
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn config_for(dir: &Path) -> Config {
        let mut config = Config::default();
        config.documents.dir = dir.to_path_buf();
        config.embedding.provider = "hash".to_string();
        config
    }

    fn memory_index() -> VectorIndex<InMemoryStore> {
        VectorIndex::new(InMemoryStore::new(), Arc::new(HashEmbedder::default()))
    }

    #[tokio::test]
    async fn test_ingest_indexes_documents_and_skips_empty() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "The sky is blue").unwrap();
        fs::write(tmp.path().join("b.txt"), "Bananas are yellow").unwrap();
        fs::write(tmp.path().join("empty.md"), "   \n").unwrap();
        fs::write(tmp.path().join("ignored.csv"), "x,y").unwrap();

        let config = config_for(tmp.path());
        let index = memory_index();
        let report = ingest(&index, &config).await.unwrap();

        assert_eq!(report.status, IngestStatus::Indexed);
        assert_eq!(report.files_found, 3);
        assert_eq!(report.chunks, 2);
        assert_eq!(
            report.skipped,
            vec![SkippedFile {
                name: "empty.md".to_string(),
                reason: "no text extracted".to_string(),
            }]
        );

        let results = index.query("eventkb", "sky color", 1).await.unwrap();
        assert_eq!(results[0].content, "The sky is blue");
        assert_eq!(results[0].source, "a.txt");
    }

    #[tokio::test]
    async fn test_missing_directory_leaves_index_untouched() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "The sky is blue").unwrap();
        let index = memory_index();
        ingest(&index, &config_for(tmp.path())).await.unwrap();

        let report = ingest(&index, &config_for(&tmp.path().join("missing")))
            .await
            .unwrap();
        assert_eq!(report.status, IngestStatus::MissingDirectory);
        assert!(index.info("eventkb").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_no_recognized_documents_leaves_index_untouched() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "The sky is blue").unwrap();
        let index = memory_index();
        ingest(&index, &config_for(tmp.path())).await.unwrap();

        let other = TempDir::new().unwrap();
        fs::write(other.path().join("data.csv"), "1,2").unwrap();
        let report = ingest(&index, &config_for(other.path())).await.unwrap();
        assert_eq!(report.status, IngestStatus::NoDocuments);
        assert_eq!(index.info("eventkb").await.unwrap().unwrap().record_count, 1);
    }

    #[tokio::test]
    async fn test_only_empty_documents_drops_collection() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "The sky is blue").unwrap();
        let index = memory_index();
        ingest(&index, &config_for(tmp.path())).await.unwrap();

        fs::write(tmp.path().join("a.txt"), "").unwrap();
        let report = ingest(&index, &config_for(tmp.path())).await.unwrap();
        assert_eq!(report.status, IngestStatus::Emptied);
        assert!(index.info("eventkb").await.unwrap().is_none());
    }

    #[test]
    fn test_collect_chunks_ids_follow_file_names() {
        let tmp = TempDir::new().unwrap();
        let mut config = config_for(tmp.path());
        config.chunking.max_chars = 10;
        config.chunking.overlap = 2;
        fs::write(tmp.path().join("doc.md"), "alpha beta gamma delta").unwrap();

        match collect_chunks(&config).unwrap() {
            Collected::Documents { chunks, .. } => {
                assert!(chunks.len() > 1);
                for (i, c) in chunks.iter().enumerate() {
                    assert_eq!(c.id, format!("doc.md-{}", i));
                    assert_eq!(c.source, "doc.md");
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
