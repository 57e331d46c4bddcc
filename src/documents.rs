//! Document discovery under `documents.dir`.
//!
//! Walks the directory (top level only unless `documents.recursive`),
//! keeps regular files whose extension is in `documents.extensions`
//! (case-insensitive), and returns them sorted by relative path so chunk
//! ids are stable between runs.

use anyhow::Result;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::DocumentsConfig;

/// A candidate document on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFile {
    /// Path relative to the documents directory, `/`-separated. Used as the
    /// chunk source label.
    pub name: String,
    pub path: PathBuf,
}

impl DocumentFile {
    /// Lowercased extension, if any.
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
    }
}

/// List recognized documents. Returns `Ok(None)` when the directory does
/// not exist.
pub fn scan_documents(config: &DocumentsConfig) -> Result<Option<Vec<DocumentFile>>> {
    let root = &config.dir;
    if !root.is_dir() {
        return Ok(None);
    }

    let matcher = build_extension_set(&config.extensions)?;

    let mut walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(config.follow_symlinks);
    if !config.recursive {
        walker = walker.max_depth(1);
    }

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let file_name = entry.file_name().to_string_lossy();
        if !matcher.is_match(file_name.as_ref()) {
            tracing::debug!(file = %path.display(), "ignoring unrecognized file type");
            continue;
        }

        files.push(DocumentFile {
            name: relative_name(root, path),
            path: path.to_path_buf(),
        });
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(Some(files))
}

fn relative_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn build_extension_set(extensions: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for ext in extensions {
        let ext = ext.trim().trim_start_matches('.');
        if ext.is_empty() {
            continue;
        }
        builder.add(
            GlobBuilder::new(&format!("*.{}", ext))
                .case_insensitive(true)
                .build()?,
        );
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config(dir: &Path) -> DocumentsConfig {
        DocumentsConfig {
            dir: dir.to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let result = scan_documents(&config(&tmp.path().join("nope"))).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_filters_extensions_case_insensitively() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b.md"), "b").unwrap();
        fs::write(tmp.path().join("a.TXT"), "a").unwrap();
        fs::write(tmp.path().join("c.docx"), "c").unwrap();
        fs::write(tmp.path().join("notes"), "n").unwrap();

        let files = scan_documents(&config(tmp.path())).unwrap().unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.TXT", "b.md"]);
        assert_eq!(files[0].extension().as_deref(), Some("txt"));
    }

    #[test]
    fn test_top_level_only_by_default() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("sub/deep.txt"), "deep").unwrap();
        fs::write(tmp.path().join("top.txt"), "top").unwrap();

        let files = scan_documents(&config(tmp.path())).unwrap().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "top.txt");

        let recursive = DocumentsConfig {
            recursive: true,
            ..config(tmp.path())
        };
        let files = scan_documents(&recursive).unwrap().unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["sub/deep.txt", "top.txt"]);
    }
}
