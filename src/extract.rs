//! Plain-text extraction for ingested documents.
//!
//! PDFs go through `pdf-extract`; when that fails the raw bytes are read as
//! lossy UTF-8 instead, so a damaged PDF still contributes whatever text it
//! carries. Everything else is read as lossy UTF-8.

use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Extract text from the file at `path`. `extension` is lowercase, without
/// the dot.
pub fn extract_file(path: &Path, extension: Option<&str>) -> Result<String, ExtractError> {
    let bytes = std::fs::read(path)?;
    Ok(extract_bytes(&bytes, extension, path))
}

fn extract_bytes(bytes: &[u8], extension: Option<&str>, path: &Path) -> String {
    match extension {
        Some("pdf") => match pdf_extract::extract_text_from_mem(bytes) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(
                    file = %path.display(),
                    error = %e,
                    "PDF extraction failed, falling back to raw text"
                );
                String::from_utf8_lossy(bytes).into_owned()
            }
        },
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}
