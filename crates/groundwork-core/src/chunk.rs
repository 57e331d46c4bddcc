//! Overlapping fixed-window text chunker.
//!
//! Splits document text into windows of at most `max_chars` characters,
//! where each window re-reads the last `overlap` characters of the one
//! before it so that sentences spanning a boundary survive in at least one
//! chunk.
//!
//! Lengths and offsets count Unicode scalar values, so a window never cuts
//! through a multi-byte UTF-8 sequence.
//!
//! # Algorithm
//!
//! 1. Take up to `max_chars` characters starting at the current offset.
//! 2. Trim the window; emit it if anything is left.
//! 3. If the window reached the end of the text, stop.
//! 4. Otherwise move the offset to the window end minus `overlap`
//!    characters (clamped at zero) and repeat.
//!
//! # Example
//!
//! ```rust
//! use groundwork_core::chunk::{split, SplitParams};
//!
//! let params = SplitParams::new(10, 3).unwrap();
//! let pieces: Vec<&str> = split("abcdefghijklmnop", params).collect();
//! assert_eq!(pieces, vec!["abcdefghij", "hijklmnop"]);
//! ```

use sha2::{Digest, Sha256};

use crate::error::ChunkError;
use crate::models::Chunk;

/// Validated window size and overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitParams {
    max_chars: usize,
    overlap: usize,
}

impl SplitParams {
    /// Requires `max_chars > 0` and `overlap < max_chars`.
    pub fn new(max_chars: usize, overlap: usize) -> Result<Self, ChunkError> {
        if max_chars == 0 {
            return Err(ChunkError::ZeroWindow);
        }
        if overlap >= max_chars {
            return Err(ChunkError::OverlapTooLarge { max_chars, overlap });
        }
        Ok(Self { max_chars, overlap })
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }
}

impl Default for SplitParams {
    fn default() -> Self {
        Self {
            max_chars: 1200,
            overlap: 150,
        }
    }
}

/// A raw, untrimmed window over the source text. Offsets are byte indices
/// on char boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(not(test), allow(dead_code))]
pub(crate) struct Window<'a> {
    pub(crate) start: usize,
    pub(crate) end: usize,
    pub(crate) raw: &'a str,
}

/// Iterator over every window, including whitespace-only ones.
#[derive(Debug, Clone)]
pub(crate) struct Windows<'a> {
    text: &'a str,
    params: SplitParams,
    offset: usize,
}

impl<'a> Iterator for Windows<'a> {
    type Item = Window<'a>;

    fn next(&mut self) -> Option<Window<'a>> {
        let start = self.offset;
        if start >= self.text.len() {
            return None;
        }

        let rest = &self.text[start..];
        let len = rest
            .char_indices()
            .nth(self.params.max_chars)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let end = start + len;

        self.offset = if end < self.text.len() {
            let next = step_back(self.text, end, self.params.overlap);
            // A full window holds max_chars > overlap chars, so we always advance.
            debug_assert!(next > start);
            next
        } else {
            end
        };

        Some(Window {
            start,
            end,
            raw: &self.text[start..end],
        })
    }
}

/// Lazy iterator over trimmed, non-empty chunk contents.
///
/// `Split` is `Clone`; cloning it before iterating gives an independent
/// restart of the same sequence.
#[derive(Debug, Clone)]
pub struct Split<'a> {
    windows: Windows<'a>,
}

impl<'a> Split<'a> {
    /// The underlying windows, untrimmed, from the current position.
    #[cfg(test)]
    pub(crate) fn windows(&self) -> Windows<'a> {
        self.windows.clone()
    }
}

impl<'a> Iterator for Split<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        for window in self.windows.by_ref() {
            let trimmed = window.raw.trim();
            if !trimmed.is_empty() {
                return Some(trimmed);
            }
        }
        None
    }
}

/// Split `text` into overlapping windows and yield the trimmed, non-empty ones.
pub fn split(text: &str, params: SplitParams) -> Split<'_> {
    Split {
        windows: Windows {
            text,
            params,
            offset: 0,
        },
    }
}

/// Chunk a whole document, assigning `"{source}-{index}"` ids in emission
/// order and a SHA-256 content hash to each chunk.
pub fn chunk_document(source: &str, text: &str, params: SplitParams) -> Vec<Chunk> {
    split(text, params)
        .enumerate()
        .map(|(index, content)| make_chunk(source, index, content))
        .collect()
}

/// Byte index `n` chars before `end`, or 0 if there are fewer than `n`.
fn step_back(text: &str, end: usize, n: usize) -> usize {
    if n == 0 {
        return end;
    }
    text[..end]
        .char_indices()
        .rev()
        .nth(n - 1)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn make_chunk(source: &str, index: usize, content: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: format!("{}-{}", source, index),
        content: content.to_string(),
        source: source.to_string(),
        hash,
    }
}
