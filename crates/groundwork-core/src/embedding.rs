//! Embedder trait and vector utilities.
//!
//! Defines the [`Embedder`] trait that every embedding backend implements,
//! plus pure helpers for vector serialization and similarity. The one
//! backend that lives here is [`HashEmbedder`], a deterministic offline
//! bag-of-words embedder with no model download.
//!
//! Network and ONNX-backed embedders live in the `groundwork` app crate.

use async_trait::async_trait;

use crate::error::EmbedError;

/// A text embedding function.
///
/// One instance is built per process and shared (`Arc<dyn Embedder>`)
/// between the ingestion and query paths, so both always embed with the
/// same model and configuration.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier, recorded with each collection (e.g. `"all-minilm-l6-v2"`).
    fn model_name(&self) -> &str;
    /// Output vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts, returning one vector per input in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

/// Embed a single text.
pub async fn embed_one(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>, EmbedError> {
    embedder
        .embed(&[text.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| EmbedError::InvalidResponse("empty embedding response".to_string()))
}

// ============ Hash Embedder ============

/// Deterministic feature-hashing embedder.
///
/// Lowercases the text, splits it on non-alphanumeric characters, hashes
/// each token with FNV-1a into one of `dims` buckets (with a hash-derived
/// sign) and L2-normalizes the result. Texts sharing words get positive
/// cosine similarity; texts sharing none are (up to collisions) orthogonal.
///
/// The hash is fixed, so vectors are stable across processes and builds.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dims: usize,
    model: String,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            dims: dims.max(1),
            model: format!("hash-bow-{}", dims.max(1)),
        }
    }

    /// Embed one text synchronously.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dims];
        let lowered = text.to_lowercase();
        for token in lowered.split(|c: char| !c.is_alphanumeric()) {
            if token.is_empty() {
                continue;
            }
            let h = fnv1a(token.as_bytes());
            let bucket = (h % self.dims as u64) as usize;
            let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            vec[bucket] += sign;
        }
        let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vec {
                *v /= norm;
            }
        }
        vec
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |h, b| (h ^ u64::from(*b)).wrapping_mul(PRIME))
}

// ============ Vector utilities ============

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use groundwork_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB written by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or a
/// zero-norm operand.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    // f64 accumulators: squaring large f32 components must not overflow.
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f64::from(f32::EPSILON) {
        return 0.0;
    }

    (dot / denom) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal_and_opposite() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_cosine_large_components_stay_finite() {
        let a = [3.0e30f32, 1.0e30];
        let b = [3.0e30f32, 1.0e30];
        let sim = cosine_similarity(&a, &b);
        assert!(sim.is_finite());
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_hash_embedder_deterministic_and_normalized() {
        let e = HashEmbedder::new(64);
        let a = e.embed_text("The sky is blue");
        let b = e.embed_text("the SKY is blue!");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_hash_embedder_empty_text_is_zero_vector() {
        let e = HashEmbedder::new(16);
        assert!(e.embed_text("  ").iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_hash_embedder_prefers_shared_words() {
        let e = HashEmbedder::default();
        let q = e.embed_text("sky color");
        let sky = e.embed_text("The sky is blue");
        let bananas = e.embed_text("Bananas are yellow");
        assert!(cosine_similarity(&q, &sky) > cosine_similarity(&q, &bananas));
    }

    #[tokio::test]
    async fn test_embed_one_returns_single_vector() {
        let e = HashEmbedder::new(8);
        let v = embed_one(&e, "hello").await.unwrap();
        assert_eq!(v.len(), 8);
        assert_eq!(e.model_name(), "hash-bow-8");
    }
}
