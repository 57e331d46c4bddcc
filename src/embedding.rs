//! Embedding backends and provider selection.
//!
//! Implements [`Embedder`] for:
//! - **[`LocalEmbedder`]**: sentence-transformer models run in-process via
//!   fastembed (default `all-minilm-l6-v2`, 384 dims). No network calls after
//!   the first model download.
//! - **[`OpenAiEmbedder`]**: any OpenAI-compatible `POST /embeddings` endpoint.
//! - **[`OllamaEmbedder`]**: a local Ollama instance's `/api/embed`.
//! - [`HashEmbedder`]: deterministic offline embedder from the core crate,
//!   used by tests and air-gapped setups.
//!
//! Use [`create_embedder`] to build the configured backend once per process
//! and share it between ingestion and query.
//!
//! # Retry Strategy
//!
//! The HTTP backends retry transient failures with exponential backoff
//! (1s, 2s, 4s, ... capped at 32s):
//! - HTTP 429 and 5xx → retry
//! - other 4xx → fail immediately ([`EmbedError::Rejected`])
//! - connection errors → retry, then [`EmbedError::Unavailable`]
//! - timeouts → retry, then [`EmbedError::Timeout`]

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use groundwork_core::embedding::{Embedder, HashEmbedder};
use groundwork_core::error::EmbedError;

use crate::config::EmbeddingConfig;

/// Build the embedder named by `embedding.provider`.
///
/// | Config Value | Embedder |
/// |-------------|----------|
/// | `"local"` | [`LocalEmbedder`] (requires the `local-embeddings-fastembed` feature) |
/// | `"openai"` | [`OpenAiEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
/// | `"hash"` | [`HashEmbedder`] |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "hash" => Ok(Arc::new(HashEmbedder::new(config.dims.unwrap_or(384)))),
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!(
            "Local embedding provider requires --features local-embeddings-fastembed \
             (or set embedding.provider = \"hash\" for offline use)"
        ),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

fn http_client(config: &EmbeddingConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

/// Send `build()` up to `max_retries + 1` times, returning the JSON body of
/// the first successful response.
async fn send_with_retry<F>(
    label: &str,
    max_retries: u32,
    timeout_secs: u64,
    build: F,
) -> Result<serde_json::Value, EmbedError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tracing::debug!(label, attempt, ?delay, "retrying embedding request");
            tokio::time::sleep(delay).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response
                        .json()
                        .await
                        .map_err(|e| EmbedError::InvalidResponse(e.to_string()));
                }

                let body_text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    tracing::warn!(label, %status, "transient embedding error");
                    last_err = Some(EmbedError::Unavailable(format!(
                        "{} API error {}: {}",
                        label, status, body_text
                    )));
                    continue;
                }

                return Err(EmbedError::Rejected(format!(
                    "{} API error {}: {}",
                    label, status, body_text
                )));
            }
            Err(e) if e.is_timeout() => {
                tracing::warn!(label, "embedding request timed out");
                last_err = Some(EmbedError::Timeout(timeout_secs));
            }
            Err(e) => {
                tracing::warn!(label, error = %e, "embedding request failed");
                last_err = Some(EmbedError::Unavailable(format!("{}: {}", label, e)));
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| EmbedError::Unavailable(format!("{} failed after retries", label))))
}

fn json_vector(value: &serde_json::Value) -> Result<Vec<f32>, EmbedError> {
    value
        .as_array()
        .ok_or_else(|| EmbedError::InvalidResponse("embedding is not an array".to_string()))?
        .iter()
        .map(|v| {
            let f = v
                .as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| EmbedError::InvalidResponse("non-numeric embedding value".into()))?;
            if !f.is_finite() {
                return Err(EmbedError::InvalidResponse(
                    "embedding value out of f32 range".into(),
                ));
            }
            Ok(f)
        })
        .collect()
}

// ============ OpenAI-compatible ============

/// Embedder for OpenAI-compatible `POST {url}/embeddings` APIs.
///
/// Reads the key from `OPENAI_API_KEY`. `embedding.url` points it at any
/// compatible server; the default is `https://api.openai.com/v1`.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dims: usize,
    max_retries: u32,
    timeout_secs: u64,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let base = config
            .url
            .as_deref()
            .unwrap_or("https://api.openai.com/v1")
            .trim_end_matches('/');

        Ok(Self {
            client: http_client(config)?,
            endpoint: format!("{}/embeddings", base),
            api_key,
            model,
            dims,
            max_retries: config.max_retries,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = send_with_retry("OpenAI", self.max_retries, self.timeout_secs, || {
            self.client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;
        parse_openai_response(&json)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbedError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| EmbedError::InvalidResponse("missing data array".to_string()))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let embedding = item
            .get("embedding")
            .ok_or_else(|| EmbedError::InvalidResponse("missing embedding".to_string()))?;
        indexed.push((index, json_vector(embedding)?));
    }

    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama ============

/// Embedder backed by Ollama's `POST /api/embed`
/// (default `http://localhost:11434`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
    max_retries: u32,
    timeout_secs: u64,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        Ok(Self {
            client: http_client(config)?,
            url: url.trim_end_matches('/').to_string(),
            model,
            dims,
            max_retries: config.max_retries,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let endpoint = format!("{}/api/embed", self.url);
        let json = send_with_retry("Ollama", self.max_retries, self.timeout_secs, || {
            self.client.post(&endpoint).json(&body)
        })
        .await
        .map_err(|e| match e {
            EmbedError::Unavailable(msg) => EmbedError::Unavailable(format!(
                "{} (is Ollama running at {}?)",
                msg, self.url
            )),
            other => other,
        })?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbedError> {
    json.get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| EmbedError::InvalidResponse("missing embeddings array".to_string()))?
        .iter()
        .map(json_vector)
        .collect()
}

// ============ Local (fastembed) ============

/// Default local model and its dimensionality for known model names.
pub fn resolve_local_model(config: &EmbeddingConfig) -> (String, usize) {
    let model_name = config
        .model
        .clone()
        .unwrap_or_else(|| "all-minilm-l6-v2".to_string());

    let dims = config.dims.unwrap_or(match model_name.as_str() {
        "all-minilm-l6-v2" => 384,
        "bge-small-en-v1.5" => 384,
        "bge-base-en-v1.5" => 768,
        "bge-large-en-v1.5" => 1024,
        "nomic-embed-text-v1" | "nomic-embed-text-v1.5" => 768,
        "multilingual-e5-small" => 384,
        "multilingual-e5-base" => 768,
        "multilingual-e5-large" => 1024,
        _ => 384,
    });

    (model_name, dims)
}

#[cfg(feature = "local-embeddings-fastembed")]
fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV1),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1, nomic-embed-text-v1.5, \
             multilingual-e5-small, multilingual-e5-base, multilingual-e5-large",
            other
        ),
    }
}

/// In-process sentence-transformer embedder.
///
/// The model is loaded on first use (downloading it from Hugging Face if
/// it is not cached) and kept for the life of the process. Inference runs
/// on the blocking thread pool.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalEmbedder {
    model_name: String,
    dims: usize,
    batch_size: usize,
    kind: fastembed::EmbeddingModel,
    model: Arc<std::sync::Mutex<Option<fastembed::TextEmbedding>>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model_name, dims) = resolve_local_model(config);
        let kind = config_to_fastembed_model(&model_name)?;
        Ok(Self {
            model_name,
            dims,
            batch_size: config.batch_size,
            kind,
            model: Arc::new(std::sync::Mutex::new(None)),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let slot = Arc::clone(&self.model);
        let kind = self.kind.clone();
        let batch_size = self.batch_size;
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut guard = slot
                .lock()
                .map_err(|_| EmbedError::Model("local model lock poisoned".to_string()))?;

            if guard.is_none() {
                tracing::info!(model = ?kind, "loading local embedding model");
                let loaded = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(kind).with_show_download_progress(true),
                )
                .map_err(|e| {
                    EmbedError::Model(format!("failed to initialize local model: {}", e))
                })?;
                *guard = Some(loaded);
            }

            let model = guard
                .as_mut()
                .ok_or_else(|| EmbedError::Model("local model not loaded".to_string()))?;
            model
                .embed(texts, Some(batch_size))
                .map_err(|e| EmbedError::Model(format!("local embedding failed: {}", e)))
        })
        .await
        .map_err(|e| EmbedError::Model(format!("embedding task panicked: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_provider_uses_configured_dims() {
        let config = EmbeddingConfig {
            provider: "hash".to_string(),
            dims: Some(64),
            ..Default::default()
        };
        let embedder = create_embedder(&config).unwrap();
        assert_eq!(embedder.dims(), 64);
        assert_eq!(embedder.model_name(), "hash-bow-64");
    }

    #[test]
    fn test_unknown_provider() {
        let config = EmbeddingConfig {
            provider: "magic".to_string(),
            ..Default::default()
        };
        assert!(create_embedder(&config).is_err());
    }

    #[test]
    fn test_local_model_dims() {
        let config = EmbeddingConfig::default();
        assert_eq!(
            resolve_local_model(&config),
            ("all-minilm-l6-v2".to_string(), 384)
        );

        let config = EmbeddingConfig {
            model: Some("bge-base-en-v1.5".to_string()),
            ..Default::default()
        };
        assert_eq!(resolve_local_model(&config).1, 768);
    }

    #[test]
    fn test_parse_openai_response_orders_by_index() {
        let json = serde_json::json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0] },
                { "index": 0, "embedding": [1.0, 0.0] }
            ]
        });
        let vectors = parse_openai_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_parse_openai_response_missing_data() {
        let err = parse_openai_response(&serde_json::json!({ "error": "nope" })).unwrap_err();
        assert!(matches!(err, EmbedError::InvalidResponse(_)));
    }

    #[test]
    fn test_parse_ollama_response() {
        let json = serde_json::json!({ "embeddings": [[0.5, 0.25], [1.0, 0.0]] });
        let vectors = parse_ollama_response(&json).unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0], vec![0.5, 0.25]);
    }

    #[test]
    fn test_parse_ollama_rejects_non_numeric() {
        let json = serde_json::json!({ "embeddings": [["a"]] });
        assert!(parse_ollama_response(&json).is_err());
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        let json = serde_json::json!({
            "data": [{ "index": 0, "embedding": [1.0e300, 0.0] }]
        });
        let err = parse_openai_response(&json).unwrap_err();
        assert!(matches!(err, EmbedError::InvalidResponse(_)));

        let json = serde_json::json!({ "embeddings": [[0.5, -1.0e40]] });
        assert!(parse_ollama_response(&json).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_ollama_is_unavailable() {
        let config = EmbeddingConfig {
            provider: "ollama".to_string(),
            model: Some("nomic-embed-text".to_string()),
            dims: Some(768),
            url: Some("http://127.0.0.1:9".to_string()),
            max_retries: 0,
            timeout_secs: 2,
            ..Default::default()
        };
        let embedder = OllamaEmbedder::new(&config).unwrap();
        let err = embedder.embed(&["hello".to_string()]).await.unwrap_err();
        assert!(matches!(
            err,
            EmbedError::Unavailable(_) | EmbedError::Timeout(_)
        ));
    }
}
