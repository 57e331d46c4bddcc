//! TOML configuration.
//!
//! Every section is optional; missing values fall back to the defaults
//! below, which reproduce the stock setup (`data/docs` → `.index`,
//! collection `eventkb`, 1200-char windows with 150 chars of overlap,
//! top 4 passages, local all-MiniLM-L6-v2 embeddings).

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use groundwork_core::chunk::SplitParams;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: default_index_dir(),
            collection: default_collection(),
        }
    }
}

fn default_index_dir() -> PathBuf {
    PathBuf::from(".index")
}
fn default_collection() -> String {
    "eventkb".to_string()
}

impl IndexConfig {
    /// The SQLite file inside the index directory.
    pub fn db_path(&self) -> PathBuf {
        self.dir.join("index.sqlite")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    #[serde(default = "default_documents_dir")]
    pub dir: PathBuf,
    /// Recognized file extensions, without the dot. Matched case-insensitively.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub recursive: bool,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            dir: default_documents_dir(),
            extensions: default_extensions(),
            recursive: false,
            follow_symlinks: false,
        }
    }
}

fn default_documents_dir() -> PathBuf {
    PathBuf::from("data/docs")
}
fn default_extensions() -> Vec<String> {
    vec!["pdf".to_string(), "txt".to_string(), "md".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap: default_overlap(),
        }
    }
}

fn default_max_chars() -> usize {
    1200
}
fn default_overlap() -> usize {
    150
}

impl ChunkingConfig {
    pub fn split_params(&self) -> Result<SplitParams> {
        Ok(SplitParams::new(self.max_chars, self.overlap)?)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `local`, `openai`, `ollama`, or `hash`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override for `openai` (OpenAI-compatible) and `ollama`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    3
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// OpenAI-compatible API root; `/chat/completions` is appended.
    #[serde(default = "default_generation_base_url")]
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_system_prompt_path")]
    pub system_prompt_path: PathBuf,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: default_generation_base_url(),
            api_key_env: default_api_key_env(),
            model: default_generation_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            system_prompt_path: default_system_prompt_path(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

fn default_generation_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}
fn default_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}
fn default_generation_model() -> String {
    "llama-3.1-8b-instant".to_string()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    512
}
fn default_system_prompt_path() -> PathBuf {
    PathBuf::from("prompts/system.txt")
}
fn default_generation_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

/// Read, parse, and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Like [`load_config`], but a missing file yields the validated defaults.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        let config = Config::default();
        validate(&config)?;
        Ok(config)
    }
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.index.collection.trim().is_empty() {
        bail!("index.collection must not be empty");
    }

    if config.documents.extensions.is_empty() {
        bail!("documents.extensions must list at least one extension");
    }

    if config.chunking.max_chars == 0 {
        bail!("chunking.max_chars must be > 0");
    }
    if config.chunking.overlap >= config.chunking.max_chars {
        bail!(
            "chunking.overlap ({}) must be smaller than chunking.max_chars ({})",
            config.chunking.overlap,
            config.chunking.max_chars
        );
    }

    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }

    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    match config.embedding.provider.as_str() {
        "local" | "hash" => {}
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be local, openai, ollama, or hash.",
            other
        ),
    }
    if config.embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0");
    }

    if !(0.0..=2.0).contains(&config.generation.temperature) {
        bail!("generation.temperature must be in [0.0, 2.0]");
    }
    if config.generation.max_tokens == 0 {
        bail!("generation.max_tokens must be >= 1");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.index.collection, "eventkb");
        assert_eq!(config.index.db_path(), PathBuf::from(".index/index.sqlite"));
        assert_eq!(config.documents.dir, PathBuf::from("data/docs"));
        assert_eq!(config.documents.extensions, vec!["pdf", "txt", "md"]);
        assert_eq!(config.chunking.max_chars, 1200);
        assert_eq!(config.chunking.overlap, 150);
        assert_eq!(config.retrieval.top_k, 4);
        assert_eq!(config.embedding.provider, "local");
        assert_eq!(config.generation.model, "llama-3.1-8b-instant");
    }

    #[test]
    fn test_overlap_must_be_smaller_than_window() {
        let err = parse_config("[chunking]\nmax_chars = 100\noverlap = 100\n").unwrap_err();
        assert!(err.to_string().contains("overlap"));
    }

    #[test]
    fn test_zero_top_k_rejected() {
        assert!(parse_config("[retrieval]\ntop_k = 0\n").is_err());
    }

    #[test]
    fn test_remote_provider_requires_model_and_dims() {
        assert!(parse_config("[embedding]\nprovider = \"openai\"\n").is_err());
        assert!(parse_config(
            "[embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\n"
        )
        .is_err());
        assert!(parse_config(
            "[embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\ndims = 1536\n"
        )
        .is_ok());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let err = parse_config("[embedding]\nprovider = \"magic\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn test_temperature_range() {
        assert!(parse_config("[generation]\ntemperature = 3.5\n").is_err());
        assert!(parse_config("[generation]\ntemperature = 1.0\n").is_ok());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = load_or_default(Path::new("/definitely/not/here/gw.toml")).unwrap();
        assert_eq!(config.index.collection, "eventkb");
    }
}
