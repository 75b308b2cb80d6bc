use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub analyst: AnalystConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Directory the local backend persists to. Created on first use.
    pub data_dir: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Remote vector-index settings. When present and its API key is set
    /// in the environment, the remote backend is attempted first.
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
}

fn default_collection() -> String {
    "corpus_paragraphs".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    /// Base URL of the vector-index service.
    pub endpoint: String,
    #[serde(default = "default_index_name")]
    pub index: String,
    /// Environment variable holding the service API key. The key itself
    /// never lives in the config file.
    #[serde(default = "default_remote_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_remote_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl RemoteConfig {
    /// Resolve the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

fn default_index_name() -> String {
    "driftcheck-corpus".to_string()
}
fn default_remote_key_env() -> String {
    "VECTOR_INDEX_API_KEY".to_string()
}
fn default_remote_batch_size() -> usize {
    100
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "local".to_string(),
            model: None,
            dims: None,
            batch_size: 64,
        }
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_embedding_batch_size() -> usize {
    64
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    /// Minimum word count for a span to be indexed as a paragraph.
    /// Ad-hoc single-document indexing may override this per call.
    #[serde(default = "default_min_words")]
    pub min_words: usize,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            min_words: default_min_words(),
            include_globs: default_include_globs(),
        }
    }
}

fn default_min_words() -> usize {
    15
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.txt".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Nearest neighbors fetched per continuity check.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Highest-similarity subset forwarded to the analyst.
    #[serde(default = "default_context_k")]
    pub context_k: usize,
    /// Mean-similarity floor below which the low-consistency warning fires.
    #[serde(default = "default_low_similarity_threshold")]
    pub low_similarity_threshold: f64,
    /// Minimum similarity for `find_similar` results.
    #[serde(default = "default_similar_threshold")]
    pub similar_threshold: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            context_k: default_context_k(),
            low_similarity_threshold: default_low_similarity_threshold(),
            similar_threshold: default_similar_threshold(),
        }
    }
}

fn default_top_k() -> usize {
    10
}
fn default_context_k() -> usize {
    7
}
fn default_low_similarity_threshold() -> f64 {
    0.5
}
fn default_similar_threshold() -> f64 {
    0.7
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalystConfig {
    /// `"anthropic"` or `"disabled"`.
    #[serde(default = "default_analyst_provider")]
    pub provider: String,
    #[serde(default = "default_analyst_model")]
    pub model: String,
    #[serde(default = "default_analyst_key_env")]
    pub api_key_env: String,
    /// Override the API base URL (e.g. a gateway). Defaults to the
    /// provider's public endpoint.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_analyst_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_analyst_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AnalystConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: default_analyst_model(),
            api_key_env: default_analyst_key_env(),
            endpoint: None,
            max_tokens: default_analyst_max_tokens(),
            max_retries: default_max_retries(),
            timeout_secs: default_analyst_timeout_secs(),
        }
    }
}

fn default_analyst_provider() -> String {
    "anthropic".to_string()
}
fn default_analyst_model() -> String {
    "claude-3-5-sonnet-latest".to_string()
}
fn default_analyst_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}
fn default_analyst_max_tokens() -> u32 {
    2048
}
fn default_analyst_timeout_secs() -> u64 {
    60
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.indexing.min_words == 0 {
        anyhow::bail!("indexing.min_words must be > 0");
    }

    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.context_k == 0 {
        anyhow::bail!("retrieval.context_k must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.retrieval.low_similarity_threshold) {
        anyhow::bail!("retrieval.low_similarity_threshold must be in [0.0, 1.0]");
    }
    if !(0.0..=1.0).contains(&config.retrieval.similar_threshold) {
        anyhow::bail!("retrieval.similar_threshold must be in [0.0, 1.0]");
    }

    match config.embedding.provider.as_str() {
        "local" | "hashed" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be local or hashed.",
            other
        ),
    }

    match config.analyst.provider.as_str() {
        "anthropic" | "disabled" => {}
        other => anyhow::bail!(
            "Unknown analyst provider: '{}'. Must be anthropic or disabled.",
            other
        ),
    }

    if let Some(remote) = &config.store.remote {
        if remote.endpoint.trim().is_empty() {
            anyhow::bail!("store.remote.endpoint must not be empty");
        }
        if remote.batch_size == 0 {
            anyhow::bail!("store.remote.batch_size must be >= 1");
        }
    }

    Ok(config)
}
