//! TOML configuration.
//!
//! Every section except `[index]` is optional and falls back to the
//! defaults below. See `config/prag.example.toml` for a full example.

use anyhow::{bail, Context, Result};
use portfolio_rag_core::chunk::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use portfolio_rag_core::transform::SourceRule;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    /// Per-source transform rules, keyed by source system name.
    #[serde(default)]
    pub sources: BTreeMap<String, SourceRule>,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub github: GithubConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Artifact prefix: the store writes `<path>.index` and `<path>.docs`.
    pub path: PathBuf,
    /// Vector size. Defaults to the embedding provider's.
    #[serde(default)]
    pub dims: Option<usize>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_threshold")]
    pub threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            threshold: default_threshold(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_threshold() -> f32 {
    0.7
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_retries: default_llm_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_llm_provider() -> String {
    "disabled".to_string()
}
fn default_llm_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_tokens() -> u32 {
    500
}
fn default_llm_max_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Directory holding one subdirectory per source system.
    #[serde(default = "default_ingest_root")]
    pub root: PathBuf,
    /// Subdirectories of `root` to ingest, each under its own name.
    #[serde(default = "default_ingest_sources")]
    pub sources: Vec<String>,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            root: default_ingest_root(),
            sources: default_ingest_sources(),
            include_globs: default_include_globs(),
        }
    }
}

fn default_ingest_root() -> PathBuf {
    PathBuf::from("./data_sources")
}
fn default_ingest_sources() -> Vec<String> {
    vec!["hr".to_string(), "ats".to_string()]
}
fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.txt".to_string(),
        "**/*.md".to_string(),
        "**/*.json".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct GithubConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default = "default_github_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_repos")]
    pub max_repos: usize,
    #[serde(default = "default_true")]
    pub include_languages: bool,
    #[serde(default = "default_true")]
    pub include_readme: bool,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            username: None,
            base_url: default_github_base_url(),
            max_repos: default_max_repos(),
            include_languages: true,
            include_readme: true,
        }
    }
}

fn default_github_base_url() -> String {
    "https://api.github.com".to_string()
}
fn default_max_repos() -> usize {
    50
}
fn default_true() -> bool {
    true
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Chunking
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!("chunking.chunk_overlap must be < chunking.chunk_size");
    }

    // Retrieval
    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }
    if !config.retrieval.threshold.is_finite() {
        bail!("retrieval.threshold must be a finite number");
    }

    // Sources
    for (name, rule) in &config.sources {
        if !rule.weight.is_finite() || rule.weight < 0.0 {
            bail!("sources.{}.weight must be a finite number >= 0", name);
        }
    }

    // Embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" | "hash" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, local, or hash.",
            other
        ),
    }
    if matches!(config.embedding.provider.as_str(), "openai" | "ollama") {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    if config.embedding.dims == Some(0) || config.index.dims == Some(0) {
        bail!("embedding.dims and index.dims must be > 0 when set");
    }
    if let (Some(index_dims), Some(embedding_dims)) = (config.index.dims, config.embedding.dims) {
        if index_dims != embedding_dims {
            bail!(
                "index.dims ({}) does not match embedding.dims ({})",
                index_dims,
                embedding_dims
            );
        }
    }

    // LLM
    match config.llm.provider.as_str() {
        "disabled" | "openai" => {}
        other => bail!(
            "Unknown llm provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    // GitHub
    if config.github.enabled && config.github.username.is_none() {
        bail!("github.username must be set when github.enabled = true");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config = parse("[index]\npath = \"./data/portfolio\"\n").unwrap();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.retrieval.top_k, 5);
        assert!((config.retrieval.threshold - 0.7).abs() < 1e-6);
        assert_eq!(config.embedding.provider, "disabled");
        assert_eq!(config.llm.model, "gpt-3.5-turbo");
        assert_eq!(config.llm.max_tokens, 500);
        assert_eq!(config.ingest.sources, vec!["hr", "ats"]);
        assert_eq!(config.ingest.include_globs.len(), 3);
        assert!(!config.github.enabled);
        assert!(config.sources.is_empty());
    }

    #[test]
    fn test_source_rules_parsed() {
        let config = parse(
            r#"
[index]
path = "idx"

[sources.hr]
classification = "CONFIDENTIAL"
weight = 1.5
pii_mask = true

[sources.github]
weight = 0.8
"#,
        )
        .unwrap();
        let hr = &config.sources["hr"];
        assert_eq!(hr.classification, "CONFIDENTIAL");
        assert!(hr.pii_mask);
        let gh = &config.sources["github"];
        assert_eq!(gh.classification, "PUBLIC");
        assert!(!gh.pii_mask);
        assert_eq!(gh.weight, 0.8);
    }

    #[test]
    fn test_rejects_overlap_not_below_size() {
        let err = parse("[index]\npath = \"i\"\n[chunking]\nchunk_size = 100\nchunk_overlap = 100\n")
            .unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let err = parse("[index]\npath = \"i\"\n[embedding]\nprovider = \"magic\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn test_openai_requires_model_and_dims() {
        let err = parse("[index]\npath = \"i\"\n[embedding]\nprovider = \"openai\"\n").unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));
    }

    #[test]
    fn test_rejects_dims_disagreement() {
        let err = parse(
            "[index]\npath = \"i\"\ndims = 384\n[embedding]\nprovider = \"hash\"\ndims = 256\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn test_rejects_negative_weight() {
        let err = parse("[index]\npath = \"i\"\n[sources.hr]\nweight = -1.0\n").unwrap_err();
        assert!(err.to_string().contains("sources.hr.weight"));
    }

    #[test]
    fn test_github_requires_username() {
        let err = parse("[index]\npath = \"i\"\n[github]\nenabled = true\n").unwrap_err();
        assert!(err.to_string().contains("github.username"));
    }
}
