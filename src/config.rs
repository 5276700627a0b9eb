use anyhow::{Context, Result};
use chrono::Datelike;
use finrag_core::Lexicon;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub lexicon: LexiconConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Year that relative expressions ("el año pasado") are resolved
    /// against. Defaults to the current local year.
    #[serde(default)]
    pub baseline_year: Option<i32>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            baseline_year: None,
        }
    }
}

impl RetrievalConfig {
    pub fn baseline_year(&self) -> i32 {
        self.baseline_year
            .unwrap_or_else(|| chrono::Local::now().year())
    }
}

const BASELINE_YEAR_RANGE: std::ops::RangeInclusive<i32> = 1900..=9999;

fn default_top_k() -> usize {
    8
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
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
pub struct IndexConfig {
    /// JSONL export of the vector index (one chunk + embedding per line).
    #[serde(default = "default_snapshot")]
    pub snapshot: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            snapshot: default_snapshot(),
        }
    }
}

fn default_snapshot() -> PathBuf {
    PathBuf::from("data/index.jsonl")
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LexiconConfig {
    /// Replaces the built-in category lexicon when set.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl LexiconConfig {
    pub fn load(&self) -> Result<Lexicon> {
        match &self.path {
            Some(path) => Lexicon::load(path),
            None => Ok(Lexicon::builtin()),
        }
    }
}

impl Config {
    /// Defaults for commands that can run without a config file.
    pub fn minimal() -> Self {
        Self::default()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate retrieval
    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if let Some(year) = config.retrieval.baseline_year {
        if !BASELINE_YEAR_RANGE.contains(&year) {
            anyhow::bail!(
                "retrieval.baseline_year must be between {} and {}, got {}",
                BASELINE_YEAR_RANGE.start(),
                BASELINE_YEAR_RANGE.end(),
                year
            );
        }
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }
    }

    Ok(())
}
