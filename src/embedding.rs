//! Embedding clients for the retriever.
//!
//! [`EmbeddingClient`] implements the core [`Embedder`] trait and dispatches
//! on `embedding.provider`:
//! - **`disabled`**: every call fails; retrieval then fails instead of
//!   silently returning nothing.
//! - **`openai`**: `POST https://api.openai.com/v1/embeddings`, key from
//!   `OPENAI_API_KEY`.
//! - **`ollama`**: `POST {url}/api/embed` on a local Ollama instance.
//! - **`local`**: fastembed, behind the `local-embeddings-fastembed` feature.
//!
//! # Retry Strategy
//!
//! The HTTP providers retry transient errors with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use finrag_core::Embedder;
use std::time::Duration;

use crate::config::EmbeddingConfig;

const OPENAI_URL: &str = "https://api.openai.com/v1/embeddings";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Config-driven embedding client.
pub struct EmbeddingClient {
    config: EmbeddingConfig,
    http: reqwest::Client,
}

impl EmbeddingClient {
    /// Build a client for the configured provider.
    ///
    /// # Errors
    ///
    /// Unknown provider names, a missing `model`/`dims` for an enabled
    /// provider, a missing `OPENAI_API_KEY`, or `local` without the
    /// fastembed feature.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        match config.provider.as_str() {
            "disabled" => {}
            "openai" | "ollama" | "local" => {
                if config.model.is_none() {
                    bail!("embedding.model required for {} provider", config.provider);
                }
                if config.dims.unwrap_or(0) == 0 {
                    bail!("embedding.dims required for {} provider", config.provider);
                }
            }
            other => bail!("Unknown embedding provider: {}", other),
        }

        if config.provider == "openai" && std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }

        if cfg!(not(feature = "local-embeddings-fastembed")) && config.provider == "local" {
            bail!("Local embedding provider requires --features local-embeddings-fastembed");
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            config: config.clone(),
            http,
        })
    }

    pub fn provider(&self) -> &str {
        &self.config.provider
    }

    pub fn dims(&self) -> Option<usize> {
        self.config.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        match self.config.provider.as_str() {
            "openai" => self.embed_openai(texts).await,
            "ollama" => self.embed_ollama(texts).await,
            #[cfg(feature = "local-embeddings-fastembed")]
            "local" => embed_local_fastembed(&self.config, texts).await,
            "disabled" => bail!("Embedding provider is disabled"),
            other => bail!("Unknown embedding provider: {}", other),
        }
    }

    async fn embed_openai(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;

        let body = serde_json::json!({
            "model": self.model()?,
            "input": texts,
        });

        let json = self
            .post_with_retry("OpenAI", OPENAI_URL, Some(&api_key), &body)
            .await?;
        parse_openai_response(&json)
    }

    async fn embed_ollama(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = self.config.url.as_deref().unwrap_or(DEFAULT_OLLAMA_URL);

        let body = serde_json::json!({
            "model": self.model()?,
            "input": texts,
        });

        let json = self
            .post_with_retry(
                "Ollama",
                &format!("{}/api/embed", url.trim_end_matches('/')),
                None,
                &body,
            )
            .await
            .map_err(|e| anyhow::anyhow!("{} (is Ollama running at {}?)", e, url))?;
        parse_ollama_response(&json)
    }

    fn model(&self) -> Result<&str> {
        self.config
            .model
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required"))
    }

    async fn post_with_retry(
        &self,
        service: &str,
        url: &str,
        bearer: Option<&str>,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                let reason = last_err
                    .as_ref()
                    .map(|e: &anyhow::Error| e.to_string())
                    .unwrap_or_default();
                tracing::warn!(
                    service,
                    attempt,
                    delay_secs = delay.as_secs(),
                    error = %reason,
                    "Retrying embedding request"
                );
                tokio::time::sleep(delay).await;
            }

            let mut request = self
                .http
                .post(url)
                .header("Content-Type", "application/json")
                .json(body);
            if let Some(key) = bearer {
                request = request.header("Authorization", format!("Bearer {}", key));
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response.json().await?);
                    }

                    let body_text = response.text().await.unwrap_or_default();

                    // Rate limited or server error: retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(anyhow::anyhow!(
                            "{} API error {}: {}",
                            service,
                            status,
                            body_text
                        ));
                        continue;
                    }

                    bail!("{} API error {}: {}", service, status, body_text);
                }
                Err(e) => {
                    last_err = Some(anyhow::anyhow!("{} connection error: {}", service, e));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| anyhow::anyhow!("{} embedding failed after retries", service)))
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    /// Embed `texts` in batches of `embedding.batch_size`, checking the
    /// vector count and dimension of every response.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.config.batch_size.max(1)) {
            let vectors = self.embed_batch(batch).await?;
            if vectors.len() != batch.len() {
                bail!(
                    "Embedding provider returned {} vectors for {} inputs",
                    vectors.len(),
                    batch.len()
                );
            }
            if let Some(dims) = self.config.dims {
                if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
                    bail!(
                        "Embedding provider returned {} dims, expected {}",
                        bad.len(),
                        dims
                    );
                }
            }
            out.extend(vectors);
        }

        Ok(out)
    }
}

fn parse_vector(values: &[serde_json::Value]) -> Result<Vec<f32>> {
    values
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| anyhow::anyhow!("Invalid embedding value: {}", v))
        })
        .collect()
}

/// Parse the OpenAI embeddings API response JSON.
///
/// Extracts the `data[].embedding` arrays and orders them by `data[].index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());

    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        indexed.push((index, parse_vector(embedding)?));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|embedding| {
            let values = embedding.as_array().ok_or_else(|| {
                anyhow::anyhow!("Invalid Ollama response: embedding is not an array")
            })?;
            parse_vector(values)
        })
        .collect()
}

#[cfg(feature = "local-embeddings-fastembed")]
fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
        "paraphrase-multilingual-minilm-l12-v2" => {
            Ok(fastembed::EmbeddingModel::ParaphraseMLMiniLML12V2)
        }
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             multilingual-e5-small, multilingual-e5-base, multilingual-e5-large, \
             paraphrase-multilingual-minilm-l12-v2, all-minilm-l6-v2, bge-small-en-v1.5",
            other
        ),
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
async fn embed_local_fastembed(
    config: &EmbeddingConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let model_name = config
        .model
        .clone()
        .unwrap_or_else(|| "multilingual-e5-small".to_string());

    let fastembed_model = config_to_fastembed_model(&model_name)?;
    let batch_size = config.batch_size;
    let texts = texts.to_vec();

    tokio::task::spawn_blocking(move || {
        let mut model = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(fastembed_model).with_show_download_progress(false),
        )
        .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))?;

        model
            .embed(texts, Some(batch_size))
            .map_err(|e| anyhow::anyhow!("Local embedding failed: {}", e))
    })
    .await?
}
