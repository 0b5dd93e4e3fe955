// crates/laminark-server/src/embeddings/ollama.rs
// Ollama embeddings via the OpenAI-compatible /v1/embeddings endpoint

use super::{EMBEDDING_DIMENSIONS, EmbeddingEngine};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Default Ollama embedding model (384 dimensions)
const DEFAULT_MODEL: &str = "all-minilm";

/// Max characters to embed (conservative limit for local models)
const MAX_TEXT_CHARS: usize = 8192 * 4;

/// Max texts per batch request
const MAX_BATCH_SIZE: usize = 64;

/// Retry attempts
const RETRY_ATTEMPTS: usize = 1;

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// Ollama embeddings engine (no auth required)
pub struct OllamaEngine {
    base_url: String,
    model: String,
    http_client: reqwest::Client,
}

impl OllamaEngine {
    pub fn new(base_url: String, model: Option<String>) -> Self {
        let model = model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let base_url = base_url.trim_end_matches('/').to_string();

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self { base_url, model, http_client }
    }

    /// Core embedding call via Ollama's OpenAI-compatible endpoint
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let inputs: Vec<&str> = texts
            .iter()
            .map(|t| {
                if t.len() > MAX_TEXT_CHARS {
                    debug!(
                        "Truncating text from {} to {} chars for Ollama embedding",
                        t.len(),
                        MAX_TEXT_CHARS
                    );
                    let mut end = MAX_TEXT_CHARS;
                    while !t.is_char_boundary(end) {
                        end -= 1;
                    }
                    &t[..end]
                } else {
                    t.as_str()
                }
            })
            .collect();

        let body = serde_json::json!({
            "input": inputs,
            "model": self.model,
        });
        let url = format!("{}/v1/embeddings", self.base_url);

        let mut last_error = None;
        for attempt in 0..=RETRY_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(1000)).await;
            }

            match self
                .http_client
                .post(&url)
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await
            {
                Ok(response) => {
                    if response.status().is_success() {
                        let resp: EmbeddingResponse = response
                            .json()
                            .await
                            .context("Failed to parse Ollama embedding response")?;

                        let mut data = resp.data;
                        data.sort_by_key(|d| d.index);
                        let embeddings: Vec<Vec<f32>> =
                            data.into_iter().map(|d| d.embedding).collect();

                        // The vec0 table is fixed-width; reject mismatched output
                        if let Some(first) = embeddings.first() {
                            if first.len() != EMBEDDING_DIMENSIONS {
                                anyhow::bail!(
                                    "Model '{}' returned {}-dim vectors, need {}",
                                    self.model,
                                    first.len(),
                                    EMBEDDING_DIMENSIONS
                                );
                            }
                        }
                        return Ok(embeddings);
                    }

                    let status = response.status();
                    let body_text = response.text().await.unwrap_or_default();
                    last_error = Some(anyhow::anyhow!(
                        "Ollama embedding request failed ({}): {}",
                        status,
                        body_text
                    ));
                }
                Err(e) => {
                    last_error = Some(anyhow::anyhow!("Ollama embedding request error: {}", e));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Ollama embedding failed")))
    }
}

#[async_trait]
impl EmbeddingEngine for OllamaEngine {
    fn name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        if texts.len() <= MAX_BATCH_SIZE {
            return self.embed_texts(texts).await;
        }
        let mut all_results = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(MAX_BATCH_SIZE) {
            all_results.extend(self.embed_texts(chunk).await?);
        }
        Ok(all_results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_model() {
        let engine = OllamaEngine::new("http://localhost:11434".to_string(), None);
        assert_eq!(engine.name(), DEFAULT_MODEL);
        assert_eq!(engine.dimensions(), EMBEDDING_DIMENSIONS);
    }

    #[test]
    fn custom_model() {
        let engine = OllamaEngine::new(
            "http://localhost:11434".to_string(),
            Some("bge-small-en".to_string()),
        );
        assert_eq!(engine.name(), "bge-small-en");
    }

    #[test]
    fn base_url_normalization() {
        let engine = OllamaEngine::new("http://localhost:11434/".to_string(), None);
        assert_eq!(engine.base_url, "http://localhost:11434");
    }
}
