//! Embedding service client.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use graphrag_common::ServiceError;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn model(&self) -> &str;

    /// The fixed collection dimension every returned vector must match.
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Client for an Ollama-compatible `/api/embed` endpoint.
pub struct OllamaEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimension: usize,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: impl Into<String>, dimension: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build embedding HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            dimension,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let input = [text.to_string()];
        let mut vectors = self.embed_batch(&input).await?;
        vectors
            .pop()
            .context("embedding service returned an empty batch")
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&EmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .context("embedding request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("embedding service returned {status}: {body}");
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .context("invalid embedding response body")?;

        if parsed.embeddings.len() != texts.len() {
            bail!(
                "embedding service returned {} vectors for {} inputs",
                parsed.embeddings.len(),
                texts.len()
            );
        }
        for vector in &parsed.embeddings {
            if vector.len() != self.dimension {
                return Err(ServiceError::DimensionMismatch {
                    expected: self.dimension,
                    got: vector.len(),
                }
                .into());
            }
        }

        Ok(parsed.embeddings)
    }
}
