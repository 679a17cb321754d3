use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use policydb_core::config::EmbeddingConfig;
use policydb_core::traits::Embedder;

/// Client for an OpenAI-compatible `POST {endpoint}/embeddings` API.
pub struct HttpEmbedder {
    client: Client,
    url: String,
    model: String,
    api_key: Option<String>,
    dim: usize,
    id: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn new(cfg: &EmbeddingConfig) -> Result<Self> {
        let client = Client::builder().build().context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            url: format!("{}/embeddings", cfg.endpoint.trim_end_matches('/')),
            model: cfg.model.clone(),
            api_key: cfg.api_key.clone().filter(|k| !k.is_empty()),
            dim: cfg.dimension,
            id: format!("http:{}:d{}", cfg.model, cfg.dimension),
        })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut request = self.client.post(&self.url).json(&EmbeddingRequest { model: &self.model, input: texts });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response: EmbeddingResponse = request
            .send()
            .await
            .with_context(|| format!("Embedding request failed: POST {}", self.url))?
            .error_for_status()
            .with_context(|| format!("Embedding request failed: POST {}", self.url))?
            .json()
            .await
            .context("Malformed embedding response")?;

        let mut data = response.data;
        if data.len() != texts.len() {
            anyhow::bail!("embedding service returned {} vectors for {} inputs", data.len(), texts.len());
        }
        data.sort_by_key(|item| item.index);
        let mut out = Vec::with_capacity(data.len());
        for item in data {
            if item.embedding.len() != self.dim {
                anyhow::bail!("embedding dimension {} does not match configured {}", item.embedding.len(), self.dim);
            }
            out.push(item.embedding);
        }
        debug!(model = %self.model, count = out.len(), "embedded batch");
        Ok(out)
    }
}
