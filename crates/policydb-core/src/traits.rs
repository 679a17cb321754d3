use async_trait::async_trait;

use crate::types::{Candidate, DocumentChunk, VectorMatch};

/// Turns text into fixed-dimension vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `http:text-embedding-ada-002:d1536`).
    fn embedder_id(&self) -> &str;
    fn dim(&self) -> usize;
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("embedder '{}' returned no vectors", self.embedder_id()))
    }
}

/// Nearest-neighbour lookup against an external store.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Returns up to `top_k` matches, best first, metadata included.
    async fn query(&self, vector: &[f32], top_k: usize) -> anyhow::Result<Vec<VectorMatch>>;
}

/// Read-only lexical scorer over a preloaded corpus.
pub trait LexicalSearch: Send + Sync {
    /// Every document with a positive score, best first, ranks starting at 1.
    fn score(&self, query: &str) -> anyhow::Result<Vec<Candidate>>;
    fn document(&self, id: &str) -> Option<&DocumentChunk>;
    /// Corpus insertion position of `id`.
    fn ordinal(&self, id: &str) -> Option<u64>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
