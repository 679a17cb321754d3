//! Embedding providers: a remote OpenAI-compatible service and an offline
//! hashing embedder for development and tests.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use policydb_core::config::{EmbeddingConfig, EmbeddingProvider};
use policydb_core::traits::Embedder;

pub mod hash;
pub mod http;

pub use hash::HashEmbedder;
pub use http::HttpEmbedder;

/// `APP_USE_FAKE_EMBEDDINGS=1|true` swaps any configured provider for the hashing one.
pub fn use_fake_embeddings() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

pub fn build_embedder(cfg: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    if use_fake_embeddings() || cfg.provider == EmbeddingProvider::Hash {
        info!(dim = cfg.dimension, "using hashing embedder");
        return Ok(Arc::new(HashEmbedder::new(cfg.dimension)));
    }
    info!(model = %cfg.model, endpoint = %cfg.endpoint, "using HTTP embedder");
    Ok(Arc::new(HttpEmbedder::new(cfg)?))
}
