use anyhow::Result;
use async_trait::async_trait;
use std::hash::Hasher;
use twox_hash::XxHash64;

use policydb_core::traits::Embedder;

/// Offline embedder: signed feature hashing of lowercase alphanumeric tokens.
///
/// Same text, same vector. Texts sharing tokens land near each other, which is
/// enough for development runs and tests without an embedding service.
pub struct HashEmbedder {
    dim: usize,
    id: String,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1), id: format!("hash:xxh64:d{}", dim.max(1)) }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for token in text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let mut hasher = XxHash64::with_seed(0);
            hasher.write(token.to_lowercase().as_bytes());
            let h = hasher.finish();
            let idx = usize::try_from(h % self.dim as u64).unwrap_or(0);
            v[idx] += if h >> 63 == 0 { 1.0 } else { -1.0 };
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}
