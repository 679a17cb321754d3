use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use policydb_core::error::{Error, Result};
use policydb_core::traits::{Embedder, VectorStore};
use policydb_core::types::{Candidate, SourceKind, VectorMatch};

/// Embeds a query and asks the vector store for its neighbours.
///
/// Every failure, including running past `timeout`, comes back as
/// [`Error::BackendUnavailable`]. There is no fallback at this level.
pub struct VectorSearchClient {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    timeout: Duration,
}

impl VectorSearchClient {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>, timeout: Duration) -> Self {
        Self { embedder, store, timeout }
    }

    pub fn embedder_id(&self) -> &str {
        self.embedder.embedder_id()
    }

    /// Matches ordered by similarity, best first, at most `top_k`.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<VectorMatch>> {
        match tokio::time::timeout(self.timeout, self.embed_and_query(query, top_k)).await {
            Ok(Ok(matches)) => Ok(matches),
            Ok(Err(e)) => Err(Error::backend(format!("{e:#}"))),
            Err(_) => Err(Error::BackendUnavailable(format!("vector search timed out after {:?}", self.timeout))),
        }
    }

    async fn embed_and_query(&self, query: &str, top_k: usize) -> anyhow::Result<Vec<VectorMatch>> {
        let embedding = self.embedder.embed(query).await?;
        if embedding.len() != self.embedder.dim() {
            anyhow::bail!(
                "embedder '{}' produced {} dimensions, expected {}",
                self.embedder.embedder_id(),
                embedding.len(),
                self.embedder.dim()
            );
        }
        let mut matches = self.store.query(&embedding, top_k).await?;
        matches.retain(|m| m.score.is_finite());
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(top_k);
        debug!(top_k, hits = matches.len(), "vector search");
        Ok(matches)
    }
}

/// Vector matches as 1-based ranked candidates. `ordinal` looks up the
/// lexical corpus position used for tie-breaks.
pub fn ranked_candidates<F>(matches: &[VectorMatch], ordinal: F) -> Vec<Candidate>
where
    F: Fn(&str) -> Option<u64>,
{
    matches
        .iter()
        .enumerate()
        .map(|(i, m)| Candidate { id: m.id.clone(), source: SourceKind::Vector, score: m.score, rank: i + 1, ordinal: ordinal(&m.id) })
        .collect()
}
