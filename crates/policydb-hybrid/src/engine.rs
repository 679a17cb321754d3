use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use policydb_core::config::EngineConfig;
use policydb_core::error::{Error, Result};
use policydb_core::traits::{LexicalSearch, VectorStore};
use policydb_core::types::{Candidate, FusedResult, FusionParams, Meta, SourceTag, VectorMatch, CONTENT_KEY, TEXT_KEY};
use policydb_embed::build_embedder;
use policydb_text::LexicalIndex;
use policydb_vector::{ranked_candidates, LanceVectorStore, VectorSearchClient};

use crate::cache::{CacheKey, QueryCache};
use crate::fusion::{self, FusedCandidate};
use crate::stats::{PerformanceStats, PerformanceTracker, ReadinessPolicy};

/// Everything a [`HybridSearchEngine`] is built from.
pub struct EngineParts {
    pub lexical: Arc<dyn LexicalSearch>,
    pub vector: VectorSearchClient,
    pub fusion: FusionParams,
    pub cache: QueryCache,
    pub tracker: PerformanceTracker,
    pub candidate_multiplier: usize,
    pub backend_timeout: Duration,
}

impl EngineParts {
    /// Default fusion, cache, readiness and timeout settings around the two backends.
    pub fn new(lexical: Arc<dyn LexicalSearch>, vector: VectorSearchClient) -> Self {
        let defaults = EngineConfig::default();
        Self {
            lexical,
            vector,
            fusion: defaults.fusion_params(),
            cache: QueryCache::from_config(&defaults.cache),
            tracker: PerformanceTracker::new(ReadinessPolicy::from(&defaults.readiness)),
            candidate_multiplier: defaults.candidate_multiplier,
            backend_timeout: defaults.backend_timeout(),
        }
    }
}

/// Lexical and vector retrieval fused into one ranking, with a query cache
/// in front and counters behind. Share it as `Arc<HybridSearchEngine>`.
pub struct HybridSearchEngine {
    lexical: Arc<dyn LexicalSearch>,
    vector: VectorSearchClient,
    fusion: FusionParams,
    cache: QueryCache,
    tracker: PerformanceTracker,
    candidate_multiplier: usize,
    backend_timeout: Duration,
}

impl HybridSearchEngine {
    pub fn new(parts: EngineParts) -> Self {
        let EngineParts { lexical, vector, fusion, cache, tracker, candidate_multiplier, backend_timeout } = parts;
        info!(
            method = %fusion.method,
            alpha = fusion.alpha,
            rrf_k = fusion.rrf_k,
            corpus = lexical.len(),
            embedder = vector.embedder_id(),
            cache = cache.is_enabled(),
            "hybrid engine ready"
        );
        Self { lexical, vector, fusion, cache, tracker, candidate_multiplier: candidate_multiplier.max(1), backend_timeout }
    }

    /// Wires the persisted (or built-in) lexical corpus, the configured
    /// embedder and the LanceDB store.
    pub async fn from_config(cfg: &EngineConfig) -> anyhow::Result<Self> {
        cfg.validate()?;
        let dir = cfg.cache_directory.clone();
        let lexical = tokio::task::spawn_blocking(move || LexicalIndex::load_or_fallback(&dir)).await??;
        info!(origin = ?lexical.origin(), docs = lexical.len(), "lexical corpus");

        let embedder = build_embedder(&cfg.embedding)?;
        let store: Arc<dyn VectorStore> = Arc::new(LanceVectorStore::new(cfg.vector_store.clone()));
        let vector = VectorSearchClient::new(embedder, store, cfg.backend_timeout());

        Ok(Self::new(EngineParts {
            lexical: Arc::new(lexical),
            vector,
            fusion: cfg.fusion_params(),
            cache: QueryCache::from_config(&cfg.cache),
            tracker: PerformanceTracker::new(ReadinessPolicy::from(&cfg.readiness)),
            candidate_multiplier: cfg.candidate_multiplier,
            backend_timeout: cfg.backend_timeout(),
        }))
    }

    /// Ranked results for `query`, at most `top_k`, ids unique.
    ///
    /// A vector-side failure still answers, from lexical candidates alone,
    /// with every entry tagged `degraded`. Only a lexical failure fails the
    /// request.
    pub async fn fast_search(&self, query: &str, top_k: usize) -> Result<Vec<FusedResult>> {
        if query.trim().is_empty() {
            return Err(Error::InvalidQuery("query is empty".into()));
        }
        if top_k == 0 {
            return Err(Error::InvalidQuery("top_k must be at least 1".into()));
        }
        let started = Instant::now();
        let key = CacheKey::new(query, top_k, &self.fusion);

        if let Some(results) = self.cache.get(&key) {
            debug!(query = key.query(), top_k, "cache hit");
            self.tracker.record(started.elapsed(), true, false);
            return Ok(results);
        }
        debug!(query = key.query(), top_k, "cache miss");

        let pool = top_k.saturating_mul(self.candidate_multiplier);
        // Backends see the cache key's text, so every spelling sharing a key gets the same answer.
        let normalized = key.query();
        let (lexical, vector) = tokio::join!(self.score_lexical(normalized), self.vector.search(normalized, pool));

        let mut lexical = match lexical {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(error = %e, "lexical retrieval failed");
                self.tracker.record(started.elapsed(), false, true);
                return Err(e);
            }
        };
        lexical.truncate(pool);

        let results = match vector {
            Ok(matches) => {
                let vector_candidates = ranked_candidates(&matches, |id| self.lexical.ordinal(id));
                debug!(lexical = lexical.len(), vector = vector_candidates.len(), "fusing candidates");
                let fused = fusion::fuse(&lexical, &vector_candidates, &self.fusion, top_k);
                let results = self.materialize(fused, &matches, false);
                self.cache.put(key, results.clone());
                self.tracker.record(started.elapsed(), false, false);
                results
            }
            Err(e) => {
                warn!(error = %e, "vector backend unavailable; serving lexical-only results");
                let fused = fusion::lexical_only(&lexical, top_k);
                let results = self.materialize(fused, &[], true);
                self.tracker.record(started.elapsed(), false, true);
                results
            }
        };
        Ok(results)
    }

    pub fn get_performance_stats(&self) -> PerformanceStats {
        self.tracker.stats()
    }

    pub fn fusion_params(&self) -> FusionParams {
        self.fusion
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Scores on the blocking pool, bounded by the backend timeout.
    async fn score_lexical(&self, query: &str) -> Result<Vec<Candidate>> {
        let lexical = Arc::clone(&self.lexical);
        let owned = query.to_string();
        let task = tokio::task::spawn_blocking(move || lexical.score(&owned));
        match tokio::time::timeout(self.backend_timeout, task).await {
            Ok(Ok(Ok(candidates))) => Ok(candidates),
            Ok(Ok(Err(e))) => Err(Error::retrieval(format!("lexical scoring failed: {e:#}"))),
            Ok(Err(join)) => Err(Error::retrieval(format!("lexical scoring aborted: {join}"))),
            Err(_) => Err(Error::RetrievalFailure(format!("lexical scoring timed out after {:?}", self.backend_timeout))),
        }
    }

    /// Attaches namespace and metadata. Corpus documents take precedence over
    /// what the vector store returned for the same id.
    fn materialize(&self, fused: Vec<FusedCandidate>, matches: &[VectorMatch], degraded: bool) -> Vec<FusedResult> {
        let by_id: HashMap<&str, &VectorMatch> = matches.iter().map(|m| (m.id.as_str(), m)).collect();
        fused
            .into_iter()
            .map(|f| {
                let from_store = by_id.get(f.id.as_str());
                let mut metadata = from_store.map(|m| m.metadata.clone()).unwrap_or_default();
                let mut namespace = from_store.map(|m| m.namespace.clone()).unwrap_or_default();
                if let Some(doc) = self.lexical.document(&f.id) {
                    metadata.extend(doc.metadata.clone());
                    metadata.insert(CONTENT_KEY.to_string(), doc.content.clone());
                    namespace.clone_from(&doc.namespace);
                } else {
                    fill_content(&mut metadata);
                }
                let mut sources: Vec<SourceTag> = f.sources.into_iter().map(SourceTag::from).collect();
                if degraded {
                    sources.push(SourceTag::Degraded);
                }
                FusedResult { id: f.id, namespace, score: f.score, metadata, sources }
            })
            .collect()
    }
}

fn fill_content(metadata: &mut Meta) {
    if !metadata.contains_key(CONTENT_KEY) {
        if let Some(text) = metadata.get(TEXT_KEY).cloned() {
            metadata.insert(CONTENT_KEY.to_string(), text);
        }
    }
}
