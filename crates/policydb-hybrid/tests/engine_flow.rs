use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use policydb_core::config::{EmbeddingConfig, EmbeddingProvider, EngineConfig, VectorStoreConfig};
use policydb_core::traits::{Embedder, LexicalSearch, VectorStore};
use policydb_core::types::{Candidate, DocumentChunk, FusionParams, SourceTag, VectorMatch, TEXT_KEY};
use policydb_core::Error;
use policydb_embed::HashEmbedder;
use policydb_hybrid::{EngineParts, HybridSearchEngine, QueryCache};
use policydb_text::LexicalIndex;
use policydb_vector::VectorSearchClient;
use tempfile::TempDir;

const DIM: usize = 1024;

fn policy_corpus() -> Vec<DocumentChunk> {
    vec![
        DocumentChunk::new("ev", "ev_policy", "EV policy: 20% purchase subsidy"),
        DocumentChunk::new("industrial", "industrial", "Industrial policy: 5-year tax holiday"),
        DocumentChunk::new("excise", "excise", "Excise policy: liquor quota 10000L"),
    ]
}

struct CountingLexical {
    inner: LexicalIndex,
    calls: AtomicUsize,
}

impl LexicalSearch for CountingLexical {
    fn score(&self, query: &str) -> anyhow::Result<Vec<Candidate>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.score(query)
    }
    fn document(&self, id: &str) -> Option<&DocumentChunk> {
        self.inner.document(id)
    }
    fn ordinal(&self, id: &str) -> Option<u64> {
        self.inner.ordinal(id)
    }
    fn len(&self) -> usize {
        self.inner.len()
    }
}

enum BrokenLexical {
    Errors,
    Panics,
}

impl LexicalSearch for BrokenLexical {
    fn score(&self, _query: &str) -> anyhow::Result<Vec<Candidate>> {
        match self {
            BrokenLexical::Errors => anyhow::bail!("index files vanished"),
            BrokenLexical::Panics => panic!("scorer bug"),
        }
    }
    fn document(&self, _id: &str) -> Option<&DocumentChunk> {
        None
    }
    fn ordinal(&self, _id: &str) -> Option<u64> {
        None
    }
    fn len(&self) -> usize {
        0
    }
}

/// Brute-force cosine store over hash-embedded texts.
struct MemoryStore {
    rows: Vec<(VectorMatch, Vec<f32>)>,
    calls: AtomicUsize,
    delay: Duration,
    fail: bool,
}

impl MemoryStore {
    fn new(docs: &[DocumentChunk]) -> Self {
        let embedder = HashEmbedder::new(DIM);
        let rows = docs
            .iter()
            .map(|d| {
                let meta = BTreeMap::from([(TEXT_KEY.to_string(), d.content.clone())]);
                (VectorMatch { id: d.id.clone(), score: 0.0, namespace: d.namespace.clone(), metadata: meta }, embedder.embed_one(&d.content))
            })
            .collect();
        Self { rows, calls: AtomicUsize::new(0), delay: Duration::ZERO, fail: false }
    }

    fn failing() -> Self {
        Self { rows: Vec::new(), calls: AtomicUsize::new(0), delay: Duration::ZERO, fail: true }
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn query(&self, vector: &[f32], top_k: usize) -> anyhow::Result<Vec<VectorMatch>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            anyhow::bail!("connection refused");
        }
        let mut out: Vec<VectorMatch> = self
            .rows
            .iter()
            .map(|(m, v)| VectorMatch { score: v.iter().zip(vector).map(|(a, b)| a * b).sum(), ..m.clone() })
            .collect();
        out.sort_by(|a, b| b.score.total_cmp(&a.score));
        out.truncate(top_k);
        Ok(out)
    }
}

struct Harness {
    engine: Arc<HybridSearchEngine>,
    lexical: Arc<CountingLexical>,
    store: Arc<MemoryStore>,
}

fn harness_with(store: MemoryStore, fusion: FusionParams, timeout: Duration) -> Harness {
    let lexical = Arc::new(CountingLexical { inner: LexicalIndex::from_documents(policy_corpus()).expect("index"), calls: AtomicUsize::new(0) });
    let store = Arc::new(store);
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(DIM));
    let client = VectorSearchClient::new(embedder, store.clone(), timeout);
    let mut parts = EngineParts::new(lexical.clone(), client);
    parts.fusion = fusion;
    parts.backend_timeout = timeout;
    Harness { engine: Arc::new(HybridSearchEngine::new(parts)), lexical, store }
}

fn harness(fusion: FusionParams) -> Harness {
    harness_with(MemoryStore::new(&policy_corpus()), fusion, Duration::from_secs(2))
}

fn assert_well_formed(results: &[policydb_core::types::FusedResult], top_k: usize) {
    assert!(results.len() <= top_k);
    let unique: HashSet<_> = results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(unique.len(), results.len(), "duplicate ids in {results:?}");
}

#[tokio::test]
async fn ev_subsidy_ranks_ev_first_under_every_fusion() {
    let mut params = vec![FusionParams::rrf()];
    params.extend([0.0, 0.25, 0.5, 0.75, 1.0].map(FusionParams::alpha_blend));
    for p in params {
        let h = harness(p);
        let results = h.engine.fast_search("EV subsidy", 2).await.expect("search");
        assert_well_formed(&results, 2);
        assert_eq!(results[0].id, "ev", "params {p:?} -> {results:?}");
        assert_eq!(results[0].content(), Some("EV policy: 20% purchase subsidy"));
        assert_eq!(results[0].namespace, "ev_policy");
    }
}

#[tokio::test]
async fn repeated_query_is_served_from_cache() {
    let mut store = MemoryStore::new(&policy_corpus());
    store.delay = Duration::from_millis(20);
    let h = harness_with(store, FusionParams::rrf(), Duration::from_secs(2));

    let t0 = Instant::now();
    let first = h.engine.fast_search("industrial tax holiday", 3).await.expect("first");
    let first_latency = t0.elapsed();
    let hits_before = h.engine.get_performance_stats().cache_hits;

    let t1 = Instant::now();
    let second = h.engine.fast_search("  Industrial   TAX holiday ", 3).await.expect("second");
    let second_latency = t1.elapsed();

    assert_eq!(first, second);
    assert_eq!(first[0].id, "industrial");
    assert!(second_latency < first_latency);
    assert_eq!(h.engine.get_performance_stats().cache_hits, hits_before + 1);
    assert_eq!(h.lexical.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.store.calls.load(Ordering::SeqCst), 1);
}

/// Embeds by the case of the first letter only.
struct CaseEmbedder;

#[async_trait]
impl Embedder for CaseEmbedder {
    fn embedder_id(&self) -> &str {
        "case:d2"
    }
    fn dim(&self) -> usize {
        2
    }
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| if t.starts_with(char::is_uppercase) { vec![1.0, 0.0] } else { vec![0.0, 1.0] })
            .collect())
    }
}

/// Answers "upper" or "lower" depending on which axis the query points along.
struct CaseStore;

#[async_trait]
impl VectorStore for CaseStore {
    async fn query(&self, vector: &[f32], _top_k: usize) -> anyhow::Result<Vec<VectorMatch>> {
        let id = if vector[0] > vector[1] { "upper" } else { "lower" };
        Ok(vec![VectorMatch { id: id.into(), score: 1.0, namespace: "case".into(), metadata: BTreeMap::new() }])
    }
}

fn case_engine() -> HybridSearchEngine {
    let lexical = Arc::new(LexicalIndex::from_documents(policy_corpus()).expect("index"));
    let client = VectorSearchClient::new(Arc::new(CaseEmbedder), Arc::new(CaseStore), Duration::from_secs(2));
    HybridSearchEngine::new(EngineParts::new(lexical, client))
}

#[tokio::test]
async fn cached_answer_matches_cold_answer_for_every_spelling() {
    let warm = case_engine();
    warm.fast_search("EV subsidy", 3).await.expect("first spelling");
    let reused = warm.fast_search("ev subsidy", 3).await.expect("second spelling");
    assert_eq!(warm.get_performance_stats().cache_hits, 1);

    let cold = case_engine();
    let fresh = cold.fast_search("ev subsidy", 3).await.expect("cold");
    assert_eq!(reused, fresh);
    assert!(fresh.iter().any(|r| r.id == "lower"), "{fresh:?}");
}

#[tokio::test]
async fn different_top_k_is_a_separate_entry() {
    let h = harness(FusionParams::rrf());
    h.engine.fast_search("EV subsidy", 2).await.unwrap();
    h.engine.fast_search("EV subsidy", 3).await.unwrap();
    assert_eq!(h.store.calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.engine.cache().len(), 2);
}

#[tokio::test]
async fn results_are_bounded_and_unique() {
    let h = harness(FusionParams::alpha_blend(0.5));
    for q in ["policy", "EV subsidy", "liquor quota 10000L", "tax", "nothing matches here"] {
        for top_k in 1..=5 {
            let results = h.engine.fast_search(q, top_k).await.expect("search");
            assert_well_formed(&results, top_k);
        }
    }
}

#[tokio::test]
async fn vector_failure_degrades_to_lexical() {
    let h = harness_with(MemoryStore::failing(), FusionParams::rrf(), Duration::from_secs(2));
    let results = h.engine.fast_search("EV policy subsidy", 2).await.expect("degraded search");
    assert!(!results.is_empty());
    assert_well_formed(&results, 2);
    assert_eq!(results[0].id, "ev");
    assert!(results.iter().all(|r| r.is_degraded() && r.sources.contains(&SourceTag::Lexical)));

    // Degraded answers are not cached; the vector side is retried.
    h.engine.fast_search("EV policy subsidy", 2).await.expect("retry");
    assert_eq!(h.store.calls.load(Ordering::SeqCst), 2);
    let stats = h.engine.get_performance_stats();
    assert_eq!(stats.backend_failure_count, 2);
    assert_eq!(stats.cache_hits, 0);
}

#[tokio::test]
async fn slow_vector_store_counts_as_unavailable() {
    let mut store = MemoryStore::new(&policy_corpus());
    store.delay = Duration::from_secs(3);
    let h = harness_with(store, FusionParams::rrf(), Duration::from_millis(500));
    let results = h.engine.fast_search("excise liquor", 3).await.expect("search");
    assert_eq!(results[0].id, "excise");
    assert!(results[0].is_degraded());
}

#[tokio::test]
async fn lexical_failure_fails_the_request_but_is_recorded() {
    for broken in [BrokenLexical::Errors, BrokenLexical::Panics] {
        let store: Arc<dyn VectorStore> = Arc::new(MemoryStore::new(&policy_corpus()));
        let client = VectorSearchClient::new(Arc::new(HashEmbedder::new(DIM)), store, Duration::from_secs(2));
        let engine = HybridSearchEngine::new(EngineParts::new(Arc::new(broken), client));
        let err = engine.fast_search("EV subsidy", 2).await.unwrap_err();
        assert!(matches!(err, Error::RetrievalFailure(_)), "{err:?}");
        let stats = engine.get_performance_stats();
        assert_eq!(stats.queries_processed, 1);
        assert_eq!(stats.cache_misses, 1);
        assert_eq!(stats.backend_failure_count, 1);
        assert!(engine.cache().is_empty());
    }
}

#[tokio::test]
async fn invalid_queries_touch_nothing() {
    let h = harness(FusionParams::rrf());
    assert!(matches!(h.engine.fast_search("   ", 3).await, Err(Error::InvalidQuery(_))));
    assert!(matches!(h.engine.fast_search("EV", 0).await, Err(Error::InvalidQuery(_))));
    assert_eq!(h.lexical.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.store.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.engine.get_performance_stats().queries_processed, 0);
}

#[tokio::test]
async fn stats_track_distinct_and_repeated_queries() {
    let h = harness(FusionParams::rrf());
    let queries = ["EV subsidy", "tax holiday", "liquor", "policy", "quota", "purchase"];
    for q in queries {
        h.engine.fast_search(q, 2).await.unwrap();
    }
    let stats = h.engine.get_performance_stats();
    assert_eq!(stats.queries_processed, queries.len() as u64);
    assert_eq!(stats.cache_hits, 0);
    assert!((stats.cache_hit_rate - stats.cache_hits as f64 / queries.len() as f64).abs() < 1e-12);
    assert!(stats.production_ready, "six fast queries exceed the default sample size");

    h.engine.fast_search("EV subsidy", 2).await.unwrap();
    let stats = h.engine.get_performance_stats();
    assert_eq!(stats.cache_hits, 1);
    assert!((stats.cache_hit_rate - 1.0 / 7.0).abs() < 1e-12);
}

#[tokio::test]
async fn vector_only_documents_carry_store_metadata() {
    let mut docs = policy_corpus();
    docs.push(DocumentChunk::new("solar", "energy", "Solar rooftop subsidy scheme"));
    let store = MemoryStore::new(&docs);
    let h = harness_with(store, FusionParams::rrf(), Duration::from_secs(2));

    let results = h.engine.fast_search("solar rooftop", 4).await.expect("search");
    let solar = results.iter().find(|r| r.id == "solar").expect("vector-only hit");
    assert_eq!(solar.sources, vec![SourceTag::Vector]);
    assert_eq!(solar.namespace, "energy");
    assert_eq!(solar.content(), Some("Solar rooftop subsidy scheme"));
}

#[tokio::test]
async fn concurrent_queries_are_all_counted() {
    let h = harness(FusionParams::rrf());
    let mut tasks = Vec::new();
    for i in 0..16 {
        let engine = h.engine.clone();
        tasks.push(tokio::spawn(async move {
            let q = if i % 2 == 0 { "EV subsidy" } else { "tax holiday" };
            engine.fast_search(q, 2).await
        }));
    }
    for t in tasks {
        let results = t.await.expect("join").expect("search");
        assert_well_formed(&results, 2);
    }
    let stats = h.engine.get_performance_stats();
    assert_eq!(stats.queries_processed, 16);
    assert_eq!(stats.cache_hits + stats.cache_misses, 16);
}

#[tokio::test]
async fn disabled_cache_always_hits_backends() {
    let lexical = Arc::new(LexicalIndex::from_documents(policy_corpus()).unwrap());
    let store = Arc::new(MemoryStore::new(&policy_corpus()));
    let client = VectorSearchClient::new(Arc::new(HashEmbedder::new(DIM)), store.clone(), Duration::from_secs(2));
    let mut parts = EngineParts::new(lexical, client);
    parts.cache = QueryCache::new(0, None);
    let engine = HybridSearchEngine::new(parts);
    engine.fast_search("EV subsidy", 2).await.unwrap();
    engine.fast_search("EV subsidy", 2).await.unwrap();
    assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    assert_eq!(engine.get_performance_stats().cache_hits, 0);
}

#[tokio::test]
async fn results_serialize_with_public_field_names() {
    let h = harness(FusionParams::rrf());
    let results = h.engine.fast_search("EV subsidy", 1).await.unwrap();
    let json = serde_json::to_value(&results).unwrap();
    assert_eq!(json[0]["doc_id"], "ev");
    assert!(json[0]["source_tags"].as_array().is_some_and(|a| !a.is_empty()));
    assert!(json[0]["metadata"]["content"].is_string());
}

#[tokio::test]
async fn from_config_without_artifacts_serves_fallback_corpus() {
    let cache_dir = TempDir::new().unwrap();
    let lance_dir = TempDir::new().unwrap();
    let cfg = EngineConfig {
        cache_directory: cache_dir.path().to_path_buf(),
        vector_store: VectorStoreConfig {
            uri: lance_dir.path().to_string_lossy().into_owned(),
            index_name: "not_there".into(),
            credentials: BTreeMap::new(),
        },
        embedding: EmbeddingConfig { provider: EmbeddingProvider::Hash, dimension: 64, ..EmbeddingConfig::default() },
        ..EngineConfig::default()
    };
    let engine = HybridSearchEngine::from_config(&cfg).await.expect("engine");
    let results = engine.fast_search("EV policy", 2).await.expect("search");
    assert_eq!(results[0].id, "fallback-1");
    assert_eq!(results[0].namespace, "fallback");
    assert!(results[0].is_degraded());
}

#[tokio::test]
async fn from_config_uses_persisted_corpus() {
    let cache_dir = TempDir::new().unwrap();
    LexicalIndex::from_documents(policy_corpus()).unwrap().save(cache_dir.path()).unwrap();
    let cfg = EngineConfig {
        cache_directory: cache_dir.path().to_path_buf(),
        embedding: EmbeddingConfig { provider: EmbeddingProvider::Hash, dimension: 64, ..EmbeddingConfig::default() },
        vector_store: VectorStoreConfig { uri: cache_dir.path().join("lance").to_string_lossy().into_owned(), ..VectorStoreConfig::default() },
        ..EngineConfig::default()
    };
    let engine = HybridSearchEngine::from_config(&cfg).await.expect("engine");
    let results = engine.fast_search("industrial tax holiday", 3).await.expect("search");
    assert_eq!(results[0].id, "industrial");
}

#[tokio::test]
async fn from_config_rejects_invalid_alpha() {
    let cfg = EngineConfig { alpha: -0.1, ..EngineConfig::default() };
    assert!(HybridSearchEngine::from_config(&cfg).await.is_err());
}
