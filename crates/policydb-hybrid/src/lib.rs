//! policydb-hybrid
//!
//! Hybrid retrieval over policy documents: BM25 and vector candidates fused by
//! reciprocal rank or by an alpha-weighted blend, an LRU+TTL query cache in
//! front, and running performance counters.

pub mod cache;
pub mod engine;
pub mod fusion;
pub mod stats;

pub use cache::{CacheKey, QueryCache};
pub use engine::{EngineParts, HybridSearchEngine};
pub use stats::{PerformanceStats, PerformanceTracker, ReadinessPolicy};
