use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use policydb_core::config::ReadinessConfig;

/// When the engine counts as production ready. Advisory only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadinessPolicy {
    pub min_sample_size: u64,
    pub max_avg_response: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self { min_sample_size: 5, max_avg_response: Duration::from_secs(5) }
    }
}

impl From<&ReadinessConfig> for ReadinessPolicy {
    fn from(cfg: &ReadinessConfig) -> Self {
        Self {
            min_sample_size: cfg.min_sample_size,
            max_avg_response: Duration::try_from_secs_f64(cfg.max_avg_response_secs).unwrap_or(Duration::from_secs(5)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub queries_processed: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,
    /// Seconds.
    pub avg_response_time: f64,
    pub backend_failure_count: u64,
    pub production_ready: bool,
}

/// Engine-wide request counters.
#[derive(Debug, Default)]
pub struct PerformanceTracker {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    total_latency_micros: AtomicU64,
    backend_failures: AtomicU64,
    policy: ReadinessPolicy,
}

impl PerformanceTracker {
    pub fn new(policy: ReadinessPolicy) -> Self {
        Self { policy, ..Self::default() }
    }

    /// Each call counts exactly one hit or one miss.
    pub fn record(&self, latency: Duration, was_cache_hit: bool, backend_failed: bool) {
        if was_cache_hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
        }
        if backend_failed {
            self.backend_failures.fetch_add(1, Ordering::Relaxed);
        }
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.total_latency_micros.fetch_add(micros, Ordering::Relaxed);
    }

    pub fn stats(&self) -> PerformanceStats {
        // Processed queries are derived from the two halves so hits never exceed them.
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        let queries = hits + misses;
        let total_micros = self.total_latency_micros.load(Ordering::Relaxed);
        let (cache_hit_rate, avg_response_time) = if queries == 0 {
            (0.0, 0.0)
        } else {
            (hits as f64 / queries as f64, total_micros as f64 / queries as f64 / 1_000_000.0)
        };
        PerformanceStats {
            queries_processed: queries,
            cache_hits: hits,
            cache_misses: misses,
            cache_hit_rate,
            avg_response_time,
            backend_failure_count: self.backend_failures.load(Ordering::Relaxed),
            production_ready: queries > self.policy.min_sample_size
                && avg_response_time < self.policy.max_avg_response.as_secs_f64(),
        }
    }
}
