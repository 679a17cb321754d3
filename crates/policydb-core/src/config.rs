//! Configuration loader, typed engine settings, and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`__` separates nested keys, e.g. `APP_ENGINE__ALPHA=0.3`). Provides helpers
//! to expand `~` and `${VAR}` and to resolve relative paths against the
//! directory of the configuration file.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;
use crate::types::{FusionMethod, FusionParams, DEFAULT_RRF_K};

pub struct Config {
    figment: Figment,
    env_name: String,
    base_dir: PathBuf,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment, env_name, base_dir: PathBuf::from(".") };
        config.validate_for_env()?;
        Ok(config)
    }

    /// Load one explicit file (plus `APP_*` overrides). Relative paths inside it
    /// resolve against the file's directory.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            anyhow::bail!("config file {} does not exist", path.display());
        }
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        let figment = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("APP_").split("__"));
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
        let config = Self { figment, env_name, base_dir };
        config.validate_for_env()?;
        Ok(config)
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Typed `[engine]` section with defaults for anything not set, paths
    /// resolved, and values validated.
    pub fn engine(&self) -> anyhow::Result<EngineConfig> {
        let mut engine: EngineConfig = if self.figment.find_value("engine").is_ok() {
            self.get("engine")?
        } else {
            EngineConfig::default()
        };
        engine.cache_directory = resolve_with_base(&self.base_dir, engine.cache_directory.to_string_lossy());
        if !engine.vector_store.uri.contains("://") {
            engine.vector_store.uri = resolve_with_base(&self.base_dir, &engine.vector_store.uri)
                .to_string_lossy()
                .into_owned();
        }
        engine.validate()?;
        Ok(engine)
    }

    pub fn env_name(&self) -> &str {
        &self.env_name
    }

    fn validate_for_env(&self) -> anyhow::Result<()> {
        if matches!(self.env_name.as_str(), "prod" | "production") {
            let provider: Option<EmbeddingProvider> = self.get("engine.embedding.provider").ok();
            if provider == Some(EmbeddingProvider::Hash) {
                anyhow::bail!("Prod config must not use the hashing embedder");
            }
        }
        Ok(())
    }
}

/// Construction-time settings of the hybrid engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Vector weight for `alpha_blend` fusion, in [0,1].
    pub alpha: f32,
    pub fusion_method: FusionMethod,
    pub rrf_k: f32,
    /// Directory holding the persisted lexical artifacts.
    pub cache_directory: PathBuf,
    /// Each backend is asked for `top_k * candidate_multiplier` candidates.
    pub candidate_multiplier: usize,
    pub backend_timeout_ms: u64,
    pub vector_store: VectorStoreConfig,
    pub embedding: EmbeddingConfig,
    pub cache: CacheConfig,
    pub readiness: ReadinessConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            fusion_method: FusionMethod::Rrf,
            rrf_k: DEFAULT_RRF_K,
            cache_directory: PathBuf::from("cache"),
            candidate_multiplier: 3,
            backend_timeout_ms: 5_000,
            vector_store: VectorStoreConfig::default(),
            embedding: EmbeddingConfig::default(),
            cache: CacheConfig::default(),
            readiness: ReadinessConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if !self.alpha.is_finite() || !(0.0..=1.0).contains(&self.alpha) {
            return Err(Error::InvalidConfig(format!("alpha must be within [0,1], got {}", self.alpha)));
        }
        if !self.rrf_k.is_finite() || self.rrf_k <= 0.0 {
            return Err(Error::InvalidConfig(format!("rrf_k must be positive, got {}", self.rrf_k)));
        }
        if self.candidate_multiplier == 0 {
            return Err(Error::InvalidConfig("candidate_multiplier must be at least 1".into()));
        }
        if self.backend_timeout_ms == 0 {
            return Err(Error::InvalidConfig("backend_timeout_ms must be positive".into()));
        }
        if self.vector_store.index_name.trim().is_empty() {
            return Err(Error::InvalidConfig("vector_store.index_name must not be empty".into()));
        }
        if self.embedding.dimension == 0 {
            return Err(Error::InvalidConfig("embedding.dimension must be positive".into()));
        }
        if self.readiness.max_avg_response_secs.is_nan() || self.readiness.max_avg_response_secs <= 0.0 {
            return Err(Error::InvalidConfig("readiness.max_avg_response_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn fusion_params(&self) -> FusionParams {
        FusionParams { method: self.fusion_method, alpha: self.alpha, rrf_k: self.rrf_k }
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    /// LanceDB URI: a local directory or an object-store URL.
    pub uri: String,
    pub index_name: String,
    /// Passed to the store as storage options (object-store keys, tokens).
    pub credentials: BTreeMap<String, String>,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self { uri: "data/lancedb".to_string(), index_name: "policy_chunks".to_string(), credentials: BTreeMap::new() }
    }
}

impl fmt::Debug for VectorStoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorStoreConfig")
            .field("uri", &self.uri)
            .field("index_name", &self.index_name)
            .field("credentials", &self.credentials.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    /// OpenAI-compatible `/embeddings` endpoint.
    Http,
    /// Deterministic offline hashing embedder.
    Hash,
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Http,
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-ada-002".to_string(),
            api_key: None,
            dimension: 1536,
        }
    }
}

impl fmt::Debug for EmbeddingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingConfig")
            .field("provider", &self.provider)
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("dimension", &self.dimension)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached queries; 0 disables the cache.
    pub capacity: usize,
    /// Entry lifetime in seconds; 0 disables age expiry.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 256, ttl_secs: 3_600 }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_secs > 0).then(|| Duration::from_secs(self.ttl_secs))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    pub min_sample_size: u64,
    pub max_avg_response_secs: f64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self { min_sample_size: 5, max_avg_response_secs: 5.0 }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
