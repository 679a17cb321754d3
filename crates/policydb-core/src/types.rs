//! Domain types shared by the lexical index, the vector client, and the
//! hybrid engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

pub type ChunkId = String;
pub type Meta = BTreeMap<String, String>;

/// Metadata key holding the chunk text in results.
pub const CONTENT_KEY: &str = "content";
/// Alternate text key some vector stores use instead of `content`.
pub const TEXT_KEY: &str = "text";

/// One retrievable unit of policy text.
///
/// - `id`: globally unique chunk identifier
/// - `namespace`: partition label (e.g. "ev_policy", "excise")
/// - `content`: the text payload of the chunk
/// - `metadata`: free-form string attributes carried through to results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: ChunkId,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Meta,
}

fn default_namespace() -> String {
    "default".to_string()
}

impl DocumentChunk {
    pub fn new(id: impl Into<ChunkId>, namespace: impl Into<String>, content: impl Into<String>) -> Self {
        Self { id: id.into(), namespace: namespace.into(), content: content.into(), metadata: Meta::new() }
    }

    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Indicates which backend produced a candidate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Vector,
    Text,
}

/// A chunk's score from one backend.
///
/// `rank` is 1-based within the backend's list. `ordinal` is the chunk's
/// insertion position in the lexical corpus when known.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: ChunkId,
    pub source: SourceKind,
    pub score: f32,
    pub rank: usize,
    pub ordinal: Option<u64>,
}

/// One nearest neighbour as reported by a vector store.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    pub id: ChunkId,
    pub score: f32,
    pub namespace: String,
    pub metadata: Meta,
}

/// Provenance labels attached to a fused result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    Lexical,
    Vector,
    /// The vector backend was unavailable; the entry comes from lexical-only retrieval.
    Degraded,
}

impl From<SourceKind> for SourceTag {
    fn from(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Text => SourceTag::Lexical,
            SourceKind::Vector => SourceTag::Vector,
        }
    }
}

/// Final ranked entry returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedResult {
    #[serde(rename = "doc_id")]
    pub id: ChunkId,
    pub namespace: String,
    pub score: f32,
    pub metadata: Meta,
    #[serde(rename = "source_tags")]
    pub sources: Vec<SourceTag>,
}

impl FusedResult {
    pub fn content(&self) -> Option<&str> {
        self.metadata
            .get(CONTENT_KEY)
            .or_else(|| self.metadata.get(TEXT_KEY))
            .map(String::as_str)
    }

    pub fn is_degraded(&self) -> bool {
        self.sources.contains(&SourceTag::Degraded)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FusionMethod {
    /// Reciprocal rank fusion.
    #[default]
    Rrf,
    /// Min-max normalized weighted blend controlled by `alpha`.
    AlphaBlend,
}

impl fmt::Display for FusionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FusionMethod::Rrf => f.write_str("rrf"),
            FusionMethod::AlphaBlend => f.write_str("alpha_blend"),
        }
    }
}

impl FromStr for FusionMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rrf" => Ok(FusionMethod::Rrf),
            "alpha_blend" | "alpha" | "weighted" => Ok(FusionMethod::AlphaBlend),
            other => Err(Error::InvalidConfig(format!("unknown fusion method '{other}'"))),
        }
    }
}

pub const DEFAULT_RRF_K: f32 = 60.0;

/// Parameters that shape a fused ranking. Part of every cache key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionParams {
    pub method: FusionMethod,
    /// Vector weight under `AlphaBlend`, in [0,1].
    pub alpha: f32,
    pub rrf_k: f32,
}

impl FusionParams {
    pub fn rrf() -> Self {
        Self { method: FusionMethod::Rrf, alpha: 0.5, rrf_k: DEFAULT_RRF_K }
    }

    pub fn alpha_blend(alpha: f32) -> Self {
        Self { method: FusionMethod::AlphaBlend, alpha: alpha.clamp(0.0, 1.0), rrf_k: DEFAULT_RRF_K }
    }
}

impl Default for FusionParams {
    fn default() -> Self {
        Self::rrf()
    }
}
