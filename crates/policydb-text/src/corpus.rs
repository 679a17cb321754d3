//! The document list persisted next to the lexical index, and the built-in
//! corpus used when nothing valid is on disk.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use policydb_core::types::DocumentChunk;

pub const DOCUMENTS_SCHEMA_VERSION: u32 = 1;
pub const DOCUMENTS_FILE: &str = "documents.json";
pub const LEXICAL_DIR: &str = "lexical";
pub const FALLBACK_NAMESPACE: &str = "fallback";

const FALLBACK_TEXTS: [&str; 3] = [
    "Chandigarh policy documents",
    "EV policy information",
    "Industrial policy details",
];

#[derive(Debug, Serialize, Deserialize)]
struct PersistedDocuments {
    schema_version: u32,
    documents: Vec<DocumentChunk>,
}

#[must_use]
pub fn documents_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join(DOCUMENTS_FILE)
}

#[must_use]
pub fn lexical_dir(cache_dir: &Path) -> PathBuf {
    cache_dir.join(LEXICAL_DIR)
}

pub fn load_documents(path: &Path) -> Result<Vec<DocumentChunk>> {
    let bytes = std::fs::read(path)
        .map_err(|e| anyhow::anyhow!("cannot read {}: {e}", path.display()))?;
    let persisted: PersistedDocuments = serde_json::from_slice(&bytes)?;
    if persisted.schema_version != DOCUMENTS_SCHEMA_VERSION {
        anyhow::bail!(
            "Unsupported documents schema_version {} (expected {DOCUMENTS_SCHEMA_VERSION})",
            persisted.schema_version
        );
    }
    Ok(persisted.documents)
}

pub fn save_documents(path: &Path, documents: &[DocumentChunk]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let persisted = PersistedDocuments {
        schema_version: DOCUMENTS_SCHEMA_VERSION,
        documents: documents.to_vec(),
    };
    let bytes = serde_json::to_vec_pretty(&persisted)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[must_use]
pub fn fallback_documents() -> Vec<DocumentChunk> {
    FALLBACK_TEXTS
        .iter()
        .enumerate()
        .map(|(i, text)| DocumentChunk::new(format!("fallback-{i}"), FALLBACK_NAMESPACE, *text))
        .collect()
}
