//! Writes the lexical corpus artifacts from a JSON array of documents.
//!
//! `policydb-corpus [--config PATH] <documents.json>` stores the index under
//! the configured `cache_directory`.

use std::env;
use std::path::PathBuf;

use anyhow::Context;
use policydb_core::config::Config;
use policydb_core::types::DocumentChunk;
use policydb_text::LexicalIndex;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();

    let mut args: Vec<String> = env::args().skip(1).collect();
    let config = if args.first().map(String::as_str) == Some("--config") {
        if args.len() < 2 {
            anyhow::bail!("Usage: policydb-corpus [--config PATH] <documents.json>");
        }
        let path = PathBuf::from(args.remove(1));
        args.remove(0);
        Config::load_from(&path)?
    } else {
        Config::load()?
    };
    let input = args.first().map(PathBuf::from).context("Usage: policydb-corpus [--config PATH] <documents.json>")?;

    let raw = std::fs::read(&input).with_context(|| format!("Failed to read {}", input.display()))?;
    let documents: Vec<DocumentChunk> = serde_json::from_slice(&raw).with_context(|| format!("Failed to parse {}", input.display()))?;
    let engine = config.engine()?;

    let index = LexicalIndex::from_documents(documents)?;
    index.save(&engine.cache_directory)?;
    info!(docs = index.documents().len(), dir = %engine.cache_directory.display(), "corpus written");
    println!("Indexed {} documents into {}", index.documents().len(), engine.cache_directory.display());
    Ok(())
}
