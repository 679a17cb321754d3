//! policydb-text
//!
//! BM25 lexical scoring over a preloaded policy corpus, backed by tantivy.
//! The corpus persists as a tantivy directory plus a versioned documents file;
//! when neither is usable a small built-in corpus takes its place.

pub mod corpus;
pub mod index;
pub mod tantivy_utils;

pub use index::{CorpusOrigin, LexicalIndex};
