//! Vector side of retrieval: a LanceDB-backed store and the client that
//! embeds queries and bounds each lookup with a timeout.

pub mod client;
pub mod schema;
pub mod store;

pub use client::{ranked_candidates, VectorSearchClient};
pub use store::LanceVectorStore;
