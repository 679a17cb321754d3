use anyhow::{Context, Result};
use arrow_array::{Array, Float32Array, RecordBatch, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, DistanceType, Table};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use policydb_core::config::VectorStoreConfig;
use policydb_core::traits::VectorStore;
use policydb_core::types::{Meta, VectorMatch, CONTENT_KEY};

use crate::schema::{missing_required_columns, CONTENT_COLUMN, DISTANCE_COLUMN, ID_COLUMN, METADATA_COLUMN, NAMESPACE_COLUMN};

/// Nearest-neighbour queries against one LanceDB table, cosine distance.
///
/// The table is opened on first use and kept; a failed open is retried by the
/// next query.
pub struct LanceVectorStore {
	cfg: VectorStoreConfig,
	table: OnceCell<Table>,
}

impl LanceVectorStore {
	pub fn new(cfg: VectorStoreConfig) -> Self {
		Self { cfg, table: OnceCell::new() }
	}

	/// Like [`LanceVectorStore::new`] but connects immediately.
	pub async fn open(cfg: &VectorStoreConfig) -> Result<Self> {
		let store = Self::new(cfg.clone());
		store.table().await?;
		Ok(store)
	}

	async fn table(&self) -> Result<&Table> {
		self.table.get_or_try_init(|| open_table(&self.cfg)).await
	}
}

/// Credentials become LanceDB storage options.
async fn open_table(cfg: &VectorStoreConfig) -> Result<Table> {
	let mut builder = connect(&cfg.uri);
	for (key, value) in &cfg.credentials {
		builder = builder.storage_option(key, value);
	}
	let db = builder.execute().await.with_context(|| format!("Failed to connect to vector store at {}", cfg.uri))?;
	let table = db
		.open_table(&cfg.index_name)
		.execute()
		.await
		.with_context(|| format!("Failed to open vector index '{}'", cfg.index_name))?;
	let schema = table.schema().await?;
	let missing = missing_required_columns(&schema);
	if !missing.is_empty() {
		anyhow::bail!("vector index '{}' lacks columns {:?}", cfg.index_name, missing);
	}
	info!(uri = %cfg.uri, index = %cfg.index_name, "opened vector store");
	Ok(table)
}

#[async_trait]
impl VectorStore for LanceVectorStore {
	async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorMatch>> {
		if top_k == 0 {
			return Ok(Vec::new());
		}
		let mut stream = self
			.table()
			.await?
			.vector_search(vector.to_vec())?
			.distance_type(DistanceType::Cosine)
			.limit(top_k)
			.execute()
			.await?;
		let mut matches = Vec::new();
		while let Some(batch) = stream.try_next().await? {
			matches.extend(batch_matches(&batch)?);
		}
		debug!(top_k, hits = matches.len(), "vector store query");
		Ok(matches)
	}
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a StringArray> {
	batch.column_by_name(name).and_then(|c| c.as_any().downcast_ref::<StringArray>())
}

fn string_at(col: Option<&StringArray>, i: usize) -> Option<String> {
	col.filter(|c| !c.is_null(i)).map(|c| c.value(i).to_string())
}

/// Flattens a JSON object into string metadata; non-string values keep their JSON text.
fn parse_metadata(raw: &str) -> Meta {
	match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(raw) {
		Ok(obj) => obj
			.into_iter()
			.map(|(k, v)| match v {
				serde_json::Value::String(s) => (k, s),
				other => (k, other.to_string()),
			})
			.collect(),
		Err(_) => Meta::new(),
	}
}

fn batch_matches(batch: &RecordBatch) -> Result<Vec<VectorMatch>> {
	let ids = string_column(batch, ID_COLUMN).ok_or_else(|| anyhow::anyhow!("result batch has no '{ID_COLUMN}' column"))?;
	let distances = batch
		.column_by_name(DISTANCE_COLUMN)
		.and_then(|c| c.as_any().downcast_ref::<Float32Array>())
		.ok_or_else(|| anyhow::anyhow!("result batch has no '{DISTANCE_COLUMN}' column"))?;
	let namespaces = string_column(batch, NAMESPACE_COLUMN);
	let contents = string_column(batch, CONTENT_COLUMN);
	let metadata = string_column(batch, METADATA_COLUMN);

	let mut out = Vec::with_capacity(batch.num_rows());
	for i in 0..batch.num_rows() {
		if ids.is_null(i) || distances.is_null(i) {
			continue;
		}
		let mut meta = string_at(metadata, i).map(|raw| parse_metadata(&raw)).unwrap_or_default();
		if let Some(content) = string_at(contents, i) {
			meta.insert(CONTENT_KEY.to_string(), content);
		}
		out.push(VectorMatch {
			id: ids.value(i).to_string(),
			score: 1.0 - distances.value(i),
			namespace: string_at(namespaces, i).unwrap_or_default(),
			metadata: meta,
		});
	}
	Ok(out)
}
