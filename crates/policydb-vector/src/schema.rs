use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

pub const ID_COLUMN: &str = "id";
pub const NAMESPACE_COLUMN: &str = "namespace";
pub const CONTENT_COLUMN: &str = "content";
/// JSON object serialized as a string.
pub const METADATA_COLUMN: &str = "metadata";
pub const VECTOR_COLUMN: &str = "vector";
/// Added by LanceDB to vector search results.
pub const DISTANCE_COLUMN: &str = "_distance";

/// Layout of a chunk table the store can query.
pub fn chunk_table_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new(ID_COLUMN, DataType::Utf8, false),
		Field::new(NAMESPACE_COLUMN, DataType::Utf8, true),
		Field::new(CONTENT_COLUMN, DataType::Utf8, true),
		Field::new(METADATA_COLUMN, DataType::Utf8, true),
		Field::new(VECTOR_COLUMN, DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
	]))
}

/// Columns a table must have before it can answer queries.
pub fn missing_required_columns(schema: &Schema) -> Vec<&'static str> {
	[ID_COLUMN, VECTOR_COLUMN].into_iter().filter(|c| schema.field_with_name(c).is_err()).collect()
}
