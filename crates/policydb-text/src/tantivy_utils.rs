use tantivy::schema::{IndexRecordOption, Schema, TextFieldIndexing, TextOptions, INDEXED, STORED, STRING};
use tantivy::tokenizer::{LowerCaser, RemoveLongFilter, SimpleTokenizer, StopWordFilter, TextAnalyzer};
use tantivy::Index;

pub const ID_FIELD: &str = "id";
pub const ORDINAL_FIELD: &str = "ordinal";
pub const TEXT_FIELD: &str = "text";
pub const ANALYZER_NAME: &str = "policy_text";

pub const STOP_WORDS: &[&str] = &[
	"a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having",
];

pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	schema_builder.add_text_field(ID_FIELD, STRING | STORED);
	schema_builder.add_u64_field(ORDINAL_FIELD, INDEXED | STORED);
	// BM25 only needs term frequencies and field norms.
	let text_field_indexing = TextFieldIndexing::default().set_tokenizer(ANALYZER_NAME).set_index_option(IndexRecordOption::WithFreqs);
	let text_options = TextOptions::default().set_indexing_options(text_field_indexing);
	schema_builder.add_text_field(TEXT_FIELD, text_options);
	schema_builder.build()
}

pub fn policy_analyzer() -> TextAnalyzer {
	TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(RemoveLongFilter::limit(40))
		.filter(LowerCaser)
		.filter(StopWordFilter::remove(STOP_WORDS.iter().map(|s| (*s).to_string())))
		.build()
}

pub fn register_tokenizer(index: &Index) {
	index.tokenizers().register(ANALYZER_NAME, policy_analyzer());
}

/// Lowercased whitespace split, trimmed to alphanumeric edges. Used when the
/// analyzer is not available on an opened index.
pub fn naive_terms(text: &str) -> Vec<String> {
	text.split_whitespace()
		.map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
		.filter(|w| !w.is_empty())
		.collect()
}
