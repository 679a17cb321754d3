use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tantivy::collector::TopDocs;
use tantivy::query::{AllQuery, BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Value};
use tantivy::tokenizer::TextAnalyzer;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tracing::{debug, info, warn};

use policydb_core::error::Error;
use policydb_core::traits::LexicalSearch;
use policydb_core::types::{Candidate, DocumentChunk, SourceKind};

use crate::corpus::{documents_path, fallback_documents, lexical_dir, load_documents, save_documents};
use crate::tantivy_utils::{build_schema, naive_terms, register_tokenizer, ANALYZER_NAME, ID_FIELD, ORDINAL_FIELD, TEXT_FIELD};

const WRITER_MEMORY: usize = 50_000_000;

/// Where the documents of a [`LexicalIndex`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorpusOrigin {
	Persisted,
	BuiltinFallback,
	InMemory,
}

/// BM25 scorer over a fixed corpus. Read-only once built.
pub struct LexicalIndex {
	reader: IndexReader,
	id_field: Field,
	ordinal_field: Field,
	text_field: Field,
	analyzer: Option<TextAnalyzer>,
	documents: Vec<DocumentChunk>,
	positions: HashMap<String, usize>,
	origin: CorpusOrigin,
}

impl LexicalIndex {
	pub fn from_documents(documents: Vec<DocumentChunk>) -> Result<Self> {
		Self::build_in_ram(documents, CorpusOrigin::InMemory)
	}

	pub fn builtin_fallback() -> Result<Self> {
		Self::build_in_ram(fallback_documents(), CorpusOrigin::BuiltinFallback)
	}

	/// Opens the artifacts under `cache_dir`, checking that the documents file
	/// and the tantivy index describe the same corpus.
	pub fn load(cache_dir: &Path) -> policydb_core::Result<Self> {
		Self::load_inner(cache_dir).map_err(|e| Error::corpus(format!("{}: {e:#}", cache_dir.display())))
	}

	pub fn load_or_fallback(cache_dir: &Path) -> Result<Self> {
		match Self::load(cache_dir) {
			Ok(index) => Ok(index),
			Err(e) => {
				warn!(error = %e, "lexical corpus unavailable; using built-in fallback corpus");
				Self::builtin_fallback()
			}
		}
	}

	/// Writes both artifacts, replacing whatever was under `cache_dir`.
	pub fn save(&self, cache_dir: &Path) -> Result<()> {
		let dir = lexical_dir(cache_dir);
		if dir.exists() {
			std::fs::remove_dir_all(&dir)?;
		}
		std::fs::create_dir_all(&dir)?;
		let index = Index::create_in_dir(&dir, build_schema())?;
		register_tokenizer(&index);
		write_documents(&index, &self.documents)?;
		save_documents(&documents_path(cache_dir), &self.documents)?;
		info!(docs = self.documents.len(), dir = %cache_dir.display(), "saved lexical corpus");
		Ok(())
	}

	pub fn origin(&self) -> CorpusOrigin {
		self.origin
	}

	pub fn documents(&self) -> &[DocumentChunk] {
		&self.documents
	}

	fn build_in_ram(documents: Vec<DocumentChunk>, origin: CorpusOrigin) -> Result<Self> {
		let index = Index::create_in_ram(build_schema());
		register_tokenizer(&index);
		write_documents(&index, &documents)?;
		Self::assemble(index, documents, origin)
	}

	fn load_inner(cache_dir: &Path) -> Result<Self> {
		let documents = load_documents(&documents_path(cache_dir))?;
		let index = Index::open_in_dir(lexical_dir(cache_dir))?;
		register_tokenizer(&index);
		let loaded = Self::assemble(index, documents, CorpusOrigin::Persisted)?;
		loaded.verify_alignment()?;
		info!(docs = loaded.documents.len(), dir = %cache_dir.display(), "loaded lexical corpus");
		Ok(loaded)
	}

	fn assemble(index: Index, documents: Vec<DocumentChunk>, origin: CorpusOrigin) -> Result<Self> {
		let mut positions = HashMap::with_capacity(documents.len());
		for (i, d) in documents.iter().enumerate() {
			if positions.insert(d.id.clone(), i).is_some() {
				anyhow::bail!("duplicate document id '{}'", d.id);
			}
		}
		let schema = index.schema();
		let id_field = schema.get_field(ID_FIELD)?;
		let ordinal_field = schema.get_field(ORDINAL_FIELD)?;
		let text_field = schema.get_field(TEXT_FIELD)?;
		let analyzer = index.tokenizers().get(ANALYZER_NAME);
		if analyzer.is_none() {
			warn!(analyzer = ANALYZER_NAME, "analyzer not registered; falling back to whitespace tokens");
		}
		let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;
		Ok(Self { reader, id_field, ordinal_field, text_field, analyzer, documents, positions, origin })
	}

	/// Every stored ordinal must point at the document with the same id.
	fn verify_alignment(&self) -> Result<()> {
		let searcher = self.reader.searcher();
		let n = self.documents.len();
		let indexed = usize::try_from(searcher.num_docs())?;
		if indexed != n {
			anyhow::bail!("index holds {indexed} documents, documents file holds {n}");
		}
		if n == 0 {
			return Ok(());
		}
		let mut seen = HashSet::with_capacity(n);
		for (_, addr) in searcher.search(&AllQuery, &TopDocs::with_limit(n))? {
			let doc: TantivyDocument = searcher.doc(addr)?;
			let ordinal = doc
				.get_first(self.ordinal_field)
				.and_then(|v| v.as_u64())
				.ok_or_else(|| anyhow::anyhow!("indexed document without ordinal"))?;
			let id = doc.get_first(self.id_field).and_then(|v| v.as_str()).unwrap_or_default();
			let expected = usize::try_from(ordinal).ok().and_then(|i| self.documents.get(i));
			match expected {
				Some(d) if d.id == id && seen.insert(ordinal) => {}
				_ => anyhow::bail!("ordinal {ordinal} (id '{id}') does not match the documents file"),
			}
		}
		Ok(())
	}

	fn query_terms(&self, query: &str) -> Vec<String> {
		let Some(analyzer) = &self.analyzer else {
			return naive_terms(query);
		};
		let mut analyzer = analyzer.clone();
		let mut stream = analyzer.token_stream(query);
		let mut terms = Vec::new();
		while stream.advance() {
			terms.push(stream.token().text.clone());
		}
		terms
	}
}

fn write_documents(index: &Index, documents: &[DocumentChunk]) -> Result<()> {
	let schema = index.schema();
	let id_field = schema.get_field(ID_FIELD)?;
	let ordinal_field = schema.get_field(ORDINAL_FIELD)?;
	let text_field = schema.get_field(TEXT_FIELD)?;
	let mut writer: IndexWriter = index.writer_with_num_threads(1, WRITER_MEMORY)?;
	for (ordinal, d) in (0u64..).zip(documents) {
		writer.add_document(doc!(
			id_field => d.id.clone(),
			ordinal_field => ordinal,
			text_field => d.content.clone(),
		))?;
	}
	writer.commit()?;
	Ok(())
}

impl LexicalSearch for LexicalIndex {
	fn score(&self, query: &str) -> Result<Vec<Candidate>> {
		let terms = self.query_terms(query);
		if terms.is_empty() || self.documents.is_empty() {
			return Ok(Vec::new());
		}
		let clauses: Vec<(Occur, Box<dyn Query>)> = terms
			.iter()
			.map(|t| {
				let q: Box<dyn Query> = Box::new(TermQuery::new(Term::from_field_text(self.text_field, t), IndexRecordOption::WithFreqs));
				(Occur::Should, q)
			})
			.collect();
		let query = BooleanQuery::new(clauses);

		let searcher = self.reader.searcher();
		let mut scored = Vec::new();
		for (score, addr) in searcher.search(&query, &TopDocs::with_limit(self.documents.len()))? {
			if score <= 0.0 {
				continue;
			}
			let doc: TantivyDocument = searcher.doc(addr)?;
			let Some(ordinal) = doc.get_first(self.ordinal_field).and_then(|v| v.as_u64()) else {
				continue;
			};
			let Some(d) = usize::try_from(ordinal).ok().and_then(|i| self.documents.get(i)) else {
				continue;
			};
			scored.push((d.id.clone(), score, ordinal));
		}
		scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.2.cmp(&b.2)));
		debug!(terms = terms.len(), hits = scored.len(), "lexical scoring");

		Ok(scored
			.into_iter()
			.enumerate()
			.map(|(i, (id, score, ordinal))| Candidate { id, source: SourceKind::Text, score, rank: i + 1, ordinal: Some(ordinal) })
			.collect())
	}

	fn document(&self, id: &str) -> Option<&DocumentChunk> {
		self.positions.get(id).and_then(|&i| self.documents.get(i))
	}

	fn ordinal(&self, id: &str) -> Option<u64> {
		self.positions.get(id).and_then(|&i| u64::try_from(i).ok())
	}

	fn len(&self) -> usize {
		self.documents.len()
	}
}
