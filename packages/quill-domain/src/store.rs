use std::collections::HashSet;

use serde::Serialize;

/// Character budget for reference previews.
const PREVIEW_CHARS: usize = 100;

/// One retrieved passage.
///
/// `content_key` is the dedup identity: the search collaborator's chunk key
/// when it provides one, else a hash of the passage text. `doc_id` groups
/// chunks of the same origin document and must not be used for dedup —
/// distinct chunks of one document are distinct passages.
#[derive(Debug, Clone)]
pub struct Document {
	pub content: String,
	pub source: String,
	pub content_key: String,
	pub score: f32,
	pub doc_id: String,
	pub doc_url: Option<String>,
	/// 1-based citation number, assigned by [`DocumentStore::finalize`].
	pub reference_index: Option<u32>,
}

impl Document {
	pub fn new(
		content: String,
		source: String,
		chunk_key: Option<String>,
		score: f32,
		doc_id: String,
		doc_url: Option<String>,
	) -> Self {
		let content_key = match chunk_key.filter(|key| !key.trim().is_empty()) {
			Some(key) => key,
			None => blake3::hash(content.as_bytes()).to_hex().to_string(),
		};

		Self { content, source, content_key, score, doc_id, doc_url, reference_index: None }
	}
}

/// Externally visible entry of the reference list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reference {
	pub id: u32,
	pub source: String,
	pub preview: String,
	pub score: f32,
	pub doc_id: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub doc_url: Option<String>,
}

/// Per-request owner of the retrieved document set.
///
/// Lifecycle: filled by [`add_document`](Self::add_document) during
/// retrieval, ranked once by [`finalize`](Self::finalize) at the
/// retrieval/summarization boundary, read-only afterward.
#[derive(Debug, Default)]
pub struct DocumentStore {
	documents: Vec<Document>,
	seen_keys: HashSet<String>,
	finalized: bool,
}

impl DocumentStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends a document unless its `content_key` was already stored.
	///
	/// First write wins: a duplicate never replaces the stored document, not
	/// even with a better score. Returns whether the document was kept.
	pub fn add_document(&mut self, doc: Document) -> bool {
		if self.seen_keys.contains(&doc.content_key) {
			return false;
		}

		self.seen_keys.insert(doc.content_key.clone());
		self.documents.push(doc);

		true
	}

	pub fn len(&self) -> usize {
		self.documents.len()
	}

	pub fn is_empty(&self) -> bool {
		self.documents.is_empty()
	}

	pub fn is_finalized(&self) -> bool {
		self.finalized
	}

	pub fn documents(&self) -> &[Document] {
		&self.documents
	}

	/// Ranks the set and assigns citation numbers.
	///
	/// Stable sort, score descending: equal-score documents keep their
	/// insertion order, which is what makes citation numbering reproducible
	/// across retrieval rounds. `reference_index` becomes the 1-based
	/// position after the sort. Idempotent.
	pub fn finalize(&mut self) {
		self.documents.sort_by(|a, b| b.score.total_cmp(&a.score));

		for (position, doc) in self.documents.iter_mut().enumerate() {
			doc.reference_index = Some(position as u32 + 1);
		}

		self.finalized = true;
	}

	/// Ordered text block handed to the summarizer, one entry per document
	/// tagged with its citation number. Meaningful only after
	/// [`finalize`](Self::finalize); empty string for an empty store.
	pub fn grounding_context(&self, max_docs: Option<usize>) -> String {
		let entries: Vec<String> = self
			.capped(max_docs)
			.iter()
			.map(|doc| {
				let index = doc.reference_index.unwrap_or_default();

				format!("[{index}] Source: {}\nContent: {}", doc.source, doc.content)
			})
			.collect();

		entries.join("\n\n")
	}

	/// The reference list shown to the client, in ranked order.
	///
	/// `max_docs` must match the cap passed to
	/// [`grounding_context`](Self::grounding_context) so bracketed citations
	/// in the generated answer always resolve against this list.
	pub fn references(&self, max_docs: Option<usize>) -> Vec<Reference> {
		self.capped(max_docs)
			.iter()
			.map(|doc| Reference {
				id: doc.reference_index.unwrap_or_default(),
				source: doc.source.clone(),
				preview: preview(&doc.content),
				score: doc.score,
				doc_id: doc.doc_id.clone(),
				doc_url: doc.doc_url.clone(),
			})
			.collect()
	}

	fn capped(&self, max_docs: Option<usize>) -> &[Document] {
		match max_docs {
			Some(max) => &self.documents[..self.documents.len().min(max)],
			None => &self.documents,
		}
	}
}

fn preview(content: &str) -> String {
	let mut chars = content.chars();
	let mut out: String = chars.by_ref().take(PREVIEW_CHARS).collect();

	if chars.next().is_some() {
		out.push_str("...");
	}

	out
}
