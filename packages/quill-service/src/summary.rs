use serde_json::{Value, json};

use quill_domain::DocumentStore;

use crate::{
	Providers,
	error::{Error, Result},
	event::{Event, EventSink},
};

const SUMMARY_INSTRUCTIONS: &str = "\
You are an analyst writing a grounded report.

Requirements:
- Cite every claim with bracketed numbers such as [1] or [2][3]; each number \
is the tag of a passage in the provided context.
- Use only information from the provided passages. Never invent facts and \
never cite a number that is not in the context.
- Write in Markdown with a clear structure.";

const EMPTY_CONTEXT_INSTRUCTIONS: &str = "\
You are an analyst answering a question for which the knowledge base \
returned nothing relevant. Say so plainly, suggest how the question could be \
rephrased, and keep it short. Do not cite any sources and do not invent \
facts.";

/// Streams a cited answer grounded in the finalized document store.
///
/// Fragments are forwarded the moment they arrive; nothing is buffered. A
/// mid-stream failure leaves the already-emitted fragments standing and
/// fails the stage.
pub struct SummarizationController<'a> {
	cfg: &'a quill_config::Config,
	providers: &'a Providers,
	sink: &'a EventSink,
}

impl<'a> SummarizationController<'a> {
	pub fn new(
		cfg: &'a quill_config::Config,
		providers: &'a Providers,
		sink: &'a EventSink,
	) -> Self {
		Self { cfg, providers, sink }
	}

	pub async fn run(&self, query: &str, store: &DocumentStore) -> Result<()> {
		let max_docs = self.cfg.pipeline.max_context_docs.map(|n| n as usize);
		let context = store.grounding_context(max_docs);
		let messages = build_messages(query, &context);
		let mut stream = self
			.providers
			.chat
			.stream(&self.cfg.providers.chat, &messages)
			.await
			.map_err(|err| Error::from_provider("chat", err))?;

		loop {
			match stream.next_fragment().await {
				Ok(Some(fragment)) => {
					self.sink.emit(Event::Content { content: fragment }).await?;
				},
				Ok(None) => break,
				Err(err) => return Err(Error::from_provider("chat", err)),
			}
		}

		Ok(())
	}
}

fn build_messages(query: &str, context: &str) -> Vec<Value> {
	if context.is_empty() {
		return vec![
			json!({ "role": "system", "content": EMPTY_CONTEXT_INSTRUCTIONS }),
			json!({
				"role": "user",
				"content": format!("Question: {query}\n\nNo passages were retrieved for this question."),
			}),
		];
	}

	vec![
		json!({ "role": "system", "content": SUMMARY_INSTRUCTIONS }),
		json!({
			"role": "user",
			"content": format!(
				"Question: {query}\n\nThe passages below were retrieved for this question, \
ordered by relevance:\n\n{context}\n\nAnswer the question using only these passages."
			),
		}),
	]
}
