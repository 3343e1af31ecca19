use futures::future::join_all;
use serde_json::{Value, json};

use quill_domain::{Document, DocumentStore};
use quill_providers::chat::{ChatTurn, ToolCall};
use quill_providers::search::SearchHit;

use crate::{
	Providers,
	error::{Error, Result},
	event::{Event, EventSink, StageId},
};

pub const SEARCH_TOOL_NAME: &str = "search_knowledge";

/// How many source names a tool result echoes back into the conversation.
const TOOL_RESULT_SOURCES: usize = 5;

const RETRIEVAL_INSTRUCTIONS: &str = "\
You are a retrieval planner. Your only task is to find the knowledge-base \
passages most relevant to the user's question.

Guidelines:
- Extract the core concepts of the question and search for each of them.
- Call search_knowledge several times with different keyword combinations; \
never repeat a query you already ran.
- Read the sources returned so far before deciding whether an angle is still \
missing.
- Once the question is covered, stop: reply without any tool calls. Do not \
write an answer.";

/// Runs the bounded multi-round retrieval loop for one request.
///
/// Each round asks the chat collaborator for search invocations, executes
/// them concurrently against the search collaborator, folds the hits into
/// the document store, and threads the results back into the conversation so
/// the next round can diversify. The loop ends when the model stops asking
/// for searches or the round bound is reached.
pub struct RetrievalController<'a> {
	cfg: &'a quill_config::Config,
	providers: &'a Providers,
	sink: &'a EventSink,
}

impl<'a> RetrievalController<'a> {
	pub fn new(
		cfg: &'a quill_config::Config,
		providers: &'a Providers,
		sink: &'a EventSink,
	) -> Self {
		Self { cfg, providers, sink }
	}

	pub async fn run(&self, query: &str) -> Result<DocumentStore> {
		let mut store = DocumentStore::new();
		let tools = vec![search_tool_schema(self.cfg.pipeline.result_bound)];
		let mut messages = vec![
			json!({ "role": "system", "content": RETRIEVAL_INSTRUCTIONS }),
			json!({
				"role": "user",
				"content": format!("Research the following question from multiple angles: {query}"),
			}),
		];

		for round in 1..=self.cfg.pipeline.max_rounds {
			let turn = self
				.providers
				.chat
				.complete(&self.cfg.providers.chat, &messages, &tools)
				.await
				.map_err(|err| Error::from_provider("chat", err))?;

			if turn.tool_calls.is_empty() {
				tracing::debug!(round, "Chat collaborator requested no further searches.");

				break;
			}

			messages.push(assistant_message(&turn));

			let calls = plan_round(&turn.tool_calls, self.cfg.pipeline.result_bound, round)?;

			// Declare every invocation of the round before any search runs.
			for call in &calls {
				self.sink
					.emit(Event::ToolCallStarted {
						stage: StageId::Retrieval,
						invocation_id: call.invocation_id.clone(),
						query: call.query.clone(),
						result_bound: call.result_bound,
					})
					.await?;
			}

			let outcomes = join_all(calls.iter().map(|call| self.execute(call))).await;

			for (call, outcome) in calls.iter().zip(outcomes) {
				match outcome {
					Ok(hits) => {
						let result_count = hits.len();
						let sources: Vec<String> = hits
							.iter()
							.take(TOOL_RESULT_SOURCES)
							.map(|hit| hit.source.clone())
							.collect();

						for hit in hits {
							store.add_document(Document::new(
								hit.content,
								hit.source,
								hit.chunk_key,
								hit.score,
								hit.doc_id,
								hit.doc_url,
							));
						}

						tracing::debug!(
							query = %call.query,
							result_count,
							stored = store.len(),
							"Search invocation succeeded."
						);
						self.sink
							.emit(Event::ToolCallEnded {
								stage: StageId::Retrieval,
								invocation_id: call.invocation_id.clone(),
								success: true,
								result_count,
							})
							.await?;
						messages.push(tool_message(
							&call.id,
							json!({
								"success": true,
								"result_count": result_count,
								"sources": sources,
							}),
						));
					},
					Err(message) => {
						tracing::warn!(query = %call.query, error = %message, "Search invocation failed.");
						self.sink
							.emit(Event::ToolCallEnded {
								stage: StageId::Retrieval,
								invocation_id: call.invocation_id.clone(),
								success: false,
								result_count: 0,
							})
							.await?;
						messages.push(tool_message(
							&call.id,
							json!({ "success": false, "error": message }),
						));
					},
				}
			}
		}

		tracing::info!(documents = store.len(), "Retrieval loop finished.");

		Ok(store)
	}

	// A single failed invocation is absorbed here; only emission failures
	// (client gone) propagate out of the round.
	async fn execute(&self, call: &PlannedCall) -> std::result::Result<Vec<SearchHit>, String> {
		if call.tool != SEARCH_TOOL_NAME {
			return Err(format!("Unknown tool: {}.", call.tool));
		}
		if call.query.trim().is_empty() {
			return Err("Search query is empty.".to_string());
		}

		self.providers
			.search
			.retrieve(&self.cfg.providers.search, &call.query, call.result_bound)
			.await
			.map_err(|err| err.to_string())
	}
}

#[derive(Debug)]
struct PlannedCall {
	/// The model's tool-call id, echoed back in the tool result message.
	id: String,
	tool: String,
	invocation_id: String,
	query: String,
	result_bound: u32,
}

fn plan_round(tool_calls: &[ToolCall], default_bound: u32, round: u32) -> Result<Vec<PlannedCall>> {
	tool_calls
		.iter()
		.enumerate()
		.map(|(slot, call)| {
			let arguments: Value =
				serde_json::from_str(&call.arguments).map_err(|_| Error::MalformedResponse {
					message: format!("Tool call {} carries arguments that are not valid JSON.", call.name),
				})?;
			let query = arguments
				.get("query")
				.and_then(|v| v.as_str())
				.unwrap_or_default()
				.to_string();
			let result_bound = arguments
				.get("result_bound")
				.and_then(|v| v.as_u64())
				.map(|v| v as u32)
				.unwrap_or(default_bound)
				.clamp(1, 20);

			Ok(PlannedCall {
				id: call.id.clone(),
				tool: call.name.clone(),
				invocation_id: invocation_id(round, slot, &query),
				query,
				result_bound,
			})
		})
		.collect()
}

// Deterministic per request position, so a declare and its matching change
// always carry the same id.
fn invocation_id(round: u32, slot: usize, query: &str) -> String {
	let digest = blake3::hash(format!("{round}:{slot}:{query}").as_bytes());

	format!("inv-{}", &digest.to_hex().as_str()[..8])
}

fn assistant_message(turn: &ChatTurn) -> Value {
	let tool_calls: Vec<Value> = turn
		.tool_calls
		.iter()
		.map(|call| {
			json!({
				"id": call.id,
				"type": "function",
				"function": { "name": call.name, "arguments": call.arguments },
			})
		})
		.collect();

	json!({ "role": "assistant", "content": turn.content, "tool_calls": tool_calls })
}

fn tool_message(tool_call_id: &str, result: Value) -> Value {
	json!({ "role": "tool", "tool_call_id": tool_call_id, "content": result.to_string() })
}

fn search_tool_schema(default_bound: u32) -> Value {
	json!({
		"type": "function",
		"function": {
			"name": SEARCH_TOOL_NAME,
			"description": "Search the knowledge base for passages relevant to a query. \
Call it several times with different keyword combinations to cover the question from \
multiple angles. Results carry a relevance score; higher is more relevant.",
			"parameters": {
				"type": "object",
				"properties": {
					"query": {
						"type": "string",
						"description": "Keywords, a question, or a topic to search for. \
Keep it short and specific.",
					},
					"result_bound": {
						"type": "integer",
						"description": "Number of passages to return (1-20).",
						"default": default_bound,
						"minimum": 1,
						"maximum": 20,
					},
				},
				"required": ["query"],
			},
		},
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	fn tool_call(id: &str, name: &str, arguments: &str) -> ToolCall {
		ToolCall { id: id.to_string(), name: name.to_string(), arguments: arguments.to_string() }
	}

	#[test]
	fn invocation_ids_are_deterministic_and_position_scoped() {
		let a = invocation_id(1, 0, "ai in finance");
		let b = invocation_id(1, 0, "ai in finance");
		let c = invocation_id(1, 1, "ai in finance");
		let d = invocation_id(2, 0, "ai in finance");

		assert_eq!(a, b);
		assert_ne!(a, c);
		assert_ne!(a, d);
		assert!(a.starts_with("inv-"));
	}

	#[test]
	fn plan_round_reads_query_and_clamps_bound() {
		let calls = [
			tool_call("c1", SEARCH_TOOL_NAME, r#"{"query": "fintech", "result_bound": 50}"#),
			tool_call("c2", SEARCH_TOOL_NAME, r#"{"query": "risk models"}"#),
		];
		let planned = plan_round(&calls, 5, 1).expect("plan failed");

		assert_eq!(planned[0].query, "fintech");
		assert_eq!(planned[0].result_bound, 20);
		assert_eq!(planned[1].result_bound, 5);
	}

	#[test]
	fn plan_round_keeps_unknown_tools_for_failure_reporting() {
		let calls = [tool_call("c1", "send_email", r#"{"query": "x"}"#)];
		let planned = plan_round(&calls, 5, 1).expect("plan failed");

		assert_eq!(planned[0].tool, "send_email");
	}

	#[test]
	fn plan_round_rejects_unparseable_arguments() {
		let calls = [tool_call("c1", SEARCH_TOOL_NAME, "{not json")];
		let err = plan_round(&calls, 5, 1).expect_err("Expected malformed arguments error.");

		assert!(matches!(err, Error::MalformedResponse { .. }));
	}

	#[test]
	fn tool_schema_names_the_search_tool() {
		let schema = search_tool_schema(5);

		assert_eq!(schema["function"]["name"], SEARCH_TOOL_NAME);
		assert_eq!(schema["function"]["parameters"]["required"][0], "query");
	}
}
