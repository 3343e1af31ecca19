use serde::Serialize;
use serde_json::{Value, json};

use crate::event::{Event, StageId};

const MODE: &str = "plan-executor";
const RETRIEVAL_EXECUTOR: &str = "retrieval-agent";
const REFERENCES_ARTIFACT_ID: &str = "references-001";

/// One message as it goes on the event stream.
#[derive(Debug, Clone, Serialize)]
pub struct WireMessage {
	pub event_type: &'static str,
	pub context: Context,
	pub messages: Vec<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Context {
	pub mode: &'static str,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stage_id: Option<&'static str>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub invocation_id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub executor: Option<&'static str>,
}

impl Context {
	fn bare() -> Self {
		Self { mode: MODE, stage_id: None, invocation_id: None, executor: None }
	}

	fn stage(stage: StageId) -> Self {
		Self { stage_id: Some(stage.as_str()), ..Self::bare() }
	}

	fn invocation(stage: StageId, invocation_id: &str) -> Self {
		Self {
			invocation_id: Some(invocation_id.to_string()),
			executor: Some(RETRIEVAL_EXECUTOR),
			..Self::stage(stage)
		}
	}
}

/// Maps an internal event onto the wire format.
///
/// Pure per event; ordering is inherited from the event channel, so a
/// message can never overtake or revise an earlier one.
pub fn encode(event: &Event) -> WireMessage {
	match event {
		Event::StagesDeclared { stages } => WireMessage {
			event_type: "PLAN_DECLARED",
			context: Context::bare(),
			messages: stages
				.iter()
				.map(|stage| {
					json!({
						"stage_id": stage.id.as_str(),
						"stage_name": stage.id.display_name(),
						"status": stage.status.as_str(),
					})
				})
				.collect(),
		},
		Event::StageChanged { stage, status } => WireMessage {
			event_type: "PLAN_CHANGE",
			context: Context::bare(),
			messages: vec![json!({
				"change_type": "STATUS_CHANGE",
				"stage_id": stage.as_str(),
				"status": status.as_str(),
			})],
		},
		Event::ToolCallStarted { stage, invocation_id, query, result_bound } => WireMessage {
			event_type: "INVOCATION_DECLARED",
			context: Context::invocation(*stage, invocation_id),
			messages: vec![json!({
				"name": format!("Searching the knowledge base: {query}"),
				"invocation_type": "search",
				"query": query,
				"result_bound": result_bound,
			})],
		},
		Event::ToolCallEnded { stage, invocation_id, success, result_count } => WireMessage {
			event_type: "INVOCATION_CHANGE",
			context: Context::invocation(*stage, invocation_id),
			messages: vec![
				json!({
					"change_type": "STATUS_CHANGE",
					"status": if *success { "COMPLETED" } else { "FAILED" },
				}),
				json!({
					"change_type": "CONTENT_APPEND",
					"content": json!({
						"success": success,
						"result_count": result_count,
					})
					.to_string(),
				}),
			],
		},
		Event::Content { content } => WireMessage {
			event_type: "STREAM_CONTENT",
			context: Context::stage(StageId::Summary),
			messages: vec![json!({ "content": content })],
		},
		Event::References { references } => WireMessage {
			event_type: "ARTIFACT",
			context: Context::stage(StageId::Summary),
			messages: vec![json!({
				"artifact_id": REFERENCES_ARTIFACT_ID,
				"artifact_name": "References",
				"artifact_type": "reference_list",
				"references": references,
			})],
		},
		Event::Completed => WireMessage {
			event_type: "END",
			context: Context::bare(),
			messages: Vec::new(),
		},
		Event::Failed { message } => WireMessage {
			event_type: "ERROR",
			context: Context::bare(),
			messages: vec![json!({ "message": message })],
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::event::{Stage, StageStatus};

	#[test]
	fn plan_declared_lists_every_stage_as_pending() {
		let stages = StageId::ALL
			.map(|id| Stage { id, status: StageStatus::Pending })
			.to_vec();
		let message = encode(&Event::StagesDeclared { stages });

		assert_eq!(message.event_type, "PLAN_DECLARED");
		assert_eq!(message.messages.len(), 3);
		assert_eq!(message.messages[0]["stage_id"], "planning");
		assert_eq!(message.messages[1]["stage_id"], "retrieval");
		assert_eq!(message.messages[2]["stage_id"], "summary");
		assert!(message.messages.iter().all(|m| m["status"] == "PENDING"));
	}

	#[test]
	fn stage_change_carries_id_and_status() {
		let message = encode(&Event::StageChanged {
			stage: StageId::Retrieval,
			status: StageStatus::Running,
		});

		assert_eq!(message.event_type, "PLAN_CHANGE");
		assert_eq!(message.messages[0]["stage_id"], "retrieval");
		assert_eq!(message.messages[0]["status"], "RUNNING");
	}

	#[test]
	fn tool_call_end_reports_failure_and_count() {
		let message = encode(&Event::ToolCallEnded {
			stage: StageId::Retrieval,
			invocation_id: "inv-deadbeef".to_string(),
			success: false,
			result_count: 0,
		});

		assert_eq!(message.event_type, "INVOCATION_CHANGE");
		assert_eq!(message.context.invocation_id.as_deref(), Some("inv-deadbeef"));
		assert_eq!(message.messages[0]["status"], "FAILED");

		let content = message.messages[1]["content"].as_str().expect("Expected content string.");

		assert!(content.contains("\"success\":false"));
	}

	#[test]
	fn error_terminal_carries_the_message() {
		let message = encode(&Event::Failed { message: "chat collaborator timed out".to_string() });

		assert_eq!(message.event_type, "ERROR");
		assert_eq!(message.messages[0]["message"], "chat collaborator timed out");
	}

	#[test]
	fn context_omits_absent_fields_on_the_wire() {
		let message = encode(&Event::Completed);
		let raw = serde_json::to_string(&message).expect("Failed to serialize.");

		assert_eq!(raw, r#"{"event_type":"END","context":{"mode":"plan-executor"},"messages":[]}"#);
	}
}
