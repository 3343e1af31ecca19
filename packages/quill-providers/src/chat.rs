use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::{Error, Result};

/// One tool invocation requested by the model. `arguments` is the raw JSON
/// string exactly as the model produced it.
#[derive(Debug, Clone)]
pub struct ToolCall {
	pub id: String,
	pub name: String,
	pub arguments: String,
}

/// A non-streaming completion turn: either assistant text, tool calls, or
/// both.
#[derive(Debug, Clone, Default)]
pub struct ChatTurn {
	pub content: Option<String>,
	pub tool_calls: Vec<ToolCall>,
}

pub async fn complete(
	cfg: &quill_config::ChatProviderConfig,
	messages: &[Value],
	tools: &[Value],
) -> Result<ChatTurn> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let mut body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"messages": messages,
		"stream": false,
	});

	if !tools.is_empty() {
		body["tools"] = Value::Array(tools.to_vec());
	}

	let res = client
		.post(&url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_chat_turn(json)
}

pub async fn stream(
	cfg: &quill_config::ChatProviderConfig,
	messages: &[Value],
) -> Result<CompletionStream> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"messages": messages,
		"stream": true,
	});
	let res = client
		.post(&url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;

	Ok(CompletionStream { response: res.error_for_status()?, buffer: Vec::new(), done: false })
}

/// Incremental reader over an OpenAI-style completion stream.
///
/// Pulls raw chunks off the HTTP response, reassembles `data:` events across
/// chunk boundaries, and yields content fragments in arrival order.
pub struct CompletionStream {
	response: reqwest::Response,
	buffer: Vec<u8>,
	done: bool,
}

impl CompletionStream {
	/// The next content fragment, or `None` once the stream is over.
	pub async fn next_fragment(&mut self) -> Result<Option<String>> {
		loop {
			if self.done {
				return Ok(None);
			}

			if let Some(payload) = take_event(&mut self.buffer)? {
				match parse_stream_payload(&payload)? {
					StreamDelta::Content(fragment) => return Ok(Some(fragment)),
					StreamDelta::Done => {
						self.done = true;

						return Ok(None);
					},
					StreamDelta::Empty => continue,
				}
			}

			match self.response.chunk().await? {
				Some(bytes) => self.buffer.extend_from_slice(&bytes),
				None => {
					self.done = true;

					return Ok(None);
				},
			}
		}
	}
}

#[derive(Debug, PartialEq)]
enum StreamDelta {
	Content(String),
	Done,
	Empty,
}

// Pops the next complete `\n\n`-terminated event off the buffer and returns
// its joined `data:` payload. `None` means more bytes are needed.
fn take_event(buffer: &mut Vec<u8>) -> Result<Option<String>> {
	let Some(position) = buffer.windows(2).position(|window| window == b"\n\n") else {
		return Ok(None);
	};
	let event: Vec<u8> = buffer.drain(..position + 2).collect();
	let text = std::str::from_utf8(&event).map_err(|_| Error::InvalidResponse {
		message: "Stream chunk is not valid UTF-8.".to_string(),
	})?;
	let mut data = String::new();

	for line in text.lines() {
		let line = line.trim_end_matches('\r');

		if let Some(rest) = line.strip_prefix("data:") {
			if !data.is_empty() {
				data.push('\n');
			}

			data.push_str(rest.trim_start());
		}
	}

	Ok(Some(data))
}

fn parse_stream_payload(payload: &str) -> Result<StreamDelta> {
	let payload = payload.trim();

	if payload.is_empty() {
		return Ok(StreamDelta::Empty);
	}
	if payload == "[DONE]" {
		return Ok(StreamDelta::Done);
	}

	let json: Value = serde_json::from_str(payload).map_err(|_| Error::InvalidResponse {
		message: "Stream chunk is not valid JSON.".to_string(),
	})?;
	let content = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("delta"))
		.and_then(|delta| delta.get("content"))
		.and_then(|c| c.as_str());

	match content {
		Some(text) if !text.is_empty() => Ok(StreamDelta::Content(text.to_string())),
		_ => Ok(StreamDelta::Empty),
	}
}

fn parse_chat_turn(json: Value) -> Result<ChatTurn> {
	let message = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.ok_or_else(|| Error::InvalidResponse {
			message: "Chat response is missing choices[0].message.".to_string(),
		})?;
	let content = message
		.get("content")
		.and_then(|v| v.as_str())
		.filter(|text| !text.is_empty())
		.map(str::to_string);
	let mut tool_calls = Vec::new();

	if let Some(calls) = message.get("tool_calls").and_then(|v| v.as_array()) {
		for call in calls {
			let id = call
				.get("id")
				.and_then(|v| v.as_str())
				.ok_or_else(|| Error::InvalidResponse {
					message: "Tool call is missing an id.".to_string(),
				})?
				.to_string();
			let function = call.get("function").ok_or_else(|| Error::InvalidResponse {
				message: "Tool call is missing a function object.".to_string(),
			})?;
			let name = function
				.get("name")
				.and_then(|v| v.as_str())
				.ok_or_else(|| Error::InvalidResponse {
					message: "Tool call is missing a function name.".to_string(),
				})?
				.to_string();
			let arguments =
				function.get("arguments").and_then(|v| v.as_str()).unwrap_or("{}").to_string();

			tool_calls.push(ToolCall { id, name, arguments });
		}
	}

	Ok(ChatTurn { content, tool_calls })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_tool_calls() {
		let json = serde_json::json!({
			"choices": [{
				"message": {
					"content": null,
					"tool_calls": [{
						"id": "call_1",
						"type": "function",
						"function": {
							"name": "search_knowledge",
							"arguments": "{\"query\": \"ai in finance\"}"
						}
					}]
				}
			}]
		});
		let turn = parse_chat_turn(json).expect("parse failed");

		assert!(turn.content.is_none());
		assert_eq!(turn.tool_calls.len(), 1);
		assert_eq!(turn.tool_calls[0].id, "call_1");
		assert_eq!(turn.tool_calls[0].name, "search_knowledge");
		assert!(turn.tool_calls[0].arguments.contains("ai in finance"));
	}

	#[test]
	fn parses_plain_content_turn() {
		let json = serde_json::json!({
			"choices": [{ "message": { "content": "done searching" } }]
		});
		let turn = parse_chat_turn(json).expect("parse failed");

		assert_eq!(turn.content.as_deref(), Some("done searching"));
		assert!(turn.tool_calls.is_empty());
	}

	#[test]
	fn rejects_response_without_choices() {
		let json = serde_json::json!({ "error": "overloaded" });

		assert!(parse_chat_turn(json).is_err());
	}

	#[test]
	fn stream_payload_extracts_delta_content() {
		let payload = r#"{"choices":[{"delta":{"content":"hel"}}]}"#;

		assert_eq!(
			parse_stream_payload(payload).expect("parse failed"),
			StreamDelta::Content("hel".to_string())
		);
	}

	#[test]
	fn stream_payload_recognizes_done_marker() {
		assert_eq!(parse_stream_payload("[DONE]").expect("parse failed"), StreamDelta::Done);
	}

	#[test]
	fn stream_payload_skips_empty_deltas() {
		let payload = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;

		assert_eq!(parse_stream_payload(payload).expect("parse failed"), StreamDelta::Empty);
	}

	#[test]
	fn stream_payload_rejects_invalid_json() {
		assert!(parse_stream_payload("{not json").is_err());
	}

	#[test]
	fn take_event_waits_for_complete_events() {
		let mut buffer = b"data: {\"a\":1}".to_vec();

		assert!(take_event(&mut buffer).expect("take failed").is_none());

		buffer.extend_from_slice(b"\n\ndata: tail");

		let payload = take_event(&mut buffer).expect("take failed").expect("Expected event.");

		assert_eq!(payload, "{\"a\":1}");
		assert_eq!(buffer, b"data: tail");
	}
}
