use std::sync::Arc;

use axum::{
	body::{self, Body},
	http::{Request, StatusCode},
};
use serde_json::{Map, Value};
use tower::util::ServiceExt;

use quill_api::{routes, state::AppState};
use quill_config::{
	ChatProviderConfig, Config, Pipeline, Providers, SearchProviderConfig, Security, Service,
};
use quill_providers::{chat::ChatTurn, search::SearchHit};
use quill_service::{BoxFuture, ChatProvider, SearchProvider, TokenStream};

fn test_config() -> Config {
	Config {
		service: Service { http_bind: "127.0.0.1:0".to_string(), log_level: "info".to_string() },
		providers: Providers {
			chat: ChatProviderConfig {
				provider_id: "test".to_string(),
				api_base: "http://127.0.0.1:1".to_string(),
				api_key: "test-key".to_string(),
				path: "/".to_string(),
				model: "test".to_string(),
				temperature: 0.7,
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
			search: SearchProviderConfig {
				provider_id: "test".to_string(),
				api_base: "http://127.0.0.1:1".to_string(),
				api_key: "test-key".to_string(),
				path: "/".to_string(),
				collection: "kb-test".to_string(),
				recall_ratio: 80,
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
		},
		pipeline: Pipeline { max_rounds: 2, result_bound: 5, max_context_docs: None },
		security: Security { bind_localhost_only: true },
	}
}

// One canned answer fragment, no searches: enough to drive the route end to
// end without any collaborator.
struct CannedChat;

impl ChatProvider for CannedChat {
	fn complete<'a>(
		&'a self,
		_cfg: &'a ChatProviderConfig,
		_messages: &'a [Value],
		_tools: &'a [Value],
	) -> BoxFuture<'a, quill_providers::Result<ChatTurn>> {
		Box::pin(async { Ok(ChatTurn::default()) })
	}

	fn stream<'a>(
		&'a self,
		_cfg: &'a ChatProviderConfig,
		_messages: &'a [Value],
	) -> BoxFuture<'a, quill_providers::Result<Box<dyn TokenStream>>> {
		Box::pin(async { Ok(Box::new(CannedStream { sent: false }) as Box<dyn TokenStream>) })
	}
}

struct CannedStream {
	sent: bool,
}

impl TokenStream for CannedStream {
	fn next_fragment(&mut self) -> BoxFuture<'_, quill_providers::Result<Option<String>>> {
		let fragment = if self.sent { None } else { Some("Nothing was found.".to_string()) };

		self.sent = true;

		Box::pin(async move { Ok(fragment) })
	}
}

struct NoSearch;

impl SearchProvider for NoSearch {
	fn retrieve<'a>(
		&'a self,
		_cfg: &'a SearchProviderConfig,
		_query: &'a str,
		_result_bound: u32,
	) -> BoxFuture<'a, quill_providers::Result<Vec<SearchHit>>> {
		Box::pin(async { Ok(Vec::new()) })
	}
}

fn mock_state() -> AppState {
	AppState::with_providers(
		test_config(),
		quill_service::Providers::new(Arc::new(CannedChat), Arc::new(NoSearch)),
	)
}

#[tokio::test]
async fn health_ok() {
	let app = routes::router(mock_state());
	let response = app
		.oneshot(
			Request::builder().uri("/health").body(Body::empty()).expect("Failed to build request."),
		)
		.await
		.expect("Failed to call /health.");

	assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn rejects_blank_query() {
	let app = routes::router(mock_state());
	let payload = serde_json::json!({ "query": "   " });
	let response = app
		.oneshot(
			Request::builder()
				.method("POST")
				.uri("/v1/query")
				.header("content-type", "application/json")
				.body(Body::from(payload.to_string()))
				.expect("Failed to build request."),
		)
		.await
		.expect("Failed to call /v1/query.");

	assert_eq!(response.status(), StatusCode::BAD_REQUEST);

	let bytes = body::to_bytes(response.into_body(), usize::MAX)
		.await
		.expect("Failed to read response body.");
	let json: Value = serde_json::from_slice(&bytes).expect("Failed to parse response.");

	assert_eq!(json["error_code"], "empty_query");
}

#[tokio::test]
async fn streams_an_end_terminated_event_stream() {
	let app = routes::router(mock_state());
	let payload = serde_json::json!({ "query": "what is in the knowledge base?" });
	let response = app
		.oneshot(
			Request::builder()
				.method("POST")
				.uri("/v1/query")
				.header("content-type", "application/json")
				.body(Body::from(payload.to_string()))
				.expect("Failed to build request."),
		)
		.await
		.expect("Failed to call /v1/query.");

	assert_eq!(response.status(), StatusCode::OK);

	let content_type = response
		.headers()
		.get("content-type")
		.and_then(|value| value.to_str().ok())
		.unwrap_or_default()
		.to_string();

	assert!(content_type.starts_with("text/event-stream"), "Unexpected type: {content_type}");

	let bytes = body::to_bytes(response.into_body(), usize::MAX)
		.await
		.expect("Failed to read event stream.");
	let text = String::from_utf8(bytes.to_vec()).expect("Stream is not UTF-8.");

	assert!(text.contains("PLAN_DECLARED"));
	assert!(text.contains("\"stage_id\":\"retrieval\""));
	assert!(text.contains("STREAM_CONTENT"));

	let end_position = text.rfind("\"event_type\":\"END\"").expect("Expected an END terminal.");
	let content_position = text.find("STREAM_CONTENT").expect("Expected content.");

	assert!(content_position < end_position);

	// SSE framing: every event is a data line terminated by a blank line.
	assert!(text.lines().filter(|line| !line.is_empty()).all(|line| line.starts_with("data:")));
}
