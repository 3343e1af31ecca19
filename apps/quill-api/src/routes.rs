use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use serde::{Deserialize, Serialize};

use quill_service::{EventSink, Orchestrator, wire};

use crate::state::AppState;

/// Bound on in-flight events per request; emission backpressures on a slow
/// client instead of buffering the whole answer.
const EVENT_CHANNEL_CAPACITY: usize = 64;

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/query", post(query))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
	pub query: String,
}

async fn query(
	State(state): State<AppState>,
	Json(payload): Json<QueryRequest>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, axum::Error>>>, ApiError> {
	let query = payload.query.trim().to_string();

	if query.is_empty() {
		return Err(json_error(StatusCode::BAD_REQUEST, "empty_query", "query must be non-empty."));
	}

	let request_id = uuid::Uuid::new_v4();

	tracing::info!(%request_id, "Accepted query request.");

	// Per-request pipeline instances; nothing outlives the stream.
	let (sink, rx) = EventSink::channel(EVENT_CHANNEL_CAPACITY);
	let orchestrator = Orchestrator::new(state.cfg.clone(), state.providers.clone());

	tokio::spawn(async move {
		orchestrator.run(&query, sink).await;
		tracing::debug!(%request_id, "Event stream finished.");
	});

	let stream = futures::stream::unfold(rx, |mut rx| async move {
		let event = rx.recv().await?;
		let message = wire::encode(&event);

		Some((SseEvent::default().json_data(&message), rx))
	});

	Ok(Sse::new(stream))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
}

pub fn json_error(status: StatusCode, code: &str, message: impl Into<String>) -> ApiError {
	ApiError { status, error_code: code.to_string(), message: message.into() }
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody { error_code: self.error_code, message: self.message };

		(self.status, Json(body)).into_response()
	}
}
