use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::{Error, Result};

/// One knowledge-base passage returned for a search query.
#[derive(Debug, Clone)]
pub struct SearchHit {
	pub content: String,
	pub source: String,
	pub score: f32,
	/// Stable chunk identifier; used downstream as the dedup key.
	pub chunk_key: Option<String>,
	pub doc_id: String,
	pub doc_url: Option<String>,
}

pub async fn retrieve(
	cfg: &quill_config::SearchProviderConfig,
	query: &str,
	result_bound: u32,
) -> Result<Vec<SearchHit>> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"query": query,
		"knowledge_ids": [cfg.collection],
		"top_k": result_bound.clamp(1, 20),
		"recall_method": "mixed",
		"recall_ratio": cfg.recall_ratio,
		"rerank_status": 1,
	});
	let res = client
		.post(&url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_search_response(json)
}

fn parse_search_response(json: Value) -> Result<Vec<SearchHit>> {
	let code = json.get("code").and_then(|v| v.as_i64()).ok_or_else(|| Error::InvalidResponse {
		message: "Search response is missing a status code.".to_string(),
	})?;

	if code != 200 {
		let message =
			json.get("message").and_then(|v| v.as_str()).unwrap_or("Unknown error").to_string();

		return Err(Error::Upstream { message: format!("Search rejected with code {code}: {message}") });
	}

	let data = json.get("data").and_then(|v| v.as_array()).ok_or_else(|| Error::InvalidResponse {
		message: "Search response is missing the data array.".to_string(),
	})?;
	let mut hits = Vec::with_capacity(data.len());

	for item in data {
		let metadata = item.get("metadata");
		let content = item.get("text").and_then(|v| v.as_str()).unwrap_or_default().to_string();
		let source = metadata
			.and_then(|m| m.get("doc_name"))
			.and_then(|v| v.as_str())
			.unwrap_or("Unknown")
			.to_string();
		let score = item.get("score").and_then(|v| v.as_f64()).unwrap_or(0.0) as f32;
		let chunk_key =
			metadata.and_then(|m| m.get("_id")).and_then(|v| v.as_str()).map(str::to_string);
		let doc_id = metadata
			.and_then(|m| m.get("doc_id"))
			.and_then(|v| v.as_str())
			.unwrap_or_default()
			.to_string();
		let doc_url =
			metadata.and_then(|m| m.get("doc_url")).and_then(|v| v.as_str()).map(str::to_string);

		hits.push(SearchHit { content, source, score, chunk_key, doc_id, doc_url });
	}

	Ok(hits)
}
