use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub providers: Providers,
	#[serde(default)]
	pub pipeline: Pipeline,
	pub security: Security,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub chat: ChatProviderConfig,
	pub search: SearchProviderConfig,
}

#[derive(Debug, Deserialize)]
pub struct ChatProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct SearchProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	/// Knowledge-base collection queried by every search invocation.
	pub collection: String,
	#[serde(default = "default_recall_ratio")]
	pub recall_ratio: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Pipeline {
	/// Upper bound on retrieval rounds before the loop is cut off.
	pub max_rounds: u32,
	/// Default per-search result count when the model does not ask for one.
	pub result_bound: u32,
	/// Caps both the reference list and the grounding context so citation
	/// numbers always line up with the emitted references.
	pub max_context_docs: Option<u32>,
}
impl Default for Pipeline {
	fn default() -> Self {
		Self { max_rounds: 3, result_bound: 5, max_context_docs: None }
	}
}

#[derive(Debug, Deserialize)]
pub struct Security {
	pub bind_localhost_only: bool,
}

fn default_recall_ratio() -> u32 {
	80
}
