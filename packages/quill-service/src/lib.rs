pub mod event;
pub mod orchestrator;
pub mod retrieval;
pub mod summary;
pub mod wire;

mod error;

pub use error::{Error, Result};
pub use event::{Event, EventSink, Stage, StageId, StagePlan, StageStatus};
pub use orchestrator::Orchestrator;
pub use retrieval::{RetrievalController, SEARCH_TOOL_NAME};
pub use summary::SummarizationController;
pub use wire::{WireMessage, encode};

use std::{future::Future, pin::Pin, sync::Arc};

use serde_json::Value;

use quill_config::{ChatProviderConfig, SearchProviderConfig};
use quill_providers::{
	chat::{self, ChatTurn, CompletionStream},
	search::{self, SearchHit},
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Language-model collaborator seam.
pub trait ChatProvider
where
	Self: Send + Sync,
{
	fn complete<'a>(
		&'a self,
		cfg: &'a ChatProviderConfig,
		messages: &'a [Value],
		tools: &'a [Value],
	) -> BoxFuture<'a, quill_providers::Result<ChatTurn>>;

	fn stream<'a>(
		&'a self,
		cfg: &'a ChatProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, quill_providers::Result<Box<dyn TokenStream>>>;
}

/// Knowledge-base search collaborator seam.
pub trait SearchProvider
where
	Self: Send + Sync,
{
	fn retrieve<'a>(
		&'a self,
		cfg: &'a SearchProviderConfig,
		query: &'a str,
		result_bound: u32,
	) -> BoxFuture<'a, quill_providers::Result<Vec<SearchHit>>>;
}

/// Pull-based view of a streaming completion: one content fragment per call,
/// `None` once the stream is over.
pub trait TokenStream
where
	Self: Send,
{
	fn next_fragment(&mut self) -> BoxFuture<'_, quill_providers::Result<Option<String>>>;
}

impl TokenStream for CompletionStream {
	fn next_fragment(&mut self) -> BoxFuture<'_, quill_providers::Result<Option<String>>> {
		Box::pin(CompletionStream::next_fragment(self))
	}
}

#[derive(Clone)]
pub struct Providers {
	pub chat: Arc<dyn ChatProvider>,
	pub search: Arc<dyn SearchProvider>,
}

impl Providers {
	pub fn new(chat: Arc<dyn ChatProvider>, search: Arc<dyn SearchProvider>) -> Self {
		Self { chat, search }
	}
}

impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { chat: provider.clone(), search: provider }
	}
}

struct DefaultProviders;

impl ChatProvider for DefaultProviders {
	fn complete<'a>(
		&'a self,
		cfg: &'a ChatProviderConfig,
		messages: &'a [Value],
		tools: &'a [Value],
	) -> BoxFuture<'a, quill_providers::Result<ChatTurn>> {
		Box::pin(chat::complete(cfg, messages, tools))
	}

	fn stream<'a>(
		&'a self,
		cfg: &'a ChatProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, quill_providers::Result<Box<dyn TokenStream>>> {
		Box::pin(async move {
			let stream = chat::stream(cfg, messages).await?;

			Ok(Box::new(stream) as Box<dyn TokenStream>)
		})
	}
}

impl SearchProvider for DefaultProviders {
	fn retrieve<'a>(
		&'a self,
		cfg: &'a SearchProviderConfig,
		query: &'a str,
		result_bound: u32,
	) -> BoxFuture<'a, quill_providers::Result<Vec<SearchHit>>> {
		Box::pin(search::retrieve(cfg, query, result_bound))
	}
}
