use std::sync::Arc;

use quill_config::Config;
use quill_service::Providers;

#[derive(Clone)]
pub struct AppState {
	pub cfg: Arc<Config>,
	pub providers: Providers,
}
impl AppState {
	pub fn new(config: Config) -> Self {
		Self { cfg: Arc::new(config), providers: Providers::default() }
	}

	pub fn with_providers(config: Config, providers: Providers) -> Self {
		Self { cfg: Arc::new(config), providers }
	}
}
