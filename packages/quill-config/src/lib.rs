mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	ChatProviderConfig, Config, Pipeline, Providers, SearchProviderConfig, Security, Service,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.pipeline.max_rounds == 0 {
		return Err(Error::Validation {
			message: "pipeline.max_rounds must be greater than zero.".to_string(),
		});
	}
	if !(1..=20).contains(&cfg.pipeline.result_bound) {
		return Err(Error::Validation {
			message: "pipeline.result_bound must be in the range 1-20.".to_string(),
		});
	}

	if let Some(max) = cfg.pipeline.max_context_docs
		&& max == 0
	{
		return Err(Error::Validation {
			message: "pipeline.max_context_docs must be greater than zero.".to_string(),
		});
	}

	if !cfg.providers.chat.temperature.is_finite() {
		return Err(Error::Validation {
			message: "providers.chat.temperature must be a finite number.".to_string(),
		});
	}
	if !(0.0..=2.0).contains(&cfg.providers.chat.temperature) {
		return Err(Error::Validation {
			message: "providers.chat.temperature must be in the range 0.0-2.0.".to_string(),
		});
	}
	if cfg.providers.search.collection.trim().is_empty() {
		return Err(Error::Validation {
			message: "providers.search.collection must be non-empty.".to_string(),
		});
	}
	if cfg.providers.search.recall_ratio > 100 {
		return Err(Error::Validation {
			message: "providers.search.recall_ratio must be 100 or less.".to_string(),
		});
	}

	for (label, key) in [
		("chat", &cfg.providers.chat.api_key),
		("search", &cfg.providers.search.api_key),
	] {
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}
	for (label, timeout_ms) in [
		("chat", cfg.providers.chat.timeout_ms),
		("search", cfg.providers.search.timeout_ms),
	] {
		if timeout_ms == 0 {
			return Err(Error::Validation {
				message: format!("Provider {label} timeout_ms must be greater than zero."),
			});
		}
	}

	Ok(())
}

// Request URLs are built as `api_base + path`; a trailing slash on the base
// would produce `//` in every call.
fn normalize(cfg: &mut Config) {
	while cfg.providers.chat.api_base.ends_with('/') {
		cfg.providers.chat.api_base.pop();
	}
	while cfg.providers.search.api_base.ends_with('/') {
		cfg.providers.search.api_base.pop();
	}
}
