// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! LLM service configuration.

use std::env;
use std::time::Duration;

use tracing::{debug, info};
use weft_common_http::RetryConfig;

use crate::catalog::CatalogCache;
use crate::error::ConfigError;
use crate::selector::ExhaustionTracker;

/// Tuning knobs for the gateway.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
	/// How long a catalog snapshot is served before refetching.
	pub catalog_ttl: Duration,
	/// Window after which failed-pair and exhausted-provider marks reset.
	pub exhaustion_window: Duration,
	/// Retry policy for a single backend call.
	pub retry: RetryConfig,
	/// Maximum failed pairs tolerated per auto-mode call. `None` keeps the
	/// traversal unbounded, matching the historical behavior.
	pub max_fallbacks: Option<u32>,
}

impl Default for ServiceConfig {
	fn default() -> Self {
		Self {
			catalog_ttl: CatalogCache::DEFAULT_TTL,
			exhaustion_window: ExhaustionTracker::DEFAULT_WINDOW,
			retry: RetryConfig::default(),
			max_fallbacks: None,
		}
	}
}

impl ServiceConfig {
	/// Loads configuration from environment variables.
	///
	/// Recognized variables (all optional, defaults apply):
	/// - `WEFT_SERVER_CATALOG_TTL_SECS`: catalog cache TTL (default 30)
	/// - `WEFT_SERVER_EXHAUSTION_WINDOW_SECS`: exhaustion reset window
	///   (default 300)
	/// - `WEFT_SERVER_RETRY_MAX_ATTEMPTS`: attempts per backend call
	///   (default 3)
	/// - `WEFT_SERVER_RETRY_BASE_DELAY_MS`: backoff base delay (default
	///   1000)
	/// - `WEFT_SERVER_RETRY_BACKOFF_MULTIPLIER`: backoff multiplier
	///   (default 2.0)
	/// - `WEFT_SERVER_MAX_FALLBACKS`: cap on failed pairs per auto call
	///   (default unbounded)
	pub fn from_env() -> Result<Self, ConfigError> {
		debug!("loading LLM service configuration from environment");
		let mut config = Self::default();

		if let Some(secs) = parse_env::<u64>("WEFT_SERVER_CATALOG_TTL_SECS")? {
			config.catalog_ttl = Duration::from_secs(secs);
		}
		if let Some(secs) = parse_env::<u64>("WEFT_SERVER_EXHAUSTION_WINDOW_SECS")? {
			config.exhaustion_window = Duration::from_secs(secs);
		}
		if let Some(attempts) = parse_env::<u32>("WEFT_SERVER_RETRY_MAX_ATTEMPTS")? {
			config.retry.max_attempts = attempts;
		}
		if let Some(millis) = parse_env::<u64>("WEFT_SERVER_RETRY_BASE_DELAY_MS")? {
			config.retry.base_delay = Duration::from_millis(millis);
		}
		if let Some(multiplier) = parse_env::<f64>("WEFT_SERVER_RETRY_BACKOFF_MULTIPLIER")? {
			config.retry.backoff_multiplier = multiplier;
		}
		config.max_fallbacks = parse_env::<u32>("WEFT_SERVER_MAX_FALLBACKS")?;

		info!(
				catalog_ttl_secs = config.catalog_ttl.as_secs(),
				exhaustion_window_secs = config.exhaustion_window.as_secs(),
				retry_max_attempts = config.retry.max_attempts,
				max_fallbacks = ?config.max_fallbacks,
				"loaded LLM service configuration"
		);
		Ok(config)
	}

	pub fn with_catalog_ttl(mut self, ttl: Duration) -> Self {
		self.catalog_ttl = ttl;
		self
	}

	pub fn with_exhaustion_window(mut self, window: Duration) -> Self {
		self.exhaustion_window = window;
		self
	}

	pub fn with_retry(mut self, retry: RetryConfig) -> Self {
		self.retry = retry;
		self
	}

	pub fn with_max_fallbacks(mut self, max_fallbacks: u32) -> Self {
		self.max_fallbacks = Some(max_fallbacks);
		self
	}
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
	match env::var(key) {
		Ok(raw) => raw
			.parse()
			.map(Some)
			.map_err(|_| ConfigError::InvalidValue {
				key: key.to_string(),
				message: format!("could not parse '{raw}'"),
			}),
		Err(_) => Ok(None),
	}
}
