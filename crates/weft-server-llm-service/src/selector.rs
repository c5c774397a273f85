// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Priority-ordered traversal over the provider x model space.
//!
//! [`order`] produces a deterministic total order: providers by priority
//! descending, then each provider's models by priority descending, ties
//! broken by declaration order. The [`Selector`] layers session-scoped
//! exhaustion tracking on top: model pairs and providers that recently
//! failed are skipped until the time window elapses.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::catalog::{CatalogCache, CatalogError, CatalogStore, ModelRecord, ProviderRecord};

/// A `provider:model` pair identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PairKey {
	pub provider: String,
	pub model: String,
}

impl PairKey {
	pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
		Self {
			provider: provider.into(),
			model: model.into(),
		}
	}
}

impl std::fmt::Display for PairKey {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}:{}", self.provider, self.model)
	}
}

/// Produces the deterministic traversal order over active providers and
/// their active models.
pub fn order(providers: &[ProviderRecord]) -> Vec<(&ProviderRecord, &ModelRecord)> {
	let mut active: Vec<&ProviderRecord> = providers.iter().filter(|p| p.active).collect();
	active.sort_by(|a, b| b.priority.cmp(&a.priority));

	let mut pairs = Vec::new();
	for provider in active {
		let mut models: Vec<&ModelRecord> = provider.models.iter().filter(|m| m.active).collect();
		models.sort_by(|a, b| b.priority.cmp(&a.priority));
		for model in models {
			pairs.push((provider, model));
		}
	}
	pairs
}

/// Time-windowed sets of failed model pairs and exhausted providers.
///
/// Both sets reset together once the window elapses, so a throttled
/// provider gets another chance a few minutes later.
pub struct ExhaustionTracker {
	window: Duration,
	epoch: Instant,
	failed_models: HashSet<PairKey>,
	exhausted_providers: HashSet<String>,
}

impl ExhaustionTracker {
	pub const DEFAULT_WINDOW: Duration = Duration::from_secs(300);

	pub fn new(window: Duration) -> Self {
		Self {
			window,
			epoch: Instant::now(),
			failed_models: HashSet::new(),
			exhausted_providers: HashSet::new(),
		}
	}

	fn maybe_reset(&mut self) {
		if self.epoch.elapsed() >= self.window {
			if !self.failed_models.is_empty() || !self.exhausted_providers.is_empty() {
				debug!(
					failed_models = self.failed_models.len(),
					exhausted_providers = self.exhausted_providers.len(),
					"exhaustion window elapsed, clearing failure sets"
				);
			}
			self.failed_models.clear();
			self.exhausted_providers.clear();
			self.epoch = Instant::now();
		}
	}

	pub fn mark_model_failed(&mut self, key: PairKey) {
		self.maybe_reset();
		self.failed_models.insert(key);
	}

	pub fn mark_provider_exhausted(&mut self, provider: impl Into<String>) {
		self.maybe_reset();
		self.exhausted_providers.insert(provider.into());
	}

	pub fn is_model_failed(&mut self, key: &PairKey) -> bool {
		self.maybe_reset();
		self.failed_models.contains(key)
	}

	pub fn is_provider_exhausted(&mut self, provider: &str) -> bool {
		self.maybe_reset();
		self.exhausted_providers.contains(provider)
	}
}

/// Catalog snapshots plus exhaustion state, owned per service instance so
/// tests can construct independent selectors.
pub struct Selector {
	cache: CatalogCache,
	exhaustion: Mutex<ExhaustionTracker>,
}

impl Selector {
	pub fn new(store: Arc<dyn CatalogStore>, catalog_ttl: Duration, window: Duration) -> Self {
		Self {
			cache: CatalogCache::new(store, catalog_ttl),
			exhaustion: Mutex::new(ExhaustionTracker::new(window)),
		}
	}

	/// A catalog snapshot from the cache.
	pub async fn snapshot(&self) -> Result<Vec<ProviderRecord>, CatalogError> {
		self.cache.get().await
	}

	/// Drops the cached catalog snapshot.
	pub async fn invalidate_catalog(&self) {
		self.cache.invalidate().await;
	}

	pub async fn mark_model_failed(&self, key: PairKey) {
		debug!(pair = %key, "marking model pair failed");
		self.exhaustion.lock().await.mark_model_failed(key);
	}

	pub async fn mark_provider_exhausted(&self, provider: &str) {
		info!(provider = %provider, "marking provider exhausted");
		self
			.exhaustion
			.lock()
			.await
			.mark_provider_exhausted(provider);
	}

	pub async fn is_model_failed(&self, key: &PairKey) -> bool {
		self.exhaustion.lock().await.is_model_failed(key)
	}

	pub async fn is_provider_exhausted(&self, provider: &str) -> bool {
		self.exhaustion.lock().await.is_provider_exhausted(provider)
	}
}
