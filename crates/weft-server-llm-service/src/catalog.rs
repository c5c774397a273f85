// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Provider catalog records, the persistence collaborator trait, and a
//! time-bounded catalog cache.
//!
//! Providers, models and credentials are created and edited externally;
//! this core only reads the catalog and writes back usage/error marks via
//! [`CatalogStore`]. The cache bounds repeated-fetch cost and serves a
//! stale snapshot when a refresh fails.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use weft_common_secret::SecretString;

/// Errors from the catalog persistence collaborator.
#[derive(Debug, Error)]
pub enum CatalogError {
	#[error("catalog store unavailable: {0}")]
	Unavailable(String),

	#[error("unknown credential: {0}")]
	UnknownCredential(String),
}

/// A model offered by a provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelRecord {
	pub name: String,
	/// Higher is preferred.
	pub priority: i32,
	pub active: bool,
}

impl ModelRecord {
	pub fn new(name: impl Into<String>, priority: i32) -> Self {
		Self {
			name: name.into(),
			priority,
			active: true,
		}
	}

	pub fn inactive(mut self) -> Self {
		self.active = false;
		self
	}
}

/// A rotating credential bound to a provider.
///
/// The secret material is opaque to this core; only the health counters
/// are mutated here, via the credential pool.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CredentialRecord {
	pub id: String,
	pub secret: SecretString,
	/// Higher is preferred.
	pub priority: i32,
	pub active: bool,
	/// Maximum requests per day, if limited.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub daily_quota: Option<u64>,
	#[serde(default)]
	pub used_today: u64,
	#[serde(default)]
	pub consecutive_errors: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_error: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_error_at: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_used_at: Option<DateTime<Utc>>,
}

impl CredentialRecord {
	pub fn new(id: impl Into<String>, secret: impl Into<SecretString>) -> Self {
		Self {
			id: id.into(),
			secret: secret.into(),
			priority: 0,
			active: true,
			daily_quota: None,
			used_today: 0,
			consecutive_errors: 0,
			last_error: None,
			last_error_at: None,
			last_used_at: None,
		}
	}

	pub fn with_priority(mut self, priority: i32) -> Self {
		self.priority = priority;
		self
	}

	pub fn with_daily_quota(mut self, quota: u64) -> Self {
		self.daily_quota = Some(quota);
		self
	}

	pub fn inactive(mut self) -> Self {
		self.active = false;
		self
	}

	/// Whether the credential still has daily quota headroom.
	pub fn under_quota(&self) -> bool {
		match self.daily_quota {
			Some(quota) => self.used_today < quota,
			None => true,
		}
	}
}

/// An external chat-completion backend with its credentials and models.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderRecord {
	pub name: String,
	/// Higher is preferred.
	pub priority: i32,
	pub active: bool,
	pub credentials: Vec<CredentialRecord>,
	pub models: Vec<ModelRecord>,
}

impl ProviderRecord {
	pub fn new(name: impl Into<String>, priority: i32) -> Self {
		Self {
			name: name.into(),
			priority,
			active: true,
			credentials: Vec::new(),
			models: Vec::new(),
		}
	}

	pub fn with_credential(mut self, credential: CredentialRecord) -> Self {
		self.credentials.push(credential);
		self
	}

	pub fn with_model(mut self, model: ModelRecord) -> Self {
		self.models.push(model);
		self
	}

	pub fn inactive(mut self) -> Self {
		self.active = false;
		self
	}
}

/// The external persistence collaborator holding the provider catalog.
#[async_trait]
pub trait CatalogStore: Send + Sync {
	/// Loads the full catalog of providers with nested models and
	/// credentials.
	async fn load(&self) -> Result<Vec<ProviderRecord>, CatalogError>;

	/// Increments the usage counter of a credential.
	async fn record_usage(&self, credential_id: &str) -> Result<(), CatalogError>;

	/// Records an error against a credential, optionally deactivating it.
	async fn record_error(
		&self,
		credential_id: &str,
		message: &str,
		deactivate: bool,
	) -> Result<(), CatalogError>;

	/// Zeroes daily usage counters (external trigger, e.g. daily cron).
	async fn reset_daily(&self) -> Result<(), CatalogError>;
}

/// In-memory catalog store, used in tests and embedded deployments.
pub struct MemoryCatalogStore {
	providers: Mutex<Vec<ProviderRecord>>,
}

impl MemoryCatalogStore {
	pub fn new(providers: Vec<ProviderRecord>) -> Self {
		Self {
			providers: Mutex::new(providers),
		}
	}

	/// Replaces the catalog contents.
	pub async fn set_providers(&self, providers: Vec<ProviderRecord>) {
		*self.providers.lock().await = providers;
	}

	async fn with_credential_mut<F>(&self, credential_id: &str, f: F) -> Result<(), CatalogError>
	where
		F: FnOnce(&mut CredentialRecord),
	{
		let mut providers = self.providers.lock().await;
		for provider in providers.iter_mut() {
			if let Some(credential) = provider
				.credentials
				.iter_mut()
				.find(|c| c.id == credential_id)
			{
				f(credential);
				return Ok(());
			}
		}
		Err(CatalogError::UnknownCredential(credential_id.to_string()))
	}
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
	async fn load(&self) -> Result<Vec<ProviderRecord>, CatalogError> {
		Ok(self.providers.lock().await.clone())
	}

	async fn record_usage(&self, credential_id: &str) -> Result<(), CatalogError> {
		self
			.with_credential_mut(credential_id, |credential| {
				credential.used_today += 1;
				credential.consecutive_errors = 0;
				credential.last_used_at = Some(Utc::now());
			})
			.await
	}

	async fn record_error(
		&self,
		credential_id: &str,
		message: &str,
		deactivate: bool,
	) -> Result<(), CatalogError> {
		self
			.with_credential_mut(credential_id, |credential| {
				credential.consecutive_errors += 1;
				credential.last_error = Some(message.to_string());
				credential.last_error_at = Some(Utc::now());
				if deactivate {
					credential.active = false;
				}
			})
			.await
	}

	async fn reset_daily(&self) -> Result<(), CatalogError> {
		let mut providers = self.providers.lock().await;
		for provider in providers.iter_mut() {
			for credential in provider.credentials.iter_mut() {
				credential.used_today = 0;
			}
		}
		Ok(())
	}
}

struct CachedCatalog {
	providers: Vec<ProviderRecord>,
	fetched_at: Instant,
}

/// Time-bounded cache over a [`CatalogStore`].
///
/// Serves a cloned snapshot while fresh; on refresh failure a stale
/// snapshot is served rather than propagating the fetch error. The error
/// propagates only when there has never been a successful load.
pub struct CatalogCache {
	store: Arc<dyn CatalogStore>,
	ttl: Duration,
	state: Mutex<Option<CachedCatalog>>,
}

impl CatalogCache {
	pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

	pub fn new(store: Arc<dyn CatalogStore>, ttl: Duration) -> Self {
		Self {
			store,
			ttl,
			state: Mutex::new(None),
		}
	}

	/// Returns a snapshot of the catalog, refreshing it when stale.
	pub async fn get(&self) -> Result<Vec<ProviderRecord>, CatalogError> {
		let mut state = self.state.lock().await;

		if let Some(cached) = state.as_ref() {
			if cached.fetched_at.elapsed() < self.ttl {
				return Ok(cached.providers.clone());
			}
		}

		match self.store.load().await {
			Ok(providers) => {
				debug!(provider_count = providers.len(), "refreshed catalog cache");
				*state = Some(CachedCatalog {
					providers: providers.clone(),
					fetched_at: Instant::now(),
				});
				Ok(providers)
			}
			Err(error) => match state.as_ref() {
				Some(stale) => {
					warn!(error = %error, "catalog refresh failed, serving stale snapshot");
					Ok(stale.providers.clone())
				}
				None => Err(error),
			},
		}
	}

	/// Drops the cached snapshot so the next [`get`](Self::get) refetches.
	pub async fn invalidate(&self) {
		*self.state.lock().await = None;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

	fn sample_catalog() -> Vec<ProviderRecord> {
		vec![ProviderRecord::new("openai", 100)
			.with_credential(CredentialRecord::new("cred-1", "sk-one"))
			.with_model(ModelRecord::new("gpt-4o", 100))]
	}

	/// Store wrapper that can be switched into a failing mode and counts
	/// loads.
	struct FlakyStore {
		inner: MemoryCatalogStore,
		failing: AtomicBool,
		loads: AtomicU32,
	}

	impl FlakyStore {
		fn new(providers: Vec<ProviderRecord>) -> Self {
			Self {
				inner: MemoryCatalogStore::new(providers),
				failing: AtomicBool::new(false),
				loads: AtomicU32::new(0),
			}
		}
	}

	#[async_trait]
	impl CatalogStore for FlakyStore {
		async fn load(&self) -> Result<Vec<ProviderRecord>, CatalogError> {
			self.loads.fetch_add(1, Ordering::SeqCst);
			if self.failing.load(Ordering::SeqCst) {
				return Err(CatalogError::Unavailable("connection refused".to_string()));
			}
			self.inner.load().await
		}

		async fn record_usage(&self, credential_id: &str) -> Result<(), CatalogError> {
			self.inner.record_usage(credential_id).await
		}

		async fn record_error(
			&self,
			credential_id: &str,
			message: &str,
			deactivate: bool,
		) -> Result<(), CatalogError> {
			self.inner.record_error(credential_id, message, deactivate).await
		}

		async fn reset_daily(&self) -> Result<(), CatalogError> {
			self.inner.reset_daily().await
		}
	}

	#[tokio::test]
	async fn memory_store_records_usage_and_errors() {
		let store = MemoryCatalogStore::new(sample_catalog());

		store.record_usage("cred-1").await.unwrap();
		store
			.record_error("cred-1", "rate limited", false)
			.await
			.unwrap();
		store.record_error("cred-1", "rate limited", true).await.unwrap();

		let providers = store.load().await.unwrap();
		let credential = &providers[0].credentials[0];
		assert_eq!(credential.used_today, 1);
		assert_eq!(credential.consecutive_errors, 2);
		assert!(!credential.active);
		assert_eq!(credential.last_error.as_deref(), Some("rate limited"));
	}

	#[tokio::test]
	async fn memory_store_rejects_unknown_credential() {
		let store = MemoryCatalogStore::new(sample_catalog());
		let result = store.record_usage("nope").await;
		assert!(matches!(result, Err(CatalogError::UnknownCredential(_))));
	}

	#[tokio::test]
	async fn reset_daily_zeroes_usage() {
		let store = MemoryCatalogStore::new(sample_catalog());
		store.record_usage("cred-1").await.unwrap();
		store.reset_daily().await.unwrap();
		let providers = store.load().await.unwrap();
		assert_eq!(providers[0].credentials[0].used_today, 0);
	}

	#[tokio::test]
	async fn cache_serves_snapshot_without_refetching() {
		let store = Arc::new(FlakyStore::new(sample_catalog()));
		let cache = CatalogCache::new(store.clone(), Duration::from_secs(30));

		cache.get().await.unwrap();
		cache.get().await.unwrap();
		cache.get().await.unwrap();

		assert_eq!(store.loads.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn cache_serves_stale_snapshot_on_refresh_failure() {
		let store = Arc::new(FlakyStore::new(sample_catalog()));
		let cache = CatalogCache::new(store.clone(), Duration::ZERO);

		let first = cache.get().await.unwrap();
		assert_eq!(first.len(), 1);

		store.failing.store(true, Ordering::SeqCst);
		let second = cache.get().await.unwrap();
		assert_eq!(second.len(), 1, "stale snapshot should be served");
	}

	#[tokio::test]
	async fn cache_propagates_error_with_no_snapshot() {
		let store = Arc::new(FlakyStore::new(sample_catalog()));
		store.failing.store(true, Ordering::SeqCst);
		let cache = CatalogCache::new(store, Duration::from_secs(30));

		assert!(cache.get().await.is_err());
	}

	#[tokio::test]
	async fn invalidate_forces_refetch() {
		let store = Arc::new(FlakyStore::new(sample_catalog()));
		let cache = CatalogCache::new(store.clone(), Duration::from_secs(30));

		cache.get().await.unwrap();
		cache.invalidate().await;
		cache.get().await.unwrap();

		assert_eq!(store.loads.load(Ordering::SeqCst), 2);
	}

	#[test]
	fn under_quota_semantics() {
		let mut credential = CredentialRecord::new("c", "sk").with_daily_quota(2);
		assert!(credential.under_quota());
		credential.used_today = 2;
		assert!(!credential.under_quota());

		let unlimited = CredentialRecord::new("c2", "sk2");
		assert!(unlimited.under_quota());
	}

	#[test]
	fn credential_debug_redacts_secret() {
		let credential = CredentialRecord::new("cred-1", "sk-super-secret");
		let output = format!("{credential:?}");
		assert!(!output.contains("sk-super-secret"));
		assert!(output.contains("[REDACTED]"));
	}
}
