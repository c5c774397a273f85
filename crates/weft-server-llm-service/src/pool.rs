// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Credential pool with usage-weighted selection and failure tracking.
//!
//! Catalog snapshots can be up to the cache TTL old, so the pool keeps an
//! in-process health overlay per credential id: usage increments, error
//! streaks and deactivations land here immediately and are merged over the
//! snapshot at selection time. The overlay is also forwarded to the
//! catalog store; a store write failure is logged and does not fail the
//! completion call.
//!
//! No lock is held across the select -> call -> record sequence. Usage
//! counters are a load-balancing hint, not a correctness-critical
//! resource; concurrent requests may race and pick the same credential.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogStore, CredentialRecord};

/// Consecutive rotate-worthy failures after which a credential is
/// deactivated.
const DEACTIVATION_THRESHOLD: u32 = 3;

/// Stored error messages are truncated to this many bytes.
const MAX_ERROR_LEN: usize = 256;

#[derive(Clone, Debug, Default)]
struct CredentialHealth {
	used_today: u64,
	consecutive_errors: u32,
	deactivated: bool,
	last_error: Option<String>,
	last_used_at: Option<DateTime<Utc>>,
}

impl CredentialHealth {
	fn seed(record: &CredentialRecord) -> Self {
		Self {
			used_today: record.used_today,
			consecutive_errors: record.consecutive_errors,
			deactivated: !record.active,
			last_error: record.last_error.clone(),
			last_used_at: record.last_used_at,
		}
	}
}

/// Tracks per-credential health and picks the best usable credential.
pub struct CredentialPool {
	store: Arc<dyn CatalogStore>,
	health: Mutex<HashMap<String, CredentialHealth>>,
}

impl CredentialPool {
	pub fn new(store: Arc<dyn CatalogStore>) -> Self {
		Self {
			store,
			health: Mutex::new(HashMap::new()),
		}
	}

	/// Applies the overlay to a snapshot record.
	fn merge(record: &CredentialRecord, health: Option<&CredentialHealth>) -> CredentialRecord {
		let mut merged = record.clone();
		if let Some(health) = health {
			merged.used_today = merged.used_today.max(health.used_today);
			merged.consecutive_errors = health.consecutive_errors;
			merged.last_used_at = health.last_used_at.or(merged.last_used_at);
			if health.last_error.is_some() {
				merged.last_error = health.last_error.clone();
			}
			if health.deactivated {
				merged.active = false;
			}
		}
		merged
	}

	/// Picks the best usable credential: active, under daily quota, highest
	/// priority, least used. Ties keep declaration order.
	pub async fn select_best(&self, credentials: &[CredentialRecord]) -> Option<CredentialRecord> {
		let health = self.health.lock().await;
		let mut usable: Vec<CredentialRecord> = credentials
			.iter()
			.map(|record| Self::merge(record, health.get(&record.id)))
			.filter(|record| record.active && record.under_quota())
			.collect();
		drop(health);

		usable.sort_by(|a, b| {
			b.priority
				.cmp(&a.priority)
				.then(a.used_today.cmp(&b.used_today))
		});

		let selected = usable.into_iter().next();
		if let Some(credential) = &selected {
			debug!(
					credential_id = %credential.id,
					priority = credential.priority,
					used_today = credential.used_today,
					"selected credential"
			);
		}
		selected
	}

	/// Number of credentials that would pass the selection filter.
	pub async fn active_count(&self, credentials: &[CredentialRecord]) -> usize {
		let health = self.health.lock().await;
		credentials
			.iter()
			.map(|record| Self::merge(record, health.get(&record.id)))
			.filter(|record| record.active && record.under_quota())
			.count()
	}

	/// Records a successful call: usage up, error streak reset.
	pub async fn record_success(&self, credential: &CredentialRecord) {
		{
			let mut health = self.health.lock().await;
			let entry = health
				.entry(credential.id.clone())
				.or_insert_with(|| CredentialHealth::seed(credential));
			entry.used_today += 1;
			entry.consecutive_errors = 0;
			entry.last_used_at = Some(Utc::now());
		}

		if let Err(error) = self.store.record_usage(&credential.id).await {
			warn!(credential_id = %credential.id, error = %error, "failed to persist credential usage");
		}
	}

	/// Records a failed call. When `rotate_worthy` and the streak reaches
	/// the threshold the credential is deactivated; returns whether that
	/// happened.
	pub async fn record_failure(
		&self,
		credential: &CredentialRecord,
		message: &str,
		rotate_worthy: bool,
	) -> bool {
		let message = truncate(message, MAX_ERROR_LEN);

		let deactivated = {
			let mut health = self.health.lock().await;
			let entry = health
				.entry(credential.id.clone())
				.or_insert_with(|| CredentialHealth::seed(credential));
			entry.consecutive_errors += 1;
			entry.last_error = Some(message.clone());
			let deactivate = rotate_worthy && entry.consecutive_errors >= DEACTIVATION_THRESHOLD;
			if deactivate && !entry.deactivated {
				entry.deactivated = true;
				info!(
						credential_id = %credential.id,
						consecutive_errors = entry.consecutive_errors,
						"credential deactivated after repeated failures"
				);
			}
			deactivate
		};

		if let Err(error) = self
			.store
			.record_error(&credential.id, &message, deactivated)
			.await
		{
			warn!(credential_id = %credential.id, error = %error, "failed to persist credential error");
		}

		deactivated
	}

	/// Zeroes daily usage counters (external trigger, e.g. daily cron).
	pub async fn reset_daily(&self) {
		{
			let mut health = self.health.lock().await;
			for entry in health.values_mut() {
				entry.used_today = 0;
			}
		}
		if let Err(error) = self.store.reset_daily().await {
			warn!(error = %error, "failed to persist daily usage reset");
		}
	}
}

fn truncate(message: &str, max_len: usize) -> String {
	if message.len() <= max_len {
		return message.to_string();
	}
	let mut end = max_len;
	while !message.is_char_boundary(end) {
		end -= 1;
	}
	message[..end].to_string()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::catalog::MemoryCatalogStore;

	fn pool_with(credentials: Vec<CredentialRecord>) -> (CredentialPool, Vec<CredentialRecord>) {
		let provider = crate::catalog::ProviderRecord::new("openai", 100);
		let provider = credentials
			.iter()
			.cloned()
			.fold(provider, |p, c| p.with_credential(c));
		let store = Arc::new(MemoryCatalogStore::new(vec![provider]));
		(CredentialPool::new(store), credentials)
	}

	#[tokio::test]
	async fn selects_by_priority_then_usage() {
		let mut low_priority = CredentialRecord::new("low", "sk-low").with_priority(50);
		low_priority.used_today = 0;
		let mut busy = CredentialRecord::new("busy", "sk-busy").with_priority(100);
		busy.used_today = 10;
		let fresh = CredentialRecord::new("fresh", "sk-fresh").with_priority(100);

		let (pool, credentials) = pool_with(vec![low_priority, busy, fresh]);
		let selected = pool.select_best(&credentials).await.unwrap();
		assert_eq!(selected.id, "fresh");
	}

	#[tokio::test]
	async fn tie_break_keeps_declaration_order() {
		let first = CredentialRecord::new("first", "sk-1").with_priority(100);
		let second = CredentialRecord::new("second", "sk-2").with_priority(100);

		let (pool, credentials) = pool_with(vec![first, second]);
		let selected = pool.select_best(&credentials).await.unwrap();
		assert_eq!(selected.id, "first");
	}

	#[tokio::test]
	async fn skips_inactive_and_over_quota() {
		let inactive = CredentialRecord::new("inactive", "sk-i")
			.with_priority(100)
			.inactive();
		let mut exhausted = CredentialRecord::new("exhausted", "sk-e")
			.with_priority(90)
			.with_daily_quota(5);
		exhausted.used_today = 5;
		let usable = CredentialRecord::new("usable", "sk-u").with_priority(10);

		let (pool, credentials) = pool_with(vec![inactive, exhausted, usable]);
		let selected = pool.select_best(&credentials).await.unwrap();
		assert_eq!(selected.id, "usable");
		assert_eq!(pool.active_count(&credentials).await, 1);
	}

	#[tokio::test]
	async fn returns_none_when_nothing_usable() {
		let inactive = CredentialRecord::new("inactive", "sk").inactive();
		let (pool, credentials) = pool_with(vec![inactive]);
		assert!(pool.select_best(&credentials).await.is_none());
	}

	#[tokio::test]
	async fn success_increments_usage_for_later_selection() {
		let a = CredentialRecord::new("a", "sk-a").with_priority(100);
		let b = CredentialRecord::new("b", "sk-b").with_priority(100);
		let (pool, credentials) = pool_with(vec![a, b]);

		let first = pool.select_best(&credentials).await.unwrap();
		assert_eq!(first.id, "a");
		pool.record_success(&first).await;

		// "a" now carries one use; least-used ordering moves to "b".
		let second = pool.select_best(&credentials).await.unwrap();
		assert_eq!(second.id, "b");
	}

	#[tokio::test]
	async fn three_rotate_worthy_failures_deactivate() {
		let credential = CredentialRecord::new("cred", "sk");
		let (pool, credentials) = pool_with(vec![credential.clone()]);

		assert!(!pool.record_failure(&credential, "401 unauthorized", true).await);
		assert!(!pool.record_failure(&credential, "401 unauthorized", true).await);
		assert!(pool.record_failure(&credential, "401 unauthorized", true).await);

		assert!(pool.select_best(&credentials).await.is_none());
	}

	#[tokio::test]
	async fn non_rotate_worthy_failures_never_deactivate() {
		let credential = CredentialRecord::new("cred", "sk");
		let (pool, credentials) = pool_with(vec![credential.clone()]);

		for _ in 0..5 {
			assert!(!pool.record_failure(&credential, "invalid_request", false).await);
		}

		assert!(pool.select_best(&credentials).await.is_some());
	}

	#[tokio::test]
	async fn failure_then_success_resets_streak() {
		let credential = CredentialRecord::new("cred", "sk");
		let (pool, _) = pool_with(vec![credential.clone()]);

		pool.record_failure(&credential, "timeout", true).await;
		pool.record_failure(&credential, "timeout", true).await;
		pool.record_success(&credential).await;
		// Streak restarted; two more failures stay below the threshold.
		assert!(!pool.record_failure(&credential, "timeout", true).await);
		assert!(!pool.record_failure(&credential, "timeout", true).await);
	}

	#[tokio::test]
	async fn reset_daily_restores_quota_headroom() {
		let mut credential = CredentialRecord::new("cred", "sk").with_daily_quota(1);
		credential.used_today = 0;
		let (pool, credentials) = pool_with(vec![credential.clone()]);

		let selected = pool.select_best(&credentials).await.unwrap();
		pool.record_success(&selected).await;
		assert!(pool.select_best(&credentials).await.is_none());

		pool.reset_daily().await;
		assert!(pool.select_best(&credentials).await.is_some());
	}

	#[tokio::test]
	async fn failure_messages_are_truncated() {
		let credential = CredentialRecord::new("cred", "sk");
		let (pool, _) = pool_with(vec![credential.clone()]);

		let long_message = "x".repeat(MAX_ERROR_LEN * 2);
		pool.record_failure(&credential, &long_message, false).await;

		let health = pool.health.lock().await;
		let stored = health.get("cred").unwrap().last_error.as_ref().unwrap();
		assert_eq!(stored.len(), MAX_ERROR_LEN);
	}

	#[test]
	fn truncate_respects_char_boundaries() {
		let message = "héllo wörld".repeat(40);
		let truncated = truncate(&message, MAX_ERROR_LEN);
		assert!(truncated.len() <= MAX_ERROR_LEN);
		assert!(message.starts_with(&truncated));
	}
}
