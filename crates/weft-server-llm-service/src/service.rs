// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! The caller-facing service facade.
//!
//! Validates the request, then dispatches to the fallback engine in direct
//! or auto mode. The caller always receives either a [`ChatResponse`]
//! (possibly carrying a fallback trace) or a single terminal
//! [`GatewayError`]; per-attempt failures are logged inside the engine,
//! never silently dropped.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use weft_common_core::{
	ChatRequest, ChatResponse, ChatStream, GatewayError, GatewayResult, Role,
};

use crate::catalog::CatalogStore;
use crate::config::ServiceConfig;
use crate::fallback::FallbackEngine;
use crate::pool::CredentialPool;
use crate::registry::ProviderRegistry;
use crate::selector::Selector;

/// Routes chat completion requests across the provider catalog.
pub struct LlmService {
	engine: FallbackEngine,
	pool: Arc<CredentialPool>,
	selector: Arc<Selector>,
}

impl LlmService {
	pub fn new(
		store: Arc<dyn CatalogStore>,
		registry: ProviderRegistry,
		config: ServiceConfig,
	) -> Self {
		let pool = Arc::new(CredentialPool::new(store.clone()));
		let selector = Arc::new(Selector::new(
			store,
			config.catalog_ttl,
			config.exhaustion_window,
		));
		let engine = FallbackEngine::new(
			registry,
			pool.clone(),
			selector.clone(),
			config.retry.clone(),
			config.max_fallbacks,
		);
		Self {
			engine,
			pool,
			selector,
		}
	}

	/// Sends a completion request and waits for the full response.
	pub async fn complete(
		&self,
		request: &ChatRequest,
		cancel: &CancellationToken,
	) -> GatewayResult<ChatResponse> {
		validate(request)?;
		if request.is_direct() {
			let (provider, model) = direct_target(request);
			debug!(provider = %provider, model = %model, "dispatching direct-mode completion");
			self.engine.run_direct(provider, model, request, cancel).await
		} else {
			debug!("dispatching auto-mode completion");
			self.engine.run_auto(request, cancel).await
		}
	}

	/// Sends a completion request and returns a stream of events.
	pub async fn complete_streaming(
		&self,
		request: &ChatRequest,
		cancel: &CancellationToken,
	) -> GatewayResult<ChatStream> {
		validate(request)?;
		if request.is_direct() {
			let (provider, model) = direct_target(request);
			debug!(provider = %provider, model = %model, "dispatching direct-mode stream");
			self
				.engine
				.run_direct_stream(provider, model, request, cancel)
				.await
		} else {
			debug!("dispatching auto-mode stream");
			self.engine.run_auto_stream(request, cancel).await
		}
	}

	/// Zeroes daily usage counters (external trigger, e.g. daily cron).
	pub async fn reset_daily(&self) {
		self.pool.reset_daily().await;
	}

	/// Drops the cached catalog snapshot so the next call refetches.
	pub async fn invalidate_catalog(&self) {
		self.selector.invalidate_catalog().await;
	}
}

fn direct_target(request: &ChatRequest) -> (&str, &str) {
	(
		request.provider.as_deref().unwrap_or_default(),
		request.model.as_deref().unwrap_or_default(),
	)
}

/// Request validation: fatal, 400-equivalent, no fallback attempted.
fn validate(request: &ChatRequest) -> GatewayResult<()> {
	if request.messages.is_empty() {
		return Err(GatewayError::Validation(
			"request has no messages".to_string(),
		));
	}
	if request
		.messages
		.iter()
		.any(|m| m.role != Role::Tool && m.content.is_empty())
	{
		return Err(GatewayError::Validation(
			"message content must not be empty".to_string(),
		));
	}
	if request.provider.is_some() != request.model.is_some() {
		return Err(GatewayError::Validation(
			"provider and model must be specified together".to_string(),
		));
	}
	Ok(())
}
