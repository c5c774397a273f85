// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! The fallback orchestrator.
//!
//! Two strategies, both built on the retry orchestrator and the error
//! classifier:
//!
//! - **Direct**: the caller pinned a provider+model; only credentials
//!   rotate. Each credential is tried at most once per call; a credential
//!   failure marks its health and selection moves on. `invalid_request`
//!   failures are fatal immediately.
//! - **Auto**: traverse the selector's priority order across every
//!   provider/model pair, delegating per-pair credential handling to the
//!   direct logic. The first pair attempted is remembered as the original;
//!   a successful response reached through fallback carries a
//!   [`FallbackTrace`].
//!
//! Cancellation is honored before the first attempt and races every
//! backend call, surfacing as [`GatewayError::Cancelled`] rather than a
//! provider error.

use std::collections::HashSet;
use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use weft_common_core::{
	ChatEvent, ChatRequest, ChatResponse, ChatStream, FallbackTrace, GatewayError, GatewayResult,
	LlmError,
};
use weft_common_http::{retry, RetryConfig};

use crate::catalog::{CatalogError, ProviderRecord};
use crate::classify::{classify, ErrorCategory};
use crate::pool::CredentialPool;
use crate::registry::{BackendRequest, ProviderRegistry};
use crate::selector::{order, PairKey, Selector};

/// Orchestrates credential rotation and provider/model fallback around
/// backend calls.
pub struct FallbackEngine {
	registry: ProviderRegistry,
	pool: Arc<CredentialPool>,
	selector: Arc<Selector>,
	retry: RetryConfig,
	/// Maximum failed pairs tolerated per auto-mode call before giving up;
	/// `None` keeps the traversal unbounded.
	max_fallbacks: Option<u32>,
}

impl FallbackEngine {
	pub fn new(
		registry: ProviderRegistry,
		pool: Arc<CredentialPool>,
		selector: Arc<Selector>,
		retry: RetryConfig,
		max_fallbacks: Option<u32>,
	) -> Self {
		Self {
			registry,
			pool,
			selector,
			retry,
			max_fallbacks,
		}
	}

	fn catalog_error(error: CatalogError) -> GatewayError {
		GatewayError::Unavailable(error.to_string())
	}

	/// Resolves an explicit provider+model pair against the catalog.
	fn resolve_pair<'a>(
		snapshot: &'a [ProviderRecord],
		provider_name: &str,
		model_name: &str,
	) -> GatewayResult<&'a ProviderRecord> {
		let provider = snapshot
			.iter()
			.find(|p| p.name == provider_name)
			.ok_or_else(|| GatewayError::Validation(format!("unknown provider '{provider_name}'")))?;
		if !provider.active {
			return Err(GatewayError::Unavailable(format!(
				"provider '{provider_name}' is inactive"
			)));
		}
		let model = provider
			.models
			.iter()
			.find(|m| m.name == model_name)
			.ok_or_else(|| {
				GatewayError::Validation(format!("unknown model '{provider_name}:{model_name}'"))
			})?;
		if !model.active {
			return Err(GatewayError::Unavailable(format!(
				"model '{provider_name}:{model_name}' is inactive"
			)));
		}
		Ok(provider)
	}

	/// Direct mode: fixed provider+model, rotating through its credentials.
	pub async fn run_direct(
		&self,
		provider_name: &str,
		model_name: &str,
		request: &ChatRequest,
		cancel: &CancellationToken,
	) -> GatewayResult<ChatResponse> {
		if cancel.is_cancelled() {
			return Err(GatewayError::Cancelled);
		}
		let snapshot = self.selector.snapshot().await.map_err(Self::catalog_error)?;
		let provider = Self::resolve_pair(&snapshot, provider_name, model_name)?;
		self.attempt_pair(provider, model_name, request, cancel).await
	}

	/// Direct-mode streaming variant.
	pub async fn run_direct_stream(
		&self,
		provider_name: &str,
		model_name: &str,
		request: &ChatRequest,
		cancel: &CancellationToken,
	) -> GatewayResult<ChatStream> {
		if cancel.is_cancelled() {
			return Err(GatewayError::Cancelled);
		}
		let snapshot = self.selector.snapshot().await.map_err(Self::catalog_error)?;
		let provider = Self::resolve_pair(&snapshot, provider_name, model_name)?;
		self
			.attempt_pair_stream(provider, model_name, request, cancel)
			.await
	}

	/// Auto mode: unbounded traversal across provider+model combinations.
	pub async fn run_auto(
		&self,
		request: &ChatRequest,
		cancel: &CancellationToken,
	) -> GatewayResult<ChatResponse> {
		if cancel.is_cancelled() {
			return Err(GatewayError::Cancelled);
		}
		let snapshot = self.selector.snapshot().await.map_err(Self::catalog_error)?;

		let mut excluded: HashSet<PairKey> = HashSet::new();
		let mut original: Option<(String, String)> = None;
		let mut failed: Vec<String> = Vec::new();
		let mut last_error: Option<String> = None;

		for (provider, model) in order(&snapshot) {
			let key = PairKey::new(&provider.name, &model.name);
			if excluded.contains(&key) || self.selector.is_model_failed(&key).await {
				continue;
			}
			if self.selector.is_provider_exhausted(&provider.name).await {
				continue;
			}
			if self.pool.active_count(&provider.credentials).await == 0 {
				info!(provider = %provider.name, "provider has no active credentials, marking exhausted");
				self.selector.mark_provider_exhausted(&provider.name).await;
				continue;
			}
			if let Some(cap) = self.max_fallbacks {
				if failed.len() as u32 > cap {
					warn!(cap, "fallback cap reached, aborting traversal");
					break;
				}
			}

			if original.is_none() {
				original = Some((provider.name.clone(), model.name.clone()));
			}

			match self.attempt_pair(provider, &model.name, request, cancel).await {
				Ok(mut response) => {
					if !failed.is_empty() {
						let (original_provider, original_model) = original
							.clone()
							.unwrap_or_else(|| (provider.name.clone(), model.name.clone()));
						info!(
								original = %format!("{original_provider}:{original_model}"),
								resolved = %key,
								fallback_count = failed.len(),
								"request served after fallback"
						);
						response.fallback = Some(FallbackTrace {
							original_provider,
							original_model,
							final_provider: provider.name.clone(),
							final_model: model.name.clone(),
							fallback_count: failed.len() as u32,
						});
					}
					return Ok(response);
				}
				Err(error) if error.is_fatal() => return Err(error),
				Err(error) => {
					warn!(pair = %key, error = %error, "pair failed, moving to next candidate");
					last_error = Some(error.to_string());
					failed.push(key.to_string());
					excluded.insert(key.clone());
					if matches!(error, GatewayError::CredentialsExhausted { .. }) {
						self.selector.mark_provider_exhausted(&provider.name).await;
					}
					self.selector.mark_model_failed(key).await;
				}
			}
		}

		Err(GatewayError::Exhausted {
			tried: failed,
			last_error: last_error
				.unwrap_or_else(|| "no candidate provider/model pairs available".to_string()),
		})
	}

	/// Auto-mode streaming variant. Fallback happens while opening the
	/// stream; once a stream is open, mid-stream failures are delivered as
	/// events rather than re-routed.
	pub async fn run_auto_stream(
		&self,
		request: &ChatRequest,
		cancel: &CancellationToken,
	) -> GatewayResult<ChatStream> {
		if cancel.is_cancelled() {
			return Err(GatewayError::Cancelled);
		}
		let snapshot = self.selector.snapshot().await.map_err(Self::catalog_error)?;

		let mut excluded: HashSet<PairKey> = HashSet::new();
		let mut original: Option<(String, String)> = None;
		let mut failed: Vec<String> = Vec::new();
		let mut last_error: Option<String> = None;

		for (provider, model) in order(&snapshot) {
			let key = PairKey::new(&provider.name, &model.name);
			if excluded.contains(&key) || self.selector.is_model_failed(&key).await {
				continue;
			}
			if self.selector.is_provider_exhausted(&provider.name).await {
				continue;
			}
			if self.pool.active_count(&provider.credentials).await == 0 {
				self.selector.mark_provider_exhausted(&provider.name).await;
				continue;
			}
			if let Some(cap) = self.max_fallbacks {
				if failed.len() as u32 > cap {
					break;
				}
			}

			if original.is_none() {
				original = Some((provider.name.clone(), model.name.clone()));
			}

			match self
				.attempt_pair_stream(provider, &model.name, request, cancel)
				.await
			{
				Ok(stream) => {
					if failed.is_empty() {
						return Ok(stream);
					}
					let (original_provider, original_model) = original
						.clone()
						.unwrap_or_else(|| (provider.name.clone(), model.name.clone()));
					let trace = FallbackTrace {
						original_provider,
						original_model,
						final_provider: provider.name.clone(),
						final_model: model.name.clone(),
						fallback_count: failed.len() as u32,
					};
					let mapped = stream.map(move |event| match event {
						ChatEvent::Completed(mut response) => {
							response.fallback = Some(trace.clone());
							ChatEvent::Completed(response)
						}
						other => other,
					});
					return Ok(ChatStream::new(Box::pin(mapped)));
				}
				Err(error) if error.is_fatal() => return Err(error),
				Err(error) => {
					warn!(pair = %key, error = %error, "stream open failed, moving to next candidate");
					last_error = Some(error.to_string());
					failed.push(key.to_string());
					excluded.insert(key.clone());
					if matches!(error, GatewayError::CredentialsExhausted { .. }) {
						self.selector.mark_provider_exhausted(&provider.name).await;
					}
					self.selector.mark_model_failed(key).await;
				}
			}
		}

		Err(GatewayError::Exhausted {
			tried: failed,
			last_error: last_error
				.unwrap_or_else(|| "no candidate provider/model pairs available".to_string()),
		})
	}

	/// Attempts one provider/model pair, rotating through its credentials.
	async fn attempt_pair(
		&self,
		provider: &ProviderRecord,
		model: &str,
		request: &ChatRequest,
		cancel: &CancellationToken,
	) -> GatewayResult<ChatResponse> {
		let backend = self.registry.get(&provider.name).ok_or_else(|| {
			GatewayError::Unavailable(format!(
				"no backend registered for provider '{}'",
				provider.name
			))
		})?;
		let backend_request = BackendRequest::from_chat(request, model);

		let mut tried: HashSet<String> = HashSet::new();
		let mut last_error: Option<String> = None;

		loop {
			if cancel.is_cancelled() {
				return Err(GatewayError::Cancelled);
			}
			let available: Vec<_> = provider
				.credentials
				.iter()
				.filter(|c| !tried.contains(&c.id))
				.cloned()
				.collect();
			let Some(credential) = self.pool.select_best(&available).await else {
				break;
			};
			tried.insert(credential.id.clone());

			debug!(
					provider = %provider.name,
					model = %model,
					credential_id = %credential.id,
					"attempting chat completion"
			);

			let result = tokio::select! {
				_ = cancel.cancelled() => return Err(GatewayError::Cancelled),
				result = retry(
					&self.retry,
					|error: &LlmError| classify(error).is_retryable,
					|| backend.chat(&backend_request, &credential),
				) => result,
			};

			match result {
				Ok(mut response) => {
					self.pool.record_success(&credential).await;
					response.provider = provider.name.clone();
					response.model = model.to_string();
					return Ok(response);
				}
				Err(error) => {
					let classification = classify(&error);
					warn!(
							provider = %provider.name,
							model = %model,
							credential_id = %credential.id,
							category = ?classification.category,
							error = %error,
							"chat completion attempt failed"
					);
					if classification.category == ErrorCategory::InvalidRequest {
						return Err(GatewayError::InvalidRequest(error.to_string()));
					}
					self
						.pool
						.record_failure(&credential, &error.to_string(), classification.should_rotate_key)
						.await;
					last_error = Some(error.to_string());
				}
			}
		}

		Err(GatewayError::CredentialsExhausted {
			provider: provider.name.clone(),
			last_error: last_error.unwrap_or_else(|| "no usable credentials".to_string()),
		})
	}

	/// Streaming counterpart of [`attempt_pair`]: rotation applies while
	/// opening the stream.
	async fn attempt_pair_stream(
		&self,
		provider: &ProviderRecord,
		model: &str,
		request: &ChatRequest,
		cancel: &CancellationToken,
	) -> GatewayResult<ChatStream> {
		let backend = self.registry.get(&provider.name).ok_or_else(|| {
			GatewayError::Unavailable(format!(
				"no backend registered for provider '{}'",
				provider.name
			))
		})?;
		let backend_request = BackendRequest::from_chat(request, model);

		let mut tried: HashSet<String> = HashSet::new();
		let mut last_error: Option<String> = None;

		loop {
			if cancel.is_cancelled() {
				return Err(GatewayError::Cancelled);
			}
			let available: Vec<_> = provider
				.credentials
				.iter()
				.filter(|c| !tried.contains(&c.id))
				.cloned()
				.collect();
			let Some(credential) = self.pool.select_best(&available).await else {
				break;
			};
			tried.insert(credential.id.clone());

			let result = tokio::select! {
				_ = cancel.cancelled() => return Err(GatewayError::Cancelled),
				result = retry(
					&self.retry,
					|error: &LlmError| classify(error).is_retryable,
					|| backend.chat_stream(&backend_request, &credential),
				) => result,
			};

			match result {
				Ok(stream) => {
					self.pool.record_success(&credential).await;
					let provider_name = provider.name.clone();
					let model_name = model.to_string();
					let tagged = stream.map(move |event| match event {
						ChatEvent::Completed(mut response) => {
							response.provider = provider_name.clone();
							response.model = model_name.clone();
							ChatEvent::Completed(response)
						}
						other => other,
					});
					return Ok(cancel_aware(
						ChatStream::new(Box::pin(tagged)),
						cancel.clone(),
					));
				}
				Err(error) => {
					let classification = classify(&error);
					warn!(
							provider = %provider.name,
							model = %model,
							credential_id = %credential.id,
							category = ?classification.category,
							error = %error,
							"stream open attempt failed"
					);
					if classification.category == ErrorCategory::InvalidRequest {
						return Err(GatewayError::InvalidRequest(error.to_string()));
					}
					self
						.pool
						.record_failure(&credential, &error.to_string(), classification.should_rotate_key)
						.await;
					last_error = Some(error.to_string());
				}
			}
		}

		Err(GatewayError::CredentialsExhausted {
			provider: provider.name.clone(),
			last_error: last_error.unwrap_or_else(|| "no usable credentials".to_string()),
		})
	}
}

/// Wraps a stream so that cancellation stops delivery immediately,
/// surfacing a single cancelled error event.
fn cancel_aware(inner: ChatStream, cancel: CancellationToken) -> ChatStream {
	let stream = futures::stream::unfold(
		(inner, cancel, false),
		|(mut inner, cancel, done)| async move {
			if done {
				return None;
			}
			tokio::select! {
				biased;
				_ = cancel.cancelled() => {
					Some((ChatEvent::Error(GatewayError::Cancelled), (inner, cancel, true)))
				}
				event = inner.next() => event.map(|event| (event, (inner, cancel, false))),
			}
		},
	);
	ChatStream::new(Box::pin(stream))
}
