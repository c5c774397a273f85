// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! The per-provider backend capability and its registry.
//!
//! One [`ChatBackend`] implementation exists per vendor (request shaping,
//! wire adaptation and transport live there, outside this crate). The
//! registry maps provider identity to implementation and is populated at
//! startup.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use weft_common_core::{ChatRequest, ChatResponse, ChatStream, LlmError, Message};

use crate::catalog::CredentialRecord;

/// The resolved request handed to a backend: model pinned, selection
/// concerns stripped.
#[derive(Clone, Debug, Serialize)]
pub struct BackendRequest {
	pub model: String,
	pub messages: Vec<Message>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub max_tokens: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub top_p: Option<f32>,
}

impl BackendRequest {
	pub fn from_chat(request: &ChatRequest, model: impl Into<String>) -> Self {
		Self {
			model: model.into(),
			messages: request.messages.clone(),
			max_tokens: request.max_tokens,
			temperature: request.temperature,
			top_p: request.top_p,
		}
	}
}

/// Capability implemented per provider backend.
///
/// Both methods fail with an [`LlmError`] carrying a message and, where
/// the transport exposes one, an HTTP status code — the inputs of the
/// error classifier.
#[async_trait]
pub trait ChatBackend: Send + Sync {
	/// Sends a completion request with the given credential.
	async fn chat(
		&self,
		request: &BackendRequest,
		credential: &CredentialRecord,
	) -> Result<ChatResponse, LlmError>;

	/// Opens a streaming completion with the given credential.
	async fn chat_stream(
		&self,
		request: &BackendRequest,
		credential: &CredentialRecord,
	) -> Result<ChatStream, LlmError>;
}

/// Registry mapping provider identity to backend implementation.
pub struct ProviderRegistry {
	backends: HashMap<String, Arc<dyn ChatBackend>>,
}

impl ProviderRegistry {
	pub fn new() -> Self {
		Self {
			backends: HashMap::new(),
		}
	}

	pub fn register(&mut self, provider: impl Into<String>, backend: Arc<dyn ChatBackend>) {
		let provider = provider.into();
		tracing::debug!(provider = %provider, "registering chat backend");
		self.backends.insert(provider, backend);
	}

	pub fn get(&self, provider: &str) -> Option<Arc<dyn ChatBackend>> {
		self.backends.get(provider).cloned()
	}

	pub fn names(&self) -> Vec<String> {
		self.backends.keys().cloned().collect()
	}
}

impl Default for ProviderRegistry {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use weft_common_core::{Choice, Usage};

	struct EchoBackend;

	#[async_trait]
	impl ChatBackend for EchoBackend {
		async fn chat(
			&self,
			request: &BackendRequest,
			_credential: &CredentialRecord,
		) -> Result<ChatResponse, LlmError> {
			Ok(ChatResponse {
				id: "echo".to_string(),
				provider: String::new(),
				model: request.model.clone(),
				choices: vec![Choice {
					index: 0,
					message: Message::assistant("echo"),
					finish_reason: Some("stop".to_string()),
				}],
				usage: Usage::default(),
				fallback: None,
			})
		}

		async fn chat_stream(
			&self,
			_request: &BackendRequest,
			_credential: &CredentialRecord,
		) -> Result<ChatStream, LlmError> {
			Err(LlmError::Api {
				message: "streaming unsupported".to_string(),
				status: None,
			})
		}
	}

	#[test]
	fn registry_stores_and_returns_backends() {
		let mut registry = ProviderRegistry::new();
		registry.register("openai", Arc::new(EchoBackend));

		assert!(registry.get("openai").is_some());
		assert!(registry.get("anthropic").is_none());
		assert_eq!(registry.names(), vec!["openai".to_string()]);
	}

	#[tokio::test]
	async fn backend_request_strips_selection_fields() {
		let request = ChatRequest::new()
			.with_provider_model("openai", "gpt-4o")
			.with_messages(vec![Message::user("hello")])
			.with_max_tokens(128);
		let backend_request = BackendRequest::from_chat(&request, "gpt-4o-mini");

		assert_eq!(backend_request.model, "gpt-4o-mini");
		assert_eq!(backend_request.messages.len(), 1);
		assert_eq!(backend_request.max_tokens, Some(128));

		let json = serde_json::to_string(&backend_request).unwrap();
		assert!(!json.contains("provider"));
	}
}
