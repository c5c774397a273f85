// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Chat completion request/response types and the streaming event channel.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use pin_project_lite::pin_project;
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, LlmError};
use crate::message::Message;
use crate::tool::{ToolCallEvent, ToolDefinition};

/// A chat completion request.
///
/// Leaving both `provider` and `model` unset selects auto mode: the gateway
/// picks the highest-priority available pair and falls back across the
/// catalog on failure. Setting both pins the request to that pair (direct
/// mode, credential rotation only). Setting exactly one is a validation
/// error.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatRequest {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub provider: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub model: Option<String>,
	pub messages: Vec<Message>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_tokens: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub top_p: Option<f32>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub tools: Vec<ToolDefinition>,
	/// Upper bound on completion calls per tool-loop turn.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_tool_iterations: Option<u32>,
}

impl ChatRequest {
	pub fn new() -> Self {
		Self {
			provider: None,
			model: None,
			messages: Vec::new(),
			max_tokens: None,
			temperature: None,
			top_p: None,
			tools: Vec::new(),
			max_tool_iterations: None,
		}
	}

	pub fn with_provider_model(mut self, provider: impl Into<String>, model: impl Into<String>) -> Self {
		self.provider = Some(provider.into());
		self.model = Some(model.into());
		self
	}

	pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
		self.messages = messages;
		self
	}

	pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
		self.tools = tools;
		self
	}

	pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
		self.max_tokens = Some(max_tokens);
		self
	}

	pub fn with_temperature(mut self, temperature: f32) -> Self {
		self.temperature = Some(temperature);
		self
	}

	pub fn with_top_p(mut self, top_p: f32) -> Self {
		self.top_p = Some(top_p);
		self
	}

	pub fn with_max_tool_iterations(mut self, max: u32) -> Self {
		self.max_tool_iterations = Some(max);
		self
	}

	/// Direct mode: both provider and model pinned by the caller.
	pub fn is_direct(&self) -> bool {
		self.provider.is_some() && self.model.is_some()
	}
}

impl Default for ChatRequest {
	fn default() -> Self {
		Self::new()
	}
}

/// Token usage statistics for a completion.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
	pub prompt_tokens: u32,
	pub completion_tokens: u32,
	pub total_tokens: u32,
}

/// One completion choice.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Choice {
	pub index: u32,
	pub message: Message,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub finish_reason: Option<String>,
}

/// The path from the first-attempted to the finally-successful
/// provider/model. Present on a response iff at least one attempt failed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FallbackTrace {
	pub original_provider: String,
	pub original_model: String,
	pub final_provider: String,
	pub final_model: String,
	pub fallback_count: u32,
}

/// A completed chat response, annotated with the provider and model that
/// actually served it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatResponse {
	pub id: String,
	pub provider: String,
	pub model: String,
	pub choices: Vec<Choice>,
	#[serde(default)]
	pub usage: Usage,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub fallback: Option<FallbackTrace>,
}

impl ChatResponse {
	/// Content of the first choice, or the empty string.
	pub fn text(&self) -> &str {
		self.choices
			.first()
			.map(|c| c.message.content.as_str())
			.unwrap_or("")
	}
}

/// Streaming events emitted during a completion.
#[derive(Clone, Debug)]
pub enum ChatEvent {
	/// Incremental text content from the assistant.
	TextDelta { content: String },
	/// A tool lifecycle event (pending/executing/success/error).
	ToolCall(ToolCallEvent),
	/// The completion has finished successfully.
	Completed(ChatResponse),
	/// An error occurred during streaming.
	Error(GatewayError),
}

pin_project! {
		/// A stream of chat events during completion.
		///
		/// Wraps an async stream of [`ChatEvent`] items, providing both direct
		/// async iteration via [`next`] and a [`Stream`] implementation.
		pub struct ChatStream {
				#[pin]
				inner: Pin<Box<dyn Stream<Item = ChatEvent> + Send>>,
		}
}

impl ChatStream {
	/// Creates a new chat stream from a boxed stream.
	pub fn new(inner: Pin<Box<dyn Stream<Item = ChatEvent> + Send>>) -> Self {
		Self { inner }
	}

	/// A stream that yields a single error and ends.
	pub fn from_error(error: GatewayError) -> Self {
		Self::new(Box::pin(futures::stream::once(async move {
			ChatEvent::Error(error)
		})))
	}

	/// Returns the next event, or `None` when the stream is exhausted.
	pub async fn next(&mut self) -> Option<ChatEvent> {
		use futures::StreamExt;
		self.inner.next().await
	}
}

impl Stream for ChatStream {
	type Item = ChatEvent;

	fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		self.project().inner.poll_next(cx)
	}
}

impl From<LlmError> for ChatEvent {
	fn from(error: LlmError) -> Self {
		ChatEvent::Error(GatewayError::Provider(error))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::message::Role;
	use proptest::prelude::*;

	fn response_with_text(text: &str) -> ChatResponse {
		ChatResponse {
			id: uuid::Uuid::new_v4().to_string(),
			provider: "openai".to_string(),
			model: "gpt-4o".to_string(),
			choices: vec![Choice {
				index: 0,
				message: Message::assistant(text),
				finish_reason: Some("stop".to_string()),
			}],
			usage: Usage::default(),
			fallback: None,
		}
	}

	#[test]
	fn direct_mode_requires_both_fields() {
		let auto = ChatRequest::new().with_messages(vec![Message::user("hi")]);
		assert!(!auto.is_direct());

		let direct = auto.clone().with_provider_model("openai", "gpt-4o");
		assert!(direct.is_direct());

		let mut half = ChatRequest::new();
		half.provider = Some("openai".to_string());
		assert!(!half.is_direct());
	}

	#[test]
	fn text_returns_first_choice_content() {
		let response = response_with_text("hello");
		assert_eq!(response.text(), "hello");

		let empty = ChatResponse {
			choices: vec![],
			..response
		};
		assert_eq!(empty.text(), "");
	}

	#[test]
	fn fallback_is_omitted_from_json_when_absent() {
		let response = response_with_text("hello");
		let json = serde_json::to_string(&response).unwrap();
		assert!(!json.contains("fallback"));
	}

	#[tokio::test]
	async fn stream_from_error_yields_single_error() {
		let mut stream = ChatStream::from_error(GatewayError::Cancelled);
		assert!(matches!(
			stream.next().await,
			Some(ChatEvent::Error(GatewayError::Cancelled))
		));
		assert!(stream.next().await.is_none());
	}

	proptest! {
			/// Verifies ChatRequest survives a JSON round-trip, ensuring the
			/// caller-facing request schema is stable.
			#[test]
			fn request_serialization_roundtrip(
					model in proptest::option::of("[a-z0-9-]{1,20}"),
					max_tokens in proptest::option::of(1u32..100_000),
					temperature in proptest::option::of(0.0f32..2.0),
			) {
					let request = ChatRequest {
							provider: model.as_ref().map(|_| "openai".to_string()),
							model,
							messages: vec![Message::user("hello")],
							max_tokens,
							temperature,
							top_p: None,
							tools: vec![],
							max_tool_iterations: None,
					};

					let json = serde_json::to_string(&request).expect("serialization should succeed");
					let deserialized: ChatRequest = serde_json::from_str(&json).expect("deserialization should succeed");

					prop_assert_eq!(request.model, deserialized.model);
					prop_assert_eq!(request.max_tokens, deserialized.max_tokens);
					prop_assert_eq!(deserialized.messages[0].role, Role::User);
			}
	}
}
