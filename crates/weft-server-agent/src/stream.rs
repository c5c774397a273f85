// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Streaming variant of the tool-call loop.
//!
//! Text deltas are forwarded through the incremental block scanner so a
//! `<tool_call>` block split across chunks never leaks into the emitted
//! text. Tool lifecycle events (`pending`, `executing`, `success`,
//! `error`) interleave with the deltas on the same channel; the terminal
//! `Completed` event carries the final response.

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use weft_common_core::{
	ChatEvent, ChatRequest, ChatResponse, ChatStream, GatewayError, LlmError, Message,
	ToolCallEvent, ToolInvocation,
};

use crate::parse::{parse_invocations, ToolBlockScanner};
use crate::prompt::inject_tool_prompt;
use crate::runner::{serialize_result, ToolFailureMode, ToolLoop};

const CHANNEL_CAPACITY: usize = 32;

impl ToolLoop {
	/// Runs one conversation turn as an event stream.
	///
	/// Cancellation stops delivery mid-stream without completing the
	/// remaining iterations.
	pub fn run_streaming(&self, request: &ChatRequest, cancel: &CancellationToken) -> ChatStream {
		let (tx, rx) = mpsc::channel::<ChatEvent>(CHANNEL_CAPACITY);
		let completer = self.completer();
		let executor = self.executor();
		let failure_mode = self.config().failure_mode;
		let max_iterations = self.max_iterations(request);
		let mut working = request.clone();
		let cancel = cancel.clone();

		tokio::spawn(async move {
			inject_tool_prompt(&mut working.messages, &working.tools);

			let mut iteration: u32 = 0;
			'turn: loop {
				iteration += 1;
				debug!(iteration, max_iterations, "tool loop opening stream");
				let mut inner = match completer.complete_streaming(&working, &cancel).await {
					Ok(stream) => stream,
					Err(error) => {
						let _ = tx.send(ChatEvent::Error(error)).await;
						return;
					}
				};

				let mut scanner = ToolBlockScanner::new();
				let mut invocations: Vec<ToolInvocation> = Vec::new();
				let mut completed: Option<ChatResponse> = None;

				while let Some(event) = inner.next().await {
					match event {
						ChatEvent::TextDelta { content } => {
							let output = scanner.push(&content);
							if !output.text.is_empty()
								&& tx
									.send(ChatEvent::TextDelta {
										content: output.text,
									})
									.await
									.is_err()
							{
								return;
							}
							for invocation in output.invocations {
								if tx
									.send(ChatEvent::ToolCall(ToolCallEvent::pending(
										invocation.clone(),
									)))
									.await
									.is_err()
								{
									return;
								}
								invocations.push(invocation);
							}
						}
						ChatEvent::Completed(response) => {
							let tail = scanner.finish();
							if !tail.is_empty()
								&& tx
									.send(ChatEvent::TextDelta { content: tail })
									.await
									.is_err()
							{
								return;
							}
							completed = Some(response);
						}
						ChatEvent::ToolCall(tool_event) => {
							if tx.send(ChatEvent::ToolCall(tool_event)).await.is_err() {
								return;
							}
						}
						ChatEvent::Error(error) => {
							let _ = tx.send(ChatEvent::Error(error)).await;
							return;
						}
					}
				}

				let Some(response) = completed else {
					let _ = tx
						.send(ChatEvent::Error(GatewayError::Provider(
							LlmError::InvalidResponse(
								"stream ended without a completion event".to_string(),
							),
						)))
						.await;
					return;
				};

				// A non-streaming backend may deliver the whole text in the
				// completed response without deltas.
				if invocations.is_empty() {
					invocations = parse_invocations(response.text());
				}

				if invocations.is_empty() || iteration >= max_iterations {
					if !invocations.is_empty() {
						warn!(
							iteration,
							pending_calls = invocations.len(),
							"tool iteration bound reached with pending tool calls"
						);
					}
					let _ = tx.send(ChatEvent::Completed(response)).await;
					return;
				}

				working.messages.push(Message::assistant(response.text()));
				for invocation in invocations {
					if cancel.is_cancelled() {
						let _ = tx.send(ChatEvent::Error(GatewayError::Cancelled)).await;
						return;
					}
					if tx
						.send(ChatEvent::ToolCall(ToolCallEvent::executing(
							invocation.clone(),
						)))
						.await
						.is_err()
					{
						return;
					}

					match executor
						.execute(&invocation.name, invocation.arguments.clone())
						.await
					{
						Ok(result) => {
							if tx
								.send(ChatEvent::ToolCall(ToolCallEvent::success(
									invocation.clone(),
									result.clone(),
								)))
								.await
								.is_err()
							{
								return;
							}
							working
								.messages
								.push(Message::tool(&invocation.name, serialize_result(&result)));
						}
						Err(error) => {
							warn!(tool = %invocation.name, error = %error, "tool execution failed");
							if tx
								.send(ChatEvent::ToolCall(ToolCallEvent::error(
									invocation.clone(),
									error.to_string(),
								)))
								.await
								.is_err()
							{
								return;
							}
							match failure_mode {
								ToolFailureMode::FeedErrorBack => {
									let payload = serde_json::json!({ "error": error.to_string() });
									working.messages.push(Message::tool(
										&invocation.name,
										serialize_result(&payload),
									));
								}
								ToolFailureMode::FailLoop => {
									let _ = tx
										.send(ChatEvent::Error(GatewayError::Tool(error)))
										.await;
									break 'turn;
								}
							}
						}
					}
				}
			}
		});

		ChatStream::new(Box::pin(ReceiverStream::new(rx)))
	}
}
