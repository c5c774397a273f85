// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! The bounded tool-call loop.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use weft_common_core::{
	ChatRequest, ChatResponse, ChatStream, GatewayError, GatewayResult, Message, ToolInvocation,
};
use weft_server_llm_service::LlmService;

use crate::parse::parse_invocations;
use crate::prompt::inject_tool_prompt;
use crate::registry::ToolExecutor;

/// Default upper bound on completion calls per turn.
pub const DEFAULT_MAX_ITERATIONS: u32 = 5;

/// The completion capability the loop re-enters each iteration. In
/// production this is the gateway's [`LlmService`]; tests substitute mocks.
#[async_trait]
pub trait Completer: Send + Sync {
	async fn complete(
		&self,
		request: &ChatRequest,
		cancel: &CancellationToken,
	) -> GatewayResult<ChatResponse>;

	async fn complete_streaming(
		&self,
		request: &ChatRequest,
		cancel: &CancellationToken,
	) -> GatewayResult<ChatStream>;
}

#[async_trait]
impl Completer for LlmService {
	async fn complete(
		&self,
		request: &ChatRequest,
		cancel: &CancellationToken,
	) -> GatewayResult<ChatResponse> {
		LlmService::complete(self, request, cancel).await
	}

	async fn complete_streaming(
		&self,
		request: &ChatRequest,
		cancel: &CancellationToken,
	) -> GatewayResult<ChatStream> {
		LlmService::complete_streaming(self, request, cancel).await
	}
}

/// What to do when a tool execution fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ToolFailureMode {
	/// Serialize the error as the tool's result content so the model can
	/// react to it. This preserves the historical behavior.
	#[default]
	FeedErrorBack,
	/// Abort the turn with the tool error.
	FailLoop,
}

/// Tool loop configuration.
#[derive(Clone, Debug)]
pub struct ToolLoopConfig {
	/// Upper bound on completion calls per turn; the request may lower or
	/// raise it per call.
	pub max_iterations: u32,
	pub failure_mode: ToolFailureMode,
}

impl Default for ToolLoopConfig {
	fn default() -> Self {
		Self {
			max_iterations: DEFAULT_MAX_ITERATIONS,
			failure_mode: ToolFailureMode::default(),
		}
	}
}

/// Runs the invoke -> parse -> execute -> append cycle until the model
/// stops requesting tools or the iteration bound is hit.
pub struct ToolLoop {
	completer: Arc<dyn Completer>,
	executor: Arc<dyn ToolExecutor>,
	config: ToolLoopConfig,
}

impl ToolLoop {
	pub fn new(
		completer: Arc<dyn Completer>,
		executor: Arc<dyn ToolExecutor>,
		config: ToolLoopConfig,
	) -> Self {
		Self {
			completer,
			executor,
			config,
		}
	}

	pub(crate) fn completer(&self) -> Arc<dyn Completer> {
		self.completer.clone()
	}

	pub(crate) fn executor(&self) -> Arc<dyn ToolExecutor> {
		self.executor.clone()
	}

	pub(crate) fn config(&self) -> &ToolLoopConfig {
		&self.config
	}

	/// Effective iteration bound for a request.
	pub(crate) fn max_iterations(&self, request: &ChatRequest) -> u32 {
		request
			.max_tool_iterations
			.unwrap_or(self.config.max_iterations)
			.max(1)
	}

	/// Runs one conversation turn.
	///
	/// Returns the final response; at the iteration bound the last response
	/// is returned even if it still contains tool call blocks.
	pub async fn run(
		&self,
		request: &ChatRequest,
		cancel: &CancellationToken,
	) -> GatewayResult<ChatResponse> {
		let mut working = request.clone();
		inject_tool_prompt(&mut working.messages, &working.tools);
		let max_iterations = self.max_iterations(request);

		let mut iteration: u32 = 0;
		loop {
			iteration += 1;
			debug!(iteration, max_iterations, "tool loop invoking completion");
			let response = self.completer.complete(&working, cancel).await?;

			let invocations = parse_invocations(response.text());
			if invocations.is_empty() {
				return Ok(response);
			}
			if iteration >= max_iterations {
				warn!(
					iteration,
					pending_calls = invocations.len(),
					"tool iteration bound reached with pending tool calls"
				);
				return Ok(response);
			}

			info!(
				iteration,
				tool_calls = invocations.len(),
				"executing tool calls"
			);
			working.messages.push(Message::assistant(response.text()));
			for invocation in invocations {
				if cancel.is_cancelled() {
					return Err(GatewayError::Cancelled);
				}
				let content = self.execute_to_content(&invocation, cancel).await?;
				working.messages.push(Message::tool(&invocation.name, content));
			}
		}
	}

	/// Executes one invocation, serializing the outcome to tool-turn
	/// content. A tool failure either becomes an error payload the model
	/// can react to, or aborts the turn, per the configured failure mode.
	pub(crate) async fn execute_to_content(
		&self,
		invocation: &ToolInvocation,
		_cancel: &CancellationToken,
	) -> GatewayResult<String> {
		match self
			.executor
			.execute(&invocation.name, invocation.arguments.clone())
			.await
		{
			Ok(result) => Ok(serialize_result(&result)),
			Err(error) => {
				warn!(tool = %invocation.name, error = %error, "tool execution failed");
				match self.config.failure_mode {
					ToolFailureMode::FeedErrorBack => {
						Ok(serialize_result(&serde_json::json!({ "error": error.to_string() })))
					}
					ToolFailureMode::FailLoop => Err(GatewayError::Tool(error)),
				}
			}
		}
	}
}

pub(crate) fn serialize_result(value: &serde_json::Value) -> String {
	serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}
