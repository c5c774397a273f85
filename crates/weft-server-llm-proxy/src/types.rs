// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Wire format types for streamed gateway responses.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use weft_common_core::{
	ChatEvent, ChatResponse, Role, ToolCallEvent, ToolCallPhase, ToolInvocation,
};

/// Stream-level identity stamped on every frame.
#[derive(Clone, Debug)]
pub struct FrameContext {
	pub id: String,
	pub provider: String,
	pub model: String,
}

impl FrameContext {
	pub fn new(id: impl Into<String>, provider: impl Into<String>, model: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			provider: provider.into(),
			model: model.into(),
		}
	}
}

/// Incremental content of one choice.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FrameDelta {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub role: Option<Role>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub content: Option<String>,
}

/// One choice entry of a frame.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FrameChoice {
	pub index: u32,
	#[serde(default)]
	pub delta: FrameDelta,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub finish_reason: Option<String>,
}

/// Tool lifecycle payload carried by tool frames.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCallFrame {
	#[serde(rename = "type")]
	pub phase: ToolCallPhase,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub call: Option<ToolInvocation>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl From<ToolCallEvent> for ToolCallFrame {
	fn from(event: ToolCallEvent) -> Self {
		Self {
			phase: event.phase,
			call: Some(event.invocation),
			result: event.result,
			error: event.error,
		}
	}
}

/// One wire frame.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamFrame {
	pub id: String,
	pub provider: String,
	pub model: String,
	#[serde(default)]
	pub choices: Vec<FrameChoice>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tool_call: Option<ToolCallFrame>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl StreamFrame {
	fn base(context: &FrameContext) -> Self {
		Self {
			id: context.id.clone(),
			provider: context.provider.clone(),
			model: context.model.clone(),
			choices: Vec::new(),
			tool_call: None,
			error: None,
		}
	}

	/// A frame carrying incremental assistant text.
	pub fn text_delta(context: &FrameContext, content: impl Into<String>) -> Self {
		let mut frame = Self::base(context);
		frame.choices.push(FrameChoice {
			index: 0,
			delta: FrameDelta {
				role: Some(Role::Assistant),
				content: Some(content.into()),
			},
			finish_reason: None,
		});
		frame
	}

	/// A tool lifecycle frame.
	pub fn tool_event(context: &FrameContext, event: ToolCallEvent) -> Self {
		let mut frame = Self::base(context);
		frame.tool_call = Some(event.into());
		frame
	}

	/// The terminal frame for a completed response: empty delta plus the
	/// finish reason, stamped with the provider/model that actually served
	/// the request.
	pub fn completed(context: &FrameContext, response: &ChatResponse) -> Self {
		let mut frame = Self::base(context);
		frame.provider = response.provider.clone();
		frame.model = response.model.clone();
		frame.choices = response
			.choices
			.iter()
			.map(|choice| FrameChoice {
				index: choice.index,
				delta: FrameDelta::default(),
				finish_reason: choice.finish_reason.clone(),
			})
			.collect();
		frame
	}

	/// A frame reporting a terminal stream error.
	pub fn error(context: &FrameContext, message: impl Into<String>) -> Self {
		let mut frame = Self::base(context);
		frame.error = Some(message.into());
		frame
	}

	/// Converts a chat event into its wire frame.
	pub fn from_event(context: &FrameContext, event: &ChatEvent) -> Self {
		match event {
			ChatEvent::TextDelta { content } => Self::text_delta(context, content.clone()),
			ChatEvent::ToolCall(tool_event) => Self::tool_event(context, tool_event.clone()),
			ChatEvent::Completed(response) => Self::completed(context, response),
			ChatEvent::Error(error) => Self::error(context, error.to_string()),
		}
	}
}
