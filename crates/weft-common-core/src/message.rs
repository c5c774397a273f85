// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Conversation message types shared by every layer.

use serde::{Deserialize, Serialize};

/// Role of a conversation message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	System,
	User,
	Assistant,
	/// Result of a tool execution, fed back into the conversation.
	Tool,
}

/// A single conversation turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
	pub role: Role,
	pub content: String,
	/// Tool name for `Role::Tool` turns.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
}

impl Message {
	pub fn system(content: impl Into<String>) -> Self {
		Self {
			role: Role::System,
			content: content.into(),
			name: None,
		}
	}

	pub fn user(content: impl Into<String>) -> Self {
		Self {
			role: Role::User,
			content: content.into(),
			name: None,
		}
	}

	pub fn assistant(content: impl Into<String>) -> Self {
		Self {
			role: Role::Assistant,
			content: content.into(),
			name: None,
		}
	}

	pub fn tool(name: impl Into<String>, content: impl Into<String>) -> Self {
		Self {
			role: Role::Tool,
			content: content.into(),
			name: Some(name.into()),
		}
	}
}
