// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Tool-aware system prompt generation.

use weft_common_core::{Message, Role, ToolDefinition};

use crate::parse::{CLOSE_TAG, OPEN_TAG};

/// Renders the system-prompt fragment describing the available tools and
/// the invocation block syntax.
pub fn render_tool_prompt(tools: &[ToolDefinition]) -> String {
	let mut out = String::from("You have access to the following tools:\n");

	for tool in tools {
		out.push_str(&format!("\n## {}\n{}\n", tool.name, tool.description));
		if tool.parameters.is_empty() {
			continue;
		}
		out.push_str("Parameters:\n");
		for parameter in &tool.parameters {
			let mut line = format!("- {} ({})", parameter.name, parameter.kind.as_str());
			if parameter.required {
				line.push_str(", required");
			}
			if !parameter.enum_values.is_empty() {
				line.push_str(&format!(", one of: {}", parameter.enum_values.join(", ")));
			}
			if let Some(default) = &parameter.default {
				line.push_str(&format!(", default: {default}"));
			}
			line.push_str(&format!(": {}\n", parameter.description));
			out.push_str(&line);
		}
	}

	out.push_str(&format!(
		"\nTo call a tool, emit exactly one block per call:\n\
		 {OPEN_TAG}tool_name(argument=\"value\", count=3){CLOSE_TAG}\n\
		 Argument values are JSON literals. After emitting a block, stop and \
		 wait for the tool result before continuing."
	));
	out
}

/// Merges the tool prompt into an existing leading system message, or
/// prepends a new one. A request without tools is left untouched.
pub fn inject_tool_prompt(messages: &mut Vec<Message>, tools: &[ToolDefinition]) {
	if tools.is_empty() {
		return;
	}
	let fragment = render_tool_prompt(tools);
	if let Some(first) = messages.first_mut() {
		if first.role == Role::System {
			first.content = format!("{}\n\n{}", first.content, fragment);
			return;
		}
	}
	messages.insert(0, Message::system(fragment));
}
