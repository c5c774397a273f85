// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Parsing of tool invocation blocks out of model output.
//!
//! The provider-agnostic delimiter format is
//! `<tool_call>name(argument="value", n=3)</tool_call>`: an identifier
//! followed by a parenthesized list of `key=<json literal>` arguments.
//! [`ToolBlockScanner`] is the incremental variant for streaming: it emits
//! text that can no longer be part of an opening tag and buffers from a
//! possible tag prefix until the block completes or is disproven.

use serde_json::Value;
use tracing::warn;
use weft_common_core::ToolInvocation;

/// Opening delimiter of a tool invocation block.
pub const OPEN_TAG: &str = "<tool_call>";

/// Closing delimiter of a tool invocation block.
pub const CLOSE_TAG: &str = "</tool_call>";

/// Parses every complete tool invocation block in `text`.
///
/// Malformed blocks are logged and skipped rather than failing the turn.
pub fn parse_invocations(text: &str) -> Vec<ToolInvocation> {
	let mut invocations = Vec::new();
	let mut rest = text;
	while let Some(start) = rest.find(OPEN_TAG) {
		let after = &rest[start + OPEN_TAG.len()..];
		let Some(end) = after.find(CLOSE_TAG) else {
			break;
		};
		let body = &after[..end];
		match parse_invocation(body) {
			Some(invocation) => invocations.push(invocation),
			None => warn!(body = %body, "ignoring malformed tool invocation block"),
		}
		rest = &after[end + CLOSE_TAG.len()..];
	}
	invocations
}

/// Returns `text` with every complete tool invocation block removed.
pub fn strip_invocations(text: &str) -> String {
	let mut out = String::new();
	let mut rest = text;
	while let Some(start) = rest.find(OPEN_TAG) {
		out.push_str(&rest[..start]);
		let after = &rest[start + OPEN_TAG.len()..];
		let Some(end) = after.find(CLOSE_TAG) else {
			// Unterminated block: keep the raw text.
			out.push_str(&rest[start..]);
			return out;
		};
		rest = &after[end + CLOSE_TAG.len()..];
	}
	out.push_str(rest);
	out
}

/// Parses a single invocation body: `name(key=value, ...)`.
fn parse_invocation(body: &str) -> Option<ToolInvocation> {
	let body = body.trim();
	let open = body.find('(')?;
	let name = body[..open].trim();
	if !is_identifier(name) {
		return None;
	}
	if !body.ends_with(')') {
		return None;
	}
	let args_src = &body[open + 1..body.len() - 1];

	let mut invocation = ToolInvocation::new(name);
	let mut rest = args_src.trim_start();
	while !rest.is_empty() {
		let key_len: usize = rest
			.chars()
			.take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
			.map(char::len_utf8)
			.sum();
		if key_len == 0 {
			return None;
		}
		let key = &rest[..key_len];
		rest = rest[key_len..].trim_start();
		rest = rest.strip_prefix('=')?.trim_start();

		// Argument values are JSON literals; the stream deserializer tells
		// us how many bytes the value consumed.
		let mut values = serde_json::Deserializer::from_str(rest).into_iter::<Value>();
		let value = values.next()?.ok()?;
		let consumed = values.byte_offset();
		invocation.arguments.insert(key.to_string(), value);

		rest = rest[consumed..].trim_start();
		if let Some(stripped) = rest.strip_prefix(',') {
			rest = stripped.trim_start();
		} else if !rest.is_empty() {
			return None;
		}
	}
	Some(invocation)
}

fn is_identifier(name: &str) -> bool {
	let mut chars = name.chars();
	match chars.next() {
		Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
		_ => return false,
	}
	chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Output of one [`ToolBlockScanner::push`] call.
#[derive(Debug, Default)]
pub struct ScanOutput {
	/// Text confirmed to be outside any tool block.
	pub text: String,
	/// Invocations whose blocks completed within this push.
	pub invocations: Vec<ToolInvocation>,
}

/// Incremental scanner recognizing tool blocks across chunk boundaries.
pub struct ToolBlockScanner {
	buffer: String,
	in_block: bool,
}

impl ToolBlockScanner {
	pub fn new() -> Self {
		Self {
			buffer: String::new(),
			in_block: false,
		}
	}

	/// Feeds a text delta, returning the text safe to emit and any
	/// completed invocations.
	pub fn push(&mut self, delta: &str) -> ScanOutput {
		self.buffer.push_str(delta);
		let mut output = ScanOutput::default();

		loop {
			if self.in_block {
				let Some(end) = self.buffer.find(CLOSE_TAG) else {
					break;
				};
				let body = self.buffer[..end].to_string();
				self.buffer.drain(..end + CLOSE_TAG.len());
				self.in_block = false;
				match parse_invocation(&body) {
					Some(invocation) => output.invocations.push(invocation),
					None => warn!(body = %body, "ignoring malformed tool invocation block"),
				}
				continue;
			}

			let Some(start) = self.buffer.find('<') else {
				output.text.push_str(&self.buffer);
				self.buffer.clear();
				break;
			};
			output.text.push_str(&self.buffer[..start]);
			self.buffer.drain(..start);

			if self.buffer.starts_with(OPEN_TAG) {
				self.buffer.drain(..OPEN_TAG.len());
				self.in_block = true;
				continue;
			}
			if OPEN_TAG.starts_with(&self.buffer) {
				// Possible tag prefix; wait for more input.
				break;
			}
			// A '<' that does not open a tool block.
			output.text.push('<');
			self.buffer.drain(..1);
		}

		output
	}

	/// Flushes whatever remains when the stream ends. An unterminated
	/// block is returned as literal text.
	pub fn finish(&mut self) -> String {
		let mut tail = String::new();
		if self.in_block {
			tail.push_str(OPEN_TAG);
			self.in_block = false;
		}
		tail.push_str(&self.buffer);
		self.buffer.clear();
		tail
	}
}

impl Default for ToolBlockScanner {
	fn default() -> Self {
		Self::new()
	}
}
