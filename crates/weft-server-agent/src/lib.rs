// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! The agentic tool-call loop.
//!
//! A model requests tool execution through a delimiter block in its text
//! output. Each turn: a tool-aware system prompt is injected, the
//! completion call is delegated to the gateway, tool invocation blocks are
//! parsed out of the response, the tools are executed, and the serialized
//! results are appended as a new conversation turn before re-invoking —
//! bounded by a configurable maximum number of completion calls. The
//! streaming variant interleaves tool lifecycle events with text deltas on
//! the same event channel.

pub mod parse;
pub mod prompt;
pub mod registry;
pub mod runner;
pub mod stream;

pub use parse::{parse_invocations, strip_invocations, ToolBlockScanner};
pub use prompt::{inject_tool_prompt, render_tool_prompt};
pub use registry::{Tool, ToolExecutor, ToolRegistry};
pub use runner::{Completer, ToolFailureMode, ToolLoop, ToolLoopConfig};
