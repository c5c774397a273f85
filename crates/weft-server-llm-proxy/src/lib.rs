// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Streaming wire format for gateway responses.
//!
//! Frames travel as newline-delimited `data: <json>` blocks terminated by
//! `data: [DONE]`. Normal frames carry incremental choice deltas; tool
//! lifecycle frames carry an additional `tool_call` field interleaved on
//! the same stream.

pub mod sse;
pub mod types;

pub use sse::{encode_frame, encode_stream, SseFrameStream, DONE_FRAME};
pub use types::{FrameChoice, FrameContext, FrameDelta, StreamFrame, ToolCallFrame};
