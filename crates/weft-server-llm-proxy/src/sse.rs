// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! SSE encoding and decoding of stream frames.
//!
//! Wire layout: each frame is `data: <json>\n\n`; the stream terminates
//! with `data: [DONE]\n\n`.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use pin_project_lite::pin_project;
use tracing::{trace, warn};
use weft_common_core::{ChatStream, LlmError};

use crate::types::{FrameContext, StreamFrame};

/// The terminal sentinel frame.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

const DONE_PAYLOAD: &str = "[DONE]";

/// Encodes one frame as an SSE data block.
pub fn encode_frame(frame: &StreamFrame) -> String {
	let json = serde_json::to_string(frame).unwrap_or_else(|error| {
		warn!(error = %error, "failed to serialize stream frame");
		"{}".to_string()
	});
	format!("data: {json}\n\n")
}

/// Encodes a chat event stream into wire chunks, ending with the DONE
/// sentinel.
pub fn encode_stream(
	events: ChatStream,
	context: FrameContext,
) -> Pin<Box<dyn Stream<Item = String> + Send>> {
	let frames = events
		.map(move |event| encode_frame(&StreamFrame::from_event(&context, &event)))
		.chain(futures::stream::once(async { DONE_FRAME.to_string() }));
	Box::pin(frames)
}

pin_project! {
		/// Buffered decoder turning an SSE byte stream back into frames.
		///
		/// Yields one `Result<StreamFrame, LlmError>` per data block and ends
		/// when the DONE sentinel arrives.
		pub struct SseFrameStream<E> {
				#[pin]
				inner: Pin<Box<dyn Stream<Item = Result<Bytes, E>> + Send>>,
				buffer: String,
				done: bool,
		}
}

impl<E: std::fmt::Display> SseFrameStream<E> {
	pub fn new(inner: Pin<Box<dyn Stream<Item = Result<Bytes, E>> + Send>>) -> Self {
		trace!("creating SSE frame decoder");
		Self {
			inner,
			buffer: String::new(),
			done: false,
		}
	}
}

/// Parses one SSE block: the concatenated payload of its `data:` lines.
fn parse_block(block: &str) -> Option<String> {
	let mut payload = String::new();
	for line in block.lines() {
		if let Some(value) = line.strip_prefix("data:") {
			payload.push_str(value.trim());
		}
	}
	if payload.is_empty() {
		None
	} else {
		Some(payload)
	}
}

impl<E: std::fmt::Display> Stream for SseFrameStream<E> {
	type Item = Result<StreamFrame, LlmError>;

	fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		let mut this = self.project();

		if *this.done {
			return Poll::Ready(None);
		}

		loop {
			while let Some(end) = this.buffer.find("\n\n") {
				let block = this.buffer[..end].to_string();
				*this.buffer = this.buffer[end + 2..].to_string();

				let Some(payload) = parse_block(&block) else {
					continue;
				};
				if payload == DONE_PAYLOAD {
					trace!("received DONE sentinel");
					*this.done = true;
					return Poll::Ready(None);
				}
				match serde_json::from_str::<StreamFrame>(&payload) {
					Ok(frame) => return Poll::Ready(Some(Ok(frame))),
					Err(error) => {
						warn!(error = %error, payload = %payload, "failed to parse stream frame");
						return Poll::Ready(Some(Err(LlmError::InvalidResponse(format!(
							"failed to parse stream frame: {error}"
						)))));
					}
				}
			}

			match this.inner.as_mut().poll_next(cx) {
				Poll::Ready(Some(Ok(bytes))) => match std::str::from_utf8(&bytes) {
					Ok(text) => this.buffer.push_str(text),
					Err(_) => {
						warn!("received non-UTF8 SSE data");
						return Poll::Ready(Some(Err(LlmError::InvalidResponse(
							"received non-UTF8 data".to_string(),
						))));
					}
				},
				Poll::Ready(Some(Err(error))) => {
					return Poll::Ready(Some(Err(LlmError::Http(error.to_string()))));
				}
				Poll::Ready(None) => {
					if !this.buffer.is_empty() {
						trace!(remaining = %this.buffer, "SSE stream ended with unparsed data");
					}
					return Poll::Ready(None);
				}
				Poll::Pending => return Poll::Pending,
			}
		}
	}
}
