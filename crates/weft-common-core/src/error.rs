// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use thiserror::Error;

/// Result type alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors raised by a single provider backend call.
///
/// Backends attach the HTTP status code where the transport exposes one;
/// the error classifier consumes both the message and the status.
#[derive(Clone, Error, Debug)]
pub enum LlmError {
	#[error("HTTP error: {0}")]
	Http(String),

	#[error("API error: {message}")]
	Api {
		message: String,
		status: Option<u16>,
	},

	#[error("Request timed out")]
	Timeout,

	#[error("Invalid response: {0}")]
	InvalidResponse(String),
}

impl LlmError {
	/// The HTTP status code associated with this failure, where known.
	pub fn status(&self) -> Option<u16> {
		match self {
			LlmError::Api { status, .. } => *status,
			_ => None,
		}
	}
}

/// Errors that can occur during tool execution.
#[derive(Clone, Error, Debug)]
pub enum ToolError {
	#[error("Tool not found: {0}")]
	NotFound(String),

	#[error("Invalid arguments: {0}")]
	InvalidArguments(String),

	#[error("Tool execution failed: {0}")]
	Execution(String),

	#[error("Tool execution timed out")]
	Timeout,

	#[error("Serialization error: {0}")]
	Serialization(String),
}

/// Caller-facing error for a completion call, after local recovery
/// (retry, credential rotation, provider fallback) has been exhausted or
/// short-circuited.
#[derive(Clone, Error, Debug)]
pub enum GatewayError {
	/// The request itself is malformed (missing fields); no attempt was
	/// made against any provider.
	#[error("validation error: {0}")]
	Validation(String),

	/// A provider rejected the request as malformed. Fatal: never retried,
	/// never rotated, propagated verbatim.
	#[error("invalid request: {0}")]
	InvalidRequest(String),

	/// Every credential of the requested provider failed.
	#[error("all credentials exhausted for provider '{provider}': {last_error}")]
	CredentialsExhausted {
		provider: String,
		last_error: String,
	},

	/// Every candidate provider/model pair failed.
	#[error("all providers exhausted after trying [{}]: {last_error}", .tried.join(", "))]
	Exhausted {
		tried: Vec<String>,
		last_error: String,
	},

	/// The service cannot currently serve the request (catalog
	/// unavailable, provider disabled).
	#[error("service unavailable: {0}")]
	Unavailable(String),

	/// The caller cancelled the request.
	#[error("request cancelled")]
	Cancelled,

	#[error(transparent)]
	Provider(#[from] LlmError),

	#[error("tool error: {0}")]
	Tool(#[from] ToolError),
}

impl GatewayError {
	/// Whether this error is terminal for the whole call, as opposed to a
	/// single attempt that fallback may still recover from.
	pub fn is_fatal(&self) -> bool {
		matches!(
			self,
			GatewayError::Validation(_) | GatewayError::InvalidRequest(_) | GatewayError::Cancelled
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn exhausted_error_lists_tried_pairs() {
		let err = GatewayError::Exhausted {
			tried: vec!["openai:gpt-4o".to_string(), "anthropic:claude-3".to_string()],
			last_error: "rate limited".to_string(),
		};
		let text = err.to_string();
		assert!(text.contains("openai:gpt-4o"));
		assert!(text.contains("anthropic:claude-3"));
		assert!(text.contains("rate limited"));
	}

	#[test]
	fn api_error_carries_status() {
		let err = LlmError::Api {
			message: "too many requests".to_string(),
			status: Some(429),
		};
		assert_eq!(err.status(), Some(429));
		assert_eq!(LlmError::Timeout.status(), None);
	}

	#[test]
	fn fatal_categories() {
		assert!(GatewayError::Cancelled.is_fatal());
		assert!(GatewayError::Validation("no messages".into()).is_fatal());
		assert!(GatewayError::InvalidRequest("bad schema".into()).is_fatal());
		assert!(!GatewayError::Provider(LlmError::Timeout).is_fatal());
	}
}
