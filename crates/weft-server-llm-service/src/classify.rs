// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Pattern-based classification of provider failures.
//!
//! Every other component decides retry/rotate/escalate from the result of
//! [`classify`]: the retry orchestrator consults `is_retryable`, the
//! fallback orchestrator consults `should_rotate_key` and treats
//! [`ErrorCategory::InvalidRequest`] as fatal. The rules live in one
//! ordered table; first match wins.

use serde::{Deserialize, Serialize};
use weft_common_core::LlmError;

/// Failure taxonomy shared across the gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
	RateLimited,
	AuthInvalid,
	QuotaExceeded,
	/// The request itself is malformed. Fatal: never retried on any
	/// credential or provider.
	InvalidRequest,
	TransientNetwork,
	Unknown,
}

impl ErrorCategory {
	/// Whether the same credential may be retried.
	pub fn is_retryable(&self) -> bool {
		match self {
			ErrorCategory::RateLimited | ErrorCategory::TransientNetwork | ErrorCategory::Unknown => {
				true
			}
			ErrorCategory::AuthInvalid
			| ErrorCategory::QuotaExceeded
			| ErrorCategory::InvalidRequest => false,
		}
	}

	/// Whether the failure should push selection to the next credential.
	pub fn should_rotate_key(&self) -> bool {
		!matches!(self, ErrorCategory::InvalidRequest)
	}
}

/// Classification of a single provider failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Classification {
	pub category: ErrorCategory,
	pub is_retryable: bool,
	pub should_rotate_key: bool,
}

impl From<ErrorCategory> for Classification {
	fn from(category: ErrorCategory) -> Self {
		Self {
			category,
			is_retryable: category.is_retryable(),
			should_rotate_key: category.should_rotate_key(),
		}
	}
}

/// Ordered substring rules, matched case-insensitively. First match wins,
/// so the more specific patterns come first.
const RULES: &[(&str, ErrorCategory)] = &[
	("invalid_request", ErrorCategory::InvalidRequest),
	("malformed", ErrorCategory::InvalidRequest),
	("invalid_api_key", ErrorCategory::AuthInvalid),
	("invalid x-api-key", ErrorCategory::AuthInvalid),
	("permission_denied", ErrorCategory::AuthInvalid),
	("unauthorized", ErrorCategory::AuthInvalid),
	("leaked", ErrorCategory::AuthInvalid),
	("403", ErrorCategory::AuthInvalid),
	("quota", ErrorCategory::QuotaExceeded),
	("billing", ErrorCategory::QuotaExceeded),
	("rate", ErrorCategory::RateLimited),
	("429", ErrorCategory::RateLimited),
	("limit", ErrorCategory::RateLimited),
	("exceeded", ErrorCategory::QuotaExceeded),
	("timeout", ErrorCategory::TransientNetwork),
	("econnreset", ErrorCategory::TransientNetwork),
	("connection", ErrorCategory::TransientNetwork),
	("503", ErrorCategory::TransientNetwork),
];

/// Classifies a raw failure message plus optional HTTP status code.
///
/// The status code is decisive when present; the message substring rules
/// are the fallback for transports that do not surface one.
pub fn classify_message(message: &str, status: Option<u16>) -> Classification {
	if let Some(status) = status {
		let category = match status {
			429 => Some(ErrorCategory::RateLimited),
			401 | 403 => Some(ErrorCategory::AuthInvalid),
			400 | 422 => Some(ErrorCategory::InvalidRequest),
			402 => Some(ErrorCategory::QuotaExceeded),
			500..=599 => Some(ErrorCategory::TransientNetwork),
			_ => None,
		};
		if let Some(category) = category {
			return category.into();
		}
	}

	let lowered = message.to_lowercase();
	for (pattern, category) in RULES {
		if lowered.contains(pattern) {
			return (*category).into();
		}
	}

	ErrorCategory::Unknown.into()
}

/// Classifies a provider error.
pub fn classify(error: &LlmError) -> Classification {
	match error {
		LlmError::Timeout => ErrorCategory::TransientNetwork.into(),
		LlmError::Api { message, status } => classify_message(message, *status),
		LlmError::Http(message) => classify_message(message, None),
		LlmError::InvalidResponse(message) => classify_message(message, None),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn category_of(message: &str) -> ErrorCategory {
		classify_message(message, None).category
	}

	#[test]
	fn rate_limit_messages() {
		assert_eq!(category_of("Rate limit exceeded"), ErrorCategory::RateLimited);
		assert_eq!(category_of("error 429: slow down"), ErrorCategory::RateLimited);
		assert_eq!(category_of("usage limit reached"), ErrorCategory::RateLimited);
	}

	#[test]
	fn auth_messages() {
		assert_eq!(category_of("invalid_api_key"), ErrorCategory::AuthInvalid);
		assert_eq!(category_of("401 Unauthorized"), ErrorCategory::AuthInvalid);
		assert_eq!(category_of("PERMISSION_DENIED"), ErrorCategory::AuthInvalid);
		assert_eq!(
			category_of("this key has been leaked and was revoked"),
			ErrorCategory::AuthInvalid
		);
		assert_eq!(category_of("403 Forbidden"), ErrorCategory::AuthInvalid);
	}

	#[test]
	fn quota_messages() {
		assert_eq!(category_of("quota exhausted for project"), ErrorCategory::QuotaExceeded);
		assert_eq!(
			category_of("monthly spend exceeded, check billing"),
			ErrorCategory::QuotaExceeded
		);
	}

	#[test]
	fn network_messages() {
		assert_eq!(category_of("request timeout"), ErrorCategory::TransientNetwork);
		assert_eq!(category_of("ECONNRESET"), ErrorCategory::TransientNetwork);
		assert_eq!(category_of("503 Service Unavailable"), ErrorCategory::TransientNetwork);
	}

	#[test]
	fn invalid_request_is_fatal() {
		let classification = classify_message("invalid_request: messages[0] missing role", None);
		assert_eq!(classification.category, ErrorCategory::InvalidRequest);
		assert!(!classification.is_retryable);
		assert!(!classification.should_rotate_key);
	}

	#[test]
	fn unknown_defaults_to_retryable_and_rotate_worthy() {
		let classification = classify_message("something odd happened", None);
		assert_eq!(classification.category, ErrorCategory::Unknown);
		assert!(classification.is_retryable);
		assert!(classification.should_rotate_key);
	}

	#[test]
	fn status_code_takes_precedence_over_message() {
		// The message alone would classify as rate-limited; the 401 status
		// pins it to an auth failure.
		let classification = classify_message("rate limit note", Some(401));
		assert_eq!(classification.category, ErrorCategory::AuthInvalid);

		let classification = classify_message("auth looks fine", Some(429));
		assert_eq!(classification.category, ErrorCategory::RateLimited);

		let classification = classify_message("", Some(400));
		assert_eq!(classification.category, ErrorCategory::InvalidRequest);

		let classification = classify_message("", Some(502));
		assert_eq!(classification.category, ErrorCategory::TransientNetwork);
	}

	#[test]
	fn rotate_worthy_flags_per_category() {
		assert!(Classification::from(ErrorCategory::RateLimited).should_rotate_key);
		assert!(Classification::from(ErrorCategory::AuthInvalid).should_rotate_key);
		assert!(!Classification::from(ErrorCategory::AuthInvalid).is_retryable);
		assert!(Classification::from(ErrorCategory::QuotaExceeded).should_rotate_key);
		assert!(!Classification::from(ErrorCategory::QuotaExceeded).is_retryable);
		assert!(!Classification::from(ErrorCategory::InvalidRequest).should_rotate_key);
	}

	#[test]
	fn llm_error_timeout_classifies_as_transient() {
		let classification = classify(&LlmError::Timeout);
		assert_eq!(classification.category, ErrorCategory::TransientNetwork);
		assert!(classification.is_retryable);
	}

	#[test]
	fn llm_error_api_uses_status() {
		let error = LlmError::Api {
			message: "nope".to_string(),
			status: Some(429),
		};
		assert_eq!(classify(&error).category, ErrorCategory::RateLimited);
	}
}
