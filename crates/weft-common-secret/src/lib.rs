// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Secret wrapper type that prevents accidental logging of sensitive values.
//!
//! [`Secret<T>`] wraps credential material (API keys, tokens) so that `Debug`
//! and `Display` render `[REDACTED]` instead of the value. The wrapped value
//! is zeroized on drop. Use [`Secret::expose`] at the single point where the
//! raw value is actually needed (e.g. building an Authorization header).

use zeroize::Zeroize;

/// The placeholder printed in place of a secret value.
pub const REDACTED: &str = "[REDACTED]";

/// A wrapper that hides its contents from `Debug`/`Display` output.
pub struct Secret<T: Zeroize> {
	inner: T,
}

/// A secret string value, the common case for API keys.
pub type SecretString = Secret<String>;

impl<T: Zeroize> Secret<T> {
	/// Wraps a sensitive value.
	pub fn new(inner: T) -> Self {
		Self { inner }
	}

	/// Returns a reference to the wrapped value.
	///
	/// Call sites should be the only places the raw value escapes the
	/// wrapper; never pass the result to a logging macro.
	pub fn expose(&self) -> &T {
		&self.inner
	}
}

impl<T: Zeroize> Drop for Secret<T> {
	fn drop(&mut self) {
		self.inner.zeroize();
	}
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
	fn clone(&self) -> Self {
		Self {
			inner: self.inner.clone(),
		}
	}
}

impl<T: Zeroize> std::fmt::Debug for Secret<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(REDACTED)
	}
}

impl<T: Zeroize> std::fmt::Display for Secret<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(REDACTED)
	}
}

impl From<&str> for SecretString {
	fn from(value: &str) -> Self {
		Self::new(value.to_string())
	}
}

impl From<String> for SecretString {
	fn from(value: String) -> Self {
		Self::new(value)
	}
}

/// Serialization writes `[REDACTED]` so secrets never leak into serialized
/// snapshots (admin views, debug dumps). Deserialization accepts the raw
/// value and wraps it.
#[cfg(feature = "serde")]
impl<T: Zeroize> serde::Serialize for Secret<T> {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		serializer.serialize_str(REDACTED)
	}
}

#[cfg(feature = "serde")]
impl<'de, T: Zeroize + serde::Deserialize<'de>> serde::Deserialize<'de> for Secret<T> {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		T::deserialize(deserializer).map(Secret::new)
	}
}
