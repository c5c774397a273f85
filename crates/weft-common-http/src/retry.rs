// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Bounded retry with exponential backoff.
//!
//! A failed attempt is retried only while attempts remain AND the caller's
//! predicate classifies the failure as retryable; otherwise the error
//! propagates immediately with no further delay. The sleep between attempts
//! is `base_delay * backoff_multiplier^(attempt-1)`, capped at `max_delay`.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Configuration for [`retry`].
#[derive(Clone, Debug)]
pub struct RetryConfig {
	/// Total number of attempts, including the first.
	pub max_attempts: u32,
	/// Delay before the second attempt.
	pub base_delay: Duration,
	/// Multiplier applied to the delay after each failed attempt.
	pub backoff_multiplier: f64,
	/// Upper bound on any single delay.
	pub max_delay: Duration,
	/// Randomize each delay to 50-100% of its nominal value. Off by
	/// default so delay sequences are exact.
	pub jitter: bool,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			base_delay: Duration::from_millis(1000),
			backoff_multiplier: 2.0,
			max_delay: Duration::from_secs(30),
			jitter: false,
		}
	}
}

impl RetryConfig {
	pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
		self.max_attempts = max_attempts;
		self
	}

	pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
		self.base_delay = base_delay;
		self
	}

	pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
		self.backoff_multiplier = multiplier;
		self
	}

	pub fn with_jitter(mut self, jitter: bool) -> Self {
		self.jitter = jitter;
		self
	}

	/// Delay to sleep after the given failed attempt (1-based).
	pub fn delay_for(&self, attempt: u32) -> Duration {
		let factor = self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
		let mut delay = self.base_delay.mul_f64(factor).min(self.max_delay);
		if self.jitter {
			delay = delay.mul_f64(0.5 + fastrand::f64() * 0.5);
		}
		delay
	}
}

/// Runs `op` with bounded retry. See [`retry_with_notify`] for the
/// observable variant.
pub async fn retry<T, E, F, Fut>(
	config: &RetryConfig,
	is_retryable: impl Fn(&E) -> bool,
	op: F,
) -> Result<T, E>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, E>>,
	E: std::fmt::Display,
{
	retry_with_notify(config, is_retryable, |_, _| {}, op).await
}

/// Runs `op` up to `config.max_attempts` times, invoking `on_retry(attempt,
/// &error)` before each re-attempt.
///
/// The error propagates immediately, without sleeping, when the failure is
/// not retryable or the final attempt has been spent.
pub async fn retry_with_notify<T, E, F, Fut>(
	config: &RetryConfig,
	is_retryable: impl Fn(&E) -> bool,
	mut on_retry: impl FnMut(u32, &E),
	mut op: F,
) -> Result<T, E>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, E>>,
	E: std::fmt::Display,
{
	let mut attempt: u32 = 1;
	loop {
		match op().await {
			Ok(value) => {
				if attempt > 1 {
					debug!(attempt, "operation succeeded after retry");
				}
				return Ok(value);
			}
			Err(error) => {
				if attempt >= config.max_attempts || !is_retryable(&error) {
					return Err(error);
				}
				let delay = config.delay_for(attempt);
				warn!(
						attempt,
						max_attempts = config.max_attempts,
						delay_ms = delay.as_millis() as u64,
						error = %error,
						"attempt failed, retrying after backoff"
				);
				on_retry(attempt, &error);
				tokio::time::sleep(delay).await;
				attempt += 1;
			}
		}
	}
}
