// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Circuit breaker configuration section.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_delivery::{BackoffSchedule, CircuitBreakerConfig, DEFAULT_BACKOFF_SCHEDULE_MS};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BreakerConfigLayer {
	pub max_failures: Option<u32>,
	pub reset_timeout_ms: Option<u64>,
	pub backoff_schedule_ms: Option<Vec<u64>>,
}

impl BreakerConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.max_failures.is_some() {
			self.max_failures = other.max_failures;
		}
		if other.reset_timeout_ms.is_some() {
			self.reset_timeout_ms = other.reset_timeout_ms;
		}
		if other.backoff_schedule_ms.is_some() {
			self.backoff_schedule_ms = other.backoff_schedule_ms;
		}
	}

	pub fn finalize(self) -> BreakerSettings {
		let defaults = BreakerSettings::default();
		BreakerSettings {
			max_failures: self.max_failures.unwrap_or(defaults.max_failures),
			reset_timeout_ms: self.reset_timeout_ms.unwrap_or(defaults.reset_timeout_ms),
			backoff_schedule_ms: self.backoff_schedule_ms.unwrap_or(defaults.backoff_schedule_ms),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BreakerSettings {
	pub max_failures: u32,
	pub reset_timeout_ms: u64,
	pub backoff_schedule_ms: Vec<u64>,
}

impl Default for BreakerSettings {
	fn default() -> Self {
		Self {
			max_failures: 5,
			reset_timeout_ms: 30_000,
			backoff_schedule_ms: DEFAULT_BACKOFF_SCHEDULE_MS.to_vec(),
		}
	}
}

impl BreakerSettings {
	pub fn to_breaker_config(&self) -> CircuitBreakerConfig {
		CircuitBreakerConfig {
			max_failures: self.max_failures,
			reset_timeout: Duration::from_millis(self.reset_timeout_ms),
			backoff: BackoffSchedule::from_millis(&self.backoff_schedule_ms),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults_match_delivery_defaults() {
		let config = BreakerSettings::default().to_breaker_config();
		let expected = CircuitBreakerConfig::default();
		assert_eq!(config.max_failures, expected.max_failures);
		assert_eq!(config.reset_timeout, expected.reset_timeout);
		assert_eq!(config.backoff, expected.backoff);
	}

	#[test]
	fn test_schedule_from_toml() {
		let layer: BreakerConfigLayer = toml::from_str("backoff_schedule_ms = [50, 250]").unwrap();
		let config = layer.finalize().to_breaker_config();
		assert_eq!(config.backoff.delay_for(5), Duration::from_millis(250));
		assert_eq!(config.max_failures, 5);
	}
}
