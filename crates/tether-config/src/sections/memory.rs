// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Memory pressure configuration section.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_delivery::MemoryConfig;

const MB: usize = 1024 * 1024;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MemoryConfigLayer {
	pub soft_limit_bytes: Option<usize>,
	pub hard_limit_bytes: Option<usize>,
	pub check_interval_ms: Option<u64>,
}

impl MemoryConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.soft_limit_bytes.is_some() {
			self.soft_limit_bytes = other.soft_limit_bytes;
		}
		if other.hard_limit_bytes.is_some() {
			self.hard_limit_bytes = other.hard_limit_bytes;
		}
		if other.check_interval_ms.is_some() {
			self.check_interval_ms = other.check_interval_ms;
		}
	}

	pub fn finalize(self) -> MemorySettings {
		MemorySettings {
			soft_limit_bytes: self.soft_limit_bytes.unwrap_or(20 * MB),
			hard_limit_bytes: self.hard_limit_bytes.unwrap_or(50 * MB),
			check_interval_ms: self.check_interval_ms.unwrap_or(30_000),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemorySettings {
	pub soft_limit_bytes: usize,
	pub hard_limit_bytes: usize,
	pub check_interval_ms: u64,
}

impl Default for MemorySettings {
	fn default() -> Self {
		MemoryConfigLayer::default().finalize()
	}
}

impl MemorySettings {
	pub fn to_memory_config(&self) -> MemoryConfig {
		MemoryConfig {
			soft_limit_bytes: self.soft_limit_bytes,
			hard_limit_bytes: self.hard_limit_bytes,
			check_interval: Duration::from_millis(self.check_interval_ms),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults_match_delivery_defaults() {
		let config = MemorySettings::default().to_memory_config();
		let expected = MemoryConfig::default();
		assert_eq!(config.soft_limit_bytes, expected.soft_limit_bytes);
		assert_eq!(config.hard_limit_bytes, expected.hard_limit_bytes);
		assert_eq!(config.check_interval, expected.check_interval);
	}
}
