// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Source map resolution configuration section.

use serde::{Deserialize, Serialize};
use tether_delivery::DEFAULT_SOURCE_MAP_CACHE_CAPACITY;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SourceMapsConfigLayer {
	pub enabled: Option<bool>,
	pub cache_capacity: Option<usize>,
}

impl SourceMapsConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.enabled.is_some() {
			self.enabled = other.enabled;
		}
		if other.cache_capacity.is_some() {
			self.cache_capacity = other.cache_capacity;
		}
	}

	pub fn finalize(self) -> SourceMapsSettings {
		SourceMapsSettings {
			enabled: self.enabled.unwrap_or(true),
			cache_capacity: self.cache_capacity.unwrap_or(DEFAULT_SOURCE_MAP_CACHE_CAPACITY),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceMapsSettings {
	pub enabled: bool,
	pub cache_capacity: usize,
}

impl Default for SourceMapsSettings {
	fn default() -> Self {
		SourceMapsConfigLayer::default().finalize()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let config = SourceMapsSettings::default();
		assert!(config.enabled);
		assert_eq!(config.cache_capacity, 50);
	}

	#[test]
	fn test_disable_from_toml() {
		let layer: SourceMapsConfigLayer = toml::from_str("enabled = false").unwrap();
		assert!(!layer.finalize().enabled);
	}
}
