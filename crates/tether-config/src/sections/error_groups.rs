// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error grouping configuration section.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_delivery::ErrorGroupConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ErrorGroupsConfigLayer {
	pub dedup_window_ms: Option<u64>,
	pub flush_interval_ms: Option<u64>,
	pub max_tracked: Option<usize>,
	pub max_age_ms: Option<u64>,
}

impl ErrorGroupsConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.dedup_window_ms.is_some() {
			self.dedup_window_ms = other.dedup_window_ms;
		}
		if other.flush_interval_ms.is_some() {
			self.flush_interval_ms = other.flush_interval_ms;
		}
		if other.max_tracked.is_some() {
			self.max_tracked = other.max_tracked;
		}
		if other.max_age_ms.is_some() {
			self.max_age_ms = other.max_age_ms;
		}
	}

	pub fn finalize(self) -> ErrorGroupsSettings {
		ErrorGroupsSettings {
			dedup_window_ms: self.dedup_window_ms.unwrap_or(5_000),
			flush_interval_ms: self.flush_interval_ms.unwrap_or(10_000),
			max_tracked: self.max_tracked.unwrap_or(100),
			max_age_ms: self.max_age_ms.unwrap_or(3_600_000), // 1 hour
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorGroupsSettings {
	pub dedup_window_ms: u64,
	pub flush_interval_ms: u64,
	pub max_tracked: usize,
	pub max_age_ms: u64,
}

impl Default for ErrorGroupsSettings {
	fn default() -> Self {
		ErrorGroupsConfigLayer::default().finalize()
	}
}

impl ErrorGroupsSettings {
	pub fn to_error_group_config(&self) -> ErrorGroupConfig {
		ErrorGroupConfig {
			dedup_window: Duration::from_millis(self.dedup_window_ms),
			flush_interval: Duration::from_millis(self.flush_interval_ms),
			max_tracked: self.max_tracked,
			max_age: Duration::from_millis(self.max_age_ms),
		}
	}
}
