// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Batching configuration section.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_delivery::BatcherConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BatcherConfigLayer {
	pub debounce_ms: Option<u64>,
	pub max_batch_size: Option<usize>,
	pub max_pending_buffer: Option<usize>,
	pub retry_budget: Option<u32>,
}

impl BatcherConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.debounce_ms.is_some() {
			self.debounce_ms = other.debounce_ms;
		}
		if other.max_batch_size.is_some() {
			self.max_batch_size = other.max_batch_size;
		}
		if other.max_pending_buffer.is_some() {
			self.max_pending_buffer = other.max_pending_buffer;
		}
		if other.retry_budget.is_some() {
			self.retry_budget = other.retry_budget;
		}
	}

	pub fn finalize(self) -> BatcherSettings {
		let defaults = BatcherSettings::default();
		BatcherSettings {
			debounce_ms: self.debounce_ms.unwrap_or(defaults.debounce_ms),
			max_batch_size: self.max_batch_size.unwrap_or(defaults.max_batch_size),
			max_pending_buffer: self.max_pending_buffer.unwrap_or(defaults.max_pending_buffer),
			retry_budget: self.retry_budget.unwrap_or(defaults.retry_budget),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatcherSettings {
	pub debounce_ms: u64,
	pub max_batch_size: usize,
	pub max_pending_buffer: usize,
	pub retry_budget: u32,
}

impl Default for BatcherSettings {
	fn default() -> Self {
		Self {
			debounce_ms: 100,
			max_batch_size: 50,
			max_pending_buffer: 1000,
			retry_budget: 3,
		}
	}
}

impl BatcherSettings {
	/// Delivery-side config; the buffer kind is assigned per endpoint by the pipeline.
	pub fn to_batcher_config(&self) -> BatcherConfig {
		BatcherConfig {
			debounce: Duration::from_millis(self.debounce_ms),
			max_batch_size: self.max_batch_size,
			max_pending_buffer: self.max_pending_buffer,
			retry_budget: self.retry_budget,
			..BatcherConfig::default()
		}
	}
}
