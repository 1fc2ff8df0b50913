// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Consecutive-failure backoff schedule.

use std::time::Duration;

/// Default wait times, in milliseconds, for 1, 2 and 3+ consecutive failures.
pub const DEFAULT_BACKOFF_SCHEDULE_MS: [u64; 3] = [100, 500, 2000];

/// A fixed lookup table from consecutive failure count to wait time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffSchedule {
	steps: Vec<Duration>,
}

impl BackoffSchedule {
	/// Build a schedule from millisecond steps. An empty list behaves as no backoff.
	pub fn from_millis(steps: &[u64]) -> Self {
		Self {
			steps: steps.iter().copied().map(Duration::from_millis).collect(),
		}
	}

	/// Wait time after `consecutive_failures` failures.
	///
	/// Zero failures means no wait; counts beyond the table clamp to its last step.
	pub fn delay_for(&self, consecutive_failures: u32) -> Duration {
		if consecutive_failures == 0 {
			return Duration::ZERO;
		}
		let idx = (consecutive_failures as usize - 1).min(self.steps.len().saturating_sub(1));
		self.steps.get(idx).copied().unwrap_or(Duration::ZERO)
	}

	pub fn steps(&self) -> &[Duration] {
		&self.steps
	}
}

impl Default for BackoffSchedule {
	fn default() -> Self {
		Self::from_millis(&DEFAULT_BACKOFF_SCHEDULE_MS)
	}
}
