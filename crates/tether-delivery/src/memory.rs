// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Memory pressure estimation over everything the pipeline is buffering.
//!
//! Sizes are estimated, not measured: each buffered entry is charged a fixed
//! per-kind average plus the length of its large payload fields.

use std::fmt;
use std::sync::Weak;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tether_core::Entry;
use tracing::{info, warn};

/// Estimated bytes for a console/log entry.
pub const LOG_ENTRY_BYTES: usize = 500;
/// Fixed overhead for a captured network body, before body lengths.
pub const NETWORK_BODY_OVERHEAD_BYTES: usize = 300;
/// Fixed overhead for a websocket event, before the frame data length.
pub const WEBSOCKET_EVENT_OVERHEAD_BYTES: usize = 200;
/// Estimated bytes for a user action.
pub const ACTION_BYTES: usize = 500;

/// What a buffer holds, which decides how its entries are sized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferKind {
	Logs,
	NetworkBodies,
	WebSocketEvents,
	Actions,
	PerformanceSnapshots,
}

impl BufferKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Logs => "logs",
			Self::NetworkBodies => "network_bodies",
			Self::WebSocketEvents => "websocket_events",
			Self::Actions => "actions",
			Self::PerformanceSnapshots => "performance_snapshots",
		}
	}

	/// Estimated in-memory size of one entry of this kind.
	pub fn estimate(&self, entry: &Entry) -> usize {
		let str_len = |key: &str| entry.get_str(key).map_or(0, str::len);
		match self {
			Self::Logs | Self::PerformanceSnapshots => LOG_ENTRY_BYTES,
			Self::NetworkBodies => {
				NETWORK_BODY_OVERHEAD_BYTES + str_len("requestBody") + str_len("responseBody")
			}
			Self::WebSocketEvents => WEBSOCKET_EVENT_OVERHEAD_BYTES + str_len("data"),
			Self::Actions => ACTION_BYTES,
		}
	}
}

impl fmt::Display for BufferKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Anything that buffers entries and can estimate its own footprint.
pub trait MemorySource: Send + Sync {
	fn estimated_bytes(&self) -> usize;
}

/// Discrete memory pressure levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryPressureLevel {
	Normal,
	Soft,
	Hard,
}

impl MemoryPressureLevel {
	/// Fraction of configured capacity consumers should use at this level.
	pub fn capacity_multiplier(&self) -> f64 {
		match self {
			Self::Normal => 1.0,
			Self::Soft | Self::Hard => 0.5,
		}
	}
}

impl fmt::Display for MemoryPressureLevel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Normal => "normal",
			Self::Soft => "soft",
			Self::Hard => "hard",
		})
	}
}

/// Result of the most recent check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemoryPressureState {
	pub level: MemoryPressureLevel,
	pub estimated_bytes: usize,
	pub effective_capacity_multiplier: f64,
}

impl Default for MemoryPressureState {
	fn default() -> Self {
		Self {
			level: MemoryPressureLevel::Normal,
			estimated_bytes: 0,
			effective_capacity_multiplier: 1.0,
		}
	}
}

#[derive(Debug, Clone)]
pub struct MemoryConfig {
	pub soft_limit_bytes: usize,
	pub hard_limit_bytes: usize,
	pub check_interval: Duration,
}

impl Default for MemoryConfig {
	fn default() -> Self {
		Self {
			soft_limit_bytes: 20 * 1024 * 1024,
			hard_limit_bytes: 50 * 1024 * 1024,
			check_interval: Duration::from_secs(30),
		}
	}
}

struct Registration {
	kind: BufferKind,
	source: Weak<dyn MemorySource>,
}

/// Tracks estimated buffered bytes across registered sources.
///
/// The level is only recomputed by [`MemoryPressureMonitor::check`]; reads
/// between checks return the cached state.
pub struct MemoryPressureMonitor {
	config: MemoryConfig,
	sources: Mutex<Vec<Registration>>,
	state: RwLock<MemoryPressureState>,
}

impl MemoryPressureMonitor {
	pub fn new(config: MemoryConfig) -> Self {
		Self {
			config,
			sources: Mutex::new(Vec::new()),
			state: RwLock::new(MemoryPressureState::default()),
		}
	}

	pub fn config(&self) -> &MemoryConfig {
		&self.config
	}

	/// Include a buffer in future estimates. Dropped sources are pruned on check.
	pub fn register(&self, kind: BufferKind, source: Weak<dyn MemorySource>) {
		self.sources.lock().push(Registration { kind, source });
	}

	/// Recompute the estimate and level.
	pub fn check(&self) -> MemoryPressureState {
		let estimated_bytes = {
			let mut sources = self.sources.lock();
			sources.retain(|r| r.source.strong_count() > 0);
			sources
				.iter()
				.filter_map(|r| r.source.upgrade())
				.map(|source| source.estimated_bytes())
				.sum()
		};

		let level = self.level_for(estimated_bytes);
		let next = MemoryPressureState {
			level,
			estimated_bytes,
			effective_capacity_multiplier: level.capacity_multiplier(),
		};

		let previous = std::mem::replace(&mut *self.state.write(), next);
		if previous.level != level {
			if level > previous.level {
				warn!(%level, estimated_bytes, "memory pressure increased");
			} else {
				info!(%level, estimated_bytes, "memory pressure eased");
			}
		}
		next
	}

	fn level_for(&self, bytes: usize) -> MemoryPressureLevel {
		if bytes >= self.config.hard_limit_bytes {
			MemoryPressureLevel::Hard
		} else if bytes >= self.config.soft_limit_bytes {
			MemoryPressureLevel::Soft
		} else {
			MemoryPressureLevel::Normal
		}
	}

	pub fn level(&self) -> MemoryPressureLevel {
		self.state.read().level
	}

	pub fn state(&self) -> MemoryPressureState {
		*self.state.read()
	}

	/// Scale a configured capacity by the current level, never below 1.
	pub fn effective_capacity(&self, base: usize) -> usize {
		match self.level() {
			MemoryPressureLevel::Normal => base,
			MemoryPressureLevel::Soft | MemoryPressureLevel::Hard => (base / 2).max(1),
		}
	}

	/// Whether upstream capture of heavy payloads (bodies, video) may continue.
	pub fn heavy_capture_allowed(&self) -> bool {
		self.level() < MemoryPressureLevel::Hard
	}

	/// Estimated bytes per registered kind, for diagnostics.
	pub fn breakdown(&self) -> Vec<(BufferKind, usize)> {
		self.sources
			.lock()
			.iter()
			.filter_map(|r| r.source.upgrade().map(|s| (r.kind, s.estimated_bytes())))
			.collect()
	}
}

impl fmt::Debug for MemoryPressureMonitor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("MemoryPressureMonitor")
			.field("config", &self.config)
			.field("sources", &self.sources.lock().len())
			.field("state", &*self.state.read())
			.finish()
	}
}

impl Default for MemoryPressureMonitor {
	fn default() -> Self {
		Self::new(MemoryConfig::default())
	}
}
