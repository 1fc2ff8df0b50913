// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Collector connection status shared by every batcher of a pipeline.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{info, warn};

/// Whether the most recent delivery attempt reached the collector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
	pub connected: bool,
	pub last_error: Option<String>,
	pub last_changed: Option<DateTime<Utc>>,
}

/// Thread-safe holder for a [`ConnectionStatus`].
#[derive(Debug, Default)]
pub struct ConnectionTracker {
	status: RwLock<ConnectionStatus>,
}

impl ConnectionTracker {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn mark_connected(&self) {
		let mut status = self.status.write();
		if !status.connected {
			info!("collector connected");
			status.connected = true;
			status.last_changed = Some(Utc::now());
		}
		status.last_error = None;
	}

	pub fn mark_disconnected(&self, error: &str) {
		let mut status = self.status.write();
		if status.connected || status.last_changed.is_none() {
			warn!(error, "collector disconnected");
			status.connected = false;
			status.last_changed = Some(Utc::now());
		}
		status.last_error = Some(error.to_string());
	}

	pub fn snapshot(&self) -> ConnectionStatus {
		self.status.read().clone()
	}

	pub fn is_connected(&self) -> bool {
		self.status.read().connected
	}
}
