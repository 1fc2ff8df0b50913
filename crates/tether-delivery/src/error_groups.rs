// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Deduplication and aggregation of repeated error entries.
//!
//! Error and warning entries are grouped by a signature derived from their
//! kind. The first occurrence is sent; duplicates inside the dedup window are
//! counted and later emitted as a single aggregated entry by
//! [`ErrorGroupTracker::flush`].

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tether_core::entry::format_ts;
use tether_core::{Entry, EntryKind};
use tether_symbolicate::parse_stack_frame;
use tracing::debug;

/// Longest console argument text used in a signature.
const CONSOLE_SIGNATURE_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct ErrorGroupConfig {
	/// Duplicates seen within this long of the previous one are suppressed.
	pub dedup_window: Duration,
	/// Interval of the periodic aggregate flush.
	pub flush_interval: Duration,
	/// Maximum groups tracked at once.
	pub max_tracked: usize,
	/// Groups untouched for this long are removed by the stale sweep.
	pub max_age: Duration,
}

impl Default for ErrorGroupConfig {
	fn default() -> Self {
		Self {
			dedup_window: Duration::from_secs(5),
			flush_interval: Duration::from_secs(10),
			max_tracked: 100,
			max_age: Duration::from_secs(3600),
		}
	}
}

/// A set of identical errors seen close together.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorGroup {
	pub signature: String,
	pub entry: Entry,
	pub count: u32,
	pub first_seen: DateTime<Utc>,
	pub last_seen: DateTime<Utc>,
}

/// What to do with an entry after grouping.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupOutcome {
	/// Forward this entry (possibly annotated).
	Send(Entry),
	/// A duplicate within the dedup window; counted, not forwarded.
	Suppressed,
}

impl GroupOutcome {
	pub fn should_send(&self) -> bool {
		matches!(self, Self::Send(_))
	}

	pub fn into_entry(self) -> Option<Entry> {
		match self {
			Self::Send(entry) => Some(entry),
			Self::Suppressed => None,
		}
	}
}

/// Build the deduplication key for an entry.
///
/// The key is `type:level:discriminator`, where the discriminator depends on
/// the entry kind.
pub fn create_error_signature(entry: &Entry) -> String {
	let discriminator = match entry.kind() {
		EntryKind::Exception { message, stack } => {
			let frame = stack.and_then(first_named_frame).unwrap_or_default();
			format!("{message}|{frame}")
		}
		EntryKind::Network { method, url, status } => {
			let status = status.map(|s| s.to_string()).unwrap_or_default();
			format!("{method} {}|{status}", url_path(url))
		}
		EntryKind::Console { args } => {
			let first = match args.first() {
				Some(serde_json::Value::String(s)) => s.clone(),
				Some(other) => other.to_string(),
				None => String::new(),
			};
			first.chars().take(CONSOLE_SIGNATURE_CHARS).collect()
		}
		EntryKind::WebSocket { event, url } => format!("{event} {url}"),
		EntryKind::Action { action } => action.to_string(),
		EntryKind::Performance => String::new(),
		EntryKind::Other(_) => entry
			.get_str("message")
			.unwrap_or_default()
			.chars()
			.take(CONSOLE_SIGNATURE_CHARS)
			.collect(),
	};
	format!("{}:{}:{}", entry.entry_type(), entry.level(), discriminator)
}

/// First frame of a stack that carries a real location, skipping the message
/// line and `<anonymous>` frames. The function name, when present, is kept so
/// distinct functions sharing a location stay distinct.
fn first_named_frame(stack: &str) -> Option<String> {
	stack.lines().skip(1).find_map(|line| {
		parse_stack_frame(line).map(|frame| match frame.function {
			Some(function) => format!("{function}@{}:{}:{}", frame.url, frame.line, frame.column),
			None => format!("{}:{}:{}", frame.url, frame.line, frame.column),
		})
	})
}

/// URL path without query string or fragment.
fn url_path(raw: &str) -> &str {
	let end = raw.find(['?', '#']).unwrap_or(raw.len());
	&raw[..end]
}

/// Tracks error groups. Not internally synchronized; the pipeline wraps it
/// in a lock.
#[derive(Debug, Default)]
pub struct ErrorGroupTracker {
	config: ErrorGroupConfig,
	groups: HashMap<String, ErrorGroup>,
}

impl ErrorGroupTracker {
	pub fn new(config: ErrorGroupConfig) -> Self {
		Self {
			config,
			groups: HashMap::new(),
		}
	}

	pub fn config(&self) -> &ErrorGroupConfig {
		&self.config
	}

	pub fn process(&mut self, entry: Entry) -> GroupOutcome {
		self.process_at(entry, Utc::now())
	}

	/// Group `entry` as if it arrived at `now`.
	pub fn process_at(&mut self, entry: Entry, now: DateTime<Utc>) -> GroupOutcome {
		if !entry.level().is_error_or_warn() {
			return GroupOutcome::Send(entry);
		}

		let signature = create_error_signature(&entry);
		let window = self.config.dedup_window;

		if let Some(group) = self.groups.get_mut(&signature) {
			if elapsed(group.last_seen, now) < window {
				group.count += 1;
				group.last_seen = now;
				return GroupOutcome::Suppressed;
			}

			let previous = group.count;
			group.count = 1;
			group.first_seen = now;
			group.last_seen = now;
			if previous > 1 {
				return GroupOutcome::Send(entry.with("_previousOccurrences", previous - 1));
			}
			return GroupOutcome::Send(entry);
		}

		if self.groups.len() >= self.config.max_tracked {
			self.evict_least_recent();
		}
		self.groups.insert(
			signature.clone(),
			ErrorGroup {
				signature,
				entry: entry.clone(),
				count: 1,
				first_seen: now,
				last_seen: now,
			},
		);
		GroupOutcome::Send(entry)
	}

	fn evict_least_recent(&mut self) {
		let oldest = self
			.groups
			.values()
			.min_by_key(|g| g.last_seen)
			.map(|g| g.signature.clone());
		if let Some(signature) = oldest {
			debug!(signature = %signature, "evicting least recently seen error group");
			self.groups.remove(&signature);
		}
	}

	pub fn flush(&mut self) -> Vec<Entry> {
		self.flush_at(Utc::now())
	}

	/// Emit one aggregated entry per group with repeats, reset their counts,
	/// and delete groups untouched for more than twice the flush interval.
	pub fn flush_at(&mut self, now: DateTime<Utc>) -> Vec<Entry> {
		let mut repeated: Vec<&mut ErrorGroup> =
			self.groups.values_mut().filter(|g| g.count > 1).collect();
		repeated.sort_by_key(|g| g.first_seen);

		let aggregated: Vec<Entry> = repeated
			.into_iter()
			.map(|group| {
				let mut entry = group
					.entry
					.clone()
					.with("_aggregatedCount", group.count)
					.with("_firstSeen", format_ts(group.first_seen))
					.with("_lastSeen", format_ts(group.last_seen));
				entry.set_ts(now);
				group.count = 0;
				entry
			})
			.collect();

		let expiry = self.config.flush_interval * 2;
		self.groups.retain(|_, g| elapsed(g.last_seen, now) <= expiry);

		if !aggregated.is_empty() {
			debug!(count = aggregated.len(), "flushed aggregated error groups");
		}
		aggregated
	}

	pub fn cleanup_stale(&mut self) -> usize {
		self.cleanup_stale_at(Utc::now())
	}

	/// Delete groups untouched for longer than `max_age`, regardless of count.
	pub fn cleanup_stale_at(&mut self, now: DateTime<Utc>) -> usize {
		let before = self.groups.len();
		let max_age = self.config.max_age;
		self.groups.retain(|_, g| elapsed(g.last_seen, now) <= max_age);
		let removed = before - self.groups.len();
		if removed > 0 {
			debug!(removed, "removed stale error groups");
		}
		removed
	}

	pub fn get(&self, signature: &str) -> Option<&ErrorGroup> {
		self.groups.get(signature)
	}

	pub fn len(&self) -> usize {
		self.groups.len()
	}

	pub fn is_empty(&self) -> bool {
		self.groups.is_empty()
	}

	pub fn clear(&mut self) {
		self.groups.clear();
	}
}

fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
	(now - since).to_std().unwrap_or(Duration::ZERO)
}
