// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Telemetry entries.
//!
//! An [`Entry`] is an opaque JSON object produced by the capture layer. The
//! pipeline only reads a handful of discriminating fields (`type`, `level`,
//! `ts` and a few type-specific ones) and forwards everything else untouched.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreError, Result};
use crate::level::LogLevel;

/// An opaque, serializable telemetry record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entry(Map<String, Value>);

/// Borrowed view of an entry, keyed by its `type` field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntryKind<'a> {
	Console {
		args: &'a [Value],
	},
	Exception {
		message: &'a str,
		stack: Option<&'a str>,
	},
	Network {
		method: &'a str,
		url: &'a str,
		status: Option<u64>,
	},
	WebSocket {
		event: &'a str,
		url: &'a str,
	},
	Action {
		action: &'a str,
	},
	Performance,
	Other(&'a str),
}

impl Entry {
	/// Create an entry of the given type and level, stamped with the current time.
	pub fn new(entry_type: &str, level: LogLevel) -> Self {
		let mut map = Map::new();
		map.insert("type".to_string(), Value::String(entry_type.to_string()));
		map.insert("level".to_string(), Value::String(level.to_string()));
		map.insert("ts".to_string(), Value::String(format_ts(Utc::now())));
		Self(map)
	}

	/// A console entry carrying the logged arguments.
	pub fn console(level: LogLevel, args: Vec<Value>) -> Self {
		Self::new("console", level).with("args", Value::Array(args))
	}

	/// An uncaught exception entry.
	pub fn exception(message: impl Into<String>, stack: Option<&str>) -> Self {
		let mut entry = Self::new("exception", LogLevel::Error).with("message", message.into());
		if let Some(stack) = stack {
			entry.insert("stack", stack);
		}
		entry
	}

	/// A failed network request.
	pub fn network(method: &str, url: &str, status: u16) -> Self {
		Self::new("network", LogLevel::Error)
			.with("method", method)
			.with("url", url)
			.with("status", status)
	}

	pub fn from_map(map: Map<String, Value>) -> Self {
		Self(map)
	}

	/// Build an entry from an arbitrary JSON value, which must be an object.
	pub fn from_value(value: Value) -> Result<Self> {
		match value {
			Value::Object(map) => Ok(Self(map)),
			Value::Null => Err(CoreError::NotAnObject("null")),
			Value::Bool(_) => Err(CoreError::NotAnObject("bool")),
			Value::Number(_) => Err(CoreError::NotAnObject("number")),
			Value::String(_) => Err(CoreError::NotAnObject("string")),
			Value::Array(_) => Err(CoreError::NotAnObject("array")),
		}
	}

	/// Set a field, returning the entry for chaining.
	pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
		self.insert(key, value);
		self
	}

	pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
		self.0.insert(key.to_string(), value.into());
	}

	pub fn remove(&mut self, key: &str) -> Option<Value> {
		self.0.remove(key)
	}

	pub fn get(&self, key: &str) -> Option<&Value> {
		self.0.get(key)
	}

	pub fn get_str(&self, key: &str) -> Option<&str> {
		self.0.get(key).and_then(Value::as_str)
	}

	pub fn get_u64(&self, key: &str) -> Option<u64> {
		self.0.get(key).and_then(Value::as_u64)
	}

	/// The entry's `type` field; entries without one are treated as console lines.
	pub fn entry_type(&self) -> &str {
		self.get_str("type").unwrap_or("console")
	}

	/// The entry's level; missing or unknown levels read as [`LogLevel::Log`].
	pub fn level(&self) -> LogLevel {
		self.get_str("level")
			.and_then(|l| l.parse().ok())
			.unwrap_or(LogLevel::Log)
	}

	/// The entry's timestamp, if present and parseable.
	pub fn ts(&self) -> Option<DateTime<Utc>> {
		self.get_str("ts")
			.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
			.map(|dt| dt.with_timezone(&Utc))
	}

	pub fn set_ts(&mut self, ts: DateTime<Utc>) {
		self.insert("ts", format_ts(ts));
	}

	pub fn as_map(&self) -> &Map<String, Value> {
		&self.0
	}

	pub fn as_map_mut(&mut self) -> &mut Map<String, Value> {
		&mut self.0
	}

	pub fn into_map(self) -> Map<String, Value> {
		self.0
	}

	/// Sum of the lengths of all string values, a cheap size estimate.
	pub fn string_bytes(&self) -> usize {
		self.0.values().map(value_string_bytes).sum()
	}

	/// Classify the entry by its `type` field.
	pub fn kind(&self) -> EntryKind<'_> {
		match self.entry_type() {
			"console" => EntryKind::Console {
				args: self
					.get("args")
					.and_then(Value::as_array)
					.map(Vec::as_slice)
					.unwrap_or(&[]),
			},
			"exception" => EntryKind::Exception {
				message: self.get_str("message").unwrap_or(""),
				stack: self.get_str("stack"),
			},
			"network" => EntryKind::Network {
				method: self.get_str("method").unwrap_or("GET"),
				url: self.get_str("url").unwrap_or(""),
				status: self.get_u64("status"),
			},
			"websocket" => EntryKind::WebSocket {
				event: self.get_str("event").unwrap_or(""),
				url: self.get_str("url").unwrap_or(""),
			},
			"action" => EntryKind::Action {
				action: self.get_str("action").unwrap_or(""),
			},
			"performance" => EntryKind::Performance,
			other => EntryKind::Other(other),
		}
	}
}

impl From<Map<String, Value>> for Entry {
	fn from(map: Map<String, Value>) -> Self {
		Self(map)
	}
}

/// Timestamps are ISO-8601 with millisecond precision, matching the collector.
pub fn format_ts(ts: DateTime<Utc>) -> String {
	ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn value_string_bytes(value: &Value) -> usize {
	match value {
		Value::String(s) => s.len(),
		Value::Array(items) => items.iter().map(value_string_bytes).sum(),
		Value::Object(map) => map.values().map(value_string_bytes).sum(),
		_ => 0,
	}
}
