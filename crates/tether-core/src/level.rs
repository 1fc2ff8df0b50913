// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Log levels and the capture level filter.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Severity of a captured entry, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
	Debug,
	Log,
	Info,
	Warn,
	Error,
}

impl LogLevel {
	/// Whether entries at this level participate in error deduplication.
	pub fn is_error_or_warn(self) -> bool {
		matches!(self, Self::Warn | Self::Error)
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Debug => "debug",
			Self::Log => "log",
			Self::Info => "info",
			Self::Warn => "warn",
			Self::Error => "error",
		}
	}
}

impl fmt::Display for LogLevel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for LogLevel {
	type Err = CoreError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"debug" => Ok(Self::Debug),
			"log" => Ok(Self::Log),
			"info" => Ok(Self::Info),
			"warn" | "warning" => Ok(Self::Warn),
			"error" => Ok(Self::Error),
			_ => Err(CoreError::InvalidLevel(s.to_string())),
		}
	}
}

/// Minimum level an entry must reach to be captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelFilter {
	#[default]
	All,
	Debug,
	Log,
	Info,
	Warn,
	Error,
}

impl LevelFilter {
	/// Returns true if `level` passes this filter.
	pub fn allows(self, level: LogLevel) -> bool {
		let min = match self {
			Self::All => return true,
			Self::Debug => LogLevel::Debug,
			Self::Log => LogLevel::Log,
			Self::Info => LogLevel::Info,
			Self::Warn => LogLevel::Warn,
			Self::Error => LogLevel::Error,
		};
		level >= min
	}
}

impl fmt::Display for LevelFilter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::All => write!(f, "all"),
			Self::Debug => write!(f, "debug"),
			Self::Log => write!(f, "log"),
			Self::Info => write!(f, "info"),
			Self::Warn => write!(f, "warn"),
			Self::Error => write!(f, "error"),
		}
	}
}

impl FromStr for LevelFilter {
	type Err = CoreError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"all" => Ok(Self::All),
			"debug" => Ok(Self::Debug),
			"log" => Ok(Self::Log),
			"info" => Ok(Self::Info),
			"warn" | "warning" => Ok(Self::Warn),
			"error" => Ok(Self::Error),
			_ => Err(CoreError::InvalidFilter(s.to_string())),
		}
	}
}

/// Decide whether an entry should be captured.
///
/// Network and exception entries always pass regardless of the filter.
pub fn should_capture_log(level: LogLevel, filter: LevelFilter, entry_type: &str) -> bool {
	if entry_type == "network" || entry_type == "exception" {
		return true;
	}
	filter.allows(level)
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn levels_are_ordered_by_severity() {
		assert!(LogLevel::Debug < LogLevel::Log);
		assert!(LogLevel::Log < LogLevel::Info);
		assert!(LogLevel::Info < LogLevel::Warn);
		assert!(LogLevel::Warn < LogLevel::Error);
	}

	#[test]
	fn only_error_and_warn_are_dedup_levels() {
		assert!(LogLevel::Error.is_error_or_warn());
		assert!(LogLevel::Warn.is_error_or_warn());
		assert!(!LogLevel::Info.is_error_or_warn());
		assert!(!LogLevel::Log.is_error_or_warn());
	}

	#[test]
	fn filter_error_only_passes_errors() {
		assert!(should_capture_log(LogLevel::Error, LevelFilter::Error, "console"));
		assert!(!should_capture_log(LogLevel::Warn, LevelFilter::Error, "console"));
		assert!(!should_capture_log(LogLevel::Log, LevelFilter::Error, "console"));
	}

	#[test]
	fn filter_all_passes_everything() {
		assert!(should_capture_log(LogLevel::Debug, LevelFilter::All, "console"));
	}

	#[test]
	fn network_and_exception_bypass_filter() {
		assert!(should_capture_log(LogLevel::Log, LevelFilter::Error, "network"));
		assert!(should_capture_log(LogLevel::Debug, LevelFilter::Error, "exception"));
	}

	#[test]
	fn serde_uses_lowercase() {
		let json = serde_json::to_string(&LogLevel::Warn).unwrap();
		assert_eq!(json, "\"warn\"");
		let filter: LevelFilter = serde_json::from_str("\"all\"").unwrap();
		assert_eq!(filter, LevelFilter::All);
	}

	#[test]
	fn unknown_level_is_rejected() {
		assert!(matches!(
			"fatal".parse::<LogLevel>(),
			Err(CoreError::InvalidLevel(_))
		));
	}

	proptest! {
		#[test]
		fn level_roundtrip(level in prop_oneof![
			Just(LogLevel::Debug),
			Just(LogLevel::Log),
			Just(LogLevel::Info),
			Just(LogLevel::Warn),
			Just(LogLevel::Error),
		]) {
			let parsed: LogLevel = level.to_string().parse().unwrap();
			prop_assert_eq!(level, parsed);
		}
	}
}
