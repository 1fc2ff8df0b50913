// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Parsing of JavaScript stack trace lines.
//!
//! Two shapes are understood:
//! - V8: `    at fn (https://app.test/main.js:10:5)` or `    at https://app.test/main.js:10:5`
//! - SpiderMonkey/JavaScriptCore: `fn@https://app.test/main.js:10:5`

/// A single frame of a minified stack trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
	/// Function name, if the frame carries one.
	pub function: Option<String>,
	/// Script URL.
	pub url: String,
	/// Line (1-indexed).
	pub line: u32,
	/// Column (1-indexed).
	pub column: u32,
}

/// Parse one line of a stack trace. Returns `None` for message lines and
/// frames without a usable `url:line:column` location.
pub fn parse_stack_frame(line: &str) -> Option<StackFrame> {
	let trimmed = line.trim();

	if let Some(rest) = trimmed.strip_prefix("at ") {
		return parse_v8_frame(rest.trim());
	}

	let (function, location) = trimmed.split_once('@')?;
	let (url, line, column) = split_location(location)?;
	Some(StackFrame {
		function: non_empty(function),
		url,
		line,
		column,
	})
}

/// Parse every frame of a stack trace, skipping lines that are not frames.
pub fn parse_stack(stack: &str) -> Vec<StackFrame> {
	stack.lines().filter_map(parse_stack_frame).collect()
}

fn parse_v8_frame(rest: &str) -> Option<StackFrame> {
	let (function, location) = match rest.strip_suffix(')').and_then(|r| r.rsplit_once(" (")) {
		Some((function, location)) => (non_empty(function), location),
		None => (None, rest),
	};

	let (url, line, column) = split_location(location)?;
	Some(StackFrame {
		function,
		url,
		line,
		column,
	})
}

fn split_location(location: &str) -> Option<(String, u32, u32)> {
	let (rest, column) = location.rsplit_once(':')?;
	let (url, line) = rest.rsplit_once(':')?;
	let line = line.parse().ok()?;
	let column = column.parse().ok()?;
	if url.is_empty() || url == "<anonymous>" {
		return None;
	}
	Some((url.to_string(), line, column))
}

fn non_empty(s: &str) -> Option<String> {
	let s = s.trim();
	(!s.is_empty()).then(|| s.to_string())
}
