// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Resolution of minified stack traces against cached source maps.

use std::sync::Arc;

use crate::cache::SourceMapCache;
use crate::error::Result;
use crate::sourcemap::{find_original_location, OriginalLocation, ParsedSourceMap};
use crate::stack::{parse_stack_frame, StackFrame};
use crate::source_url::{locate_source_map, SourceMapLocation};

/// Result of rewriting a stack trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStack {
	/// The stack with every resolvable frame replaced by its original location.
	pub text: String,
	/// Number of frames that were resolved.
	pub resolved: usize,
}

/// Maps minified frames back to original sources using a bounded cache of
/// parsed source maps keyed by script URL.
#[derive(Debug, Default)]
pub struct SourceMapResolver {
	cache: SourceMapCache,
}

impl SourceMapResolver {
	pub fn new(cache_capacity: usize) -> Self {
		Self {
			cache: SourceMapCache::new(cache_capacity),
		}
	}

	/// Parse a source map body and cache it for `script_url`.
	pub fn insert_map(&mut self, script_url: &str, map_json: &str) -> Result<Arc<ParsedSourceMap>> {
		let map = ParsedSourceMap::parse(map_json)?;
		tracing::debug!(
			script_url,
			sources = map.sources.len(),
			mappings = map.mapping_count(),
			"cached source map"
		);
		Ok(self.cache.set(script_url, map))
	}

	/// Load the source map referenced by a script's `sourceMappingURL` comment.
	///
	/// Inline `data:` maps are decoded directly. External maps are obtained by
	/// calling `fetch` with the absolute map URL; `fetch` returning `None` means
	/// the map is unavailable. Returns `Ok(None)` when the script references no
	/// map or the map could not be fetched.
	pub fn load_map<F>(
		&mut self,
		script_url: &str,
		script_text: &str,
		fetch: F,
	) -> Result<Option<Arc<ParsedSourceMap>>>
	where
		F: FnOnce(&str) -> Option<String>,
	{
		if let Some(map) = self.cache.get(script_url) {
			return Ok(Some(map));
		}

		let json = match locate_source_map(script_url, script_text) {
			Some(SourceMapLocation::Inline(json)) => json,
			Some(SourceMapLocation::External(map_url)) => match fetch(&map_url) {
				Some(json) => json,
				None => {
					tracing::debug!(script_url, map_url, "source map unavailable");
					return Ok(None);
				}
			},
			None => return Ok(None),
		};

		self.insert_map(script_url, &json).map(Some)
	}

	pub fn cached(&self, script_url: &str) -> Option<Arc<ParsedSourceMap>> {
		self.cache.get(script_url)
	}

	pub fn cache(&self) -> &SourceMapCache {
		&self.cache
	}

	pub fn clear(&mut self) {
		self.cache.clear();
	}

	/// Resolve a frame against the cached map for its script, if any.
	pub fn resolve_frame(&self, frame: &StackFrame) -> Option<OriginalLocation> {
		let map = self.cache.get(&frame.url)?;
		find_original_location(&map, frame.line, frame.column)
	}

	/// Rewrite every resolvable frame of `stack` to its original location.
	///
	/// Lines that are not frames, or whose script has no cached map, are kept
	/// verbatim.
	pub fn resolve_stack(&self, stack: &str) -> ResolvedStack {
		let mut resolved = 0;
		let lines: Vec<String> = stack
			.lines()
			.map(|line| {
				let Some(frame) = parse_stack_frame(line) else {
					return line.to_string();
				};
				match self.resolve_frame(&frame) {
					Some(location) => {
						resolved += 1;
						format_frame(&frame, &location)
					}
					None => line.to_string(),
				}
			})
			.collect();

		ResolvedStack {
			text: lines.join("\n"),
			resolved,
		}
	}
}

fn format_frame(frame: &StackFrame, location: &OriginalLocation) -> String {
	let function = location
		.name
		.as_deref()
		.or(frame.function.as_deref())
		.unwrap_or("<anonymous>");
	format!(
		"    at {} ({}:{}:{})",
		function, location.source, location.line, location.column
	)
}
