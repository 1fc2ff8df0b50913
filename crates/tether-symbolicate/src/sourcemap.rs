// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Source map parsing and position lookup.
//!
//! Implements Source Map revision 3 for resolving minified stack
//! frames back to their original files.

use serde::Deserialize;

use crate::error::{Result, SymbolicateError};
use crate::vlq::{parse_mappings, resolve_segments, Segment};

/// Raw source map JSON structure.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSourceMap {
	version: u32,
	#[serde(default)]
	file: Option<String>,
	#[serde(default)]
	source_root: Option<String>,
	#[serde(default)]
	sources: Vec<String>,
	#[serde(default)]
	names: Vec<String>,
	#[serde(default)]
	mappings: String,
}

/// Parsed source map ready for lookups.
#[derive(Debug, Clone, Default)]
pub struct ParsedSourceMap {
	/// Generated file name.
	pub file: Option<String>,
	/// Root path prepended to source filenames.
	pub source_root: Option<String>,
	/// List of original source file paths.
	pub sources: Vec<String>,
	/// List of original identifiers (function/variable names).
	pub names: Vec<String>,
	/// Absolute segments, one list per generated line.
	pub mappings: Vec<Vec<Segment>>,
}

/// Original position information from a source map lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalLocation {
	/// Original source file path.
	pub source: String,
	/// Line in the original source (1-indexed).
	pub line: u32,
	/// Column in the original source (1-indexed).
	pub column: u32,
	/// Original identifier name if available.
	pub name: Option<String>,
}

impl ParsedSourceMap {
	/// Parse a source map from JSON bytes.
	pub fn from_bytes(data: &[u8]) -> Result<Self> {
		let raw: RawSourceMap = serde_json::from_slice(data)?;

		if raw.version != 3 {
			return Err(SymbolicateError::InvalidSourceMapVersion(raw.version));
		}

		let mappings = resolve_segments(&parse_mappings(&raw.mappings)?)?;

		Ok(Self {
			file: raw.file,
			source_root: raw.source_root,
			sources: raw.sources,
			names: raw.names,
			mappings,
		})
	}

	/// Parse a source map from a JSON string.
	pub fn parse(data: &str) -> Result<Self> {
		Self::from_bytes(data.as_bytes())
	}

	/// Lookup the original position for a generated line and column.
	///
	/// Both inputs are 1-indexed, as they appear in stack traces. The segment
	/// chosen is the one with the greatest generated column at or before the
	/// requested column. Returns `Ok(None)` when the line is out of range or
	/// has no mapping at or before the column.
	pub fn lookup(&self, line: u32, column: u32) -> Result<Option<OriginalLocation>> {
		let Some(segments) = line
			.checked_sub(1)
			.and_then(|idx| self.mappings.get(idx as usize))
		else {
			return Ok(None);
		};

		let column_0indexed = column.saturating_sub(1);
		let mut best: Option<&Segment> = None;
		for segment in segments {
			if segment.generated_column > column_0indexed {
				continue;
			}
			if best.map_or(true, |b| segment.generated_column >= b.generated_column) {
				best = Some(segment);
			}
		}

		let Some(segment) = best else {
			return Ok(None);
		};

		let source = self
			.sources
			.get(segment.source_index as usize)
			.ok_or(SymbolicateError::InvalidSourceIndex(segment.source_index))?;

		let name = segment
			.name_index
			.and_then(|idx| self.names.get(idx as usize).cloned());

		Ok(Some(OriginalLocation {
			source: self.resolve_source_path(source),
			line: segment.original_line + 1,
			column: segment.original_column + 1,
			name,
		}))
	}

	/// Resolve a source path with the source root if present.
	fn resolve_source_path(&self, source: &str) -> String {
		match &self.source_root {
			Some(root) if !root.is_empty() => {
				let root = root.trim_end_matches('/');
				format!("{}/{}", root, source)
			}
			_ => source.to_string(),
		}
	}

	/// Get the number of mapped segments in this source map.
	pub fn mapping_count(&self) -> usize {
		self.mappings.iter().map(Vec::len).sum()
	}
}

/// Find the original location for a 1-indexed generated position.
///
/// Malformed maps (for example a segment pointing past the sources list)
/// resolve to `None` instead of an error.
pub fn find_original_location(
	map: &ParsedSourceMap,
	line: u32,
	column: u32,
) -> Option<OriginalLocation> {
	match map.lookup(line, column) {
		Ok(location) => location,
		Err(e) => {
			tracing::debug!(error = %e, line, column, "source map lookup failed");
			None
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample_source_map() -> &'static str {
		r#"{
			"version": 3,
			"file": "out.js",
			"sourceRoot": "",
			"sources": ["src/index.ts"],
			"names": ["hello", "console", "log"],
			"mappings": "AAAAA,SAASC,KAAKC;AACA;;AAEA"
		}"#
	}

	#[test]
	fn test_parse_source_map() {
		let sm = ParsedSourceMap::parse(sample_source_map()).unwrap();

		assert_eq!(sm.file, Some("out.js".to_string()));
		assert_eq!(sm.sources, vec!["src/index.ts"]);
		assert_eq!(sm.names, vec!["hello", "console", "log"]);
		assert_eq!(sm.mappings.len(), 4);
	}

	#[test]
	fn test_lookup_position() {
		let sm = ParsedSourceMap::parse(sample_source_map()).unwrap();

		let pos = sm.lookup(1, 1).unwrap().unwrap();
		assert_eq!(pos.source, "src/index.ts");
		assert_eq!(pos.line, 1);
		assert_eq!(pos.column, 1);
		assert_eq!(pos.name.as_deref(), Some("hello"));

		let pos = sm.lookup(1, 12).unwrap().unwrap();
		assert_eq!(pos.column, 10);
		assert_eq!(pos.name.as_deref(), Some("console"));

		let pos = sm.lookup(4, 1).unwrap().unwrap();
		assert_eq!(pos.line, 4);
	}

	#[test]
	fn test_lookup_picks_nearest_column_at_or_before() {
		// Segments on line 1 at generated columns 0, 10 and 20.
		let json = r#"{
			"version": 3,
			"sources": ["a.ts"],
			"names": [],
			"mappings": "AAAA,UACK,UACK"
		}"#;
		let sm = ParsedSourceMap::parse(json).unwrap();

		let pos = sm.lookup(1, 6).unwrap().unwrap();
		assert_eq!(pos.line, 1);

		let pos = sm.lookup(1, 16).unwrap().unwrap();
		assert_eq!(pos.line, 2);
		assert_eq!(pos.column, 6);

		let pos = sm.lookup(1, 500).unwrap().unwrap();
		assert_eq!(pos.line, 3);
	}

	#[test]
	fn test_lookup_out_of_range_line() {
		let sm = ParsedSourceMap::parse(sample_source_map()).unwrap();
		assert!(sm.lookup(99, 1).unwrap().is_none());
		assert!(sm.lookup(0, 1).unwrap().is_none());
	}

	#[test]
	fn test_lookup_unmapped_line() {
		let json = r#"{"version": 3, "sources": ["a.ts"], "names": [], "mappings": "AAAA;;AACA"}"#;
		let sm = ParsedSourceMap::parse(json).unwrap();
		assert!(sm.lookup(2, 1).unwrap().is_none());
		assert_eq!(sm.lookup(3, 1).unwrap().unwrap().line, 2);
	}

	#[test]
	fn test_lookup_column_before_first_segment() {
		let json = r#"{"version": 3, "sources": ["a.ts"], "names": [], "mappings": "KAAA"}"#;
		let sm = ParsedSourceMap::parse(json).unwrap();
		assert!(sm.lookup(1, 3).unwrap().is_none());
		assert!(sm.lookup(1, 6).unwrap().is_some());
	}

	#[test]
	fn test_lookup_returns_name() {
		let json = r#"{"version": 3, "sources": ["a.ts"], "names": ["handleClick"], "mappings": "AAAAA"}"#;
		let sm = ParsedSourceMap::parse(json).unwrap();
		let pos = sm.lookup(1, 1).unwrap().unwrap();
		assert_eq!(pos.name.as_deref(), Some("handleClick"));
	}

	#[test]
	fn test_invalid_version() {
		let json = r#"{"version": 2, "sources": [], "names": [], "mappings": ""}"#;
		let result = ParsedSourceMap::parse(json);
		assert!(matches!(
			result,
			Err(SymbolicateError::InvalidSourceMapVersion(2))
		));
	}

	#[test]
	fn test_invalid_mappings_fail_to_parse() {
		let json = r#"{"version": 3, "sources": [], "names": [], "mappings": "A!AA"}"#;
		assert!(matches!(
			ParsedSourceMap::parse(json),
			Err(SymbolicateError::InvalidVlqChar('!'))
		));
	}

	#[test]
	fn test_source_root_resolution() {
		let json = r#"{
			"version": 3,
			"sourceRoot": "src/",
			"sources": ["index.ts"],
			"names": [],
			"mappings": "AAAA"
		}"#;
		let sm = ParsedSourceMap::parse(json).unwrap();

		let pos = sm.lookup(1, 1).unwrap().unwrap();
		assert_eq!(pos.source, "src/index.ts");
	}

	#[test]
	fn test_find_original_location_swallows_bad_source_index() {
		let json = r#"{"version": 3, "sources": [], "names": [], "mappings": "AAAA"}"#;
		let sm = ParsedSourceMap::parse(json).unwrap();
		assert!(sm.lookup(1, 1).is_err());
		assert!(find_original_location(&sm, 1, 1).is_none());
	}
}
