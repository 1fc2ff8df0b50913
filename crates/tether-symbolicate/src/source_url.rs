// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Locating a script's source map from its `sourceMappingURL` comment.

use base64::prelude::*;
use percent_encoding::percent_decode_str;
use url::Url;

use crate::error::{Result, SymbolicateError};

const MARKERS: [&str; 2] = ["//# sourceMappingURL=", "//@ sourceMappingURL="];

/// Where a script's source map lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceMapLocation {
	/// The map is embedded in the script as a `data:` URL; holds the decoded JSON.
	Inline(String),
	/// The map must be fetched from this absolute URL.
	External(String),
}

/// Return the raw URL from the last `//# sourceMappingURL=` (or legacy `//@`)
/// comment in a script.
pub fn extract_source_map_url(script: &str) -> Option<String> {
	let (start, marker) = MARKERS
		.iter()
		.filter_map(|marker| script.rfind(marker).map(|idx| (idx, *marker)))
		.max_by_key(|(idx, _)| *idx)?;

	let rest = &script[start + marker.len()..];
	let url = rest.split(|c: char| c.is_whitespace()).next().unwrap_or("");
	if url.is_empty() {
		None
	} else {
		Some(url.to_string())
	}
}

/// Decode the JSON payload of a `data:` URL (base64 or percent-encoded).
pub fn decode_data_url(data_url: &str) -> Result<String> {
	let invalid = || SymbolicateError::InvalidDataUrl(truncate_for_error(data_url));

	let body = data_url.strip_prefix("data:").ok_or_else(invalid)?;
	let (meta, payload) = body.split_once(',').ok_or_else(invalid)?;

	if meta.split(';').any(|part| part.eq_ignore_ascii_case("base64")) {
		let bytes = BASE64_STANDARD.decode(payload.trim()).map_err(|_| invalid())?;
		String::from_utf8(bytes).map_err(|_| invalid())
	} else {
		percent_decode_str(payload)
			.decode_utf8()
			.map(|s| s.into_owned())
			.map_err(|_| invalid())
	}
}

/// Work out where the source map for `script_url` lives, given the script text.
pub fn locate_source_map(script_url: &str, script: &str) -> Option<SourceMapLocation> {
	let raw = extract_source_map_url(script)?;

	if raw.starts_with("data:") {
		return match decode_data_url(&raw) {
			Ok(json) => Some(SourceMapLocation::Inline(json)),
			Err(e) => {
				tracing::debug!(error = %e, script_url, "inline source map could not be decoded");
				None
			}
		};
	}

	let resolved = match Url::parse(script_url) {
		Ok(base) => base.join(&raw).map(String::from).unwrap_or(raw),
		Err(_) => raw,
	};
	Some(SourceMapLocation::External(resolved))
}

fn truncate_for_error(s: &str) -> String {
	s.chars().take(64).collect()
}
