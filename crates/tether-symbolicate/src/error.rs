// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for source map resolution.

use thiserror::Error;

/// Errors that can occur while decoding or resolving source maps.
#[derive(Debug, Error)]
pub enum SymbolicateError {
	#[error("Invalid source map JSON: {0}")]
	InvalidSourceMapJson(#[from] serde_json::Error),

	#[error("Invalid source map version: expected 3, got {0}")]
	InvalidSourceMapVersion(u32),

	#[error("Invalid VLQ character: {0:?}")]
	InvalidVlqChar(char),

	#[error("VLQ value overflows 32 bits")]
	VlqOverflow,

	#[error("VLQ sequence ends with a continuation digit")]
	UnterminatedVlq,

	#[error("Malformed mapping segment {segment:?}: expected 1, 4 or 5 fields, got {fields}")]
	MalformedSegment { segment: String, fields: usize },

	#[error("Invalid source index: {0}")]
	InvalidSourceIndex(u32),

	#[error("Invalid data URL: {0}")]
	InvalidDataUrl(String),
}

pub type Result<T> = std::result::Result<T, SymbolicateError>;
