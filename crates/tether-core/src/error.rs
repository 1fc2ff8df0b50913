// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for core entry handling.

use thiserror::Error;

/// Errors that can occur while building or reading entries.
#[derive(Debug, Error)]
pub enum CoreError {
	#[error("entry must be a JSON object, got {0}")]
	NotAnObject(&'static str),

	#[error("invalid log level: {0}")]
	InvalidLevel(String),

	#[error("invalid level filter: {0}")]
	InvalidFilter(String),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
