// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for telemetry delivery.

use thiserror::Error;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Errors that can occur while delivering a batch to the collector.
#[derive(Debug, Error)]
pub enum DeliveryError {
	/// HTTP request failed before a response was received.
	#[error("HTTP request failed: {0}")]
	RequestFailed(#[from] reqwest::Error),

	/// Collector returned a non-success status.
	#[error("server error (status {status}): {message}")]
	ServerError {
		/// HTTP status code.
		status: u16,
		/// Response body, if any.
		message: String,
	},

	/// Collector asked us to slow down.
	#[error("rate limited, retry after {retry_after_secs:?} seconds")]
	RateLimited {
		/// Value of the `Retry-After` header, if present.
		retry_after_secs: Option<u64>,
	},

	/// The circuit breaker rejected the call without attempting it.
	#[error("circuit breaker is open")]
	CircuitOpen,

	/// Failed to serialize a batch.
	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	/// A fetched source map could not be parsed.
	#[error("source map error: {0}")]
	SourceMap(#[from] tether_symbolicate::SymbolicateError),

	/// Invalid collector URL.
	#[error("invalid collector URL: {0}")]
	InvalidUrl(String),

	/// The pipeline was built without an HTTP transport.
	#[error("no collector transport configured")]
	NoTransport,
}

impl DeliveryError {
	/// True for the locally synthesized rejection, which is not a real attempt.
	pub fn is_circuit_open(&self) -> bool {
		matches!(self, Self::CircuitOpen)
	}
}
