// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Reliable delivery of captured browser telemetry to a local collector.
//!
//! This crate provides:
//! - [`Batcher`] - debounced, bounded batching with retry and requeue
//! - [`CircuitBreaker`] - shared failure gate with a single half-open probe
//! - [`ErrorGroupTracker`] - deduplication and periodic aggregation of errors
//! - [`MemoryPressureMonitor`] - estimated footprint of everything buffered
//! - [`HttpTransport`] - the collector's HTTP endpoints
//! - [`TelemetryPipeline`] - all of the above wired together

pub mod backoff;
pub mod batcher;
pub mod breaker;
pub mod error;
pub mod error_groups;
pub mod memory;
pub mod pipeline;
pub mod status;
pub mod timer;
pub mod transport;

pub use backoff::{BackoffSchedule, DEFAULT_BACKOFF_SCHEDULE_MS};
pub use batcher::{BatchSender, Batcher, BatcherConfig, BatcherStats};
pub use breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState};
pub use error::{DeliveryError, Result};
pub use error_groups::{create_error_signature, ErrorGroup, ErrorGroupConfig, ErrorGroupTracker, GroupOutcome};
pub use memory::{
	BufferKind, MemoryConfig, MemoryPressureLevel, MemoryPressureMonitor, MemoryPressureState, MemorySource,
};
pub use pipeline::{Disposition, PipelineOptions, PipelineStats, SourceMeta, TelemetryPipeline};
pub use status::{ConnectionStatus, ConnectionTracker};
pub use timer::{CancellableTimer, TimerSlot};
pub use transport::{Endpoint, EndpointSender, HealthStatus, HttpTransport, DEFAULT_REQUEST_TIMEOUT};

pub use tether_symbolicate::DEFAULT_CACHE_CAPACITY as DEFAULT_SOURCE_MAP_CACHE_CAPACITY;
