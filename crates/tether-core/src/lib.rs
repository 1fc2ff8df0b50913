// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the tether telemetry pipeline.
//!
//! This crate provides the shared vocabulary used by the delivery pipeline and
//! the stack resolver:
//! - [`Entry`] - an opaque, serializable telemetry record (console line, network
//!   failure, websocket frame, user action, performance snapshot)
//! - [`EntryKind`] - a borrowed, exhaustively matchable view of an entry's type
//! - [`LogLevel`] / [`LevelFilter`] - severity and the capture filter
//! - [`format_log_entry`] - size truncation applied before entries are batched

pub mod entry;
pub mod error;
pub mod format;
pub mod level;

pub use entry::{Entry, EntryKind};
pub use error::{CoreError, Result};
pub use format::{format_log_entry, to_entry_value, MAX_FIELD_BYTES, UNSERIALIZABLE_PLACEHOLDER};
pub use level::{should_capture_log, LevelFilter, LogLevel};
