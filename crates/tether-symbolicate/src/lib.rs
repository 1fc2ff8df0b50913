// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Source map resolution for minified JavaScript stack traces.
//!
//! This crate provides functionality for:
//! - Decoding Base64 VLQ mappings (source map v3)
//! - Looking up original positions for generated line/column pairs
//! - Locating a script's source map from its `sourceMappingURL` comment,
//!   including inline `data:` maps
//! - Caching parsed maps in a bounded, insertion-ordered cache
//! - Rewriting stack traces to their original locations
//!
//! # Example
//!
//! ```
//! use tether_symbolicate::SourceMapResolver;
//!
//! let mut resolver = SourceMapResolver::new(50);
//! resolver
//!     .insert_map(
//!         "https://app.test/bundle.js",
//!         r#"{"version":3,"sources":["src/app.ts"],"names":[],"mappings":"AAAA"}"#,
//!     )
//!     .unwrap();
//!
//! let resolved = resolver.resolve_stack("Error: boom\n    at https://app.test/bundle.js:1:1");
//! assert_eq!(resolved.resolved, 1);
//! ```

pub mod cache;
pub mod error;
pub mod resolver;
pub mod sourcemap;
pub mod stack;
pub mod source_url;
pub mod vlq;

pub use cache::{SourceMapCache, DEFAULT_CACHE_CAPACITY};
pub use error::{Result, SymbolicateError};
pub use resolver::{ResolvedStack, SourceMapResolver};
pub use sourcemap::{find_original_location, OriginalLocation, ParsedSourceMap};
pub use stack::{parse_stack, parse_stack_frame, StackFrame};
pub use source_url::{decode_data_url, extract_source_map_url, locate_source_map, SourceMapLocation};
pub use vlq::{decode_vlq, parse_mappings, resolve_segments, Segment};
