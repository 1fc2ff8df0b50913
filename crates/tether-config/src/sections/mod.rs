// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections, each a mergeable layer and its resolved form.

mod batcher;
mod breaker;
mod error_groups;
mod memory;
mod source_maps;

pub use batcher::{BatcherConfigLayer, BatcherSettings};
pub use breaker::{BreakerConfigLayer, BreakerSettings};
pub use error_groups::{ErrorGroupsConfigLayer, ErrorGroupsSettings};
pub use memory::{MemoryConfigLayer, MemorySettings};
pub use source_maps::{SourceMapsConfigLayer, SourceMapsSettings};
