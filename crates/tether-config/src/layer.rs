// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Top-level mergeable configuration layer.

use serde::{Deserialize, Serialize};
use tether_core::LevelFilter;

use crate::sections::{
	BatcherConfigLayer, BreakerConfigLayer, ErrorGroupsConfigLayer, MemoryConfigLayer, SourceMapsConfigLayer,
};

/// One source's view of the configuration. Every field is optional so that
/// layers can be stacked; later layers override earlier ones field by field.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TetherConfigLayer {
	pub server_url: Option<String>,
	pub log_level: Option<LevelFilter>,
	pub request_timeout_ms: Option<u64>,
	pub batcher: Option<BatcherConfigLayer>,
	pub breaker: Option<BreakerConfigLayer>,
	pub error_groups: Option<ErrorGroupsConfigLayer>,
	pub memory: Option<MemoryConfigLayer>,
	pub source_maps: Option<SourceMapsConfigLayer>,
}

macro_rules! merge_section {
	($self:ident, $other:ident, $field:ident) => {
		if let Some(overlay) = $other.$field {
			$self.$field.get_or_insert_with(Default::default).merge(overlay);
		}
	};
}

impl TetherConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.server_url.is_some() {
			self.server_url = other.server_url;
		}
		if other.log_level.is_some() {
			self.log_level = other.log_level;
		}
		if other.request_timeout_ms.is_some() {
			self.request_timeout_ms = other.request_timeout_ms;
		}
		merge_section!(self, other, batcher);
		merge_section!(self, other, breaker);
		merge_section!(self, other, error_groups);
		merge_section!(self, other, memory);
		merge_section!(self, other, source_maps);
	}
}
