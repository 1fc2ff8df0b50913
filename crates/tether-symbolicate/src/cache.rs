// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Bounded cache of parsed source maps keyed by script URL.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::sourcemap::ParsedSourceMap;

/// Default number of source maps kept in memory.
pub const DEFAULT_CACHE_CAPACITY: usize = 50;

/// Fixed-capacity map from script URL to parsed source map.
///
/// When full, inserting a new URL evicts the oldest *inserted* entry. Reads do
/// not refresh an entry's position, and replacing an existing URL keeps its
/// original slot.
#[derive(Debug)]
pub struct SourceMapCache {
	capacity: usize,
	maps: HashMap<String, Arc<ParsedSourceMap>>,
	order: VecDeque<String>,
}

impl SourceMapCache {
	pub fn new(capacity: usize) -> Self {
		Self {
			capacity: capacity.max(1),
			maps: HashMap::with_capacity(capacity),
			order: VecDeque::with_capacity(capacity),
		}
	}

	pub fn set(&mut self, script_url: impl Into<String>, map: ParsedSourceMap) -> Arc<ParsedSourceMap> {
		let script_url = script_url.into();
		let map = Arc::new(map);

		if self.maps.contains_key(&script_url) {
			self.maps.insert(script_url, Arc::clone(&map));
			return map;
		}

		while self.maps.len() >= self.capacity {
			let Some(oldest) = self.order.pop_front() else {
				break;
			};
			self.maps.remove(&oldest);
			tracing::debug!(script_url = %oldest, "evicted source map from cache");
		}

		self.order.push_back(script_url.clone());
		self.maps.insert(script_url, Arc::clone(&map));
		map
	}

	pub fn get(&self, script_url: &str) -> Option<Arc<ParsedSourceMap>> {
		self.maps.get(script_url).cloned()
	}

	pub fn contains(&self, script_url: &str) -> bool {
		self.maps.contains_key(script_url)
	}

	pub fn len(&self) -> usize {
		self.maps.len()
	}

	pub fn is_empty(&self) -> bool {
		self.maps.is_empty()
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}

	pub fn clear(&mut self) {
		self.maps.clear();
		self.order.clear();
	}
}

impl Default for SourceMapCache {
	fn default() -> Self {
		Self::new(DEFAULT_CACHE_CAPACITY)
	}
}
