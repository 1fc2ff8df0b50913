// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Size truncation applied to entries before they are batched.

use serde::Serialize;
use serde_json::Value;

use crate::entry::Entry;

/// Maximum size of any single string or serialized field.
pub const MAX_FIELD_BYTES: usize = 10 * 1024;

/// Substituted for values that cannot be serialized.
pub const UNSERIALIZABLE_PLACEHOLDER: &str = "[Circular or unserializable]";

const TRUNCATION_SUFFIX: &str = "... [truncated]";

/// Room left in an array field for the omitted-items marker.
const ARRAY_MARKER_RESERVE: usize = 64;

/// Bound every field of an entry to [`MAX_FIELD_BYTES`].
///
/// Strings are cut at a char boundary. Arrays keep their leading elements,
/// each bounded, up to the limit and end with a marker counting the omitted
/// rest. Objects that serialize larger than the limit are replaced by their
/// truncated JSON text.
pub fn format_log_entry(entry: Entry) -> Entry {
	let map = entry
		.into_map()
		.into_iter()
		.map(|(key, value)| {
			let value = match value {
				Value::Array(items) => bound_array(items),
				other => bound_value(other),
			};
			(key, value)
		})
		.collect();
	Entry::from_map(map)
}

/// Convert any serializable value into an entry field, substituting the
/// placeholder when serialization fails.
pub fn to_entry_value<T: Serialize + ?Sized>(value: &T) -> Value {
	serde_json::to_value(value).unwrap_or_else(|_| Value::String(UNSERIALIZABLE_PLACEHOLDER.to_string()))
}

fn bound_value(value: Value) -> Value {
	match value {
		Value::String(s) => Value::String(truncate_str(&s)),
		Value::Array(_) | Value::Object(_) => match serde_json::to_string(&value) {
			Ok(text) if text.len() > MAX_FIELD_BYTES => Value::String(truncate_str(&text)),
			Ok(_) => value,
			Err(_) => Value::String(UNSERIALIZABLE_PLACEHOLDER.to_string()),
		},
		other => other,
	}
}

fn bound_array(items: Vec<Value>) -> Value {
	let budget = MAX_FIELD_BYTES - ARRAY_MARKER_RESERVE;
	let total = items.len();
	let mut kept = Vec::with_capacity(total);
	// Opening and closing brackets.
	let mut used = 2;

	for item in items {
		let item = bound_value(item);
		let size = serialized_len(&item) + 1;
		if used + size > budget {
			if kept.is_empty() {
				let text = match &item {
					Value::String(s) => s.clone(),
					other => other.to_string(),
				};
				if let Some(fitted) = fit_text(&text, budget - used) {
					kept.push(fitted);
				}
			}
			break;
		}
		used += size;
		kept.push(item);
	}

	let omitted = total - kept.len();
	if omitted > 0 {
		kept.push(Value::String(format!("[{omitted} more items truncated]")));
	}
	Value::Array(kept)
}

/// Truncation of `text` whose JSON encoding fits in `budget` bytes.
fn fit_text(text: &str, budget: usize) -> Option<Value> {
	let mut limit = budget.saturating_sub(TRUNCATION_SUFFIX.len() + 2);
	while limit > 0 {
		let value = Value::String(truncate_to(text, limit));
		if serialized_len(&value) <= budget {
			return Some(value);
		}
		limit /= 2;
	}
	None
}

fn serialized_len(value: &Value) -> usize {
	serde_json::to_vec(value).map_or(0, |bytes| bytes.len())
}

fn truncate_str(s: &str) -> String {
	truncate_to(s, MAX_FIELD_BYTES)
}

fn truncate_to(s: &str, limit: usize) -> String {
	if s.len() <= limit {
		return s.to_string();
	}
	let mut cut = limit;
	while !s.is_char_boundary(cut) {
		cut -= 1;
	}
	format!("{}{}", &s[..cut], TRUNCATION_SUFFIX)
}
