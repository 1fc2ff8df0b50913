// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! VLQ (Variable-Length Quantity) decoder for source map mappings.
//!
//! Source maps use Base64 VLQ encoding for compact storage of line/column mappings.
//! This module decodes the raw delta tuples and resolves them into absolute
//! positions following the source map v3 format.

use crate::error::{Result, SymbolicateError};

/// Base64 character set used in VLQ encoding.
const BASE64_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

const CONTINUATION_BIT: i32 = 0b100000;
const PAYLOAD_MASK: i32 = 0b011111;

/// Decode a Base64 character to its 6-bit value.
fn decode_char(ch: char) -> Result<i32> {
	u8::try_from(ch)
		.ok()
		.and_then(|b| BASE64_CHARS.iter().position(|&c| c == b))
		.map(|pos| pos as i32)
		.ok_or(SymbolicateError::InvalidVlqChar(ch))
}

/// Decode a Base64-VLQ string into a sequence of signed integers.
///
/// Bit 5 of each digit is the continuation flag and bits 0-4 carry the payload,
/// accumulated little-endian. The least significant bit of the accumulated
/// value is the sign.
pub fn decode_vlq(input: &str) -> Result<Vec<i32>> {
	let mut values = Vec::new();
	let mut value = 0i32;
	let mut shift = 0u32;

	for ch in input.chars() {
		let digit = decode_char(ch)?;

		let continuation = digit & CONTINUATION_BIT != 0;
		let digit_value = digit & PAYLOAD_MASK;

		if shift > 30 || (digit_value << shift) >> shift != digit_value {
			return Err(SymbolicateError::VlqOverflow);
		}
		value += digit_value << shift;
		shift += 5;

		if !continuation {
			// The lowest bit indicates the sign: 1 = negative, 0 = positive
			let negated = value & 1 != 0;
			value >>= 1;
			if negated {
				value = -value;
			}
			values.push(value);
			value = 0;
			shift = 0;
		}
	}

	if shift != 0 {
		return Err(SymbolicateError::UnterminatedVlq);
	}

	Ok(values)
}

/// Split a mappings string into lines of raw (delta-encoded) segments.
///
/// Lines are separated by `;`, segments by `,`. An empty line yields an empty
/// segment list.
pub fn parse_mappings(mappings: &str) -> Result<Vec<Vec<Vec<i32>>>> {
	mappings
		.split(';')
		.map(|line| {
			line.split(',')
				.filter(|segment| !segment.is_empty())
				.map(decode_vlq)
				.collect()
		})
		.collect()
}

/// A mapped position with every field resolved to an absolute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
	/// Column in the generated file (0-indexed).
	pub generated_column: u32,
	/// Index into the sources array.
	pub source_index: u32,
	/// Line in the original file (0-indexed).
	pub original_line: u32,
	/// Column in the original file (0-indexed).
	pub original_column: u32,
	/// Optional index into the names array.
	pub name_index: Option<u32>,
}

/// Resolve raw delta segments into absolute positions.
///
/// `generated_column` restarts at 0 on every generated line; the source,
/// original line, original column and name fields carry over across lines.
/// Segments with only a generated column are unmapped and skipped.
pub fn resolve_segments(raw: &[Vec<Vec<i32>>]) -> Result<Vec<Vec<Segment>>> {
	let mut prev_source = 0i64;
	let mut prev_original_line = 0i64;
	let mut prev_original_column = 0i64;
	let mut prev_name = 0i64;

	let mut lines = Vec::with_capacity(raw.len());

	for line in raw {
		let mut generated_column = 0i64;
		let mut segments = Vec::with_capacity(line.len());

		for values in line {
			match values.len() {
				1 => {
					generated_column += i64::from(values[0]);
				}
				4 | 5 => {
					generated_column += i64::from(values[0]);
					prev_source += i64::from(values[1]);
					prev_original_line += i64::from(values[2]);
					prev_original_column += i64::from(values[3]);

					let name_index = if values.len() == 5 {
						prev_name += i64::from(values[4]);
						Some(to_index(prev_name, values)?)
					} else {
						None
					};

					segments.push(Segment {
						generated_column: to_index(generated_column, values)?,
						source_index: to_index(prev_source, values)?,
						original_line: to_index(prev_original_line, values)?,
						original_column: to_index(prev_original_column, values)?,
						name_index,
					});
				}
				fields => {
					return Err(SymbolicateError::MalformedSegment {
						segment: format!("{values:?}"),
						fields,
					});
				}
			}
		}

		lines.push(segments);
	}

	Ok(lines)
}

fn to_index(value: i64, segment: &[i32]) -> Result<u32> {
	u32::try_from(value).map_err(|_| SymbolicateError::MalformedSegment {
		segment: format!("{segment:?}"),
		fields: segment.len(),
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	fn encode(value: i32) -> String {
		let mut vlq = if value < 0 {
			((-value) << 1) | 1
		} else {
			value << 1
		};
		let mut out = String::new();
		loop {
			let mut digit = vlq & PAYLOAD_MASK;
			vlq >>= 5;
			if vlq > 0 {
				digit |= CONTINUATION_BIT;
			}
			out.push(BASE64_CHARS[digit as usize] as char);
			if vlq == 0 {
				break;
			}
		}
		out
	}

	#[test]
	fn test_decode_vlq_literal_vectors() {
		assert_eq!(decode_vlq("A").unwrap(), vec![0]);
		assert_eq!(decode_vlq("C").unwrap(), vec![1]);
		assert_eq!(decode_vlq("D").unwrap(), vec![-1]);
		assert_eq!(decode_vlq("K").unwrap(), vec![5]);
		assert_eq!(decode_vlq("gB").unwrap(), vec![16]);
		assert_eq!(decode_vlq("2B").unwrap(), vec![27]);
	}

	#[test]
	fn test_decode_vlq_multi_value() {
		assert_eq!(decode_vlq("AAAA").unwrap(), vec![0, 0, 0, 0]);
		assert_eq!(decode_vlq("AACA").unwrap(), vec![0, 0, 1, 0]);
	}

	#[test]
	fn test_invalid_vlq_char() {
		assert!(matches!(
			decode_vlq("!"),
			Err(SymbolicateError::InvalidVlqChar('!'))
		));
		assert!(matches!(
			decode_vlq("Aé"),
			Err(SymbolicateError::InvalidVlqChar('é'))
		));
	}

	#[test]
	fn test_unterminated_vlq() {
		assert!(matches!(
			decode_vlq("g"),
			Err(SymbolicateError::UnterminatedVlq)
		));
	}

	#[test]
	fn test_overlong_vlq_overflows() {
		assert!(matches!(
			decode_vlq("gggggggA"),
			Err(SymbolicateError::VlqOverflow)
		));
	}

	#[test]
	fn test_parse_mappings_keeps_empty_lines() {
		let lines = parse_mappings("AAAA;;AACA").unwrap();
		assert_eq!(lines.len(), 3);
		assert_eq!(lines[0], vec![vec![0, 0, 0, 0]]);
		assert!(lines[1].is_empty());
		assert_eq!(lines[2], vec![vec![0, 0, 1, 0]]);
	}

	#[test]
	fn test_parse_mappings_splits_segments() {
		let lines = parse_mappings("AAAA,SAASA").unwrap();
		assert_eq!(lines.len(), 1);
		assert_eq!(lines[0].len(), 2);
		assert_eq!(lines[0][1], vec![9, 0, 0, 9, 0]);
	}

	#[test]
	fn test_resolve_resets_generated_column_per_line() {
		// line 0: col 4; line 1: col 2 (not 6)
		let raw = parse_mappings("IAAA;EAAC").unwrap();
		let lines = resolve_segments(&raw).unwrap();
		assert_eq!(lines[0][0].generated_column, 4);
		assert_eq!(lines[1][0].generated_column, 2);
	}

	#[test]
	fn test_resolve_carries_original_fields_across_lines() {
		let raw = parse_mappings("AAAA;AACA;AACA").unwrap();
		let lines = resolve_segments(&raw).unwrap();
		assert_eq!(lines[0][0].original_line, 0);
		assert_eq!(lines[1][0].original_line, 1);
		assert_eq!(lines[2][0].original_line, 2);
	}

	#[test]
	fn test_resolve_name_index() {
		let raw = parse_mappings("AAAAA,EAAEC").unwrap();
		let lines = resolve_segments(&raw).unwrap();
		assert_eq!(lines[0][0].name_index, Some(0));
		assert_eq!(lines[0][1].name_index, Some(1));
		assert_eq!(lines[0][1].original_column, 2);
	}

	#[test]
	fn test_generated_only_segments_are_skipped() {
		let raw = parse_mappings("E,EAAA").unwrap();
		let lines = resolve_segments(&raw).unwrap();
		assert_eq!(lines[0].len(), 1);
		assert_eq!(lines[0][0].generated_column, 4);
	}

	#[test]
	fn test_malformed_segment_is_rejected() {
		let raw = parse_mappings("AA").unwrap();
		assert!(matches!(
			resolve_segments(&raw),
			Err(SymbolicateError::MalformedSegment { fields: 2, .. })
		));
	}

	#[test]
	fn test_negative_absolute_position_is_rejected() {
		let raw = parse_mappings("AADA").unwrap();
		assert!(resolve_segments(&raw).is_err());
	}

	proptest! {
		#[test]
		fn decode_inverts_encode(values in prop::collection::vec(-1_000_000i32..1_000_000, 1..8)) {
			let encoded: String = values.iter().map(|v| encode(*v)).collect();
			prop_assert_eq!(decode_vlq(&encoded).unwrap(), values);
		}
	}
}
