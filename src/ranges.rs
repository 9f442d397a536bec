//! Byte ranges of a generated bundle that correspond to user-authored source.
//!
//! Large bundles are mostly framework and vendor code. Narrowing conversion to
//! a handful of ranges around the position-mapped user code keeps the syntax
//! walk from visiting nodes that can never produce user-facing coverage.

use crate::types::errors::Error;
use crate::types::raw::{CodeRange, PositionMap};
use log::debug;

/// Offsets closer than this are folded into one range
pub const MERGE_GAP: usize = 1_000;
/// Padding in front of the first range
pub const PAD_BEFORE: usize = 1_000;
/// Padding after the last range, large enough to take in trailing closers
pub const PAD_AFTER: usize = 5_000;
/// Scripts no larger than this are converted unfiltered
pub const MIN_SCRIPT_SIZE: usize = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeOptions {
    pub merge_gap: usize,
    pub pad_before: usize,
    pub pad_after: usize,
    pub min_script_size: usize,
}

impl Default for RangeOptions {
    fn default() -> Self {
        Self {
            merge_gap: MERGE_GAP,
            pad_before: PAD_BEFORE,
            pad_after: PAD_AFTER,
            min_script_size: MIN_SCRIPT_SIZE,
        }
    }
}

impl RangeOptions {
    pub fn with_merge_gap(mut self, merge_gap: usize) -> Self {
        self.merge_gap = merge_gap;
        self
    }

    pub fn with_padding(mut self, before: usize, after: usize) -> Self {
        self.pad_before = before;
        self.pad_after = after;
        self
    }

    pub fn with_min_script_size(mut self, min_script_size: usize) -> Self {
        self.min_script_size = min_script_size;
        self
    }
}

/// Fold source-backed offsets into ordered, non-overlapping ranges.
///
/// Offsets past `code_len` are ignored. An empty result means "no filtering".
pub fn compute_code_ranges(
    breakpoints: &[usize],
    code_len: usize,
    options: &RangeOptions,
) -> Vec<CodeRange> {
    let mut offsets: Vec<usize> = breakpoints
        .iter()
        .copied()
        .filter(|&offset| offset < code_len)
        .collect();
    offsets.sort_unstable();
    offsets.dedup();

    let Some((&first, rest)) = offsets.split_first() else {
        return Vec::new();
    };

    let mut ranges = Vec::new();
    let mut start = first;
    let mut last = first;
    for &offset in rest {
        if offset - last < options.merge_gap {
            last = offset;
        } else {
            ranges.push(CodeRange::new(start, last + 1));
            start = offset;
            last = offset;
        }
    }
    ranges.push(CodeRange::new(start, last + 1));

    if let Some(head) = ranges.first_mut() {
        head.min_offset = head.min_offset.saturating_sub(options.pad_before);
    }
    if let Some(tail) = ranges.last_mut() {
        tail.max_offset = tail.max_offset.saturating_add(options.pad_after).min(code_len);
    }

    ranges
}

/// Ranges to hand to the converter for one script, applying the size policy.
///
/// Small scripts, scripts without a position map, and maps that cannot be
/// decoded all come back unfiltered.
pub fn ranges_for_script(
    code: &str,
    position_map: Option<&PositionMap>,
    options: &RangeOptions,
) -> Vec<CodeRange> {
    if code.len() <= options.min_script_size {
        return Vec::new();
    }
    let Some(map) = position_map else {
        return Vec::new();
    };

    let offsets = match source_backed_offsets(code, map, is_vendor_source) {
        Ok(offsets) => offsets,
        Err(e) => {
            debug!("Converting unfiltered, position map unusable: {}", e);
            return Vec::new();
        }
    };

    let ranges = compute_code_ranges(&offsets, code.len(), options);
    let covered: usize = ranges.iter().map(CodeRange::len).sum();
    debug!(
        "Narrowed {} byte script to {} ranges ({} bytes)",
        code.len(),
        ranges.len(),
        covered
    );
    ranges
}

/// Sources that never count as user code
pub fn is_vendor_source(source: &str) -> bool {
    source.contains("node_modules")
        || source.contains("webpack/runtime")
        || source.starts_with("webpack/bootstrap")
}

/// Generated byte offsets whose mapping segment points at a user source
pub fn source_backed_offsets(
    code: &str,
    map: &PositionMap,
    is_vendor: impl Fn(&str) -> bool,
) -> Result<Vec<usize>, Error> {
    let line_starts = line_starts(code);
    let vendor: Vec<bool> = map.sources.iter().map(|s| is_vendor(s)).collect();

    let mut offsets = Vec::new();
    for segment in decode_mappings(&map.mappings)? {
        let Some(source) = segment.source else {
            continue;
        };
        if vendor.get(source as usize).copied().unwrap_or(true) {
            continue;
        }
        let Some(&line_start) = line_starts.get(segment.generated_line as usize) else {
            continue;
        };
        offsets.push(line_start + segment.generated_column as usize);
    }
    Ok(offsets)
}

fn line_starts(code: &str) -> Vec<usize> {
    std::iter::once(0)
        .chain(code.match_indices('\n').map(|(index, _)| index + 1))
        .collect()
}

/// One decoded segment of a `mappings` string (generated side only, plus source index)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingSegment {
    pub generated_line: u32,
    pub generated_column: u32,
    pub source: Option<u32>,
}

/// Decode base64 VLQ `mappings` into absolute segments
pub fn decode_mappings(mappings: &str) -> Result<Vec<MappingSegment>, Error> {
    let mut segments = Vec::new();
    let mut source: i64 = 0;

    for (line, group) in mappings.split(';').enumerate() {
        let mut column: i64 = 0;
        for raw in group.split(',').filter(|raw| !raw.is_empty()) {
            let fields = decode_vlq(raw)?;
            column += fields[0];
            let mapped_source = if fields.len() >= 4 {
                source += fields[1];
                Some(source)
            } else {
                None
            };
            if column < 0 || mapped_source.is_some_and(|s| s < 0) {
                return Err(Error::Parse(format!(
                    "negative position in mapping segment '{raw}'"
                )));
            }
            segments.push(MappingSegment {
                generated_line: line as u32,
                generated_column: column as u32,
                source: mapped_source.map(|s| s as u32),
            });
        }
    }

    Ok(segments)
}

fn decode_vlq(segment: &str) -> Result<Vec<i64>, Error> {
    let mut values = Vec::with_capacity(5);
    let mut value: i64 = 0;
    let mut shift = 0;

    for byte in segment.bytes() {
        let digit = base64_value(byte).ok_or_else(|| {
            Error::Parse(format!("invalid base64 character '{}' in mappings", byte as char))
        })? as i64;
        value |= (digit & 0x1f) << shift;
        if digit & 0x20 != 0 {
            shift += 5;
            if shift > 60 {
                return Err(Error::Parse("VLQ value overflows".to_string()));
            }
            continue;
        }
        let negative = value & 1 == 1;
        value >>= 1;
        values.push(if negative { -value } else { value });
        value = 0;
        shift = 0;
    }

    if shift != 0 {
        return Err(Error::Parse(format!("truncated VLQ segment '{segment}'")));
    }
    if values.is_empty() {
        return Err(Error::Parse("empty mapping segment".to_string()));
    }
    Ok(values)
}

fn base64_value(byte: u8) -> Option<u8> {
    match byte {
        b'A'..=b'Z' => Some(byte - b'A'),
        b'a'..=b'z' => Some(byte - b'a' + 26),
        b'0'..=b'9' => Some(byte - b'0' + 52),
        b'+' => Some(62),
        b'/' => Some(63),
        _ => None,
    }
}
