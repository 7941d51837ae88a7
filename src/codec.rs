//! Storage codec
//!
//! Encoding and decoding between [`Value`] and the flat records kept in the
//! ordered key-value backend.
//!
//! ## Record Format
//!
//! Every record is `tag (1 byte) + payload`:
//!
//! ```text
//! ┌──────────┬─────────────────────────────────────────────┐
//! │ Tag (1)  │                 Payload                     │
//! └──────────┴─────────────────────────────────────────────┘
//! ```
//!
//! ### Payload by Tag
//! - Null / True / False:     empty
//! - Object / GenericArray:   empty (children live in their own records,
//!   keyed `base.child` / `base.index`)
//! - Int16:                   2 bytes, little-endian signed
//! - Int32:                   4 bytes, little-endian signed
//! - Float64:                 8 bytes, little-endian IEEE-754
//! - String:                  UTF-8 bytes, no gap after the tag
//! - IntArray:                varint count, then one varint per element
//! - StringArray:             varint count, then per element a varint byte
//!                            length followed by UTF-8 bytes
//!
//! Varints are LEB128-style unsigned: 7 payload bits per byte, MSB set
//! means another byte follows, maximum value 2^31 - 1.
//!
//! A container whose tag record is absent from the backend decodes as an
//! Object; scalar-to-container promotion relies on this, since promoting
//! writes do not materialize intermediate container records.

use std::collections::BTreeSet;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, StoreError};
use crate::path::sanitize_segment;
use crate::value::Value;

/// Largest value a varint may encode
pub const VARINT_MAX: u32 = i32::MAX as u32;

/// Object nesting bound for the whole-object store helper
pub const MAX_OBJECT_DEPTH: usize = 20;

// =============================================================================
// Type Tags
// =============================================================================

/// On-disk type tag, the first byte of every record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Tag {
    Null = 0,
    Object = 1,
    True = 2,
    False = 3,
    ArrayGeneric = 4,
    ArrayString = 5,
    ArrayInt = 6,
    Int16 = 7,
    Int32 = 8,
    Float64 = 9,
    Str = 32,
}

impl Tag {
    /// Parse a tag byte; `None` for tags this version doesn't know
    pub fn from_byte(byte: u8) -> Option<Tag> {
        match byte {
            0 => Some(Tag::Null),
            1 => Some(Tag::Object),
            2 => Some(Tag::True),
            3 => Some(Tag::False),
            4 => Some(Tag::ArrayGeneric),
            5 => Some(Tag::ArrayString),
            6 => Some(Tag::ArrayInt),
            7 => Some(Tag::Int16),
            8 => Some(Tag::Int32),
            9 => Some(Tag::Float64),
            32 => Some(Tag::Str),
            _ => None,
        }
    }

    /// Containers own child records under `base.`
    pub fn is_container(self) -> bool {
        matches!(self, Tag::Object | Tag::ArrayGeneric)
    }
}

// =============================================================================
// Type Classification
// =============================================================================

/// Classify a value into its on-disk tag.
///
/// Numbers classify by numeric value, not by variant: an integral float
/// below 2^15 is an Int16 on disk. Arrays are StringArray only when every
/// element is a string, IntArray only when every element fits an unsigned
/// varint, GenericArray otherwise (including empty arrays).
pub fn detect_tag(value: &Value) -> Tag {
    match value {
        Value::Null => Tag::Null,
        Value::Bool(true) => Tag::True,
        Value::Bool(false) => Tag::False,
        Value::String(_) => Tag::Str,
        Value::Int(v) => numeric_tag(v.unsigned_abs()),
        Value::Float(f) => {
            if f.is_finite() && f.fract() == 0.0 {
                numeric_tag(f.abs() as u64)
            } else {
                Tag::Float64
            }
        }
        Value::Object(_) => Tag::Object,
        Value::Array(items) => detect_array_tag(items),
    }
}

fn numeric_tag(magnitude: u64) -> Tag {
    if magnitude < (1 << 15) {
        Tag::Int16
    } else if magnitude < (1 << 31) {
        Tag::Int32
    } else {
        Tag::Float64
    }
}

fn detect_array_tag(items: &[Value]) -> Tag {
    match items.first() {
        Some(Value::String(_)) => {
            if items.iter().all(|v| matches!(v, Value::String(_))) {
                Tag::ArrayString
            } else {
                Tag::ArrayGeneric
            }
        }
        Some(Value::Int(_)) | Some(Value::Float(_)) => {
            if items.iter().all(|v| varint_element(v).is_some()) {
                Tag::ArrayInt
            } else {
                Tag::ArrayGeneric
            }
        }
        _ => Tag::ArrayGeneric,
    }
}

/// An element usable in a packed IntArray: an integer (or integral float)
/// representable as an unsigned varint. Negative values are not — they fall
/// back to GenericArray element records.
fn varint_element(value: &Value) -> Option<u32> {
    let v = match value {
        Value::Int(i) => *i,
        Value::Float(f) if f.is_finite() && f.fract() == 0.0 => *f as i64,
        _ => return None,
    };
    if (0..=VARINT_MAX as i64).contains(&v) {
        Some(v as u32)
    } else {
        None
    }
}

/// Numeric payload for the fixed-width scalar tags
fn whole(value: &Value) -> i64 {
    match value {
        Value::Int(i) => *i,
        Value::Float(f) => *f as i64,
        _ => 0,
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Encode a value rooted at `base` into its full record set.
///
/// Containers emit a tag-only record at their own key and recurse into
/// members; everything else is a single record.
pub fn encode(base: &str, value: &Value) -> Vec<(String, Bytes)> {
    let mut records = Vec::new();
    encode_into(base, value, &mut records);
    records
}

fn encode_into(base: &str, value: &Value, out: &mut Vec<(String, Bytes)>) {
    let tag = detect_tag(value);
    match tag {
        Tag::Null | Tag::True | Tag::False => {
            out.push((base.to_string(), Bytes::from(vec![tag as u8])));
        }
        Tag::Str => {
            let text = match value {
                Value::String(s) => s.as_str(),
                _ => "",
            };
            let mut buf = BytesMut::with_capacity(1 + text.len());
            buf.put_u8(tag as u8);
            buf.put_slice(text.as_bytes());
            out.push((base.to_string(), buf.freeze()));
        }
        Tag::Int16 => {
            let mut buf = BytesMut::with_capacity(3);
            buf.put_u8(tag as u8);
            buf.put_i16_le(whole(value) as i16);
            out.push((base.to_string(), buf.freeze()));
        }
        Tag::Int32 => {
            let mut buf = BytesMut::with_capacity(5);
            buf.put_u8(tag as u8);
            buf.put_i32_le(whole(value) as i32);
            out.push((base.to_string(), buf.freeze()));
        }
        Tag::Float64 => {
            let number = match value {
                Value::Int(i) => *i as f64,
                Value::Float(f) => *f,
                _ => 0.0,
            };
            let mut buf = BytesMut::with_capacity(9);
            buf.put_u8(tag as u8);
            buf.put_f64_le(number);
            out.push((base.to_string(), buf.freeze()));
        }
        Tag::ArrayInt => {
            let items = value.as_array().unwrap_or(&[]);
            let mut buf = BytesMut::with_capacity(1 + items.len() + 1);
            buf.put_u8(tag as u8);
            write_varint(&mut buf, items.len() as u32);
            for item in items {
                write_varint(&mut buf, varint_element(item).unwrap_or(0));
            }
            out.push((base.to_string(), buf.freeze()));
        }
        Tag::ArrayString => {
            let items = value.as_array().unwrap_or(&[]);
            let mut buf = BytesMut::new();
            buf.put_u8(tag as u8);
            write_varint(&mut buf, items.len() as u32);
            for item in items {
                let text = item.as_str().unwrap_or("");
                write_varint(&mut buf, text.len() as u32);
                buf.put_slice(text.as_bytes());
            }
            out.push((base.to_string(), buf.freeze()));
        }
        Tag::ArrayGeneric => {
            out.push((base.to_string(), Bytes::from(vec![tag as u8])));
            if let Value::Array(items) = value {
                for (index, item) in items.iter().enumerate() {
                    encode_into(&format!("{}.{}", base, index), item, out);
                }
            }
        }
        Tag::Object => {
            out.push((base.to_string(), Bytes::from(vec![tag as u8])));
            if let Value::Object(map) = value {
                for (key, member) in map {
                    let child = format!("{}.{}", base, sanitize_segment(key));
                    encode_into(&child, member, out);
                }
            }
        }
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode the record set collected for `base` back into a value.
///
/// `records` is the subtree snapshot: `base` itself (if present) plus all
/// `base.`-prefixed descendants. An empty snapshot means the path has no
/// backing data: that is a `PathNotFound` error when `fail_if_missing` is
/// set, `None` otherwise.
pub fn decode(
    base: &str,
    records: &[(String, Bytes)],
    fail_if_missing: bool,
) -> Result<Option<Value>> {
    if records.is_empty() {
        if fail_if_missing {
            return Err(StoreError::PathNotFound(base.to_string()));
        }
        return Ok(None);
    }
    parse_value(base, records)
}

fn parse_value(base: &str, records: &[(String, Bytes)]) -> Result<Option<Value>> {
    let tag = match records.iter().find(|(key, _)| key == base) {
        // Elided container record: promoted subtrees never write one, so
        // an absent base reads as an object.
        None => Tag::Object,
        Some((_, raw)) => {
            let byte = *raw
                .first()
                .ok_or_else(|| StoreError::Corruption(base.to_string()))?;
            match Tag::from_byte(byte) {
                Some(tag) => tag,
                None => {
                    tracing::error!(key = base, tag = byte, "unknown data type");
                    return Ok(None);
                }
            }
        }
    };

    match tag {
        Tag::Null => Ok(Some(Value::Null)),
        Tag::True => Ok(Some(Value::Bool(true))),
        Tag::False => Ok(Some(Value::Bool(false))),
        Tag::Int16 => {
            let payload = fixed_payload(base, records, 2)?;
            Ok(Some(Value::Int(
                i16::from_le_bytes([payload[0], payload[1]]) as i64,
            )))
        }
        Tag::Int32 => {
            let payload = fixed_payload(base, records, 4)?;
            Ok(Some(Value::Int(i32::from_le_bytes([
                payload[0], payload[1], payload[2], payload[3],
            ]) as i64)))
        }
        Tag::Float64 => {
            let payload = fixed_payload(base, records, 8)?;
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&payload[..8]);
            Ok(Some(Value::Float(f64::from_le_bytes(bytes))))
        }
        Tag::Str => {
            let raw = record_bytes(base, records)?;
            Ok(Some(Value::String(
                String::from_utf8_lossy(&raw[1..]).into_owned(),
            )))
        }
        Tag::ArrayInt => {
            let raw = record_bytes(base, records)?;
            let (count, mut offset) = read_varint(base, &raw, 1)?;
            // Every element takes at least one byte, so a corrupt count
            // cannot force a huge allocation
            let mut items = Vec::with_capacity((count as usize).min(raw.len()));
            for _ in 0..count {
                let (element, next) = read_varint(base, &raw, offset)?;
                items.push(Value::Int(element as i64));
                offset = next;
            }
            Ok(Some(Value::Array(items)))
        }
        Tag::ArrayString => {
            let raw = record_bytes(base, records)?;
            let (count, mut offset) = read_varint(base, &raw, 1)?;
            let mut items = Vec::with_capacity((count as usize).min(raw.len()));
            for _ in 0..count {
                let (length, next) = read_varint(base, &raw, offset)?;
                let end = next + length as usize;
                if end > raw.len() {
                    return Err(StoreError::Corruption(base.to_string()));
                }
                items.push(Value::String(
                    String::from_utf8_lossy(&raw[next..end]).into_owned(),
                ));
                offset = end;
            }
            Ok(Some(Value::Array(items)))
        }
        Tag::Object => {
            let mut map = std::collections::BTreeMap::new();
            for segment in child_segments(base, records) {
                let child_key = format!("{}.{}", base, segment);
                if let Some(member) = parse_value(&child_key, records)? {
                    map.insert(segment, member);
                }
            }
            Ok(Some(Value::Object(map)))
        }
        Tag::ArrayGeneric => {
            let mut slots: Vec<(usize, Value)> = Vec::new();
            for segment in child_segments(base, records) {
                // Non-numeric strays under an array key are skipped
                let Ok(index) = segment.parse::<usize>() else {
                    continue;
                };
                let child_key = format!("{}.{}", base, segment);
                if let Some(element) = parse_value(&child_key, records)? {
                    slots.push((index, element));
                }
            }
            // Holes compact away; ordering follows the numeric index, not
            // the lexicographic key order of the scan.
            slots.sort_by_key(|(index, _)| *index);
            Ok(Some(Value::Array(
                slots.into_iter().map(|(_, element)| element).collect(),
            )))
        }
    }
}

/// Distinct first segments of every key strictly below `base`
fn child_segments(base: &str, records: &[(String, Bytes)]) -> Vec<String> {
    let prefix = format!("{}.", base);
    let mut segments = BTreeSet::new();
    for (key, _) in records {
        if let Some(remainder) = key.strip_prefix(&prefix) {
            if let Some(first) = remainder.split('.').next() {
                if !first.is_empty() {
                    segments.insert(first.to_string());
                }
            }
        }
    }
    segments.into_iter().collect()
}

fn record_bytes<'a>(base: &str, records: &'a [(String, Bytes)]) -> Result<&'a Bytes> {
    records
        .iter()
        .find(|(key, _)| key == base)
        .map(|(_, raw)| raw)
        .ok_or_else(|| StoreError::Corruption(base.to_string()))
}

fn fixed_payload<'a>(
    base: &str,
    records: &'a [(String, Bytes)],
    len: usize,
) -> Result<&'a [u8]> {
    let raw = record_bytes(base, records)?;
    if raw.len() < 1 + len {
        return Err(StoreError::Corruption(base.to_string()));
    }
    Ok(&raw[1..])
}

// =============================================================================
// Varints
// =============================================================================

/// Append an unsigned varint
pub fn write_varint(buf: &mut BytesMut, mut value: u32) {
    while value & !0x7F != 0 {
        buf.put_u8(((value & 0x7F) | 0x80) as u8);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Read an unsigned varint at `offset`, returning the value and the offset
/// just past it
pub fn read_varint(key: &str, data: &[u8], mut offset: usize) -> Result<(u32, usize)> {
    let mut result: u32 = 0;
    let mut shift = 0;
    loop {
        let byte = *data
            .get(offset)
            .ok_or_else(|| StoreError::Corruption(key.to_string()))?;
        offset += 1;
        if shift >= 32 {
            return Err(StoreError::Corruption(key.to_string()));
        }
        result |= u32::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok((result, offset));
        }
        shift += 7;
    }
}
