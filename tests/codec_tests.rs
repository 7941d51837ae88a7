//! Codec Tests
//!
//! Tests for the record format: tags, varints, scalar payloads, packed
//! arrays, container record sets, and round trips.

use bytes::{Bytes, BytesMut};
use pathstore::codec::{decode, detect_tag, encode, read_varint, write_varint, Tag};
use pathstore::{object, StoreError, Value};

fn record(records: &[(String, Bytes)], key: &str) -> Vec<u8> {
    records
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.to_vec())
        .unwrap_or_else(|| panic!("no record at '{}'", key))
}

fn keys(records: &[(String, Bytes)]) -> Vec<String> {
    let mut keys: Vec<String> = records.iter().map(|(k, _)| k.clone()).collect();
    keys.sort();
    keys
}

fn roundtrip(value: &Value) -> Option<Value> {
    let records = encode("k", value);
    decode("k", &records, true).unwrap()
}

// =============================================================================
// Wire Format Tests
// =============================================================================

#[test]
fn test_wire_format_null_and_bools() {
    assert_eq!(record(&encode("k", &Value::Null), "k"), vec![0]);
    assert_eq!(record(&encode("k", &Value::Bool(true)), "k"), vec![2]);
    assert_eq!(record(&encode("k", &Value::Bool(false)), "k"), vec![3]);
}

#[test]
fn test_wire_format_i16() {
    // 1234 = 0x04D2, little-endian after the tag
    let bytes = record(&encode("k", &Value::Int(1234)), "k");
    assert_eq!(bytes, vec![7, 0xD2, 0x04]);
}

#[test]
fn test_wire_format_i16_negative() {
    let bytes = record(&encode("k", &Value::Int(-2)), "k");
    assert_eq!(bytes, vec![7, 0xFE, 0xFF]);
}

#[test]
fn test_wire_format_i32() {
    // 100000 = 0x000186A0
    let bytes = record(&encode("k", &Value::Int(100_000)), "k");
    assert_eq!(bytes, vec![8, 0xA0, 0x86, 0x01, 0x00]);
}

#[test]
fn test_wire_format_f64() {
    let mut expected = vec![9];
    expected.extend_from_slice(&1.5f64.to_le_bytes());
    assert_eq!(record(&encode("k", &Value::Float(1.5)), "k"), expected);
}

#[test]
fn test_wire_format_string_has_no_gap() {
    let bytes = record(&encode("k", &Value::String("hi".to_string())), "k");
    assert_eq!(bytes, vec![32, b'h', b'i']);
}

#[test]
fn test_wire_format_string_array() {
    let value = Value::Array(vec![Value::from("a"), Value::from("bb")]);
    let bytes = record(&encode("k", &value), "k");
    // tag, count=2, then (len, bytes) pairs
    assert_eq!(bytes, vec![5, 2, 1, b'a', 2, b'b', b'b']);
}

#[test]
fn test_wire_format_string_array_utf8_byte_lengths() {
    let value = Value::Array(vec![Value::from("é")]);
    let bytes = record(&encode("k", &value), "k");
    // 'é' is two UTF-8 bytes; the length prefix counts bytes, not chars
    assert_eq!(bytes, vec![5, 1, 2, 0xC3, 0xA9]);
}

#[test]
fn test_wire_format_int_array() {
    let value = Value::Array(vec![Value::Int(1), Value::Int(300)]);
    let bytes = record(&encode("k", &value), "k");
    // 300 = 0xAC 0x02 as a varint
    assert_eq!(bytes, vec![6, 2, 1, 0xAC, 0x02]);
}

#[test]
fn test_wire_format_object_records() {
    let value = object! {
        "a" => 1,
        "b" => object! { "c" => "x" },
    };
    let records = encode("root", &value);
    assert_eq!(
        keys(&records),
        vec!["root", "root.a", "root.b", "root.b.c"]
    );
    assert_eq!(record(&records, "root"), vec![1]);
    assert_eq!(record(&records, "root.b"), vec![1]);
    assert_eq!(record(&records, "root.b.c"), vec![32, b'x']);
}

#[test]
fn test_wire_format_generic_array_records() {
    let value = Value::Array(vec![Value::Int(1), Value::from("s"), Value::Null]);
    let records = encode("root", &value);
    assert_eq!(keys(&records), vec!["root", "root.0", "root.1", "root.2"]);
    assert_eq!(record(&records, "root"), vec![4]);
    assert_eq!(record(&records, "root.2"), vec![0]);
}

#[test]
fn test_encode_sanitizes_object_keys() {
    let value = object! { "weird key!" => 1 };
    let records = encode("root", &value);
    assert_eq!(keys(&records), vec!["root", "root.weird_key_"]);
}

// =============================================================================
// Classification Tests
// =============================================================================

#[test]
fn test_detect_numeric_widths() {
    assert_eq!(detect_tag(&Value::Int(32767)), Tag::Int16);
    assert_eq!(detect_tag(&Value::Int(32768)), Tag::Int32);
    // |-32768| is not below 2^15, so it widens
    assert_eq!(detect_tag(&Value::Int(-32768)), Tag::Int32);
    assert_eq!(detect_tag(&Value::Int(2_147_483_647)), Tag::Int32);
    assert_eq!(detect_tag(&Value::Int(2_147_483_648)), Tag::Float64);
    assert_eq!(detect_tag(&Value::Float(0.5)), Tag::Float64);
    // Integral floats classify by value, not variant
    assert_eq!(detect_tag(&Value::Float(4.0)), Tag::Int16);
}

#[test]
fn test_detect_array_specializations() {
    let strings = Value::Array(vec![Value::from("a"), Value::from("b")]);
    assert_eq!(detect_tag(&strings), Tag::ArrayString);

    let ints = Value::Array(vec![Value::Int(1), Value::Int(2)]);
    assert_eq!(detect_tag(&ints), Tag::ArrayInt);

    let mixed = Value::Array(vec![Value::from("a"), Value::Int(2)]);
    assert_eq!(detect_tag(&mixed), Tag::ArrayGeneric);

    // Negative elements don't fit an unsigned varint
    let negative = Value::Array(vec![Value::Int(-1)]);
    assert_eq!(detect_tag(&negative), Tag::ArrayGeneric);

    let wide = Value::Array(vec![Value::Int(1), Value::Int(1 << 31)]);
    assert_eq!(detect_tag(&wide), Tag::ArrayGeneric);

    let fractional = Value::Array(vec![Value::Int(1), Value::Float(1.5)]);
    assert_eq!(detect_tag(&fractional), Tag::ArrayGeneric);

    assert_eq!(detect_tag(&Value::Array(vec![])), Tag::ArrayGeneric);
}

// =============================================================================
// Round Trip Tests
// =============================================================================

#[test]
fn test_roundtrip_scalars() {
    assert_eq!(roundtrip(&Value::Null), Some(Value::Null));
    assert_eq!(roundtrip(&Value::Bool(true)), Some(Value::Bool(true)));
    assert_eq!(roundtrip(&Value::Bool(false)), Some(Value::Bool(false)));
    assert_eq!(roundtrip(&Value::Int(-5)), Some(Value::Int(-5)));
    assert_eq!(roundtrip(&Value::Int(70_000)), Some(Value::Int(70_000)));
    assert_eq!(roundtrip(&Value::Float(2.25)), Some(Value::Float(2.25)));
    assert_eq!(
        roundtrip(&Value::String("héllo".to_string())),
        Some(Value::String("héllo".to_string()))
    );
}

#[test]
fn test_roundtrip_numeric_reclassification() {
    // Magnitudes past 2^31 come back as floats
    assert_eq!(
        roundtrip(&Value::Int(5_000_000_000)),
        Some(Value::Float(5_000_000_000.0))
    );
    // Integral floats come back as ints
    assert_eq!(roundtrip(&Value::Float(4.0)), Some(Value::Int(4)));
}

#[test]
fn test_roundtrip_arrays() {
    let strings = Value::Array(vec![Value::from("a"), Value::from(""), Value::from("ccc")]);
    assert_eq!(roundtrip(&strings), Some(strings.clone()));

    let ints = Value::Array(vec![Value::Int(0), Value::Int(127), Value::Int(1 << 30)]);
    assert_eq!(roundtrip(&ints), Some(ints.clone()));

    let mixed = Value::Array(vec![
        Value::Null,
        Value::Int(7),
        Value::from("s"),
        Value::Array(vec![Value::Int(1), Value::Int(2)]),
        object! { "k" => true },
    ]);
    assert_eq!(roundtrip(&mixed), Some(mixed.clone()));
}

#[test]
fn test_roundtrip_nested_objects() {
    let mut value = object! { "leaf" => 1 };
    for depth in 0..9 {
        value = object! { format!("level{}", depth) => value };
    }
    assert_eq!(roundtrip(&value), Some(value.clone()));
}

#[test]
fn test_roundtrip_empty_containers() {
    assert_eq!(roundtrip(&object! {}), Some(object! {}));
    assert_eq!(
        roundtrip(&Value::Array(vec![])),
        Some(Value::Array(vec![]))
    );
}

// =============================================================================
// Decode Behavior Tests
// =============================================================================

#[test]
fn test_decode_missing_fails_when_configured() {
    let err = decode("nope", &[], true).unwrap_err();
    assert!(matches!(err, StoreError::PathNotFound(_)));
}

#[test]
fn test_decode_missing_yields_none_otherwise() {
    assert_eq!(decode("nope", &[], false).unwrap(), None);
}

#[test]
fn test_decode_elided_container_is_object() {
    // A subtree with no record at the base reads back as an object
    let records = vec![("root.a".to_string(), Bytes::from(vec![7, 5, 0]))];
    let value = decode("root", &records, true).unwrap();
    assert_eq!(value, Some(object! { "a" => 5 }));
}

#[test]
fn test_decode_unknown_tag_yields_none() {
    let records = vec![("root".to_string(), Bytes::from(vec![200]))];
    assert_eq!(decode("root", &records, true).unwrap(), None);
}

#[test]
fn test_decode_truncated_scalar_is_corruption() {
    let records = vec![("root".to_string(), Bytes::from(vec![7, 0x01]))];
    let err = decode("root", &records, true).unwrap_err();
    assert!(matches!(err, StoreError::Corruption(_)));
}

#[test]
fn test_decode_sparse_array_compacts_in_index_order() {
    // Indices 10 and 2 with a hole between them; scan order is
    // lexicographic ("10" < "2"), decode order must be numeric
    let records = vec![
        ("root".to_string(), Bytes::from(vec![4])),
        ("root.10".to_string(), Bytes::from(vec![32, b'b'])),
        ("root.2".to_string(), Bytes::from(vec![32, b'a'])),
    ];
    let value = decode("root", &records, true).unwrap();
    assert_eq!(
        value,
        Some(Value::Array(vec![Value::from("a"), Value::from("b")]))
    );
}

#[test]
fn test_decode_ignores_prefix_siblings() {
    // "rooter" shares the byte prefix but is not part of the subtree; the
    // provider filters it out before decode ever sees it, but a stray
    // non-numeric child under an array is skipped here
    let records = vec![
        ("root".to_string(), Bytes::from(vec![4])),
        ("root.x".to_string(), Bytes::from(vec![32, b'a'])),
    ];
    let value = decode("root", &records, true).unwrap();
    assert_eq!(value, Some(Value::Array(vec![])));
}

// =============================================================================
// Varint Tests
// =============================================================================

#[test]
fn test_varint_roundtrip_edges() {
    for value in [0u32, 1, 127, 128, 300, 16_383, 16_384, (1 << 31) - 1] {
        let mut buf = BytesMut::new();
        write_varint(&mut buf, value);
        let (decoded, offset) = read_varint("k", &buf, 0).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(offset, buf.len());
    }
}

#[test]
fn test_varint_single_byte_boundary() {
    let mut buf = BytesMut::new();
    write_varint(&mut buf, 127);
    assert_eq!(&buf[..], &[0x7F]);

    let mut buf = BytesMut::new();
    write_varint(&mut buf, 128);
    assert_eq!(&buf[..], &[0x80, 0x01]);
}

#[test]
fn test_varint_truncated_is_corruption() {
    // Continuation bit set with no next byte
    let err = read_varint("k", &[0x80], 0).unwrap_err();
    assert!(matches!(err, StoreError::Corruption(_)));
}
