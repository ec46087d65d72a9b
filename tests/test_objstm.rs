//! Tests for object stream parsing (PDF 1.5+ feature).

use bytes::Bytes;
use pdfa_oxide::object::{Dict, Object};
use pdfa_oxide::objstm::{object_stream_members, parse_object_stream};
use pdfa_oxide::parser_config::ParserOptions;
use pdfa_oxide::ErrorKind;

/// An uncompressed object stream; real files usually FlateDecode them.
fn object_stream(n: i64, first: i64, data: &[u8]) -> Object {
    let mut dict = Dict::new();
    dict.insert("Type".to_string(), Object::name("ObjStm"));
    dict.insert("N".to_string(), Object::Integer(n));
    dict.insert("First".to_string(), Object::Integer(first));
    dict.insert("Length".to_string(), Object::Integer(data.len() as i64));
    Object::Stream {
        dict,
        data: Bytes::from(data.to_vec()),
    }
}

/// Stream holding `pairs` followed by `objects`, with /First at the join.
fn packed(n: i64, pairs: &[u8], objects: &[u8]) -> Object {
    let mut data = pairs.to_vec();
    data.extend_from_slice(objects);
    object_stream(n, pairs.len() as i64, &data)
}

fn member(objects: &[(u32, Object)], number: u32) -> &Object {
    &objects.iter().find(|(n, _)| *n == number).unwrap().1
}

fn lenient() -> ParserOptions {
    ParserOptions::lenient()
}

#[test]
fn test_parse_object_stream_basic() {
    let stream = packed(2, b"10 0 11 3 ", b"42 /Test");
    let result = parse_object_stream(&stream, &lenient()).unwrap();

    assert_eq!(result.len(), 2);
    assert_eq!(member(&result, 10).as_integer(), Some(42));
    assert_eq!(member(&result, 11).as_name(), Some("Test"));
}

#[test]
fn test_members_keep_header_order() {
    let stream = packed(4, b"13 0 10 2 12 7 11 13 ", b"1 true false null");
    let result = parse_object_stream(&stream, &lenient()).unwrap();
    let numbers: Vec<u32> = result.iter().map(|(n, _)| *n).collect();
    assert_eq!(numbers, vec![13, 10, 12, 11]);
    assert_eq!(member(&result, 13).as_integer(), Some(1));
    assert_eq!(member(&result, 10).as_bool(), Some(true));
    assert_eq!(member(&result, 12).as_bool(), Some(false));
    assert_eq!(member(&result, 11), &Object::Null);

    assert_eq!(object_stream_members(&stream, &lenient()).unwrap(), vec![13, 10, 12, 11]);
}

#[test]
fn test_parse_object_stream_complex_objects() {
    let stream = packed(2, b"20 0 21 10 ", b"[ 1 2 3 ] << /Type /Page >>");
    let result = parse_object_stream(&stream, &lenient()).unwrap();

    let array = member(&result, 20).as_array().unwrap();
    assert_eq!(array.len(), 3);
    assert_eq!(array[0].as_integer(), Some(1));

    let dict = member(&result, 21).as_dict().unwrap();
    assert_eq!(dict.get("Type").unwrap().as_name(), Some("Page"));
}

#[test]
fn test_parse_object_stream_with_whitespace() {
    let stream = packed(2, b"  10   0   11   3  ", b"42 99");
    let result = parse_object_stream(&stream, &lenient()).unwrap();

    assert_eq!(result.len(), 2);
    assert_eq!(member(&result, 10).as_integer(), Some(42));
    assert_eq!(member(&result, 11).as_integer(), Some(99));
}

#[test]
fn test_not_a_stream() {
    assert!(parse_object_stream(&Object::Integer(42), &lenient()).is_err());
}

#[test]
fn test_wrong_stream_type() {
    let mut stream = packed(1, b"1 0 ", b"42");
    if let Object::Stream { dict, .. } = &mut stream {
        dict.insert("Type".to_string(), Object::name("XRef"));
    }
    assert!(parse_object_stream(&stream, &lenient()).is_err());
}

#[test]
fn test_missing_n_or_first() {
    let mut dict = Dict::new();
    dict.insert("Type".to_string(), Object::name("ObjStm"));
    dict.insert("First".to_string(), Object::Integer(4));
    let stream = Object::stream(dict, b"1 0 42".to_vec());
    assert_eq!(
        parse_object_stream(&stream, &lenient()).unwrap_err().kind(),
        ErrorKind::MalformedSyntax
    );

    let mut dict = Dict::new();
    dict.insert("Type".to_string(), Object::name("ObjStm"));
    dict.insert("N".to_string(), Object::Integer(1));
    let stream = Object::stream(dict, b"1 0 42".to_vec());
    assert!(parse_object_stream(&stream, &lenient()).is_err());
}

#[test]
fn test_negative_n() {
    let stream = object_stream(-1, 4, b"1 0 42");
    assert!(parse_object_stream(&stream, &lenient()).is_err());
}

#[test]
fn test_n_over_object_limit() {
    let stream = object_stream(2_000_000, 4, b"1 0 42");
    let options = lenient().with_max_objects(1_000);
    assert_eq!(
        parse_object_stream(&stream, &options).unwrap_err().kind(),
        ErrorKind::ResourceLimit
    );
}

#[test]
fn test_first_beyond_data() {
    let stream = object_stream(1, 1000, b"1 0 42");
    assert!(parse_object_stream(&stream, &lenient()).is_err());
}

#[test]
fn test_header_shorter_than_n() {
    let stream = packed(3, b"1 0 2 3 ", b"42 43");
    assert!(parse_object_stream(&stream, &lenient()).is_err());
}

#[test]
fn test_strings() {
    let stream = packed(2, b"30 0 31 13 ", b"(Hello World) <48656C6C6F>");
    let result = parse_object_stream(&stream, &lenient()).unwrap();
    assert_eq!(member(&result, 30).as_string(), Some(&b"Hello World"[..]));
    assert_eq!(member(&result, 31).as_string(), Some(&b"Hello"[..]));
}

#[test]
fn test_nested_structures() {
    let stream = packed(1, b"40 0 ", b"<< /Array [ 1 [ 2 3 ] ] /Dict << /Nested true >> >>");
    let result = parse_object_stream(&stream, &lenient()).unwrap();

    let dict = member(&result, 40).as_dict().unwrap();
    assert_eq!(dict.get("Array").unwrap().as_array().unwrap().len(), 2);
    let nested = dict.get("Dict").unwrap().as_dict().unwrap();
    assert_eq!(nested.get("Nested").unwrap().as_bool(), Some(true));
}

#[test]
fn test_empty_stream() {
    let stream = object_stream(0, 0, b"");
    assert!(parse_object_stream(&stream, &lenient()).unwrap().is_empty());
}

#[test]
fn test_references() {
    let stream = packed(1, b"50 0 ", b"[ 10 0 R 20 0 R ]");
    let result = parse_object_stream(&stream, &lenient()).unwrap();
    let array = member(&result, 50).as_array().unwrap();
    assert_eq!(array.len(), 2);
    assert!(array.iter().all(|item| item.as_reference().is_some()));
}

#[test]
fn test_malformed_member_skipped_when_lenient() {
    let stream = packed(2, b"60 0 61 5 ", b"true [[[[[");

    let result = parse_object_stream(&stream, &lenient()).unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(member(&result, 60).as_bool(), Some(true));
    assert!(result.iter().all(|(n, _)| *n != 61));

    assert!(parse_object_stream(&stream, &ParserOptions::strict()).is_err());
}

#[test]
fn test_offset_past_end() {
    let stream = packed(2, b"70 0 71 99 ", b"1 2");
    let result = parse_object_stream(&stream, &lenient()).unwrap();
    assert_eq!(result.len(), 1);
    assert!(parse_object_stream(&stream, &ParserOptions::strict()).is_err());
}

#[test]
fn test_flate_compressed_stream() {
    use flate2::{write::ZlibEncoder, Compression};
    use std::io::Write;

    let pairs = b"80 0 81 3 ";
    let mut plain = pairs.to_vec();
    plain.extend_from_slice(b"17 (x)");
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&plain).unwrap();
    let compressed = encoder.finish().unwrap();

    let mut stream = object_stream(2, pairs.len() as i64, &compressed);
    if let Object::Stream { dict, .. } = &mut stream {
        dict.insert("Filter".to_string(), Object::name("FlateDecode"));
    }
    let result = parse_object_stream(&stream, &lenient()).unwrap();
    assert_eq!(member(&result, 80).as_integer(), Some(17));
    assert_eq!(member(&result, 81).as_string(), Some(&b"x"[..]));
}
