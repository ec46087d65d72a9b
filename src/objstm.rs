//! Object streams (PDF 1.5+).
//!
//! An object stream packs several non-stream objects into one compressed stream:
//! ```text
//! N 0 obj
//! << /Type /ObjStm /N 3 /First 14 /Filter /FlateDecode >>
//! stream
//! 10 0 11 15 12 28    % pairs: object number, offset relative to /First
//! <dict> <array> ...  % the objects themselves
//! endstream
//! endobj
//! ```

use crate::error::{Error, ErrorKind, Result};
use crate::lexer::{SpannedToken, Token, Tokenizer};
use crate::object::Object;
use crate::parser::ObjectParser;
use crate::parser_config::ParserOptions;

/// Extract the objects of an `/ObjStm` stream, in header order.
///
/// Each offset is bounds-checked against the decoded data. Unparseable members are
/// skipped in lenient mode and fail the stream in strict mode.
pub fn parse_object_stream(stream: &Object, options: &ParserOptions) -> Result<Vec<(u32, Object)>> {
    let (decoded, pairs, first) = decode_object_stream(stream, options)?;
    let body = &decoded[first..];

    let mut objects = Vec::with_capacity(pairs.len());
    for (number, offset) in pairs {
        if offset >= body.len() {
            let err = Error::syntax(
                first + offset,
                format!("object {} offset {} beyond object stream data", number, offset),
            );
            if options.strict {
                return Err(err);
            }
            log::warn!("{}", err);
            continue;
        }
        match ObjectParser::at(body, offset, *options).parse_object() {
            Ok(object) => objects.push((number, object)),
            Err(e) if !options.strict && e.kind() != ErrorKind::ResourceLimit => {
                log::warn!("Skipping object {} in object stream: {}", number, e);
            },
            Err(e) => return Err(e),
        }
    }

    Ok(objects)
}

/// Object numbers listed in an `/ObjStm` header, in index order.
pub fn object_stream_members(stream: &Object, options: &ParserOptions) -> Result<Vec<u32>> {
    let (_, pairs, _) = decode_object_stream(stream, options)?;
    Ok(pairs.into_iter().map(|(n, _)| n).collect())
}

fn decode_object_stream(
    stream: &Object,
    options: &ParserOptions,
) -> Result<(Vec<u8>, Vec<(u32, usize)>, usize)> {
    let Object::Stream { dict, .. } = stream else {
        return Err(Error::InvalidObjectType {
            expected: "Stream".to_string(),
            found: stream.type_name().to_string(),
        });
    };
    if !stream.has_type("ObjStm") {
        return Err(Error::InvalidObjectType {
            expected: "ObjStm".to_string(),
            found: dict
                .get("Type")
                .and_then(|t| t.as_name())
                .unwrap_or("untyped stream")
                .to_string(),
        });
    }

    let n = dict
        .get("N")
        .and_then(|o| o.as_integer())
        .filter(|n| *n >= 0)
        .ok_or_else(|| Error::syntax(0, "object stream without a valid /N"))? as usize;
    let first = dict
        .get("First")
        .and_then(|o| o.as_integer())
        .filter(|f| *f >= 0)
        .ok_or_else(|| Error::syntax(0, "object stream without a valid /First"))?
        as usize;
    if n > options.max_objects {
        return Err(Error::ResourceLimit {
            what: "object count",
            limit: options.max_objects,
        });
    }

    let decoded = stream.decode_stream_data_limited(options.max_decompressed_size)?;
    if decoded.len() < first {
        return Err(Error::syntax(
            decoded.len(),
            format!("object stream data shorter than /First {}", first),
        ));
    }

    let pairs = read_pairs(&decoded[..first], n)?;
    Ok((decoded, pairs, first))
}

fn read_pairs(header: &[u8], count: usize) -> Result<Vec<(u32, usize)>> {
    let mut tokens = Tokenizer::new(header);
    let mut pairs = Vec::with_capacity(count);
    for i in 0..count {
        let at = tokens.position();
        let mut next_uint = || match tokens.next_token() {
            Ok(Some(SpannedToken {
                token: Token::Integer(v),
                ..
            })) if v >= 0 => Some(v),
            _ => None,
        };
        let (Some(number), Some(offset)) = (next_uint(), next_uint()) else {
            return Err(Error::syntax(at, format!("malformed object stream pair {}", i)));
        };
        let number = u32::try_from(number)
            .map_err(|_| Error::syntax(at, format!("object number {} out of range", number)))?;
        pairs.push((number, offset as usize));
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Dict;

    fn objstm(header: &str, body: &str, n: i64) -> Object {
        let data = format!("{}{}", header, body).into_bytes();
        let mut dict = Dict::new();
        dict.insert("Type".into(), Object::name("ObjStm"));
        dict.insert("N".into(), Object::Integer(n));
        dict.insert("First".into(), Object::Integer(header.len() as i64));
        Object::stream(dict, data)
    }

    #[test]
    fn test_parse_object_stream() {
        let stream = objstm("10 0 11 11 ", "<< /A 1 >> [1 2 3 0 R]", 2);
        let objects = parse_object_stream(&stream, &ParserOptions::lenient()).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].0, 10);
        assert!(objects[0].1.as_dict().is_some());
        assert_eq!(objects[1].0, 11);
        assert_eq!(objects[1].1.as_array().unwrap().len(), 3);
        assert_eq!(
            object_stream_members(&stream, &ParserOptions::lenient()).unwrap(),
            vec![10, 11]
        );
    }

    #[test]
    fn test_offset_out_of_bounds() {
        let stream = objstm("10 0 11 500 ", "<< /A 1 >>", 2);
        let lenient = parse_object_stream(&stream, &ParserOptions::lenient()).unwrap();
        assert_eq!(lenient.len(), 1);
        assert!(parse_object_stream(&stream, &ParserOptions::strict()).is_err());
    }

    #[test]
    fn test_not_an_object_stream() {
        let plain = Object::stream(Dict::new(), b"1 0".to_vec());
        assert!(parse_object_stream(&plain, &ParserOptions::lenient()).is_err());
        assert!(parse_object_stream(&Object::Null, &ParserOptions::lenient()).is_err());
    }

    #[test]
    fn test_short_header() {
        let stream = objstm("10 ", "<< >>", 1);
        assert!(matches!(
            parse_object_stream(&stream, &ParserOptions::lenient()),
            Err(Error::MalformedSyntax { .. })
        ));
    }
}
