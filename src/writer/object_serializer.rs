//! PDF object serialization.
//!
//! Serializes PDF objects to their byte representation according to
//! PDF specification ISO 32000-1:2008, section 7.3.

use crate::object::{Dict, Object};

/// Serializer for PDF objects.
///
/// Output is deterministic: dictionary keys are written in sorted order.
#[derive(Debug, Clone, Default)]
pub struct ObjectSerializer {
    /// Whether to use compact formatting (minimal whitespace)
    compact: bool,
}

impl ObjectSerializer {
    /// Create a new object serializer with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a compact serializer (minimal whitespace).
    pub fn compact() -> Self {
        Self { compact: true }
    }

    /// Serialize an object to bytes.
    pub fn serialize(&self, obj: &Object) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_object(&mut buf, obj);
        buf
    }

    /// Serialize an object to a string (for debugging).
    pub fn serialize_to_string(&self, obj: &Object) -> String {
        String::from_utf8_lossy(&self.serialize(obj)).to_string()
    }

    /// Serialize an indirect object definition.
    ///
    /// Format: `{id} {gen} obj\n{object}\nendobj\n`
    pub fn serialize_indirect(&self, id: u32, gen: u16, obj: &Object) -> Vec<u8> {
        let mut buf = format!("{} {} obj\n", id, gen).into_bytes();
        self.write_object(&mut buf, obj);
        buf.extend_from_slice(b"\nendobj\n");
        buf
    }

    /// Append the serialized form of `obj` to `out`.
    pub fn write_object(&self, out: &mut Vec<u8>, obj: &Object) {
        match obj {
            Object::Null => out.extend_from_slice(b"null"),
            Object::Boolean(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
            Object::Integer(i) => out.extend_from_slice(i.to_string().as_bytes()),
            Object::Real(r) => out.extend_from_slice(format_real(*r).as_bytes()),
            Object::String(s) => write_string(out, s),
            Object::Name(n) => write_name(out, n),
            Object::Array(arr) => {
                out.push(b'[');
                for (i, item) in arr.iter().enumerate() {
                    if i > 0 {
                        out.push(b' ');
                    }
                    self.write_object(out, item);
                }
                out.push(b']');
            },
            Object::Dictionary(dict) => self.write_dictionary(out, dict),
            Object::Stream { dict, data } => {
                let mut dict = dict.clone();
                dict.insert("Length".to_string(), Object::Integer(data.len() as i64));
                self.write_dictionary(out, &dict);
                out.extend_from_slice(b"\nstream\n");
                out.extend_from_slice(data);
                out.extend_from_slice(b"\nendstream");
            },
            Object::Reference(r) => out.extend_from_slice(format!("{} {} R", r.id, r.gen).as_bytes()),
        }
    }

    fn write_dictionary(&self, out: &mut Vec<u8>, dict: &Dict) {
        out.extend_from_slice(b"<<");
        let mut keys: Vec<&String> = dict.keys().collect();
        keys.sort();
        for key in keys {
            let Some(value) = dict.get(key) else { continue };
            if !self.compact {
                out.extend_from_slice(b"\n  ");
            }
            write_name(out, key);
            out.push(b' ');
            self.write_object(out, value);
        }
        if !self.compact && !dict.is_empty() {
            out.push(b'\n');
        }
        out.extend_from_slice(b">>");
    }
}

/// Format a real without exponent, trimming trailing zeros.
pub fn format_real(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    let formatted = format!("{:.5}", value);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "-0" | "" => "0".to_string(),
        t => t.to_string(),
    }
}

/// Literal syntax for printable data, hex syntax otherwise.
fn write_string(out: &mut Vec<u8>, data: &[u8]) {
    let printable = data
        .iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b'\t' || (0x20..=0x7E).contains(&b));
    if printable {
        out.push(b'(');
        for &byte in data {
            match byte {
                b'(' => out.extend_from_slice(b"\\("),
                b')' => out.extend_from_slice(b"\\)"),
                b'\\' => out.extend_from_slice(b"\\\\"),
                b'\n' => out.extend_from_slice(b"\\n"),
                b'\r' => out.extend_from_slice(b"\\r"),
                b'\t' => out.extend_from_slice(b"\\t"),
                _ => out.push(byte),
            }
        }
        out.push(b')');
    } else {
        out.push(b'<');
        for byte in data {
            out.extend_from_slice(format!("{:02X}", byte).as_bytes());
        }
        out.push(b'>');
    }
}

/// Names escape delimiters, `#`, whitespace and non-ASCII bytes as `#XX`.
///
/// Characters up to U+00FF map back to the single byte they were read from.
fn write_name(out: &mut Vec<u8>, name: &str) {
    out.push(b'/');
    let mut bytes = Vec::with_capacity(name.len());
    for c in name.chars() {
        match u8::try_from(u32::from(c)) {
            Ok(byte) => bytes.push(byte),
            Err(_) => bytes.extend_from_slice(c.encode_utf8(&mut [0; 4]).as_bytes()),
        }
    }
    for byte in bytes {
        let regular = (0x21..=0x7E).contains(&byte) && !b"()<>[]{}/%#".contains(&byte);
        if regular {
            out.push(byte);
        } else {
            out.extend_from_slice(format!("#{:02X}", byte).as_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectRef;

    #[test]
    fn test_serialize_scalars() {
        let s = ObjectSerializer::new();
        assert_eq!(s.serialize_to_string(&Object::Null), "null");
        assert_eq!(s.serialize_to_string(&Object::Boolean(true)), "true");
        assert_eq!(s.serialize_to_string(&Object::Integer(-123)), "-123");
    }

    #[test]
    fn test_serialize_real() {
        let s = ObjectSerializer::new();
        assert_eq!(s.serialize_to_string(&Object::Real(3.14258)), "3.14258");
        assert_eq!(s.serialize_to_string(&Object::Real(1.0)), "1");
        assert_eq!(s.serialize_to_string(&Object::Real(0.5)), "0.5");
        assert_eq!(s.serialize_to_string(&Object::Real(-0.000001)), "0");
        assert_eq!(s.serialize_to_string(&Object::Real(f64::NAN)), "0");
    }

    #[test]
    fn test_serialize_string() {
        let s = ObjectSerializer::new();
        assert_eq!(s.serialize_to_string(&Object::String(b"Hello".to_vec())), "(Hello)");
        assert_eq!(
            s.serialize_to_string(&Object::String(b"Test (parens)".to_vec())),
            "(Test \\(parens\\))"
        );
        assert_eq!(s.serialize_to_string(&Object::String(vec![0x00, 0xFF, 0x80])), "<00FF80>");
    }

    #[test]
    fn test_serialize_name_escapes_delimiters() {
        let s = ObjectSerializer::new();
        assert_eq!(s.serialize_to_string(&Object::name("Type")), "/Type");
        assert_eq!(s.serialize_to_string(&Object::name("Name With Space")), "/Name#20With#20Space");
        assert_eq!(
            s.serialize_to_string(&Object::name("application/pdf")),
            "/application#2Fpdf"
        );
        assert_eq!(s.serialize_to_string(&Object::name("A(B)#")), "/A#28B#29#23");
    }

    #[test]
    fn test_serialize_dictionary_sorted() {
        let s = ObjectSerializer::compact();
        let dict = Object::dictionary(vec![
            ("Type", Object::name("Page")),
            ("Count", Object::Integer(1)),
            ("Kids", Object::Array(vec![Object::Reference(ObjectRef::new(3, 0))])),
        ]);
        assert_eq!(s.serialize_to_string(&dict), "<</Count 1/Kids [3 0 R]/Type /Page>>");
    }

    #[test]
    fn test_serialize_indirect() {
        let s = ObjectSerializer::new();
        let bytes = s.serialize_indirect(1, 0, &Object::Integer(42));
        assert_eq!(bytes, b"1 0 obj\n42\nendobj\n");
    }

    #[test]
    fn test_serialize_stream_sets_length() {
        let s = ObjectSerializer::compact();
        let mut dict = Dict::new();
        dict.insert("Length".to_string(), Object::Integer(999));
        let stream = Object::Stream {
            dict,
            data: bytes::Bytes::from_static(b"stream data"),
        };
        let result = s.serialize_to_string(&stream);
        assert!(result.contains("/Length 11"));
        assert!(result.contains("stream\nstream data\nendstream"));
    }
}
