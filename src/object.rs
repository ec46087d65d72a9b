//! PDF object types.
//!
//! [`Object`] is the in-memory form of every PDF value. Indirect objects are addressed
//! by [`ObjectRef`] and only resolved through the owning [`crate::document::Document`].

use crate::decoders::DecodeParams;
use crate::error::{Error, Result};
use std::collections::HashMap;

/// Dictionary payload shared by dictionaries and stream dictionaries.
pub type Dict = HashMap<String, Object>;

/// PDF object representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// Null object
    Null,
    /// Boolean value
    Boolean(bool),
    /// Integer value
    Integer(i64),
    /// Real (floating-point) value
    Real(f64),
    /// String (byte array)
    String(Vec<u8>),
    /// Name (without the leading /)
    Name(String),
    /// Array of objects
    Array(Vec<Object>),
    /// Dictionary (key-value pairs)
    Dictionary(Dict),
    /// Stream (dictionary + raw, still-encoded data)
    Stream {
        /// Stream dictionary
        dict: Dict,
        /// Stream data as stored in the file
        data: bytes::Bytes,
    },
    /// Indirect object reference
    Reference(ObjectRef),
}

/// Reference to an indirect object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    /// Object number
    pub id: u32,
    /// Generation number
    pub gen: u16,
}

impl ObjectRef {
    /// Create a new object reference.
    pub fn new(id: u32, gen: u16) -> Self {
        Self { id, gen }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} R", self.id, self.gen)
    }
}

impl Object {
    /// Create a Name object.
    pub fn name(s: &str) -> Object {
        Object::Name(s.to_string())
    }

    /// Create a String object from text, using PDFDocEncoding when the text is
    /// ASCII and UTF-16BE with a byte order mark otherwise.
    pub fn text(s: &str) -> Object {
        if s.is_ascii() {
            Object::String(s.as_bytes().to_vec())
        } else {
            let mut bytes = vec![0xFE, 0xFF];
            for unit in s.encode_utf16() {
                bytes.extend_from_slice(&unit.to_be_bytes());
            }
            Object::String(bytes)
        }
    }

    /// Create a Dictionary object from key/value pairs.
    pub fn dictionary(entries: Vec<(&str, Object)>) -> Object {
        Object::Dictionary(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    /// Create a Stream object from a dictionary and data; `/Length` is set.
    pub fn stream(mut dict: Dict, data: Vec<u8>) -> Object {
        dict.insert("Length".to_string(), Object::Integer(data.len() as i64));
        Object::Stream {
            dict,
            data: bytes::Bytes::from(data),
        }
    }

    /// Get the type name of this object (without data).
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "Null",
            Object::Boolean(_) => "Boolean",
            Object::Integer(_) => "Integer",
            Object::Real(_) => "Real",
            Object::String(_) => "String",
            Object::Name(_) => "Name",
            Object::Array(_) => "Array",
            Object::Dictionary(_) => "Dictionary",
            Object::Stream { .. } => "Stream",
            Object::Reference(_) => "Reference",
        }
    }

    /// Try to cast to integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Object::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to cast to a number, accepting both integers and reals.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Object::Integer(i) => Some(*i as f64),
            Object::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to name.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Object::Name(s) => Some(s),
            _ => None,
        }
    }

    /// Try to cast to dictionary. Works for both Dictionary and Stream objects.
    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream { dict, .. } => Some(dict),
            _ => None,
        }
    }

    /// Mutable access to the dictionary of a Dictionary or Stream.
    pub fn as_dict_mut(&mut self) -> Option<&mut Dict> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream { dict, .. } => Some(dict),
            _ => None,
        }
    }

    /// Try to cast to array.
    pub fn as_array(&self) -> Option<&Vec<Object>> {
        match self {
            Object::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Mutable access to an array.
    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Object>> {
        match self {
            Object::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Try to cast to reference.
    pub fn as_reference(&self) -> Option<ObjectRef> {
        match self {
            Object::Reference(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Object::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to cast to real number.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Object::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to string (bytes).
    pub fn as_string(&self) -> Option<&[u8]> {
        match self {
            Object::String(s) => Some(s),
            _ => None,
        }
    }

    /// Decode a text string (ISO 32000-1, 7.9.2.2).
    ///
    /// UTF-16BE and UTF-8 byte order marks are honoured; anything else is read as
    /// PDFDocEncoding, approximated by Latin-1.
    pub fn as_text(&self) -> Option<String> {
        let bytes = self.as_string()?;
        Some(match bytes {
            [0xFE, 0xFF, rest @ ..] => {
                let units: Vec<u16> = rest
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect();
                String::from_utf16_lossy(&units)
            },
            [0xEF, 0xBB, 0xBF, rest @ ..] => String::from_utf8_lossy(rest).into_owned(),
            _ => bytes.iter().map(|&b| b as char).collect(),
        })
    }

    /// Check if object is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }

    /// Check if object is a stream.
    pub fn is_stream(&self) -> bool {
        matches!(self, Object::Stream { .. })
    }

    /// True when this is a dictionary (or stream) whose `/Type` equals `type_name`.
    pub fn has_type(&self, type_name: &str) -> bool {
        self.as_dict()
            .and_then(|d| d.get("Type"))
            .and_then(|t| t.as_name())
            == Some(type_name)
    }

    /// Names of the filters applied to a stream, in decoding order.
    pub fn filters(&self) -> Vec<String> {
        self.as_dict()
            .and_then(|d| d.get("Filter"))
            .map(extract_filter_names)
            .unwrap_or_default()
    }

    /// Decode stream data using the filters named in the stream dictionary.
    ///
    /// Decoding stops at the first filter the engine treats as an image codec, so the
    /// returned bytes may still be encoded by that filter.
    pub fn decode_stream_data(&self) -> Result<Vec<u8>> {
        self.decode_stream_data_limited(crate::parser_config::DEFAULT_MAX_DECOMPRESSED_SIZE)
    }

    /// Decode stream data, failing with a resource-limit error above `max_size` bytes.
    pub fn decode_stream_data_limited(&self, max_size: usize) -> Result<Vec<u8>> {
        match self {
            Object::Stream { dict, data } => {
                let filters = dict
                    .get("Filter")
                    .map(extract_filter_names)
                    .unwrap_or_default();

                if filters.is_empty() {
                    return Ok(data.to_vec());
                }

                let params = extract_decode_params(dict.get("DecodeParms"), filters.len());
                crate::decoders::decode_stream_with_params(data, &filters, &params, max_size)
            },
            _ => Err(Error::InvalidObjectType {
                expected: "Stream".to_string(),
                found: self.type_name().to_string(),
            }),
        }
    }
}

/// Extract filter names from a Filter object.
///
/// The Filter entry can be either a single Name or an Array of Names.
fn extract_filter_names(filter_obj: &Object) -> Vec<String> {
    match filter_obj {
        Object::Name(name) => vec![name.clone()],
        Object::Array(arr) => arr
            .iter()
            .filter_map(|obj| obj.as_name().map(|s| s.to_string()))
            .collect(),
        _ => vec![],
    }
}

/// Extract decode parameters, one slot per filter.
///
/// DecodeParms is either a dictionary (single filter) or an array aligned with the
/// Filter array, where `null` marks a filter without parameters.
pub(crate) fn extract_decode_params(params_obj: Option<&Object>, filter_count: usize) -> Vec<Option<DecodeParams>> {
    let mut params = vec![None; filter_count];
    match params_obj {
        Some(Object::Dictionary(d)) => {
            if let Some(slot) = params.first_mut() {
                *slot = Some(DecodeParams::from_dict(d));
            }
        },
        Some(Object::Array(arr)) => {
            for (slot, obj) in params.iter_mut().zip(arr.iter()) {
                *slot = obj.as_dict().map(DecodeParams::from_dict);
            }
        },
        _ => {},
    }
    params
}
