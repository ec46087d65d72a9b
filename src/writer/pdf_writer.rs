//! Whole-file PDF writer.
//!
//! Writes every object reachable from the trailer, renumbered densely, followed by a
//! fresh cross-reference section and trailer.

use std::collections::HashMap;
use std::io::Write;

use log::{debug, warn};
use md5::{Digest, Md5};

use super::object_serializer::ObjectSerializer;
use super::WriterOptions;
use crate::decoders::flate_encode;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectRef};

/// Objects packed into a single object stream.
const OBJECTS_PER_STREAM: usize = 100;

/// Where an object ended up in the output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum XrefEntry {
    /// Written directly at the given byte offset.
    InFile(usize),
    /// Stored inside object stream `stream` at position `index`.
    Compressed { stream: u32, index: usize },
}

/// PDF file writer.
pub struct PdfWriter;

impl PdfWriter {
    /// Serialize `doc` to a complete PDF file.
    pub fn write(doc: &Document, options: &WriterOptions) -> Result<Vec<u8>> {
        let root = match doc.trailer().get("Root") {
            Some(Object::Reference(r)) if doc.contains(*r) => *r,
            _ => {
                return Err(Error::InvalidArgument(
                    "document trailer has no catalog reference".to_string(),
                ))
            },
        };
        if options.linearize {
            warn!("Linearization is not supported, writing a standard file instead");
        }

        let version = options.version.unwrap_or_else(|| doc.version());
        let xref_stream = options.use_xref_stream && version >= (1, 5);
        if options.use_xref_stream && !xref_stream {
            debug!("PDF {}.{} predates cross-reference streams, using a classic table", version.0, version.1);
        }

        let order = doc.reachable();
        let numbering: HashMap<ObjectRef, u32> = order
            .iter()
            .enumerate()
            .map(|(i, r)| (*r, i as u32 + 1))
            .collect();
        debug!("Writing {} of {} objects", order.len(), doc.len());

        let mut objects = Vec::with_capacity(order.len());
        for obj_ref in &order {
            let Some(object) = doc.get(*obj_ref) else { continue };
            let mut object = renumber(object, &numbering);
            if options.compress_streams {
                compress(&mut object)?;
            }
            objects.push(object);
        }

        let serializer = ObjectSerializer::new();
        let mut output = Vec::new();
        writeln!(output, "%PDF-{}.{}", version.0, version.1)?;
        output.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");

        let mut entries: Vec<XrefEntry> = Vec::with_capacity(objects.len());
        let mut next_id = objects.len() as u32 + 1;

        if xref_stream && options.use_object_streams {
            let packable: Vec<usize> = objects
                .iter()
                .enumerate()
                .filter(|(_, o)| !o.is_stream())
                .map(|(i, _)| i)
                .collect();
            let mut placement: Vec<Option<XrefEntry>> = vec![None; objects.len()];
            let mut streams = Vec::new();
            for chunk in packable.chunks(OBJECTS_PER_STREAM) {
                let stream_id = next_id;
                next_id += 1;
                let members: Vec<(u32, &Object)> =
                    chunk.iter().map(|&i| (i as u32 + 1, &objects[i])).collect();
                streams.push((stream_id, build_object_stream(&members, &serializer)?));
                for (index, &i) in chunk.iter().enumerate() {
                    placement[i] = Some(XrefEntry::Compressed {
                        stream: stream_id,
                        index,
                    });
                }
            }
            for (i, object) in objects.iter().enumerate() {
                match placement[i] {
                    Some(entry) => entries.push(entry),
                    None => {
                        entries.push(XrefEntry::InFile(output.len()));
                        output.extend(serializer.serialize_indirect(i as u32 + 1, 0, object));
                    },
                }
            }
            for (stream_id, stream) in streams {
                entries.push(XrefEntry::InFile(output.len()));
                output.extend(serializer.serialize_indirect(stream_id, 0, &stream));
            }
        } else {
            for (i, object) in objects.iter().enumerate() {
                entries.push(XrefEntry::InFile(output.len()));
                output.extend(serializer.serialize_indirect(i as u32 + 1, 0, object));
            }
        }

        let mut trailer = Dict::new();
        trailer.insert("Root".to_string(), Object::Reference(ObjectRef::new(numbering[&root], 0)));
        if let Some(Object::Reference(info)) = doc.trailer().get("Info") {
            if let Some(&id) = numbering.get(info) {
                trailer.insert("Info".to_string(), Object::Reference(ObjectRef::new(id, 0)));
            }
        }
        trailer.insert("ID".to_string(), file_id(doc.trailer(), &output));

        if xref_stream {
            let xref_id = next_id;
            let size = xref_id + 1;
            entries.push(XrefEntry::InFile(output.len()));
            trailer.insert("Size".to_string(), Object::Integer(size as i64));
            let stream = build_xref_stream(trailer, &entries)?;
            let xref_offset = output.len();
            output.extend(serializer.serialize_indirect(xref_id, 0, &stream));
            writeln!(output, "startxref\n{}\n%%EOF", xref_offset)?;
        } else {
            let size = entries.len() + 1;
            trailer.insert("Size".to_string(), Object::Integer(size as i64));
            let xref_offset = output.len();
            writeln!(output, "xref\n0 {}", size)?;
            output.extend_from_slice(b"0000000000 65535 f \n");
            for entry in &entries {
                if let XrefEntry::InFile(offset) = entry {
                    writeln!(output, "{:010} 00000 n ", offset)?;
                }
            }
            output.extend_from_slice(b"trailer\n");
            serializer.write_object(&mut output, &Object::Dictionary(trailer));
            writeln!(output, "\nstartxref\n{}\n%%EOF", xref_offset)?;
        }

        debug!("Wrote {} bytes", output.len());
        Ok(output)
    }
}

/// Copy `object`, pointing references at their new numbers.
///
/// References to objects that are not written become `null`.
fn renumber(object: &Object, numbering: &HashMap<ObjectRef, u32>) -> Object {
    match object {
        Object::Reference(r) => match numbering.get(r) {
            Some(&id) => Object::Reference(ObjectRef::new(id, 0)),
            None => Object::Null,
        },
        Object::Array(items) => Object::Array(items.iter().map(|o| renumber(o, numbering)).collect()),
        Object::Dictionary(dict) => Object::Dictionary(renumber_dict(dict, numbering)),
        Object::Stream { dict, data } => Object::Stream {
            dict: renumber_dict(dict, numbering),
            data: data.clone(),
        },
        other => other.clone(),
    }
}

fn renumber_dict(dict: &Dict, numbering: &HashMap<ObjectRef, u32>) -> Dict {
    dict.iter()
        .map(|(k, v)| (k.clone(), renumber(v, numbering)))
        .collect()
}

/// Flate-compress an unfiltered stream in place.
///
/// XMP metadata streams stay uncompressed.
fn compress(object: &mut Object) -> Result<()> {
    let Object::Stream { dict, data } = object else {
        return Ok(());
    };
    if dict.contains_key("Filter") || data.is_empty() {
        return Ok(());
    }
    if matches!(dict.get("Type"), Some(Object::Name(t)) if t == "Metadata") {
        return Ok(());
    }
    let encoded = flate_encode(data)?;
    dict.remove("DecodeParms");
    dict.insert("Filter".to_string(), Object::name("FlateDecode"));
    *data = bytes::Bytes::from(encoded);
    Ok(())
}

/// `/ID` pair: the source's first element when present, then an MD5 of the body.
fn file_id(source_trailer: &Dict, body: &[u8]) -> Object {
    let digest = Md5::digest(body).to_vec();
    let first = match source_trailer.get("ID") {
        Some(Object::Array(ids)) => match ids.first() {
            Some(Object::String(s)) if !s.is_empty() => s.clone(),
            _ => digest.clone(),
        },
        _ => digest.clone(),
    };
    Object::Array(vec![Object::String(first), Object::String(digest)])
}

fn build_object_stream(members: &[(u32, &Object)], serializer: &ObjectSerializer) -> Result<Object> {
    let mut header = Vec::new();
    let mut body = Vec::new();
    for (id, object) in members {
        write!(header, "{} {} ", id, body.len())?;
        serializer.write_object(&mut body, object);
        body.push(b'\n');
    }
    header.push(b'\n');
    let first = header.len();
    header.extend_from_slice(&body);

    let mut dict = Dict::new();
    dict.insert("Type".to_string(), Object::name("ObjStm"));
    dict.insert("N".to_string(), Object::Integer(members.len() as i64));
    dict.insert("First".to_string(), Object::Integer(first as i64));
    dict.insert("Filter".to_string(), Object::name("FlateDecode"));
    Ok(Object::Stream {
        dict,
        data: bytes::Bytes::from(flate_encode(&header)?),
    })
}

/// Cross-reference stream with `/W [1 4 2]`.
fn build_xref_stream(mut dict: Dict, entries: &[XrefEntry]) -> Result<Object> {
    let mut rows = Vec::with_capacity((entries.len() + 1) * 7);
    rows.extend_from_slice(&[0, 0, 0, 0, 0, 0xFF, 0xFF]);
    for entry in entries {
        let (kind, field2, field3) = match *entry {
            XrefEntry::InFile(offset) => (1u8, offset as u32, 0u16),
            XrefEntry::Compressed { stream, index } => (2u8, stream, index as u16),
        };
        rows.push(kind);
        rows.extend_from_slice(&field2.to_be_bytes());
        rows.extend_from_slice(&field3.to_be_bytes());
    }

    let size = entries.len() as i64 + 1;
    dict.insert("Type".to_string(), Object::name("XRef"));
    dict.insert(
        "W".to_string(),
        Object::Array(vec![Object::Integer(1), Object::Integer(4), Object::Integer(2)]),
    );
    dict.insert(
        "Index".to_string(),
        Object::Array(vec![Object::Integer(0), Object::Integer(size)]),
    );
    dict.insert("Filter".to_string(), Object::name("FlateDecode"));
    Ok(Object::Stream {
        dict,
        data: bytes::Bytes::from(flate_encode(&rows)?),
    })
}
