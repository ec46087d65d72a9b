//! Cross-reference reconstruction for damaged files.
//!
//! When the index is missing, unreadable, or points at the wrong bytes, the whole file
//! is scanned for `N G obj` headers. Each candidate is parsed to confirm it really is
//! an object; later definitions of the same number win, as they would in an
//! incremental update. The trailer comes from the last `trailer << >>` dictionary,
//! else the last `/Type /XRef` stream, else it is synthesized around the catalog.

use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectRef};
use crate::objstm::object_stream_members;
use crate::parser::{NoLengthResolver, ObjectParser};
use crate::parser_config::ParserOptions;
use crate::xref::{CrossRefTable, XRefEntry};
use lazy_static::lazy_static;
use regex::bytes::Regex;

lazy_static! {
    static ref RE_OBJ_HEADER: Regex = Regex::new(r"(\d+)\s+(\d+)\s+obj").unwrap();
    static ref RE_TRAILER: Regex = Regex::new(r"trailer\s*<<").unwrap();
}

/// Rebuild the cross-reference index by scanning `data`.
///
/// Fails with [`Error::UnrecoverableDocument`] when no object or no catalog is found.
pub fn reconstruct_xref(data: &[u8], options: &ParserOptions) -> Result<CrossRefTable> {
    log::info!("Reconstructing cross-reference index by linear scan");
    // Candidates are confirmed leniently whatever the caller's mode.
    let scan_options = ParserOptions {
        strict: false,
        ..*options
    };

    let mut table = CrossRefTable::new();
    let mut catalog: Option<ObjectRef> = None;
    let mut xref_stream_trailer: Option<Dict> = None;
    let mut object_streams: Vec<(u32, Object)> = Vec::new();

    for caps in RE_OBJ_HEADER.captures_iter(data) {
        let Some(whole) = caps.get(0) else { continue };
        let start = whole.start();
        if start > 0 && crate::lexer::is_regular(data[start - 1]) {
            continue;
        }
        let (Some(id), Some(gen)) = (
            caps.get(1).and_then(|m| parse_number::<u32>(m.as_bytes())),
            caps.get(2).and_then(|m| parse_number::<u16>(m.as_bytes())),
        ) else {
            continue;
        };

        let mut parser = ObjectParser::at(data, start, scan_options);
        let object = match parser.parse_indirect_object(&NoLengthResolver) {
            Ok((_, object)) => object,
            Err(e) => {
                log::debug!("Rejecting object header candidate at {}: {}", start, e);
                continue;
            },
        };

        if object.has_type("Catalog") {
            catalog = Some(ObjectRef::new(id, gen));
        }
        if object.has_type("XRef") {
            xref_stream_trailer = object.as_dict().cloned();
        }
        if object.has_type("ObjStm") {
            object_streams.push((id, object));
        }

        table.add_entry(id, XRefEntry::InUse { offset: start, gen });
        if table.len() > options.max_objects {
            return Err(Error::ResourceLimit {
                what: "object count",
                limit: options.max_objects,
            });
        }
    }

    // Members of object streams are reachable only through their container.
    for (stream_id, stream) in &object_streams {
        match object_stream_members(stream, &scan_options) {
            Ok(members) => {
                for (index, member) in members.into_iter().enumerate() {
                    if !table.contains(member) {
                        table.add_entry(
                            member,
                            XRefEntry::Compressed {
                                stream: *stream_id,
                                index: index as u32,
                            },
                        );
                    }
                }
            },
            Err(e) => log::warn!("Unreadable object stream {}: {}", stream_id, e),
        }
    }

    if table.is_empty() {
        return Err(Error::UnrecoverableDocument(
            "no objects found while rebuilding the cross-reference index".to_string(),
        ));
    }
    log::info!("Reconstructed index with {} objects", table.len());

    let mut trailer = find_trailer(data, &scan_options)
        .or_else(|| {
            xref_stream_trailer.map(|mut t| {
                for key in ["Length", "Filter", "DecodeParms", "W", "Index", "Type", "Prev"] {
                    t.remove(key);
                }
                t
            })
        })
        .unwrap_or_default();
    trailer.remove("Prev");
    trailer.remove("XRefStm");

    let root_ok = trailer
        .get("Root")
        .and_then(|r| r.as_reference())
        .is_some_and(|r| table.get(r.id).is_some_and(|e| e.is_in_use()));
    if !root_ok {
        let catalog = catalog.ok_or_else(|| {
            Error::UnrecoverableDocument("no document catalog found".to_string())
        })?;
        log::warn!("Synthesizing trailer around catalog {}", catalog);
        trailer.insert("Root".to_string(), Object::Reference(catalog));
    }

    let size = table.entries().map(|(n, _)| n).max().unwrap_or(0) as i64 + 1;
    trailer.insert("Size".to_string(), Object::Integer(size));
    if !table.contains(0) {
        table.add_entry(0, XRefEntry::Free { next: 0, gen: 65535 });
    }
    table.set_trailer(trailer);
    Ok(table)
}

/// The last parseable `trailer << ... >>` dictionary in the file.
fn find_trailer(data: &[u8], options: &ParserOptions) -> Option<Dict> {
    let matches: Vec<usize> = RE_TRAILER.find_iter(data).map(|m| m.start()).collect();
    matches.into_iter().rev().find_map(|start| {
        let mut parser = ObjectParser::at(data, start + b"trailer".len(), *options);
        match parser.parse_object() {
            Ok(Object::Dictionary(d)) => Some(d),
            _ => None,
        }
    })
}

fn parse_number<T: std::str::FromStr>(digits: &[u8]) -> Option<T> {
    std::str::from_utf8(digits).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> ParserOptions {
        ParserOptions::lenient()
    }

    #[test]
    fn test_reconstruct_simple_pdf() {
        let data = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n2 0 obj\n<< /Type /Pages /Kids [] /Count 0 >>\nendobj\ntrailer\n<< /Root 1 0 R >>\n%%EOF";
        let table = reconstruct_xref(data, &opts()).unwrap();
        assert!(matches!(table.get(1), Some(XRefEntry::InUse { offset: 9, .. })));
        assert!(table.get(2).unwrap().is_in_use());
        let trailer = table.trailer().unwrap();
        assert_eq!(
            trailer.get("Root").and_then(|r| r.as_reference()),
            Some(ObjectRef::new(1, 0))
        );
        assert_eq!(trailer.get("Size").and_then(|s| s.as_integer()), Some(3));
    }

    #[test]
    fn test_later_definition_wins() {
        let data = b"1 0 obj\n<< /Type /Catalog /V 1 >>\nendobj\n1 0 obj\n<< /Type /Catalog /V 2 >>\nendobj\n";
        let table = reconstruct_xref(data, &opts()).unwrap();
        match table.get(1) {
            Some(XRefEntry::InUse { offset, .. }) => assert!(*offset > 0),
            other => panic!("unexpected entry {:?}", other),
        }
    }

    #[test]
    fn test_synthesizes_trailer_without_one() {
        let data = b"3 0 obj\n(x)\nendobj\n7 0 obj\n<< /Type /Catalog >>\nendobj\n";
        let table = reconstruct_xref(data, &opts()).unwrap();
        assert_eq!(
            table
                .trailer()
                .and_then(|t| t.get("Root"))
                .and_then(|r| r.as_reference()),
            Some(ObjectRef::new(7, 0))
        );
    }

    #[test]
    fn test_false_positive_header_rejected() {
        let data = b"1 0 obj\n<< /Type /Catalog >>\nendobj\n% 5 0 obj ) broken\n";
        let table = reconstruct_xref(data, &opts()).unwrap();
        assert!(!table.contains(5));
    }

    #[test]
    fn test_no_objects() {
        assert!(matches!(
            reconstruct_xref(b"%PDF-1.4\nnothing here", &opts()),
            Err(Error::UnrecoverableDocument(_))
        ));
    }

    #[test]
    fn test_no_catalog() {
        assert!(matches!(
            reconstruct_xref(b"1 0 obj\n42\nendobj\n", &opts()),
            Err(Error::UnrecoverableDocument(_))
        ));
    }
}
