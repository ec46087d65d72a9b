//! Cross-reference index.
//!
//! The index maps object numbers to byte offsets (or to a slot in an object stream),
//! enabling random access to objects. Both classic `xref` tables and cross-reference
//! streams (PDF 1.5+) are read; the format is detected from the bytes at the offset
//! named by `startxref`. Incremental updates are followed through `/Prev`, and hybrid
//! files through `/XRefStm`.

use crate::error::{Error, ErrorKind, Result};
use crate::lexer::{SpannedToken, Token, Tokenizer};
use crate::object::{Dict, Object};
use crate::parser::{has_object_header, NoLengthResolver, ObjectParser};
use crate::parser_config::ParserOptions;
use std::collections::{BTreeMap, HashSet};

/// Longest `/Prev` chain that is followed.
pub const MAX_PREV_DEPTH: usize = 100;

/// How many bytes from the end of the file are searched for `startxref`.
const STARTXREF_WINDOW: usize = 2048;

/// Cross-reference table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// Free slot
    Free {
        /// Next free object number
        next: u32,
        /// Generation to use when the slot is reused
        gen: u16,
    },
    /// Object stored at a byte offset
    InUse {
        /// Byte offset of the `N G obj` header
        offset: usize,
        /// Generation number
        gen: u16,
    },
    /// Object stored inside an object stream
    Compressed {
        /// Object number of the containing `/ObjStm`
        stream: u32,
        /// Index within the object stream
        index: u32,
    },
}

impl XRefEntry {
    /// True unless the entry is free.
    pub fn is_in_use(&self) -> bool {
        !matches!(self, XRefEntry::Free { .. })
    }

    /// Generation number (0 for compressed objects).
    pub fn generation(&self) -> u16 {
        match self {
            XRefEntry::Free { gen, .. } | XRefEntry::InUse { gen, .. } => *gen,
            XRefEntry::Compressed { .. } => 0,
        }
    }
}

/// Cross-reference table: object number → location, plus the trailer.
#[derive(Debug, Clone, Default)]
pub struct CrossRefTable {
    entries: BTreeMap<u32, XRefEntry>,
    trailer: Option<Dict>,
}

impl CrossRefTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the trailer dictionary.
    pub fn set_trailer(&mut self, trailer: Dict) {
        self.trailer = Some(trailer);
    }

    /// Trailer dictionary, if one was read.
    pub fn trailer(&self) -> Option<&Dict> {
        self.trailer.as_ref()
    }

    /// Add or replace an entry.
    pub fn add_entry(&mut self, object_number: u32, entry: XRefEntry) {
        self.entries.insert(object_number, entry);
    }

    /// Entry for an object number.
    pub fn get(&self, object_number: u32) -> Option<&XRefEntry> {
        self.entries.get(&object_number)
    }

    /// True if the table has an entry for `object_number`.
    pub fn contains(&self, object_number: u32) -> bool {
        self.entries.contains_key(&object_number)
    }

    /// All entries in object-number order.
    pub fn entries(&self) -> impl Iterator<Item = (u32, &XRefEntry)> + '_ {
        self.entries.iter().map(|(n, e)| (*n, e))
    }

    /// Number of entries that are not free.
    pub fn in_use_count(&self) -> usize {
        self.entries.values().filter(|e| e.is_in_use()).count()
    }

    /// Merge an older section into this one.
    ///
    /// Entries already present win (incremental updates override older sections).
    pub fn merge_from(&mut self, other: CrossRefTable) {
        for (number, entry) in other.entries {
            self.entries.entry(number).or_insert(entry);
        }
        if self.trailer.is_none() {
            self.trailer = other.trailer;
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Find the offset named by the last `startxref` in the final 2 KiB of the file.
pub fn find_xref_offset(data: &[u8]) -> Result<usize> {
    let window_start = data.len().saturating_sub(STARTXREF_WINDOW);
    let window = &data[window_start..];
    let keyword = b"startxref";

    let pos = window
        .windows(keyword.len())
        .rposition(|w| w == keyword)
        .ok_or_else(|| Error::InvalidXRef("startxref not found".to_string()))?;

    let mut tokens = Tokenizer::new(&window[pos + keyword.len()..]);
    match tokens.next_token() {
        Ok(Some(SpannedToken {
            token: Token::Integer(n),
            ..
        })) if n >= 0 => Ok(n as usize),
        _ => Err(Error::InvalidXRef("startxref is not followed by an offset".to_string())),
    }
}

/// Parse the cross-reference index at `offset`, following `/Prev` and `/XRefStm`.
pub fn parse_xref(data: &[u8], offset: usize, options: &ParserOptions) -> Result<CrossRefTable> {
    let mut visited = HashSet::new();
    let mut table = parse_section(data, offset, options)?;
    visited.insert(offset);

    let mut prev = prev_offset(&table);
    let mut depth = 0;
    while let Some(prev_at) = prev {
        depth += 1;
        if depth > MAX_PREV_DEPTH {
            return Err(Error::InvalidXRef(format!(
                "/Prev chain longer than {}",
                MAX_PREV_DEPTH
            )));
        }
        if !visited.insert(prev_at) {
            log::warn!("Cycle in /Prev chain at offset {}, stopping", prev_at);
            break;
        }
        let older = match parse_section(data, prev_at, options) {
            Ok(older) => older,
            Err(e) if !options.strict && e.kind() != ErrorKind::ResourceLimit => {
                log::warn!("Ignoring unreadable /Prev section at {}: {}", prev_at, e);
                break;
            },
            Err(e) => return Err(e),
        };
        prev = prev_offset(&older);
        table.merge_from(older);
    }

    if table.len() > options.max_objects {
        return Err(Error::ResourceLimit {
            what: "object count",
            limit: options.max_objects,
        });
    }

    log::debug!(
        "Cross-reference index: {} entries, {} in use",
        table.len(),
        table.in_use_count()
    );
    Ok(table)
}

fn prev_offset(table: &CrossRefTable) -> Option<usize> {
    table
        .trailer()
        .and_then(|t| t.get("Prev"))
        .and_then(|p| p.as_integer())
        .filter(|p| *p >= 0)
        .map(|p| p as usize)
}

/// Parse one section (table or stream) without following `/Prev`.
fn parse_section(data: &[u8], offset: usize, options: &ParserOptions) -> Result<CrossRefTable> {
    if offset >= data.len() {
        return Err(Error::InvalidXRef(format!(
            "xref offset {} beyond end of file ({} bytes)",
            offset,
            data.len()
        )));
    }
    let at = &data[offset..];
    let trimmed = crate::lexer::skip_ws(at);

    if trimmed.starts_with(b"xref") {
        log::debug!("Classic xref table at offset {}", offset);
        let mut table = parse_xref_table(data, offset + (at.len() - trimmed.len()), options)?;
        merge_hybrid_stream(data, &mut table, options)?;
        Ok(table)
    } else if trimmed.first().is_some_and(|c| c.is_ascii_digit()) {
        log::debug!("Cross-reference stream at offset {}", offset);
        parse_xref_stream(data, offset, options)
    } else {
        Err(Error::InvalidXRef(format!(
            "no xref table or stream at offset {}",
            offset
        )))
    }
}

/// Hybrid files list compressed objects in a stream named by `/XRefStm`.
/// Its entries fill slots the classic table leaves free or unlisted.
fn merge_hybrid_stream(
    data: &[u8],
    table: &mut CrossRefTable,
    options: &ParserOptions,
) -> Result<()> {
    let Some(stm_offset) = table
        .trailer()
        .and_then(|t| t.get("XRefStm"))
        .and_then(|o| o.as_integer())
        .filter(|o| *o >= 0)
    else {
        return Ok(());
    };

    let stream_table = match parse_xref_stream(data, stm_offset as usize, options) {
        Ok(t) => t,
        Err(e) if !options.strict && e.kind() != ErrorKind::ResourceLimit => {
            log::warn!("Ignoring unreadable /XRefStm at {}: {}", stm_offset, e);
            return Ok(());
        },
        Err(e) => return Err(e),
    };

    for (number, entry) in stream_table.entries {
        let replace = match table.get(number) {
            None | Some(XRefEntry::Free { .. }) => entry.is_in_use(),
            Some(_) => false,
        };
        if replace {
            table.add_entry(number, entry);
        }
    }
    Ok(())
}

/// Parse a classic table starting at the `xref` keyword.
fn parse_xref_table(data: &[u8], offset: usize, options: &ParserOptions) -> Result<CrossRefTable> {
    let mut tokens = Tokenizer::new(data);
    tokens.seek(offset);
    let bad = |what: &str| Error::InvalidXRef(format!("{} in xref table at {}", what, offset));

    match tokens.next_token() {
        Ok(Some(SpannedToken {
            token: Token::Keyword(b"xref"),
            ..
        })) => {},
        _ => return Err(bad("missing xref keyword")),
    }

    let mut table = CrossRefTable::new();
    loop {
        let tok = tokens
            .next_token()
            .map_err(|e| bad(&e.to_string()))?
            .ok_or_else(|| bad("unexpected end of file"))?;
        let start = match tok.token {
            Token::Keyword(b"trailer") => break,
            Token::Integer(n) if n >= 0 => n as u32,
            _ => return Err(bad("malformed subsection header")),
        };
        let count = match tokens.next_token() {
            Ok(Some(SpannedToken {
                token: Token::Integer(n),
                ..
            })) if n >= 0 => n as usize,
            _ => return Err(bad("malformed subsection count")),
        };
        if count > options.max_objects {
            return Err(Error::ResourceLimit {
                what: "object count",
                limit: options.max_objects,
            });
        }

        for i in 0..count {
            let (field1, field2, kind) = read_table_entry(&mut tokens)
                .ok_or_else(|| bad(&format!("malformed entry {} of subsection {}", i, start)))?;
            let number = start
                .checked_add(i as u32)
                .ok_or_else(|| bad("object number overflow"))?;
            let gen = u16::try_from(field2).unwrap_or(u16::MAX);
            let entry = if kind == b'n' {
                XRefEntry::InUse {
                    offset: field1 as usize,
                    gen,
                }
            } else {
                XRefEntry::Free {
                    next: u32::try_from(field1).unwrap_or(0),
                    gen,
                }
            };
            table.add_entry(number, entry);
        }
    }

    let mut parser = ObjectParser::at(data, tokens.position(), *options);
    match parser.parse_object() {
        Ok(Object::Dictionary(trailer)) => table.set_trailer(trailer),
        Ok(other) => return Err(bad(&format!("trailer is a {}", other.type_name()))),
        Err(e) => return Err(bad(&format!("unreadable trailer: {}", e))),
    }

    // Tables that number from 0 but whose first entry is really object 1.
    if let Some(XRefEntry::InUse { offset: first, .. }) = table.get(0).copied() {
        if has_object_header(data, first, 1) {
            log::warn!("xref table is off by one, shifting entries");
            let shifted: BTreeMap<u32, XRefEntry> =
                table.entries().map(|(n, e)| (n + 1, *e)).collect();
            table.entries = shifted;
            table.add_entry(0, XRefEntry::Free { next: 0, gen: 65535 });
        }
    }

    Ok(table)
}

fn read_table_entry(tokens: &mut Tokenizer<'_>) -> Option<(u64, u64, u8)> {
    let field1 = match tokens.next_token().ok()??.token {
        Token::Integer(n) if n >= 0 => n as u64,
        _ => return None,
    };
    let field2 = match tokens.next_token().ok()??.token {
        Token::Integer(n) if n >= 0 => n as u64,
        _ => return None,
    };
    match tokens.next_token().ok()??.token {
        Token::Keyword(b"n") => Some((field1, field2, b'n')),
        Token::Keyword(b"f") => Some((field1, field2, b'f')),
        _ => None,
    }
}

/// Parse a cross-reference stream object at `offset`.
pub fn parse_xref_stream(
    data: &[u8],
    offset: usize,
    options: &ParserOptions,
) -> Result<CrossRefTable> {
    let mut parser = ObjectParser::at(data, offset, *options);
    let (obj_ref, object) = parser
        .parse_indirect_object(&NoLengthResolver)
        .map_err(|e| Error::InvalidXRef(format!("unreadable xref stream at {}: {}", offset, e)))?;

    let Object::Stream { dict, .. } = &object else {
        return Err(Error::InvalidXRef(format!("object {} is not a stream", obj_ref)));
    };
    if !object.has_type("XRef") {
        return Err(Error::InvalidXRef(format!(
            "object {} is not an xref stream",
            obj_ref
        )));
    }

    let widths: Vec<usize> = dict
        .get("W")
        .and_then(|w| w.as_array())
        .map(|w| {
            w.iter()
                .filter_map(|x| x.as_integer())
                .filter(|x| (0..=8).contains(x))
                .map(|x| x as usize)
                .collect()
        })
        .unwrap_or_default();
    let &[w1, w2, w3] = widths.as_slice() else {
        return Err(Error::InvalidXRef("invalid /W array in xref stream".to_string()));
    };
    let entry_size = w1 + w2 + w3;
    if entry_size == 0 {
        return Err(Error::InvalidXRef("zero-width xref stream entries".to_string()));
    }

    let size = dict
        .get("Size")
        .and_then(|s| s.as_integer())
        .filter(|s| *s >= 0)
        .ok_or_else(|| Error::InvalidXRef("missing /Size in xref stream".to_string()))?;
    if size as usize > options.max_objects {
        return Err(Error::ResourceLimit {
            what: "object count",
            limit: options.max_objects,
        });
    }

    let ranges: Vec<(u32, usize)> = match dict.get("Index").and_then(|i| i.as_array()) {
        Some(index) => index
            .chunks(2)
            .filter_map(|pair| match pair {
                [start, count] => Some((
                    u32::try_from(start.as_integer()?).ok()?,
                    usize::try_from(count.as_integer()?).ok()?,
                )),
                _ => None,
            })
            .collect(),
        None => vec![(0, size as usize)],
    };

    let decoded = object.decode_stream_data_limited(options.max_decompressed_size)?;

    let mut table = CrossRefTable::new();
    let mut rows = decoded.chunks_exact(entry_size);
    'ranges: for (start, count) in ranges {
        for i in 0..count {
            let Some(row) = rows.next() else {
                log::warn!("xref stream data is shorter than its /Index declares");
                break 'ranges;
            };
            let kind = if w1 == 0 { 1 } else { read_int(&row[..w1]) };
            let field2 = read_int(&row[w1..w1 + w2]);
            let field3 = read_int(&row[w1 + w2..]);
            let entry = match kind {
                0 => XRefEntry::Free {
                    next: field2 as u32,
                    gen: field3 as u16,
                },
                1 => XRefEntry::InUse {
                    offset: field2 as usize,
                    gen: if w3 == 0 { 0 } else { field3 as u16 },
                },
                2 => XRefEntry::Compressed {
                    stream: field2 as u32,
                    index: field3 as u32,
                },
                // Unknown types are treated as null references (ISO 32000-1, 7.5.8.3).
                _ => continue,
            };
            table.add_entry(start + i as u32, entry);
        }
    }

    let mut trailer = dict.clone();
    for key in ["Length", "Filter", "DecodeParms", "W", "Index", "Type"] {
        trailer.remove(key);
    }
    table.set_trailer(trailer);
    Ok(table)
}

/// Big-endian unsigned integer from up to eight bytes.
fn read_int(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

/// Check that every in-use offset points at the header of the same object.
pub fn validate_offsets(data: &[u8], table: &CrossRefTable) -> Result<()> {
    for (number, entry) in table.entries() {
        match entry {
            XRefEntry::InUse { offset, .. } if number != 0 => {
                if !has_object_header(data, *offset, number) {
                    return Err(Error::InvalidXRef(format!(
                        "offset {} of object {} does not point at its header",
                        offset, number
                    )));
                }
            },
            XRefEntry::Compressed { stream, .. } => {
                if !matches!(table.get(*stream), Some(XRefEntry::InUse { .. })) {
                    return Err(Error::InvalidXRef(format!(
                        "object {} lives in object stream {} which is not in use",
                        number, stream
                    )));
                }
            },
            _ => {},
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoders::flate_encode;

    fn opts() -> ParserOptions {
        ParserOptions::lenient()
    }

    #[test]
    fn test_find_xref_offset() {
        let data = b"%PDF-1.4\n...\nstartxref\n1234\n%%EOF\n";
        assert_eq!(find_xref_offset(data).unwrap(), 1234);
    }

    #[test]
    fn test_find_xref_offset_uses_last() {
        let data = b"startxref\n10\n%%EOF\nstartxref\r20\r%%EOF";
        assert_eq!(find_xref_offset(data).unwrap(), 20);
    }

    #[test]
    fn test_find_xref_offset_missing() {
        assert!(matches!(
            find_xref_offset(b"%PDF-1.4\n%%EOF"),
            Err(Error::InvalidXRef(_))
        ));
    }

    #[test]
    fn test_parse_xref_table_subsections() {
        let data = b"xref\n0 2\n0000000000 65535 f \n0000000017 00000 n \n5 1\n0000000099 00002 n \ntrailer\n<< /Size 6 /Root 1 0 R >>\n";
        let table = parse_xref(data, 0, &opts()).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(1), Some(&XRefEntry::InUse { offset: 17, gen: 0 }));
        assert_eq!(table.get(5), Some(&XRefEntry::InUse { offset: 99, gen: 2 }));
        assert!(!table.get(0).unwrap().is_in_use());
        assert_eq!(
            table.trailer().unwrap().get("Size").and_then(|s| s.as_integer()),
            Some(6)
        );
    }

    #[test]
    fn test_parse_xref_malformed_entry() {
        let data = b"xref\n0 2\n0000000000 65535 f \nGARBAGE\ntrailer\n<< >>\n";
        assert!(matches!(parse_xref(data, 0, &opts()), Err(Error::InvalidXRef(_))));
    }

    #[test]
    fn test_parse_xref_excessive_count() {
        let data = b"xref\n0 999999999\n";
        let small = ParserOptions::lenient().with_max_objects(10);
        assert!(matches!(
            parse_xref(data, 0, &small),
            Err(Error::ResourceLimit { .. })
        ));
    }

    #[test]
    fn test_parse_xref_bad_offset() {
        assert!(matches!(
            parse_xref(b"xref", 100, &opts()),
            Err(Error::InvalidXRef(_))
        ));
        assert!(matches!(
            parse_xref(b"hello world", 0, &opts()),
            Err(Error::InvalidXRef(_))
        ));
    }

    #[test]
    fn test_prev_chain_newer_wins() {
        let older = b"xref\n0 2\n0000000000 65535 f \n0000000011 00000 n \ntrailer\n<< /Size 2 >>\n";
        let mut data = older.to_vec();
        let newer_at = data.len();
        data.extend_from_slice(
            b"xref\n1 1\n0000000022 00000 n \n3 1\n0000000033 00000 n \ntrailer\n<< /Size 4 /Prev 0 >>\n",
        );
        let table = parse_xref(&data, newer_at, &opts()).unwrap();
        assert_eq!(table.get(1), Some(&XRefEntry::InUse { offset: 22, gen: 0 }));
        assert_eq!(table.get(3), Some(&XRefEntry::InUse { offset: 33, gen: 0 }));
        assert!(table.contains(0));
        // The newest trailer is kept.
        assert_eq!(
            table.trailer().unwrap().get("Size").and_then(|s| s.as_integer()),
            Some(4)
        );
    }

    #[test]
    fn test_prev_cycle_terminates() {
        let data = b"xref\n0 1\n0000000000 65535 f \ntrailer\n<< /Size 1 /Prev 0 >>\n";
        let table = parse_xref(data, 0, &opts()).unwrap();
        assert_eq!(table.len(), 1);
    }

    fn xref_stream_object(rows: &[[u8; 4]], extra: &str) -> Vec<u8> {
        // PNG Up predictor, 4 columns.
        let mut raw = Vec::new();
        let mut prev = [0u8; 4];
        for row in rows {
            raw.push(2);
            for i in 0..4 {
                raw.push(row[i].wrapping_sub(prev[i]));
            }
            prev = *row;
        }
        let compressed = flate_encode(&raw).unwrap();
        let mut out = format!(
            "9 0 obj\n<< /Type /XRef /Size {} /W [1 2 1] /Filter /FlateDecode /DecodeParms << /Predictor 12 /Columns 4 >> /Length {} /Root 1 0 R {} >>\nstream\n",
            rows.len(),
            compressed.len(),
            extra
        )
        .into_bytes();
        out.extend_from_slice(&compressed);
        out.extend_from_slice(b"\nendstream\nendobj\n");
        out
    }

    #[test]
    fn test_parse_xref_stream_with_predictor() {
        let data = xref_stream_object(
            &[[0, 0, 0, 255], [1, 0, 15, 0], [2, 0, 9, 3], [1, 1, 0, 0]],
            "",
        );
        let table = parse_xref(&data, 0, &opts()).unwrap();
        assert_eq!(table.get(1), Some(&XRefEntry::InUse { offset: 15, gen: 0 }));
        assert_eq!(table.get(2), Some(&XRefEntry::Compressed { stream: 9, index: 3 }));
        assert_eq!(table.get(3), Some(&XRefEntry::InUse { offset: 256, gen: 0 }));
        let trailer = table.trailer().unwrap();
        assert!(trailer.contains_key("Root"));
        assert!(!trailer.contains_key("W"));
    }

    #[test]
    fn test_parse_xref_stream_index_ranges() {
        let data = xref_stream_object(&[[1, 0, 10, 0], [1, 0, 20, 0]], "/Index [4 1 7 1]");
        let table = parse_xref(&data, 0, &opts()).unwrap();
        assert_eq!(table.get(4), Some(&XRefEntry::InUse { offset: 10, gen: 0 }));
        assert_eq!(table.get(7), Some(&XRefEntry::InUse { offset: 20, gen: 0 }));
        assert!(!table.contains(0));
    }

    #[test]
    fn test_validate_offsets() {
        let data = b"1 0 obj\n<< >>\nendobj\n";
        let mut table = CrossRefTable::new();
        table.add_entry(0, XRefEntry::Free { next: 0, gen: 65535 });
        table.add_entry(1, XRefEntry::InUse { offset: 0, gen: 0 });
        assert!(validate_offsets(data, &table).is_ok());

        table.add_entry(1, XRefEntry::InUse { offset: 3, gen: 0 });
        assert!(matches!(validate_offsets(data, &table), Err(Error::InvalidXRef(_))));
    }

    #[test]
    fn test_validate_compressed_needs_stream() {
        let mut table = CrossRefTable::new();
        table.add_entry(4, XRefEntry::Compressed { stream: 9, index: 0 });
        assert!(validate_offsets(b"", &table).is_err());
    }
}
