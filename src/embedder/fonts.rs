//! Font program lookup and embedding.
//!
//! Every font used for rendering must carry its program in PDF/A. When a document
//! references an unembedded font, a [`FontSource`] is asked for a program by the
//! font's base name (subset prefix stripped). The whole program is embedded, the
//! font descriptor is rebuilt from the program's metrics, and for simple fonts the
//! `/Widths` array is recomputed so it agrees with the embedded glyph advances.

use crate::compliance::PdfAStandard;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectRef};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use bitflags::bitflags;
use ttf_parser::{name_id, Face, Tag};

bitflags! {
    /// Font descriptor flags.
    ///
    /// Per PDF spec Table 123 (Font flags).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FontFlags: u32 {
        /// Bit 1: all glyphs have the same width
        const FIXED_PITCH = 1 << 0;
        /// Bit 2: glyphs have serifs
        const SERIF = 1 << 1;
        /// Bit 3: glyphs outside the Adobe standard Latin set
        const SYMBOLIC = 1 << 2;
        /// Bit 4: glyphs resemble cursive handwriting
        const SCRIPT = 1 << 3;
        /// Bit 6: Adobe standard Latin character set
        const NONSYMBOLIC = 1 << 5;
        /// Bit 7: glyphs have dominant vertical strokes that are slanted
        const ITALIC = 1 << 6;
    }
}

/// Directory recursion bound for [`DirectoryFontSource`].
const MAX_SCAN_DEPTH: usize = 8;

/// Default code range for simple fonts that declare none.
const DEFAULT_FIRST_CHAR: u8 = 32;
const DEFAULT_LAST_CHAR: u8 = 255;

/// Mac OS Roman, codes 0x80..=0xFF.
const MAC_ROMAN_HIGH: &str = "ÄÅÇÉÑÖÜáàâäãåçéèêëíìîïñóòôöõúùûü†°¢£§•¶ß®©™´¨≠ÆØ∞±≤≥¥µ∂∑∏π∫ªºΩæø¿¡¬√ƒ≈∆«»…\u{a0}ÀÃÕŒœ–—“”‘’÷◊ÿŸ⁄€‹›ﬁﬂ‡·‚„‰ÂÊÁËÈÍÎÏÌÓÔ\u{f8ff}ÒÚÛÙıˆ˜¯˘˙˚¸˝˛ˇ";

/// Outline technology of a font program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutlineKind {
    /// `glyf` outlines, embedded as `/FontFile2`.
    TrueType,
    /// `CFF ` outlines in an OpenType wrapper, embedded as `/FontFile3 /OpenType`.
    Cff,
}

/// A validated TrueType or OpenType font program.
#[derive(Clone)]
pub struct FontProgram {
    data: Arc<Vec<u8>>,
    kind: OutlineKind,
}

impl fmt::Debug for FontProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FontProgram")
            .field("len", &self.data.len())
            .field("kind", &self.kind)
            .finish()
    }
}

impl FontProgram {
    /// Validate `data` as a font program.
    ///
    /// Fails with [`Error::UnembeddableResource`] when the data does not parse or
    /// carries neither `glyf` nor `CFF ` outlines.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let kind = {
            let face = parse_face(&data)?;
            let raw = face.raw_face();
            if raw.table(Tag::from_bytes(b"glyf")).is_some() {
                OutlineKind::TrueType
            } else if raw.table(Tag::from_bytes(b"CFF ")).is_some() {
                OutlineKind::Cff
            } else {
                return Err(Error::UnembeddableResource(
                    "font program has no glyf or CFF outlines".to_string(),
                ));
            }
        };
        Ok(Self {
            data: Arc::new(data),
            kind,
        })
    }

    /// The program bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The outline technology.
    pub fn kind(&self) -> OutlineKind {
        self.kind
    }

    /// Parse the program.
    pub fn face(&self) -> Result<Face<'_>> {
        parse_face(&self.data)
    }

    /// Names the program can be found under: PostScript, full and family names.
    pub fn names(&self) -> Vec<String> {
        let Ok(face) = self.face() else {
            return Vec::new();
        };
        let mut out: Vec<String> = face
            .names()
            .into_iter()
            .filter(|n| {
                n.name_id == name_id::POST_SCRIPT_NAME
                    || n.name_id == name_id::FULL_NAME
                    || n.name_id == name_id::FAMILY
            })
            .filter_map(|n| n.to_string())
            .collect();
        out.dedup();
        out
    }
}

fn parse_face(data: &[u8]) -> Result<Face<'_>> {
    Face::parse(data, 0)
        .map_err(|e| Error::UnembeddableResource(format!("unreadable font program: {}", e)))
}

/// Supplies font programs by base font name.
pub trait FontSource: Send + Sync {
    /// Find a program for `base_font` (subset prefix already stripped).
    fn find(&self, base_font: &str) -> Option<FontProgram>;
}

/// A source that never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFontSource;

impl FontSource for NoFontSource {
    fn find(&self, _base_font: &str) -> Option<FontProgram> {
        None
    }
}

/// Programs registered in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryFontSource {
    fonts: HashMap<String, FontProgram>,
}

impl MemoryFontSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `data` under `name` and under the names found in the program.
    pub fn register(&mut self, name: &str, data: Vec<u8>) -> Result<()> {
        let program = FontProgram::from_bytes(data)?;
        for alias in program.names() {
            self.fonts
                .entry(normalize_font_name(&alias))
                .or_insert_with(|| program.clone());
        }
        self.fonts.insert(normalize_font_name(name), program);
        Ok(())
    }

    /// Builder form of [`MemoryFontSource::register`].
    pub fn with_font(mut self, name: &str, data: Vec<u8>) -> Result<Self> {
        self.register(name, data)?;
        Ok(self)
    }

    /// Number of names indexed.
    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }
}

impl FontSource for MemoryFontSource {
    fn find(&self, base_font: &str) -> Option<FontProgram> {
        self.fonts.get(&normalize_font_name(base_font)).cloned()
    }
}

/// `.ttf`/`.otf` files found under a set of directories, indexed by name.
///
/// Programs are read from disk again on each lookup; only names are kept in memory.
#[derive(Debug, Clone, Default)]
pub struct DirectoryFontSource {
    index: HashMap<String, PathBuf>,
}

impl DirectoryFontSource {
    /// Scan `dirs` recursively.
    ///
    /// Unreadable files are skipped with a warning; an unreadable directory is an
    /// error.
    pub fn scan<P: AsRef<Path>>(dirs: &[P]) -> Result<Self> {
        let mut source = Self::default();
        for dir in dirs {
            source.scan_dir(dir.as_ref(), 0)?;
        }
        log::info!("Indexed {} font names", source.index.len());
        Ok(source)
    }

    fn scan_dir(&mut self, dir: &Path, depth: usize) -> Result<()> {
        if depth > MAX_SCAN_DEPTH {
            return Ok(());
        }
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                self.scan_dir(&path, depth + 1)?;
                continue;
            }
            let is_font = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("ttf") || e.eq_ignore_ascii_case("otf"));
            if !is_font {
                continue;
            }
            let program = match std::fs::read(&path).map_err(Error::from).and_then(FontProgram::from_bytes) {
                Ok(p) => p,
                Err(e) => {
                    log::warn!("Skipping font file {}: {}", path.display(), e);
                    continue;
                },
            };
            let stem = path.file_stem().and_then(|s| s.to_str()).map(str::to_string);
            for name in program.names().into_iter().chain(stem) {
                self.index
                    .entry(normalize_font_name(&name))
                    .or_insert_with(|| path.clone());
            }
        }
        Ok(())
    }

    /// Number of names indexed.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True when no font was found.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

impl FontSource for DirectoryFontSource {
    fn find(&self, base_font: &str) -> Option<FontProgram> {
        let path = self.index.get(&normalize_font_name(base_font))?;
        match std::fs::read(path).map_err(Error::from).and_then(FontProgram::from_bytes) {
            Ok(program) => Some(program),
            Err(e) => {
                log::warn!("Font file {} became unreadable: {}", path.display(), e);
                None
            },
        }
    }
}

/// Tries several sources in order.
#[derive(Default)]
pub struct ChainFontSource {
    sources: Vec<Box<dyn FontSource>>,
}

impl ChainFontSource {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a source.
    pub fn push(mut self, source: impl FontSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }
}

impl FontSource for ChainFontSource {
    fn find(&self, base_font: &str) -> Option<FontProgram> {
        self.sources.iter().find_map(|s| s.find(base_font))
    }
}

/// Remove a subset tag (`ABCDEF+`) from a font name.
pub fn strip_subset_prefix(name: &str) -> &str {
    if let Some((prefix, rest)) = name.split_once('+') {
        if prefix.len() == 6 && prefix.chars().all(|ch| ch.is_ascii_uppercase()) {
            return rest;
        }
    }
    name
}

/// Lookup key for a font name: subset tag removed, alphanumerics lowercased.
pub fn normalize_font_name(name: &str) -> String {
    strip_subset_prefix(name)
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// True when the font needs no program (Type3 glyphs are content streams).
pub fn needs_program(doc: &Document, font: ObjectRef) -> bool {
    let subtype = doc
        .get(font)
        .and_then(|f| f.as_dict())
        .and_then(|d| d.get("Subtype"))
        .and_then(|s| s.as_name());
    subtype != Some("Type3")
}

/// True when the font (or its descendant) has an embedded program.
pub fn is_embedded(doc: &Document, font: ObjectRef) -> bool {
    let Some(dict) = doc.get(font).and_then(|f| f.as_dict()) else {
        return false;
    };
    let dict = match dict.get("Subtype").and_then(|s| s.as_name()) {
        Some("Type3") => return true,
        Some("Type0") => match descendant(doc, dict).and_then(|d| doc.resolve_dict(d)) {
            Some(d) => d,
            None => return false,
        },
        _ => dict,
    };
    doc.lookup(dict, "FontDescriptor")
        .and_then(|d| d.as_dict())
        .is_some_and(|d| {
            ["FontFile", "FontFile2", "FontFile3"]
                .iter()
                .any(|k| doc.lookup(d, k).is_some_and(|f| f.is_stream()))
        })
}

/// The font's name as written in `/BaseFont`.
pub fn base_font_name(doc: &Document, font: ObjectRef) -> Option<String> {
    doc.get(font)?
        .as_dict()?
        .get("BaseFont")?
        .as_name()
        .map(str::to_string)
}

fn descendant<'a>(doc: &'a Document, dict: &'a Dict) -> Option<&'a Object> {
    doc.lookup(dict, "DescendantFonts")?.as_array()?.first()
}

/// What [`embed_font`] wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedFont {
    /// The font dictionary that now holds the program (the descendant for Type0).
    pub font: ObjectRef,
    /// The font file stream.
    pub program: ObjectRef,
    /// Outline technology of the program.
    pub kind: OutlineKind,
}

/// Embed a program for `font` from `source`.
///
/// Fails with [`Error::UnembeddableResource`] when the source has no program for the
/// font, the program is unusable, or it has CFF outlines and `standard` is part 1.
pub fn embed_font(
    doc: &mut Document,
    font: ObjectRef,
    source: &dyn FontSource,
    standard: PdfAStandard,
) -> Result<EmbeddedFont> {
    let dict = doc
        .get(font)
        .and_then(|f| f.as_dict())
        .ok_or_else(|| Error::InvalidObjectType {
            expected: "Dictionary".to_string(),
            found: doc.get(font).map_or("missing", |o| o.type_name()).to_string(),
        })?;
    let subtype = dict
        .get("Subtype")
        .and_then(|s| s.as_name())
        .unwrap_or("Type1")
        .to_string();
    let raw_name = dict
        .get("BaseFont")
        .and_then(|b| b.as_name())
        .map(str::to_string)
        .ok_or_else(|| Error::UnembeddableResource(format!("font {} has no /BaseFont", font)))?;
    let name = strip_subset_prefix(&raw_name).to_string();

    let program = source.find(&name).ok_or_else(|| {
        Error::UnembeddableResource(format!("no font program available for '{}'", name))
    })?;
    if program.kind() == OutlineKind::Cff && !standard.allows_opentype_fonts() {
        return Err(Error::UnembeddableResource(format!(
            "'{}' has CFF outlines, which {} cannot embed",
            name, standard
        )));
    }
    let face = program.face()?;
    let metrics = FontMetrics::from_face(&face);

    set_name(doc, font, "BaseFont", &name)?;
    let target = if subtype == "Type0" {
        promote_descendant(doc, font)?
    } else {
        font
    };

    let file_ref = doc.insert(font_file_stream(&program));
    let symbolic = if target == font {
        let symbolic = is_symbolic(doc, font, &name, &face);
        embed_simple(doc, font, &program, &face, symbolic, standard, &name)?;
        symbolic
    } else {
        embed_cid(doc, target, &program, &name)?;
        true
    };
    let file_key = match program.kind() {
        OutlineKind::TrueType => "FontFile2",
        OutlineKind::Cff => "FontFile3",
    };

    let descriptor = descriptor_for(doc, target)?;
    let mut flags = metrics.flags;
    flags |= if symbolic { FontFlags::SYMBOLIC } else { FontFlags::NONSYMBOLIC };
    let desc = doc
        .get_mut(descriptor)
        .and_then(|d| d.as_dict_mut())
        .ok_or_else(|| Error::UnrecoverableDocument("font descriptor vanished".to_string()))?;
    for key in ["FontFile", "FontFile2", "FontFile3", "CIDSet"] {
        desc.remove(key);
    }
    desc.insert("Type".to_string(), Object::name("FontDescriptor"));
    desc.insert("FontName".to_string(), Object::name(&name));
    desc.insert("Flags".to_string(), Object::Integer(flags.bits() as i64));
    desc.insert("FontBBox".to_string(), metrics.bbox_object());
    desc.insert("ItalicAngle".to_string(), Object::Real(metrics.italic_angle));
    desc.insert("Ascent".to_string(), Object::Integer(metrics.ascent));
    desc.insert("Descent".to_string(), Object::Integer(metrics.descent));
    desc.insert("CapHeight".to_string(), Object::Integer(metrics.cap_height));
    desc.insert("StemV".to_string(), Object::Integer(metrics.stem_v));
    desc.insert(file_key.to_string(), Object::Reference(file_ref));

    log::info!(
        "Embedded {:?} program for '{}' ({} bytes) into {}",
        program.kind(),
        name,
        program.data().len(),
        target
    );
    Ok(EmbeddedFont {
        font: target,
        program: file_ref,
        kind: program.kind(),
    })
}

fn font_file_stream(program: &FontProgram) -> Object {
    let mut dict = Dict::new();
    match program.kind() {
        OutlineKind::TrueType => {
            dict.insert("Length1".to_string(), Object::Integer(program.data().len() as i64));
        },
        OutlineKind::Cff => {
            dict.insert("Subtype".to_string(), Object::name("OpenType"));
        },
    }
    Object::stream(dict, program.data().to_vec())
}

/// Glyph metrics in PDF glyph space (1000 units per em).
#[derive(Debug, Clone, PartialEq)]
struct FontMetrics {
    bbox: [i64; 4],
    italic_angle: f64,
    ascent: i64,
    descent: i64,
    cap_height: i64,
    stem_v: i64,
    flags: FontFlags,
}

impl FontMetrics {
    fn from_face(face: &Face<'_>) -> Self {
        let upem = face.units_per_em().max(1) as f64;
        let scale = |v: i16| (v as f64 * 1000.0 / upem).round() as i64;
        let bbox = face.global_bounding_box();
        let italic_angle = italic_angle(face);
        let mut flags = FontFlags::empty();
        if face.is_monospaced() {
            flags |= FontFlags::FIXED_PITCH;
        }
        if face.is_italic() || italic_angle != 0.0 {
            flags |= FontFlags::ITALIC;
        }
        Self {
            bbox: [scale(bbox.x_min), scale(bbox.y_min), scale(bbox.x_max), scale(bbox.y_max)],
            italic_angle,
            ascent: scale(face.ascender()),
            descent: scale(face.descender()),
            cap_height: scale(face.capital_height().unwrap_or_else(|| face.ascender())),
            stem_v: if face.is_bold() { 120 } else { 80 },
            flags,
        }
    }

    fn bbox_object(&self) -> Object {
        Object::Array(self.bbox.iter().map(|v| Object::Integer(*v)).collect())
    }
}

/// `italicAngle` from the `post` table (16.16 fixed at offset 4).
fn italic_angle(face: &Face<'_>) -> f64 {
    face.raw_face()
        .table(Tag::from_bytes(b"post"))
        .and_then(|post| post.get(4..8))
        .map(|b| i32::from_be_bytes([b[0], b[1], b[2], b[3]]) as f64 / 65536.0)
        .unwrap_or(0.0)
}

fn is_symbolic(doc: &Document, font: ObjectRef, name: &str, face: &Face<'_>) -> bool {
    let normalized = normalize_font_name(name);
    if ["symbol", "zapfdingbats", "wingdings", "webdings", "dingbats"]
        .iter()
        .any(|s| normalized.starts_with(s))
    {
        return true;
    }
    let declared = doc
        .get(font)
        .and_then(|f| f.as_dict())
        .and_then(|d| doc.lookup(d, "FontDescriptor"))
        .and_then(|d| d.as_dict())
        .and_then(|d| d.get("Flags"))
        .and_then(|f| f.as_integer())
        .map(|f| FontFlags::from_bits_retain(f as u32));
    if let Some(flags) = declared {
        if flags.contains(FontFlags::SYMBOLIC) && !flags.contains(FontFlags::NONSYMBOLIC) {
            return true;
        }
    }
    face.glyph_index('A').is_none() && face.glyph_index('a').is_none()
}

/// Character encoding in effect for a simple font.
#[derive(Debug, Clone, PartialEq)]
enum SimpleEncoding {
    WinAnsi,
    MacRoman,
    /// A base encoding with a `/Differences` overlay.
    Custom {
        base: Box<SimpleEncoding>,
        differences: Vec<(u8, String)>,
    },
}

impl SimpleEncoding {
    fn from_font(doc: &Document, dict: &Dict) -> Self {
        match doc.lookup(dict, "Encoding") {
            Some(Object::Name(n)) if n == "MacRomanEncoding" => SimpleEncoding::MacRoman,
            Some(Object::Dictionary(enc)) => {
                let base = match enc.get("BaseEncoding").and_then(|b| b.as_name()) {
                    Some("MacRomanEncoding") => SimpleEncoding::MacRoman,
                    _ => SimpleEncoding::WinAnsi,
                };
                let differences = enc
                    .get("Differences")
                    .and_then(|d| doc.resolve(d))
                    .and_then(|d| d.as_array())
                    .map(|d| parse_differences(d))
                    .unwrap_or_default();
                if differences.is_empty() {
                    base
                } else {
                    SimpleEncoding::Custom {
                        base: Box::new(base),
                        differences,
                    }
                }
            },
            _ => SimpleEncoding::WinAnsi,
        }
    }

    fn base_name(&self) -> &'static str {
        match self {
            SimpleEncoding::WinAnsi => "WinAnsiEncoding",
            SimpleEncoding::MacRoman => "MacRomanEncoding",
            SimpleEncoding::Custom { base, .. } => base.base_name(),
        }
    }

    fn to_object(&self) -> Object {
        match self {
            SimpleEncoding::Custom { base, differences } => {
                let mut array = Vec::new();
                let mut last: Option<u8> = None;
                for (code, glyph) in differences {
                    if last.map_or(true, |l| l.checked_add(1) != Some(*code)) {
                        array.push(Object::Integer(*code as i64));
                    }
                    array.push(Object::name(glyph));
                    last = Some(*code);
                }
                Object::dictionary(vec![
                    ("Type", Object::name("Encoding")),
                    ("BaseEncoding", Object::name(base.base_name())),
                    ("Differences", Object::Array(array)),
                ])
            },
            other => Object::name(other.base_name()),
        }
    }

    fn to_unicode(&self, code: u8) -> Option<char> {
        match self {
            SimpleEncoding::WinAnsi => winansi_to_unicode(code),
            SimpleEncoding::MacRoman => mac_roman_to_unicode(code),
            SimpleEncoding::Custom { base, differences } => differences
                .iter()
                .find(|(c, _)| *c == code)
                .map(|(_, glyph)| glyph_name_to_unicode(glyph))
                .unwrap_or_else(|| base.to_unicode(code)),
        }
    }
}

fn parse_differences(array: &[Object]) -> Vec<(u8, String)> {
    let mut out = Vec::new();
    let mut code: Option<i64> = None;
    for item in array {
        match item {
            Object::Integer(c) => code = Some(*c),
            Object::Name(glyph) => {
                if let Some(c) = code {
                    if let Ok(byte) = u8::try_from(c) {
                        out.retain(|(b, _)| *b != byte);
                        out.push((byte, glyph.clone()));
                    }
                    code = Some(c + 1);
                }
            },
            _ => {},
        }
    }
    out.sort_by_key(|(c, _)| *c);
    out
}

fn embed_simple(
    doc: &mut Document,
    font: ObjectRef,
    program: &FontProgram,
    face: &Face<'_>,
    symbolic: bool,
    standard: PdfAStandard,
    name: &str,
) -> Result<()> {
    let dict = doc
        .get(font)
        .and_then(|f| f.as_dict())
        .ok_or_else(|| Error::UnrecoverableDocument(format!("font {} vanished", font)))?;

    let first = dict
        .get("FirstChar")
        .and_then(|c| c.as_integer())
        .and_then(|c| u8::try_from(c).ok())
        .unwrap_or(DEFAULT_FIRST_CHAR);
    let last = dict
        .get("LastChar")
        .and_then(|c| c.as_integer())
        .and_then(|c| u8::try_from(c).ok())
        .filter(|l| *l >= first)
        .unwrap_or(DEFAULT_LAST_CHAR.max(first));

    let encoding = if symbolic {
        None
    } else {
        let mut enc = SimpleEncoding::from_font(doc, dict);
        if standard.part() == 1 {
            if let SimpleEncoding::Custom { base, .. } = enc {
                log::warn!("Dropping /Differences of '{}' for PDF/A-1", name);
                enc = *base;
            }
        }
        Some(enc)
    };

    let upem = face.units_per_em().max(1) as f64;
    let notdef = face
        .glyph_hor_advance(ttf_parser::GlyphId(0))
        .map_or(0, |a| (a as f64 * 1000.0 / upem).round() as i64);
    let widths: Vec<Object> = (first..=last)
        .map(|code| {
            let glyph = match &encoding {
                Some(enc) => enc.to_unicode(code).and_then(|ch| face.glyph_index(ch)),
                None => char::from_u32(0xF000 + code as u32)
                    .and_then(|ch| face.glyph_index(ch))
                    .or_else(|| face.glyph_index(code as char)),
            };
            let width = glyph
                .and_then(|g| face.glyph_hor_advance(g))
                .map_or(notdef, |a| (a as f64 * 1000.0 / upem).round() as i64);
            Object::Integer(width)
        })
        .collect();

    let dict = doc
        .get_mut(font)
        .and_then(|f| f.as_dict_mut())
        .ok_or_else(|| Error::UnrecoverableDocument(format!("font {} vanished", font)))?;
    if program.kind() == OutlineKind::TrueType {
        dict.insert("Subtype".to_string(), Object::name("TrueType"));
    }
    dict.insert("BaseFont".to_string(), Object::name(name));
    dict.insert("FirstChar".to_string(), Object::Integer(first as i64));
    dict.insert("LastChar".to_string(), Object::Integer(last as i64));
    dict.insert("Widths".to_string(), Object::Array(widths));
    match encoding {
        Some(enc) => {
            dict.insert("Encoding".to_string(), enc.to_object());
        },
        None => {
            dict.remove("Encoding");
        },
    }
    log::debug!("Recomputed widths of '{}' for codes {}..={}", name, first, last);
    Ok(())
}

fn embed_cid(doc: &mut Document, cid_font: ObjectRef, program: &FontProgram, name: &str) -> Result<()> {
    let dict = doc
        .get_mut(cid_font)
        .and_then(|f| f.as_dict_mut())
        .ok_or_else(|| Error::UnrecoverableDocument(format!("CID font {} vanished", cid_font)))?;
    dict.insert("BaseFont".to_string(), Object::name(name));
    match program.kind() {
        OutlineKind::TrueType => {
            dict.insert("Subtype".to_string(), Object::name("CIDFontType2"));
            if !dict.contains_key("CIDToGIDMap") {
                dict.insert("CIDToGIDMap".to_string(), Object::name("Identity"));
            }
        },
        OutlineKind::Cff => {
            dict.insert("Subtype".to_string(), Object::name("CIDFontType0"));
            dict.remove("CIDToGIDMap");
        },
    }
    Ok(())
}

/// Make the first descendant of a Type0 font an indirect object and return it.
fn promote_descendant(doc: &mut Document, font: ObjectRef) -> Result<ObjectRef> {
    let missing = || Error::UnembeddableResource(format!("Type0 font {} has no descendant font", font));
    let dict = doc.get(font).and_then(|f| f.as_dict()).ok_or_else(missing)?;
    let first = descendant(doc, dict).cloned().ok_or_else(missing)?;
    match first {
        Object::Reference(r) if doc.get(r).is_some_and(|o| o.as_dict().is_some()) => Ok(r),
        Object::Dictionary(_) => {
            let r = doc.insert(first);
            let dict = doc.get_mut(font).and_then(|f| f.as_dict_mut()).ok_or_else(missing)?;
            dict.insert(
                "DescendantFonts".to_string(),
                Object::Array(vec![Object::Reference(r)]),
            );
            Ok(r)
        },
        _ => Err(missing()),
    }
}

/// The descriptor of `font` as an indirect object, created when absent.
fn descriptor_for(doc: &mut Document, font: ObjectRef) -> Result<ObjectRef> {
    let current = doc
        .get(font)
        .and_then(|f| f.as_dict())
        .and_then(|d| d.get("FontDescriptor"))
        .cloned();
    let descriptor = match current {
        Some(Object::Reference(r)) if doc.get(r).is_some_and(|o| o.as_dict().is_some()) => return Ok(r),
        Some(Object::Dictionary(d)) => doc.insert(Object::Dictionary(d)),
        _ => doc.insert(Object::dictionary(vec![("Type", Object::name("FontDescriptor"))])),
    };
    let dict = doc
        .get_mut(font)
        .and_then(|f| f.as_dict_mut())
        .ok_or_else(|| Error::UnrecoverableDocument(format!("font {} vanished", font)))?;
    dict.insert("FontDescriptor".to_string(), Object::Reference(descriptor));
    Ok(descriptor)
}

fn set_name(doc: &mut Document, obj: ObjectRef, key: &str, value: &str) -> Result<()> {
    let dict = doc
        .get_mut(obj)
        .and_then(|f| f.as_dict_mut())
        .ok_or_else(|| Error::UnrecoverableDocument(format!("object {} vanished", obj)))?;
    dict.insert(key.to_string(), Object::name(value));
    Ok(())
}

/// Decode a WinAnsiEncoding code.
pub fn winansi_to_unicode(code: u8) -> Option<char> {
    let cp = match code {
        0x80 => 0x20AC,
        0x82 => 0x201A,
        0x83 => 0x0192,
        0x84 => 0x201E,
        0x85 => 0x2026,
        0x86 => 0x2020,
        0x87 => 0x2021,
        0x88 => 0x02C6,
        0x89 => 0x2030,
        0x8A => 0x0160,
        0x8B => 0x2039,
        0x8C => 0x0152,
        0x8E => 0x017D,
        0x91 => 0x2018,
        0x92 => 0x2019,
        0x93 => 0x201C,
        0x94 => 0x201D,
        0x95 => 0x2022,
        0x96 => 0x2013,
        0x97 => 0x2014,
        0x98 => 0x02DC,
        0x99 => 0x2122,
        0x9A => 0x0161,
        0x9B => 0x203A,
        0x9C => 0x0153,
        0x9E => 0x017E,
        0x9F => 0x0178,
        0x81 | 0x8D | 0x8F | 0x90 | 0x9D => return None,
        c => c as u32,
    };
    char::from_u32(cp)
}

/// Decode a MacRomanEncoding code.
pub fn mac_roman_to_unicode(code: u8) -> Option<char> {
    if code < 0x80 {
        Some(code as char)
    } else {
        MAC_ROMAN_HIGH.chars().nth((code - 0x80) as usize)
    }
}

/// Resolve a glyph name to a character.
///
/// Handles `uniXXXX`, `uXXXX[XX]`, single-character names and the common Latin
/// names of the Adobe Glyph List.
pub fn glyph_name_to_unicode(name: &str) -> Option<char> {
    let base = name.split('.').next().unwrap_or(name);
    if let Some(hex) = base.strip_prefix("uni") {
        if hex.len() == 4 {
            return u32::from_str_radix(hex, 16).ok().and_then(char::from_u32);
        }
    }
    if let Some(hex) = base.strip_prefix('u') {
        if (4..=6).contains(&hex.len()) && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return u32::from_str_radix(hex, 16).ok().and_then(char::from_u32);
        }
    }
    let mut chars = base.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return Some(c);
    }
    let cp = match base {
        "space" => 0x20,
        "exclam" => 0x21,
        "quotedbl" => 0x22,
        "numbersign" => 0x23,
        "dollar" => 0x24,
        "percent" => 0x25,
        "ampersand" => 0x26,
        "quotesingle" => 0x27,
        "parenleft" => 0x28,
        "parenright" => 0x29,
        "asterisk" => 0x2A,
        "plus" => 0x2B,
        "comma" => 0x2C,
        "hyphen" => 0x2D,
        "period" => 0x2E,
        "slash" => 0x2F,
        "zero" => 0x30,
        "one" => 0x31,
        "two" => 0x32,
        "three" => 0x33,
        "four" => 0x34,
        "five" => 0x35,
        "six" => 0x36,
        "seven" => 0x37,
        "eight" => 0x38,
        "nine" => 0x39,
        "colon" => 0x3A,
        "semicolon" => 0x3B,
        "less" => 0x3C,
        "equal" => 0x3D,
        "greater" => 0x3E,
        "question" => 0x3F,
        "at" => 0x40,
        "bracketleft" => 0x5B,
        "backslash" => 0x5C,
        "bracketright" => 0x5D,
        "asciicircum" => 0x5E,
        "underscore" => 0x5F,
        "grave" => 0x60,
        "braceleft" => 0x7B,
        "bar" => 0x7C,
        "braceright" => 0x7D,
        "asciitilde" => 0x7E,
        "bullet" => 0x2022,
        "endash" => 0x2013,
        "emdash" => 0x2014,
        "quoteleft" => 0x2018,
        "quoteright" => 0x2019,
        "quotedblleft" => 0x201C,
        "quotedblright" => 0x201D,
        "quotesinglbase" => 0x201A,
        "quotedblbase" => 0x201E,
        "ellipsis" => 0x2026,
        "dagger" => 0x2020,
        "daggerdbl" => 0x2021,
        "perthousand" => 0x2030,
        "trademark" => 0x2122,
        "copyright" => 0xA9,
        "registered" => 0xAE,
        "degree" => 0xB0,
        "Euro" => 0x20AC,
        "fi" => 0xFB01,
        "fl" => 0xFB02,
        "germandbls" => 0xDF,
        "eacute" => 0xE9,
        "egrave" => 0xE8,
        "aacute" => 0xE1,
        "agrave" => 0xE0,
        "adieresis" => 0xE4,
        "odieresis" => 0xF6,
        "udieresis" => 0xFC,
        "Adieresis" => 0xC4,
        "Odieresis" => 0xD6,
        "Udieresis" => 0xDC,
        "ccedilla" => 0xE7,
        "ntilde" => 0xF1,
        "nbspace" | "nonbreakingspace" => 0xA0,
        _ => return None,
    };
    char::from_u32(cp)
}
