//! The document model: an arena of indirect objects addressed by [`ObjectRef`].
//!
//! A [`Document`] owns every object of one PDF file together with the trailer, the
//! cross-reference index it was loaded from, the header version and the ordered page
//! list. References are plain ids and only resolve through the document, so cyclic
//! object graphs never need shared ownership. All traversals keep a visited set.
//!
//! # Loading
//!
//! [`Document::load`] locates the cross-reference index, validates it and falls back
//! to a linear-scan rebuild when it is unusable. An `/Encrypt` entry in the trailer is
//! rejected before any object is materialized.
//!
//! ```no_run
//! use pdfa_oxide::document::Document;
//! use pdfa_oxide::parser_config::ParserOptions;
//!
//! let bytes = std::fs::read("input.pdf")?;
//! let doc = Document::load(&bytes, &ParserOptions::default())?;
//! println!("{} pages", doc.page_count());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::error::{Error, ErrorKind, Result};
use crate::object::{Dict, Object, ObjectRef};
use crate::objstm::parse_object_stream;
use crate::parser::{parse_indirect_object_at, LengthResolver, NoLengthResolver};
use crate::parser_config::ParserOptions;
use crate::xref::{find_xref_offset, parse_xref, validate_offsets, CrossRefTable, XRefEntry};
use crate::xref_reconstruction::reconstruct_xref;
use indexmap::IndexSet;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Longest reference chain `resolve` follows before giving up.
const MAX_RESOLVE_CHAIN: usize = 32;

/// How far from the start of the file the `%PDF-` marker may appear.
const HEADER_SEARCH_WINDOW: usize = 1024;

/// Page attributes that inherit from ancestor `/Pages` nodes (ISO 32000-1, 7.7.3.4).
pub const INHERITABLE_PAGE_ATTRIBUTES: [&str; 4] = ["Resources", "MediaBox", "CropBox", "Rotate"];

/// An in-memory PDF document.
#[derive(Debug, Clone)]
pub struct Document {
    objects: BTreeMap<ObjectRef, Object>,
    trailer: Dict,
    xref: CrossRefTable,
    version: (u8, u8),
    pages: Vec<ObjectRef>,
}

impl Document {
    /// Parse `data` into a document holding every object reachable from the trailer.
    ///
    /// Unreferenced objects are never parsed, and object stream containers stay out of
    /// the arena. Use [`LazyObjectSource`] to read individual objects by number.
    ///
    /// # Errors
    ///
    /// * [`Error::ResourceLimit`] when the input exceeds `max_file_size`
    /// * [`Error::InvalidHeader`] in strict mode when `%PDF-` is not at offset 0
    /// * [`Error::UnsupportedFeature`] when the trailer names an `/Encrypt` dictionary
    /// * [`Error::UnrecoverableDocument`] when no catalog or page tree can be found
    /// * the parse errors of the index or objects, in strict mode
    pub fn load(data: &[u8], options: &ParserOptions) -> Result<Self> {
        if data.len() > options.max_file_size {
            return Err(Error::ResourceLimit {
                what: "input size",
                limit: options.max_file_size,
            });
        }

        let version = parse_header(data, options.strict)?;
        log::debug!("PDF header version {}.{}", version.0, version.1);

        let xref = load_index(data, options)?;
        let trailer = xref.trailer().cloned().unwrap_or_default();

        if trailer.contains_key("Encrypt") {
            log::error!("Document is encrypted");
            return Err(Error::UnsupportedFeature(
                "encrypted documents are not supported".to_string(),
            ));
        }

        // Only objects reachable from the trailer are materialized.
        let source = LazyObjectSource::new(data, &xref, *options);
        let mut objects = BTreeMap::new();
        let mut pending = Vec::new();
        for value in trailer.values() {
            collect_references(value, &mut pending);
        }
        let mut visited = HashSet::new();
        while let Some(next) = pending.pop() {
            if next.id == 0 || !visited.insert(next.id) {
                continue;
            }
            match source.get(next.id) {
                Ok(Some((obj_ref, object))) => {
                    collect_references(&object, &mut pending);
                    objects.insert(obj_ref, object);
                },
                Ok(None) => log::debug!("Reference {} names no indexed object", next),
                Err(e) if !options.strict && e.kind() != ErrorKind::ResourceLimit => {
                    log::warn!("Skipping unreadable object {}: {}", next.id, e);
                },
                Err(e) => return Err(e),
            }
        }
        log::info!("Loaded {} of {} indexed objects", objects.len(), xref.len());

        let mut doc = Self {
            objects,
            trailer,
            xref,
            version,
            pages: Vec::new(),
        };
        doc.adopt_catalog_version();
        doc.promote_inline_fonts();
        doc.refresh_pages(options.strict)?;
        Ok(doc)
    }

    /// Assemble a document from already-built parts.
    ///
    /// The trailer must name the catalog in `/Root`. The page list is computed here.
    pub fn from_parts(
        version: (u8, u8),
        trailer: Dict,
        objects: BTreeMap<ObjectRef, Object>,
    ) -> Result<Self> {
        let mut doc = Self {
            objects,
            trailer,
            xref: CrossRefTable::new(),
            version,
            pages: Vec::new(),
        };
        doc.refresh_pages(true)?;
        Ok(doc)
    }

    /// Header version as `(major, minor)`.
    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    /// Override the version the document claims.
    pub fn set_version(&mut self, version: (u8, u8)) {
        self.version = version;
    }

    /// The trailer dictionary.
    pub fn trailer(&self) -> &Dict {
        &self.trailer
    }

    /// Mutable access to the trailer dictionary.
    pub fn trailer_mut(&mut self) -> &mut Dict {
        &mut self.trailer
    }

    /// The cross-reference index the document was loaded from.
    ///
    /// Empty for documents built with [`Document::from_parts`].
    pub fn xref(&self) -> &CrossRefTable {
        &self.xref
    }

    /// Number of objects in the arena.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True when the arena holds no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Iterate over all objects in id order.
    pub fn objects(&self) -> impl Iterator<Item = (ObjectRef, &Object)> + '_ {
        self.objects.iter().map(|(r, o)| (*r, o))
    }

    /// Ids of all objects, in id order.
    pub fn object_refs(&self) -> Vec<ObjectRef> {
        self.objects.keys().copied().collect()
    }

    /// Object stored under `obj_ref`.
    pub fn get(&self, obj_ref: ObjectRef) -> Option<&Object> {
        self.objects.get(&obj_ref)
    }

    /// Mutable access to the object stored under `obj_ref`.
    pub fn get_mut(&mut self, obj_ref: ObjectRef) -> Option<&mut Object> {
        self.objects.get_mut(&obj_ref)
    }

    /// True when `obj_ref` is present.
    pub fn contains(&self, obj_ref: ObjectRef) -> bool {
        self.objects.contains_key(&obj_ref)
    }

    /// Store `object` under a freshly allocated id.
    pub fn insert(&mut self, object: Object) -> ObjectRef {
        let obj_ref = ObjectRef::new(self.next_id(), 0);
        self.objects.insert(obj_ref, object);
        obj_ref
    }

    /// Replace the object under `obj_ref`, returning the previous value.
    pub fn replace(&mut self, obj_ref: ObjectRef, object: Object) -> Option<Object> {
        self.objects.insert(obj_ref, object)
    }

    /// Remove the object under `obj_ref`.
    ///
    /// References to it become dangling until [`Document::prune_dangling_references`].
    pub fn remove(&mut self, obj_ref: ObjectRef) -> Option<Object> {
        self.objects.remove(&obj_ref)
    }

    fn next_id(&self) -> u32 {
        self.objects.keys().next_back().map_or(0, |r| r.id) + 1
    }

    /// Follow a reference chain to the object it ends at.
    ///
    /// Direct objects resolve to themselves. A missing target or a chain longer than
    /// the internal bound yields `None`.
    pub fn resolve<'a>(&'a self, object: &'a Object) -> Option<&'a Object> {
        let mut current = object;
        for _ in 0..MAX_RESOLVE_CHAIN {
            match current {
                Object::Reference(r) => current = self.objects.get(r)?,
                other => return Some(other),
            }
        }
        log::warn!("Reference chain longer than {} entries", MAX_RESOLVE_CHAIN);
        None
    }

    /// Resolve `object` and view it as a dictionary (streams included).
    pub fn resolve_dict<'a>(&'a self, object: &'a Object) -> Option<&'a Dict> {
        self.resolve(object)?.as_dict()
    }

    /// Look up `key` in `dict` and resolve the value.
    pub fn lookup<'a>(&'a self, dict: &'a Dict, key: &str) -> Option<&'a Object> {
        self.resolve(dict.get(key)?)
    }

    /// Reference to the document catalog.
    pub fn catalog_ref(&self) -> Option<ObjectRef> {
        self.trailer.get("Root")?.as_reference()
    }

    /// The document catalog dictionary.
    pub fn catalog(&self) -> Option<&Dict> {
        self.get(self.catalog_ref()?)?.as_dict()
    }

    /// Mutable access to the catalog dictionary.
    pub fn catalog_mut(&mut self) -> Option<&mut Dict> {
        let root = self.catalog_ref()?;
        self.get_mut(root)?.as_dict_mut()
    }

    /// The document information dictionary.
    pub fn info(&self) -> Option<&Dict> {
        self.lookup(&self.trailer, "Info")?.as_dict()
    }

    /// True when the trailer names an `/Encrypt` dictionary.
    pub fn is_encrypted(&self) -> bool {
        self.trailer.contains_key("Encrypt")
    }

    /// Page object refs in document order.
    pub fn pages(&self) -> &[ObjectRef] {
        &self.pages
    }

    /// Number of pages.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Look up `key` on `page`, walking up `/Parent` links for inheritable attributes.
    pub fn inherited_page_attribute(&self, page: ObjectRef, key: &str) -> Option<&Object> {
        let mut visited = HashSet::new();
        let mut node = page;
        while visited.insert(node) {
            let dict = self.get(node)?.as_dict()?;
            if let Some(value) = dict.get(key) {
                return self.resolve(value);
            }
            if !INHERITABLE_PAGE_ATTRIBUTES.contains(&key) {
                return None;
            }
            node = dict.get("Parent")?.as_reference()?;
        }
        None
    }

    /// Resource dictionary in effect for `page`.
    pub fn page_resources(&self, page: ObjectRef) -> Option<&Dict> {
        self.inherited_page_attribute(page, "Resources")?.as_dict()
    }

    /// Content stream refs of `page`, in drawing order.
    pub fn page_contents(&self, page: ObjectRef) -> Vec<ObjectRef> {
        let Some(contents) = self.get(page).and_then(|p| p.as_dict()).and_then(|d| d.get("Contents")) else {
            return Vec::new();
        };
        match contents {
            Object::Reference(r) => match self.get(*r) {
                Some(Object::Array(items)) => items.iter().filter_map(|o| o.as_reference()).collect(),
                Some(_) => vec![*r],
                None => Vec::new(),
            },
            Object::Array(items) => items.iter().filter_map(|o| o.as_reference()).collect(),
            _ => Vec::new(),
        }
    }

    /// Rebuild the page list from the page tree.
    ///
    /// Kids that are missing from the arena are dropped from their parent with a
    /// warning, or fail the call when `strict` is set.
    pub fn refresh_pages(&mut self, strict: bool) -> Result<()> {
        let root = self
            .catalog()
            .ok_or_else(|| Error::UnrecoverableDocument("document catalog is missing".to_string()))?
            .get("Pages")
            .and_then(|p| p.as_reference())
            .ok_or_else(|| Error::UnrecoverableDocument("catalog has no /Pages tree".to_string()))?;
        if !self.contains(root) {
            return Err(Error::UnrecoverableDocument(format!(
                "page tree root {} is missing",
                root
            )));
        }

        let mut pages = Vec::new();
        let mut missing = Vec::new();
        let mut visited = HashSet::new();
        // Depth-first, kids pushed in reverse so pages come out in order.
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if !visited.insert(node) {
                log::warn!("Page tree node {} visited twice, ignoring", node);
                continue;
            }
            let Some(dict) = self.get(node).and_then(|o| o.as_dict()) else {
                continue;
            };
            let kids = self.lookup(dict, "Kids").and_then(|k| k.as_array());
            let is_page = match dict.get("Type").and_then(|t| t.as_name()) {
                Some("Page") => true,
                Some("Pages") => false,
                _ => kids.is_none(),
            };
            if is_page {
                pages.push(node);
                continue;
            }
            for kid in kids.into_iter().flatten().rev() {
                match kid.as_reference() {
                    Some(r) if self.contains(r) => stack.push(r),
                    Some(r) => missing.push((node, r)),
                    None => log::warn!("Direct object in /Kids of {}, ignoring", node),
                }
            }
        }

        if !missing.is_empty() {
            if strict {
                let (_, kid) = missing[0];
                return Err(Error::UnrecoverableDocument(format!(
                    "page tree node {} is missing",
                    kid
                )));
            }
            for (parent, kid) in missing {
                log::warn!("Dropping missing page tree node {} from {}", kid, parent);
                if let Some(Object::Array(kids)) = self
                    .get_mut(parent)
                    .and_then(|p| p.as_dict_mut())
                    .and_then(|d| d.get_mut("Kids"))
                {
                    kids.retain(|k| k.as_reference() != Some(kid));
                }
            }
        }

        log::debug!("Page tree holds {} pages", pages.len());
        self.pages = pages;
        Ok(())
    }

    /// Every object reachable from the trailer's `/Root` and `/Info`, in discovery order.
    pub fn reachable(&self) -> IndexSet<ObjectRef> {
        let mut found: IndexSet<ObjectRef> = IndexSet::new();
        let mut queue = std::collections::VecDeque::new();
        for key in ["Root", "Info"] {
            if let Some(Object::Reference(r)) = self.trailer.get(key) {
                queue.push_back(*r);
            }
        }

        let mut refs = Vec::new();
        while let Some(obj_ref) = queue.pop_front() {
            let Some(object) = self.objects.get(&obj_ref) else {
                continue;
            };
            if !found.insert(obj_ref) {
                continue;
            }
            refs.clear();
            collect_references(object, &mut refs);
            queue.extend(refs.iter().copied().filter(|r| !found.contains(r)));
        }
        found
    }

    /// Call `visitor` once for every reachable object, in discovery order.
    pub fn visit_all<F>(&self, mut visitor: F)
    where
        F: FnMut(ObjectRef, &Object),
    {
        for obj_ref in self.reachable() {
            if let Some(object) = self.objects.get(&obj_ref) {
                visitor(obj_ref, object);
            }
        }
    }

    /// Replace references to missing objects with `null`.
    ///
    /// Dictionary entries whose value becomes `null` are removed, since a null value
    /// and an absent key mean the same thing. Returns how many references were pruned.
    pub fn prune_dangling_references(&mut self) -> usize {
        let live: HashSet<ObjectRef> = self.objects.keys().copied().collect();
        let mut pruned = 0;
        for object in self.objects.values_mut() {
            pruned += prune_object(object, &live);
        }
        for value in self.trailer.values_mut() {
            pruned += prune_object(value, &live);
        }
        self.trailer.retain(|_, v| !v.is_null());
        if pruned > 0 {
            log::warn!("Pruned {} dangling references", pruned);
        }
        pruned
    }

    /// All font dictionaries used by reachable resource dictionaries.
    ///
    /// Covers page and form XObject resources, annotation appearances, Type3 glyph
    /// resources and the descendants of composite fonts.
    pub fn fonts(&self) -> IndexSet<ObjectRef> {
        let mut fonts = IndexSet::new();
        for obj_ref in self.reachable() {
            let Some(dict) = self.get(obj_ref).and_then(|o| o.as_dict()) else {
                continue;
            };
            if dict.get("Type").and_then(|t| t.as_name()) == Some("Font") {
                fonts.insert(obj_ref);
            }
            let font_maps = [
                self.lookup(dict, "Font"),
                self.lookup(dict, "Resources")
                    .and_then(|r| r.as_dict())
                    .and_then(|r| self.lookup(r, "Font")),
            ];
            for font_map in font_maps.into_iter().flatten().filter_map(|m| m.as_dict()) {
                let mut names: Vec<&String> = font_map.keys().collect();
                names.sort();
                for name in names {
                    if let Some(r) = font_map.get(name).and_then(|f| f.as_reference()) {
                        if self.contains(r) {
                            fonts.insert(r);
                        }
                    }
                }
            }
        }

        let composite: Vec<ObjectRef> = fonts.iter().copied().collect();
        for font in composite {
            let descendants = self
                .get(font)
                .and_then(|f| f.as_dict())
                .and_then(|d| self.lookup(d, "DescendantFonts"))
                .and_then(|d| d.as_array());
            for descendant in descendants.into_iter().flatten() {
                if let Some(r) = descendant.as_reference() {
                    fonts.insert(r);
                }
            }
        }
        fonts
    }

    /// Page content streams and form XObjects, each once.
    pub fn content_streams(&self) -> IndexSet<ObjectRef> {
        let mut streams: IndexSet<ObjectRef> = self
            .pages
            .iter()
            .flat_map(|p| self.page_contents(*p))
            .collect();
        for obj_ref in self.reachable() {
            if let Some(Object::Stream { dict, .. }) = self.get(obj_ref) {
                if dict.get("Subtype").and_then(|s| s.as_name()) == Some("Form") {
                    streams.insert(obj_ref);
                }
            }
        }
        streams
    }

    /// Move font dictionaries written inline in a `/Font` resource map into their
    /// own indirect objects, so every font can be addressed by id.
    pub fn promote_inline_fonts(&mut self) -> usize {
        let mut next = self.next_id();
        let mut promoted = Vec::new();
        for object in self.objects.values_mut() {
            let Some(dict) = object.as_dict_mut() else {
                continue;
            };
            if let Some(Object::Dictionary(fonts)) = dict.get_mut("Font") {
                promote_fonts_in(fonts, &mut next, &mut promoted);
            }
            if let Some(Object::Dictionary(resources)) = dict.get_mut("Resources") {
                if let Some(Object::Dictionary(fonts)) = resources.get_mut("Font") {
                    promote_fonts_in(fonts, &mut next, &mut promoted);
                }
            }
        }
        let count = promoted.len();
        if count > 0 {
            log::debug!("Promoted {} inline font dictionaries", count);
        }
        self.objects.extend(promoted);
        count
    }

    fn adopt_catalog_version(&mut self) {
        let Some(version) = self
            .catalog()
            .and_then(|c| c.get("Version"))
            .and_then(|v| v.as_name())
            .and_then(|v| parse_version(v.as_bytes()))
        else {
            return;
        };
        if version > self.version {
            log::debug!("Catalog /Version {}.{} overrides header", version.0, version.1);
            self.version = version;
        }
    }
}

fn promote_fonts_in(fonts: &mut Dict, next: &mut u32, promoted: &mut Vec<(ObjectRef, Object)>) {
    let mut names: Vec<String> = fonts
        .iter()
        .filter(|(_, v)| matches!(v, Object::Dictionary(_)))
        .map(|(k, _)| k.clone())
        .collect();
    names.sort();
    for name in names {
        let obj_ref = ObjectRef::new(*next, 0);
        *next += 1;
        if let Some(font) = fonts.insert(name, Object::Reference(obj_ref)) {
            promoted.push((obj_ref, font));
        }
    }
}

/// Append every reference inside `object` to `out`.
///
/// Dictionary keys are visited in sorted order so discovery order is deterministic.
pub(crate) fn collect_references(object: &Object, out: &mut Vec<ObjectRef>) {
    let mut stack = vec![object];
    while let Some(current) = stack.pop() {
        match current {
            Object::Reference(r) => out.push(*r),
            Object::Array(items) => stack.extend(items.iter().rev()),
            Object::Dictionary(dict) | Object::Stream { dict, .. } => {
                let mut keys: Vec<&String> = dict.keys().collect();
                keys.sort();
                stack.extend(keys.into_iter().rev().filter_map(|k| dict.get(k)));
            },
            _ => {},
        }
    }
}

fn prune_object(object: &mut Object, live: &HashSet<ObjectRef>) -> usize {
    match object {
        Object::Reference(r) if !live.contains(r) => {
            *object = Object::Null;
            1
        },
        Object::Array(items) => items.iter_mut().map(|o| prune_object(o, live)).sum(),
        Object::Dictionary(dict) | Object::Stream { dict, .. } => {
            let pruned = dict.values_mut().map(|o| prune_object(o, live)).sum();
            dict.retain(|_, v| !v.is_null());
            pruned
        },
        _ => 0,
    }
}

/// Find `%PDF-M.m` and return the version.
///
/// Lenient mode accepts junk before the marker and falls back to 1.4 when the marker
/// is absent, leaving the decision to the index and repair stages.
pub fn parse_header(data: &[u8], strict: bool) -> Result<(u8, u8)> {
    let window = &data[..data.len().min(HEADER_SEARCH_WINDOW)];
    let marker = b"%PDF-";
    let pos = window.windows(marker.len()).position(|w| w == marker);

    match pos {
        Some(0) => {},
        Some(p) if !strict => log::warn!("{} bytes of junk before the PDF header", p),
        Some(p) => {
            return Err(Error::InvalidHeader(format!("header found at offset {}, expected 0", p)));
        },
        None if !strict => {
            log::warn!("No %PDF- header, assuming version 1.4");
            return Ok((1, 4));
        },
        None => return Err(Error::InvalidHeader("missing %PDF- marker".to_string())),
    }

    let start = pos.unwrap_or(0) + marker.len();
    match data.get(start..).and_then(parse_version) {
        Some(version) => Ok(version),
        None if !strict => {
            log::warn!("Unreadable header version, assuming 1.4");
            Ok((1, 4))
        },
        None => Err(Error::InvalidHeader("unreadable version number".to_string())),
    }
}

fn parse_version(bytes: &[u8]) -> Option<(u8, u8)> {
    match bytes {
        [major, b'.', minor, ..] if major.is_ascii_digit() && minor.is_ascii_digit() => {
            let version = (major - b'0', minor - b'0');
            (version.0 >= 1 && version <= (2, 0)).then_some(version)
        },
        _ => None,
    }
}

/// Build the cross-reference index, repairing it when it cannot be trusted.
fn load_index(data: &[u8], options: &ParserOptions) -> Result<CrossRefTable> {
    let regular = find_xref_offset(data)
        .and_then(|offset| parse_xref(data, offset, options))
        .and_then(|table| {
            validate_offsets(data, &table)?;
            let has_root = table
                .trailer()
                .and_then(|t| t.get("Root"))
                .and_then(|r| r.as_reference())
                .is_some();
            if has_root {
                Ok(table)
            } else {
                Err(Error::InvalidXRef("trailer has no /Root".to_string()))
            }
        });

    match regular {
        Ok(table) => {
            log::debug!("Using cross-reference index with {} entries", table.len());
            Ok(table)
        },
        Err(e @ (Error::InvalidXRef(_) | Error::MalformedSyntax { .. })) if !options.strict => {
            log::warn!("Cross-reference index unusable ({}), rebuilding", e);
            reconstruct_xref(data, options)
        },
        Err(e) => {
            log::error!("Cross-reference index unusable: {}", e);
            Err(e)
        },
    }
}

/// On-demand access to the objects of a file through its cross-reference index.
///
/// Object streams are decoded at most once and cached.
pub struct LazyObjectSource<'a> {
    data: &'a [u8],
    xref: &'a CrossRefTable,
    options: ParserOptions,
    object_streams: RefCell<HashMap<u32, HashMap<u32, Object>>>,
}

impl<'a> LazyObjectSource<'a> {
    /// Source over `data` indexed by `xref`.
    pub fn new(data: &'a [u8], xref: &'a CrossRefTable, options: ParserOptions) -> Self {
        Self {
            data,
            xref,
            options,
            object_streams: RefCell::new(HashMap::new()),
        }
    }

    /// Materialize object `number`.
    ///
    /// Returns `Ok(None)` for free or unlisted numbers.
    pub fn get(&self, number: u32) -> Result<Option<(ObjectRef, Object)>> {
        match self.xref.get(number) {
            Some(XRefEntry::InUse { offset, gen }) => {
                let (parsed_ref, object) =
                    parse_indirect_object_at(self.data, *offset, self.options, self)?;
                if parsed_ref.id != number {
                    return Err(Error::InvalidXRef(format!(
                        "offset {} holds object {}, expected {}",
                        offset, parsed_ref.id, number
                    )));
                }
                Ok(Some((ObjectRef::new(number, *gen), object)))
            },
            Some(XRefEntry::Compressed { stream, .. }) => {
                let object = self.compressed(*stream, number)?;
                Ok(object.map(|o| (ObjectRef::new(number, 0), o)))
            },
            _ => Ok(None),
        }
    }

    fn compressed(&self, stream_id: u32, number: u32) -> Result<Option<Object>> {
        if let Some(members) = self.object_streams.borrow().get(&stream_id) {
            return Ok(members.get(&number).cloned());
        }

        let container = match self.xref.get(stream_id) {
            Some(XRefEntry::InUse { offset, .. }) => {
                parse_indirect_object_at(self.data, *offset, self.options, self)?.1
            },
            _ => {
                return Err(Error::InvalidXRef(format!(
                    "object stream {} is not an uncompressed object",
                    stream_id
                )));
            },
        };
        let members: HashMap<u32, Object> =
            parse_object_stream(&container, &self.options)?.into_iter().collect();
        let object = members.get(&number).cloned();
        self.object_streams.borrow_mut().insert(stream_id, members);
        Ok(object)
    }
}

impl LengthResolver for LazyObjectSource<'_> {
    fn resolve_length(&self, length_ref: ObjectRef) -> Option<i64> {
        match self.xref.get(length_ref.id)? {
            XRefEntry::InUse { offset, .. } => {
                parse_indirect_object_at(self.data, *offset, self.options, &NoLengthResolver)
                    .ok()?
                    .1
                    .as_integer()
            },
            XRefEntry::Compressed { stream, .. } => {
                self.compressed(*stream, length_ref.id).ok()??.as_integer()
            },
            XRefEntry::Free { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoders::flate_encode;

    /// Assemble a file with a correct classic xref table from object bodies.
    fn build_pdf(bodies: &[&str], trailer_extra: &str) -> Vec<u8> {
        let mut out = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::new();
        for (i, body) in bodies.iter().enumerate() {
            offsets.push(out.len());
            out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
        }
        let xref_at = out.len();
        out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", bodies.len() + 1).as_bytes());
        for offset in offsets {
            out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        out.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R {} >>\nstartxref\n{}\n%%EOF\n",
                bodies.len() + 1,
                trailer_extra,
                xref_at
            )
            .as_bytes(),
        );
        out
    }

    fn two_page_pdf() -> Vec<u8> {
        build_pdf(
            &[
                "<< /Type /Catalog /Pages 2 0 R >>",
                "<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 /MediaBox [0 0 612 792] /Resources << /Font << /F1 5 0 R >> >> >>",
                "<< /Type /Page /Parent 2 0 R /Contents 6 0 R >>",
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 100 100] >>",
                "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>",
                "<< /Length 8 >>\nstream\nBT ET q Q\nendstream",
            ],
            "",
        )
    }

    #[test]
    fn test_load_and_pages() {
        let doc = Document::load(&two_page_pdf(), &ParserOptions::default()).unwrap();
        assert_eq!(doc.version(), (1, 4));
        assert_eq!(doc.len(), 6);
        assert_eq!(doc.pages(), &[ObjectRef::new(3, 0), ObjectRef::new(4, 0)]);
        assert_eq!(doc.page_count(), 2);
        assert!(doc.catalog().unwrap().contains_key("Pages"));
    }

    #[test]
    fn test_inherited_attributes() {
        let doc = Document::load(&two_page_pdf(), &ParserOptions::default()).unwrap();
        let first = ObjectRef::new(3, 0);
        let second = ObjectRef::new(4, 0);
        let media = doc.inherited_page_attribute(first, "MediaBox").unwrap();
        assert_eq!(media.as_array().unwrap()[2], Object::Integer(612));
        let own = doc.inherited_page_attribute(second, "MediaBox").unwrap();
        assert_eq!(own.as_array().unwrap()[2], Object::Integer(100));
        assert!(doc.page_resources(first).is_some());
        // Non-inheritable keys do not walk up.
        assert!(doc.inherited_page_attribute(first, "Count").is_none());
    }

    #[test]
    fn test_page_contents_and_fonts() {
        let doc = Document::load(&two_page_pdf(), &ParserOptions::default()).unwrap();
        assert_eq!(doc.page_contents(ObjectRef::new(3, 0)), vec![ObjectRef::new(6, 0)]);
        assert!(doc.page_contents(ObjectRef::new(4, 0)).is_empty());
        let fonts = doc.fonts();
        assert_eq!(fonts.len(), 1);
        assert!(fonts.contains(&ObjectRef::new(5, 0)));
        assert!(doc.content_streams().contains(&ObjectRef::new(6, 0)));
    }

    #[test]
    fn test_inline_fonts_promoted() {
        let data = build_pdf(
            &[
                "<< /Type /Catalog /Pages 2 0 R >>",
                "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
                "<< /Type /Page /Parent 2 0 R /Resources << /Font << /F1 << /Type /Font /Subtype /Type1 /BaseFont /Courier >> >> >> >>",
            ],
            "",
        );
        let doc = Document::load(&data, &ParserOptions::default()).unwrap();
        let fonts = doc.fonts();
        assert_eq!(fonts.len(), 1);
        let font = doc.get(fonts[0]).unwrap();
        assert_eq!(
            font.as_dict().unwrap().get("BaseFont").and_then(|b| b.as_name()),
            Some("Courier")
        );
    }

    #[test]
    fn test_visit_all_skips_unreachable_and_cycles() {
        let data = build_pdf(
            &[
                "<< /Type /Catalog /Pages 2 0 R /Loop 4 0 R >>",
                "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
                "<< /Type /Page /Parent 2 0 R >>",
                "<< /Back 1 0 R /Self 4 0 R >>",
                "(orphan)",
            ],
            "",
        );
        let doc = Document::load(&data, &ParserOptions::default()).unwrap();
        let mut seen = Vec::new();
        doc.visit_all(|r, _| seen.push(r.id));
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[0], 1);
        assert!(!seen.contains(&5));
        let unique: HashSet<u32> = seen.iter().copied().collect();
        assert_eq!(unique.len(), seen.len());
    }

    #[test]
    fn test_resolve_bounded() {
        let data = build_pdf(
            &[
                "<< /Type /Catalog /Pages 2 0 R >>",
                "<< /Type /Pages /Kids [] /Count 0 >>",
                "4 0 R",
                "3 0 R",
            ],
            "",
        );
        let doc = Document::load(&data, &ParserOptions::default()).unwrap();
        assert!(doc.resolve(&Object::Reference(ObjectRef::new(3, 0))).is_none());
        assert!(doc.resolve(&Object::Reference(ObjectRef::new(9, 0))).is_none());
        assert_eq!(doc.resolve(&Object::Integer(1)), Some(&Object::Integer(1)));
        assert!(doc.resolve_dict(&Object::Reference(ObjectRef::new(2, 0))).is_some());
    }

    #[test]
    fn test_insert_replace_remove_prune() {
        let mut doc = Document::load(&two_page_pdf(), &ParserOptions::default()).unwrap();
        let new_ref = doc.insert(Object::Integer(42));
        assert_eq!(new_ref, ObjectRef::new(7, 0));
        assert_eq!(doc.replace(new_ref, Object::Integer(43)), Some(Object::Integer(42)));

        doc.remove(ObjectRef::new(5, 0));
        let pruned = doc.prune_dangling_references();
        assert_eq!(pruned, 1);
        let fonts = doc
            .get(ObjectRef::new(2, 0))
            .and_then(|o| o.as_dict())
            .and_then(|d| d.get("Resources"))
            .and_then(|r| r.as_dict())
            .and_then(|r| r.get("Font"))
            .and_then(|f| f.as_dict())
            .unwrap();
        assert!(!fonts.contains_key("F1"));
        assert_eq!(doc.prune_dangling_references(), 0);
    }

    #[test]
    fn test_encrypted_rejected() {
        let data = build_pdf(
            &[
                "<< /Type /Catalog /Pages 2 0 R >>",
                "<< /Type /Pages /Kids [] /Count 0 >>",
                "<< /Filter /Standard /V 1 /R 2 >>",
            ],
            "/Encrypt 3 0 R",
        );
        let err = Document::load(&data, &ParserOptions::default()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFeature(_)));
    }

    #[test]
    fn test_broken_xref_repaired() {
        let mut data = two_page_pdf();
        let pos = data.windows(9).rposition(|w| w == b"startxref").unwrap();
        data.truncate(pos);
        data.extend_from_slice(b"startxref\n99999\n%%EOF\n");
        let doc = Document::load(&data, &ParserOptions::default()).unwrap();
        assert_eq!(doc.page_count(), 2);

        assert!(Document::load(&data, &ParserOptions::strict()).is_err());
    }

    #[test]
    fn test_missing_kid_dropped_in_lenient_mode() {
        let data = build_pdf(
            &[
                "<< /Type /Catalog /Pages 2 0 R >>",
                "<< /Type /Pages /Kids [3 0 R 9 0 R] /Count 2 >>",
                "<< /Type /Page /Parent 2 0 R >>",
            ],
            "",
        );
        let doc = Document::load(&data, &ParserOptions::default()).unwrap();
        assert_eq!(doc.page_count(), 1);
        assert!(matches!(
            Document::load(&data, &ParserOptions::strict()),
            Err(Error::UnrecoverableDocument(_))
        ));
    }

    #[test]
    fn test_page_tree_cycle() {
        let data = build_pdf(
            &[
                "<< /Type /Catalog /Pages 2 0 R >>",
                "<< /Type /Pages /Kids [3 0 R 2 0 R] /Count 1 >>",
                "<< /Type /Page /Parent 2 0 R >>",
            ],
            "",
        );
        let doc = Document::load(&data, &ParserOptions::default()).unwrap();
        assert_eq!(doc.page_count(), 1);
    }

    #[test]
    fn test_indirect_length_and_object_stream() {
        let members = b"3 0 << /Type /Pages /Kids [] /Count 0 >>";
        let packed = flate_encode(members).unwrap();
        let mut out = b"%PDF-1.5\n".to_vec();
        let off1 = out.len();
        out.extend_from_slice(b"1 0 obj\n<< /Type /Catalog /Pages 3 0 R >>\nendobj\n");
        let off2 = out.len();
        out.extend_from_slice(
            b"2 0 obj\n<< /Type /ObjStm /N 1 /First 4 /Filter /FlateDecode /Length 4 0 R >>\nstream\n",
        );
        out.extend_from_slice(&packed);
        out.extend_from_slice(b"\nendstream\nendobj\n");
        let off4 = out.len();
        out.extend_from_slice(format!("4 0 obj\n{}\nendobj\n", packed.len()).as_bytes());

        let mut xref = CrossRefTable::new();
        xref.add_entry(1, XRefEntry::InUse { offset: off1, gen: 0 });
        xref.add_entry(2, XRefEntry::InUse { offset: off2, gen: 0 });
        xref.add_entry(3, XRefEntry::Compressed { stream: 2, index: 0 });
        xref.add_entry(4, XRefEntry::InUse { offset: off4, gen: 0 });

        let source = LazyObjectSource::new(&out, &xref, ParserOptions::default());
        let (r, pages) = source.get(3).unwrap().unwrap();
        assert_eq!(r, ObjectRef::new(3, 0));
        assert!(pages.has_type("Pages"));
        assert_eq!(source.resolve_length(ObjectRef::new(4, 0)), Some(packed.len() as i64));
        assert!(source.get(8).unwrap().is_none());
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(parse_header(b"%PDF-1.7\n", true).unwrap(), (1, 7));
        assert_eq!(parse_header(b"junk%PDF-2.0\n", false).unwrap(), (2, 0));
        assert!(parse_header(b"junk%PDF-1.4\n", true).is_err());
        assert!(parse_header(b"hello", true).is_err());
        assert_eq!(parse_header(b"hello", false).unwrap(), (1, 4));
    }

    #[test]
    fn test_file_size_limit() {
        let opts = ParserOptions::default().with_max_file_size(10);
        assert!(matches!(
            Document::load(&two_page_pdf(), &opts),
            Err(Error::ResourceLimit { .. })
        ));
    }

    #[test]
    fn test_catalog_version_overrides_header() {
        let data = build_pdf(
            &[
                "<< /Type /Catalog /Pages 2 0 R /Version /1.6 >>",
                "<< /Type /Pages /Kids [] /Count 0 >>",
            ],
            "",
        );
        let doc = Document::load(&data, &ParserOptions::default()).unwrap();
        assert_eq!(doc.version(), (1, 6));
    }
}
