//! Individual PDF/A checks.
//!
//! Each check inspects the document and returns the violations it finds. Checks never
//! mutate; the matching repairs live in [`super::fixes`].

use super::pipeline::RuleContext;
use super::types::{Violation, ViolationCode};
use crate::content::{parse_content_stream, Operation};
use crate::document::Document;
use crate::embedder::attachments::{embedded_file_specs, embedded_stream};
use crate::embedder::fonts::{base_font_name, is_embedded, needs_program};
use crate::embedder::icc::{find_output_intent, ColorModel, InstalledIntent};
use crate::embedder::xmp::{find_info_mismatches, XmpMetadata};
use crate::object::{Dict, Object, ObjectRef};
use bitflags::bitflags;
use std::collections::HashSet;

bitflags! {
    /// Annotation flags.
    ///
    /// Per PDF spec Table 165 (Annotation flags). Only the bits PDF/A constrains are named.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AnnotationFlags: u32 {
        /// Bit 1: hide the annotation when no handler is available
        const INVISIBLE = 1 << 0;
        /// Bit 2: never display or print
        const HIDDEN = 1 << 1;
        /// Bit 3: print the annotation
        const PRINT = 1 << 2;
        /// Bit 6: do not display on screen
        const NO_VIEW = 1 << 5;
    }
}

impl AnnotationFlags {
    /// The `/F` entry of `annot`, unknown bits retained.
    pub fn of(annot: &Dict) -> Self {
        let bits = annot.get("F").and_then(|f| f.as_integer()).unwrap_or(0);
        Self::from_bits_retain(bits as u32)
    }

    /// Print set; Hidden, Invisible and NoView clear.
    pub fn is_archival(self) -> bool {
        self.contains(Self::PRINT) && !self.intersects(Self::HIDDEN | Self::INVISIBLE | Self::NO_VIEW)
    }

    /// These flags with the archival requirements applied.
    pub fn archival(self) -> Self {
        (self | Self::PRINT) - (Self::HIDDEN | Self::INVISIBLE | Self::NO_VIEW)
    }
}

/// Named actions PDF/A permits.
const ALLOWED_NAMED_ACTIONS: [&str; 4] = ["NextPage", "PrevPage", "FirstPage", "LastPage"];

/// Every dictionary in a reachable object, nested ones and stream dictionaries
/// included, paired with the indirect object it lives in.
pub(crate) fn nested_dicts(doc: &Document) -> Vec<(ObjectRef, &Dict)> {
    let mut out = Vec::new();
    for r in doc.reachable() {
        if let Some(obj) = doc.get(r) {
            collect_dicts(obj, r, &mut out);
        }
    }
    out
}

fn collect_dicts<'a>(obj: &'a Object, owner: ObjectRef, out: &mut Vec<(ObjectRef, &'a Dict)>) {
    match obj {
        Object::Dictionary(d) | Object::Stream { dict: d, .. } => {
            out.push((owner, d));
            let mut keys: Vec<&String> = d.keys().collect();
            keys.sort();
            for key in keys {
                if let Some(v) = d.get(key) {
                    collect_dicts(v, owner, out);
                }
            }
        },
        Object::Array(items) => {
            for item in items {
                collect_dicts(item, owner, out);
            }
        },
        _ => {},
    }
}

/// Reachable streams with their refs.
pub(crate) fn reachable_streams(doc: &Document) -> Vec<(ObjectRef, &Object)> {
    doc.reachable()
        .into_iter()
        .filter_map(|r| doc.get(r).filter(|o| o.is_stream()).map(|o| (r, o)))
        .collect()
}

/// One entry of a resource category map such as `/ExtGState` or `/XObject`.
#[derive(Debug, Clone)]
pub(crate) struct ResourceEntry<'a> {
    /// The indirect object the entry's value lives in.
    pub owner: ObjectRef,
    /// The entry's own ref when it is an indirect object.
    pub indirect: Option<ObjectRef>,
    /// The category map's ref when the map is an indirect object.
    pub map: Option<ObjectRef>,
    /// The resolved value.
    pub value: &'a Object,
}

/// Resolved entries of every `/<category>` resource map in the document.
pub(crate) fn resource_entries<'a>(doc: &'a Document, category: &str) -> Vec<ResourceEntry<'a>> {
    let mut out = Vec::new();
    let mut seen_indirect = HashSet::new();
    let mut seen_maps = HashSet::new();
    for (owner, dict) in nested_dicts(doc) {
        let (map_owner, map_ref, map) = match dict.get(category) {
            Some(Object::Reference(r)) => {
                if !seen_maps.insert(*r) {
                    continue;
                }
                match doc.get(*r).and_then(|m| m.as_dict()) {
                    Some(m) => (*r, Some(*r), m),
                    None => continue,
                }
            },
            Some(Object::Dictionary(m)) => (owner, None, m),
            _ => continue,
        };
        let mut names: Vec<&String> = map.keys().collect();
        names.sort();
        for name in names {
            let Some(value) = map.get(name) else { continue };
            match value {
                Object::Reference(r) => {
                    if !seen_indirect.insert(*r) {
                        continue;
                    }
                    if let Some(v) = doc.get(*r) {
                        out.push(ResourceEntry {
                            owner: *r,
                            indirect: Some(*r),
                            map: map_ref,
                            value: v,
                        });
                    }
                },
                other => out.push(ResourceEntry {
                    owner: map_owner,
                    indirect: None,
                    map: map_ref,
                    value: other,
                }),
            }
        }
    }
    out
}

fn subtype(dict: &Dict) -> Option<&str> {
    dict.get("Subtype").and_then(|s| s.as_name())
}

/// Encryption dictionary (ISO 19005-1, 6.1.3).
pub fn check_encryption(doc: &Document, _ctx: &RuleContext<'_>) -> Vec<Violation> {
    if doc.is_encrypted() {
        vec![Violation::new(
            ViolationCode::EncryptionNotAllowed,
            "Document is encrypted; encryption is not allowed in PDF/A",
        )
        .with_location("trailer")
        .with_clause("6.1.3")]
    } else {
        Vec::new()
    }
}

/// Trailer file identifier and header version.
pub fn check_file_structure(doc: &Document, ctx: &RuleContext<'_>) -> Vec<Violation> {
    let mut out = Vec::new();
    let id_ok = doc
        .trailer()
        .get("ID")
        .and_then(|id| id.as_array())
        .is_some_and(|id| id.len() == 2 && id.iter().all(|e| e.as_string().is_some()));
    if !id_ok {
        out.push(
            Violation::new(ViolationCode::MissingFileIdentifier, "Trailer has no file identifier")
                .with_location("trailer")
                .with_clause("6.1.3"),
        );
    }
    let limit = ctx.standard.pdf_version();
    if doc.version() > limit {
        out.push(
            Violation::new(
                ViolationCode::VersionMismatch,
                format!(
                    "PDF version {}.{} exceeds {}.{} allowed by {}",
                    doc.version().0,
                    doc.version().1,
                    limit.0,
                    limit.1,
                    ctx.standard
                ),
            )
            .with_location("header"),
        );
    }
    out
}

/// Streams whose data lives in an external file (ISO 19005-1, 6.1.7).
pub fn check_external_streams(doc: &Document, _ctx: &RuleContext<'_>) -> Vec<Violation> {
    reachable_streams(doc)
        .into_iter()
        .filter(|(_, s)| {
            s.as_dict()
                .is_some_and(|d| ["F", "FFilter", "FDecodeParms"].iter().any(|k| d.contains_key(*k)))
        })
        .map(|(r, _)| {
            Violation::new(
                ViolationCode::ExternalStreamNotAllowed,
                "Stream data refers to an external file",
            )
            .with_target(r)
            .with_clause("6.1.7")
        })
        .collect()
}

/// PostScript XObjects (ISO 19005-1, 6.2.7).
pub fn check_postscript(doc: &Document, _ctx: &RuleContext<'_>) -> Vec<Violation> {
    reachable_streams(doc)
        .into_iter()
        .filter(|(_, s)| {
            s.as_dict().is_some_and(|d| {
                subtype(d) == Some("PS") || d.get("Subtype2").and_then(|s| s.as_name()) == Some("PS")
            })
        })
        .map(|(r, _)| {
            Violation::new(ViolationCode::PostScriptNotAllowed, "PostScript XObject")
                .with_target(r)
                .with_clause("6.2.7")
        })
        .collect()
}

/// Reference XObjects, OPI, image alternates and interpolation.
pub fn check_xobjects(doc: &Document, _ctx: &RuleContext<'_>) -> Vec<Violation> {
    let mut out = Vec::new();
    for (r, stream) in reachable_streams(doc) {
        let Some(d) = stream.as_dict() else { continue };
        match subtype(d) {
            Some("Form") => {
                if d.contains_key("Ref") {
                    out.push(
                        Violation::new(ViolationCode::ReferenceXObjectNotAllowed, "Reference XObject")
                            .with_target(r)
                            .with_clause("6.2.6"),
                    );
                }
                if d.contains_key("OPI") {
                    out.push(
                        Violation::new(ViolationCode::InvalidImage, "Form XObject with OPI")
                            .with_target(r)
                            .with_clause("6.2.6"),
                    );
                }
            },
            Some("Image") => {
                let interpolate = d.get("Interpolate").and_then(|i| i.as_bool()) == Some(true);
                if d.contains_key("Alternates") || d.contains_key("OPI") || interpolate {
                    out.push(
                        Violation::new(
                            ViolationCode::InvalidImage,
                            "Image with alternates, OPI or interpolation",
                        )
                        .with_target(r)
                        .with_clause("6.2.4"),
                    );
                }
            },
            _ => {},
        }
    }
    out
}

/// Name of the action type if `action` is forbidden for `part`.
pub(crate) fn forbidden_action(action: &Dict, part: u8) -> Option<String> {
    let kind = action.get("S")?.as_name()?;
    let forbidden = match kind {
        "Launch" | "JavaScript" | "Sound" | "Movie" | "ResetForm" | "ImportData" => true,
        "Hide" | "SetOCGState" | "Rendition" | "Trans" | "GoTo3DView" => part == 1,
        "Named" => {
            let name = action.get("N").and_then(|n| n.as_name()).unwrap_or("");
            !ALLOWED_NAMED_ACTIONS.contains(&name)
        },
        _ => false,
    };
    forbidden.then(|| kind.to_string())
}

/// Forbidden action types (ISO 19005-1, 6.6.1).
pub fn check_actions(doc: &Document, ctx: &RuleContext<'_>) -> Vec<Violation> {
    let part = ctx.standard.part();
    let mut out = Vec::new();
    for (owner, dict) in nested_dicts(doc) {
        for key in ["A", "OpenAction", "Next"] {
            let Some(value) = dict.get(key).and_then(|v| doc.resolve(v)) else {
                continue;
            };
            let actions: Vec<&Dict> = match value {
                Object::Array(items) => items.iter().filter_map(|i| doc.resolve_dict(i)).collect(),
                other => other.as_dict().into_iter().collect(),
            };
            for kind in actions.into_iter().filter_map(|a| forbidden_action(a, part)) {
                out.push(
                    Violation::new(ViolationCode::ForbiddenAction, format!("{} action", kind))
                        .with_target(owner)
                        .with_clause("6.6.1"),
                );
            }
        }
        if dict.contains_key("AA") {
            out.push(
                Violation::new(
                    ViolationCode::AdditionalActionsNotAllowed,
                    "Additional-actions dictionary",
                )
                .with_target(owner)
                .with_clause("6.6.2"),
            );
        }
    }
    let js = doc
        .catalog()
        .and_then(|c| doc.lookup(c, "Names"))
        .and_then(|n| n.as_dict())
        .is_some_and(|n| n.contains_key("JavaScript"));
    if js {
        out.push(
            Violation::new(ViolationCode::JavaScriptNotAllowed, "Document-level JavaScript")
                .with_location("catalog /Names")
                .with_clause("6.6.1"),
        );
    }
    out
}

/// Interactive form requirements (ISO 19005-1, 6.9).
pub fn check_forms(doc: &Document, _ctx: &RuleContext<'_>) -> Vec<Violation> {
    let Some(form) = doc
        .catalog()
        .and_then(|c| doc.lookup(c, "AcroForm"))
        .and_then(|f| f.as_dict())
    else {
        return Vec::new();
    };
    let mut out = Vec::new();
    if form.get("NeedAppearances").and_then(|n| n.as_bool()) == Some(true) {
        out.push(
            Violation::new(ViolationCode::InvalidInteractiveForm, "NeedAppearances is true")
                .with_location("AcroForm")
                .with_clause("6.9"),
        );
    }
    if form.contains_key("XFA") {
        out.push(
            Violation::new(ViolationCode::InvalidInteractiveForm, "XFA form data")
                .with_location("AcroForm")
                .with_clause("6.9"),
        );
    }
    out
}

/// Annotation subtypes PDF/A forbids for `part`.
pub(crate) fn forbidden_annotation(subtype: &str, part: u8) -> bool {
    match subtype {
        "Sound" | "Movie" | "Screen" | "3D" | "RichMedia" | "TrapNet" => true,
        "FileAttachment" => part < 3,
        _ => false,
    }
}

/// True when the annotation needs a normal appearance stream (PDF/A-2 and later).
pub(crate) fn needs_appearance(annot: &Dict) -> bool {
    if matches!(subtype(annot), Some("Popup") | Some("Link")) {
        return false;
    }
    let rect: Vec<f64> = annot
        .get("Rect")
        .and_then(|r| r.as_array())
        .map(|r| r.iter().filter_map(|v| v.as_number()).collect())
        .unwrap_or_default();
    if rect.len() == 4 && ((rect[2] - rect[0]).abs() < f64::EPSILON || (rect[3] - rect[1]).abs() < f64::EPSILON) {
        return false;
    }
    true
}

/// Annotations of `page`: `(own ref if indirect, dictionary)`.
pub(crate) fn page_annotations(doc: &Document, page: ObjectRef) -> Vec<(Option<ObjectRef>, &Dict)> {
    let Some(annots) = doc
        .get(page)
        .and_then(|p| p.as_dict())
        .and_then(|p| doc.lookup(p, "Annots"))
        .and_then(|a| a.as_array())
    else {
        return Vec::new();
    };
    annots
        .iter()
        .filter_map(|a| match a {
            Object::Reference(r) => doc.get(*r).and_then(|o| o.as_dict()).map(|d| (Some(*r), d)),
            Object::Dictionary(d) => Some((None, d)),
            _ => None,
        })
        .collect()
}

/// Annotation types, flags, opacity and appearances (ISO 19005-1, 6.5).
pub fn check_annotations(doc: &Document, ctx: &RuleContext<'_>) -> Vec<Violation> {
    let part = ctx.standard.part();
    let mut out = Vec::new();
    for (index, page) in doc.pages().iter().enumerate() {
        for (annot_ref, annot) in page_annotations(doc, *page) {
            let target = annot_ref.unwrap_or(*page);
            let location = format!("page {} annotation", index + 1);
            let kind = subtype(annot).unwrap_or("");
            if forbidden_annotation(kind, part) {
                out.push(
                    Violation::new(ViolationCode::ForbiddenAnnotation, format!("{} annotation", kind))
                        .with_location(location)
                        .with_target(target)
                        .with_clause("6.5.2"),
                );
                continue;
            }
            if kind != "Popup" {
                let flags = AnnotationFlags::of(annot);
                if !flags.is_archival() {
                    out.push(
                        Violation::new(
                            ViolationCode::InvalidAnnotationFlags,
                            format!("{} annotation flags {}", kind, flags.bits()),
                        )
                        .with_location(location.clone())
                        .with_target(target)
                        .with_clause("6.5.3"),
                    );
                }
            }
            if part == 1 && annot.get("CA").and_then(|c| c.as_number()).is_some_and(|ca| ca < 1.0) {
                out.push(
                    Violation::new(ViolationCode::TransparencyNotAllowed, "Annotation opacity below 1.0")
                        .with_location(location.clone())
                        .with_target(target)
                        .with_clause("6.5.3"),
                );
            }
            if part >= 2 && needs_appearance(annot) {
                let has_normal = doc
                    .lookup(annot, "AP")
                    .and_then(|ap| ap.as_dict())
                    .is_some_and(|ap| ap.contains_key("N"));
                if !has_normal {
                    out.push(
                        Violation::new(
                            ViolationCode::MissingAppearanceStream,
                            format!("{} annotation without appearance stream", kind),
                        )
                        .with_location(location)
                        .with_target(target)
                        .with_clause("6.3.3"),
                    );
                }
            }
        }
    }
    out
}

/// Transfer functions in graphics states (ISO 19005-1, 6.2.8).
pub fn check_transfer_functions(doc: &Document, _ctx: &RuleContext<'_>) -> Vec<Violation> {
    resource_entries(doc, "ExtGState")
        .into_iter()
        .filter(|e| {
            e.value.as_dict().is_some_and(|g| {
                g.contains_key("TR")
                    || g.get("TR2").is_some_and(|tr| tr.as_name() != Some("Default"))
            })
        })
        .map(|e| {
            Violation::new(ViolationCode::TransferFunctionNotAllowed, "Graphics state transfer function")
                .with_target(e.owner)
                .with_clause("6.2.8")
        })
        .collect()
}

/// Transparency in PDF/A-1 (ISO 19005-1, 6.4).
pub fn check_transparency(doc: &Document, _ctx: &RuleContext<'_>) -> Vec<Violation> {
    let mut out = Vec::new();
    for (owner, dict) in nested_dicts(doc) {
        let group = dict.get("Group").and_then(|g| doc.resolve_dict(g));
        if group.is_some_and(|g| g.get("S").and_then(|s| s.as_name()) == Some("Transparency")) {
            out.push(
                Violation::new(ViolationCode::TransparencyNotAllowed, "Transparency group")
                    .with_target(owner)
                    .with_clause("6.4"),
            );
        }
    }
    for e in resource_entries(doc, "ExtGState") {
        let Some(g) = e.value.as_dict() else { continue };
        let smask = g.get("SMask").is_some_and(|s| s.as_name() != Some("None"));
        let alpha = ["CA", "ca"]
            .iter()
            .any(|k| g.get(*k).and_then(|v| v.as_number()).is_some_and(|v| v < 1.0));
        let blend = g.get("BM").is_some_and(|bm| !is_normal_blend(bm));
        if smask || alpha || blend {
            out.push(
                Violation::new(
                    ViolationCode::TransparencyNotAllowed,
                    "Graphics state with soft mask, constant alpha or blend mode",
                )
                .with_target(e.owner)
                .with_clause("6.4"),
            );
        }
    }
    for (r, stream) in reachable_streams(doc) {
        let Some(d) = stream.as_dict() else { continue };
        if subtype(d) == Some("Image") && d.contains_key("SMask") {
            out.push(
                Violation::new(ViolationCode::TransparencyNotAllowed, "Image soft mask")
                    .with_target(r)
                    .with_clause("6.4"),
            );
        }
    }
    out
}

pub(crate) fn is_normal_blend(bm: &Object) -> bool {
    match bm {
        Object::Name(n) => n == "Normal" || n == "Compatible",
        Object::Array(items) => items.first().is_some_and(is_normal_blend),
        _ => false,
    }
}

/// Optional content in PDF/A-1 (ISO 19005-1, 6.1.13).
pub fn check_optional_content(doc: &Document, _ctx: &RuleContext<'_>) -> Vec<Violation> {
    if doc.catalog().is_some_and(|c| c.contains_key("OCProperties")) {
        vec![Violation::new(ViolationCode::OptionalContentNotAllowed, "Optional content properties")
            .with_location("catalog")
            .with_clause("6.1.13")]
    } else {
        Vec::new()
    }
}

/// LZW-compressed streams (ISO 19005-1, 6.1.10).
pub fn check_lzw(doc: &Document, _ctx: &RuleContext<'_>) -> Vec<Violation> {
    reachable_streams(doc)
        .into_iter()
        .filter(|(_, s)| s.filters().iter().any(|f| f == "LZWDecode" || f == "LZW"))
        .map(|(r, _)| {
            Violation::new(ViolationCode::LzwCompressionNotAllowed, "LZW-compressed stream")
                .with_target(r)
                .with_clause("6.1.10")
        })
        .collect()
}

/// JPEG2000 images in PDF/A-1 (ISO 19005-1, 6.1.10).
pub fn check_jpeg2000(doc: &Document, _ctx: &RuleContext<'_>) -> Vec<Violation> {
    reachable_streams(doc)
        .into_iter()
        .filter(|(_, s)| s.filters().iter().any(|f| f == "JPXDecode"))
        .map(|(r, _)| {
            Violation::new(ViolationCode::Jpeg2000NotAllowed, "JPEG2000-compressed image")
                .with_target(r)
                .with_clause("6.1.10")
        })
        .collect()
}

/// True when the embedded file data is itself a PDF file.
pub(crate) fn is_pdf_attachment(doc: &Document, spec: ObjectRef) -> bool {
    embedded_stream(doc, spec)
        .and_then(|s| doc.get(s))
        .and_then(|s| s.decode_stream_data().ok())
        .is_some_and(|data| data.starts_with(b"%PDF-"))
}

/// Embedded files per part.
pub fn check_embedded_files(doc: &Document, ctx: &RuleContext<'_>) -> Vec<Violation> {
    let specs = embedded_file_specs(doc);
    let mut out = Vec::new();
    match ctx.standard.part() {
        1 => {
            for (name, spec) in specs {
                out.push(
                    Violation::new(
                        ViolationCode::EmbeddedFileNotAllowed,
                        format!("Embedded file '{}'", name),
                    )
                    .with_target(spec)
                    .with_clause("6.1.11"),
                );
            }
        },
        2 => {
            for (name, spec) in specs {
                if !is_pdf_attachment(doc, spec) {
                    out.push(
                        Violation::new(
                            ViolationCode::EmbeddedFileNotAllowed,
                            format!("Embedded file '{}' is not a PDF file", name),
                        )
                        .with_target(spec)
                        .with_clause("6.8"),
                    );
                }
            }
        },
        _ => {
            let af: HashSet<ObjectRef> = doc
                .catalog()
                .and_then(|c| doc.lookup(c, "AF"))
                .and_then(|a| a.as_array())
                .map(|a| a.iter().filter_map(|r| r.as_reference()).collect())
                .unwrap_or_default();
            for (name, spec) in specs {
                let Some(dict) = doc.get(spec).and_then(|s| s.as_dict()) else {
                    continue;
                };
                let mime = embedded_stream(doc, spec)
                    .and_then(|s| doc.get(s))
                    .and_then(|s| s.as_dict())
                    .is_some_and(|s| s.get("Subtype").and_then(|t| t.as_name()).is_some());
                let relationship = dict.get("AFRelationship").and_then(|a| a.as_name()).is_some();
                if !relationship || !mime || !af.contains(&spec) || !dict.contains_key("UF") {
                    out.push(
                        Violation::new(
                            ViolationCode::MissingAfRelationship,
                            format!("Embedded file '{}' lacks AFRelationship, MIME type, UF or /AF entry", name),
                        )
                        .with_target(spec)
                        .with_clause("6.8"),
                    );
                }
            }
        },
    }
    out
}

/// Logical structure for level A (ISO 19005-1, 6.8).
pub fn check_structure(doc: &Document, _ctx: &RuleContext<'_>) -> Vec<Violation> {
    let Some(catalog) = doc.catalog() else {
        return Vec::new();
    };
    let mut out = Vec::new();
    let marked = doc
        .lookup(catalog, "MarkInfo")
        .and_then(|m| m.as_dict())
        .and_then(|m| m.get("Marked"))
        .and_then(|m| m.as_bool())
        == Some(true);
    if !marked {
        out.push(
            Violation::new(ViolationCode::MissingDocumentStructure, "Document is not marked as tagged")
                .with_location("catalog /MarkInfo")
                .with_clause("6.8.2"),
        );
    }
    if doc.lookup(catalog, "StructTreeRoot").and_then(|s| s.as_dict()).is_none() {
        out.push(
            Violation::new(ViolationCode::MissingDocumentStructure, "Document has no structure tree")
                .with_location("catalog /StructTreeRoot")
                .with_clause("6.8.3"),
        );
    }
    let lang = doc
        .lookup(catalog, "Lang")
        .and_then(|l| l.as_text())
        .is_some_and(|l| !l.trim().is_empty());
    if !lang {
        out.push(
            Violation::new(ViolationCode::MissingLanguage, "Document language is not declared")
                .with_location("catalog /Lang")
                .with_clause("6.8.4"),
        );
    }
    out
}

/// Fonts without an embedded program (ISO 19005-1, 6.3.4).
pub fn check_fonts(doc: &Document, _ctx: &RuleContext<'_>) -> Vec<Violation> {
    doc.fonts()
        .into_iter()
        .filter(|f| {
            let cid = doc
                .get(*f)
                .and_then(|o| o.as_dict())
                .and_then(subtype)
                .is_some_and(|s| s.starts_with("CIDFontType"));
            !cid && needs_program(doc, *f) && !is_embedded(doc, *f)
        })
        .map(|f| {
            let name = base_font_name(doc, f).unwrap_or_else(|| "unnamed".to_string());
            Violation::new(ViolationCode::FontNotEmbedded, format!("Font '{}' is not embedded", name))
                .with_target(f)
                .with_clause("6.3.4")
        })
        .collect()
}

/// PDF/A output intent with a destination profile (ISO 19005-1, 6.2.2).
pub fn check_output_intent(doc: &Document, _ctx: &RuleContext<'_>) -> Vec<Violation> {
    let Some(catalog) = doc.catalog() else {
        return Vec::new();
    };
    if find_output_intent(doc).is_none() {
        return vec![Violation::new(
            ViolationCode::MissingOutputIntent,
            "No GTS_PDFA1 output intent with a valid destination profile",
        )
        .with_location("catalog /OutputIntents")
        .with_clause("6.2.2")];
    }
    // All destination profiles must be the same object.
    let profiles: HashSet<ObjectRef> = doc
        .lookup(catalog, "OutputIntents")
        .and_then(|i| i.as_array())
        .map(|intents| {
            intents
                .iter()
                .filter_map(|i| doc.resolve_dict(i))
                .filter_map(|i| i.get("DestOutputProfile").and_then(|p| p.as_reference()))
                .collect()
        })
        .unwrap_or_default();
    if profiles.len() > 1 {
        return vec![Violation::new(
            ViolationCode::MissingOutputIntent,
            "Output intents name different destination profiles",
        )
        .with_location("catalog /OutputIntents")
        .with_clause("6.2.2")];
    }
    Vec::new()
}

/// Device colour models a resource owner uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ColorUsage {
    pub gray: bool,
    pub rgb: bool,
    pub cmyk: bool,
}

impl ColorUsage {
    fn mark(&mut self, model: ColorModel) {
        match model {
            ColorModel::Gray => self.gray = true,
            ColorModel::Rgb => self.rgb = true,
            ColorModel::Cmyk => self.cmyk = true,
        }
    }

    pub fn models(&self) -> Vec<ColorModel> {
        let mut out = Vec::new();
        if self.gray {
            out.push(ColorModel::Gray);
        }
        if self.rgb {
            out.push(ColorModel::Rgb);
        }
        if self.cmyk {
            out.push(ColorModel::Cmyk);
        }
        out
    }
}

/// A page or form XObject whose content uses a resource dictionary.
#[derive(Debug, Clone)]
pub(crate) struct ResourceOwner {
    pub owner: ObjectRef,
    pub is_page: bool,
}

/// Pages and reachable form XObjects.
pub(crate) fn resource_owners(doc: &Document) -> Vec<ResourceOwner> {
    let mut out: Vec<ResourceOwner> = doc
        .pages()
        .iter()
        .map(|p| ResourceOwner {
            owner: *p,
            is_page: true,
        })
        .collect();
    for (r, stream) in reachable_streams(doc) {
        if stream.as_dict().and_then(subtype) == Some("Form") {
            out.push(ResourceOwner {
                owner: r,
                is_page: false,
            });
        }
    }
    out
}

/// Resource dictionary in effect for an owner.
pub(crate) fn owner_resources<'a>(doc: &'a Document, owner: &ResourceOwner) -> Option<&'a Dict> {
    if owner.is_page {
        doc.page_resources(owner.owner)
    } else {
        doc.get(owner.owner)?
            .as_dict()
            .and_then(|d| doc.lookup(d, "Resources"))
            .and_then(|r| r.as_dict())
    }
}

/// Device colour models used by the content of `owner`, excluding models already
/// calibrated by a `/Default*` colour space in its resources.
pub(crate) fn uncalibrated_usage(doc: &Document, owner: &ResourceOwner) -> ColorUsage {
    let resources = owner_resources(doc, owner);
    let mut usage = ColorUsage::default();

    let contents = if owner.is_page {
        doc.page_contents(owner.owner)
    } else {
        vec![owner.owner]
    };
    for content in contents {
        let Some(stream) = doc.get(content) else { continue };
        let data = match stream.decode_stream_data() {
            Ok(d) => d,
            Err(e) => {
                log::warn!("Skipping undecodable content stream {}: {}", content, e);
                continue;
            },
        };
        match parse_content_stream(&data) {
            Ok(ops) => {
                for op in &ops {
                    scan_operation(doc, resources, op, &mut usage);
                }
            },
            Err(e) => log::warn!("Skipping unparseable content stream {}: {}", content, e),
        }
    }

    // Images drawn through this owner's XObject resources.
    if let Some(xobjects) = resources.and_then(|r| doc.lookup(r, "XObject")).and_then(|x| x.as_dict()) {
        for value in xobjects.values() {
            let Some(image) = doc.resolve_dict(value) else { continue };
            if subtype(image) != Some("Image") || image.get("ImageMask").and_then(|m| m.as_bool()) == Some(true) {
                continue;
            }
            if let Some(cs) = image.get("ColorSpace") {
                colorspace_usage(doc, resources, cs, &mut usage, 0);
            }
        }
    }

    if let Some(defaults) = resources.and_then(|r| doc.lookup(r, "ColorSpace")).and_then(|c| c.as_dict()) {
        if defaults.contains_key("DefaultGray") {
            usage.gray = false;
        }
        if defaults.contains_key("DefaultRGB") {
            usage.rgb = false;
        }
        if defaults.contains_key("DefaultCMYK") {
            usage.cmyk = false;
        }
    }
    usage
}

fn scan_operation(doc: &Document, resources: Option<&Dict>, op: &Operation, usage: &mut ColorUsage) {
    match op.operator.as_str() {
        "g" | "G" => usage.gray = true,
        "rg" | "RG" => usage.rgb = true,
        "k" | "K" => usage.cmyk = true,
        "cs" | "CS" => {
            if let Some(cs) = op.operands.first() {
                colorspace_usage(doc, resources, cs, usage, 0);
            }
        },
        "sh" => {
            let shading = op
                .operands
                .first()
                .and_then(|n| n.as_name())
                .and_then(|n| resources.and_then(|r| doc.lookup(r, "Shading")).and_then(|s| s.as_dict())?.get(n))
                .and_then(|s| doc.resolve_dict(s));
            if let Some(cs) = shading.and_then(|s| s.get("ColorSpace")) {
                colorspace_usage(doc, resources, cs, usage, 0);
            }
        },
        "BI" => {
            if let Some(dict) = op.inline_image_dict() {
                let mask = ["IM", "ImageMask"]
                    .iter()
                    .any(|k| dict.get(*k).and_then(|m| m.as_bool()) == Some(true));
                if !mask {
                    if let Some(cs) = dict.get("CS").or_else(|| dict.get("ColorSpace")) {
                        colorspace_usage(doc, resources, cs, usage, 0);
                    }
                }
            }
        },
        _ => {},
    }
}

/// Record the device models a colour space value relies on.
fn colorspace_usage(doc: &Document, resources: Option<&Dict>, cs: &Object, usage: &mut ColorUsage, depth: usize) {
    if depth > 8 {
        return;
    }
    let Some(cs) = doc.resolve(cs) else { return };
    match cs {
        Object::Name(name) => {
            if let Some(model) = ColorModel::from_device_space(name) {
                usage.mark(model);
            } else if let Some(named) = resources
                .and_then(|r| doc.lookup(r, "ColorSpace"))
                .and_then(|c| c.as_dict())
                .and_then(|c| c.get(name.as_str()))
            {
                colorspace_usage(doc, resources, named, usage, depth + 1);
            }
        },
        Object::Array(items) => match items.first().and_then(|f| f.as_name()) {
            Some("Indexed") | Some("I") | Some("Pattern") => {
                if let Some(base) = items.get(1) {
                    colorspace_usage(doc, resources, base, usage, depth + 1);
                }
            },
            _ => {},
        },
        _ => {},
    }
}

/// True when `model` is calibrated by the output intent.
pub(crate) fn covered_by_intent(intent: Option<InstalledIntent>, model: ColorModel) -> bool {
    match intent {
        Some(i) => i.model == model || model == ColorModel::Gray,
        None => false,
    }
}

/// Device colour use inconsistent with the output intent (ISO 19005-1, 6.2.3).
pub fn check_device_colors(doc: &Document, _ctx: &RuleContext<'_>) -> Vec<Violation> {
    let intent = find_output_intent(doc);
    let mut out = Vec::new();
    for owner in resource_owners(doc) {
        let usage = uncalibrated_usage(doc, &owner);
        for model in usage.models() {
            if !covered_by_intent(intent, model) {
                out.push(
                    Violation::new(
                        ViolationCode::DeviceColorWithoutIntent,
                        format!("{} used without a matching output intent", model.device_space()),
                    )
                    .with_target(owner.owner)
                    .with_clause("6.2.3"),
                );
            }
        }
    }
    out
}

/// Device model named as the alternate of a Separation or DeviceN array.
pub(crate) fn device_alternate(doc: &Document, items: &[Object]) -> Option<ColorModel> {
    let index = match items.first()?.as_name()? {
        "Separation" => 2,
        "DeviceN" => 2,
        _ => return None,
    };
    let alt = doc.resolve(items.get(index)?)?;
    ColorModel::from_device_space(alt.as_name()?)
}

/// Separation and DeviceN alternates not covered by the output intent.
pub fn check_alternate_spaces(doc: &Document, _ctx: &RuleContext<'_>) -> Vec<Violation> {
    let intent = find_output_intent(doc);
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for r in doc.reachable() {
        let Some(obj) = doc.get(r) else { continue };
        let mut arrays = Vec::new();
        collect_arrays(obj, &mut arrays);
        for items in arrays {
            if let Some(model) = device_alternate(doc, items) {
                if !covered_by_intent(intent, model) && seen.insert((r, model.device_space())) {
                    out.push(
                        Violation::new(
                            ViolationCode::UncalibratedAlternateSpace,
                            format!("Separation/DeviceN alternate {} without matching intent", model.device_space()),
                        )
                        .with_target(r)
                        .with_clause("6.2.3.4"),
                    );
                }
            }
        }
    }
    out
}

fn collect_arrays<'a>(obj: &'a Object, out: &mut Vec<&'a [Object]>) {
    match obj {
        Object::Array(items) => {
            out.push(items);
            for item in items {
                collect_arrays(item, out);
            }
        },
        Object::Dictionary(d) | Object::Stream { dict: d, .. } => {
            for v in d.values() {
                collect_arrays(v, out);
            }
        },
        _ => {},
    }
}

/// XMP packet presence, identification and agreement with Info (ISO 19005-1, 6.7).
pub fn check_metadata(doc: &Document, ctx: &RuleContext<'_>) -> Vec<Violation> {
    let xmp = match XmpMetadata::from_document(doc) {
        Ok(Some(xmp)) => xmp,
        Ok(None) => {
            return vec![Violation::new(ViolationCode::MissingXmpMetadata, "Document has no XMP metadata")
                .with_location("catalog /Metadata")
                .with_clause("6.7.2")];
        },
        Err(e) => {
            return vec![Violation::new(
                ViolationCode::MissingXmpMetadata,
                format!("XMP metadata is unreadable: {}", e),
            )
            .with_location("catalog /Metadata")
            .with_clause("6.7.2")];
        },
    };

    let mut out = Vec::new();
    if xmp.standard() != Some(ctx.standard) {
        out.push(
            Violation::new(
                ViolationCode::InvalidPdfaIdentification,
                format!(
                    "XMP identifies {} instead of {}",
                    xmp.standard().map_or("no PDF/A level".to_string(), |s| s.to_string()),
                    ctx.standard
                ),
            )
            .with_location("XMP pdfaid")
            .with_clause("6.7.11"),
        );
    }
    for mismatch in find_info_mismatches(doc, &xmp) {
        out.push(
            Violation::new(ViolationCode::XmpMetadataMismatch, mismatch)
                .with_location("Info dictionary")
                .with_clause("6.7.3"),
        );
    }
    let filtered = doc
        .catalog()
        .and_then(|c| doc.lookup(c, "Metadata"))
        .is_some_and(|m| !m.filters().is_empty());
    if filtered {
        out.push(
            Violation::new(ViolationCode::FilteredMetadata, "Metadata stream is filtered")
                .with_location("catalog /Metadata")
                .with_clause("6.7.2"),
        );
    }
    out
}
