//! Repairs for the checks in [`super::validators`].
//!
//! Repairs sweep the whole document for the construct their check reports, so the
//! first call for a rule usually resolves all of its violations and later calls
//! return [`FixOutcome::AlreadyFixed`].

use super::pipeline::{iccbased, RuleContext};
use super::types::{FixOutcome, Violation, ViolationCode};
use super::validators::{self, AnnotationFlags, ResourceOwner};
use crate::decoders::{decode_stream_with_params, flate_encode, is_image_filter};
use crate::document::Document;
use crate::embedder::attachments::{
    add_to_af, embedded_file_specs, embedded_stream, set_embedded_files, AFRelationship, DEFAULT_MIME_TYPE,
};
use crate::embedder::fonts::{base_font_name, embed_font, is_embedded, needs_program};
use crate::embedder::icc::{self, ColorModel};
use crate::embedder::xmp::embed_metadata;
use crate::error::{Error, Result};
use crate::object::{extract_decode_params, Dict, Object, ObjectRef};
use crate::parser_config::DEFAULT_MAX_DECOMPRESSED_SIZE;
use std::collections::{HashMap, HashSet};

fn outcome(changed: usize, description: impl FnOnce(usize) -> String) -> FixOutcome {
    if changed == 0 {
        FixOutcome::AlreadyFixed
    } else {
        FixOutcome::Fixed(description(changed))
    }
}

/// Apply `f` to every dictionary nested in `obj`, returning true if any call did.
fn rewrite_dicts(obj: &mut Object, f: &mut dyn FnMut(&mut Dict) -> bool) -> bool {
    match obj {
        Object::Dictionary(d) | Object::Stream { dict: d, .. } => {
            let mut changed = f(d);
            for value in d.values_mut() {
                changed |= rewrite_dicts(value, f);
            }
            changed
        },
        Object::Array(items) => {
            let mut changed = false;
            for item in items {
                changed |= rewrite_dicts(item, f);
            }
            changed
        },
        _ => false,
    }
}

/// Apply `f` to every array nested in `obj`.
fn rewrite_arrays(obj: &mut Object, f: &mut dyn FnMut(&mut Vec<Object>) -> bool) -> bool {
    match obj {
        Object::Array(items) => {
            let mut changed = f(items);
            for item in items.iter_mut() {
                changed |= rewrite_arrays(item, f);
            }
            changed
        },
        Object::Dictionary(d) | Object::Stream { dict: d, .. } => {
            let mut changed = false;
            for value in d.values_mut() {
                changed |= rewrite_arrays(value, f);
            }
            changed
        },
        _ => false,
    }
}

/// Apply `f` to every dictionary of every reachable object; returns how many objects changed.
fn rewrite_reachable(doc: &mut Document, mut f: impl FnMut(&mut Dict) -> bool) -> usize {
    let mut changed = 0;
    for r in doc.reachable() {
        if let Some(obj) = doc.get_mut(r) {
            if rewrite_dicts(obj, &mut f) {
                changed += 1;
            }
        }
    }
    changed
}

/// Apply `f` to every graphics state dictionary, wherever it is stored.
fn rewrite_gstates(doc: &mut Document, f: fn(&mut Dict) -> bool) -> usize {
    let (indirect, maps, owners) = {
        let entries = validators::resource_entries(doc, "ExtGState");
        let indirect: Vec<ObjectRef> = entries.iter().filter_map(|e| e.indirect).collect();
        let maps: HashSet<ObjectRef> = entries
            .iter()
            .filter(|e| e.indirect.is_none())
            .filter_map(|e| e.map)
            .collect();
        let owners: HashSet<ObjectRef> = entries
            .iter()
            .filter(|e| e.indirect.is_none() && e.map.is_none())
            .map(|e| e.owner)
            .collect();
        (indirect, maps, owners)
    };

    let mut changed = 0;
    for r in indirect {
        if doc.get_mut(r).and_then(|o| o.as_dict_mut()).is_some_and(f) {
            changed += 1;
        }
    }
    for r in maps {
        if let Some(map) = doc.get_mut(r).and_then(|o| o.as_dict_mut()) {
            for gstate in map.values_mut() {
                if gstate.as_dict_mut().is_some_and(f) {
                    changed += 1;
                }
            }
        }
    }
    for r in owners {
        let Some(obj) = doc.get_mut(r) else { continue };
        let touched = rewrite_dicts(obj, &mut |d: &mut Dict| {
            let mut touched = false;
            if let Some(Object::Dictionary(map)) = d.get_mut("ExtGState") {
                for gstate in map.values_mut() {
                    if let Object::Dictionary(g) = gstate {
                        touched |= f(g);
                    }
                }
            }
            touched
        });
        if touched {
            changed += 1;
        }
    }
    changed
}

/// Mutable access to a catalog entry's dictionary, following one indirection.
fn catalog_dict_mut<'d>(doc: &'d mut Document, key: &str) -> Option<&'d mut Dict> {
    match doc.catalog()?.get(key)?.as_reference() {
        Some(r) => doc.get_mut(r)?.as_dict_mut(),
        None => doc.catalog_mut()?.get_mut(key)?.as_dict_mut(),
    }
}

fn catalog_mut(doc: &mut Document) -> Result<&mut Dict> {
    doc.catalog_mut()
        .ok_or_else(|| Error::UnrecoverableDocument("catalog is missing".to_string()))
}

fn parse_version(name: &str) -> Option<(u8, u8)> {
    let (major, minor) = name.split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

/// Add a file identifier and cap the version.
pub fn fix_file_structure(doc: &mut Document, ctx: &mut RuleContext<'_>, _v: &Violation) -> Result<FixOutcome> {
    let mut done = Vec::new();
    let has_id = doc
        .trailer()
        .get("ID")
        .and_then(|id| id.as_array())
        .is_some_and(|id| id.len() == 2 && id.iter().all(|e| e.as_string().is_some()));
    if !has_id {
        let id = Object::String(ctx.identity.to_vec());
        doc.trailer_mut()
            .insert("ID".to_string(), Object::Array(vec![id.clone(), id]));
        done.push("generated file identifier".to_string());
    }

    let limit = ctx.standard.pdf_version();
    if doc.version() > limit {
        done.push(format!(
            "lowered version {}.{} to {}.{}",
            doc.version().0,
            doc.version().1,
            limit.0,
            limit.1
        ));
        doc.set_version(limit);
    }
    let catalog = catalog_mut(doc)?;
    let catalog_version = catalog
        .get("Version")
        .and_then(|v| v.as_name())
        .and_then(parse_version);
    if catalog_version.is_some_and(|v| v > limit) {
        catalog.remove("Version");
        done.push("removed catalog /Version".to_string());
    }

    Ok(if done.is_empty() {
        FixOutcome::AlreadyFixed
    } else {
        FixOutcome::Fixed(done.join("; "))
    })
}

/// Drop reference XObject, OPI and alternate image entries, and disable interpolation.
pub fn fix_xobjects(doc: &mut Document, _ctx: &mut RuleContext<'_>, v: &Violation) -> Result<FixOutcome> {
    let Some(dict) = v.target.and_then(|t| doc.get_mut(t)).and_then(|o| o.as_dict_mut()) else {
        return Ok(FixOutcome::AlreadyFixed);
    };
    let mut removed = Vec::new();
    for key in ["Ref", "OPI", "Alternates"] {
        if dict.remove(key).is_some() {
            removed.push(key);
        }
    }
    if dict.get("Interpolate").and_then(|i| i.as_bool()) == Some(true) {
        dict.insert("Interpolate".to_string(), Object::Boolean(false));
        removed.push("Interpolate");
    }
    Ok(outcome(removed.len(), |_| format!("removed {}", removed.join(", "))))
}

/// Remove forbidden actions, additional actions and document JavaScript.
pub fn fix_actions(doc: &mut Document, ctx: &mut RuleContext<'_>, _v: &Violation) -> Result<FixOutcome> {
    let part = ctx.standard.part();
    let forbidden: HashSet<ObjectRef> = doc
        .reachable()
        .into_iter()
        .filter(|r| {
            doc.get(*r)
                .and_then(|o| o.as_dict())
                .is_some_and(|d| validators::forbidden_action(d, part).is_some())
        })
        .collect();
    let is_bad = |value: &Object| match value {
        Object::Reference(r) => forbidden.contains(r),
        Object::Dictionary(d) => validators::forbidden_action(d, part).is_some(),
        _ => false,
    };

    let mut changed = rewrite_reachable(doc, |d| {
        let mut changed = false;
        for key in ["A", "OpenAction"] {
            if d.get(key).is_some_and(is_bad) {
                d.remove(key);
                changed = true;
            }
        }
        let next_bad = d
            .get("Next")
            .is_some_and(|n| !matches!(n, Object::Array(_)) && is_bad(n));
        if next_bad {
            d.remove("Next");
            changed = true;
        }
        if let Some(Object::Array(chain)) = d.get_mut("Next") {
            let before = chain.len();
            chain.retain(|a| !is_bad(a));
            changed |= chain.len() != before;
        }
        changed |= d.remove("AA").is_some();
        changed
    });

    if catalog_dict_mut(doc, "Names").is_some_and(|names| names.remove("JavaScript").is_some()) {
        changed += 1;
    }
    Ok(outcome(changed, |n| format!("removed actions from {} object(s)", n)))
}

/// Clear `NeedAppearances` and drop XFA.
pub fn fix_forms(doc: &mut Document, _ctx: &mut RuleContext<'_>, _v: &Violation) -> Result<FixOutcome> {
    let Some(form) = catalog_dict_mut(doc, "AcroForm") else {
        return Ok(FixOutcome::AlreadyFixed);
    };
    let mut changed = 0;
    if form.get("NeedAppearances").and_then(|n| n.as_bool()) == Some(true) {
        form.insert("NeedAppearances".to_string(), Object::Boolean(false));
        changed += 1;
    }
    if form.remove("XFA").is_some() {
        changed += 1;
    }
    Ok(outcome(changed, |_| "normalized interactive form".to_string()))
}

/// Mutable `/Annots` array of a page, following one indirection.
fn annots_mut(doc: &mut Document, page: ObjectRef) -> Option<&mut Vec<Object>> {
    match doc.get(page)?.as_dict()?.get("Annots")?.as_reference() {
        Some(r) => doc.get_mut(r)?.as_array_mut(),
        None => doc.get_mut(page)?.as_dict_mut()?.get_mut("Annots")?.as_array_mut(),
    }
}

/// Move inline annotation dictionaries into their own objects.
fn promote_inline_annotations(doc: &mut Document, page: ObjectRef) {
    let inline: Vec<(usize, Object)> = match annots_mut(doc, page) {
        Some(annots) => annots
            .iter()
            .enumerate()
            .filter(|(_, a)| matches!(a, Object::Dictionary(_)))
            .map(|(i, a)| (i, a.clone()))
            .collect(),
        None => return,
    };
    let promoted: Vec<(usize, ObjectRef)> = inline.into_iter().map(|(i, a)| (i, doc.insert(a))).collect();
    if let Some(annots) = annots_mut(doc, page) {
        for (i, r) in promoted {
            annots[i] = Object::Reference(r);
        }
    }
}

fn empty_appearance(annot: &Dict) -> Object {
    let rect: Vec<f64> = annot
        .get("Rect")
        .and_then(|r| r.as_array())
        .map(|r| r.iter().filter_map(|v| v.as_number()).collect())
        .unwrap_or_default();
    let (width, height) = match rect.as_slice() {
        [x1, y1, x2, y2] => ((x2 - x1).abs(), (y2 - y1).abs()),
        _ => (0.0, 0.0),
    };
    let mut dict = Dict::new();
    dict.insert("Type".to_string(), Object::name("XObject"));
    dict.insert("Subtype".to_string(), Object::name("Form"));
    dict.insert(
        "BBox".to_string(),
        Object::Array(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Real(width),
            Object::Real(height),
        ]),
    );
    Object::stream(dict, Vec::new())
}

/// Remove forbidden annotations and normalize flags and appearances.
pub fn fix_annotations(doc: &mut Document, ctx: &mut RuleContext<'_>, v: &Violation) -> Result<FixOutcome> {
    if v.code == ViolationCode::TransparencyNotAllowed {
        return Ok(FixOutcome::Unfixable(
            "annotation opacity below 1.0 would be lost".to_string(),
        ));
    }
    let part = ctx.standard.part();
    let mut removed = 0;
    let mut normalized = 0;

    for page in doc.pages().to_vec() {
        promote_inline_annotations(doc, page);
        let annots: Vec<ObjectRef> = annots_mut(doc, page)
            .map(|a| a.iter().filter_map(|o| o.as_reference()).collect())
            .unwrap_or_default();

        let mut drop = HashSet::new();
        for annot in annots {
            let Some(dict) = doc.get(annot).and_then(|o| o.as_dict()) else {
                continue;
            };
            let kind = dict.get("Subtype").and_then(|s| s.as_name()).unwrap_or("").to_string();
            if validators::forbidden_annotation(&kind, part) {
                drop.insert(annot);
                continue;
            }
            let ap_ref = dict.get("AP").and_then(|ap| ap.as_reference());
            let missing_normal = part >= 2
                && validators::needs_appearance(dict)
                && !doc
                    .lookup(dict, "AP")
                    .and_then(|ap| ap.as_dict())
                    .is_some_and(|ap| ap.contains_key("N"));
            let appearance = missing_normal.then(|| empty_appearance(dict));

            let mut touched = false;
            if let Some(stream) = appearance {
                let stream_ref = doc.insert(stream);
                let ap = match ap_ref {
                    Some(r) => doc.get_mut(r).and_then(|o| o.as_dict_mut()),
                    None => doc
                        .get_mut(annot)
                        .and_then(|o| o.as_dict_mut())
                        .map(|d| {
                            d.entry("AP".to_string())
                                .or_insert_with(|| Object::Dictionary(Dict::new()))
                        })
                        .and_then(|ap| ap.as_dict_mut()),
                };
                if let Some(ap) = ap {
                    ap.insert("N".to_string(), Object::Reference(stream_ref));
                    touched = true;
                }
            }

            let Some(dict) = doc.get_mut(annot).and_then(|o| o.as_dict_mut()) else {
                continue;
            };
            if kind != "Popup" {
                let flags = AnnotationFlags::of(dict);
                let fixed = flags.archival();
                if fixed != flags || !dict.contains_key("F") {
                    dict.insert("F".to_string(), Object::Integer(fixed.bits() as i64));
                    touched = true;
                }
            }
            if touched {
                normalized += 1;
            }
        }

        if !drop.is_empty() {
            if let Some(list) = annots_mut(doc, page) {
                list.retain(|a| !a.as_reference().is_some_and(|r| drop.contains(&r)));
            }
            removed += drop.len();
        }
    }

    Ok(outcome(removed + normalized, |_| {
        format!("removed {} and normalized {} annotation(s)", removed, normalized)
    }))
}

fn strip_transfer(gstate: &mut Dict) -> bool {
    let mut changed = gstate.remove("TR").is_some();
    if gstate.get("TR2").is_some_and(|tr| tr.as_name() != Some("Default")) {
        gstate.insert("TR2".to_string(), Object::name("Default"));
        changed = true;
    }
    changed
}

/// Remove transfer functions from graphics states.
pub fn fix_transfer_functions(doc: &mut Document, _ctx: &mut RuleContext<'_>, _v: &Violation) -> Result<FixOutcome> {
    let changed = rewrite_gstates(doc, strip_transfer);
    Ok(outcome(changed, |n| format!("removed transfer functions from {} graphics state(s)", n)))
}

/// Re-encode an LZW stream with Flate.
pub fn fix_lzw(doc: &mut Document, _ctx: &mut RuleContext<'_>, v: &Violation) -> Result<FixOutcome> {
    let Some(target) = v.target else {
        return Ok(FixOutcome::AlreadyFixed);
    };
    let Some(stream) = doc.get(target) else {
        return Ok(FixOutcome::AlreadyFixed);
    };
    let Object::Stream { dict, data } = stream else {
        return Ok(FixOutcome::AlreadyFixed);
    };
    let filters = stream.filters();
    let Some(last) = filters.iter().rposition(|f| f == "LZWDecode" || f == "LZW") else {
        return Ok(FixOutcome::AlreadyFixed);
    };
    if filters[..last].iter().any(|f| is_image_filter(f)) {
        return Ok(FixOutcome::Unfixable(format!(
            "stream {} applies LZW after an image codec",
            target
        )));
    }

    let params = extract_decode_params(dict.get("DecodeParms"), filters.len());
    let decoded = decode_stream_with_params(data, &filters[..=last], &params[..=last], DEFAULT_MAX_DECOMPRESSED_SIZE)?;
    let encoded = flate_encode(&decoded)?;

    let mut raw_params: Vec<Object> = match dict.get("DecodeParms") {
        Some(Object::Array(items)) => items.clone(),
        Some(d @ Object::Dictionary(_)) => vec![d.clone()],
        _ => Vec::new(),
    };
    raw_params.resize(filters.len(), Object::Null);

    let mut new_filters = vec![Object::name("FlateDecode")];
    new_filters.extend(filters[last + 1..].iter().map(|f| Object::name(f)));
    let mut new_params = vec![Object::Null];
    new_params.extend(raw_params[last + 1..].iter().cloned());

    let mut new_dict = dict.clone();
    new_dict.remove("DecodeParms");
    if new_filters.len() == 1 {
        new_dict.insert("Filter".to_string(), Object::name("FlateDecode"));
    } else {
        new_dict.insert("Filter".to_string(), Object::Array(new_filters));
        if new_params.iter().any(|p| !p.is_null()) {
            new_dict.insert("DecodeParms".to_string(), Object::Array(new_params));
        }
    }
    doc.replace(target, Object::stream(new_dict, encoded));
    Ok(FixOutcome::Fixed(format!("re-encoded stream {} with Flate", target)))
}

fn clamp_alpha(gstate: &mut Dict) -> bool {
    let mut changed = false;
    for key in ["CA", "ca"] {
        if gstate.get(key).and_then(|v| v.as_number()).is_some_and(|v| v > 1.0) {
            gstate.insert(key.to_string(), Object::Real(1.0));
            changed = true;
        }
    }
    changed
}

/// Drop transparency groups and clamp out-of-range opacity.
///
/// Both leave the rendered page unchanged. Soft masks, constant alpha below
/// 1.0 and non-normal blend modes would paint differently once flattened, so
/// a violation that survives the neutral rewrite is reported as unfixable.
pub fn fix_transparency(doc: &mut Document, ctx: &mut RuleContext<'_>, v: &Violation) -> Result<FixOutcome> {
    let is_transparency = |d: &Dict| d.get("S").and_then(|s| s.as_name()) == Some("Transparency");
    let groups: HashSet<ObjectRef> = validators::nested_dicts(doc)
        .into_iter()
        .filter_map(|(_, d)| d.get("Group").and_then(|g| g.as_reference()))
        .filter(|r| doc.get(*r).and_then(|g| g.as_dict()).is_some_and(is_transparency))
        .collect();

    let mut changed = rewrite_reachable(doc, |d| {
        let drop = match d.get("Group") {
            Some(Object::Reference(r)) => groups.contains(r),
            Some(Object::Dictionary(g)) => is_transparency(g),
            _ => false,
        };
        if drop {
            d.remove("Group");
        }
        drop
    });
    changed += rewrite_gstates(doc, clamp_alpha);

    let remaining = validators::check_transparency(doc, ctx);
    if remaining
        .iter()
        .any(|r| r.target == v.target && r.message == v.message)
    {
        return Ok(FixOutcome::Unfixable(format!(
            "{} cannot be removed without changing the page appearance",
            v.message.to_lowercase()
        )));
    }
    Ok(outcome(changed, |n| format!("removed {} transparency group(s)", n)))
}

/// Remove optional content properties and memberships.
pub fn fix_optional_content(doc: &mut Document, _ctx: &mut RuleContext<'_>, _v: &Violation) -> Result<FixOutcome> {
    let mut changed = usize::from(catalog_mut(doc)?.remove("OCProperties").is_some());
    changed += rewrite_reachable(doc, |d| d.remove("OC").is_some());
    Ok(outcome(changed, |_| "removed optional content".to_string()))
}

/// Remove or complete embedded files according to the part.
pub fn fix_embedded_files(doc: &mut Document, ctx: &mut RuleContext<'_>, _v: &Violation) -> Result<FixOutcome> {
    let specs = embedded_file_specs(doc);
    match ctx.standard.part() {
        1 => {
            if specs.is_empty() {
                return Ok(FixOutcome::AlreadyFixed);
            }
            set_embedded_files(doc, &[])?;
            Ok(FixOutcome::Fixed(format!("removed {} embedded file(s)", specs.len())))
        },
        2 => {
            let kept: Vec<(String, ObjectRef)> = specs
                .iter()
                .filter(|(_, spec)| validators::is_pdf_attachment(doc, *spec))
                .cloned()
                .collect();
            if kept.len() == specs.len() {
                return Ok(FixOutcome::AlreadyFixed);
            }
            set_embedded_files(doc, &kept)?;
            Ok(FixOutcome::Fixed(format!(
                "removed {} non-PDF embedded file(s)",
                specs.len() - kept.len()
            )))
        },
        _ => {
            let mut changed = 0;
            for (name, spec) in &specs {
                let mut touched = false;
                if let Some(stream) = embedded_stream(doc, *spec)
                    .and_then(|s| doc.get_mut(s))
                    .and_then(|s| s.as_dict_mut())
                {
                    if stream.get("Subtype").and_then(|t| t.as_name()).is_none() {
                        stream.insert("Subtype".to_string(), Object::name(DEFAULT_MIME_TYPE));
                        touched = true;
                    }
                }
                if let Some(dict) = doc.get_mut(*spec).and_then(|s| s.as_dict_mut()) {
                    if dict.get("AFRelationship").and_then(|a| a.as_name()).is_none() {
                        dict.insert(
                            "AFRelationship".to_string(),
                            Object::name(AFRelationship::default().pdf_name()),
                        );
                        touched = true;
                    }
                    if !dict.contains_key("UF") {
                        let uf = dict.get("F").cloned().unwrap_or_else(|| Object::text(name));
                        dict.insert("UF".to_string(), uf);
                        touched = true;
                    }
                }
                let listed = doc
                    .catalog()
                    .and_then(|c| doc.lookup(c, "AF"))
                    .and_then(|a| a.as_array())
                    .is_some_and(|a| a.iter().any(|r| r.as_reference() == Some(*spec)));
                if !listed {
                    add_to_af(doc, *spec)?;
                    touched = true;
                }
                if touched {
                    changed += 1;
                }
            }
            Ok(outcome(changed, |n| format!("completed {} embedded file specification(s)", n)))
        },
    }
}

const STRUCTURE_OPEN: &[u8] = b"/P <</MCID 0>> BDC\n";
const STRUCTURE_CLOSE: &[u8] = b"\nEMC\n";

/// Build a minimal structure tree: one `P` element per page under a `Document`
/// element, each page's content wrapped in a single marked-content sequence.
fn synthesize_structure(doc: &mut Document) -> Result<ObjectRef> {
    let pages = doc.pages().to_vec();
    let root = doc.insert(Object::Null);
    let document = doc.insert(Object::Null);
    let mut kids = Vec::with_capacity(pages.len());
    let mut nums = Vec::with_capacity(pages.len() * 2);

    for (index, page) in pages.iter().enumerate() {
        let element = doc.insert(Object::dictionary(vec![
            ("Type", Object::name("StructElem")),
            ("S", Object::name("P")),
            ("P", Object::Reference(document)),
            ("Pg", Object::Reference(*page)),
            ("K", Object::Integer(0)),
        ]));
        kids.push(Object::Reference(element));
        nums.push(Object::Integer(index as i64));
        nums.push(Object::Array(vec![Object::Reference(element)]));

        let mut contents = vec![Object::Reference(doc.insert(Object::stream(Dict::new(), STRUCTURE_OPEN.to_vec())))];
        contents.extend(doc.page_contents(*page).into_iter().map(Object::Reference));
        contents.push(Object::Reference(doc.insert(Object::stream(Dict::new(), STRUCTURE_CLOSE.to_vec()))));

        let page_dict = doc
            .get_mut(*page)
            .and_then(|p| p.as_dict_mut())
            .ok_or(Error::ObjectNotFound(*page))?;
        page_dict.insert("Contents".to_string(), Object::Array(contents));
        page_dict.insert("StructParents".to_string(), Object::Integer(index as i64));
    }

    doc.replace(
        document,
        Object::dictionary(vec![
            ("Type", Object::name("StructElem")),
            ("S", Object::name("Document")),
            ("P", Object::Reference(root)),
            ("K", Object::Array(kids)),
        ]),
    );
    let parent_tree = doc.insert(Object::dictionary(vec![("Nums", Object::Array(nums))]));
    doc.replace(
        root,
        Object::dictionary(vec![
            ("Type", Object::name("StructTreeRoot")),
            ("K", Object::Array(vec![Object::Reference(document)])),
            ("ParentTree", Object::Reference(parent_tree)),
            ("ParentTreeNextKey", Object::Integer(pages.len() as i64)),
        ]),
    );
    Ok(root)
}

/// Mark the document tagged, declare its language and add a structure tree.
pub fn fix_structure(doc: &mut Document, ctx: &mut RuleContext<'_>, _v: &Violation) -> Result<FixOutcome> {
    let mut done = Vec::new();

    let marked = doc
        .catalog()
        .and_then(|c| doc.lookup(c, "MarkInfo"))
        .and_then(|m| m.as_dict())
        .and_then(|m| m.get("Marked"))
        .and_then(|m| m.as_bool())
        == Some(true);
    if !marked {
        match catalog_dict_mut(doc, "MarkInfo") {
            Some(info) => {
                info.insert("Marked".to_string(), Object::Boolean(true));
            },
            None => {
                catalog_mut(doc)?.insert(
                    "MarkInfo".to_string(),
                    Object::dictionary(vec![("Marked", Object::Boolean(true))]),
                );
            },
        }
        done.push("marked document as tagged".to_string());
    }

    let has_lang = doc
        .catalog()
        .and_then(|c| doc.lookup(c, "Lang"))
        .and_then(|l| l.as_text())
        .is_some_and(|l| !l.trim().is_empty());
    if !has_lang {
        let language = ctx.default_language.to_string();
        catalog_mut(doc)?.insert("Lang".to_string(), Object::text(&language));
        done.push(format!("set /Lang to {}", language));
    }

    let has_tree = doc
        .catalog()
        .and_then(|c| doc.lookup(c, "StructTreeRoot"))
        .and_then(|s| s.as_dict())
        .is_some();
    if !has_tree {
        let root = synthesize_structure(doc)?;
        catalog_mut(doc)?.insert("StructTreeRoot".to_string(), Object::Reference(root));
        done.push("added structure tree".to_string());
    }

    Ok(if done.is_empty() {
        FixOutcome::AlreadyFixed
    } else {
        FixOutcome::Fixed(done.join("; "))
    })
}

/// Embed the program for the target font.
pub fn fix_fonts(doc: &mut Document, ctx: &mut RuleContext<'_>, v: &Violation) -> Result<FixOutcome> {
    let Some(font) = v.target else {
        return Ok(FixOutcome::AlreadyFixed);
    };
    if !needs_program(doc, font) || is_embedded(doc, font) {
        return Ok(FixOutcome::AlreadyFixed);
    }
    let name = base_font_name(doc, font).unwrap_or_else(|| font.to_string());
    match embed_font(doc, font, ctx.font_source, ctx.standard) {
        Ok(embedded) => Ok(FixOutcome::Fixed(format!(
            "embedded {:?} program for '{}' as {}",
            embedded.kind, name, embedded.program
        ))),
        Err(Error::UnembeddableResource(reason)) | Err(Error::InvalidArgument(reason)) => {
            Ok(FixOutcome::Unfixable(reason))
        },
        Err(e) => Err(e),
    }
}

/// Install a single PDF/A output intent.
pub fn fix_output_intent(doc: &mut Document, ctx: &mut RuleContext<'_>, v: &Violation) -> Result<FixOutcome> {
    let Some(existing) = icc::find_output_intent(doc) else {
        let intent = ctx.ensure_intent(doc)?;
        return Ok(FixOutcome::Fixed(format!(
            "installed {} output intent",
            intent.model.device_space()
        )));
    };
    if validators::check_output_intent(doc, ctx).is_empty() {
        return Ok(FixOutcome::AlreadyFixed);
    }
    // Conflicting profiles: keep the first usable one as the only intent.
    let profile = doc
        .get(existing.profile)
        .map(|s| s.decode_stream_data())
        .transpose()?
        .ok_or(Error::ObjectNotFound(existing.profile))?;
    icc::install_output_intent(doc, &profile)?;
    log::debug!("Replaced conflicting output intents ({})", v.message);
    Ok(FixOutcome::Fixed("kept a single output intent".to_string()))
}

fn default_key(model: ColorModel) -> &'static str {
    match model {
        ColorModel::Gray => "DefaultGray",
        ColorModel::Rgb => "DefaultRGB",
        ColorModel::Cmyk => "DefaultCMYK",
    }
}

/// The object holding the `/Resources` entry an owner uses.
fn resource_holder(doc: &Document, owner: &ResourceOwner) -> ObjectRef {
    if !owner.is_page {
        return owner.owner;
    }
    let mut node = owner.owner;
    for _ in 0..64 {
        let Some(dict) = doc.get(node).and_then(|n| n.as_dict()) else {
            break;
        };
        if dict.contains_key("Resources") {
            return node;
        }
        match dict.get("Parent").and_then(|p| p.as_reference()) {
            Some(parent) => node = parent,
            None => break,
        }
    }
    owner.owner
}

/// Add `key -> value` to the `/ColorSpace` map in effect for `owner`.
fn add_colorspace(doc: &mut Document, owner: &ResourceOwner, key: &str, value: Object) -> Result<bool> {
    let holder = resource_holder(doc, owner);
    let holder_dict = doc
        .get_mut(holder)
        .and_then(|h| h.as_dict_mut())
        .ok_or(Error::ObjectNotFound(holder))?;
    holder_dict
        .entry("Resources".to_string())
        .or_insert_with(|| Object::Dictionary(Dict::new()));
    let resources_ref = holder_dict.get("Resources").and_then(|r| r.as_reference());

    let colorspace_ref = {
        let resources = match resources_ref {
            Some(r) => doc.get(r).and_then(|o| o.as_dict()),
            None => doc.get(holder).and_then(|h| h.as_dict()).and_then(|h| h.get("Resources")).and_then(|r| r.as_dict()),
        };
        resources.and_then(|r| r.get("ColorSpace")).and_then(|c| c.as_reference())
    };
    let map = match colorspace_ref {
        Some(r) => doc.get_mut(r).and_then(|o| o.as_dict_mut()),
        None => {
            let resources = match resources_ref {
                Some(r) => doc.get_mut(r).and_then(|o| o.as_dict_mut()),
                None => doc
                    .get_mut(holder)
                    .and_then(|h| h.as_dict_mut())
                    .and_then(|h| h.get_mut("Resources"))
                    .and_then(|r| r.as_dict_mut()),
            };
            resources
                .map(|r| {
                    r.entry("ColorSpace".to_string())
                        .or_insert_with(|| Object::Dictionary(Dict::new()))
                })
                .and_then(|c| c.as_dict_mut())
        },
    };
    match map {
        Some(map) => {
            map.insert(key.to_string(), value);
            Ok(true)
        },
        None => {
            log::warn!("Resources of {} are malformed; cannot add {}", owner.owner, key);
            Ok(false)
        },
    }
}

/// Calibrate device colour through `/Default*` colour spaces.
pub fn fix_device_colors(doc: &mut Document, ctx: &mut RuleContext<'_>, _v: &Violation) -> Result<FixOutcome> {
    let intent = ctx.ensure_intent(doc)?;
    let plan: Vec<(ResourceOwner, Vec<ColorModel>)> = validators::resource_owners(doc)
        .into_iter()
        .filter_map(|owner| {
            let models: Vec<ColorModel> = validators::uncalibrated_usage(doc, &owner)
                .models()
                .into_iter()
                .filter(|m| !validators::covered_by_intent(Some(intent), *m))
                .collect();
            (!models.is_empty()).then_some((owner, models))
        })
        .collect();

    let mut changed = 0;
    for (owner, models) in plan {
        for model in models {
            let profile = ctx.calibrated_profile(doc, model)?;
            if add_colorspace(doc, &owner, default_key(model), iccbased(profile))? {
                changed += 1;
            }
        }
    }
    Ok(outcome(changed, |n| format!("added {} default colour space(s)", n)))
}

/// Swap device alternates of Separation and DeviceN spaces for ICC-based ones.
pub fn fix_alternate_spaces(doc: &mut Document, ctx: &mut RuleContext<'_>, _v: &Violation) -> Result<FixOutcome> {
    let intent = ctx.ensure_intent(doc)?;
    let mut needed = Vec::new();
    for r in doc.reachable() {
        let Some(obj) = doc.get(r) else { continue };
        let mut stack = vec![obj];
        while let Some(o) = stack.pop() {
            match o {
                Object::Array(items) => {
                    if let Some(model) = validators::device_alternate(doc, items) {
                        if !validators::covered_by_intent(Some(intent), model) && !needed.contains(&model) {
                            needed.push(model);
                        }
                    }
                    stack.extend(items.iter());
                },
                Object::Dictionary(d) | Object::Stream { dict: d, .. } => stack.extend(d.values()),
                _ => {},
            }
        }
    }
    if needed.is_empty() {
        return Ok(FixOutcome::AlreadyFixed);
    }

    let mut profiles = HashMap::new();
    for model in needed {
        profiles.insert(model, ctx.calibrated_profile(doc, model)?);
    }

    let mut changed = 0;
    for r in doc.reachable() {
        let Some(obj) = doc.get_mut(r) else { continue };
        let touched = rewrite_arrays(obj, &mut |items| {
            let separation = matches!(
                items.first().and_then(|f| f.as_name()),
                Some("Separation") | Some("DeviceN")
            );
            let model = items
                .get(2)
                .and_then(|a| a.as_name())
                .and_then(ColorModel::from_device_space);
            match (separation, model.and_then(|m| profiles.get(&m))) {
                (true, Some(profile)) => {
                    items[2] = iccbased(*profile);
                    true
                },
                _ => false,
            }
        });
        if touched {
            changed += 1;
        }
    }
    Ok(outcome(changed, |n| format!("calibrated alternates in {} object(s)", n)))
}

/// Write the XMP packet and synchronize the Info dictionary.
pub fn fix_metadata(doc: &mut Document, ctx: &mut RuleContext<'_>, _v: &Violation) -> Result<FixOutcome> {
    if validators::check_metadata(doc, ctx).is_empty() {
        return Ok(FixOutcome::AlreadyFixed);
    }
    let stream = embed_metadata(doc, ctx.standard, ctx.identity)?;
    Ok(FixOutcome::Fixed(format!("wrote XMP metadata stream {}", stream)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::types::{PdfAStandard, ViolationCode};
    use crate::object::ObjectRef;
    use std::collections::BTreeMap;

    fn doc_with(extra: Vec<(ObjectRef, Object)>, page_extra: Vec<(&str, Object)>) -> Document {
        let mut objects = BTreeMap::new();
        objects.insert(
            ObjectRef::new(1, 0),
            Object::dictionary(vec![
                ("Type", Object::name("Catalog")),
                ("Pages", Object::Reference(ObjectRef::new(2, 0))),
            ]),
        );
        objects.insert(
            ObjectRef::new(2, 0),
            Object::dictionary(vec![
                ("Type", Object::name("Pages")),
                ("Kids", Object::Array(vec![Object::Reference(ObjectRef::new(3, 0))])),
                ("Count", Object::Integer(1)),
            ]),
        );
        let mut page = vec![
            ("Type", Object::name("Page")),
            ("Parent", Object::Reference(ObjectRef::new(2, 0))),
            (
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(612),
                    Object::Integer(792),
                ]),
            ),
            ("Contents", Object::Reference(ObjectRef::new(4, 0))),
        ];
        page.extend(page_extra);
        objects.insert(ObjectRef::new(3, 0), Object::dictionary(page));
        objects.insert(
            ObjectRef::new(4, 0),
            Object::stream(Dict::new(), b"0 0 1 rg 0 0 10 10 re f".to_vec()),
        );
        for (r, o) in extra {
            objects.insert(r, o);
        }
        let mut trailer = Dict::new();
        trailer.insert("Root".to_string(), Object::Reference(ObjectRef::new(1, 0)));
        Document::from_parts((1, 7), trailer, objects).unwrap()
    }

    /// LZW data using only 9-bit literal codes between a clear and an EOD code.
    fn lzw_literals(data: &[u8]) -> Vec<u8> {
        let codes: Vec<u16> = std::iter::once(256)
            .chain(data.iter().map(|b| *b as u16))
            .chain(std::iter::once(257))
            .collect();
        let mut out = Vec::new();
        let (mut acc, mut bits) = (0u32, 0u32);
        for code in codes {
            acc = (acc << 9) | code as u32;
            bits += 9;
            while bits >= 8 {
                bits -= 8;
                out.push((acc >> bits) as u8);
                acc &= (1 << bits) - 1;
            }
        }
        if bits > 0 {
            out.push((acc << (8 - bits)) as u8);
        }
        out
    }

    fn violation(code: ViolationCode) -> Violation {
        Violation::new(code, "test")
    }

    #[test]
    fn test_file_structure_adds_id_and_lowers_version() {
        let mut doc = doc_with(vec![], vec![]);
        let mut ctx = RuleContext::new(PdfAStandard::A1B);
        let out = fix_file_structure(&mut doc, &mut ctx, &violation(ViolationCode::MissingFileIdentifier)).unwrap();
        assert!(matches!(out, FixOutcome::Fixed(_)));
        assert_eq!(doc.version(), (1, 4));
        let id = doc.trailer().get("ID").and_then(|i| i.as_array()).unwrap();
        assert_eq!(id.len(), 2);
        assert_eq!(id[0].as_string().unwrap().len(), 16);

        let again = fix_file_structure(&mut doc, &mut ctx, &violation(ViolationCode::MissingFileIdentifier)).unwrap();
        assert_eq!(again, FixOutcome::AlreadyFixed);
    }

    #[test]
    fn test_actions_removed() {
        let js = ObjectRef::new(10, 0);
        let annot = ObjectRef::new(11, 0);
        let mut doc = doc_with(
            vec![
                (
                    js,
                    Object::dictionary(vec![
                        ("S", Object::name("JavaScript")),
                        ("JS", Object::text("app.alert(1)")),
                    ]),
                ),
                (
                    annot,
                    Object::dictionary(vec![
                        ("Type", Object::name("Annot")),
                        ("Subtype", Object::name("Link")),
                        ("F", Object::Integer(4)),
                        ("A", Object::Reference(js)),
                        ("AA", Object::Dictionary(Dict::new())),
                    ]),
                ),
            ],
            vec![("Annots", Object::Array(vec![Object::Reference(annot)]))],
        );
        let mut ctx = RuleContext::new(PdfAStandard::A2B);
        let before = validators::check_actions(&doc, &ctx);
        assert!(before.iter().any(|v| v.code == ViolationCode::ForbiddenAction));
        assert!(before.iter().any(|v| v.code == ViolationCode::AdditionalActionsNotAllowed));

        let out = fix_actions(&mut doc, &mut ctx, &before[0]).unwrap();
        assert!(matches!(out, FixOutcome::Fixed(_)));
        let dict = doc.get(annot).unwrap().as_dict().unwrap();
        assert!(!dict.contains_key("A"));
        assert!(!dict.contains_key("AA"));
        assert!(validators::check_actions(&doc, &ctx).is_empty());
        assert_eq!(fix_actions(&mut doc, &mut ctx, &before[0]).unwrap(), FixOutcome::AlreadyFixed);
    }

    #[test]
    fn test_named_action_allow_list() {
        let next = Object::dictionary(vec![("S", Object::name("Named")), ("N", Object::name("NextPage"))]);
        let print = Object::dictionary(vec![("S", Object::name("Named")), ("N", Object::name("Print"))]);
        assert!(validators::forbidden_action(next.as_dict().unwrap(), 1).is_none());
        assert_eq!(validators::forbidden_action(print.as_dict().unwrap(), 2).as_deref(), Some("Named"));
        let hide = Object::dictionary(vec![("S", Object::name("Hide"))]);
        assert!(validators::forbidden_action(hide.as_dict().unwrap(), 1).is_some());
        assert!(validators::forbidden_action(hide.as_dict().unwrap(), 2).is_none());
    }

    #[test]
    fn test_annotations_normalized_and_removed() {
        let text = ObjectRef::new(10, 0);
        let sound = ObjectRef::new(11, 0);
        let rect = Object::Array(vec![
            Object::Integer(10),
            Object::Integer(10),
            Object::Integer(50),
            Object::Integer(30),
        ]);
        let mut doc = doc_with(
            vec![
                (
                    text,
                    Object::dictionary(vec![
                        ("Subtype", Object::name("Text")),
                        ("Rect", rect.clone()),
                        ("F", Object::Integer(2)),
                    ]),
                ),
                (
                    sound,
                    Object::dictionary(vec![("Subtype", Object::name("Sound")), ("Rect", rect)]),
                ),
            ],
            vec![(
                "Annots",
                Object::Array(vec![Object::Reference(text), Object::Reference(sound)]),
            )],
        );
        let mut ctx = RuleContext::new(PdfAStandard::A2B);
        let found = validators::check_annotations(&doc, &ctx);
        assert!(found.iter().any(|v| v.code == ViolationCode::ForbiddenAnnotation));
        assert!(found.iter().any(|v| v.code == ViolationCode::InvalidAnnotationFlags));
        assert!(found.iter().any(|v| v.code == ViolationCode::MissingAppearanceStream));

        fix_annotations(&mut doc, &mut ctx, &found[0]).unwrap();
        assert!(validators::check_annotations(&doc, &ctx).is_empty());
        let page = doc.pages()[0];
        assert_eq!(validators::page_annotations(&doc, page).len(), 1);
        let dict = doc.get(text).unwrap().as_dict().unwrap();
        assert_eq!(dict.get("F").and_then(|f| f.as_integer()), Some(AnnotationFlags::PRINT.bits() as i64));
    }

    #[test]
    fn test_transfer_functions_in_inline_gstate() {
        let gs = Object::dictionary(vec![
            ("Type", Object::name("ExtGState")),
            ("TR", Object::name("Identity")),
            ("TR2", Object::name("Identity")),
        ]);
        let resources = Object::dictionary(vec![(
            "ExtGState",
            Object::dictionary(vec![("GS0", gs)]),
        )]);
        let mut doc = doc_with(vec![], vec![("Resources", resources)]);
        let mut ctx = RuleContext::new(PdfAStandard::A1B);
        let found = validators::check_transfer_functions(&doc, &ctx);
        assert_eq!(found.len(), 1);
        fix_transfer_functions(&mut doc, &mut ctx, &found[0]).unwrap();
        assert!(validators::check_transfer_functions(&doc, &ctx).is_empty());
    }

    #[test]
    fn test_transparency_groups_dropped_alpha_kept() {
        let gs = ObjectRef::new(10, 0);
        let resources = Object::dictionary(vec![(
            "ExtGState",
            Object::dictionary(vec![("GS0", Object::Reference(gs))]),
        )]);
        let mut doc = doc_with(
            vec![(
                gs,
                Object::dictionary(vec![
                    ("ca", Object::Real(0.5)),
                    ("CA", Object::Real(1.5)),
                    ("BM", Object::name("Multiply")),
                ]),
            )],
            vec![
                ("Resources", resources),
                (
                    "Group",
                    Object::dictionary(vec![("S", Object::name("Transparency"))]),
                ),
            ],
        );
        let mut ctx = RuleContext::new(PdfAStandard::A1B);
        let found = validators::check_transparency(&doc, &ctx);
        assert_eq!(found.len(), 2);
        let group = found.iter().find(|v| v.message == "Transparency group").unwrap();
        let gstate = found.iter().find(|v| v.message != "Transparency group").unwrap();

        assert!(matches!(
            fix_transparency(&mut doc, &mut ctx, group).unwrap(),
            FixOutcome::Fixed(_)
        ));
        assert!(matches!(
            fix_transparency(&mut doc, &mut ctx, gstate).unwrap(),
            FixOutcome::Unfixable(_)
        ));

        let page = doc.get(ObjectRef::new(3, 0)).unwrap().as_dict().unwrap();
        assert!(!page.contains_key("Group"));
        let dict = doc.get(gs).unwrap().as_dict().unwrap();
        assert_eq!(dict.get("ca").and_then(|c| c.as_number()), Some(0.5));
        assert_eq!(dict.get("CA").and_then(|c| c.as_number()), Some(1.0));
        assert_eq!(dict.get("BM").and_then(|b| b.as_name()), Some("Multiply"));
        assert_eq!(validators::check_transparency(&doc, &ctx).len(), 1);
    }

    #[test]
    fn test_lzw_reencoded_as_flate() {
        let payload = b"BT /F1 12 Tf (hello) Tj ET".to_vec();
        let encoded = lzw_literals(&payload);
        let stream_ref = ObjectRef::new(10, 0);
        let mut dict = Dict::new();
        dict.insert("Filter".to_string(), Object::name("LZWDecode"));
        let mut doc = doc_with(
            vec![(stream_ref, Object::stream(dict, encoded))],
            vec![("PieceInfo", Object::Reference(stream_ref))],
        );
        let mut ctx = RuleContext::new(PdfAStandard::A1B);
        let found = validators::check_lzw(&doc, &ctx);
        assert_eq!(found.len(), 1);
        fix_lzw(&mut doc, &mut ctx, &found[0]).unwrap();
        let stream = doc.get(stream_ref).unwrap();
        assert_eq!(stream.filters(), vec!["FlateDecode".to_string()]);
        assert_eq!(stream.decode_stream_data().unwrap(), payload);
    }

    #[test]
    fn test_device_colors_get_default_space() {
        let mut doc = doc_with(vec![], vec![]);
        let mut ctx = RuleContext::new(PdfAStandard::A2B);
        let cmyk = icc::cmyk_profile().unwrap();
        let mut ctx_cmyk = RuleContext::new(PdfAStandard::A2B).with_icc_profile(Some(&cmyk));

        let found = validators::check_device_colors(&doc, &ctx);
        assert_eq!(found.len(), 1);

        fix_output_intent(&mut doc, &mut ctx_cmyk, &violation(ViolationCode::MissingOutputIntent)).unwrap();
        let found = validators::check_device_colors(&doc, &ctx);
        assert_eq!(found.len(), 1, "RGB content under a CMYK intent");

        fix_device_colors(&mut doc, &mut ctx, &found[0]).unwrap();
        assert!(validators::check_device_colors(&doc, &ctx).is_empty());
        let page = doc.pages()[0];
        let spaces = doc
            .page_resources(page)
            .and_then(|r| r.get("ColorSpace"))
            .and_then(|c| c.as_dict())
            .unwrap();
        assert!(spaces.contains_key("DefaultRGB"));
    }

    #[test]
    fn test_structure_synthesized() {
        let mut doc = doc_with(vec![], vec![]);
        let mut ctx = RuleContext::new(PdfAStandard::A1A).with_default_language("de-DE");
        assert_eq!(validators::check_structure(&doc, &ctx).len(), 3);
        fix_structure(&mut doc, &mut ctx, &violation(ViolationCode::MissingDocumentStructure)).unwrap();
        assert!(validators::check_structure(&doc, &ctx).is_empty());

        let catalog = doc.catalog().unwrap();
        assert_eq!(catalog.get("Lang").and_then(|l| l.as_text()).as_deref(), Some("de-DE"));
        let page = doc.pages()[0];
        let contents = doc.page_contents(page);
        assert_eq!(contents.len(), 3);
        let first = doc.get(contents[0]).unwrap().decode_stream_data().unwrap();
        assert!(first.starts_with(b"/P <</MCID 0>> BDC"));
    }

    #[test]
    fn test_embedded_files_removed_for_part_one() {
        use crate::embedder::attachments::{attach, EmbeddedFile};
        let mut doc = doc_with(vec![], vec![]);
        attach(&mut doc, &EmbeddedFile::new("data.csv", b"a,b".to_vec())).unwrap();
        let mut ctx = RuleContext::new(PdfAStandard::A1B);
        let found = validators::check_embedded_files(&doc, &ctx);
        assert_eq!(found.len(), 1);
        fix_embedded_files(&mut doc, &mut ctx, &found[0]).unwrap();
        assert!(embedded_file_specs(&doc).is_empty());
    }

    #[test]
    fn test_missing_font_is_unfixable() {
        let font = ObjectRef::new(10, 0);
        let mut doc = doc_with(
            vec![(
                font,
                Object::dictionary(vec![
                    ("Type", Object::name("Font")),
                    ("Subtype", Object::name("TrueType")),
                    ("BaseFont", Object::name("NoSuchFont")),
                ]),
            )],
            vec![(
                "Resources",
                Object::dictionary(vec![(
                    "Font",
                    Object::dictionary(vec![("F1", Object::Reference(font))]),
                )]),
            )],
        );
        let mut ctx = RuleContext::new(PdfAStandard::A2B);
        let found = validators::check_fonts(&doc, &ctx);
        assert_eq!(found.len(), 1);
        let out = fix_fonts(&mut doc, &mut ctx, &found[0]).unwrap();
        assert!(matches!(out, FixOutcome::Unfixable(_)));
    }
}
