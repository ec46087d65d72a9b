//! Embedded files (associated files) for PDF/A-3.
//!
//! Files are stored in the catalog `/Names /EmbeddedFiles` name tree. PDF/A-3
//! (ISO 19005-3, 6.8) also requires every file specification to state its
//! `/AFRelationship`, the embedded stream to carry a MIME `/Subtype`, and the
//! specification to be listed in an `/AF` array.

use crate::document::Document;
use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectRef};
use md5::{Digest, Md5};
use std::collections::HashSet;
use std::str::FromStr;

/// MIME type used when a file declares none.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Bound on name tree depth when collecting file specifications.
const MAX_NAME_TREE_DEPTH: usize = 32;

/// A file to attach to the output.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedFile {
    /// The file name (used as the key in the EmbeddedFiles name tree)
    pub name: String,
    /// The file data
    pub data: Vec<u8>,
    /// Optional description of the file
    pub description: Option<String>,
    /// MIME type of the file (e.g., "application/xml")
    pub mime_type: Option<String>,
    /// Modification date as a PDF date string
    pub modification_date: Option<String>,
    /// Relationship of the file to the document
    pub af_relationship: AFRelationship,
}

/// Associated file relationship (ISO 32000-2, 14.13).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AFRelationship {
    /// The file is the original source
    Source,
    /// The file contains data referenced by the document
    Data,
    /// An alternative representation
    Alternative,
    /// Supplementary data
    Supplement,
    /// Encrypted payload (for protected content)
    EncryptedPayload,
    /// A form data file
    FormData,
    /// A schema definition
    Schema,
    /// Unspecified relationship
    #[default]
    Unspecified,
}

impl AFRelationship {
    /// Get the PDF name for this relationship.
    pub fn pdf_name(&self) -> &'static str {
        match self {
            AFRelationship::Source => "Source",
            AFRelationship::Data => "Data",
            AFRelationship::Alternative => "Alternative",
            AFRelationship::Supplement => "Supplement",
            AFRelationship::EncryptedPayload => "EncryptedPayload",
            AFRelationship::FormData => "FormData",
            AFRelationship::Schema => "Schema",
            AFRelationship::Unspecified => "Unspecified",
        }
    }
}

impl FromStr for AFRelationship {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "source" => Ok(AFRelationship::Source),
            "data" => Ok(AFRelationship::Data),
            "alternative" => Ok(AFRelationship::Alternative),
            "supplement" => Ok(AFRelationship::Supplement),
            "encryptedpayload" => Ok(AFRelationship::EncryptedPayload),
            "formdata" => Ok(AFRelationship::FormData),
            "schema" => Ok(AFRelationship::Schema),
            "unspecified" => Ok(AFRelationship::Unspecified),
            other => Err(Error::InvalidArgument(format!(
                "unknown AFRelationship '{}'",
                other
            ))),
        }
    }
}

impl EmbeddedFile {
    /// Create a new embedded file.
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
            description: None,
            mime_type: None,
            modification_date: None,
            af_relationship: AFRelationship::default(),
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the MIME type.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Set the modification date (PDF date string).
    pub fn with_modification_date(mut self, date: impl Into<String>) -> Self {
        self.modification_date = Some(date.into());
        self
    }

    /// Set the AF relationship.
    pub fn with_af_relationship(mut self, relationship: AFRelationship) -> Self {
        self.af_relationship = relationship;
        self
    }

    /// Build the embedded file stream.
    pub fn to_stream(&self) -> Object {
        let mut params = Dict::new();
        params.insert("Size".to_string(), Object::Integer(self.data.len() as i64));
        params.insert("CheckSum".to_string(), Object::String(checksum(&self.data)));
        if let Some(ref date) = self.modification_date {
            params.insert("ModDate".to_string(), Object::text(date));
        }

        let mut dict = Dict::new();
        dict.insert("Type".to_string(), Object::name("EmbeddedFile"));
        dict.insert(
            "Subtype".to_string(),
            Object::name(self.mime_type.as_deref().unwrap_or(DEFAULT_MIME_TYPE)),
        );
        dict.insert("Params".to_string(), Object::Dictionary(params));
        Object::stream(dict, self.data.clone())
    }

    /// Build the file specification referencing `stream`.
    pub fn to_filespec(&self, stream: ObjectRef) -> Object {
        let mut dict = Dict::new();
        dict.insert("Type".to_string(), Object::name("Filespec"));
        dict.insert("F".to_string(), Object::text(&self.name));
        dict.insert("UF".to_string(), Object::text(&self.name));
        if let Some(ref desc) = self.description {
            dict.insert("Desc".to_string(), Object::text(desc));
        }
        dict.insert(
            "EF".to_string(),
            Object::dictionary(vec![
                ("F", Object::Reference(stream)),
                ("UF", Object::Reference(stream)),
            ]),
        );
        dict.insert(
            "AFRelationship".to_string(),
            Object::name(self.af_relationship.pdf_name()),
        );
        Object::Dictionary(dict)
    }
}

/// MD5 digest of the file data, as stored in `/Params /CheckSum`.
pub fn checksum(data: &[u8]) -> Vec<u8> {
    let mut hasher = Md5::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Attach `file` to the document and return its file specification.
///
/// The specification is added to the `/EmbeddedFiles` name tree (kept flat and
/// sorted) and to the catalog `/AF` array.
pub fn attach(doc: &mut Document, file: &EmbeddedFile) -> Result<ObjectRef> {
    let stream = doc.insert(file.to_stream());
    let spec = doc.insert(file.to_filespec(stream));

    let mut entries = embedded_file_specs(doc);
    entries.retain(|(name, _)| name != &file.name);
    entries.push((file.name.clone(), spec));
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    set_embedded_files(doc, &entries)?;
    add_to_af(doc, spec)?;

    log::info!(
        "Attached '{}' ({} bytes, {})",
        file.name,
        file.data.len(),
        file.af_relationship.pdf_name()
    );
    Ok(spec)
}

/// Collect `(name, file specification)` pairs from the `/EmbeddedFiles` name tree.
///
/// Entries whose value is an inline dictionary rather than a reference are skipped.
pub fn embedded_file_specs(doc: &Document) -> Vec<(String, ObjectRef)> {
    let mut out = Vec::new();
    let Some(root) = doc
        .catalog()
        .and_then(|c| doc.lookup(c, "Names"))
        .and_then(|n| doc.resolve_dict(n))
        .and_then(|n| n.get("EmbeddedFiles"))
    else {
        return out;
    };
    let mut visited = HashSet::new();
    collect_name_tree(doc, root, 0, &mut visited, &mut out);
    out
}

fn collect_name_tree(
    doc: &Document,
    node: &Object,
    depth: usize,
    visited: &mut HashSet<ObjectRef>,
    out: &mut Vec<(String, ObjectRef)>,
) {
    if depth > MAX_NAME_TREE_DEPTH {
        log::warn!("Name tree deeper than {} levels; ignoring the rest", MAX_NAME_TREE_DEPTH);
        return;
    }
    if let Some(r) = node.as_reference() {
        if !visited.insert(r) {
            return;
        }
    }
    let Some(dict) = doc.resolve_dict(node) else {
        return;
    };
    if let Some(names) = doc.lookup(dict, "Names").and_then(|n| n.as_array()) {
        for pair in names.chunks(2) {
            if let [key, Object::Reference(spec)] = pair {
                let name = key.as_text().unwrap_or_default();
                out.push((name, *spec));
            }
        }
    }
    if let Some(kids) = doc.lookup(dict, "Kids").and_then(|k| k.as_array()) {
        for kid in kids {
            collect_name_tree(doc, kid, depth + 1, visited, out);
        }
    }
}

/// Replace the `/EmbeddedFiles` name tree by a flat one holding `entries`.
///
/// An empty list removes the tree.
pub fn set_embedded_files(doc: &mut Document, entries: &[(String, ObjectRef)]) -> Result<()> {
    let names_ref = doc
        .catalog()
        .and_then(|c| c.get("Names"))
        .and_then(|n| n.as_reference());

    let names_value = if entries.is_empty() {
        None
    } else {
        let mut array = Vec::with_capacity(entries.len() * 2);
        for (name, spec) in entries {
            array.push(Object::text(name));
            array.push(Object::Reference(*spec));
        }
        Some(Object::dictionary(vec![("Names", Object::Array(array))]))
    };

    let names: &mut Dict = match names_ref {
        Some(r) => doc
            .get_mut(r)
            .and_then(|o| o.as_dict_mut())
            .ok_or_else(|| Error::UnrecoverableDocument("catalog /Names is not a dictionary".to_string()))?,
        None => {
            let catalog = doc
                .catalog_mut()
                .ok_or_else(|| Error::UnrecoverableDocument("catalog is missing".to_string()))?;
            if !matches!(catalog.get("Names"), Some(Object::Dictionary(_))) {
                if names_value.is_none() {
                    return Ok(());
                }
                catalog.insert("Names".to_string(), Object::Dictionary(Dict::new()));
            }
            match catalog.get_mut("Names") {
                Some(Object::Dictionary(d)) => d,
                _ => return Ok(()),
            }
        },
    };
    match names_value {
        Some(tree) => {
            names.insert("EmbeddedFiles".to_string(), tree);
        },
        None => {
            names.remove("EmbeddedFiles");
        },
    }
    Ok(())
}

/// Append `spec` to the catalog `/AF` array unless already present.
pub fn add_to_af(doc: &mut Document, spec: ObjectRef) -> Result<()> {
    let af_ref = doc
        .catalog()
        .and_then(|c| c.get("AF"))
        .and_then(|a| a.as_reference());
    let array = match af_ref {
        Some(r) => doc.get_mut(r).and_then(|o| o.as_array_mut()),
        None => {
            let catalog = doc
                .catalog_mut()
                .ok_or_else(|| Error::UnrecoverableDocument("catalog is missing".to_string()))?;
            if !matches!(catalog.get("AF"), Some(Object::Array(_))) {
                catalog.insert("AF".to_string(), Object::Array(Vec::new()));
            }
            catalog.get_mut("AF").and_then(|a| a.as_array_mut())
        },
    };
    let array = array.ok_or_else(|| Error::UnrecoverableDocument("/AF is not an array".to_string()))?;
    if !array.iter().any(|o| o.as_reference() == Some(spec)) {
        array.push(Object::Reference(spec));
    }
    Ok(())
}

/// The embedded file stream of a file specification.
pub fn embedded_stream(doc: &Document, spec: ObjectRef) -> Option<ObjectRef> {
    let spec = doc.get(spec)?.as_dict()?;
    let ef = doc.lookup(spec, "EF").and_then(|e| doc.resolve_dict(e))?;
    ["UF", "F"]
        .iter()
        .find_map(|key| ef.get(*key).and_then(|r| r.as_reference()))
}
