//! XMP metadata: parsing, generation and synchronization with the Info dictionary.
//!
//! PDF/A requires the catalog `/Metadata` stream to carry an XMP packet that
//! identifies the conformance level (`pdfaid:part`, `pdfaid:conformance`) and agrees
//! with the document information dictionary (ISO 19005-1, 6.7.3):
//!
//! | Info entry     | XMP property       |
//! |----------------|--------------------|
//! | `Title`        | `dc:title`         |
//! | `Author`       | `dc:creator`       |
//! | `Subject`      | `dc:description`   |
//! | `Keywords`     | `pdf:Keywords`     |
//! | `Creator`      | `xmp:CreatorTool`  |
//! | `Producer`     | `pdf:Producer`     |
//! | `CreationDate` | `xmp:CreateDate`   |
//! | `ModDate`      | `xmp:ModifyDate`   |
//!
//! [`embed_metadata`] merges both sources (the Info dictionary wins), rewrites the
//! Info dictionary and replaces the packet. Properties from namespaces PDF/A does not
//! predefine are kept and described by a `pdfaExtension` schema.

use crate::compliance::PdfAStandard;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectRef};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone};
use md5::{Digest, Md5};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeMap;

const NS_X: &str = "adobe:ns:meta/";
const NS_RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
const NS_DC: &str = "http://purl.org/dc/elements/1.1/";
const NS_XMP: &str = "http://ns.adobe.com/xap/1.0/";
const NS_PDF: &str = "http://ns.adobe.com/pdf/1.3/";
const NS_XMP_MM: &str = "http://ns.adobe.com/xap/1.0/mm/";
const NS_PDFAID: &str = "http://www.aiim.org/pdfa/ns/id/";
const NS_PDFA_EXTENSION: &str = "http://www.aiim.org/pdfa/ns/extension/";
const NS_PDFA_SCHEMA: &str = "http://www.aiim.org/pdfa/ns/schema#";
const NS_PDFA_PROPERTY: &str = "http://www.aiim.org/pdfa/ns/property#";

/// Schema prefixes predefined by XMP and PDF/A; they need no extension schema.
const PREDEFINED_PREFIXES: &[&str] = &[
    "dc",
    "xmp",
    "xmpGImg",
    "xmpRights",
    "xmpMM",
    "xmpBJ",
    "xmpTPg",
    "xmpDM",
    "xmpidq",
    "stEvt",
    "stRef",
    "stVer",
    "stJob",
    "stDim",
    "pdf",
    "photoshop",
    "tiff",
    "exif",
    "aux",
    "crs",
    "Iptc4xmpCore",
    "pdfaid",
    "pdfaExtension",
    "pdfaSchema",
    "pdfaProperty",
    "pdfaType",
    "pdfaField",
];

/// Producer written when the document names none.
pub const PRODUCER: &str = concat!("pdfa_oxide ", env!("CARGO_PKG_VERSION"));

/// XMP metadata of a document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmpMetadata {
    // Dublin Core namespace (dc:)
    /// Document title (dc:title)
    pub dc_title: Option<String>,
    /// Document creators/authors (dc:creator)
    pub dc_creator: Vec<String>,
    /// Document description (dc:description)
    pub dc_description: Option<String>,
    /// Subject keywords (dc:subject)
    pub dc_subject: Vec<String>,

    // XMP Core namespace (xmp:)
    /// Tool used to create the document (xmp:CreatorTool)
    pub xmp_creator_tool: Option<String>,
    /// Creation date (xmp:CreateDate)
    pub xmp_create_date: Option<String>,
    /// Last modification date (xmp:ModifyDate)
    pub xmp_modify_date: Option<String>,
    /// Metadata modification date (xmp:MetadataDate)
    pub xmp_metadata_date: Option<String>,

    // PDF namespace (pdf:)
    /// PDF producer (pdf:Producer)
    pub pdf_producer: Option<String>,
    /// PDF keywords (pdf:Keywords)
    pub pdf_keywords: Option<String>,

    // Media management (xmpMM:)
    /// Persistent document identifier (xmpMM:DocumentID)
    pub xmpmm_document_id: Option<String>,
    /// Identifier of this rendition (xmpMM:InstanceID)
    pub xmpmm_instance_id: Option<String>,

    // PDF/A identification (pdfaid:)
    /// Declared part (pdfaid:part)
    pub pdfaid_part: Option<String>,
    /// Declared conformance level (pdfaid:conformance)
    pub pdfaid_conformance: Option<String>,

    /// Simple properties from other namespaces, keyed `prefix:Name`.
    pub custom: BTreeMap<String, String>,
    /// Namespace URIs of the custom properties, keyed by prefix.
    pub custom_namespaces: BTreeMap<String, String>,
}

impl XmpMetadata {
    /// Create a new empty XMP metadata instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the document title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.dc_title = Some(title.into());
        self
    }

    /// Add a creator/author.
    pub fn with_creator(mut self, creator: impl Into<String>) -> Self {
        self.dc_creator.push(creator.into());
        self
    }

    /// Set the PDF/A identification.
    pub fn with_standard(mut self, standard: PdfAStandard) -> Self {
        self.pdfaid_part = Some(standard.xmp_part().to_string());
        self.pdfaid_conformance = Some(standard.xmp_conformance().to_string());
        self
    }

    /// Add a property from a custom namespace.
    pub fn with_custom(
        mut self,
        prefix: &str,
        namespace: &str,
        name: &str,
        value: impl Into<String>,
    ) -> Self {
        self.custom_namespaces
            .insert(prefix.to_string(), namespace.to_string());
        self.custom.insert(format!("{}:{}", prefix, name), value.into());
        self
    }

    /// The standard declared by the pdfaid properties, if any.
    pub fn standard(&self) -> Option<PdfAStandard> {
        PdfAStandard::from_xmp(self.pdfaid_part.as_deref()?, self.pdfaid_conformance.as_deref()?)
    }

    /// Read the packet of the catalog `/Metadata` stream.
    ///
    /// Returns `Ok(None)` when the document has no metadata stream or the stream holds
    /// no XMP packet.
    pub fn from_document(doc: &Document) -> Result<Option<Self>> {
        let Some(metadata) = doc.catalog().and_then(|c| doc.lookup(c, "Metadata")) else {
            return Ok(None);
        };
        if !metadata.is_stream() {
            return Err(Error::InvalidObjectType {
                expected: "Stream".to_string(),
                found: metadata.type_name().to_string(),
            });
        }
        let bytes = metadata.decode_stream_data()?;
        Self::parse(&String::from_utf8_lossy(&bytes))
    }

    /// Parse XMP XML content.
    pub fn parse(xml: &str) -> Result<Option<Self>> {
        let start = xml.find("<x:xmpmeta").or_else(|| xml.find("<rdf:RDF"));
        let end = xml
            .rfind("</x:xmpmeta>")
            .map(|e| e + "</x:xmpmeta>".len())
            .or_else(|| xml.rfind("</rdf:RDF>").map(|e| e + "</rdf:RDF>".len()));
        let content = match (start, end) {
            (Some(s), Some(e)) if s < e => &xml[s..e],
            _ => return Ok(None),
        };

        let mut metadata = XmpMetadata::new();
        let mut namespaces: BTreeMap<String, String> = BTreeMap::new();
        let mut reader = Reader::from_str(content);
        reader.trim_text(true);

        let mut element_stack: Vec<String> = Vec::new();
        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    collect_namespaces(&e, &mut namespaces);
                    if name == "rdf:Description" {
                        for (prop, value) in attribute_properties(&e) {
                            metadata.set_property(&prop, value);
                        }
                    }
                    element_stack.push(name);
                },
                Ok(Event::Empty(e)) => {
                    collect_namespaces(&e, &mut namespaces);
                    if e.name().as_ref() == b"rdf:Description" {
                        for (prop, value) in attribute_properties(&e) {
                            metadata.set_property(&prop, value);
                        }
                    }
                },
                Ok(Event::Text(e)) => {
                    let text = e.unescape().unwrap_or_default().trim().to_string();
                    if text.is_empty() {
                        continue;
                    }
                    // Extension schema descriptions are regenerated, never read back.
                    if element_stack.iter().any(|el| el.starts_with("pdfaExtension:")) {
                        continue;
                    }
                    let property = element_stack
                        .iter()
                        .rev()
                        .find(|el| !el.starts_with("rdf:") && !el.starts_with("x:"))
                        .cloned();
                    if let Some(prop) = property {
                        metadata.set_property(&prop, text);
                    }
                },
                Ok(Event::End(_)) => {
                    element_stack.pop();
                },
                Ok(Event::Eof) => break,
                Err(e) => {
                    log::warn!("XMP parsing error: {:?}", e);
                    break;
                },
                _ => {},
            }
        }

        let prefixes: Vec<String> = metadata
            .custom
            .keys()
            .filter_map(|k| k.split_once(':').map(|(p, _)| p.to_string()))
            .collect();
        for prefix in prefixes {
            match namespaces.get(&prefix) {
                Some(uri) => {
                    metadata.custom_namespaces.insert(prefix, uri.clone());
                },
                None => {
                    log::warn!("Dropping XMP properties of undeclared prefix '{}'", prefix);
                    metadata.custom.retain(|k, _| !k.starts_with(&format!("{}:", prefix)));
                },
            }
        }

        Ok(Some(metadata))
    }

    fn set_property(&mut self, prop: &str, text: String) {
        match prop {
            // Dublin Core
            "dc:title" => {
                if self.dc_title.is_none() {
                    self.dc_title = Some(text);
                }
            },
            "dc:creator" => self.dc_creator.push(text),
            "dc:description" => {
                if self.dc_description.is_none() {
                    self.dc_description = Some(text);
                }
            },
            "dc:subject" => self.dc_subject.push(text),

            // XMP Core
            "xmp:CreatorTool" => self.xmp_creator_tool = Some(text),
            "xmp:CreateDate" => self.xmp_create_date = Some(text),
            "xmp:ModifyDate" => self.xmp_modify_date = Some(text),
            "xmp:MetadataDate" => self.xmp_metadata_date = Some(text),

            // PDF namespace
            "pdf:Producer" => self.pdf_producer = Some(text),
            "pdf:Keywords" => self.pdf_keywords = Some(text),

            "xmpMM:DocumentID" => self.xmpmm_document_id = Some(text),
            "xmpMM:InstanceID" => self.xmpmm_instance_id = Some(text),

            "pdfaid:part" => self.pdfaid_part = Some(text),
            "pdfaid:conformance" => self.pdfaid_conformance = Some(text),

            _ => {
                let Some((prefix, _)) = prop.split_once(':') else {
                    return;
                };
                if PREDEFINED_PREFIXES.contains(&prefix) {
                    log::debug!("Not carrying over XMP property {}", prop);
                } else {
                    self.custom.entry(prop.to_string()).or_insert(text);
                }
            },
        }
    }
}

fn collect_namespaces(e: &BytesStart<'_>, namespaces: &mut BTreeMap<String, String>) {
    for attr in e.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        if let Some(prefix) = key.strip_prefix("xmlns:") {
            if let Ok(value) = attr.unescape_value() {
                namespaces.insert(prefix.to_string(), value.to_string());
            }
        }
    }
}

/// Properties written in attribute form on `rdf:Description`.
fn attribute_properties(e: &BytesStart<'_>) -> Vec<(String, String)> {
    e.attributes()
        .flatten()
        .filter_map(|attr| {
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
            if key.starts_with("xmlns") || key.starts_with("rdf:") || key.starts_with("xml:") {
                return None;
            }
            let value = attr.unescape_value().ok()?.trim().to_string();
            (!value.is_empty()).then_some((key, value))
        })
        .collect()
}

/// XMP packet writer.
pub struct XmpWriter {
    metadata: XmpMetadata,
}

impl XmpWriter {
    /// Create a new XMP writer from metadata.
    pub fn new(metadata: XmpMetadata) -> Self {
        Self { metadata }
    }

    /// Build the XMP packet as an XML string.
    pub fn build(self) -> String {
        self.to_xml()
    }

    /// Build the XMP packet as bytes.
    pub fn build_bytes(self) -> Vec<u8> {
        self.to_xml().into_bytes()
    }

    fn to_xml(&self) -> String {
        let m = &self.metadata;
        let mut xml = String::new();

        xml.push_str("<?xpacket begin=\"\u{feff}\" id=\"W5M0MpCehiHzreSzNTczkc9d\"?>\n");
        xml.push_str(&format!("<x:xmpmeta xmlns:x=\"{}\">\n", NS_X));
        xml.push_str(&format!("  <rdf:RDF xmlns:rdf=\"{}\">\n", NS_RDF));

        xml.push_str("    <rdf:Description rdf:about=\"\"\n");
        xml.push_str(&format!("        xmlns:dc=\"{}\"\n", NS_DC));
        xml.push_str(&format!("        xmlns:xmp=\"{}\"\n", NS_XMP));
        xml.push_str(&format!("        xmlns:pdf=\"{}\"\n", NS_PDF));
        xml.push_str(&format!("        xmlns:xmpMM=\"{}\"\n", NS_XMP_MM));
        for (prefix, uri) in &m.custom_namespaces {
            xml.push_str(&format!("        xmlns:{}=\"{}\"\n", prefix, escape_xml(uri)));
        }
        xml.push_str(&format!("        xmlns:pdfaid=\"{}\">\n", NS_PDFAID));

        if let Some(title) = &m.dc_title {
            push_lang_alt(&mut xml, "dc:title", title);
        }
        if !m.dc_creator.is_empty() {
            push_array(&mut xml, "dc:creator", "rdf:Seq", &m.dc_creator);
        }
        if let Some(desc) = &m.dc_description {
            push_lang_alt(&mut xml, "dc:description", desc);
        }
        if !m.dc_subject.is_empty() {
            push_array(&mut xml, "dc:subject", "rdf:Bag", &m.dc_subject);
        }

        push_simple(&mut xml, "xmp:CreatorTool", m.xmp_creator_tool.as_deref());
        push_simple(&mut xml, "xmp:CreateDate", m.xmp_create_date.as_deref());
        push_simple(&mut xml, "xmp:ModifyDate", m.xmp_modify_date.as_deref());
        push_simple(&mut xml, "xmp:MetadataDate", m.xmp_metadata_date.as_deref());
        push_simple(&mut xml, "pdf:Producer", m.pdf_producer.as_deref());
        push_simple(&mut xml, "pdf:Keywords", m.pdf_keywords.as_deref());
        push_simple(&mut xml, "xmpMM:DocumentID", m.xmpmm_document_id.as_deref());
        push_simple(&mut xml, "xmpMM:InstanceID", m.xmpmm_instance_id.as_deref());
        for (key, value) in &m.custom {
            push_simple(&mut xml, key, Some(value));
        }
        push_simple(&mut xml, "pdfaid:part", m.pdfaid_part.as_deref());
        push_simple(&mut xml, "pdfaid:conformance", m.pdfaid_conformance.as_deref());
        xml.push_str("    </rdf:Description>\n");

        if !m.custom_namespaces.is_empty() {
            self.push_extension_schemas(&mut xml);
        }

        xml.push_str("  </rdf:RDF>\n");
        xml.push_str("</x:xmpmeta>\n");

        // 2KB of padding for in-place editing
        for _ in 0..40 {
            xml.push_str("                                                  \n");
        }
        xml.push_str("<?xpacket end=\"w\"?>");
        xml
    }

    fn push_extension_schemas(&self, xml: &mut String) {
        let m = &self.metadata;
        xml.push_str("    <rdf:Description rdf:about=\"\"\n");
        xml.push_str(&format!("        xmlns:pdfaExtension=\"{}\"\n", NS_PDFA_EXTENSION));
        xml.push_str(&format!("        xmlns:pdfaSchema=\"{}\"\n", NS_PDFA_SCHEMA));
        xml.push_str(&format!("        xmlns:pdfaProperty=\"{}\">\n", NS_PDFA_PROPERTY));
        xml.push_str("      <pdfaExtension:schemas>\n");
        xml.push_str("        <rdf:Bag>\n");
        for (prefix, uri) in &m.custom_namespaces {
            xml.push_str("          <rdf:li rdf:parseType=\"Resource\">\n");
            xml.push_str(&format!(
                "            <pdfaSchema:schema>{} properties</pdfaSchema:schema>\n",
                escape_xml(prefix)
            ));
            xml.push_str(&format!(
                "            <pdfaSchema:namespaceURI>{}</pdfaSchema:namespaceURI>\n",
                escape_xml(uri)
            ));
            xml.push_str(&format!(
                "            <pdfaSchema:prefix>{}</pdfaSchema:prefix>\n",
                escape_xml(prefix)
            ));
            xml.push_str("            <pdfaSchema:property>\n");
            xml.push_str("              <rdf:Seq>\n");
            let own = format!("{}:", prefix);
            for key in m.custom.keys().filter(|k| k.starts_with(&own)) {
                let name = &key[own.len()..];
                xml.push_str("                <rdf:li rdf:parseType=\"Resource\">\n");
                xml.push_str(&format!(
                    "                  <pdfaProperty:name>{}</pdfaProperty:name>\n",
                    escape_xml(name)
                ));
                xml.push_str("                  <pdfaProperty:valueType>Text</pdfaProperty:valueType>\n");
                xml.push_str("                  <pdfaProperty:category>external</pdfaProperty:category>\n");
                xml.push_str(&format!(
                    "                  <pdfaProperty:description>{}</pdfaProperty:description>\n",
                    escape_xml(name)
                ));
                xml.push_str("                </rdf:li>\n");
            }
            xml.push_str("              </rdf:Seq>\n");
            xml.push_str("            </pdfaSchema:property>\n");
            xml.push_str("          </rdf:li>\n");
        }
        xml.push_str("        </rdf:Bag>\n");
        xml.push_str("      </pdfaExtension:schemas>\n");
        xml.push_str("    </rdf:Description>\n");
    }
}

fn push_simple(xml: &mut String, element: &str, value: Option<&str>) {
    if let Some(value) = value {
        xml.push_str(&format!("      <{0}>{1}</{0}>\n", element, escape_xml(value)));
    }
}

fn push_lang_alt(xml: &mut String, element: &str, value: &str) {
    xml.push_str(&format!("      <{}>\n", element));
    xml.push_str("        <rdf:Alt>\n");
    xml.push_str(&format!(
        "          <rdf:li xml:lang=\"x-default\">{}</rdf:li>\n",
        escape_xml(value)
    ));
    xml.push_str("        </rdf:Alt>\n");
    xml.push_str(&format!("      </{}>\n", element));
}

fn push_array(xml: &mut String, element: &str, container: &str, values: &[String]) {
    xml.push_str(&format!("      <{}>\n", element));
    xml.push_str(&format!("        <{}>\n", container));
    for value in values {
        xml.push_str(&format!("          <rdf:li>{}</rdf:li>\n", escape_xml(value)));
    }
    xml.push_str(&format!("        </{}>\n", container));
    xml.push_str(&format!("      </{}>\n", element));
}

/// Escape special XML characters.
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Parse a PDF date string (`D:YYYYMMDDHHmmSSOHH'mm'`, trailing fields optional).
pub fn parse_pdf_date(s: &str) -> Option<DateTime<FixedOffset>> {
    let s = s.trim();
    let s = s.strip_prefix("D:").unwrap_or(s);
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.len() < 4 {
        return None;
    }
    let field = |from: usize, len: usize, default: u32| -> u32 {
        digits
            .get(from..from + len)
            .and_then(|f| f.parse().ok())
            .unwrap_or(default)
    };
    let year = digits.get(0..4)?.parse::<i32>().ok()?;
    let date = NaiveDate::from_ymd_opt(year, field(4, 2, 1), field(6, 2, 1))?;
    let time = date.and_hms_opt(field(8, 2, 0), field(10, 2, 0), field(12, 2, 0))?;

    let rest = &s[digits.len()..];
    let offset_secs = match rest.chars().next() {
        Some(sign @ ('+' | '-')) => {
            let tz: String = rest[1..].chars().filter(|c| c.is_ascii_digit()).collect();
            let hours: i32 = tz.get(0..2).and_then(|h| h.parse().ok()).unwrap_or(0);
            let minutes: i32 = tz.get(2..4).and_then(|m| m.parse().ok()).unwrap_or(0);
            let secs = hours * 3600 + minutes * 60;
            if sign == '-' {
                -secs
            } else {
                secs
            }
        },
        _ => 0,
    };
    FixedOffset::east_opt(offset_secs)?
        .from_local_datetime(&time)
        .single()
}

/// Parse an XMP (ISO 8601) date, accepting the reduced precisions XMP allows.
pub fn parse_xmp_date(s: &str) -> Option<DateTime<FixedOffset>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M%:z") {
        return Some(dt);
    }
    let utc = FixedOffset::east_opt(0)?;
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .or_else(|| NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d").ok())
                .or_else(|| NaiveDate::parse_from_str(&format!("{}-01-01", s), "%Y-%m-%d").ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    utc.from_local_datetime(&naive).single()
}

/// Format a date the way XMP writes it.
pub fn format_xmp_date(dt: &DateTime<FixedOffset>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Format a date the way the Info dictionary writes it.
pub fn format_pdf_date(dt: &DateTime<FixedOffset>) -> String {
    let offset = dt.offset().local_minus_utc();
    let zone = if offset == 0 {
        "Z".to_string()
    } else {
        let sign = if offset < 0 { '-' } else { '+' };
        let abs = offset.abs();
        format!("{}{:02}'{:02}'", sign, abs / 3600, (abs % 3600) / 60)
    };
    format!("D:{}{}", dt.format("%Y%m%d%H%M%S"), zone)
}

/// Convert a PDF date string to its XMP form.
pub fn pdf_date_to_xmp(s: &str) -> Option<String> {
    parse_pdf_date(s).map(|dt| format_xmp_date(&dt))
}

/// Convert an XMP date to its PDF form.
pub fn xmp_date_to_pdf(s: &str) -> Option<String> {
    parse_xmp_date(s).map(|dt| format_pdf_date(&dt))
}

/// Text entries of the Info dictionary paired with their XMP fields.
#[derive(Debug, Clone, Default, PartialEq)]
struct InfoFields {
    title: Option<String>,
    author: Option<String>,
    subject: Option<String>,
    keywords: Option<String>,
    creator: Option<String>,
    producer: Option<String>,
    creation_date: Option<String>,
    mod_date: Option<String>,
}

impl InfoFields {
    fn read(doc: &Document) -> Self {
        let Some(info) = doc.info() else {
            return Self::default();
        };
        let text = |key: &str| {
            doc.lookup(info, key)
                .and_then(|v| v.as_text())
                .map(|t| t.trim_end_matches('\0').to_string())
                .filter(|t| !t.is_empty())
        };
        Self {
            title: text("Title"),
            author: text("Author"),
            subject: text("Subject"),
            keywords: text("Keywords"),
            creator: text("Creator"),
            producer: text("Producer"),
            creation_date: text("CreationDate"),
            mod_date: text("ModDate"),
        }
    }
}

/// Describe every Info entry whose XMP counterpart disagrees with it.
pub fn find_info_mismatches(doc: &Document, xmp: &XmpMetadata) -> Vec<String> {
    let info = InfoFields::read(doc);
    let mut out = Vec::new();
    let mut check = |key: &str, info_value: &Option<String>, xmp_value: Option<String>| {
        if let Some(v) = info_value {
            if xmp_value.as_deref() != Some(v.as_str()) {
                out.push(format!("Info /{} is not matched by XMP", key));
            }
        }
    };
    check("Title", &info.title, xmp.dc_title.clone());
    let joined = (!xmp.dc_creator.is_empty()).then(|| xmp.dc_creator.join(", "));
    check("Author", &info.author, joined);
    check("Subject", &info.subject, xmp.dc_description.clone());
    check("Keywords", &info.keywords, xmp.pdf_keywords.clone());
    check("Creator", &info.creator, xmp.xmp_creator_tool.clone());
    check("Producer", &info.producer, xmp.pdf_producer.clone());

    let mut check_date = |key: &str, info_value: &Option<String>, xmp_value: &Option<String>| {
        if let Some(v) = info_value {
            let same = parse_pdf_date(v).is_some()
                && parse_pdf_date(v) == xmp_value.as_deref().and_then(parse_xmp_date);
            if !same {
                out.push(format!("Info /{} is not matched by XMP", key));
            }
        }
    };
    check_date("CreationDate", &info.creation_date, &xmp.xmp_create_date);
    check_date("ModDate", &info.mod_date, &xmp.xmp_modify_date);
    out
}

/// Merge Info and XMP, rewrite both, and install the packet as the catalog metadata.
///
/// The Info dictionary is authoritative; values present only in XMP are copied into
/// Info. Unparseable Info dates are replaced by the XMP date or dropped. The document
/// ID is preserved across conversions. New document and instance IDs are derived from
/// `identity` and `standard`, and dates come only from the document, so equal inputs
/// produce equal packets. Returns the metadata stream reference.
pub fn embed_metadata(doc: &mut Document, standard: PdfAStandard, identity: [u8; 16]) -> Result<ObjectRef> {
    let existing = match XmpMetadata::from_document(doc) {
        Ok(xmp) => xmp.unwrap_or_default(),
        Err(e) => {
            log::warn!("Discarding unreadable XMP metadata: {}", e);
            XmpMetadata::default()
        },
    };
    let info = InfoFields::read(doc);

    let mut xmp = XmpMetadata {
        dc_subject: existing.dc_subject.clone(),
        custom: existing.custom.clone(),
        custom_namespaces: existing.custom_namespaces.clone(),
        ..XmpMetadata::default()
    }
    .with_standard(standard);

    xmp.dc_title = info.title.clone().or(existing.dc_title);
    xmp.dc_creator = match &info.author {
        Some(author) => vec![author.clone()],
        None => existing.dc_creator,
    };
    xmp.dc_description = info.subject.clone().or(existing.dc_description);
    xmp.pdf_keywords = info.keywords.clone().or(existing.pdf_keywords);
    xmp.xmp_creator_tool = info.creator.clone().or(existing.xmp_creator_tool);
    xmp.pdf_producer = info
        .producer
        .clone()
        .or(existing.pdf_producer)
        .or_else(|| Some(PRODUCER.to_string()));

    let created = info
        .creation_date
        .as_deref()
        .and_then(parse_pdf_date)
        .or_else(|| existing.xmp_create_date.as_deref().and_then(parse_xmp_date));
    let modified = info
        .mod_date
        .as_deref()
        .and_then(parse_pdf_date)
        .or_else(|| existing.xmp_modify_date.as_deref().and_then(parse_xmp_date));
    xmp.xmp_create_date = created.as_ref().map(format_xmp_date);
    xmp.xmp_modify_date = modified.as_ref().map(format_xmp_date);
    xmp.xmp_metadata_date = modified.or(created).as_ref().map(format_xmp_date);

    xmp.xmpmm_document_id = existing
        .xmpmm_document_id
        .or_else(|| Some(format!("uuid:{}", uuid::Uuid::from_bytes(identity))));
    let mut instance = Md5::new();
    instance.update(identity);
    instance.update(standard.code().as_bytes());
    let mut instance_id = [0u8; 16];
    instance_id.copy_from_slice(&instance.finalize());
    xmp.xmpmm_instance_id = Some(format!("uuid:{}", uuid::Uuid::from_bytes(instance_id)));

    // Info mirrors the merged values.
    let mut info_dict: Dict = doc.info().cloned().unwrap_or_default();
    let mut set = |key: &str, value: Option<String>| match value {
        Some(v) => {
            info_dict.insert(key.to_string(), Object::text(&v));
        },
        None => {
            info_dict.remove(key);
        },
    };
    set("Title", xmp.dc_title.clone());
    set("Author", (!xmp.dc_creator.is_empty()).then(|| xmp.dc_creator.join(", ")));
    set("Subject", xmp.dc_description.clone());
    set("Keywords", xmp.pdf_keywords.clone());
    set("Creator", xmp.xmp_creator_tool.clone());
    set("Producer", xmp.pdf_producer.clone());
    set("CreationDate", created.as_ref().map(format_pdf_date));
    set("ModDate", modified.as_ref().map(format_pdf_date));
    // Trapped must be a name; anything else is dropped.
    if info_dict.get("Trapped").and_then(|t| t.as_name()).is_none() {
        info_dict.remove("Trapped");
    }

    match doc.trailer().get("Info").and_then(|i| i.as_reference()) {
        Some(info_ref) if doc.contains(info_ref) => {
            doc.replace(info_ref, Object::Dictionary(info_dict));
        },
        _ => {
            let info_ref = doc.insert(Object::Dictionary(info_dict));
            doc.trailer_mut()
                .insert("Info".to_string(), Object::Reference(info_ref));
        },
    }

    let packet = XmpWriter::new(xmp).build_bytes();
    let stream = Object::stream(
        [
            ("Type".to_string(), Object::name("Metadata")),
            ("Subtype".to_string(), Object::name("XML")),
        ]
        .into_iter()
        .collect(),
        packet,
    );

    let existing_ref = doc
        .catalog()
        .and_then(|c| c.get("Metadata"))
        .and_then(|m| m.as_reference())
        .filter(|r| doc.get(*r).is_some_and(|o| o.is_stream()));
    let metadata_ref = match existing_ref {
        Some(r) => {
            doc.replace(r, stream);
            r
        },
        None => doc.insert(stream),
    };
    let catalog = doc
        .catalog_mut()
        .ok_or_else(|| Error::UnrecoverableDocument("catalog is missing".to_string()))?;
    catalog.insert("Metadata".to_string(), Object::Reference(metadata_ref));
    log::info!("Embedded XMP metadata for {}", standard);
    Ok(metadata_ref)
}
