//! PDF/A compliance types and data structures.

use crate::error::{Error, ErrorKind, Result};
use crate::object::ObjectRef;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Target PDF/A standard: part and conformance level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PdfAStandard {
    /// PDF/A-1a: PDF 1.4 based, full conformance with logical structure
    A1A,
    /// PDF/A-1b: PDF 1.4 based, basic conformance (visual preservation)
    A1B,
    /// PDF/A-2a: PDF 1.7 based, full conformance
    A2A,
    /// PDF/A-2b: PDF 1.7 based, basic conformance
    A2B,
    /// PDF/A-3a: PDF/A-2a plus arbitrary embedded files
    A3A,
    /// PDF/A-3b: PDF/A-2b plus arbitrary embedded files
    A3B,
}

impl PdfAStandard {
    /// All supported standards.
    pub const ALL: [PdfAStandard; 6] = [
        PdfAStandard::A1A,
        PdfAStandard::A1B,
        PdfAStandard::A2A,
        PdfAStandard::A2B,
        PdfAStandard::A3A,
        PdfAStandard::A3B,
    ];

    /// The PDF/A part (1, 2 or 3).
    pub fn part(&self) -> u8 {
        match self {
            PdfAStandard::A1A | PdfAStandard::A1B => 1,
            PdfAStandard::A2A | PdfAStandard::A2B => 2,
            PdfAStandard::A3A | PdfAStandard::A3B => 3,
        }
    }

    /// The conformance level letter.
    pub fn conformance(&self) -> char {
        match self {
            PdfAStandard::A1A | PdfAStandard::A2A | PdfAStandard::A3A => 'A',
            PdfAStandard::A1B | PdfAStandard::A2B | PdfAStandard::A3B => 'B',
        }
    }

    /// Short code such as `2B`.
    pub fn code(&self) -> String {
        format!("{}{}", self.part(), self.conformance())
    }

    /// Check if this level requires logical structure (Tagged PDF).
    pub fn requires_structure(&self) -> bool {
        self.conformance() == 'A'
    }

    /// Check if transparency is allowed.
    pub fn allows_transparency(&self) -> bool {
        self.part() >= 2
    }

    /// Check if JPEG2000 is allowed.
    pub fn allows_jpeg2000(&self) -> bool {
        self.part() >= 2
    }

    /// Check if object streams and cross-reference streams are allowed.
    pub fn allows_object_streams(&self) -> bool {
        self.part() >= 2
    }

    /// Check if optional content is allowed.
    pub fn allows_optional_content(&self) -> bool {
        self.part() >= 2
    }

    /// Check if arbitrary embedded files are allowed.
    pub fn allows_embedded_files(&self) -> bool {
        self.part() == 3
    }

    /// Check if embedded PDF files are allowed.
    pub fn allows_embedded_pdf(&self) -> bool {
        self.part() >= 2
    }

    /// Check if OpenType (CFF-flavoured) font programs may be embedded.
    pub fn allows_opentype_fonts(&self) -> bool {
        self.part() >= 2
    }

    /// PDF version the output declares.
    pub fn pdf_version(&self) -> (u8, u8) {
        if self.part() == 1 {
            (1, 4)
        } else {
            (1, 7)
        }
    }

    /// Get the XMP pdfaid:part value.
    pub fn xmp_part(&self) -> &'static str {
        match self.part() {
            1 => "1",
            2 => "2",
            _ => "3",
        }
    }

    /// Get the XMP pdfaid:conformance value.
    pub fn xmp_conformance(&self) -> &'static str {
        if self.conformance() == 'A' {
            "A"
        } else {
            "B"
        }
    }

    /// Parse from XMP pdfaid:part and pdfaid:conformance values.
    pub fn from_xmp(part: &str, conformance: &str) -> Option<Self> {
        match (part.trim(), conformance.trim().to_ascii_uppercase().as_str()) {
            ("1", "A") => Some(PdfAStandard::A1A),
            ("1", "B") => Some(PdfAStandard::A1B),
            ("2", "A") => Some(PdfAStandard::A2A),
            ("2", "B") => Some(PdfAStandard::A2B),
            ("3", "A") => Some(PdfAStandard::A3A),
            ("3", "B") => Some(PdfAStandard::A3B),
            _ => None,
        }
    }
}

impl FromStr for PdfAStandard {
    type Err = Error;

    /// Parse a standard code such as `1a`, `2B` or `PDF/A-3b`, ignoring case.
    fn from_str(s: &str) -> Result<Self> {
        let code = s.trim().to_ascii_uppercase();
        let code = code
            .strip_prefix("PDF/A-")
            .or_else(|| code.strip_prefix("PDFA-"))
            .unwrap_or(&code);
        if code.is_empty() {
            return Err(Error::InvalidArgument("standard code is empty".to_string()));
        }
        let mut chars = code.chars();
        match (chars.next(), chars.next(), chars.next()) {
            (Some(part), Some(level), None) => {
                PdfAStandard::from_xmp(&part.to_string(), &level.to_string())
            },
            _ => None,
        }
        .ok_or_else(|| Error::InvalidArgument(format!("unknown PDF/A standard '{}'", s.trim())))
    }
}

impl fmt::Display for PdfAStandard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PDF/A-{}{}", self.part(), self.conformance().to_ascii_lowercase())
    }
}

impl Serialize for PdfAStandard {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.code())
    }
}

/// Codes for PDF/A violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationCode {
    // File structure
    /// Document is encrypted
    EncryptionNotAllowed,
    /// Trailer lacks the /ID file identifier
    MissingFileIdentifier,
    /// Header version outside what the part permits
    VersionMismatch,

    // Metadata
    /// Missing XMP metadata
    MissingXmpMetadata,
    /// PDF/A identification absent or naming another standard
    InvalidPdfaIdentification,
    /// XMP metadata not synchronized with document info
    XmpMetadataMismatch,
    /// Metadata stream is compressed or otherwise filtered
    FilteredMetadata,

    // Fonts
    /// Font not embedded
    FontNotEmbedded,

    // Colour
    /// Missing PDF/A output intent
    MissingOutputIntent,
    /// Device-dependent colour not covered by the output intent
    DeviceColorWithoutIntent,
    /// Separation or DeviceN alternate space not covered by the output intent
    UncalibratedAlternateSpace,

    // Images and streams
    /// LZW compression not allowed
    LzwCompressionNotAllowed,
    /// JPEG2000 not allowed
    Jpeg2000NotAllowed,
    /// Stream data held in an external file
    ExternalStreamNotAllowed,
    /// Image with alternates, OPI or interpolation
    InvalidImage,

    // Graphics
    /// Transparency used (PDF/A-1)
    TransparencyNotAllowed,
    /// Transfer function in a graphics state
    TransferFunctionNotAllowed,
    /// PostScript XObject
    PostScriptNotAllowed,
    /// Reference XObject
    ReferenceXObjectNotAllowed,
    /// Optional content (PDF/A-1)
    OptionalContentNotAllowed,

    // Interactive features
    /// Forbidden action type
    ForbiddenAction,
    /// Additional-actions dictionary
    AdditionalActionsNotAllowed,
    /// Document-level JavaScript
    JavaScriptNotAllowed,
    /// Annotation flags hide it or keep it from printing
    InvalidAnnotationFlags,
    /// Annotation type not permitted
    ForbiddenAnnotation,
    /// Annotation without normal appearance stream
    MissingAppearanceStream,
    /// Interactive form needing appearance generation or carrying XFA
    InvalidInteractiveForm,

    // Embedded files
    /// Embedded file not allowed
    EmbeddedFileNotAllowed,
    /// Embedded file missing AF relationship or MIME type
    MissingAfRelationship,

    // Structure
    /// Missing document structure (level A)
    MissingDocumentStructure,
    /// Missing natural language declaration (level A)
    MissingLanguage,
}

impl ViolationCode {
    /// Error kind reported when a violation of this code survives fixing.
    pub fn unfixable_kind(&self) -> ErrorKind {
        match self {
            ViolationCode::FontNotEmbedded => ErrorKind::UnembeddableResource,
            _ => ErrorKind::UnsupportedFeature,
        }
    }
}

impl fmt::Display for ViolationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            ViolationCode::EncryptionNotAllowed => "FILE-001",
            ViolationCode::MissingFileIdentifier => "FILE-002",
            ViolationCode::VersionMismatch => "FILE-003",
            ViolationCode::MissingXmpMetadata => "XMP-001",
            ViolationCode::InvalidPdfaIdentification => "XMP-002",
            ViolationCode::XmpMetadataMismatch => "XMP-003",
            ViolationCode::FilteredMetadata => "XMP-004",
            ViolationCode::FontNotEmbedded => "FONT-001",
            ViolationCode::MissingOutputIntent => "COLOR-001",
            ViolationCode::DeviceColorWithoutIntent => "COLOR-002",
            ViolationCode::UncalibratedAlternateSpace => "COLOR-003",
            ViolationCode::LzwCompressionNotAllowed => "IMAGE-001",
            ViolationCode::Jpeg2000NotAllowed => "IMAGE-002",
            ViolationCode::ExternalStreamNotAllowed => "IMAGE-003",
            ViolationCode::InvalidImage => "IMAGE-004",
            ViolationCode::TransparencyNotAllowed => "GRAPHICS-001",
            ViolationCode::TransferFunctionNotAllowed => "GRAPHICS-002",
            ViolationCode::PostScriptNotAllowed => "XOBJ-001",
            ViolationCode::ReferenceXObjectNotAllowed => "XOBJ-002",
            ViolationCode::OptionalContentNotAllowed => "OC-001",
            ViolationCode::ForbiddenAction => "ACTION-001",
            ViolationCode::AdditionalActionsNotAllowed => "ACTION-002",
            ViolationCode::JavaScriptNotAllowed => "ACTION-003",
            ViolationCode::InvalidAnnotationFlags => "ANNOT-001",
            ViolationCode::ForbiddenAnnotation => "ANNOT-002",
            ViolationCode::MissingAppearanceStream => "ANNOT-003",
            ViolationCode::InvalidInteractiveForm => "FORM-001",
            ViolationCode::EmbeddedFileNotAllowed => "EMBED-001",
            ViolationCode::MissingAfRelationship => "EMBED-002",
            ViolationCode::MissingDocumentStructure => "STRUCT-001",
            ViolationCode::MissingLanguage => "STRUCT-002",
        };
        write!(f, "{}", code)
    }
}

impl Serialize for ViolationCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// A single compliance violation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    /// Violation code.
    pub code: ViolationCode,
    /// Human-readable message.
    pub message: String,
    /// Location in the document (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Clause reference in the standard.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clause: Option<String>,
    /// Object the violation was found in, for fixers.
    #[serde(skip)]
    pub target: Option<ObjectRef>,
}

impl Violation {
    /// Create a new violation.
    pub fn new(code: ViolationCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            location: None,
            clause: None,
            target: None,
        }
    }

    /// Set the location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set the clause reference.
    pub fn with_clause(mut self, clause: impl Into<String>) -> Self {
        self.clause = Some(clause.into());
        self
    }

    /// Set the object the violation concerns; also used as the location.
    pub fn with_target(mut self, target: ObjectRef) -> Self {
        if self.location.is_none() {
            self.location = Some(format!("object {}", target));
        }
        self.target = Some(target);
        self
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(ref loc) = self.location {
            write!(f, " (at {})", loc)?;
        }
        Ok(())
    }
}

/// Result of running a fixer on one violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixOutcome {
    /// The document was changed; the description says how.
    Fixed(String),
    /// Another fix already took care of it.
    AlreadyFixed,
    /// The violation cannot be repaired automatically.
    Unfixable(String),
}

/// A fix applied during conversion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedFix {
    /// Code of the violation that was fixed.
    pub code: ViolationCode,
    /// Description of what was done.
    pub description: String,
    /// Location of the original violation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Outcome of validating, and possibly converting, a document.
#[derive(Debug, Clone, Serialize)]
pub struct ComplianceReport {
    /// Standard validated against.
    pub standard: PdfAStandard,
    /// Violations found before any fix.
    pub violations: Vec<Violation>,
    /// Fixes applied.
    pub fixes: Vec<AppliedFix>,
    /// Violations still present at the end.
    pub remaining: Vec<Violation>,
    /// True when no violation remains.
    pub passed: bool,
}

impl ComplianceReport {
    /// Report for a validation-only run.
    pub fn from_validation(standard: PdfAStandard, violations: Vec<Violation>) -> Self {
        let passed = violations.is_empty();
        Self {
            standard,
            remaining: violations.clone(),
            violations,
            fixes: Vec::new(),
            passed,
        }
    }

    /// Check if any violation remains.
    pub fn has_violations(&self) -> bool {
        !self.remaining.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_properties() {
        assert_eq!(PdfAStandard::A1A.part(), 1);
        assert_eq!(PdfAStandard::A2B.part(), 2);
        assert_eq!(PdfAStandard::A3B.part(), 3);

        assert!(PdfAStandard::A1A.requires_structure());
        assert!(!PdfAStandard::A1B.requires_structure());
        assert!(PdfAStandard::A3A.requires_structure());

        assert!(!PdfAStandard::A1B.allows_transparency());
        assert!(PdfAStandard::A2B.allows_transparency());
        assert!(!PdfAStandard::A1B.allows_object_streams());

        assert!(!PdfAStandard::A2B.allows_embedded_files());
        assert!(PdfAStandard::A2B.allows_embedded_pdf());
        assert!(PdfAStandard::A3B.allows_embedded_files());

        assert_eq!(PdfAStandard::A1B.pdf_version(), (1, 4));
        assert_eq!(PdfAStandard::A3A.pdf_version(), (1, 7));
    }

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!("1a".parse::<PdfAStandard>().unwrap(), PdfAStandard::A1A);
        assert_eq!("1A".parse::<PdfAStandard>().unwrap(), PdfAStandard::A1A);
        assert_eq!(" 2b ".parse::<PdfAStandard>().unwrap(), PdfAStandard::A2B);
        assert_eq!("pdf/a-3b".parse::<PdfAStandard>().unwrap(), PdfAStandard::A3B);
        for standard in PdfAStandard::ALL {
            assert_eq!(standard.code().parse::<PdfAStandard>().unwrap(), standard);
        }
    }

    #[test]
    fn test_parse_rejects_unknown() {
        for bad in ["4X", "", "  ", "2U", "1", "1AB", "A1"] {
            let err = bad.parse::<PdfAStandard>().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{:?}", bad);
        }
    }

    #[test]
    fn test_from_xmp() {
        assert_eq!(PdfAStandard::from_xmp("1", "A"), Some(PdfAStandard::A1A));
        assert_eq!(PdfAStandard::from_xmp("2", "b"), Some(PdfAStandard::A2B));
        assert_eq!(PdfAStandard::from_xmp("4", "A"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", PdfAStandard::A1B), "PDF/A-1b");
        assert_eq!(PdfAStandard::A3A.code(), "3A");
        assert_eq!(serde_json::to_string(&PdfAStandard::A2B).unwrap(), "\"2B\"");
    }

    #[test]
    fn test_violation_display() {
        let v = Violation::new(ViolationCode::FontNotEmbedded, "Font not embedded")
            .with_target(ObjectRef::new(7, 0))
            .with_clause("6.3.4");
        let display = format!("{}", v);
        assert!(display.contains("[FONT-001]"));
        assert!(display.contains("7 0 R"));
        assert_eq!(v.code.unfixable_kind(), ErrorKind::UnembeddableResource);
    }

    #[test]
    fn test_report_serializes() {
        let report = ComplianceReport::from_validation(
            PdfAStandard::A1B,
            vec![Violation::new(ViolationCode::MissingXmpMetadata, "no metadata")],
        );
        assert!(!report.passed);
        assert!(report.has_violations());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["standard"], "1B");
        assert_eq!(json["violations"][0]["code"], "XMP-001");
        assert!(json["violations"][0].get("target").is_none());
    }
}
