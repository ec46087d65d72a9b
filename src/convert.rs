//! Conversion orchestration: parse, validate, fix, embed, serialize.
//!
//! [`convert`] is the one-call entry point. [`Converter`] holds reusable
//! [`ConversionOptions`] and exposes the report and state history through
//! [`Converter::convert_detailed`].
//!
//! ```ignore
//! use pdfa_oxide::convert::{ConversionOptions, ConversionRequest, Converter};
//! use pdfa_oxide::policy::MaxPages;
//!
//! let converter = Converter::new(ConversionOptions::default().with_page_limit(MaxPages(10)));
//! let request = ConversionRequest::new(&input, "2b")?;
//! let outcome = converter.convert_detailed(&request)?;
//! println!("{} fix(es) applied", outcome.report.fixes.len());
//! ```

use std::fmt;
use std::sync::Arc;

use log::{debug, error, info};
use md5::{Digest, Md5};

use crate::compliance::{ComplianceReport, PdfAConverter, PdfAStandard, RuleStage, DEFAULT_LANGUAGE};
use crate::document::Document;
use crate::embedder::attachments::attach;
use crate::embedder::{EmbeddedFile, FontSource, NoFontSource};
use crate::error::{Error, ErrorKind, Result};
use crate::parser_config::ParserOptions;
use crate::policy::{PageLimitPolicy, Unlimited};
use crate::writer::{PdfWriter, WriterOptions};

/// Convert `bytes` to the PDF/A standard named by `standard` (`"1a"` … `"3b"`).
///
/// Uses default options: no page limit, no font source, the built-in ICC profiles.
///
/// # Errors
///
/// Any [`Error`]; [`Error::kind`] gives its place in the public taxonomy.
pub fn convert(bytes: &[u8], standard: &str) -> Result<Vec<u8>> {
    let request = ConversionRequest::new(bytes, standard)?;
    Converter::default()
        .convert_detailed(&request)
        .map(|outcome| outcome.bytes)
}

/// Source bytes and target standard for one conversion.
#[derive(Debug, Clone, Copy)]
pub struct ConversionRequest<'a> {
    data: &'a [u8],
    standard: PdfAStandard,
}

impl<'a> ConversionRequest<'a> {
    /// Check the arguments and build a request.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] for empty input, then for an unknown standard code.
    pub fn new(data: &'a [u8], standard: &str) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::InvalidArgument("input is empty".to_string()));
        }
        Ok(Self {
            data,
            standard: standard.parse()?,
        })
    }

    /// Build a request for an already-parsed standard.
    pub fn with_standard(data: &'a [u8], standard: PdfAStandard) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::InvalidArgument("input is empty".to_string()));
        }
        Ok(Self { data, standard })
    }

    /// Source bytes.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Target standard.
    pub fn standard(&self) -> PdfAStandard {
        self.standard
    }
}

/// Result of [`Converter::convert`]: bytes or a classified failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionResult {
    /// The complete converted file.
    Success(Vec<u8>),
    /// The conversion failed; no partial output is produced.
    Failure {
        /// Error classification.
        kind: ErrorKind,
        /// Human-readable detail.
        message: String,
    },
}

impl ConversionResult {
    /// Check if the conversion succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, ConversionResult::Success(_))
    }

    /// Output bytes, if any.
    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            ConversionResult::Success(bytes) => Some(bytes),
            ConversionResult::Failure { .. } => None,
        }
    }

    /// Failure kind, if any.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            ConversionResult::Success(_) => None,
            ConversionResult::Failure { kind, .. } => Some(*kind),
        }
    }
}

impl From<Result<Vec<u8>>> for ConversionResult {
    fn from(result: Result<Vec<u8>>) -> Self {
        match result {
            Ok(bytes) => ConversionResult::Success(bytes),
            Err(e) => ConversionResult::Failure {
                kind: e.kind(),
                message: e.to_string(),
            },
        }
    }
}

/// Stage a conversion has reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversionState {
    /// Input parsed into a document.
    Parsed,
    /// Violations collected.
    Validated,
    /// Structural repairs applied.
    Fixed,
    /// Fonts, ICC profile, XMP and attachments embedded.
    Embedded,
    /// Output bytes written.
    Serialized,
    /// Finished successfully.
    Done,
    /// Stopped with an error of the given kind.
    Failed(ErrorKind),
}

impl ConversionState {
    /// Check whether moving from `self` to `next` is allowed.
    pub fn can_transition_to(&self, next: ConversionState) -> bool {
        use ConversionState::*;
        match (self, next) {
            (Done | Failed(_), _) => false,
            (_, Failed(_)) => true,
            (Parsed, Validated)
            | (Validated, Fixed)
            | (Fixed, Embedded)
            | (Embedded, Serialized)
            | (Serialized, Done) => true,
            _ => false,
        }
    }

    /// Check if no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConversionState::Done | ConversionState::Failed(_))
    }
}

impl fmt::Display for ConversionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionState::Parsed => write!(f, "Parsed"),
            ConversionState::Validated => write!(f, "Validated"),
            ConversionState::Fixed => write!(f, "Fixed"),
            ConversionState::Embedded => write!(f, "Embedded"),
            ConversionState::Serialized => write!(f, "Serialized"),
            ConversionState::Done => write!(f, "Done"),
            ConversionState::Failed(kind) => write!(f, "Failed({})", kind),
        }
    }
}

/// Current state plus every state passed through.
#[derive(Debug, Clone)]
struct StateTracker {
    history: Vec<ConversionState>,
}

impl StateTracker {
    fn start() -> Self {
        Self {
            history: vec![ConversionState::Parsed],
        }
    }

    fn current(&self) -> ConversionState {
        self.history
            .last()
            .copied()
            .unwrap_or(ConversionState::Parsed)
    }

    /// Move to `next`. An illegal move is recorded as a failure and returned as an error.
    fn advance(&mut self, next: ConversionState) -> Result<()> {
        let current = self.current();
        if !current.can_transition_to(next) {
            self.history
                .push(ConversionState::Failed(ErrorKind::UnrecoverableDocument));
            return Err(Error::UnrecoverableDocument(format!(
                "illegal conversion state transition {} -> {}",
                current, next
            )));
        }
        info!("Conversion state {} -> {}", current, next);
        self.history.push(next);
        Ok(())
    }

    fn fail(&mut self, kind: ErrorKind) {
        if !self.current().is_terminal() {
            self.history.push(ConversionState::Failed(kind));
        }
    }

    fn describe(&self) -> String {
        self.history
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

/// Everything a successful conversion produced.
#[derive(Debug, Clone)]
pub struct ConversionOutcome {
    /// The converted file.
    pub bytes: Vec<u8>,
    /// Violations found, fixes applied and the final verdict.
    pub report: ComplianceReport,
    /// Final state (always [`ConversionState::Done`]).
    pub state: ConversionState,
    /// States passed through, in order.
    pub history: Vec<ConversionState>,
}

/// Options shared by every conversion a [`Converter`] runs.
#[derive(Clone)]
pub struct ConversionOptions {
    /// Page-count policy, checked right after parsing.
    pub page_limit: Arc<dyn PageLimitPolicy>,
    /// Where programs for unembedded fonts come from.
    pub font_source: Arc<dyn FontSource>,
    /// ICC profile for the output intent; the built-in profiles are used when `None`.
    pub icc_profile: Option<Vec<u8>>,
    /// `/Lang` written when an A-level document has none.
    pub default_language: String,
    /// Files to attach. Only valid for PDF/A-3.
    pub attachments: Vec<EmbeddedFile>,
    /// Parser behavior and resource bounds.
    pub parser: ParserOptions,
    /// Output layout. The header version is always the target standard's.
    pub writer: WriterOptions,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            page_limit: Arc::new(Unlimited),
            font_source: Arc::new(NoFontSource),
            icc_profile: None,
            default_language: DEFAULT_LANGUAGE.to_string(),
            attachments: Vec::new(),
            parser: ParserOptions::default(),
            writer: WriterOptions::default(),
        }
    }
}

impl fmt::Debug for ConversionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionOptions")
            .field("page_limit", &self.page_limit)
            .field("icc_profile", &self.icc_profile.as_ref().map(|p| p.len()))
            .field("default_language", &self.default_language)
            .field("attachments", &self.attachments.len())
            .field("parser", &self.parser)
            .field("writer", &self.writer)
            .finish_non_exhaustive()
    }
}

impl ConversionOptions {
    /// Set the page-count policy.
    pub fn with_page_limit(mut self, policy: impl PageLimitPolicy + 'static) -> Self {
        self.page_limit = Arc::new(policy);
        self
    }

    /// Set the font source.
    pub fn with_font_source(mut self, source: impl FontSource + 'static) -> Self {
        self.font_source = Arc::new(source);
        self
    }

    /// Use `profile` for the output intent.
    pub fn with_icc_profile(mut self, profile: Vec<u8>) -> Self {
        self.icc_profile = Some(profile);
        self
    }

    /// Set the fallback document language.
    pub fn with_default_language(mut self, language: impl Into<String>) -> Self {
        self.default_language = language.into();
        self
    }

    /// Attach a file (PDF/A-3 only).
    pub fn with_attachment(mut self, file: EmbeddedFile) -> Self {
        self.attachments.push(file);
        self
    }

    /// Set the parser options.
    pub fn with_parser_options(mut self, options: ParserOptions) -> Self {
        self.parser = options;
        self
    }

    /// Set the writer options.
    pub fn with_writer_options(mut self, options: WriterOptions) -> Self {
        self.writer = options;
        self
    }
}

/// Runs conversions with a fixed set of options.
///
/// A `Converter` holds no per-document state, so one instance can serve
/// concurrent requests.
#[derive(Debug, Clone, Default)]
pub struct Converter {
    options: ConversionOptions,
}

impl Converter {
    /// Create a converter.
    pub fn new(options: ConversionOptions) -> Self {
        Self { options }
    }

    /// The options in use.
    pub fn options(&self) -> &ConversionOptions {
        &self.options
    }

    /// Convert and classify the outcome.
    pub fn convert(&self, request: &ConversionRequest<'_>) -> ConversionResult {
        self.convert_detailed(request)
            .map(|outcome| outcome.bytes)
            .into()
    }

    /// Convert and return the output together with the report and state history.
    ///
    /// # Errors
    ///
    /// Any [`Error`]. Nothing is returned on failure besides the error.
    pub fn convert_detailed(&self, request: &ConversionRequest<'_>) -> Result<ConversionOutcome> {
        let standard = request.standard();
        if !self.options.attachments.is_empty() && standard.part() != 3 {
            return Err(Error::InvalidArgument(format!(
                "attachments require PDF/A-3, not PDF/A-{}",
                standard.code()
            )));
        }

        let mut document = Document::load(request.data(), &self.options.parser).map_err(|e| {
            error!("Parsing failed: {}", e);
            e
        })?;
        let mut tracker = StateTracker::start();
        info!(
            "Parsed PDF {}.{} with {} page(s), target PDF/A-{}",
            document.version().0,
            document.version().1,
            document.page_count(),
            standard.code()
        );

        let mut identity = [0u8; 16];
        identity.copy_from_slice(&Md5::digest(request.data()));
        match self.run(&mut document, standard, identity, &mut tracker) {
            Ok((bytes, report)) => {
                tracker.advance(ConversionState::Done)?;
                debug!("Conversion history: {}", tracker.describe());
                Ok(ConversionOutcome {
                    bytes,
                    report,
                    state: tracker.current(),
                    history: tracker.history,
                })
            },
            Err(e) => {
                tracker.fail(e.kind());
                error!("Conversion failed: {} ({})", e, tracker.describe());
                Err(e)
            },
        }
    }

    fn run(
        &self,
        document: &mut Document,
        standard: PdfAStandard,
        identity: [u8; 16],
        tracker: &mut StateTracker,
    ) -> Result<(Vec<u8>, ComplianceReport)> {
        self.options.page_limit.check(document.page_count())?;

        let mut converter = PdfAConverter::new(standard)
            .with_font_source(self.options.font_source.as_ref())
            .with_default_language(&self.options.default_language)
            .with_identity(identity);
        if let Some(profile) = self.options.icc_profile.as_deref() {
            converter = converter.with_icc_profile(profile);
        }

        let mut run = converter.begin(document);
        tracker.advance(ConversionState::Validated)?;

        run.run_stage(document, RuleStage::Fix)?;
        tracker.advance(ConversionState::Fixed)?;

        for file in &self.options.attachments {
            attach(document, file)?;
        }
        run.run_stage(document, RuleStage::Embed)?;
        let report = run.finish(document)?;
        tracker.advance(ConversionState::Embedded)?;

        let pruned = document.prune_dangling_references();
        if pruned > 0 {
            debug!("Pruned {} dangling reference(s)", pruned);
        }
        let bytes = PdfWriter::write(document, &self.writer_options(standard))?;
        tracker.advance(ConversionState::Serialized)?;

        Ok((bytes, report))
    }

    /// Writer options with the standard's version and cross-reference constraints applied.
    fn writer_options(&self, standard: PdfAStandard) -> WriterOptions {
        let mut options = self.options.writer.clone().with_version(standard.pdf_version());
        if !standard.allows_object_streams() {
            options.use_xref_stream = false;
            options.use_object_streams = false;
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Dict, Object, ObjectRef};
    use std::collections::BTreeMap;

    fn minimal_pdf() -> Vec<u8> {
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
                (
                    "Kids",
                    Object::Array(vec![
                        Object::Reference(ObjectRef::new(3, 0)),
                        Object::Reference(ObjectRef::new(5, 0)),
                    ]),
                ),
                ("Count", Object::Integer(2)),
            ]),
        );
        for (page, content) in [(3, 4), (5, 6)] {
            objects.insert(
                ObjectRef::new(page, 0),
                Object::dictionary(vec![
                    ("Type", Object::name("Page")),
                    ("Parent", Object::Reference(ObjectRef::new(2, 0))),
                    (
                        "MediaBox",
                        Object::Array(vec![
                            Object::Integer(0),
                            Object::Integer(0),
                            Object::Integer(200),
                            Object::Integer(200),
                        ]),
                    ),
                    ("Contents", Object::Reference(ObjectRef::new(content, 0))),
                ]),
            );
            objects.insert(
                ObjectRef::new(content, 0),
                Object::stream(Dict::new(), b"0.5 g 10 10 50 50 re f".to_vec()),
            );
        }
        let mut trailer = Dict::new();
        trailer.insert("Root".to_string(), Object::Reference(ObjectRef::new(1, 0)));
        let doc = Document::from_parts((1, 7), trailer, objects).unwrap();
        PdfWriter::write(&doc, &WriterOptions::default()).unwrap()
    }

    #[test]
    fn test_state_transitions() {
        use ConversionState::*;
        assert!(Parsed.can_transition_to(Validated));
        assert!(Embedded.can_transition_to(Serialized));
        assert!(Fixed.can_transition_to(Failed(ErrorKind::UnembeddableResource)));
        assert!(!Parsed.can_transition_to(Fixed));
        assert!(!Done.can_transition_to(Failed(ErrorKind::InvalidArgument)));
        assert!(!Failed(ErrorKind::InvalidXRef).can_transition_to(Parsed));
    }

    #[test]
    fn test_illegal_transition_fails() {
        let mut tracker = StateTracker::start();
        let err = tracker.advance(ConversionState::Serialized).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnrecoverableDocument);
        assert_eq!(
            tracker.current(),
            ConversionState::Failed(ErrorKind::UnrecoverableDocument)
        );
    }

    #[test]
    fn test_request_checks_bytes_before_standard() {
        let err = ConversionRequest::new(b"", "4X").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(err.to_string().contains("empty"));

        let err = ConversionRequest::new(b"%PDF-1.4", "4X").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(ConversionRequest::new(b"%PDF-1.4", "1a").is_ok());
    }

    #[test]
    fn test_detailed_outcome_history() {
        let input = minimal_pdf();
        let request = ConversionRequest::new(&input, "2b").unwrap();
        let outcome = Converter::default().convert_detailed(&request).unwrap();
        assert_eq!(outcome.state, ConversionState::Done);
        assert_eq!(
            outcome.history,
            vec![
                ConversionState::Parsed,
                ConversionState::Validated,
                ConversionState::Fixed,
                ConversionState::Embedded,
                ConversionState::Serialized,
                ConversionState::Done,
            ]
        );
        assert!(outcome.report.passed);
        assert!(outcome.bytes.starts_with(b"%PDF-1.7"));
    }

    #[test]
    fn test_page_limit_policy() {
        let input = minimal_pdf();
        let request = ConversionRequest::new(&input, "1b").unwrap();

        let limited = Converter::new(ConversionOptions::default().with_page_limit(crate::policy::MaxPages(1)));
        let result = limited.convert(&request);
        assert_eq!(result.error_kind(), Some(ErrorKind::PageLimitExceeded));
        assert!(result.bytes().is_none());

        let relaxed = Converter::new(ConversionOptions::default().with_page_limit(crate::policy::MaxPages(2)));
        assert!(relaxed.convert(&request).is_success());
    }

    #[test]
    fn test_attachments_need_part_three() {
        let input = minimal_pdf();
        let options =
            ConversionOptions::default().with_attachment(EmbeddedFile::new("data.csv", b"a,b\n1,2\n".to_vec()));
        let converter = Converter::new(options);

        let request = ConversionRequest::new(&input, "2b").unwrap();
        assert_eq!(
            converter.convert(&request).error_kind(),
            Some(ErrorKind::InvalidArgument)
        );

        let request = ConversionRequest::new(&input, "3b").unwrap();
        let outcome = converter.convert_detailed(&request).unwrap();
        assert!(outcome.report.passed);
        let doc = Document::load(&outcome.bytes, &ParserOptions::strict()).unwrap();
        let specs = crate::embedder::attachments::embedded_file_specs(&doc);
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].0, "data.csv");
    }

    #[test]
    fn test_part_one_never_uses_xref_streams() {
        let input = minimal_pdf();
        let options = ConversionOptions::default()
            .with_writer_options(WriterOptions::default().with_xref_stream(true).with_object_streams(true));
        let converter = Converter::new(options);

        let request = ConversionRequest::new(&input, "1b").unwrap();
        let bytes = converter.convert_detailed(&request).unwrap().bytes;
        assert!(bytes.starts_with(b"%PDF-1.4"));
        assert!(String::from_utf8_lossy(&bytes).contains("\ntrailer\n"));

        let request = ConversionRequest::new(&input, "2b").unwrap();
        let bytes = converter.convert_detailed(&request).unwrap().bytes;
        assert!(!String::from_utf8_lossy(&bytes).contains("\ntrailer\n"));
        assert!(Document::load(&bytes, &ParserOptions::strict()).is_ok());
    }

    #[test]
    fn test_converter_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Converter>();
    }
}
