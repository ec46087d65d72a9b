//! PDF/A validation and conversion.
//!
//! Checks and repairs are grouped into per-standard pipelines (see [`pipeline`]).
//! [`PdfAValidator`] only reports; [`PdfAConverter`] repairs the document in two
//! stages, structural fixes first and resource embedding second, then validates
//! again and turns anything left into an error.
//!
//! ## PDF/A Conformance Levels
//!
//! - **PDF/A-1b**: PDF 1.4 subset, visual appearance preservation
//! - **PDF/A-1a**: PDF/A-1b plus logical structure (Tagged PDF)
//! - **PDF/A-2b**: PDF 1.7 based, allows JPEG2000, transparency and object streams
//! - **PDF/A-2a**: PDF/A-2b plus logical structure
//! - **PDF/A-3b**: PDF/A-2b plus embedded files of any type
//! - **PDF/A-3a**: PDF/A-3b plus logical structure
//!
//! ## Example
//!
//! ```ignore
//! use pdfa_oxide::compliance::{PdfAConverter, PdfAStandard};
//! use pdfa_oxide::document::Document;
//! use pdfa_oxide::parser_config::ParserOptions;
//!
//! let mut doc = Document::load(&bytes, &ParserOptions::default())?;
//! let report = PdfAConverter::new(PdfAStandard::A2B).convert(&mut doc)?;
//! assert!(report.passed);
//! ```
//!
//! ## Standards Reference
//!
//! - ISO 19005-1:2005 (PDF/A-1)
//! - ISO 19005-2:2011 (PDF/A-2)
//! - ISO 19005-3:2012 (PDF/A-3)

pub mod fixes;
pub mod pipeline;
mod types;
pub mod validators;

pub use pipeline::{rules_for, Rule, RuleContext, RuleStage, DEFAULT_LANGUAGE};
pub use types::{AppliedFix, ComplianceReport, FixOutcome, PdfAStandard, Violation, ViolationCode};

use crate::document::Document;
use crate::embedder::fonts::{FontSource, NoFontSource};
use crate::error::{Error, ErrorKind, Result};

static NO_FONTS: NoFontSource = NoFontSource;

/// PDF/A compliance validator.
///
/// Runs every check of a standard's pipeline without changing the document.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfAValidator;

impl PdfAValidator {
    /// Create a new validator.
    pub fn new() -> Self {
        Self
    }

    /// Validate `document` against `standard`.
    pub fn validate(&self, document: &Document, standard: PdfAStandard) -> ComplianceReport {
        let ctx = RuleContext::new(standard);
        let violations = pipeline::validate_all(document, &ctx);
        log::info!("{}: {} violation(s)", standard, violations.len());
        ComplianceReport::from_validation(standard, violations)
    }
}

/// Validate `document` against `standard`.
pub fn validate_pdf_a(document: &Document, standard: PdfAStandard) -> ComplianceReport {
    PdfAValidator::new().validate(document, standard)
}

/// Converts a document to a PDF/A level in place.
#[derive(Clone, Copy)]
pub struct PdfAConverter<'a> {
    standard: PdfAStandard,
    font_source: &'a dyn FontSource,
    icc_profile: Option<&'a [u8]>,
    default_language: &'a str,
    identity: [u8; 16],
}

impl std::fmt::Debug for PdfAConverter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfAConverter")
            .field("standard", &self.standard)
            .field("icc_profile", &self.icc_profile.map(<[u8]>::len))
            .field("default_language", &self.default_language)
            .finish()
    }
}

impl<'a> PdfAConverter<'a> {
    /// Converter with no font source, built-in profiles and the default language.
    pub fn new(standard: PdfAStandard) -> Self {
        Self {
            standard,
            font_source: &NO_FONTS,
            icc_profile: None,
            default_language: DEFAULT_LANGUAGE,
            identity: [0; 16],
        }
    }

    /// Seed for generated file and XMP identifiers, usually a digest of the input.
    pub fn with_identity(mut self, identity: [u8; 16]) -> Self {
        self.identity = identity;
        self
    }

    /// Look up missing font programs in `source`.
    pub fn with_font_source(mut self, source: &'a dyn FontSource) -> Self {
        self.font_source = source;
        self
    }

    /// Use `profile` for the output intent instead of a built-in one.
    pub fn with_icc_profile(mut self, profile: &'a [u8]) -> Self {
        self.icc_profile = Some(profile);
        self
    }

    /// Language declared for level-A documents that have none.
    pub fn with_default_language(mut self, language: &'a str) -> Self {
        self.default_language = language;
        self
    }

    /// Target standard.
    pub fn standard(&self) -> PdfAStandard {
        self.standard
    }

    /// Validate `document` and start a conversion run.
    pub fn begin(&self, document: &Document) -> ConversionRun<'a> {
        let ctx = RuleContext::new(self.standard)
            .with_font_source(self.font_source)
            .with_icc_profile(self.icc_profile)
            .with_default_language(self.default_language)
            .with_identity(self.identity);
        let violations = pipeline::validate_all(document, &ctx);
        log::info!(
            "{}: {} violation(s) before conversion",
            self.standard,
            violations.len()
        );
        ConversionRun {
            report: ComplianceReport::from_validation(self.standard, violations),
            ctx,
            unfixable: Vec::new(),
        }
    }

    /// Validate, fix, embed and re-validate `document`.
    ///
    /// # Errors
    ///
    /// [`Error::UnsupportedFeature`] or [`Error::UnembeddableResource`] when a
    /// violation survives its repair, or any error a repair raised.
    pub fn convert(&self, document: &mut Document) -> Result<ComplianceReport> {
        let mut run = self.begin(document);
        run.run_stage(document, RuleStage::Fix)?;
        run.run_stage(document, RuleStage::Embed)?;
        run.finish(document)
    }
}

/// State of one conversion between its stages.
pub struct ConversionRun<'a> {
    ctx: RuleContext<'a>,
    report: ComplianceReport,
    unfixable: Vec<(Violation, String)>,
}

impl<'a> ConversionRun<'a> {
    /// The report so far.
    pub fn report(&self) -> &ComplianceReport {
        &self.report
    }

    /// Run every repair of `stage`, in pipeline order.
    ///
    /// Each rule validates the document as it is now, since earlier repairs may have
    /// resolved or moved what the initial validation found.
    pub fn run_stage(&mut self, document: &mut Document, stage: RuleStage) -> Result<()> {
        for rule in rules_for(self.ctx.standard).iter().filter(|r| r.stage == stage) {
            let found = (rule.validate)(document, &self.ctx);
            if found.is_empty() {
                continue;
            }
            let Some(fix) = rule.fix else {
                for violation in found {
                    log::warn!("No repair for {}", violation);
                    self.unfixable.push((violation, "no automatic repair".to_string()));
                }
                continue;
            };
            for violation in found {
                match fix(document, &mut self.ctx, &violation)? {
                    FixOutcome::Fixed(description) => {
                        log::warn!("Fixed {}: {}", violation.code, description);
                        self.report.fixes.push(AppliedFix {
                            code: violation.code,
                            description,
                            location: violation.location.clone(),
                        });
                    },
                    FixOutcome::AlreadyFixed => {
                        log::debug!("{} already resolved", violation);
                    },
                    FixOutcome::Unfixable(reason) => {
                        log::warn!("Cannot fix {}: {}", violation, reason);
                        self.unfixable.push((violation, reason));
                    },
                }
            }
        }
        Ok(())
    }

    /// Re-validate and close the run.
    ///
    /// # Errors
    ///
    /// The first remaining violation, mapped to its error kind.
    pub fn finish(mut self, document: &Document) -> Result<ComplianceReport> {
        let remaining = pipeline::validate_all(document, &self.ctx);
        self.report.passed = remaining.is_empty();
        self.report.remaining = remaining;

        let Some(first) = self.report.remaining.first() else {
            log::info!(
                "{}: conversion passed with {} fix(es)",
                self.report.standard,
                self.report.fixes.len()
            );
            return Ok(self.report);
        };
        let reason = self
            .unfixable
            .iter()
            .find(|(v, _)| v.code == first.code && v.target == first.target)
            .map(|(_, reason)| reason.as_str());
        let message = match reason {
            Some(reason) => format!("{}: {}", first, reason),
            None => first.to_string(),
        };
        log::error!(
            "{}: {} violation(s) remain; first: {}",
            self.report.standard,
            self.report.remaining.len(),
            message
        );
        Err(match first.code.unfixable_kind() {
            ErrorKind::UnembeddableResource => Error::UnembeddableResource(message),
            _ => Error::UnsupportedFeature(message),
        })
    }
}
