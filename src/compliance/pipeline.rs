//! Per-standard rule pipelines.
//!
//! A [`Rule`] pairs one check with the repair for what it finds. Each PDF/A level gets
//! a fixed, ordered table of rules: structural repairs run in the [`RuleStage::Fix`]
//! stage, resource embedding in [`RuleStage::Embed`]. The XMP rule is always last so
//! the metadata it writes describes the final document.

use super::fixes;
use super::types::{FixOutcome, PdfAStandard, Violation};
use super::validators;
use crate::document::Document;
use crate::embedder::fonts::{FontSource, NoFontSource};
use crate::embedder::icc::{self, ColorModel, InstalledIntent};
use crate::error::{Error, Result};
use crate::object::{Object, ObjectRef};
use std::collections::HashMap;

/// Language written to `/Lang` when level A needs one and the caller gave none.
pub const DEFAULT_LANGUAGE: &str = "en-US";

static NO_FONTS: NoFontSource = NoFontSource;

/// Stage a rule's repair belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleStage {
    /// Removes or rewrites forbidden constructs.
    Fix,
    /// Adds fonts, colour profiles and metadata.
    Embed,
}

/// Signature of a check.
pub type ValidateFn = fn(&Document, &RuleContext<'_>) -> Vec<Violation>;

/// Signature of a repair. Repairs must be idempotent: a second call for a violation an
/// earlier call already resolved returns [`FixOutcome::AlreadyFixed`].
pub type FixFn = fn(&mut Document, &mut RuleContext<'_>, &Violation) -> Result<FixOutcome>;

/// A check and its optional repair.
#[derive(Clone, Copy)]
pub struct Rule {
    /// Short name used in logs.
    pub name: &'static str,
    /// Stage the repair runs in.
    pub stage: RuleStage,
    /// The check.
    pub validate: ValidateFn,
    /// The repair, `None` when violations of this rule cannot be fixed.
    pub fix: Option<FixFn>,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("stage", &self.stage)
            .field("fixable", &self.fix.is_some())
            .finish()
    }
}

/// Inputs and per-run state shared by checks and repairs.
pub struct RuleContext<'a> {
    /// Target level.
    pub standard: PdfAStandard,
    /// Where font programs come from.
    pub font_source: &'a dyn FontSource,
    /// Caller-supplied output intent profile. A built-in sRGB or CMYK profile is
    /// used when absent.
    pub icc_profile: Option<&'a [u8]>,
    /// Value written to `/Lang` for level A.
    pub default_language: &'a str,
    /// Seed for generated identifiers; equal inputs get equal IDs.
    pub identity: [u8; 16],
    intent: Option<InstalledIntent>,
    calibrated: HashMap<ColorModel, ObjectRef>,
}

impl<'a> RuleContext<'a> {
    /// Context with no font source, built-in profiles and the default language.
    pub fn new(standard: PdfAStandard) -> Self {
        Self {
            standard,
            font_source: &NO_FONTS,
            icc_profile: None,
            default_language: DEFAULT_LANGUAGE,
            identity: [0; 16],
            intent: None,
            calibrated: HashMap::new(),
        }
    }

    /// Use `source` to find font programs.
    pub fn with_font_source(mut self, source: &'a dyn FontSource) -> Self {
        self.font_source = source;
        self
    }

    /// Use `profile` as the output intent's destination profile.
    pub fn with_icc_profile(mut self, profile: Option<&'a [u8]>) -> Self {
        self.icc_profile = profile;
        self
    }

    /// Write `language` to `/Lang` when a level-A document lacks one.
    pub fn with_default_language(mut self, language: &'a str) -> Self {
        self.default_language = language;
        self
    }

    /// Derive generated identifiers from `identity`.
    pub fn with_identity(mut self, identity: [u8; 16]) -> Self {
        self.identity = identity;
        self
    }

    /// The document's output intent, installing one if it has none.
    pub(crate) fn ensure_intent(&mut self, doc: &mut Document) -> Result<InstalledIntent> {
        if let Some(intent) = self.intent.filter(|i| doc.contains(i.profile)) {
            return Ok(intent);
        }
        let intent = match icc::find_output_intent(doc) {
            Some(existing) => existing,
            None => {
                let profile = match self.icc_profile {
                    Some(p) => p.to_vec(),
                    None if prefers_cmyk(doc) => icc::cmyk_profile()?,
                    None => icc::srgb_profile()?,
                };
                let installed = icc::install_output_intent(doc, &profile)?;
                log::info!("Installed {} output intent", installed.model.device_space());
                installed
            },
        };
        self.intent = Some(intent);
        Ok(intent)
    }

    /// An `/ICCBased` profile stream for `model`, reusing the intent's profile when
    /// the models match.
    pub(crate) fn calibrated_profile(&mut self, doc: &mut Document, model: ColorModel) -> Result<ObjectRef> {
        let intent = self.ensure_intent(doc)?;
        if intent.model == model {
            return Ok(intent.profile);
        }
        if let Some(r) = self.calibrated.get(&model).filter(|r| doc.contains(**r)) {
            return Ok(*r);
        }
        let profile = match model {
            ColorModel::Rgb => icc::srgb_profile()?,
            ColorModel::Cmyk => icc::cmyk_profile()?,
            ColorModel::Gray => {
                return Err(Error::UnsupportedFeature(
                    "no built-in gray profile for a DefaultGray colour space".to_string(),
                ))
            },
        };
        let r = doc.insert(icc::icc_stream(&profile, model));
        self.calibrated.insert(model, r);
        Ok(r)
    }
}

/// True when the pages paint in CMYK but never in RGB.
fn prefers_cmyk(doc: &Document) -> bool {
    let mut rgb = false;
    let mut cmyk = false;
    for owner in validators::resource_owners(doc) {
        let usage = validators::uncalibrated_usage(doc, &owner);
        rgb |= usage.rgb;
        cmyk |= usage.cmyk;
    }
    cmyk && !rgb
}

/// `[/ICCBased ref]`
pub(crate) fn iccbased(profile: ObjectRef) -> Object {
    Object::Array(vec![Object::name("ICCBased"), Object::Reference(profile)])
}

const ENCRYPTION: Rule = Rule {
    name: "encryption",
    stage: RuleStage::Fix,
    validate: validators::check_encryption,
    fix: None,
};

const FILE_STRUCTURE: Rule = Rule {
    name: "file-structure",
    stage: RuleStage::Fix,
    validate: validators::check_file_structure,
    fix: Some(fixes::fix_file_structure),
};

const EXTERNAL_STREAMS: Rule = Rule {
    name: "external-streams",
    stage: RuleStage::Fix,
    validate: validators::check_external_streams,
    fix: None,
};

const POSTSCRIPT: Rule = Rule {
    name: "postscript",
    stage: RuleStage::Fix,
    validate: validators::check_postscript,
    fix: None,
};

const XOBJECTS: Rule = Rule {
    name: "xobjects",
    stage: RuleStage::Fix,
    validate: validators::check_xobjects,
    fix: Some(fixes::fix_xobjects),
};

const ACTIONS: Rule = Rule {
    name: "actions",
    stage: RuleStage::Fix,
    validate: validators::check_actions,
    fix: Some(fixes::fix_actions),
};

const FORMS: Rule = Rule {
    name: "forms",
    stage: RuleStage::Fix,
    validate: validators::check_forms,
    fix: Some(fixes::fix_forms),
};

const ANNOTATIONS: Rule = Rule {
    name: "annotations",
    stage: RuleStage::Fix,
    validate: validators::check_annotations,
    fix: Some(fixes::fix_annotations),
};

const TRANSFER_FUNCTIONS: Rule = Rule {
    name: "transfer-functions",
    stage: RuleStage::Fix,
    validate: validators::check_transfer_functions,
    fix: Some(fixes::fix_transfer_functions),
};

const LZW: Rule = Rule {
    name: "lzw",
    stage: RuleStage::Fix,
    validate: validators::check_lzw,
    fix: Some(fixes::fix_lzw),
};

const JPEG2000: Rule = Rule {
    name: "jpeg2000",
    stage: RuleStage::Fix,
    validate: validators::check_jpeg2000,
    fix: None,
};

const TRANSPARENCY: Rule = Rule {
    name: "transparency",
    stage: RuleStage::Fix,
    validate: validators::check_transparency,
    fix: Some(fixes::fix_transparency),
};

const OPTIONAL_CONTENT: Rule = Rule {
    name: "optional-content",
    stage: RuleStage::Fix,
    validate: validators::check_optional_content,
    fix: Some(fixes::fix_optional_content),
};

const EMBEDDED_FILES: Rule = Rule {
    name: "embedded-files",
    stage: RuleStage::Fix,
    validate: validators::check_embedded_files,
    fix: Some(fixes::fix_embedded_files),
};

const STRUCTURE: Rule = Rule {
    name: "structure",
    stage: RuleStage::Fix,
    validate: validators::check_structure,
    fix: Some(fixes::fix_structure),
};

const FONTS: Rule = Rule {
    name: "fonts",
    stage: RuleStage::Embed,
    validate: validators::check_fonts,
    fix: Some(fixes::fix_fonts),
};

const OUTPUT_INTENT: Rule = Rule {
    name: "output-intent",
    stage: RuleStage::Embed,
    validate: validators::check_output_intent,
    fix: Some(fixes::fix_output_intent),
};

const DEVICE_COLORS: Rule = Rule {
    name: "device-colors",
    stage: RuleStage::Embed,
    validate: validators::check_device_colors,
    fix: Some(fixes::fix_device_colors),
};

const ALTERNATE_SPACES: Rule = Rule {
    name: "alternate-spaces",
    stage: RuleStage::Embed,
    validate: validators::check_alternate_spaces,
    fix: Some(fixes::fix_alternate_spaces),
};

const METADATA: Rule = Rule {
    name: "metadata",
    stage: RuleStage::Embed,
    validate: validators::check_metadata,
    fix: Some(fixes::fix_metadata),
};

static PDFA_1B: [Rule; 18] = [
    ENCRYPTION,
    FILE_STRUCTURE,
    EXTERNAL_STREAMS,
    POSTSCRIPT,
    XOBJECTS,
    ACTIONS,
    FORMS,
    ANNOTATIONS,
    TRANSFER_FUNCTIONS,
    LZW,
    JPEG2000,
    TRANSPARENCY,
    OPTIONAL_CONTENT,
    EMBEDDED_FILES,
    FONTS,
    OUTPUT_INTENT,
    DEVICE_COLORS,
    METADATA,
];

static PDFA_1A: [Rule; 19] = [
    ENCRYPTION,
    FILE_STRUCTURE,
    EXTERNAL_STREAMS,
    POSTSCRIPT,
    XOBJECTS,
    ACTIONS,
    FORMS,
    ANNOTATIONS,
    TRANSFER_FUNCTIONS,
    LZW,
    JPEG2000,
    TRANSPARENCY,
    OPTIONAL_CONTENT,
    EMBEDDED_FILES,
    STRUCTURE,
    FONTS,
    OUTPUT_INTENT,
    DEVICE_COLORS,
    METADATA,
];

// Parts 2 and 3 share tables; the embedded-file and annotation checks read the part
// from the context.
static PDFA_23B: [Rule; 16] = [
    ENCRYPTION,
    FILE_STRUCTURE,
    EXTERNAL_STREAMS,
    POSTSCRIPT,
    XOBJECTS,
    ACTIONS,
    FORMS,
    ANNOTATIONS,
    TRANSFER_FUNCTIONS,
    LZW,
    EMBEDDED_FILES,
    FONTS,
    OUTPUT_INTENT,
    DEVICE_COLORS,
    ALTERNATE_SPACES,
    METADATA,
];

static PDFA_23A: [Rule; 17] = [
    ENCRYPTION,
    FILE_STRUCTURE,
    EXTERNAL_STREAMS,
    POSTSCRIPT,
    XOBJECTS,
    ACTIONS,
    FORMS,
    ANNOTATIONS,
    TRANSFER_FUNCTIONS,
    LZW,
    EMBEDDED_FILES,
    STRUCTURE,
    FONTS,
    OUTPUT_INTENT,
    DEVICE_COLORS,
    ALTERNATE_SPACES,
    METADATA,
];

/// The ordered rules for `standard`: every `Fix`-stage rule precedes every
/// `Embed`-stage rule, and metadata comes last.
pub fn rules_for(standard: PdfAStandard) -> &'static [Rule] {
    match standard {
        PdfAStandard::A1A => &PDFA_1A,
        PdfAStandard::A1B => &PDFA_1B,
        PdfAStandard::A2A | PdfAStandard::A3A => &PDFA_23A,
        PdfAStandard::A2B | PdfAStandard::A3B => &PDFA_23B,
    }
}

/// Run every check for `ctx.standard`, in pipeline order.
pub fn validate_all(doc: &Document, ctx: &RuleContext<'_>) -> Vec<Violation> {
    rules_for(ctx.standard)
        .iter()
        .flat_map(|rule| {
            let found = (rule.validate)(doc, ctx);
            if !found.is_empty() {
                log::debug!("Rule {} found {} violation(s)", rule.name, found.len());
            }
            found
        })
        .collect()
}
