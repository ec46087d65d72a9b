//! Resources a PDF/A file must carry inside itself.
//!
//! - [`fonts`]: font programs for unembedded fonts
//! - [`icc`]: ICC profiles and the PDF/A output intent
//! - [`xmp`]: the XMP metadata packet, kept in step with the Info dictionary
//! - [`attachments`]: embedded files for PDF/A-3
//!
//! The embedder only adds objects and rewrites the dictionaries that refer to them;
//! it never removes an object something still references.

pub mod attachments;
pub mod fonts;
pub mod icc;
pub mod xmp;

pub use attachments::{AFRelationship, EmbeddedFile};
pub use fonts::{
    ChainFontSource, DirectoryFontSource, FontFlags, FontProgram, FontSource, MemoryFontSource,
    NoFontSource,
};
pub use icc::{ColorModel, InstalledIntent};
pub use xmp::{XmpMetadata, XmpWriter};
