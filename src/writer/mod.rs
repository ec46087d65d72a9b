//! PDF output.
//!
//! [`ObjectSerializer`] turns single objects into bytes; [`PdfWriter`] assembles a
//! complete file from a [`Document`](crate::document::Document):
//!
//! ```text
//! Document
//!     ↓
//! [PdfWriter] (renumbering, compression, xref, trailer)
//!     ↓
//! [ObjectSerializer] (serializes PDF objects)
//!     ↓
//! PDF bytes
//! ```

mod object_serializer;
mod pdf_writer;

pub use object_serializer::{format_real, ObjectSerializer};
pub use pdf_writer::PdfWriter;

/// Options controlling how a document is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterOptions {
    /// Header version; `None` keeps the document's own version.
    pub version: Option<(u8, u8)>,
    /// Flate-compress streams that carry no filter yet.
    pub compress_streams: bool,
    /// Write a cross-reference stream instead of a classic table (PDF 1.5+).
    pub use_xref_stream: bool,
    /// Pack non-stream objects into object streams. Requires `use_xref_stream`.
    pub use_object_streams: bool,
    /// Request a linearized file. Accepted but not implemented.
    pub linearize: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            version: None,
            compress_streams: true,
            use_xref_stream: false,
            use_object_streams: false,
            linearize: false,
        }
    }
}

impl WriterOptions {
    /// Force the header version.
    pub fn with_version(mut self, version: (u8, u8)) -> Self {
        self.version = Some(version);
        self
    }

    /// Enable or disable stream compression.
    pub fn with_compress_streams(mut self, enabled: bool) -> Self {
        self.compress_streams = enabled;
        self
    }

    /// Enable or disable the cross-reference stream.
    pub fn with_xref_stream(mut self, enabled: bool) -> Self {
        self.use_xref_stream = enabled;
        self
    }

    /// Enable or disable object streams.
    pub fn with_object_streams(mut self, enabled: bool) -> Self {
        self.use_object_streams = enabled;
        self
    }

    /// Request linearization.
    pub fn with_linearize(mut self, enabled: bool) -> Self {
        self.linearize = enabled;
        self
    }
}
