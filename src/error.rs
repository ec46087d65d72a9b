//! Error types for the conversion engine.
//!
//! Internally the crate raises fine-grained [`Error`] variants. Every variant maps onto
//! one [`ErrorKind`], the small closed taxonomy that callers of [`crate::convert`] see.

use crate::object::ObjectRef;
use serde::Serialize;
use std::fmt;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Public error taxonomy surfaced by a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// Empty input, unknown standard code or an unusable option.
    InvalidArgument,
    /// The byte stream cannot be tokenized or parsed.
    MalformedSyntax,
    /// The cross-reference data is inconsistent.
    InvalidXRef,
    /// The document could not be repaired into a usable object graph.
    UnrecoverableDocument,
    /// The document uses a construct PDF/A forbids and that cannot be fixed.
    UnsupportedFeature,
    /// A resource required for compliance cannot be embedded.
    UnembeddableResource,
    /// An injected page-count policy rejected the document.
    PageLimitExceeded,
    /// A mandatory input size, object count or decompression bound was exceeded.
    ResourceLimit,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::MalformedSyntax => "MalformedSyntax",
            ErrorKind::InvalidXRef => "InvalidXRef",
            ErrorKind::UnrecoverableDocument => "UnrecoverableDocument",
            ErrorKind::UnsupportedFeature => "UnsupportedFeature",
            ErrorKind::UnembeddableResource => "UnembeddableResource",
            ErrorKind::PageLimitExceeded => "PageLimitExceeded",
            ErrorKind::ResourceLimit => "ResourceLimit",
        };
        f.write_str(name)
    }
}

/// Error types that can occur while converting a document.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// Caller supplied an unusable argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid PDF header (expected '%PDF-')
    #[error("Invalid PDF header: {0}")]
    InvalidHeader(String),

    /// Syntax error at a specific byte offset
    #[error("Malformed syntax at byte {offset}: {reason}")]
    MalformedSyntax {
        /// Byte offset where the error occurred
        offset: usize,
        /// Reason for the failure
        reason: String,
    },

    /// Cross-reference data is missing or inconsistent
    #[error("Invalid cross-reference data: {0}")]
    InvalidXRef(String),

    /// Repair failed, no usable object graph could be rebuilt
    #[error("Unrecoverable document: {0}")]
    UnrecoverableDocument(String),

    /// Referenced object not found in the document
    #[error("Object not found: {0}")]
    ObjectNotFound(ObjectRef),

    /// Object has wrong type
    #[error("Invalid object type: expected {expected}, found {found}")]
    InvalidObjectType {
        /// Expected object type
        expected: String,
        /// Actual object type found
        found: String,
    },

    /// Construct incompatible with PDF/A and not auto-fixable
    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// Resource required for compliance could not be embedded
    #[error("Cannot embed resource: {0}")]
    UnembeddableResource(String),

    /// Page count rejected by the configured policy
    #[error("Page limit exceeded: document has {pages} pages, limit is {limit}")]
    PageLimitExceeded {
        /// Pages found in the document
        pages: usize,
        /// Maximum allowed by the policy
        limit: usize,
    },

    /// Mandatory resource bound exceeded
    #[error("Resource limit exceeded: {what} (limit {limit})")]
    ResourceLimit {
        /// What was being counted
        what: &'static str,
        /// The configured bound
        limit: usize,
    },

    /// Stream decoding error
    #[error("Stream decoding error: {0}")]
    Decode(String),

    /// Unsupported stream filter
    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// Circular reference detected in object graph
    #[error("Circular reference detected: object {0}")]
    CircularReference(ObjectRef),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Map this error onto the public taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::InvalidHeader(_)
            | Error::MalformedSyntax { .. }
            | Error::InvalidObjectType { .. }
            | Error::Decode(_)
            | Error::Io(_) => ErrorKind::MalformedSyntax,
            Error::InvalidXRef(_) => ErrorKind::InvalidXRef,
            Error::UnrecoverableDocument(_)
            | Error::ObjectNotFound(_)
            | Error::CircularReference(_) => ErrorKind::UnrecoverableDocument,
            Error::UnsupportedFeature(_) | Error::UnsupportedFilter(_) => {
                ErrorKind::UnsupportedFeature
            },
            Error::UnembeddableResource(_) => ErrorKind::UnembeddableResource,
            Error::PageLimitExceeded { .. } => ErrorKind::PageLimitExceeded,
            Error::ResourceLimit { .. } => ErrorKind::ResourceLimit,
        }
    }

    /// Shorthand for a syntax error at `offset`.
    pub(crate) fn syntax(offset: usize, reason: impl Into<String>) -> Self {
        Error::MalformedSyntax {
            offset,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_syntax_message() {
        let err = Error::syntax(1234, "unterminated string");
        let msg = format!("{}", err);
        assert!(msg.contains("1234"));
        assert!(msg.contains("unterminated string"));
        assert_eq!(err.kind(), ErrorKind::MalformedSyntax);
    }

    #[test]
    fn test_object_not_found_error() {
        let err = Error::ObjectNotFound(ObjectRef::new(10, 0));
        assert!(format!("{}", err).contains("10 0 R"));
        assert_eq!(err.kind(), ErrorKind::UnrecoverableDocument);
    }

    #[test]
    fn test_page_limit_message() {
        let err = Error::PageLimitExceeded { pages: 12, limit: 10 };
        let msg = format!("{}", err);
        assert!(msg.contains("12"));
        assert!(msg.contains("10"));
        assert_eq!(err.kind(), ErrorKind::PageLimitExceeded);
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(Error::InvalidArgument("x".into()).kind(), ErrorKind::InvalidArgument);
        assert_eq!(Error::InvalidXRef("x".into()).kind(), ErrorKind::InvalidXRef);
        assert_eq!(Error::UnsupportedFeature("x".into()).kind(), ErrorKind::UnsupportedFeature);
        assert_eq!(
            Error::UnembeddableResource("x".into()).kind(),
            ErrorKind::UnembeddableResource
        );
        assert_eq!(
            Error::ResourceLimit {
                what: "objects",
                limit: 1
            }
            .kind(),
            ErrorKind::ResourceLimit
        );
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        assert_eq!(Error::from(io).kind(), ErrorKind::MalformedSyntax);
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::PageLimitExceeded.to_string(), "PageLimitExceeded");
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
