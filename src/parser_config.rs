//! Parser configuration: strict/lenient behaviour and the mandatory resource bounds.
//!
//! Every bound is on by default. A conversion that exceeds one fails with
//! [`crate::error::Error::ResourceLimit`] instead of exhausting memory.
//!
//! # Example
//!
//! ```
//! use pdfa_oxide::parser_config::ParserOptions;
//!
//! let strict = ParserOptions::strict();
//! assert!(strict.strict);
//!
//! let custom = ParserOptions {
//!     max_objects: 10_000,
//!     ..ParserOptions::lenient()
//! };
//! assert!(!custom.strict);
//! ```

/// Default upper bound on a single decoded stream (256 MB).
pub const DEFAULT_MAX_DECOMPRESSED_SIZE: usize = 256 * 1024 * 1024;

/// Default upper bound on the input size (512 MB).
pub const DEFAULT_MAX_FILE_SIZE: usize = 512 * 1024 * 1024;

/// Default upper bound on the number of indirect objects.
pub const DEFAULT_MAX_OBJECTS: usize = 1_000_000;

/// Default nesting bound for arrays and dictionaries (ISO 32000-1, Annex C).
pub const DEFAULT_MAX_NESTING: usize = 100;

/// Parser options controlling error recovery and resource bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserOptions {
    /// Fail on the first syntax deviation (true) or attempt recovery (false).
    ///
    /// In lenient mode unknown string escapes lose their backslash, a wrong stream
    /// `/Length` falls back to scanning for `endstream`, and a broken cross-reference
    /// index triggers a linear-scan rebuild.
    pub strict: bool,

    /// Maximum object nesting depth.
    ///
    /// Guards against stack exhaustion from deeply nested arrays/dictionaries.
    pub max_nesting: usize,

    /// Maximum decoded size of one stream in bytes.
    pub max_decompressed_size: usize,

    /// Maximum accepted input size in bytes.
    pub max_file_size: usize,

    /// Maximum number of indirect objects in the cross-reference index.
    pub max_objects: usize,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self::lenient()
    }
}

impl ParserOptions {
    /// Create strict parser options.
    ///
    /// Syntax deviations are errors and broken indexes are not repaired.
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::lenient()
        }
    }

    /// Create lenient parser options (the default).
    pub fn lenient() -> Self {
        Self {
            strict: false,
            max_nesting: DEFAULT_MAX_NESTING,
            max_decompressed_size: DEFAULT_MAX_DECOMPRESSED_SIZE,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_objects: DEFAULT_MAX_OBJECTS,
        }
    }

    /// Set the nesting bound.
    pub fn with_max_nesting(mut self, depth: usize) -> Self {
        self.max_nesting = depth;
        self
    }

    /// Set the input size bound.
    pub fn with_max_file_size(mut self, bytes: usize) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Set the object count bound.
    pub fn with_max_objects(mut self, count: usize) -> Self {
        self.max_objects = count;
        self
    }

    /// Set the per-stream decoded size bound.
    pub fn with_max_decompressed_size(mut self, bytes: usize) -> Self {
        self.max_decompressed_size = bytes;
        self
    }
}
