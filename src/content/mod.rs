//! Content stream scanning.
//!
//! Content streams use postfix notation: operands come before their operator.
//! The compliance checks only need to know which operators appear with which
//! operands, so streams are read into a flat list of [`Operation`]s and never
//! executed.

pub mod parser;

pub use parser::{parse_content_stream, Operation};
