//! Content stream parser.
//!
//! ```text
//! BT
//!   /F1 12 Tf
//!   100 700 Td
//!   (Hello, World!) Tj
//! ET
//! ```
//!
//! Operands are read with the regular object parser; any bare keyword ends the
//! operand list and names the operator. Inline images (`BI ... ID <data> EI`) carry
//! binary data and are handled separately.

use crate::error::{Error, Result};
use crate::lexer::{is_whitespace, SpannedToken, Token};
use crate::object::{Dict, Object};
use crate::parser::ObjectParser;
use crate::parser_config::ParserOptions;

/// One operator together with its operands.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    /// Operator keyword, e.g. `Tf` or `BDC`.
    pub operator: String,
    /// Operands in stream order.
    ///
    /// For an inline image (`BI`) this is the image dictionary followed by the
    /// raw image bytes as a string.
    pub operands: Vec<Object>,
}

impl Operation {
    /// Shorthand constructor.
    pub fn new(operator: &str, operands: Vec<Object>) -> Self {
        Self {
            operator: operator.to_string(),
            operands,
        }
    }

    /// The inline image dictionary, for `BI` operations.
    pub fn inline_image_dict(&self) -> Option<&Dict> {
        if self.operator != "BI" {
            return None;
        }
        self.operands.first()?.as_dict()
    }
}

/// Parse decoded content stream bytes into operations.
///
/// Unreadable operands are skipped with a warning; the stream is scanned to the end.
///
/// ```
/// use pdfa_oxide::content::parse_content_stream;
///
/// let ops = parse_content_stream(b"BT /F1 12 Tf (Hi) Tj ET").unwrap();
/// assert_eq!(ops.len(), 4);
/// assert_eq!(ops[1].operator, "Tf");
/// ```
pub fn parse_content_stream(data: &[u8]) -> Result<Vec<Operation>> {
    let mut parser = ObjectParser::new(data, ParserOptions::lenient());
    let mut operations = Vec::new();
    let mut operands = Vec::new();

    loop {
        let next = match parser.peek_token() {
            Ok(next) => next,
            Err(e) => {
                log::warn!("Content stream: {}", e);
                if !skip_past_error(&mut parser, &e, data.len()) {
                    break;
                }
                operands.clear();
                continue;
            },
        };
        let Some(SpannedToken { token, offset, .. }) = next else {
            break;
        };

        match token {
            Token::Keyword(b"BI") => {
                parser.next_token()?;
                operations.push(parse_inline_image(&mut parser, data)?);
                operands.clear();
            },
            Token::Keyword(word) => {
                parser.next_token()?;
                operations.push(Operation {
                    operator: String::from_utf8_lossy(word).into_owned(),
                    operands: std::mem::take(&mut operands),
                });
            },
            // Delimiters that cannot start an operand.
            Token::ArrayEnd | Token::DictEnd | Token::ProcStart | Token::ProcEnd => {
                log::warn!("Content stream: stray {:?} at {}", token, offset);
                parser.next_token()?;
            },
            _ => match parser.parse_object() {
                Ok(object) => operands.push(object),
                Err(e) => {
                    log::warn!("Content stream: skipping unreadable operand: {}", e);
                    if !skip_past_error(&mut parser, &e, data.len()) {
                        break;
                    }
                    operands.clear();
                },
            },
        }
    }

    if !operands.is_empty() {
        log::debug!("Content stream ends with {} dangling operands", operands.len());
    }
    Ok(operations)
}

/// Move one byte past the failure point. Returns false at end of input.
fn skip_past_error(parser: &mut ObjectParser<'_>, error: &Error, len: usize) -> bool {
    let at = match error {
        Error::MalformedSyntax { offset, .. } => *offset,
        _ => parser.position(),
    };
    let resume = at.max(parser.position()) + 1;
    if resume >= len {
        return false;
    }
    parser.seek(resume);
    true
}

/// Parse `key value ... ID <data> EI` after a `BI` keyword.
fn parse_inline_image(parser: &mut ObjectParser<'_>, data: &[u8]) -> Result<Operation> {
    let mut dict = Dict::new();
    loop {
        match parser.next_token()? {
            Some(SpannedToken {
                token: Token::Keyword(b"ID"),
                offset,
                raw,
            }) => {
                // A single whitespace byte separates ID from the data.
                let start = (offset + raw.len() + 1).min(data.len());
                let end = find_inline_image_end(data, start).unwrap_or(data.len());
                let image = data[start..end].to_vec();
                parser.seek((end + 3).min(data.len()));
                return Ok(Operation::new(
                    "BI",
                    vec![Object::Dictionary(dict), Object::String(image)],
                ));
            },
            Some(SpannedToken {
                token: Token::Name(key),
                ..
            }) => {
                let value = parser.parse_object()?;
                dict.insert(key, value);
            },
            Some(t) => {
                return Err(Error::syntax(t.offset, "unexpected token in inline image dictionary"));
            },
            None => {
                return Err(Error::syntax(data.len(), "inline image without ID"));
            },
        }
    }
}

/// Offset of the `EI` that ends inline image data starting at `start`.
///
/// `EI` must be preceded by whitespace and followed by whitespace or end of data.
fn find_inline_image_end(data: &[u8], start: usize) -> Option<usize> {
    let mut i = start;
    while i + 1 < data.len() {
        if &data[i..i + 2] == b"EI"
            && i > start
            && is_whitespace(data[i - 1])
            && data.get(i + 2).map_or(true, |c| is_whitespace(*c))
        {
            return Some(i - 1);
        }
        i += 1;
    }
    None
}
