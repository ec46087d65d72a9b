//! PDF lexer (tokenizer).
//!
//! Single tokens are recognised with `nom` combinators ([`token`]). [`Tokenizer`] wraps
//! them in a lazy, restartable iterator that reports each token with its absolute
//! byte offset and raw span, and turns recognition failures into
//! [`Error::MalformedSyntax`] at the offset of the failing token.
//!
//! # PDF Syntax Overview
//!
//! - Numbers: integers (42, -123) and reals (3.14, -.5)
//! - Strings: literal `(Hello)` and hexadecimal `<48656C6C6F>`
//! - Names: `/Type`, with `#XX` escapes
//! - Delimiters: `[ ] << >> { }`
//! - Keywords: `true false null obj endobj stream endstream R`, and any other run of
//!   regular characters (content stream operators, `xref`, `trailer`, `startxref`)
//!
//! Whitespace (space, \t, \r, \n, \0, \f) and comments (% to EOL) are skipped.

use crate::error::{Error, Result};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_while, take_while1},
    character::complete::{char, digit1, one_of},
    combinator::{opt, recognize, value},
    sequence::preceded,
    IResult,
};

/// Token types recognized by the PDF lexer.
#[derive(Debug, PartialEq, Clone)]
pub enum Token<'a> {
    /// Integer number (e.g., 42, -123)
    Integer(i64),
    /// Real number (e.g., 3.14, -2.5, .5)
    Real(f64),
    /// Raw literal string body, escapes not yet decoded
    LiteralString(&'a [u8]),
    /// Raw hex string body, whitespace preserved
    HexString(&'a [u8]),
    /// Name with `#XX` escapes decoded
    Name(String),
    /// `true`
    True,
    /// `false`
    False,
    /// `null`
    Null,
    /// `[`
    ArrayStart,
    /// `]`
    ArrayEnd,
    /// `<<`
    DictStart,
    /// `>>`
    DictEnd,
    /// `{`
    ProcStart,
    /// `}`
    ProcEnd,
    /// `obj`
    ObjStart,
    /// `endobj`
    ObjEnd,
    /// `stream`
    StreamStart,
    /// `endstream`
    StreamEnd,
    /// `R` (as in `10 0 R`)
    R,
    /// Any other bare keyword: content operators, `xref`, `trailer`, `startxref`...
    Keyword(&'a [u8]),
}

/// A token together with its position in the input.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken<'a> {
    /// The token itself
    pub token: Token<'a>,
    /// Absolute offset of the first byte of the token
    pub offset: usize,
    /// Raw bytes the token was read from
    pub raw: &'a [u8],
}

/// PDF whitespace characters (ISO 32000-1, Table 1).
pub fn is_whitespace(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | b'\n' | 0x00 | 0x0C)
}

/// PDF delimiter characters (ISO 32000-1, Table 2).
pub fn is_delimiter(c: u8) -> bool {
    matches!(
        c,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

/// Regular characters: neither whitespace nor delimiters.
pub fn is_regular(c: u8) -> bool {
    !is_whitespace(c) && !is_delimiter(c)
}

fn whitespace(input: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while1(is_whitespace)(input)
}

fn comment(input: &[u8]) -> IResult<&[u8], &[u8]> {
    recognize(preceded(char('%'), take_till(|c| c == b'\r' || c == b'\n')))(input)
}

/// Skip all whitespace and comments.
pub fn skip_ws(input: &[u8]) -> &[u8] {
    let mut remaining = input;
    while let Ok((rest, _)) = alt((whitespace, comment))(remaining) {
        remaining = rest;
    }
    remaining
}

/// Parse a number from a complete run of regular characters.
fn parse_number(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (rest, sign) = opt(one_of("+-"))(input)?;
    let (rest, int_part) = opt(digit1)(rest)?;
    let (rest, frac_part) = opt(preceded(char('.'), opt(digit1)))(rest)?;

    if int_part.is_none() && !matches!(frac_part, Some(Some(_))) {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Digit,
        )));
    }

    let negative = sign == Some('-');

    if let Some(frac) = frac_part {
        let text = format!("{}.{}", digits(int_part), digits(frac));
        let value: f64 = text.parse().map_err(|_| {
            nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Float))
        })?;
        return Ok((rest, Token::Real(if negative { -value } else { value })));
    }

    let text = digits(int_part);
    match text.parse::<i64>() {
        Ok(v) => Ok((rest, Token::Integer(if negative { -v } else { v }))),
        // Out of range integers degrade to reals, as most readers do.
        Err(_) => {
            let v: f64 = text.parse().map_err(|_| {
                nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit))
            })?;
            Ok((rest, Token::Real(if negative { -v } else { v })))
        },
    }
}

fn digits(d: Option<&[u8]>) -> &str {
    d.and_then(|d| std::str::from_utf8(d).ok()).unwrap_or("0")
}

/// Parse a keyword or number: a maximal run of regular characters.
fn parse_regular(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (rest, run) = take_while1(is_regular)(input)?;
    let token = match run {
        b"true" => Token::True,
        b"false" => Token::False,
        b"null" => Token::Null,
        b"obj" => Token::ObjStart,
        b"endobj" => Token::ObjEnd,
        b"stream" => Token::StreamStart,
        b"endstream" => Token::StreamEnd,
        b"R" => Token::R,
        _ => match parse_number(run) {
            Ok((tail, number)) if tail.is_empty() => number,
            _ => Token::Keyword(run),
        },
    };
    Ok((rest, token))
}

/// Scan a literal string, returning its raw body (without the outer parentheses).
fn parse_literal_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (body, _) = char('(')(input)?;
    let mut depth = 1usize;
    let mut pos = 0usize;

    while pos < body.len() {
        match body[pos] {
            b'\\' => pos += 2,
            b'(' => {
                depth += 1;
                pos += 1;
            },
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((&body[pos + 1..], Token::LiteralString(&body[..pos])));
                }
                pos += 1;
            },
            _ => pos += 1,
        }
    }

    Err(nom::Err::Failure(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Char,
    )))
}

/// Scan a hex string, returning its raw body (without angle brackets).
fn parse_hex_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    if input.starts_with(b"<<") {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Tag,
        )));
    }
    let (rest, _) = char('<')(input)?;
    let (rest, body) = take_while(|c: u8| c.is_ascii_hexdigit() || is_whitespace(c))(rest)?;
    match rest.first() {
        Some(b'>') => Ok((&rest[1..], Token::HexString(body))),
        _ => Err(nom::Err::Failure(nom::error::Error::new(
            input,
            nom::error::ErrorKind::HexDigit,
        ))),
    }
}

fn parse_name(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (rest, raw) = preceded(char('/'), take_while(is_regular))(input)?;
    Ok((rest, Token::Name(decode_name_escapes(raw))))
}

fn parse_delimiter(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    alt((
        value(Token::DictStart, tag(b"<<")),
        value(Token::DictEnd, tag(b">>")),
        value(Token::ArrayStart, tag(b"[")),
        value(Token::ArrayEnd, tag(b"]")),
        value(Token::ProcStart, tag(b"{")),
        value(Token::ProcEnd, tag(b"}")),
    ))(input)
}

/// Parse a single PDF token, skipping leading whitespace and comments.
pub fn token(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let input = skip_ws(input);
    alt((
        parse_delimiter,
        parse_name,
        parse_literal_string,
        parse_hex_string,
        parse_regular,
    ))(input)
}

/// Decode `#XX` escapes in a raw name.
///
/// Each decoded byte becomes the char with the same code point, so names round-trip
/// through the writer byte for byte. An incomplete escape is kept literally.
///
/// ```
/// # use pdfa_oxide::lexer::decode_name_escapes;
/// assert_eq!(decode_name_escapes(b"A#20B#23C"), "A B#C");
/// assert_eq!(decode_name_escapes(b"A#"), "A#");
/// ```
pub fn decode_name_escapes(raw: &[u8]) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'#' {
            if let Some(byte) = name_escape_at(raw, i) {
                out.push(byte as char);
                i += 3;
                continue;
            }
        }
        out.push(raw[i] as char);
        i += 1;
    }
    out
}

fn name_escape_at(raw: &[u8], i: usize) -> Option<u8> {
    let hi = crate::decoders::hex_value(*raw.get(i + 1)?)?;
    let lo = crate::decoders::hex_value(*raw.get(i + 2)?)?;
    Some((hi << 4) | lo)
}

/// Decode the escapes of a raw literal string body (ISO 32000-1, 7.3.4.2).
///
/// In lenient mode the backslash of an unknown escape is dropped. In strict mode it is
/// a syntax error. End-of-line sequences inside the string read as a single LF.
pub fn decode_literal_string(raw: &[u8], strict: bool) -> Result<Vec<u8>> {
    decode_literal_at(raw, strict, 0)
}

/// As [`decode_literal_string`], reporting errors relative to `base`.
pub(crate) fn decode_literal_at(raw: &[u8], strict: bool, base: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        let c = raw[i];
        match c {
            b'\\' => {
                let Some(&next) = raw.get(i + 1) else {
                    return Err(Error::syntax(base + i, "backslash at end of literal string"));
                };
                i += 2;
                match next {
                    b'n' => out.push(b'\n'),
                    b'r' => out.push(b'\r'),
                    b't' => out.push(b'\t'),
                    b'b' => out.push(0x08),
                    b'f' => out.push(0x0C),
                    b'(' | b')' | b'\\' => out.push(next),
                    b'0'..=b'7' => {
                        let mut code = (next - b'0') as u32;
                        let mut taken = 1;
                        while taken < 3 {
                            match raw.get(i) {
                                Some(&d @ b'0'..=b'7') => {
                                    code = code * 8 + (d - b'0') as u32;
                                    i += 1;
                                    taken += 1;
                                },
                                _ => break,
                            }
                        }
                        out.push((code & 0xFF) as u8);
                    },
                    b'\r' => {
                        if raw.get(i) == Some(&b'\n') {
                            i += 1;
                        }
                    },
                    b'\n' => {},
                    other if strict => {
                        return Err(Error::syntax(
                            base + i - 2,
                            format!("unknown escape sequence '\\{}'", other as char),
                        ));
                    },
                    other => out.push(other),
                }
            },
            b'\r' => {
                out.push(b'\n');
                i += 1;
                if raw.get(i) == Some(&b'\n') {
                    i += 1;
                }
            },
            _ => {
                out.push(c);
                i += 1;
            },
        }
    }

    Ok(out)
}

/// Decode a raw hex string body. Whitespace is ignored and an odd final digit is
/// padded with `0`.
pub fn decode_hex_string(raw: &[u8]) -> Vec<u8> {
    let digits: Vec<u8> = raw
        .iter()
        .filter_map(|&c| crate::decoders::hex_value(c))
        .collect();
    digits
        .chunks(2)
        .map(|pair| (pair[0] << 4) | pair.get(1).copied().unwrap_or(0))
        .collect()
}

/// Lazy, restartable tokenizer over a byte slice.
///
/// Each step consumes at least one byte, so iteration always ends. After an error
/// the iterator is exhausted; [`Tokenizer::seek`] restarts it anywhere.
#[derive(Debug, Clone)]
pub struct Tokenizer<'a> {
    data: &'a [u8],
    pos: usize,
    strict: bool,
}

impl<'a> Tokenizer<'a> {
    /// Create a lenient tokenizer positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            strict: false,
        }
    }

    /// Switch strict escape checking on or off.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Whether strict escape checking is on.
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Current absolute position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Move the cursor to an absolute position (clamped to the input length).
    pub fn seek(&mut self, offset: usize) {
        self.pos = offset.min(self.data.len());
    }

    /// The whole input.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Input from the cursor onwards.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Advance past whitespace and comments.
    pub fn skip_whitespace(&mut self) {
        let rest = skip_ws(self.remaining());
        self.pos = self.data.len() - rest.len();
    }

    /// Read the next token. `Ok(None)` marks the end of input.
    pub fn next_token(&mut self) -> Result<Option<SpannedToken<'a>>> {
        self.skip_whitespace();
        let start = self.pos;
        let input = self.remaining();
        if input.is_empty() {
            return Ok(None);
        }

        match token(input) {
            Ok((rest, tok)) => {
                let end = self.data.len() - rest.len();
                let raw = &self.data[start..end];
                if self.strict {
                    self.check_strict(&tok, start)?;
                }
                self.pos = end;
                Ok(Some(SpannedToken {
                    token: tok,
                    offset: start,
                    raw,
                }))
            },
            Err(_) => Err(Error::syntax(start, describe_failure(input))),
        }
    }

    /// Look at the next token without consuming it.
    pub fn peek_token(&mut self) -> Result<Option<SpannedToken<'a>>> {
        let saved = self.pos;
        let result = self.next_token();
        self.pos = saved;
        result
    }

    fn check_strict(&self, tok: &Token<'a>, start: usize) -> Result<()> {
        match tok {
            Token::LiteralString(raw) => decode_literal_at(raw, true, start + 1).map(|_| ()),
            Token::Name(_) => {
                let raw = &self.remaining()[1..];
                let end = raw.iter().position(|&c| !is_regular(c)).unwrap_or(raw.len());
                let name = &raw[..end];
                match name
                    .iter()
                    .enumerate()
                    .find(|(i, &c)| c == b'#' && name_escape_at(name, *i).is_none())
                {
                    Some((i, _)) => Err(Error::syntax(start + 1 + i, "invalid name escape")),
                    None => Ok(()),
                }
            },
            _ => Ok(()),
        }
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Result<SpannedToken<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_token() {
            Ok(Some(tok)) => Some(Ok(tok)),
            Ok(None) => None,
            Err(e) => {
                self.pos = self.data.len();
                Some(Err(e))
            },
        }
    }
}

fn describe_failure(input: &[u8]) -> &'static str {
    match input.first() {
        Some(b'(') => {
            let mut escaped = false;
            for &c in &input[1..] {
                escaped = !escaped && c == b'\\';
            }
            if escaped {
                "backslash at end of input in literal string"
            } else {
                "unterminated literal string"
            }
        },
        Some(b'<') => {
            if input.contains(&b'>') {
                "invalid hex digit in hex string"
            } else {
                "unterminated hex string"
            }
        },
        Some(b')') => "unbalanced ')'",
        Some(b'>') => "unexpected '>'",
        _ => "unrecognised token",
    }
}
