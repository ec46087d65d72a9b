//! PDF object parser.
//!
//! Recursive descent over the [`Tokenizer`]:
//! 1. read a token
//! 2. decide from its type what object starts there
//! 3. recurse for arrays and dictionaries
//!
//! `N G R` references are recognised by a two-token lookahead. A dictionary followed by
//! the `stream` keyword inside an indirect object becomes a stream, whose length comes
//! from `/Length` (resolved through a [`LengthResolver`] when indirect).

use crate::error::{Error, Result};
use crate::lexer::{decode_hex_string, decode_literal_at, SpannedToken, Token, Tokenizer};
use crate::object::{Dict, Object, ObjectRef};
use crate::parser_config::ParserOptions;

/// Resolves an indirect `/Length` to its integer value.
pub trait LengthResolver {
    /// Value of the integer object `length_ref`, if known.
    fn resolve_length(&self, length_ref: ObjectRef) -> Option<i64>;
}

impl<F> LengthResolver for F
where
    F: Fn(ObjectRef) -> Option<i64>,
{
    fn resolve_length(&self, length_ref: ObjectRef) -> Option<i64> {
        self(length_ref)
    }
}

/// Resolver for callers without an object index: indirect lengths stay unknown.
pub struct NoLengthResolver;

impl LengthResolver for NoLengthResolver {
    fn resolve_length(&self, _length_ref: ObjectRef) -> Option<i64> {
        None
    }
}

/// Recursive-descent parser for PDF objects.
pub struct ObjectParser<'a> {
    tokens: Tokenizer<'a>,
    options: ParserOptions,
}

impl<'a> ObjectParser<'a> {
    /// Parser positioned at the start of `data`.
    pub fn new(data: &'a [u8], options: ParserOptions) -> Self {
        Self {
            tokens: Tokenizer::new(data).with_strict(options.strict),
            options,
        }
    }

    /// Parser positioned at `offset`.
    pub fn at(data: &'a [u8], offset: usize, options: ParserOptions) -> Self {
        let mut parser = Self::new(data, options);
        parser.seek(offset);
        parser
    }

    /// Current absolute position.
    pub fn position(&self) -> usize {
        self.tokens.position()
    }

    /// Move to an absolute position.
    pub fn seek(&mut self, offset: usize) {
        self.tokens.seek(offset);
    }

    /// Read the next raw token.
    pub fn next_token(&mut self) -> Result<Option<SpannedToken<'a>>> {
        self.tokens.next_token()
    }

    /// Look at the next raw token without consuming it.
    pub fn peek_token(&mut self) -> Result<Option<SpannedToken<'a>>> {
        self.tokens.peek_token()
    }

    /// Consume the keyword `word` or fail.
    pub fn expect_keyword(&mut self, word: &[u8]) -> Result<()> {
        match self.next_token()? {
            Some(SpannedToken {
                token: Token::Keyword(k),
                ..
            }) if k == word => Ok(()),
            Some(t) => Err(Error::syntax(
                t.offset,
                format!("expected '{}'", String::from_utf8_lossy(word)),
            )),
            None => Err(self.eof(format!("expected '{}'", String::from_utf8_lossy(word)))),
        }
    }

    /// Parse one direct object.
    pub fn parse_object(&mut self) -> Result<Object> {
        self.parse_nested(0)
    }

    /// Parse an indirect object `N G obj ... endobj` at the current position.
    pub fn parse_indirect_object(
        &mut self,
        resolver: &dyn LengthResolver,
    ) -> Result<(ObjectRef, Object)> {
        let header_offset = self.position();
        let id = self.expect_integer("object number")?;
        let gen = self.expect_integer("generation number")?;
        match self.next_token()? {
            Some(SpannedToken {
                token: Token::ObjStart,
                ..
            }) => {},
            Some(t) => return Err(Error::syntax(t.offset, "expected 'obj'")),
            None => return Err(self.eof("expected 'obj'")),
        }
        if id < 0 || !(0..=u16::MAX as i64).contains(&gen) || id > u32::MAX as i64 {
            return Err(Error::syntax(header_offset, "object number out of range"));
        }
        let obj_ref = ObjectRef::new(id as u32, gen as u16);

        let mut object = self.parse_object()?;

        if let Some(SpannedToken {
            token: Token::StreamStart,
            offset,
            raw,
        }) = self.peek_token().unwrap_or(None)
        {
            let dict = match object {
                Object::Dictionary(d) => d,
                other => {
                    return Err(Error::syntax(
                        offset,
                        format!("stream keyword after {}", other.type_name()),
                    ))
                },
            };
            let data = self.read_stream_data(&dict, offset + raw.len(), resolver)?;
            object = Object::Stream {
                dict,
                data: bytes::Bytes::from(data),
            };
        }

        match self.peek_token().unwrap_or(None) {
            Some(SpannedToken {
                token: Token::ObjEnd,
                ..
            }) => {
                self.next_token()?;
            },
            other if self.options.strict => {
                let at = other.map(|t| t.offset).unwrap_or(self.tokens.data().len());
                return Err(Error::syntax(at, format!("missing endobj for {}", obj_ref)));
            },
            _ => log::warn!("Object {} has no endobj, accepting", obj_ref),
        }

        Ok((obj_ref, object))
    }

    fn parse_nested(&mut self, depth: usize) -> Result<Object> {
        let Some(tok) = self.next_token()? else {
            return Err(self.eof("expected an object"));
        };

        match tok.token {
            Token::Integer(n) => Ok(self.maybe_reference(n)?.unwrap_or(Object::Integer(n))),
            Token::Real(r) => Ok(Object::Real(r)),
            Token::True => Ok(Object::Boolean(true)),
            Token::False => Ok(Object::Boolean(false)),
            Token::Null => Ok(Object::Null),
            Token::Name(name) => Ok(Object::Name(name)),
            Token::LiteralString(raw) => Ok(Object::String(decode_literal_at(
                raw,
                self.options.strict,
                tok.offset + 1,
            )?)),
            Token::HexString(raw) => Ok(Object::String(decode_hex_string(raw))),
            Token::ArrayStart => {
                self.check_depth(depth, tok.offset)?;
                self.parse_array(depth + 1)
            },
            Token::DictStart => {
                self.check_depth(depth, tok.offset)?;
                self.parse_dictionary(depth + 1).map(Object::Dictionary)
            },
            other => Err(Error::syntax(tok.offset, format!("unexpected token {:?}", other))),
        }
    }

    fn check_depth(&self, depth: usize, offset: usize) -> Result<()> {
        if depth >= self.options.max_nesting {
            log::warn!("Object at offset {} nests deeper than {}", offset, self.options.max_nesting);
            return Err(Error::ResourceLimit {
                what: "object nesting depth",
                limit: self.options.max_nesting,
            });
        }
        Ok(())
    }

    /// After an integer, look for `G R`. Restores the cursor when absent.
    fn maybe_reference(&mut self, id: i64) -> Result<Option<Object>> {
        let saved = self.position();
        let gen = match self.tokens.next_token() {
            Ok(Some(SpannedToken {
                token: Token::Integer(g),
                ..
            })) => g,
            _ => {
                self.seek(saved);
                return Ok(None);
            },
        };
        match self.tokens.next_token() {
            Ok(Some(SpannedToken { token: Token::R, .. }))
                if (0..=u32::MAX as i64).contains(&id) && (0..=u16::MAX as i64).contains(&gen) =>
            {
                Ok(Some(Object::Reference(ObjectRef::new(id as u32, gen as u16))))
            },
            _ => {
                self.seek(saved);
                Ok(None)
            },
        }
    }

    fn parse_array(&mut self, depth: usize) -> Result<Object> {
        let mut items = Vec::new();
        loop {
            match self.peek_token()? {
                Some(SpannedToken {
                    token: Token::ArrayEnd,
                    ..
                }) => {
                    self.next_token()?;
                    return Ok(Object::Array(items));
                },
                Some(_) => items.push(self.parse_nested(depth)?),
                None => return Err(self.eof("unterminated array")),
            }
        }
    }

    fn parse_dictionary(&mut self, depth: usize) -> Result<Dict> {
        let mut dict = Dict::new();
        loop {
            let Some(tok) = self.next_token()? else {
                return Err(self.eof("unterminated dictionary"));
            };
            let key = match tok.token {
                Token::DictEnd => return Ok(dict),
                Token::Name(key) => key,
                other => {
                    return Err(Error::syntax(
                        tok.offset,
                        format!("dictionary key must be a name, found {:?}", other),
                    ))
                },
            };

            if let Some(SpannedToken {
                token: Token::DictEnd,
                offset,
                ..
            }) = self.peek_token()?
            {
                if self.options.strict {
                    return Err(Error::syntax(offset, format!("missing value for /{}", key)));
                }
                log::warn!("Dictionary key /{} has no value, dropping it", key);
                continue;
            }

            let value = self.parse_nested(depth)?;
            // A null value is equivalent to an absent key.
            if !value.is_null() {
                dict.insert(key, value);
            }
        }
    }

    /// Read stream bytes; `after_keyword` is the offset just past `stream`.
    fn read_stream_data(
        &mut self,
        dict: &Dict,
        after_keyword: usize,
        resolver: &dyn LengthResolver,
    ) -> Result<Vec<u8>> {
        let data = self.tokens.data();
        let mut start = after_keyword;
        if data[start..].starts_with(b"\r\n") {
            start += 2;
        } else if data[start..].starts_with(b"\n") {
            start += 1;
        } else if data[start..].starts_with(b"\r") {
            if self.options.strict {
                return Err(Error::syntax(start, "stream keyword followed by CR alone"));
            }
            start += 1;
        }

        let declared = match dict.get("Length") {
            Some(Object::Integer(n)) => Some(*n),
            Some(Object::Reference(r)) => resolver.resolve_length(*r),
            _ => None,
        };

        if let Some(len) = declared.filter(|n| *n >= 0).map(|n| n as usize) {
            if let Some(end) = start.checked_add(len).filter(|e| *e <= data.len()) {
                let after = crate::lexer::skip_ws(&data[end..]);
                if after.starts_with(b"endstream") {
                    let resume = data.len() - after.len() + b"endstream".len();
                    self.seek(resume);
                    return Ok(data[start..end].to_vec());
                }
            }
        }

        if self.options.strict {
            return Err(Error::syntax(start, "stream /Length does not reach endstream"));
        }

        let Some(found) = find_keyword(&data[start..], b"endstream") else {
            return Err(Error::syntax(start, "unterminated stream"));
        };
        log::warn!(
            "Stream /Length {:?} is wrong, recovered {} bytes by scanning for endstream",
            declared,
            found
        );
        let mut end = start + found;
        // The EOL before endstream is not part of the data.
        if end > start && data[end - 1] == b'\n' {
            end -= 1;
        }
        if end > start && data[end - 1] == b'\r' {
            end -= 1;
        }
        self.seek(start + found + b"endstream".len());
        Ok(data[start..end].to_vec())
    }

    fn expect_integer(&mut self, what: &str) -> Result<i64> {
        match self.next_token()? {
            Some(SpannedToken {
                token: Token::Integer(n),
                ..
            }) => Ok(n),
            Some(t) => Err(Error::syntax(t.offset, format!("expected {}", what))),
            None => Err(self.eof(format!("expected {}", what))),
        }
    }

    fn eof(&self, reason: impl Into<String>) -> Error {
        let reason: String = reason.into();
        Error::syntax(self.tokens.data().len(), format!("{} at end of input", reason))
    }
}

/// Position of `keyword` in `haystack` when it stands as a whole token.
pub(crate) fn find_keyword(haystack: &[u8], keyword: &[u8]) -> Option<usize> {
    let mut from = 0;
    while let Some(pos) = haystack[from..]
        .windows(keyword.len())
        .position(|w| w == keyword)
    {
        let at = from + pos;
        let before_ok = at == 0 || !crate::lexer::is_regular(haystack[at - 1]);
        let after_ok = haystack
            .get(at + keyword.len())
            .map_or(true, |&c| !crate::lexer::is_regular(c));
        if before_ok && after_ok {
            return Some(at);
        }
        from = at + 1;
    }
    None
}

/// Parse a single direct object from `data`.
pub fn parse_object(data: &[u8], options: ParserOptions) -> Result<Object> {
    ObjectParser::new(data, options).parse_object()
}

/// Parse the indirect object at `offset`.
pub fn parse_indirect_object_at(
    data: &[u8],
    offset: usize,
    options: ParserOptions,
    resolver: &dyn LengthResolver,
) -> Result<(ObjectRef, Object)> {
    if offset >= data.len() {
        return Err(Error::syntax(offset, "object offset beyond end of file"));
    }
    ObjectParser::at(data, offset, options).parse_indirect_object(resolver)
}

/// True if `data` at `offset` starts with `id G obj` (any generation).
pub(crate) fn has_object_header(data: &[u8], offset: usize, id: u32) -> bool {
    let Some(slice) = data.get(offset..) else {
        return false;
    };
    let mut tokens = Tokenizer::new(slice);
    matches!(
        (tokens.next_token(), tokens.next_token(), tokens.next_token()),
        (
            Ok(Some(SpannedToken { token: Token::Integer(n), .. })),
            Ok(Some(SpannedToken { token: Token::Integer(_), .. })),
            Ok(Some(SpannedToken { token: Token::ObjStart, .. })),
        ) if n == id as i64
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lenient(input: &[u8]) -> Object {
        parse_object(input, ParserOptions::lenient()).unwrap()
    }

    #[test]
    fn test_parse_scalars() {
        assert_eq!(lenient(b"null"), Object::Null);
        assert_eq!(lenient(b"true"), Object::Boolean(true));
        assert_eq!(lenient(b"-42"), Object::Integer(-42));
        assert_eq!(lenient(b"2.5"), Object::Real(2.5));
        assert_eq!(lenient(b"/Type"), Object::name("Type"));
        assert_eq!(lenient(b"(a\\)b)"), Object::String(b"a)b".to_vec()));
        assert_eq!(lenient(b"<48656C6C6F>"), Object::String(b"Hello".to_vec()));
    }

    #[test]
    fn test_reference_lookahead_in_array() {
        let arr = lenient(b"[1 2 3 0 R]");
        let items = arr.as_array().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0], Object::Integer(1));
        assert_eq!(items[1], Object::Integer(2));
        assert_eq!(items[2], Object::Reference(ObjectRef::new(3, 0)));
    }

    #[test]
    fn test_parse_dictionary() {
        let obj = lenient(b"<< /Type /Page /Count 3 /Kids [4 0 R] /Skip null >>");
        let dict = obj.as_dict().unwrap();
        assert_eq!(dict.get("Type"), Some(&Object::name("Page")));
        assert_eq!(dict.get("Count"), Some(&Object::Integer(3)));
        assert!(!dict.contains_key("Skip"));
    }

    #[test]
    fn test_missing_value_strict_vs_lenient() {
        let obj = lenient(b"<< /A >>");
        assert!(obj.as_dict().unwrap().is_empty());
        assert!(parse_object(b"<< /A >>", ParserOptions::strict()).is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}{}", "[".repeat(20), "]".repeat(20));
        let opts = ParserOptions::lenient().with_max_nesting(10);
        assert!(matches!(
            parse_object(deep.as_bytes(), opts),
            Err(Error::ResourceLimit { .. })
        ));
        assert!(parse_object(deep.as_bytes(), ParserOptions::lenient()).is_ok());
    }

    #[test]
    fn test_unterminated_dictionary() {
        assert!(matches!(
            parse_object(b"<< /A 1", ParserOptions::lenient()),
            Err(Error::MalformedSyntax { .. })
        ));
    }

    #[test]
    fn test_indirect_object() {
        let data = b"7 0 obj\n<< /A 1 >>\nendobj\n";
        let (r, obj) =
            parse_indirect_object_at(data, 0, ParserOptions::strict(), &NoLengthResolver).unwrap();
        assert_eq!(r, ObjectRef::new(7, 0));
        assert!(obj.as_dict().is_some());
    }

    #[test]
    fn test_stream_with_direct_length() {
        let data = b"1 0 obj\n<< /Length 5 >>\nstream\r\nHello\nendstream\nendobj";
        let (_, obj) =
            parse_indirect_object_at(data, 0, ParserOptions::strict(), &NoLengthResolver).unwrap();
        assert_eq!(obj.decode_stream_data().unwrap(), b"Hello");
    }

    #[test]
    fn test_stream_with_indirect_length() {
        let data = b"1 0 obj\n<< /Length 2 0 R >>\nstream\nHello\nendstream\nendobj";
        let resolver = |r: ObjectRef| if r.id == 2 { Some(5) } else { None };
        let (_, obj) =
            parse_indirect_object_at(data, 0, ParserOptions::strict(), &resolver).unwrap();
        assert_eq!(obj.decode_stream_data().unwrap(), b"Hello");
    }

    #[test]
    fn test_stream_with_wrong_length() {
        let data = b"1 0 obj\n<< /Length 99 >>\nstream\nHello\nendstream\nendobj";
        let (_, obj) =
            parse_indirect_object_at(data, 0, ParserOptions::lenient(), &NoLengthResolver).unwrap();
        assert_eq!(obj.decode_stream_data().unwrap(), b"Hello");
        assert!(
            parse_indirect_object_at(data, 0, ParserOptions::strict(), &NoLengthResolver).is_err()
        );
    }

    #[test]
    fn test_missing_endobj() {
        let data = b"1 0 obj 42 2 0 obj";
        let (_, obj) =
            parse_indirect_object_at(data, 0, ParserOptions::lenient(), &NoLengthResolver).unwrap();
        assert_eq!(obj, Object::Integer(42));
        assert!(
            parse_indirect_object_at(data, 0, ParserOptions::strict(), &NoLengthResolver).is_err()
        );
    }

    #[test]
    fn test_find_keyword_whole_token() {
        assert_eq!(find_keyword(b"xendstream endstream", b"endstream"), Some(11));
        assert_eq!(find_keyword(b"no match", b"endstream"), None);
    }

    #[test]
    fn test_has_object_header() {
        let data = b"junk 12 0 obj << >> endobj";
        assert!(has_object_header(data, 5, 12));
        assert!(!has_object_header(data, 5, 13));
        assert!(!has_object_header(data, 0, 12));
    }
}
