//! PDF object parser - converts tokens to [`PdfValue`]s.
//!
//! Handles the `<int> <int> R` lookahead, indirect object wrappers
//! (`N G obj ... endobj`) and stream bodies. References are never resolved
//! here; the only callback into the document is the `/Length` resolver used
//! to size a stream body.

use super::lexer::{Keyword, Lexer, Token};
use crate::error::{PdfError, Result, StructuralWarning};
use crate::model::{Dictionary, ObjectId, PdfStream, PdfValue};
use crate::utils::find_bytes;
use bytes::Bytes;

/// Default recursion limit for nested arrays and dictionaries.
pub const DEFAULT_MAX_NESTING: usize = 512;

/// An object read from an `N G obj ... endobj` wrapper.
#[derive(Debug, Clone, PartialEq)]
pub struct IndirectObject {
    /// Identity declared by the object header
    pub id: ObjectId,
    pub value: PdfValue,
    /// Set when the stream body had to be located by scanning for `endstream`
    pub warning: Option<StructuralWarning>,
}

/// PDF object parser over a byte buffer.
///
/// Uses [`Lexer`] for tokenization and a small pushback buffer for the
/// reference lookahead.
pub struct ObjectParser<'a> {
    lexer: Lexer<'a>,
    /// Shared buffer for zero-copy stream payloads
    source: Option<&'a Bytes>,
    /// Pushed-back tokens, popped from the end
    lookahead: Vec<(usize, Token)>,
    allow_refs: bool,
    max_depth: usize,
    depth: usize,
}

impl<'a> ObjectParser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            lexer: Lexer::new(data),
            source: None,
            lookahead: Vec::new(),
            allow_refs: true,
            max_depth: DEFAULT_MAX_NESTING,
            depth: 0,
        }
    }

    /// Parser whose stream payloads share `source` instead of copying.
    pub fn from_bytes(source: &'a Bytes) -> Self {
        let mut parser = Self::new(source.as_ref());
        parser.source = Some(source);
        parser
    }

    /// Parser for content streams: `N G R` is never folded into a reference.
    pub(crate) fn for_content(data: &'a [u8]) -> Self {
        let mut parser = Self::new(data);
        parser.allow_refs = false;
        parser
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Offset of the next unread token.
    pub fn tell(&self) -> usize {
        match self.lookahead.last() {
            Some((pos, _)) => *pos,
            None => self.lexer.tell(),
        }
    }

    /// Reposition; any pushed-back tokens are dropped.
    pub fn seek(&mut self, pos: usize) {
        self.lookahead.clear();
        self.lexer.seek(pos);
    }

    pub fn data(&self) -> &'a [u8] {
        self.lexer.data()
    }

    pub(crate) fn lexer_mut(&mut self) -> &mut Lexer<'a> {
        &mut self.lexer
    }

    /// Get next token (from lookahead or lexer).
    pub fn next_token(&mut self) -> Result<Option<(usize, Token)>> {
        if let Some(tok) = self.lookahead.pop() {
            return Ok(Some(tok));
        }
        self.lexer.next_token().transpose()
    }

    fn push_back(&mut self, tok: (usize, Token)) {
        self.lookahead.push(tok);
    }

    /// Parse the next value.
    pub fn parse_object(&mut self) -> Result<PdfValue> {
        let (pos, token) = self.next_token()?.ok_or(PdfError::UnexpectedEof)?;
        self.value_from_token(pos, token)
    }

    /// Convert a token (and whatever follows it, for compound values) into a value.
    pub fn value_from_token(&mut self, pos: usize, token: Token) -> Result<PdfValue> {
        match token {
            Token::Int(n) => {
                if self.allow_refs
                    && let Some(id) = self.try_reference(n)?
                {
                    return Ok(PdfValue::Ref(id));
                }
                Ok(PdfValue::Int(n))
            }
            Token::Real(n) => Ok(PdfValue::Real(n)),
            Token::Name(n) => Ok(PdfValue::Name(n)),
            Token::LiteralString(s) | Token::HexString(s) => Ok(PdfValue::String(s)),
            Token::ArrayStart => self.parse_array(pos),
            Token::DictStart => self.parse_dict(pos).map(PdfValue::Dict),
            Token::Keyword(Keyword::Null) => Ok(PdfValue::Null),
            Token::Keyword(Keyword::True) => Ok(PdfValue::Bool(true)),
            Token::Keyword(Keyword::False) => Ok(PdfValue::Bool(false)),
            Token::Keyword(kw) => Err(PdfError::syntax(
                pos,
                format!("unexpected keyword: {}", String::from_utf8_lossy(kw.as_bytes())),
            )),
            Token::ArrayEnd => Err(PdfError::syntax(pos, "unexpected ']'")),
            Token::DictEnd => Err(PdfError::syntax(pos, "unexpected '>>'")),
        }
    }

    /// After an integer, look for `<int> R`. Consumed tokens are pushed back
    /// when the pattern does not match.
    fn try_reference(&mut self, objnum: i64) -> Result<Option<ObjectId>> {
        let Some(second) = self.next_token()? else {
            return Ok(None);
        };
        let Token::Int(genno) = second.1 else {
            self.push_back(second);
            return Ok(None);
        };
        let Some(third) = self.next_token()? else {
            self.push_back(second);
            return Ok(None);
        };
        if third.1 == Token::Keyword(Keyword::R)
            && let (Ok(objnum), Ok(genno)) = (u32::try_from(objnum), u16::try_from(genno))
        {
            return Ok(Some(ObjectId::new(objnum, genno)));
        }
        self.push_back(third);
        self.push_back(second);
        Ok(None)
    }

    fn enter(&mut self, pos: usize) -> Result<()> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(PdfError::syntax(pos, "nesting too deep"));
        }
        Ok(())
    }

    /// Parse array contents until ]
    fn parse_array(&mut self, start: usize) -> Result<PdfValue> {
        self.enter(start)?;
        let mut arr = Vec::new();

        loop {
            let Some((pos, token)) = self.next_token()? else {
                return Err(PdfError::syntax(start, "unterminated array"));
            };
            if token == Token::ArrayEnd {
                break;
            }
            arr.push(self.value_from_token(pos, token)?);
        }

        self.depth -= 1;
        Ok(PdfValue::Array(arr))
    }

    /// Parse dict contents until >>
    fn parse_dict(&mut self, start: usize) -> Result<Dictionary> {
        self.enter(start)?;
        let mut dict = Dictionary::new();

        loop {
            let Some((pos, token)) = self.next_token()? else {
                return Err(PdfError::syntax(start, "unterminated dictionary"));
            };
            let key = match token {
                Token::DictEnd => break,
                Token::Name(name) => name,
                _ => return Err(PdfError::syntax(pos, "expected name as dict key")),
            };

            let Some((pos, token)) = self.next_token()? else {
                return Err(PdfError::syntax(start, "unterminated dictionary"));
            };
            if token == Token::DictEnd {
                // `/Key >>`: a missing value is the same as an absent key
                tracing::trace!(pos, key = %key, "dictionary key without value");
                break;
            }
            let value = self.value_from_token(pos, token)?;
            dict.insert(key, value);
        }

        self.depth -= 1;
        Ok(dict)
    }

    /// Parse `N G obj <value> endobj` starting at the cursor.
    ///
    /// `resolve_length` is asked for the value of an indirect `/Length`.
    pub fn parse_indirect(
        &mut self,
        resolve_length: impl FnOnce(ObjectId) -> Option<i64>,
    ) -> Result<IndirectObject> {
        let start = self.tell();
        let id = self.parse_object_header(start)?;
        let value = self.parse_object()?;

        let value = match self.next_token()? {
            Some((_, Token::Keyword(Keyword::Stream))) => {
                let PdfValue::Dict(dict) = value else {
                    return Err(PdfError::syntax(start, "stream without dictionary"));
                };
                let (stream, warning) = self.read_stream_body(dict, Some(id), resolve_length)?;
                self.expect_keyword(&Keyword::EndObj);
                return Ok(IndirectObject {
                    id,
                    value: PdfValue::Stream(Box::new(stream)),
                    warning,
                });
            }
            Some((_, Token::Keyword(Keyword::EndObj))) => value,
            Some(other) => {
                // Missing endobj; the value itself is complete
                tracing::trace!(pos = other.0, %id, "object without endobj");
                self.push_back(other);
                value
            }
            None => value,
        };

        Ok(IndirectObject {
            id,
            value,
            warning: None,
        })
    }

    /// Read `N G obj` and return the declared identity.
    pub fn parse_object_header(&mut self, start: usize) -> Result<ObjectId> {
        let header = (self.next_token()?, self.next_token()?, self.next_token()?);
        match header {
            (
                Some((_, Token::Int(objnum))),
                Some((_, Token::Int(genno))),
                Some((_, Token::Keyword(Keyword::Obj))),
            ) => match (u32::try_from(objnum), u16::try_from(genno)) {
                (Ok(objnum), Ok(genno)) => Ok(ObjectId::new(objnum, genno)),
                _ => Err(PdfError::syntax(start, "object number out of range")),
            },
            _ => Err(PdfError::syntax(start, "expected 'N G obj'")),
        }
    }

    fn expect_keyword(&mut self, kw: &Keyword) {
        match self.next_token() {
            Ok(Some((_, Token::Keyword(ref found)))) if found == kw => {}
            Ok(Some(other)) => self.push_back(other),
            _ => {}
        }
    }

    /// Read the payload after the `stream` keyword.
    ///
    /// `/Length` is trusted only when `endstream` follows it; otherwise the
    /// body runs up to the next `endstream` marker.
    fn read_stream_body(
        &mut self,
        dict: Dictionary,
        id: Option<ObjectId>,
        resolve_length: impl FnOnce(ObjectId) -> Option<i64>,
    ) -> Result<(PdfStream, Option<StructuralWarning>)> {
        self.lookahead.clear();
        let data = self.lexer.data();
        let mut start = self.lexer.tell();

        // Skip spaces some writers leave before the EOL
        let mut p = start;
        while matches!(data.get(p), Some(b' ' | b'\t')) {
            p += 1;
        }
        if matches!(data.get(p), Some(b'\r' | b'\n')) {
            start = p;
        }
        match (data.get(start), data.get(start + 1)) {
            (Some(b'\r'), Some(b'\n')) => start += 2,
            (Some(b'\r' | b'\n'), _) => start += 1,
            _ => {}
        }

        let declared = match dict.get("Length") {
            Some(PdfValue::Int(n)) => Some(*n),
            Some(PdfValue::Ref(r)) => resolve_length(*r),
            _ => None,
        };

        let trusted_end = declared.and_then(|n| {
            let end = start.checked_add(usize::try_from(n).ok()?)?;
            if end > data.len() {
                return None;
            }
            let mut q = end;
            while matches!(data.get(q), Some(b) if super::lexer::is_whitespace(*b)) {
                q += 1;
            }
            data[q..].starts_with(b"endstream").then_some(end)
        });

        let (end, warning) = match trusted_end {
            Some(end) => (end, None),
            None => {
                let end = match find_bytes(&data[start..], b"endstream") {
                    Some(off) => {
                        let mut end = start + off;
                        if end > start && data[end - 1] == b'\n' {
                            end -= 1;
                        }
                        if end > start && data[end - 1] == b'\r' {
                            end -= 1;
                        }
                        end
                    }
                    None => data.len(),
                };
                let warning = StructuralWarning::BrokenStreamLength {
                    id,
                    declared: declared.unwrap_or(-1),
                };
                tracing::debug!(%warning, start, end, "stream length recovered by scanning");
                (end, Some(warning))
            }
        };

        let raw = match self.source {
            Some(bytes) => bytes.slice(start..end),
            None => Bytes::copy_from_slice(&data[start..end]),
        };
        self.lexer.seek(end);
        self.expect_keyword(&Keyword::EndStream);

        let stream = if warning.is_some() {
            PdfStream::new(dict, raw)
        } else {
            PdfStream::from_parts(dict, raw)
        };
        Ok((stream, warning))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Name;

    #[test]
    fn reference_lookahead() {
        let mut parser = ObjectParser::new(b"[1 0 R 2 3 4]");
        let value = parser.parse_object().unwrap();
        assert_eq!(
            value,
            PdfValue::Array(vec![
                PdfValue::Ref(ObjectId::new(1, 0)),
                PdfValue::Int(2),
                PdfValue::Int(3),
                PdfValue::Int(4),
            ])
        );
    }

    #[test]
    fn content_mode_never_builds_references() {
        let mut parser = ObjectParser::for_content(b"1 0 R");
        assert_eq!(parser.parse_object().unwrap(), PdfValue::Int(1));
        assert_eq!(parser.parse_object().unwrap(), PdfValue::Int(0));
    }

    #[test]
    fn dict_missing_value_is_dropped() {
        let mut parser = ObjectParser::new(b"<< /A 1 /B >>");
        let dict = parser.parse_object().unwrap();
        let dict = dict.as_dict().unwrap();
        assert_eq!(dict.len(), 1);
        assert_eq!(dict.get("A"), Some(&PdfValue::Int(1)));
    }

    #[test]
    fn nesting_limit() {
        let data = b"[[[[1]]]]";
        let mut parser = ObjectParser::new(data).with_max_depth(3);
        assert!(matches!(parser.parse_object(), Err(PdfError::Syntax { .. })));
    }

    #[test]
    fn indirect_stream_with_good_length() {
        let data = b"4 0 obj\n<< /Length 5 >>\nstream\nhello\nendstream\nendobj\n";
        let mut parser = ObjectParser::new(data);
        let obj = parser.parse_indirect(|_| None).unwrap();
        assert_eq!(obj.id, ObjectId::new(4, 0));
        assert!(obj.warning.is_none());
        assert_eq!(obj.value.as_stream().unwrap().raw_data(), b"hello");
    }

    #[test]
    fn indirect_stream_with_referenced_length() {
        let data = b"4 0 obj\n<< /Length 9 0 R >>\nstream\r\nhello\nendstream\nendobj\n";
        let mut parser = ObjectParser::new(data);
        let obj = parser
            .parse_indirect(|id| (id == ObjectId::new(9, 0)).then_some(5))
            .unwrap();
        let stream = obj.value.as_stream().unwrap();
        assert_eq!(stream.raw_data(), b"hello");
        assert_eq!(stream.get("Length"), Some(&PdfValue::Ref(ObjectId::new(9, 0))));
    }

    #[test]
    fn bad_length_falls_back_to_endstream_scan() {
        let data = b"4 0 obj\n<< /Length 500 /Type /X >>\nstream\nhello world\nendstream\nendobj\n";
        let mut parser = ObjectParser::new(data);
        let obj = parser.parse_indirect(|_| None).unwrap();
        let stream = obj.value.as_stream().unwrap();
        assert_eq!(stream.raw_data(), b"hello world");
        assert_eq!(stream.dict.get_name("Type"), Some("X"));
        assert_eq!(
            obj.warning,
            Some(StructuralWarning::BrokenStreamLength {
                id: Some(ObjectId::new(4, 0)),
                declared: 500
            })
        );
    }

    #[test]
    fn syntax_error_carries_offset() {
        let mut parser = ObjectParser::new(b"<< /A 1 2 >>");
        match parser.parse_object() {
            Err(PdfError::Syntax { pos, .. }) => assert_eq!(pos, 8),
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn names_keep_escapes_decoded() {
        let mut parser = ObjectParser::new(b"/A#20B");
        assert_eq!(
            parser.parse_object().unwrap(),
            PdfValue::Name(Name::new("A B"))
        );
    }
}
