//! PDF tokenizer.
//!
//! Turns bytes into [`Token`]s. Whitespace and comments are skipped. The lexer
//! can be repositioned with [`Lexer::seek`] and resumes from any offset, which
//! is how the cross-reference resolver jumps straight to an object.
//!
//! Numbers are read permissively: `+5`, `.5`, `-.5` and `5.` are accepted, and
//! malformed text such as `1.5e3` degrades to `Real(1.5)` followed by the
//! keyword `e3`. The lexer never fails on numeric text.

use crate::error::{PdfError, Result};
use crate::model::Name;

/// Keywords with structural meaning in object syntax. Everything else
/// (content stream operators, stray garbage) is [`Keyword::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Keyword {
    True,
    False,
    Null,
    Obj,
    EndObj,
    R,
    Stream,
    EndStream,
    Xref,
    Trailer,
    StartXref,
    Other(Vec<u8>),
}

impl Keyword {
    pub fn from_bytes(b: &[u8]) -> Self {
        match b {
            b"true" => Self::True,
            b"false" => Self::False,
            b"null" => Self::Null,
            b"obj" => Self::Obj,
            b"endobj" => Self::EndObj,
            b"R" => Self::R,
            b"stream" => Self::Stream,
            b"endstream" => Self::EndStream,
            b"xref" => Self::Xref,
            b"trailer" => Self::Trailer,
            b"startxref" => Self::StartXref,
            other => Self::Other(other.to_vec()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::True => b"true",
            Self::False => b"false",
            Self::Null => b"null",
            Self::Obj => b"obj",
            Self::EndObj => b"endobj",
            Self::R => b"R",
            Self::Stream => b"stream",
            Self::EndStream => b"endstream",
            Self::Xref => b"xref",
            Self::Trailer => b"trailer",
            Self::StartXref => b"startxref",
            Self::Other(bytes) => bytes,
        }
    }
}

impl PartialEq<[u8]> for Keyword {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_bytes() == other
    }
}

impl PartialEq<&[u8]> for Keyword {
    fn eq(&self, other: &&[u8]) -> bool {
        self.as_bytes() == *other
    }
}

impl<const N: usize> PartialEq<&[u8; N]> for Keyword {
    fn eq(&self, other: &&[u8; N]) -> bool {
        self.as_bytes() == other.as_slice()
    }
}

/// Lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Real(f64),
    Name(Name),
    /// `( ... )` with escapes already applied
    LiteralString(Vec<u8>),
    /// `< ... >` already converted to bytes
    HexString(Vec<u8>),
    ArrayStart,
    ArrayEnd,
    DictStart,
    DictEnd,
    Keyword(Keyword),
}

pub(crate) const fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'\x00' | b'\x0c')
}

pub(crate) const fn is_delimiter(b: u8) -> bool {
    matches!(
        b,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

const fn is_regular(b: u8) -> bool {
    !is_whitespace(b) && !is_delimiter(b)
}

/// Byte-cursor tokenizer over a borrowed buffer.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Start tokenizing at `pos`.
    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self {
            data,
            pos: pos.min(data.len()),
        }
    }

    /// Current position in the buffer.
    pub fn tell(&self) -> usize {
        self.pos
    }

    /// Reposition the cursor; tokenization resumes from here.
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos.min(self.data.len());
    }

    /// The whole underlying buffer.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Get remaining unparsed data
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.data.get(self.pos + offset).copied()
    }

    /// Skip whitespace and comments
    pub fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek() {
            if b == b'%' {
                while let Some(c) = self.peek() {
                    if c == b'\r' || c == b'\n' {
                        break;
                    }
                    self.pos += 1;
                }
                continue;
            }
            if !is_whitespace(b) {
                return;
            }
            self.pos += 1;
        }
    }

    /// Parse a name (/Name), applying `#xx` escapes.
    fn lex_name(&mut self) -> Token {
        self.pos += 1; // Skip '/'
        let mut name = Vec::new();

        while let Some(b) = self.peek() {
            if !is_regular(b) {
                break;
            }
            if b == b'#' {
                let h1 = self.peek_at(1).and_then(hex_value);
                let h2 = self.peek_at(2).and_then(hex_value);
                if let (Some(hi), Some(lo)) = (h1, h2) {
                    name.push((hi << 4) | lo);
                    self.pos += 3;
                    continue;
                }
            }
            name.push(b);
            self.pos += 1;
        }

        Token::Name(Name::from_bytes(&name))
    }

    /// Parse a number, degrading instead of failing on malformed text.
    fn lex_number(&mut self) -> Token {
        let start = self.pos;
        let mut negative = false;

        // Real files contain "--5" and "+-5"; the last sign wins.
        while let Some(b @ (b'+' | b'-')) = self.peek() {
            negative = b == b'-';
            self.pos += 1;
        }

        let int_start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        let int_end = self.pos;

        let mut frac = None;
        if self.peek() == Some(b'.') {
            self.pos += 1;
            let frac_start = self.pos;
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.pos += 1;
            }
            frac = Some(frac_start..self.pos);
        }

        let digits = &self.data[int_start..int_end];
        match frac {
            None => {
                if digits.is_empty() {
                    tracing::trace!(pos = start, "sign without digits read as 0");
                    return Token::Int(0);
                }
                let mut value: i64 = 0;
                for &d in digits {
                    match value
                        .checked_mul(10)
                        .and_then(|v| v.checked_add((d - b'0') as i64))
                    {
                        Some(v) => value = v,
                        None => return Token::Real(parse_real(digits, &[], negative)),
                    }
                }
                Token::Int(if negative { -value } else { value })
            }
            Some(range) => Token::Real(parse_real(digits, &self.data[range], negative)),
        }
    }

    /// Parse a literal string (...)
    fn lex_literal_string(&mut self) -> Result<Token> {
        let start = self.pos;
        self.pos += 1; // Skip '('
        let mut result = Vec::new();
        let mut depth = 1usize;

        loop {
            let Some(b) = self.peek() else {
                return Err(PdfError::syntax(start, "unterminated literal string"));
            };
            self.pos += 1;
            match b {
                b'(' => {
                    depth += 1;
                    result.push(b'(');
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    result.push(b')');
                }
                b'\\' => {
                    let Some(c) = self.peek() else {
                        return Err(PdfError::syntax(start, "unterminated literal string"));
                    };
                    self.pos += 1;
                    match c {
                        b'n' => result.push(b'\n'),
                        b'r' => result.push(b'\r'),
                        b't' => result.push(b'\t'),
                        b'b' => result.push(0x08),
                        b'f' => result.push(0x0c),
                        b'\r' => {
                            // Line continuation
                            if self.peek() == Some(b'\n') {
                                self.pos += 1;
                            }
                        }
                        b'\n' => {}
                        b'0'..=b'7' => {
                            let mut octal = (c - b'0') as u32;
                            for _ in 0..2 {
                                match self.peek() {
                                    Some(d @ b'0'..=b'7') => {
                                        self.pos += 1;
                                        octal = octal * 8 + (d - b'0') as u32;
                                    }
                                    _ => break,
                                }
                            }
                            result.push((octal & 0xFF) as u8);
                        }
                        // \( \) \\ and unknown escapes keep the character
                        other => result.push(other),
                    }
                }
                b'\r' => {
                    // EOL inside a string is normalized to \n
                    if self.peek() == Some(b'\n') {
                        self.pos += 1;
                    }
                    result.push(b'\n');
                }
                other => result.push(other),
            }
        }

        Ok(Token::LiteralString(result))
    }

    /// Parse a hex string <...>. Non-hex garbage is skipped.
    fn lex_hex_string(&mut self) -> Result<Token> {
        let start = self.pos;
        self.pos += 1; // Skip '<'
        let mut result = Vec::new();
        let mut pending: Option<u8> = None;

        loop {
            let Some(c) = self.peek() else {
                return Err(PdfError::syntax(start, "unterminated hex string"));
            };
            self.pos += 1;
            if c == b'>' {
                break;
            }
            if let Some(nibble) = hex_value(c) {
                match pending.take() {
                    Some(high) => result.push((high << 4) | nibble),
                    None => pending = Some(nibble),
                }
            }
        }

        // Odd digit count: the missing final digit is 0
        if let Some(high) = pending {
            result.push(high << 4);
        }

        Ok(Token::HexString(result))
    }

    fn lex_keyword(&mut self) -> Token {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if is_regular(b)) {
            self.pos += 1;
        }
        if self.pos == start {
            // A lone delimiter such as ')' or '{'
            self.pos += 1;
        }
        Token::Keyword(Keyword::from_bytes(&self.data[start..self.pos]))
    }

    /// Get next token with its starting offset.
    pub fn next_token(&mut self) -> Option<Result<(usize, Token)>> {
        self.skip_whitespace();
        let start = self.pos;
        let b = self.peek()?;

        let result = match b {
            b'/' => Ok(self.lex_name()),
            b'(' => self.lex_literal_string(),
            b'<' if self.peek_at(1) == Some(b'<') => {
                self.pos += 2;
                Ok(Token::DictStart)
            }
            b'<' => self.lex_hex_string(),
            b'>' if self.peek_at(1) == Some(b'>') => {
                self.pos += 2;
                Ok(Token::DictEnd)
            }
            b'[' => {
                self.pos += 1;
                Ok(Token::ArrayStart)
            }
            b']' => {
                self.pos += 1;
                Ok(Token::ArrayEnd)
            }
            b'+' | b'-' | b'.' | b'0'..=b'9' => Ok(self.lex_number()),
            _ => Ok(self.lex_keyword()),
        };

        Some(result.map(|token| (start, token)))
    }

    /// Read an unsigned decimal integer at the cursor, without skipping
    /// anything first. Used by the fixed-format xref table reader.
    pub(crate) fn read_unsigned(&mut self) -> Option<u64> {
        let start = self.pos;
        let mut value: u64 = 0;
        while let Some(d @ b'0'..=b'9') = self.peek() {
            value = value.saturating_mul(10).saturating_add((d - b'0') as u64);
            self.pos += 1;
        }
        (self.pos > start).then_some(value)
    }

    /// Skip spaces and tabs only (not line ends).
    pub(crate) fn skip_spaces(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t')) {
            self.pos += 1;
        }
    }

    /// Skip to just past the end of the current line.
    pub(crate) fn skip_line(&mut self) {
        while let Some(b) = self.peek() {
            if b == b'\r' || b == b'\n' {
                break;
            }
            self.pos += 1;
        }
        while matches!(self.peek(), Some(b'\r' | b'\n')) {
            self.pos += 1;
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<(usize, Token)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token()
    }
}

fn parse_real(int_digits: &[u8], frac_digits: &[u8], negative: bool) -> f64 {
    let mut text = String::with_capacity(int_digits.len() + frac_digits.len() + 3);
    if negative {
        text.push('-');
    }
    if int_digits.is_empty() {
        text.push('0');
    }
    text.extend(int_digits.iter().map(|&b| b as char));
    if !frac_digits.is_empty() {
        text.push('.');
        text.extend(frac_digits.iter().map(|&b| b as char));
    }
    text.parse().unwrap_or(0.0)
}

pub(crate) const fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}
