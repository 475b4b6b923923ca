//! Content stream engine.
//!
//! Splits page content into [`Operation`]s (operands followed by an operator
//! keyword) and writes them back out. Operators are opaque byte strings; the
//! only one with special handling is `BI`, whose `ID ... EI` payload is raw
//! binary and is carried through untouched.

use super::lexer::{Keyword, Token, is_delimiter, is_whitespace};
use super::object_parser::ObjectParser;
use crate::error::{PdfError, Result};
use crate::model::{Dictionary, PdfValue};
use crate::writer::serialize::write_value;

/// Content stream operation
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    /// The operator (e.g., "BT", "Tf", "Tj")
    pub operator: Vec<u8>,
    /// Operands for this operation
    pub operands: Vec<PdfValue>,
    /// Inline image payload, only for `BI`
    pub inline_data: Option<Vec<u8>>,
}

impl Operation {
    pub fn new(operator: &str, operands: Vec<PdfValue>) -> Self {
        Self {
            operator: operator.as_bytes().to_vec(),
            operands,
            inline_data: None,
        }
    }

    pub fn is(&self, operator: &str) -> bool {
        self.operator == operator.as_bytes()
    }

    /// `BI ... ID ... EI` group.
    pub fn is_inline_image(&self) -> bool {
        self.inline_data.is_some()
    }
}

/// Parsed content stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentStream {
    pub operations: Vec<Operation>,
}

impl ContentStream {
    /// Tokenize decoded content bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut parser = ObjectParser::for_content(data);
        let mut operations = Vec::new();
        let mut operands = Vec::new();

        while let Some((pos, token)) = parser.next_token()? {
            match token {
                Token::Keyword(Keyword::True | Keyword::False | Keyword::Null) => {
                    operands.push(parser.value_from_token(pos, token)?);
                }
                Token::Keyword(kw) => {
                    if kw == b"BI" {
                        operations.push(read_inline_image(&mut parser, pos)?);
                        operands.clear();
                        continue;
                    }
                    operations.push(Operation {
                        operator: kw.as_bytes().to_vec(),
                        operands: std::mem::take(&mut operands),
                        inline_data: None,
                    });
                }
                Token::ArrayEnd | Token::DictEnd => {
                    tracing::trace!(pos, "stray closing delimiter in content stream");
                }
                other => operands.push(parser.value_from_token(pos, other)?),
            }
        }

        if !operands.is_empty() {
            tracing::trace!(count = operands.len(), "trailing operands without operator");
        }

        Ok(Self { operations })
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.operations.iter()
    }

    /// Keep only the operations for which `predicate` returns true.
    /// An inline image is a single operation and goes as a unit.
    pub fn filter(self, mut predicate: impl FnMut(&Operation) -> bool) -> Self {
        Self {
            operations: self
                .operations
                .into_iter()
                .filter(|op| predicate(op))
                .collect(),
        }
    }

    /// Serialize back to content bytes, one operation per line.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for op in &self.operations {
            if let Some(data) = &op.inline_data {
                out.extend_from_slice(b"BI");
                if let Some(PdfValue::Dict(params)) = op.operands.first() {
                    for (key, value) in params.iter() {
                        out.push(b' ');
                        write_value(&mut out, &PdfValue::Name(key.clone()));
                        out.push(b' ');
                        write_value(&mut out, value);
                    }
                }
                out.extend_from_slice(b" ID ");
                out.extend_from_slice(data);
                out.extend_from_slice(b"\nEI\n");
                continue;
            }
            for operand in &op.operands {
                write_value(&mut out, operand);
                out.push(b' ');
            }
            out.extend_from_slice(&op.operator);
            out.push(b'\n');
        }
        out
    }
}

impl IntoIterator for ContentStream {
    type Item = Operation;
    type IntoIter = std::vec::IntoIter<Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.into_iter()
    }
}

/// Read the parameters and binary payload of an inline image. The parser is
/// positioned just after `BI` and is left just after `EI`.
fn read_inline_image(parser: &mut ObjectParser<'_>, start: usize) -> Result<Operation> {
    let mut params = Dictionary::new();

    loop {
        let Some((pos, token)) = parser.next_token()? else {
            return Err(PdfError::syntax(start, "inline image without ID"));
        };
        match token {
            Token::Keyword(kw) if kw == b"ID" => break,
            Token::Name(key) => {
                let value = parser.parse_object()?;
                params.insert(key, value);
            }
            _ => return Err(PdfError::syntax(pos, "expected name in inline image dictionary")),
        }
    }

    let data = parser.data();
    // Exactly one whitespace byte separates ID from the payload
    let begin = (parser.tell() + 1).min(data.len());

    let declared = params
        .get("L")
        .or_else(|| params.get("Length"))
        .and_then(|v| v.as_int().ok())
        .and_then(|n| usize::try_from(n).ok());

    let (payload_end, resume) = match declared.and_then(|len| check_declared_end(data, begin, len)) {
        Some(found) => found,
        None => scan_for_ei(data, begin)
            .ok_or_else(|| PdfError::syntax(start, "inline image without EI"))?,
    };

    parser.lexer_mut().seek(resume);
    Ok(Operation {
        operator: b"BI".to_vec(),
        operands: vec![PdfValue::Dict(params)],
        inline_data: Some(data[begin..payload_end].to_vec()),
    })
}

/// Trust a declared payload length only when `EI` follows it.
fn check_declared_end(data: &[u8], begin: usize, len: usize) -> Option<(usize, usize)> {
    let end = begin.checked_add(len)?;
    let mut q = end;
    while q < data.len() && is_whitespace(data[q]) {
        q += 1;
    }
    (data.get(q..q + 2) == Some(b"EI".as_slice())).then_some((end, q + 2))
}

/// Find whitespace + `EI` + (whitespace | delimiter | end of data).
fn scan_for_ei(data: &[u8], begin: usize) -> Option<(usize, usize)> {
    let mut i = begin;
    while i + 2 <= data.len() {
        if &data[i..i + 2] == b"EI"
            && i > 0
            && is_whitespace(data[i - 1])
            && data.get(i + 2).is_none_or(|&b| is_whitespace(b) || is_delimiter(b))
        {
            return Some(((i - 1).max(begin), i + 2));
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Name;

    #[test]
    fn operands_attach_to_following_operator() {
        let content = ContentStream::parse(b"q 1 0 0 1 10 20 cm Q").unwrap();
        assert_eq!(content.len(), 3);
        assert!(content.operations[1].is("cm"));
        assert_eq!(content.operations[1].operands.len(), 6);
    }

    #[test]
    fn inline_image_payload_is_not_tokenized() {
        let data = b"q BI /W 2 /H 1 /BPC 8 /CS /G ID \x00) ]EI\nEI Q";
        let content = ContentStream::parse(data).unwrap();
        let ops: Vec<&[u8]> = content.iter().map(|op| op.operator.as_slice()).collect();
        assert_eq!(ops, [b"q".as_slice(), b"BI", b"Q"]);
        let image = &content.operations[1];
        assert_eq!(image.inline_data.as_deref(), Some(b"\x00) ]EI".as_slice()));
        let params = image.operands[0].as_dict().unwrap();
        assert_eq!(params.get("CS"), Some(&PdfValue::Name(Name::new("G"))));
    }

    #[test]
    fn inline_image_with_declared_length() {
        let data = b"BI /L 5 ID a EI \nEI Q";
        let content = ContentStream::parse(data).unwrap();
        assert_eq!(content.operations[0].inline_data.as_deref(), Some(b"a EI ".as_slice()));
        assert!(content.operations[1].is("Q"));
    }

    #[test]
    fn to_bytes_reparses_to_same_operations() {
        let data = b"BT /F1 12 Tf [(A) -250 (B)] TJ ET BI /W 1 ID x\nEI";
        let content = ContentStream::parse(data).unwrap();
        let again = ContentStream::parse(&content.to_bytes()).unwrap();
        assert_eq!(content, again);
    }
}
