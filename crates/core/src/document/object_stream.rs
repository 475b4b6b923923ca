//! Object streams (`/Type /ObjStm`).
//!
//! The decoded payload starts with `N` pairs of `objnum offset`; offsets are
//! relative to `/First`. Objects inside are plain values, never streams.

use crate::error::{PdfError, Result};
use crate::model::{PdfStream, PdfValue};
use crate::parser::ObjectParser;

/// A decoded object stream with its header parsed once.
#[derive(Debug, Clone)]
pub struct ObjectStream {
    data: Vec<u8>,
    /// `(objnum, absolute offset into data)` in header order
    entries: Vec<(u32, usize)>,
    max_nesting: usize,
}

impl ObjectStream {
    /// Parse the header of an already decoded container.
    pub fn new(stream: &PdfStream, data: Vec<u8>, max_nesting: usize) -> Result<Self> {
        let n = stream
            .dict
            .get_int("N")
            .ok_or_else(|| PdfError::KeyError("N".into()))?;
        let first = stream
            .dict
            .get_int("First")
            .ok_or_else(|| PdfError::KeyError("First".into()))?;
        let n = usize::try_from(n).map_err(|_| PdfError::syntax(0, "negative /N in object stream"))?;
        let first = usize::try_from(first)
            .ok()
            .filter(|&f| f <= data.len())
            .ok_or_else(|| PdfError::syntax(0, "/First outside object stream"))?;

        let mut header = ObjectParser::new(&data[..first]);
        let mut entries = Vec::with_capacity(n.min(data.len()));
        for _ in 0..n {
            let objnum = header.parse_object()?.as_int()?;
            let offset = header.parse_object()?.as_int()?;
            let (Ok(objnum), Ok(offset)) = (u32::try_from(objnum), usize::try_from(offset)) else {
                return Err(PdfError::syntax(header.tell(), "bad object stream header entry"));
            };
            entries.push((objnum, first + offset));
        }

        Ok(Self {
            data,
            entries,
            max_nesting,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Object numbers stored in this container, in header order.
    pub fn object_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.iter().map(|(objnum, _)| *objnum)
    }

    /// Value at position `index`; `expected` must match the header entry.
    pub fn get(&self, index: usize, expected: u32) -> Result<PdfValue> {
        let &(objnum, offset) = self.entries.get(index).ok_or_else(|| {
            PdfError::syntax(0, format!("index {index} >= N {}", self.entries.len()))
        })?;
        if objnum != expected {
            return Err(PdfError::syntax(
                offset,
                format!("object stream slot {index} holds {objnum}, expected {expected}"),
            ));
        }
        if offset > self.data.len() {
            return Err(PdfError::UnexpectedEof);
        }
        let mut parser = ObjectParser::new(&self.data[offset..]).with_max_depth(self.max_nesting);
        parser.parse_object()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Dictionary;

    fn container(header: &[u8], body: &[u8], n: i64) -> (PdfStream, Vec<u8>) {
        let mut dict = Dictionary::new();
        dict.insert("Type", PdfValue::name("ObjStm"));
        dict.insert("N", n);
        dict.insert("First", header.len());
        let data = [header, body].concat();
        (PdfStream::new(dict, data.clone()), data)
    }

    #[test]
    fn fetches_by_index() {
        let (stream, data) = container(b"10 0 11 6 ", b"(ten) [1 2]", 2);
        let objstm = ObjectStream::new(&stream, data, 16).unwrap();
        assert_eq!(objstm.len(), 2);
        assert_eq!(objstm.get(0, 10).unwrap(), PdfValue::String(b"ten".to_vec()));
        assert_eq!(
            objstm.get(1, 11).unwrap(),
            PdfValue::Array(vec![PdfValue::Int(1), PdfValue::Int(2)])
        );
    }

    #[test]
    fn wrong_slot_is_an_error() {
        let (stream, data) = container(b"10 0 ", b"true", 1);
        let objstm = ObjectStream::new(&stream, data, 16).unwrap();
        assert!(objstm.get(0, 12).is_err());
        assert!(objstm.get(3, 10).is_err());
    }
}
