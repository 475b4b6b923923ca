//! Canonical PDF object syntax.
//!
//! Every value has exactly one textual form: dictionaries keep their key
//! order, strings use the literal form when all bytes are printable and
//! hex otherwise, reals always carry a decimal point so they re-read as
//! reals. Stream dictionaries get a direct `/Length` matching the payload.

use crate::model::{Dictionary, Name, ObjectId, PdfStream, PdfValue};
use std::io::{self, Write};

/// Append the canonical form of `value` to `out`.
pub fn write_value(out: &mut Vec<u8>, value: &PdfValue) {
    match value {
        PdfValue::Null => out.extend_from_slice(b"null"),
        PdfValue::Bool(true) => out.extend_from_slice(b"true"),
        PdfValue::Bool(false) => out.extend_from_slice(b"false"),
        PdfValue::Int(n) => out.extend_from_slice(n.to_string().as_bytes()),
        PdfValue::Real(n) => out.extend_from_slice(format_real(*n).as_bytes()),
        PdfValue::String(s) => write_string(out, s),
        PdfValue::Name(n) => write_name(out, n),
        PdfValue::Array(arr) => {
            out.push(b'[');
            for (i, item) in arr.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                write_value(out, item);
            }
            out.push(b']');
        }
        PdfValue::Dict(dict) => write_dict(out, dict),
        PdfValue::Stream(stream) => write_stream(out, stream),
        PdfValue::Ref(id) => write_ref(out, *id),
    }
}

/// Canonical bytes of a single value.
pub fn to_bytes(value: &PdfValue) -> Vec<u8> {
    let mut out = Vec::new();
    write_value(&mut out, value);
    out
}

fn write_ref(out: &mut Vec<u8>, id: ObjectId) {
    out.extend_from_slice(id.to_string().as_bytes());
}

fn write_dict(out: &mut Vec<u8>, dict: &Dictionary) {
    out.extend_from_slice(b"<<");
    for (key, value) in dict.iter() {
        out.push(b' ');
        write_name(out, key);
        out.push(b' ');
        write_value(out, value);
    }
    out.extend_from_slice(b" >>");
}

fn write_stream(out: &mut Vec<u8>, stream: &PdfStream) {
    let raw = stream.raw_data();
    let mut dict = stream.dict.clone();
    dict.insert("Length", raw.len());
    write_dict(out, &dict);
    out.extend_from_slice(b"\nstream\n");
    out.extend_from_slice(raw);
    out.extend_from_slice(b"\nendstream");
}

/// Reals are written in plain decimal with at least one fractional digit.
pub fn format_real(n: f64) -> String {
    if !n.is_finite() {
        return "0.0".to_string();
    }
    let text = format!("{n}");
    if text.contains('.') {
        text
    } else {
        format!("{text}.0")
    }
}

pub fn write_name(out: &mut Vec<u8>, name: &Name) {
    out.push(b'/');
    for b in name.to_bytes() {
        if (0x21..=0x7e).contains(&b) && b != b'#' && !crate::parser::lexer::is_delimiter(b) {
            out.push(b);
        } else {
            out.extend_from_slice(format!("#{b:02X}").as_bytes());
        }
    }
}

pub fn write_string(out: &mut Vec<u8>, s: &[u8]) {
    let printable = s
        .iter()
        .all(|&b| (0x20..=0x7e).contains(&b) || matches!(b, b'\n' | b'\r' | b'\t'));
    if !printable {
        out.push(b'<');
        out.extend_from_slice(hex_upper(s).as_bytes());
        out.push(b'>');
        return;
    }
    out.push(b'(');
    for &b in s {
        match b {
            b'(' | b')' | b'\\' => {
                out.push(b'\\');
                out.push(b);
            }
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\t' => out.extend_from_slice(b"\\t"),
            _ => out.push(b),
        }
    }
    out.push(b')');
}

fn hex_upper(s: &[u8]) -> String {
    s.iter().map(|b| format!("{b:02X}")).collect()
}

/// Counts bytes so that object offsets are known while writing.
pub struct CountingWriter<W: Write> {
    inner: W,
    bytes_written: u64,
}

impl<W: Write> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            bytes_written: 0,
        }
    }

    /// Start counting from `offset`, for output appended after existing bytes.
    pub fn starting_at(inner: W, offset: u64) -> Self {
        Self {
            inner,
            bytes_written: offset,
        }
    }

    /// Return the number of bytes written so far
    pub fn position(&self) -> u64 {
        self.bytes_written
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    #[inline]
    fn write(&mut self, buffer: &[u8]) -> io::Result<usize> {
        let bytes = self.inner.write(buffer)?;
        self.bytes_written += bytes as u64;
        Ok(bytes)
    }

    #[inline]
    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Write `N G obj\n<value>\nendobj\n`.
pub fn write_indirect<W: Write>(out: &mut W, id: ObjectId, value: &PdfValue) -> io::Result<()> {
    let mut body = Vec::new();
    write_value(&mut body, value);
    writeln!(out, "{} {} obj", id.objnum, id.genno)?;
    out.write_all(&body)?;
    out.write_all(b"\nendobj\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reals_keep_their_type() {
        assert_eq!(format_real(12.0), "12.0");
        assert_eq!(format_real(-0.25), "-0.25");
        assert_eq!(format_real(f64::NAN), "0.0");
    }

    #[test]
    fn names_escape_delimiters_and_hash() {
        let mut out = Vec::new();
        write_name(&mut out, &Name::new("A B#(x)"));
        assert_eq!(out, b"/A#20B#23#28x#29");
    }

    #[test]
    fn names_past_latin1_parse_back_equal() {
        let name = Name::new("Caf\u{e9}\u{20ac}");
        let mut out = Vec::new();
        write_name(&mut out, &name);
        assert_eq!(out, b"/Caf#E9#E2#82#AC");
        let parsed = crate::parser::ObjectParser::new(&out).parse_object().unwrap();
        assert_eq!(parsed, PdfValue::Name(name));
    }

    #[test]
    fn binary_strings_go_hex() {
        let mut out = Vec::new();
        write_string(&mut out, &[0x00, 0xff]);
        assert_eq!(out, b"<00FF>");
        out.clear();
        write_string(&mut out, b"a(b)\\");
        assert_eq!(out, b"(a\\(b\\)\\\\)");
    }

    #[test]
    fn stream_length_tracks_payload() {
        let mut dict = Dictionary::new();
        dict.insert("Length", ObjectId::new(9, 0));
        let stream = PdfStream::from_parts(dict, bytes::Bytes::from_static(b"abc"));
        let out = to_bytes(&PdfValue::Stream(Box::new(stream)));
        assert_eq!(out, b"<< /Length 3 >>\nstream\nabc\nendstream");
    }
}
