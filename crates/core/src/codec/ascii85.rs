//! ASCII85Decode and ASCIIHexDecode.

use super::Filter;
use crate::error::{PdfError, Result};
use crate::model::Dictionary;
use crate::parser::lexer::{hex_value, is_whitespace};

#[derive(Debug, Default, Clone, Copy)]
pub struct Ascii85Filter;

#[derive(Debug, Default, Clone, Copy)]
pub struct AsciiHexFilter;

impl Filter for Ascii85Filter {
    fn decode(&self, data: &[u8], _params: Option<&Dictionary>) -> Result<Vec<u8>> {
        ascii85decode(data)
    }

    fn encode(&self, data: &[u8], _params: Option<&Dictionary>) -> Result<Vec<u8>> {
        Ok(ascii85encode(data))
    }
}

impl Filter for AsciiHexFilter {
    fn decode(&self, data: &[u8], _params: Option<&Dictionary>) -> Result<Vec<u8>> {
        asciihexdecode(data)
    }

    fn encode(&self, data: &[u8], _params: Option<&Dictionary>) -> Result<Vec<u8>> {
        Ok(asciihexencode(data))
    }
}

/// Decode ASCII85-encoded data (PDF variant).
/// Handles: z-encoding, <~ ~> markers, whitespace, missing EOD.
pub fn ascii85decode(data: &[u8]) -> Result<Vec<u8>> {
    const NAME: &str = "ASCII85Decode";

    let mut start = 0;
    while start < data.len() && is_whitespace(data[start]) {
        start += 1;
    }
    if data[start..].starts_with(b"<~") {
        start += 2;
    }

    let mut result = Vec::with_capacity(data.len() / 5 * 4);
    let mut group = [0u8; 5];
    let mut count = 0;

    let mut i = start;
    while i < data.len() {
        let byte = data[i];
        match byte {
            b'~' => {
                if data.get(i + 1).is_some_and(|&b| b != b'>') {
                    return Err(PdfError::decode(NAME, Some(i), "'~' not followed by '>'"));
                }
                break;
            }
            b'z' if count == 0 => result.extend_from_slice(&[0; 4]),
            b'z' => return Err(PdfError::decode(NAME, Some(i), "'z' inside a group")),
            b'!'..=b'u' => {
                group[count] = byte - b'!';
                count += 1;
                if count == 5 {
                    let value = group_value(&group).ok_or_else(|| {
                        PdfError::decode(NAME, Some(i), "group value exceeds 2^32")
                    })?;
                    result.extend_from_slice(&value.to_be_bytes());
                    count = 0;
                }
            }
            b if is_whitespace(b) => {}
            _ => return Err(PdfError::decode(NAME, Some(i), format!("invalid byte 0x{byte:02x}"))),
        }
        i += 1;
    }

    match count {
        0 => {}
        1 => return Err(PdfError::decode(NAME, Some(i), "final group has a single digit")),
        n => {
            // Pad with 'u' and keep n - 1 bytes
            group[n..].fill(84);
            let value = group_value(&group)
                .ok_or_else(|| PdfError::decode(NAME, Some(i), "group value exceeds 2^32"))?;
            result.extend_from_slice(&value.to_be_bytes()[..n - 1]);
        }
    }

    Ok(result)
}

fn group_value(group: &[u8; 5]) -> Option<u32> {
    let value = group.iter().fold(0u64, |acc, &d| acc * 85 + d as u64);
    u32::try_from(value).ok()
}

/// Encode as ASCII85 with the `~>` end marker.
pub fn ascii85encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() / 4 * 5 + 7);
    for chunk in data.chunks(4) {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        let mut value = u32::from_be_bytes(word);

        if chunk.len() == 4 && value == 0 {
            out.push(b'z');
            continue;
        }

        let mut digits = [0u8; 5];
        for digit in digits.iter_mut().rev() {
            *digit = (value % 85) as u8 + b'!';
            value /= 85;
        }
        out.extend_from_slice(&digits[..chunk.len() + 1]);
    }
    out.extend_from_slice(b"~>");
    out
}

/// Decode ASCIIHex-encoded data. An odd final digit is padded with 0.
pub fn asciihexdecode(data: &[u8]) -> Result<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len() / 2);
    let mut pending: Option<u8> = None;

    for (i, &byte) in data.iter().enumerate() {
        if byte == b'>' {
            break;
        }
        if is_whitespace(byte) {
            continue;
        }
        let Some(nibble) = hex_value(byte) else {
            return Err(PdfError::decode(
                "ASCIIHexDecode",
                Some(i),
                format!("invalid hex digit 0x{byte:02x}"),
            ));
        };
        match pending.take() {
            Some(high) => result.push((high << 4) | nibble),
            None => pending = Some(nibble),
        }
    }

    if let Some(high) = pending {
        result.push(high << 4);
    }

    Ok(result)
}

/// Encode as uppercase hex with the `>` end marker.
pub fn asciihexencode(data: &[u8]) -> Vec<u8> {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = Vec::with_capacity(data.len() * 2 + 1);
    for &b in data {
        out.push(DIGITS[(b >> 4) as usize]);
        out.push(DIGITS[(b & 0x0f) as usize]);
    }
    out.push(b'>');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asciihex_decode_expected() {
        let data = b"48656c6c6f 20776f726c64>"; // "Hello world"
        assert_eq!(asciihexdecode(data).unwrap(), b"Hello world");
    }

    #[test]
    fn asciihex_odd_digit_count() {
        assert_eq!(asciihexdecode(b"7>").unwrap(), [0x70]);
    }

    #[test]
    fn ascii85_decode_expected() {
        let data = b"<~87cURD]i,\"Ebo80~>";
        assert_eq!(ascii85decode(data).unwrap(), b"Hello World!");
    }

    #[test]
    fn ascii85_zero_group_shorthand() {
        assert_eq!(ascii85encode(&[0, 0, 0, 0, 1]), b"z!<~>");
        assert_eq!(ascii85decode(b"z!<~>").unwrap(), [0, 0, 0, 0, 1]);
    }

    #[test]
    fn ascii85_rejects_garbage() {
        let err = ascii85decode(b"87c{URD~>").unwrap_err();
        assert!(matches!(err, PdfError::FilterDecode { pos: Some(3), .. }));
    }
}
