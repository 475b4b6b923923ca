//! LZWDecode using the weezl crate.

use super::Filter;
use crate::error::{PdfError, Result};
use crate::model::Dictionary;
use weezl::{BitOrder, decode::Decoder, encode::Encoder};

const NAME: &str = "LZWDecode";

#[derive(Debug, Default, Clone, Copy)]
pub struct LzwFilter;

impl Filter for LzwFilter {
    fn decode(&self, data: &[u8], params: Option<&Dictionary>) -> Result<Vec<u8>> {
        lzwdecode_with_earlychange(data, early_change(params))
    }

    fn encode(&self, data: &[u8], params: Option<&Dictionary>) -> Result<Vec<u8>> {
        lzwencode_with_earlychange(data, early_change(params))
    }

    fn uses_predictor(&self) -> bool {
        true
    }
}

fn early_change(params: Option<&Dictionary>) -> i64 {
    params.and_then(|p| p.get_int("EarlyChange")).unwrap_or(1)
}

/// Decode LZW-encoded data (PDF variant: MSB first, 8-bit).
pub fn lzwdecode(data: &[u8]) -> Result<Vec<u8>> {
    lzwdecode_with_earlychange(data, 1)
}

/// Decode LZW-encoded data with an EarlyChange setting.
///
/// EarlyChange=1 (the PDF default) switches code width one code early, the
/// same convention TIFF uses.
pub fn lzwdecode_with_earlychange(data: &[u8], early_change: i64) -> Result<Vec<u8>> {
    let mut decoder = if early_change == 0 {
        Decoder::new(BitOrder::Msb, 8)
    } else {
        Decoder::with_tiff_size_switch(BitOrder::Msb, 8)
    };
    let mut output = Vec::new();
    let result = decoder.into_vec(&mut output).decode(data);
    if let Err(err) = result.status {
        return Err(PdfError::decode(NAME, Some(result.consumed_in), err.to_string()));
    }
    Ok(output)
}

pub fn lzwencode_with_earlychange(data: &[u8], early_change: i64) -> Result<Vec<u8>> {
    let mut encoder = if early_change == 0 {
        Encoder::new(BitOrder::Msb, 8)
    } else {
        Encoder::with_tiff_size_switch(BitOrder::Msb, 8)
    };
    let mut output = Vec::new();
    let result = encoder.into_vec(&mut output).encode_all(data);
    result
        .status
        .map_err(|err| PdfError::decode(NAME, None, err.to_string()))?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lzwdecode() {
        let data = b"\x80\x0b\x60\x50\x22\x0c\x0c\x85\x01";
        assert_eq!(lzwdecode(data).unwrap(), b"\x2d\x2d\x2d\x2d\x2d\x41\x2d\x2d\x2d\x42");
    }

    #[test]
    fn early_change_roundtrip_past_code_width_switch() {
        let data: Vec<u8> = (0..4000u32).map(|i| (i * 7 % 251) as u8).collect();
        for early in [0, 1] {
            let encoded = lzwencode_with_earlychange(&data, early).unwrap();
            assert_eq!(lzwdecode_with_earlychange(&encoded, early).unwrap(), data);
        }
    }
}
