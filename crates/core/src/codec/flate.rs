//! FlateDecode (zlib/deflate).

use super::Filter;
use crate::error::{PdfError, Result};
use crate::model::Dictionary;
use flate2::write::ZlibEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};
use std::io::Write;

const NAME: &str = "FlateDecode";

#[derive(Debug, Default, Clone, Copy)]
pub struct FlateFilter;

impl Filter for FlateFilter {
    fn decode(&self, data: &[u8], _params: Option<&Dictionary>) -> Result<Vec<u8>> {
        inflate(data)
    }

    fn encode(&self, data: &[u8], _params: Option<&Dictionary>) -> Result<Vec<u8>> {
        deflate(data, Compression::default())
    }

    fn decode_partial(
        &self,
        data: &[u8],
        _params: Option<&Dictionary>,
    ) -> Result<(Vec<u8>, Option<PdfError>)> {
        match inflate(data) {
            Ok(out) => Ok((out, None)),
            Err(err) => Ok((decompress_corrupted(data), Some(err))),
        }
    }

    fn uses_predictor(&self) -> bool {
        true
    }
}

/// Strict zlib decompression. Errors carry the input offset where the
/// decoder gave up.
pub fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    let mut decoder = Decompress::new(true);
    let mut out = Vec::with_capacity(data.len().saturating_mul(4).max(64));

    loop {
        if out.len() == out.capacity() {
            out.reserve(out.len().max(4096));
        }
        let consumed = decoder.total_in() as usize;
        let before_out = decoder.total_out();
        let status = decoder
            .decompress_vec(&data[consumed..], &mut out, FlushDecompress::None)
            .map_err(|e| PdfError::decode(NAME, Some(decoder.total_in() as usize), e.to_string()))?;

        match status {
            Status::StreamEnd => return Ok(out),
            Status::Ok | Status::BufError => {
                // There is always spare output room here, so no progress
                // means the input ran out before the end of the stream
                let progressed = decoder.total_in() as usize != consumed
                    || decoder.total_out() != before_out;
                if !progressed {
                    return Err(PdfError::decode(
                        NAME,
                        Some(decoder.total_in() as usize),
                        "unexpected end of compressed data",
                    ));
                }
            }
        }
    }
}

/// zlib compression at the given level.
pub fn deflate(data: &[u8], level: Compression) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2 + 16), level);
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Best-effort zlib decompression for corrupted streams.
///
/// Feeds one byte at a time and returns whatever came out before the
/// decoder failed (often a bad checksum at the very end).
pub fn decompress_corrupted(data: &[u8]) -> Vec<u8> {
    let mut decoder = Decompress::new(true);
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut buf = [0u8; 4096];
    let mut i = 0usize;
    while i < data.len() {
        let before_out = decoder.total_out();
        let before_in = decoder.total_in();
        let res = decoder.decompress(&data[i..i + 1], &mut buf, FlushDecompress::None);
        let produced = (decoder.total_out() - before_out) as usize;
        if produced > 0 {
            out.extend_from_slice(&buf[..produced]);
        }
        let consumed = (decoder.total_in() - before_in) as usize;
        i += consumed.max(1);
        match res {
            Ok(Status::StreamEnd) | Err(_) => break,
            Ok(_) => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncated_stream_reports_position() {
        let encoded = deflate(&[7u8; 1000], Compression::default()).unwrap();
        let cut = &encoded[..encoded.len() - 6];
        match inflate(cut) {
            Err(PdfError::FilterDecode { filter, pos, .. }) => {
                assert_eq!(filter, "FlateDecode");
                assert!(pos.is_some());
            }
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn corrupted_checksum_keeps_payload() {
        let mut encoded = deflate(b"partial but useful", Compression::default()).unwrap();
        let last = encoded.len() - 1;
        encoded[last] ^= 0xff;
        assert!(inflate(&encoded).is_err());
        assert_eq!(decompress_corrupted(&encoded), b"partial but useful");
    }
}
