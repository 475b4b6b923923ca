//! RunLengthDecode.

use super::Filter;
use crate::error::Result;
use crate::model::Dictionary;

#[derive(Debug, Default, Clone, Copy)]
pub struct RunLengthFilter;

impl Filter for RunLengthFilter {
    fn decode(&self, data: &[u8], _params: Option<&Dictionary>) -> Result<Vec<u8>> {
        Ok(rldecode(data))
    }

    fn encode(&self, data: &[u8], _params: Option<&Dictionary>) -> Result<Vec<u8>> {
        Ok(rlencode(data))
    }
}

/// Decode RunLength-encoded data.
///
/// Format:
/// - Length byte 0-127: Copy next (length + 1) bytes literally
/// - Length byte 128: End of data (EOD marker)
/// - Length byte 129-255: Repeat next byte (257 - length) times
///
/// Truncated input is tolerated: decoding stops at the first incomplete run.
pub fn rldecode(data: &[u8]) -> Vec<u8> {
    let mut result = Vec::new();
    let mut i = 0;

    while i < data.len() {
        let length = data[i];
        i += 1;

        match length {
            128 => break, // EOD
            0..=127 => {
                let count = length as usize + 1;
                if i + count > data.len() {
                    break;
                }
                result.extend_from_slice(&data[i..i + count]);
                i += count;
            }
            129..=255 => {
                let Some(&byte) = data.get(i) else {
                    break;
                };
                i += 1;
                result.extend(std::iter::repeat_n(byte, 257 - length as usize));
            }
        }
    }

    result
}

/// Encode with runs of 2..=128 repeated bytes and literal runs of up to 128.
pub fn rlencode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 128 + 2);
    let mut i = 0;

    while i < data.len() {
        let mut run = 1;
        while i + run < data.len() && data[i + run] == data[i] && run < 128 {
            run += 1;
        }
        if run >= 2 {
            out.push((257 - run) as u8);
            out.push(data[i]);
            i += run;
            continue;
        }

        let start = i;
        i += 1;
        while i < data.len() && i - start < 128 && !(i + 1 < data.len() && data[i] == data[i + 1]) {
            i += 1;
        }
        out.push((i - start - 1) as u8);
        out.extend_from_slice(&data[start..i]);
    }

    out.push(128);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_mixed_runs() {
        // literal "ab", then 'c' x 3, then EOD
        assert_eq!(rldecode(&[1, b'a', b'b', 254, b'c', 128]), b"abccc");
    }

    #[test]
    fn encode_uses_repeat_runs() {
        assert_eq!(rlencode(b"abccc"), [1, b'a', b'b', 254, b'c', 128]);
    }

    #[test]
    fn long_runs_are_split() {
        let data = vec![9u8; 300];
        let encoded = rlencode(&data);
        assert_eq!(encoded, [129, 9, 129, 9, 213, 9, 128]);
        assert_eq!(rldecode(&encoded), data);
    }
}
