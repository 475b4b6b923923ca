//! Miscellaneous routines.
//!
//! - Byte search helpers shared by the parser and the xref reader
//! - Backward line reading for locating `startxref`
//! - `%PDF-x.y` header versions
//! - Human readable byte counts for reports

use crate::error::{PdfError, Result};
use std::fmt;

/// Find the first occurrence of `needle` in `haystack`.
pub fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Find the last occurrence of `needle` in `haystack`.
pub fn rfind_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

/// Read the line that ends at `pos`, scanning backwards.
///
/// The returned position is just past the end of the previous line's
/// content: the whole run of CR/LF bytes separating the two lines is
/// consumed. Reading from position 0 is an error.
pub fn read_previous_line(data: &[u8], pos: usize) -> Result<(&[u8], usize)> {
    let pos = pos.min(data.len());
    if pos == 0 {
        return Err(PdfError::UnexpectedEof);
    }

    let line_start = data[..pos]
        .iter()
        .rposition(|&b| b == b'\r' || b == b'\n')
        .map_or(0, |i| i + 1);
    let line = &data[line_start..pos];

    let mut new_pos = line_start;
    while new_pos > 0 && matches!(data[new_pos - 1], b'\r' | b'\n') {
        new_pos -= 1;
    }
    Ok((line, new_pos))
}

/// PDF header version (`%PDF-major.minor`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PdfVersion {
    pub major: u8,
    pub minor: u8,
}

impl PdfVersion {
    pub const V1_4: Self = Self::new(1, 4);
    /// First version with cross-reference streams.
    pub const V1_5: Self = Self::new(1, 5);
    pub const V1_7: Self = Self::new(1, 7);

    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Find `%PDF-x.y` within the first kilobyte.
    pub fn from_header(data: &[u8]) -> Option<Self> {
        let head = &data[..data.len().min(1024)];
        let at = find_bytes(head, b"%PDF-")? + 5;
        let rest = &head[at..];
        let major = rest.first().filter(|b| b.is_ascii_digit())? - b'0';
        if rest.get(1) != Some(&b'.') {
            return None;
        }
        let minor = rest.get(2).filter(|b| b.is_ascii_digit())? - b'0';
        Some(Self::new(major, minor))
    }

    /// Highest version in a set, e.g. of all documents feeding one writer.
    pub fn max_version(versions: impl IntoIterator<Item = Self>) -> Option<Self> {
        versions.into_iter().max()
    }
}

impl Default for PdfVersion {
    fn default() -> Self {
        Self::V1_4
    }
}

impl fmt::Display for PdfVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Format a byte count with SI units (`1.5 kB`, `12.0 MB`).
pub fn human_readable_bytes(bytes: u64) -> String {
    const KB: u64 = 1_000;
    const MB: u64 = 1_000_000;
    const GB: u64 = 1_000_000_000;
    match bytes {
        b if b < KB => format!("{b} Byte"),
        b if b < MB => format!("{:.1} kB", b as f64 / KB as f64),
        b if b < GB => format!("{:.1} MB", b as f64 / MB as f64),
        b => format!("{:.1} GB", b as f64 / GB as f64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_and_rfind() {
        let data = b"xref xref";
        assert_eq!(find_bytes(data, b"xref"), Some(0));
        assert_eq!(rfind_bytes(data, b"xref"), Some(5));
        assert_eq!(find_bytes(data, b""), None);
        assert_eq!(rfind_bytes(b"ab", b"abc"), None);
    }

    #[test]
    fn version_header() {
        assert_eq!(
            PdfVersion::from_header(b"%PDF-1.7\n%\xe2\xe3"),
            Some(PdfVersion::V1_7)
        );
        assert_eq!(PdfVersion::from_header(b"garbage\n%PDF-2.0"), Some(PdfVersion::new(2, 0)));
        assert_eq!(PdfVersion::from_header(b"%PDF-x"), None);
    }
}
