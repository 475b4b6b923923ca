use quire_core::PdfError;
use quire_core::utils::{PdfVersion, human_readable_bytes, read_previous_line};

#[test]
fn previous_lines_walk_back_over_mixed_line_endings() {
    let data = b"first\r\nsecond\rthird\n\nlast";
    let mut pos = data.len();
    let mut lines = Vec::new();
    while let Ok((line, next)) = read_previous_line(data, pos) {
        lines.push(String::from_utf8_lossy(line).into_owned());
        pos = next;
    }
    assert_eq!(lines, ["last", "third", "second", "first"]);
    assert_eq!(pos, 0);
}

#[test]
fn trailing_newline_yields_an_empty_line_first() {
    let data = b"startxref\n123\n%%EOF\n";
    let (line, pos) = read_previous_line(data, data.len()).unwrap();
    assert!(line.is_empty());
    let (line, pos) = read_previous_line(data, pos).unwrap();
    assert_eq!(line, b"%%EOF");
    let (line, pos) = read_previous_line(data, pos).unwrap();
    assert_eq!(line, b"123");
    let (line, _) = read_previous_line(data, pos).unwrap();
    assert_eq!(line, b"startxref");
}

#[test]
fn previous_line_at_start_is_eof() {
    assert!(matches!(
        read_previous_line(b"abc", 0),
        Err(PdfError::UnexpectedEof)
    ));
    assert!(matches!(read_previous_line(b"", 10), Err(PdfError::UnexpectedEof)));
}

#[test]
fn byte_counts() {
    assert_eq!(human_readable_bytes(0), "0 Byte");
    assert_eq!(human_readable_bytes(999), "999 Byte");
    assert_eq!(human_readable_bytes(1_500), "1.5 kB");
    assert_eq!(human_readable_bytes(12_000_000), "12.0 MB");
    assert_eq!(human_readable_bytes(3_210_000_000), "3.2 GB");
}

#[test]
fn versions_order_and_display() {
    let versions = [PdfVersion::new(1, 3), PdfVersion::V1_7, PdfVersion::V1_5];
    assert_eq!(PdfVersion::max_version(versions), Some(PdfVersion::V1_7));
    assert_eq!(PdfVersion::max_version([]), None);
    assert!(PdfVersion::new(2, 0) > PdfVersion::V1_7);
    assert_eq!(PdfVersion::default().to_string(), "1.4");
}
