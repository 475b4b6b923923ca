mod common;

use bytes::Bytes;
use common::{PdfBuilder, simple_document};
use quire_core::document::xref::{find_startxref, load_chain};
use quire_core::document::{Document, XrefEntry, XrefKind};
use quire_core::{ObjectId, PdfError, PdfValue, StructuralWarning};

/// Append objects and a classic section whose `/Prev` is the file's
/// current `startxref`.
fn append_update(base: &[u8], objects: &[(u32, &str)], trailer: &str) -> Vec<u8> {
    let prev = find_startxref(base).unwrap();
    let mut out = base.to_vec();
    let mut records = String::new();
    for (objnum, body) in objects {
        records.push_str(&format!("{objnum} 1\n{:010} 00000 n \n", out.len()));
        out.extend_from_slice(format!("{objnum} 0 obj\n{body}\nendobj\n").as_bytes());
    }
    let startxref = out.len();
    out.extend_from_slice(
        format!("xref\n{records}trailer\n<< {trailer} /Prev {prev} >>\nstartxref\n{startxref}\n%%EOF\n")
            .as_bytes(),
    );
    out
}

#[test]
fn classic_table_matches_object_offsets() {
    let (data, offsets) = simple_document(&[b"q Q"]).build_with_offsets();
    let data = Bytes::from(data);
    let (table, warnings) = load_chain(&data, find_startxref(&data).unwrap(), 16).unwrap();

    assert!(warnings.is_empty());
    assert_eq!(table.kind(), XrefKind::Table);
    assert_eq!(table.get(0), Some(&XrefEntry::Free { next: 0, genno: 65535 }));
    for (objnum, offset) in offsets {
        assert_eq!(table.get(objnum), Some(&XrefEntry::InUse { offset, genno: 0 }));
    }
    assert_eq!(table.trailer.root, Some(ObjectId::new(1, 0)));
    assert_eq!(table.trailer.size, Some(5));
}

#[test]
fn xref_stream_document_resolves() {
    let data = simple_document(&[b"BT ET"]).version("1.5").build_xref_stream();
    let doc = Document::new(&data).unwrap();
    assert_eq!(doc.xref().kind(), XrefKind::Stream);
    assert!(doc.warnings().is_empty());
    assert_eq!(doc.page_count().unwrap(), 1);
    // The stream's own dictionary keys are not part of the trailer
    assert!(doc.trailer().get("W").is_none());
    assert_eq!(doc.trailer().root, Some(ObjectId::new(1, 0)));
}

#[test]
fn newest_section_wins_and_trailer_is_inherited() {
    let base = PdfBuilder::new()
        .object(1, "<< /Type /Catalog /Pages 3 0 R >>")
        .object(2, "(old)")
        .object(3, "<< /Type /Pages /Kids [] /Count 0 >>")
        .trailer("/Root 1 0 R /ID [(a) (b)]")
        .build();
    let updated = append_update(&base, &[(2, "(new)")], "/Size 4");

    let doc = Document::new(&updated).unwrap();
    assert_eq!(*doc.resolve(ObjectId::new(2, 0)).unwrap(), PdfValue::String(b"new".to_vec()));
    assert_eq!(doc.trailer().root, Some(ObjectId::new(1, 0)));
    assert!(doc.trailer().get("ID").is_some());
    assert!(doc.trailer().prev.is_some());
    assert!(!doc.is_reconstructed());
}

#[test]
fn prev_cycle_is_an_error() {
    let base = PdfBuilder::new()
        .object(1, "<< /Type /Catalog >>")
        .trailer("/Root 1 0 R")
        .build();
    let startxref = find_startxref(&base).unwrap();
    let text = String::from_utf8(base).unwrap();
    let looped = text.replace("/Root 1 0 R", &format!("/Root 1 0 R /Prev {startxref}"));
    let data = Bytes::from(looped.into_bytes());

    assert!(matches!(
        load_chain(&data, startxref, 16),
        Err(PdfError::CrossReference(_))
    ));
}

#[test]
fn hybrid_stream_fills_free_entries_only() {
    let mut out = b"%PDF-1.5\n".to_vec();
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj\n<< /Type /Pages /Kids [] /Count 0 >>\nendobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj\n(hidden)\nendobj\n");

    let o4 = out.len();
    let mut rows = Vec::new();
    // Object 2 at a bogus offset, object 3 at its real one
    for offset in [9999u16, o3 as u16] {
        rows.push(1u8);
        rows.extend_from_slice(&offset.to_be_bytes());
        rows.push(0);
    }
    out.extend_from_slice(
        format!(
            "4 0 obj\n<< /Type /XRef /Size 5 /W [1 2 1] /Index [2 2] /Length {} >>\nstream\n",
            rows.len()
        )
        .as_bytes(),
    );
    out.extend_from_slice(&rows);
    out.extend_from_slice(b"\nendstream\nendobj\n");

    let startxref = out.len();
    out.extend_from_slice(
        format!(
            "xref\n0 4\n0000000000 65535 f \n{o1:010} 00000 n \n{o2:010} 00000 n \n0000000000 00000 f \ntrailer\n<< /Size 5 /Root 1 0 R /XRefStm {o4} >>\nstartxref\n{startxref}\n%%EOF\n"
        )
        .as_bytes(),
    );

    let doc = Document::new(&out).unwrap();
    assert_eq!(doc.xref().get(2), Some(&XrefEntry::InUse { offset: o2, genno: 0 }));
    assert_eq!(doc.xref().get(3), Some(&XrefEntry::InUse { offset: o3, genno: 0 }));
    assert_eq!(
        *doc.resolve(ObjectId::new(3, 0)).unwrap(),
        PdfValue::String(b"hidden".to_vec())
    );
}

#[test]
fn subsection_starting_at_one_is_rebased() {
    let mut out = b"%PDF-1.4\n".to_vec();
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj\n<< /Type /Pages /Kids [] /Count 0 >>\nendobj\n");
    let startxref = out.len();
    out.extend_from_slice(
        format!(
            "xref\n1 3\n0000000000 65535 f \n{o1:010} 00000 n \n{o2:010} 00000 n \ntrailer\n<< /Size 3 /Root 1 0 R >>\nstartxref\n{startxref}\n%%EOF\n"
        )
        .as_bytes(),
    );

    let doc = Document::new(&out).unwrap();
    assert_eq!(doc.xref().get(1), Some(&XrefEntry::InUse { offset: o1, genno: 0 }));
    assert!(doc.xref().get(3).is_none());
    assert!(!doc.is_reconstructed());
    assert!(doc.catalog().is_ok());
}

#[test]
fn trailing_garbage_after_eof_is_tolerated() {
    let mut data = simple_document(&[b"q Q"]).build();
    data.extend_from_slice(b"\r\n\r\n\x00\x00 garbage\n");
    let doc = Document::new(&data).unwrap();
    assert!(!doc.is_reconstructed());
}

#[test]
fn wrong_startxref_falls_back_to_scan() {
    let data = simple_document(&[b"q Q"]).build();
    let text = String::from_utf8(data).unwrap();
    let at = text.rfind("startxref\n").unwrap();
    let broken = format!("{}startxref\n7\n%%EOF\n", &text[..at]);

    let doc = Document::new(broken.as_bytes()).unwrap();
    assert!(doc.is_reconstructed());
    assert!(matches!(
        doc.warnings().first(),
        Some(StructuralWarning::XrefReconstructed { .. })
    ));
    assert_eq!(doc.page_count().unwrap(), 1);
}

#[test]
fn reconstruction_can_be_disabled() {
    let data = simple_document(&[b"q Q"]).build();
    let text = String::from_utf8(data).unwrap();
    let at = text.rfind("startxref\n").unwrap();
    let broken = format!("{}startxref\n7\n%%EOF\n", &text[..at]);

    let options = quire_core::ParseOptions::default().with_reconstruct_on_failure(false);
    let result = Document::with_options(Bytes::from(broken.into_bytes()), options);
    assert!(result.is_err());
}

#[test]
fn out_of_range_stream_fields_fall_back_to_reconstruction() {
    for hostile in [
        "/Index [-1 2]",
        "/Index [4294967295 10]",
        "/Index [0 99999999999]",
        "/Index [3 -2]",
        "/W [1 -4 2]",
        "/W [1 9 2]",
    ] {
        let data = simple_document(&[b"q Q"])
            .version("1.5")
            .trailer(&format!("/Root 1 0 R {hostile}"))
            .build_xref_stream();
        let bytes = Bytes::from(data.clone());
        let err = load_chain(&bytes, find_startxref(&bytes).unwrap(), 16).unwrap_err();
        assert!(matches!(err, PdfError::CrossReference(_)), "{hostile}: {err}");

        let doc = Document::new(&data).unwrap();
        assert!(doc.is_reconstructed(), "{hostile}");
        assert_eq!(doc.page_count().unwrap(), 1, "{hostile}");
    }
}

#[test]
fn out_of_range_table_subsection_falls_back_to_reconstruction() {
    let text = String::from_utf8(simple_document(&[b"q Q"]).build()).unwrap();
    for start in ["4294967295", "18446744073709551615"] {
        let broken = text.replacen("xref\n0 ", &format!("xref\n{start} "), 1);
        let bytes = Bytes::from(broken.clone().into_bytes());
        let err = load_chain(&bytes, find_startxref(&bytes).unwrap(), 16).unwrap_err();
        assert!(matches!(err, PdfError::CrossReference(_)), "{start}: {err}");

        let doc = Document::new(broken.as_bytes()).unwrap();
        assert!(doc.is_reconstructed(), "{start}");
        assert_eq!(doc.page_count().unwrap(), 1, "{start}");
    }
}
