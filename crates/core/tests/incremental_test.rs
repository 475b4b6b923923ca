mod common;

use common::{PdfBuilder, simple_document};
use quire_core::document::XrefKind;
use quire_core::{Dictionary, Document, ObjectId, PdfError, PdfValue};

fn id(objnum: u32) -> ObjectId {
    ObjectId::new(objnum, 0)
}

fn base_file() -> Vec<u8> {
    simple_document(&[b"q Q"])
        .object(5, "(old)")
        .object(6, "(gone)")
        .build()
}

#[test]
fn update_appends_after_original_bytes() {
    let original = base_file();
    let doc = Document::new(&original).unwrap();
    let mut update = doc.edit();
    assert!(update.is_empty());

    update
        .replace(id(5), PdfValue::String(b"new".to_vec()))
        .unwrap();
    let added = update.new_object(42).unwrap();
    update.remove(id(6)).unwrap();
    assert_eq!(added, id(7));
    assert_eq!(*update.get(id(5)).unwrap(), PdfValue::String(b"new".to_vec()));
    assert!(matches!(update.get(id(6)), Err(PdfError::ObjectNotFound(_))));

    let bytes = update.to_bytes().unwrap();
    assert!(bytes.starts_with(&original));

    let reloaded = Document::new(&bytes).unwrap();
    assert!(!reloaded.is_reconstructed());
    assert_eq!(reloaded.xref().kind(), XrefKind::Table);
    assert_eq!(reloaded.trailer().prev, doc.startxref());
    assert_eq!(reloaded.trailer().root, Some(id(1)));
    assert_eq!(reloaded.trailer().size, Some(8));

    assert_eq!(*reloaded.resolve(id(5)).unwrap(), PdfValue::String(b"new".to_vec()));
    assert_eq!(*reloaded.resolve(added).unwrap(), PdfValue::Int(42));
    assert!(reloaded.resolve(id(6)).unwrap().is_null());
    // Untouched objects are still read from their old offsets
    assert_eq!(reloaded.resolve(id(4)).unwrap(), doc.resolve(id(4)).unwrap());
    assert_eq!(reloaded.page_count().unwrap(), 1);
}

#[test]
fn successive_updates_chain() {
    let original = base_file();
    let doc = Document::new(&original).unwrap();
    let mut first = doc.edit();
    first.replace(id(5), PdfValue::String(b"one".to_vec())).unwrap();
    let once = first.to_bytes().unwrap();

    let doc = Document::new(&once).unwrap();
    let mut second = doc.edit();
    second.replace(id(5), PdfValue::String(b"two".to_vec())).unwrap();
    let twice = second.to_bytes().unwrap();
    assert!(twice.starts_with(&once));

    let reloaded = Document::new(&twice).unwrap();
    assert_eq!(*reloaded.resolve(id(5)).unwrap(), PdfValue::String(b"two".to_vec()));
    assert_eq!(*reloaded.resolve(id(6)).unwrap(), PdfValue::String(b"gone".to_vec()));
    assert_eq!(reloaded.trailer().prev, doc.startxref());
}

#[test]
fn stream_based_file_gets_stream_section() {
    let original = simple_document(&[b"q Q"]).version("1.5").build_xref_stream();
    let doc = Document::new(&original).unwrap();
    assert_eq!(doc.xref().kind(), XrefKind::Stream);

    let mut update = doc.edit();
    let added = update.new_object(PdfValue::name("Fresh")).unwrap();
    let bytes = update.to_bytes().unwrap();

    let reloaded = Document::new(&bytes).unwrap();
    assert_eq!(reloaded.xref().kind(), XrefKind::Stream);
    assert!(!reloaded.is_reconstructed());
    assert_eq!(*reloaded.resolve(added).unwrap(), PdfValue::name("Fresh"));
    assert_eq!(reloaded.page_count().unwrap(), 1);
}

#[test]
fn set_info_points_trailer_at_new_dictionary() {
    let doc = Document::new(base_file()).unwrap();
    assert_eq!(doc.trailer().info, None);

    let mut update = doc.edit();
    let mut info = Dictionary::new();
    info.insert("Producer", PdfValue::String(b"test".to_vec()));
    let info = update.new_object(info).unwrap();
    update.set_info(info).unwrap();

    let reloaded = Document::new(update.to_bytes().unwrap()).unwrap();
    assert_eq!(reloaded.trailer().info, Some(info));
    let value = reloaded.resolve(info).unwrap();
    assert_eq!(
        value.as_dict().unwrap().get("Producer"),
        Some(&PdfValue::String(b"test".to_vec()))
    );
}

#[test]
fn unknown_objects_are_rejected() {
    let doc = Document::new(base_file()).unwrap();
    let mut update = doc.edit();
    assert!(matches!(
        update.replace(id(99), 1),
        Err(PdfError::ObjectNotFound(_))
    ));
    assert!(matches!(
        update.replace(ObjectId::new(5, 3), 1),
        Err(PdfError::ObjectNotFound(_))
    ));
    assert!(update.remove(id(99)).is_err());
    assert!(update.set_info(id(99)).is_err());

    update.remove(id(5)).unwrap();
    assert!(update.replace(id(5), 1).is_err());
}

#[test]
fn reconstructed_file_cannot_be_updated() {
    let data = PdfBuilder::new()
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [] /Count 0 >>")
        .trailer("/Root 1 0 R")
        .build();
    let text = String::from_utf8(data).unwrap();
    let at = text.rfind("startxref\n").unwrap();
    let broken = format!("{}startxref\n99999\n%%EOF\n", &text[..at]);

    let doc = Document::new(broken.as_bytes()).unwrap();
    assert!(doc.is_reconstructed());
    let mut update = doc.edit();
    update.new_object(1).unwrap();
    assert!(matches!(
        update.to_bytes(),
        Err(PdfError::CrossReference(_))
    ));
}

#[test]
fn exhausted_object_numbers_are_an_error() {
    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::new();
    for (objnum, body) in [
        (1, "<< /Type /Catalog /Pages 2 0 R >>"),
        (2, "<< /Type /Pages /Kids [] /Count 0 >>"),
        (u32::MAX, "(last)"),
    ] {
        offsets.push(out.len());
        out.extend_from_slice(format!("{objnum} 0 obj\n{body}\nendobj\n").as_bytes());
    }
    let startxref = out.len();
    out.extend_from_slice(
        format!(
            "xref\n0 3\n0000000000 65535 f \n{:010} 00000 n \n{:010} 00000 n \n4294967295 1\n{:010} 00000 n \ntrailer\n<< /Size 3 /Root 1 0 R >>\nstartxref\n{startxref}\n%%EOF\n",
            offsets[0], offsets[1], offsets[2]
        )
        .as_bytes(),
    );

    let doc = Document::new(&out).unwrap();
    assert!(!doc.is_reconstructed());
    let last = ObjectId::new(u32::MAX, 0);
    let mut update = doc.edit();
    assert!(matches!(
        update.new_object(1),
        Err(PdfError::DocumentStructure(_))
    ));

    update.replace(last, PdfValue::String(b"updated".to_vec())).unwrap();
    let reloaded = Document::new(update.to_bytes().unwrap()).unwrap();
    assert!(!reloaded.is_reconstructed());
    assert_eq!(
        *reloaded.resolve(last).unwrap(),
        PdfValue::String(b"updated".to_vec())
    );
}
