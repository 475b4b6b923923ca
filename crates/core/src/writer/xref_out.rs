//! Emitting cross-reference sections and trailers.

use super::serialize::{CountingWriter, write_indirect, write_value};
use crate::codec::flate::deflate;
use crate::document::XrefEntry;
use crate::error::Result;
use crate::model::{Dictionary, Name, ObjectId, PdfStream, PdfValue};
use flate2::Compression;
use std::collections::BTreeMap;
use std::io::Write;

/// Runs of consecutive object numbers: `(first, count)`.
pub(crate) fn subsections(entries: &BTreeMap<u32, XrefEntry>) -> Vec<(u32, u32)> {
    let mut runs: Vec<(u32, u32)> = Vec::new();
    for &objnum in entries.keys() {
        match runs.last_mut() {
            Some((start, count)) if *start + *count == objnum => *count += 1,
            _ => runs.push((objnum, 1)),
        }
    }
    runs
}

/// Write `xref`, the records, the trailer and `startxref`. Returns the
/// offset of the section.
pub(crate) fn write_table<W: Write>(
    out: &mut CountingWriter<W>,
    entries: &BTreeMap<u32, XrefEntry>,
    trailer: &Dictionary,
) -> Result<u64> {
    let startxref = out.position();
    out.write_all(b"xref\n")?;
    for (start, count) in subsections(entries) {
        writeln!(out, "{start} {count}")?;
        for objnum in start..start + count {
            let record = match entries.get(&objnum) {
                Some(XrefEntry::InUse { offset, genno }) => format!("{offset:010} {genno:05} n \n"),
                Some(XrefEntry::Free { next, genno }) => format!("{next:010} {genno:05} f \n"),
                // Classic tables cannot express compressed entries
                Some(XrefEntry::Compressed { .. }) | None => "0000000000 00000 f \n".to_string(),
            };
            out.write_all(record.as_bytes())?;
        }
    }

    let mut body = Vec::new();
    write_value(&mut body, &PdfValue::Dict(trailer.clone()));
    out.write_all(b"trailer\n")?;
    out.write_all(&body)?;
    write!(out, "\nstartxref\n{startxref}\n%%EOF\n")?;
    Ok(startxref)
}

/// Bytes needed to hold `n` big-endian, at least one.
fn width_of(n: u64) -> usize {
    (((64 - n.leading_zeros()) as usize).div_ceil(8)).max(1)
}

/// Write a cross-reference stream as object `objnum`, which gets an entry
/// for itself. `trailer` supplies `/Root`, `/Info`, `/Prev` and `/Size`.
pub(crate) fn write_stream<W: Write>(
    out: &mut CountingWriter<W>,
    mut entries: BTreeMap<u32, XrefEntry>,
    trailer: &Dictionary,
    objnum: u32,
) -> Result<u64> {
    let startxref = out.position();
    entries.insert(
        objnum,
        XrefEntry::InUse {
            offset: startxref as usize,
            genno: 0,
        },
    );

    let widest = entries
        .values()
        .map(|e| match e {
            XrefEntry::InUse { offset, .. } => *offset as u64,
            XrefEntry::Free { next, .. } => u64::from(*next),
            XrefEntry::Compressed { container, .. } => u64::from(*container),
        })
        .max()
        .unwrap_or(0);
    let w1 = width_of(widest);
    let w2 = 2;

    let mut data = Vec::with_capacity(entries.len() * (1 + w1 + w2));
    for entry in entries.values() {
        let (kind, f1, f2) = match *entry {
            XrefEntry::Free { next, genno } => (0u8, u64::from(next), u64::from(genno)),
            XrefEntry::InUse { offset, genno } => (1, offset as u64, u64::from(genno)),
            XrefEntry::Compressed { container, index } => (2, u64::from(container), index as u64),
        };
        data.push(kind);
        data.extend_from_slice(&f1.to_be_bytes()[8 - w1..]);
        data.extend_from_slice(&f2.to_be_bytes()[8 - w2..]);
    }

    let mut dict = trailer.clone();
    dict.insert("Type", PdfValue::name("XRef"));
    let size = i64::from(objnum) + 1;
    if dict.get_int("Size").is_none_or(|s| s < size) {
        dict.insert("Size", size);
    }
    dict.insert(
        "W",
        vec![PdfValue::Int(1), PdfValue::from(w1), PdfValue::from(w2)],
    );
    let index: Vec<PdfValue> = subsections(&entries)
        .into_iter()
        .flat_map(|(start, count)| [PdfValue::from(i64::from(start)), PdfValue::from(i64::from(count))])
        .collect();
    dict.insert("Index", index);
    dict.insert("Filter", PdfValue::Name(Name::new("FlateDecode")));

    let stream = PdfStream::new(dict, deflate(&data, Compression::default())?);
    write_indirect(out, ObjectId::new(objnum, 0), &PdfValue::from(stream))?;
    write!(out, "startxref\n{startxref}\n%%EOF\n")?;
    Ok(startxref)
}
