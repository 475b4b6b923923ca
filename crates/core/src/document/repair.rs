//! Cross-reference reconstruction.
//!
//! When the declared table is missing or unusable, every `N G obj` header in
//! the file is collected. Later headers override earlier ones, which is what
//! an incrementally updated file means. Objects inside object streams are
//! added from the containers found along the way, and a trailer is
//! recovered from the newest `trailer` keyword, an xref stream dictionary,
//! or failing both, the newest `/Type /Catalog` object.

use super::object_stream::ObjectStream;
use super::xref::{CrossReferenceTable, Trailer, XrefEntry, XrefKind};
use crate::error::{PdfError, Result, StructuralWarning};
use crate::model::{Dictionary, ObjectId, PdfValue};
use crate::parser::ObjectParser;
use crate::utils::find_bytes;
use bytes::Bytes;
use regex::bytes::Regex;

/// How far past an object header a type marker is looked for.
const HEADER_WINDOW: usize = 1024;

/// Rebuild the table by scanning `source`.
///
/// `declared` is the table read from the file, if any; offsets that
/// disagree with it are reported as [`StructuralWarning::ConflictingOffset`].
pub fn reconstruct(
    source: &Bytes,
    declared: Option<&CrossReferenceTable>,
    reason: &str,
    max_nesting: usize,
) -> Result<(CrossReferenceTable, Vec<StructuralWarning>)> {
    let re = Regex::new(r"(?-u)\b(\d+)\s+(\d+)\s+obj\b")
        .map_err(|e| PdfError::CrossReference(e.to_string()))?;
    let data: &[u8] = source;

    let mut table = CrossReferenceTable::new(XrefKind::Reconstructed);
    let mut headers: Vec<(ObjectId, usize)> = Vec::new();

    for cap in re.captures_iter(data) {
        let (Some(objnum), Some(genno)) = (parse_num::<u32>(&cap[1]), parse_num::<u16>(&cap[2]))
        else {
            continue;
        };
        let Some(offset) = cap.get(1).map(|m| m.start()) else {
            continue;
        };
        table.insert(objnum, XrefEntry::InUse { offset, genno });
        headers.push((ObjectId::new(objnum, genno), offset));
    }

    if headers.is_empty() {
        return Err(PdfError::DocumentStructure(
            "no objects found while reconstructing cross-reference table".into(),
        ));
    }

    let mut warnings = Vec::new();
    if let Some(declared) = declared {
        for (objnum, entry) in table.iter() {
            if let (
                XrefEntry::InUse { offset: kept, .. },
                Some(XrefEntry::InUse {
                    offset: dropped, ..
                }),
            ) = (entry, declared.get(objnum))
                && kept != dropped
            {
                warnings.push(StructuralWarning::ConflictingOffset {
                    objnum,
                    kept: *kept,
                    dropped: *dropped,
                });
            }
        }
    }

    // Only objects whose current entry is this header are candidates
    let current: Vec<(ObjectId, usize)> = headers
        .iter()
        .copied()
        .filter(|(id, offset)| {
            matches!(table.get(id.objnum), Some(XrefEntry::InUse { offset: o, .. }) if o == offset)
        })
        .collect();

    let mut catalog: Option<ObjectId> = None;
    let mut xref_stream_trailer: Option<Dictionary> = None;

    for &(id, offset) in &current {
        let window = &data[offset..data.len().min(offset + HEADER_WINDOW)];
        let dict_part = find_bytes(window, b"stream").map_or(window, |end| &window[..end]);
        let is_objstm = find_bytes(dict_part, b"/ObjStm").is_some();
        let is_xref = find_bytes(dict_part, b"/XRef").is_some();
        let is_catalog = find_bytes(dict_part, b"/Catalog").is_some();
        if !(is_objstm || is_xref || is_catalog) {
            continue;
        }

        let mut parser = ObjectParser::from_bytes(source).with_max_depth(max_nesting);
        parser.seek(offset);
        let Ok(object) = parser.parse_indirect(|_| None) else {
            continue;
        };
        warnings.extend(object.warning);

        match &object.value {
            PdfValue::Stream(stream) if stream.dict.has_type("ObjStm") => {
                let decoded = match stream.decode() {
                    Ok(decoded) => decoded,
                    Err(err) => {
                        tracing::debug!(%id, %err, "skipping undecodable object stream");
                        continue;
                    }
                };
                match ObjectStream::new(stream, decoded, max_nesting) {
                    Ok(objstm) => {
                        for (index, objnum) in objstm.object_numbers().enumerate() {
                            table.insert_older(
                                objnum,
                                XrefEntry::Compressed {
                                    container: id.objnum,
                                    index,
                                },
                            );
                        }
                    }
                    Err(err) => tracing::debug!(%id, %err, "skipping object stream"),
                }
            }
            PdfValue::Stream(stream) if stream.dict.has_type("XRef") => {
                if stream.dict.contains_key("Root") {
                    xref_stream_trailer = Some(stream.dict.clone());
                }
            }
            PdfValue::Dict(dict) if dict.has_type("Catalog") => catalog = Some(id),
            _ => {}
        }
    }

    let mut trailer = find_trailer(data, max_nesting)
        .or(xref_stream_trailer)
        .unwrap_or_default();
    if let Some(declared) = declared {
        for (key, value) in declared.trailer.dict.iter() {
            if !trailer.contains_key(key.as_str()) {
                trailer.insert(key.clone(), value.clone());
            }
        }
    }
    for key in ["Length", "Filter", "DecodeParms", "W", "Index", "Type", "Prev", "XRefStm"] {
        trailer.remove(key);
    }
    if !trailer.contains_key("Root")
        && let Some(catalog) = catalog
    {
        trailer.insert("Root", catalog);
    }
    trailer.insert("Size", i64::from(table.max_objnum()) + 1);
    table.trailer = Trailer::from_dict(trailer);

    let objects = table.len();
    warnings.insert(
        0,
        StructuralWarning::XrefReconstructed {
            reason: reason.to_string(),
            objects,
        },
    );
    tracing::debug!(objects, reason, "reconstructed cross-reference table");
    Ok((table, warnings))
}

fn parse_num<T: std::str::FromStr>(digits: &[u8]) -> Option<T> {
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// Newest `trailer << ... >>` that names a `/Root`.
fn find_trailer(data: &[u8], max_nesting: usize) -> Option<Dictionary> {
    let mut end = data.len();
    while let Some(pos) = crate::utils::rfind_bytes(&data[..end], b"trailer") {
        let mut parser = ObjectParser::new(data).with_max_depth(max_nesting);
        parser.seek(pos + b"trailer".len());
        if let Ok(PdfValue::Dict(dict)) = parser.parse_object()
            && dict.contains_key("Root")
        {
            return Some(dict);
        }
        end = pos;
    }
    None
}
