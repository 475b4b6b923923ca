//! Cross-reference tables and trailers.
//!
//! Loads classic `xref` sections and cross-reference streams, follows the
//! `/Prev` chain from the newest section to the oldest and merges them so
//! that the most recently appended entry for an object number wins.

use crate::error::{PdfError, Result, StructuralWarning};
use crate::model::{Dictionary, ObjectId, PdfValue};
use crate::parser::{Lexer, ObjectParser};
use crate::utils::{read_previous_line, rfind_bytes};
use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;

/// Location of one object number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefEntry {
    Free { next: u32, genno: u16 },
    InUse { offset: usize, genno: u16 },
    /// Stored inside an object stream; generation is always 0
    Compressed { container: u32, index: usize },
}

impl XrefEntry {
    pub const fn genno(&self) -> u16 {
        match self {
            Self::Free { genno, .. } | Self::InUse { genno, .. } => *genno,
            Self::Compressed { .. } => 0,
        }
    }

    pub const fn is_free(&self) -> bool {
        matches!(self, Self::Free { .. })
    }
}

/// How a table was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefKind {
    /// `xref` keyword, subsections of 20-byte records
    Table,
    /// `/Type /XRef` stream
    Stream,
    /// Rebuilt by scanning the file for `N G obj`
    Reconstructed,
}

/// Trailer dictionary with its well-known keys pulled out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trailer {
    pub root: Option<ObjectId>,
    pub size: Option<u32>,
    /// Offset of the previous cross-reference section
    pub prev: Option<usize>,
    /// Offset of the hybrid cross-reference stream
    pub xref_stm: Option<usize>,
    pub info: Option<ObjectId>,
    pub dict: Dictionary,
}

impl Trailer {
    pub fn from_dict(dict: Dictionary) -> Self {
        let offset = |key: &str| dict.get_int(key).and_then(|n| usize::try_from(n).ok());
        let reference = |key: &str| dict.get(key).and_then(|v| v.as_ref().ok());
        Self {
            root: reference("Root"),
            size: dict.get_int("Size").and_then(|n| u32::try_from(n).ok()),
            prev: offset("Prev"),
            xref_stm: offset("XRefStm"),
            info: reference("Info"),
            dict,
        }
    }

    pub fn get(&self, key: &str) -> Option<&PdfValue> {
        self.dict.get(key)
    }

    /// Fill keys missing here from an older trailer in the chain. Chain
    /// links are never inherited.
    fn merge_older(&mut self, older: &Dictionary) {
        let mut dict = std::mem::take(&mut self.dict);
        for (key, value) in older.iter() {
            if matches!(key.as_str(), "Prev" | "XRefStm") || dict.contains_key(key.as_str()) {
                continue;
            }
            dict.insert(key.clone(), value.clone());
        }
        *self = Self::from_dict(dict);
    }
}

/// Object number to location, merged across the whole trailer chain.
#[derive(Debug, Clone)]
pub struct CrossReferenceTable {
    entries: BTreeMap<u32, XrefEntry>,
    pub trailer: Trailer,
    kind: XrefKind,
    /// Offset the newest section was read from
    startxref: Option<usize>,
}

impl CrossReferenceTable {
    pub fn new(kind: XrefKind) -> Self {
        Self {
            entries: BTreeMap::new(),
            trailer: Trailer::default(),
            kind,
            startxref: None,
        }
    }

    pub fn get(&self, objnum: u32) -> Option<&XrefEntry> {
        self.entries.get(&objnum)
    }

    /// Insert, replacing any existing entry.
    pub fn insert(&mut self, objnum: u32, entry: XrefEntry) -> Option<XrefEntry> {
        self.entries.insert(objnum, entry)
    }

    /// Insert only when no newer entry exists.
    pub fn insert_older(&mut self, objnum: u32, entry: XrefEntry) {
        self.entries.entry(objnum).or_insert(entry);
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &XrefEntry)> {
        self.entries.iter().map(|(n, e)| (*n, e))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Identities of every entry that is not free.
    pub fn live_ids(&self) -> Vec<ObjectId> {
        self.iter()
            .filter(|(_, e)| !e.is_free())
            .map(|(n, e)| ObjectId::new(n, e.genno()))
            .collect()
    }

    pub fn max_objnum(&self) -> u32 {
        self.entries.keys().next_back().copied().unwrap_or(0)
    }

    pub const fn kind(&self) -> XrefKind {
        self.kind
    }

    pub const fn startxref(&self) -> Option<usize> {
        self.startxref
    }
}

/// Find the `startxref` offset.
///
/// Lines are read backwards from the end of the file; the offset is the
/// line following `startxref`. Files with junk after `%%EOF` or odd line
/// endings fall back to a plain search for the last `startxref`.
pub fn find_startxref(data: &[u8]) -> Result<usize> {
    let floor = data.len().saturating_sub(2048);
    let mut pos = data.len();
    let mut following: Option<&[u8]> = None;

    while pos > floor {
        let Ok((line, next)) = read_previous_line(data, pos) else {
            break;
        };
        let line = line.trim_ascii();
        if let Some(rest) = line.strip_prefix(b"startxref") {
            let number = if rest.trim_ascii().is_empty() {
                following
            } else {
                Some(rest.trim_ascii())
            };
            if let Some(offset) = number.and_then(parse_offset) {
                return Ok(offset);
            }
            break;
        }
        if !line.is_empty() {
            following = Some(line);
        }
        pos = next;
    }

    let at = rfind_bytes(data, b"startxref")
        .ok_or_else(|| PdfError::CrossReference("no startxref marker".into()))?;
    let mut lexer = Lexer::at(data, at + b"startxref".len());
    lexer.skip_whitespace();
    lexer
        .read_unsigned()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| PdfError::CrossReference("startxref without offset".into()))
}

fn parse_offset(text: &[u8]) -> Option<usize> {
    std::str::from_utf8(text).ok()?.parse().ok()
}

/// One section as read from the file, before merging.
struct Section {
    entries: BTreeMap<u32, XrefEntry>,
    trailer: Dictionary,
    kind: XrefKind,
}

/// Load and merge the section at `startxref` and everything it links to.
pub fn load_chain(
    source: &Bytes,
    startxref: usize,
    max_sections: usize,
) -> Result<(CrossReferenceTable, Vec<StructuralWarning>)> {
    let mut warnings = Vec::new();
    let mut visited = FxHashSet::default();
    let mut table: Option<CrossReferenceTable> = None;
    let mut next = Some(startxref);

    while let Some(pos) = next {
        if !visited.insert(pos) {
            return Err(PdfError::CrossReference(format!(
                "/Prev chain loops back to offset {pos}"
            )));
        }
        if visited.len() > max_sections {
            return Err(PdfError::CrossReference(format!(
                "more than {max_sections} cross-reference sections"
            )));
        }

        let mut section = load_section(source, pos, &mut warnings)?;
        tracing::debug!(
            pos,
            kind = ?section.kind,
            entries = section.entries.len(),
            "loaded xref section"
        );

        // Hybrid file: the stream fills in what the classic section leaves free
        if section.kind == XrefKind::Table
            && let Some(stm) = section
                .trailer
                .get_int("XRefStm")
                .and_then(|n| usize::try_from(n).ok())
            && visited.insert(stm)
        {
            match load_stream(source, stm, &mut warnings) {
                Ok(hybrid) => {
                    for (objnum, entry) in hybrid.entries {
                        match section.entries.get(&objnum) {
                            None | Some(XrefEntry::Free { .. }) => {
                                section.entries.insert(objnum, entry);
                            }
                            Some(_) => {}
                        }
                    }
                }
                Err(err) => tracing::debug!(stm, %err, "ignoring unreadable /XRefStm"),
            }
        }

        next = section
            .trailer
            .get_int("Prev")
            .and_then(|n| usize::try_from(n).ok());

        match table.as_mut() {
            None => {
                let mut newest = CrossReferenceTable::new(section.kind);
                newest.startxref = Some(pos);
                newest.entries = section.entries;
                newest.trailer = Trailer::from_dict(section.trailer);
                table = Some(newest);
            }
            Some(table) => {
                for (objnum, entry) in section.entries {
                    table.insert_older(objnum, entry);
                }
                table.trailer.merge_older(&section.trailer);
            }
        }
    }

    let table = table.ok_or_else(|| PdfError::CrossReference("empty xref chain".into()))?;
    Ok((table, warnings))
}

fn load_section(
    source: &Bytes,
    pos: usize,
    warnings: &mut Vec<StructuralWarning>,
) -> Result<Section> {
    if pos >= source.len() {
        return Err(PdfError::CrossReference(format!(
            "xref offset {pos} beyond end of file"
        )));
    }
    let mut lexer = Lexer::at(source, pos);
    lexer.skip_whitespace();
    if lexer.remaining().starts_with(b"xref") {
        load_table(source, lexer.tell())
    } else {
        load_stream(source, lexer.tell(), warnings)
    }
}

/// Classic table: `xref`, subsections `start count` of records
/// `oooooooooo ggggg n`, then `trailer << ... >>`.
fn load_table(source: &Bytes, pos: usize) -> Result<Section> {
    let data: &[u8] = source;
    let mut lexer = Lexer::at(data, pos + b"xref".len());
    let mut entries = BTreeMap::new();
    let malformed = |at: usize, what: &str| {
        PdfError::CrossReference(format!("malformed xref table at {at}: {what}"))
    };

    loop {
        lexer.skip_whitespace();
        if lexer.at_end() {
            return Err(malformed(lexer.tell(), "missing trailer"));
        }
        if lexer.remaining().starts_with(b"trailer") {
            lexer.seek(lexer.tell() + b"trailer".len());
            break;
        }

        let header_at = lexer.tell();
        let start = lexer
            .read_unsigned()
            .ok_or_else(|| malformed(header_at, "expected subsection start"))?;
        lexer.skip_spaces();
        let count = lexer
            .read_unsigned()
            .ok_or_else(|| malformed(header_at, "expected subsection count"))?;
        lexer.skip_line();

        let mut base = start;
        for i in 0..count {
            lexer.skip_whitespace();
            let record_at = lexer.tell();
            let offset = lexer
                .read_unsigned()
                .ok_or_else(|| malformed(record_at, "expected entry offset"))?;
            lexer.skip_spaces();
            let genno = lexer
                .read_unsigned()
                .ok_or_else(|| malformed(record_at, "expected entry generation"))?;
            lexer.skip_spaces();
            let marker = lexer.remaining().first().copied().unwrap_or(b'f');
            lexer.skip_line();

            // Some writers start the first subsection at 1 but still
            // include the object 0 record; re-base so entries line up.
            if i == 0 && base > 0 && marker == b'f' && offset == 0 && genno == 65535 {
                base -= 1;
            }

            let objnum = base
                .checked_add(i)
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| malformed(record_at, "object number out of range"))?;
            let genno = u16::try_from(genno).unwrap_or(u16::MAX);
            match marker {
                b'n' if offset > 0 => {
                    entries.insert(
                        objnum,
                        XrefEntry::InUse {
                            offset: offset as usize,
                            genno,
                        },
                    );
                }
                b'f' => {
                    entries.insert(
                        objnum,
                        XrefEntry::Free {
                            next: u32::try_from(offset).unwrap_or(0),
                            genno,
                        },
                    );
                }
                _ => tracing::trace!(objnum, marker, "skipping xref record"),
            }
        }
    }

    let mut parser = ObjectParser::new(data);
    parser.seek(lexer.tell());
    let trailer = match parser.parse_object()? {
        PdfValue::Dict(dict) => dict,
        other => {
            return Err(PdfError::CrossReference(format!(
                "trailer is a {}, not a dictionary",
                other.type_name()
            )));
        }
    };

    Ok(Section {
        entries,
        trailer,
        kind: XrefKind::Table,
    })
}

/// One `/Index` pair: first object number and entry count.
fn index_range(start: &PdfValue, count: &PdfValue) -> Result<(u32, u32)> {
    let start = start.as_int()?;
    let count = count.as_int()?;
    match (u32::try_from(start), u32::try_from(count)) {
        (Ok(start), Ok(count)) => Ok((start, count)),
        _ => Err(PdfError::CrossReference(format!(
            "/Index subsection {start} {count} out of range"
        ))),
    }
}

/// Cross-reference stream: packed big-endian records described by `/W`.
fn load_stream(
    source: &Bytes,
    pos: usize,
    warnings: &mut Vec<StructuralWarning>,
) -> Result<Section> {
    let mut parser = ObjectParser::from_bytes(source);
    parser.seek(pos);
    let object = parser.parse_indirect(|_| None)?;
    warnings.extend(object.warning);
    let PdfValue::Stream(stream) = object.value else {
        return Err(PdfError::CrossReference(format!(
            "object at {pos} is neither an xref table nor an xref stream"
        )));
    };

    let widths: Vec<usize> = stream
        .get("W")
        .ok_or_else(|| PdfError::CrossReference("missing /W in xref stream".into()))?
        .as_array()?
        .iter()
        .map(|w| {
            let n = w.as_int()?;
            usize::try_from(n)
                .map_err(|_| PdfError::CrossReference(format!("negative /W field width {n}")))
        })
        .collect::<Result<_>>()?;
    let [w0, w1, w2] = widths[..] else {
        return Err(PdfError::CrossReference("/W must have 3 elements".into()));
    };
    if w0 > 8 || w1 > 8 || w2 > 8 {
        return Err(PdfError::CrossReference(format!(
            "/W field wider than 8 bytes: {widths:?}"
        )));
    }
    let entry_size = w0 + w1 + w2;

    let size = stream.dict.get_int("Size").unwrap_or(0).clamp(0, i64::from(u32::MAX)) as u32;
    let index: Vec<(u32, u32)> = match stream.get("Index") {
        Some(PdfValue::Array(arr)) => arr
            .chunks_exact(2)
            .map(|pair| index_range(&pair[0], &pair[1]))
            .collect::<Result<_>>()?,
        _ => vec![(0, size)],
    };

    let data = stream.decode()?;
    let field = |buf: &[u8], width: usize, default: u64| {
        if width == 0 {
            default
        } else {
            BigEndian::read_uint(buf, width)
        }
    };

    let mut entries = BTreeMap::new();
    let mut records = data.chunks_exact(entry_size.max(1));
    'sections: for (start, count) in index {
        for i in 0..count {
            let Some(record) = records.next() else {
                break 'sections;
            };
            let Some(objnum) = start.checked_add(i) else {
                return Err(PdfError::CrossReference(format!(
                    "/Index subsection {start} {count} runs past the largest object number"
                )));
            };
            let kind = field(record, w0, 1);
            let f1 = field(&record[w0..], w1, 0);
            let f2 = field(&record[w0 + w1..], w2, 0);
            let entry = match kind {
                0 => XrefEntry::Free {
                    next: f1 as u32,
                    genno: f2 as u16,
                },
                1 => XrefEntry::InUse {
                    offset: f1 as usize,
                    genno: f2 as u16,
                },
                2 => XrefEntry::Compressed {
                    container: f1 as u32,
                    index: f2 as usize,
                },
                // Unknown types are references to null
                _ => continue,
            };
            entries.insert(objnum, entry);
        }
    }

    let mut trailer = stream.dict.clone();
    for key in ["Length", "Filter", "DecodeParms", "W", "Index", "Type"] {
        trailer.remove(key);
    }

    Ok(Section {
        entries,
        trailer,
        kind: XrefKind::Stream,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startxref_from_last_lines() {
        let data = b"%PDF-1.4\n...\nstartxref\n1234\n%%EOF\n";
        assert_eq!(find_startxref(data).unwrap(), 1234);
    }

    #[test]
    fn startxref_with_garbage_after_eof() {
        let data = b"%PDF-1.4\nstartxref\r\n99\r\n%%EOF\r\n\x00\x00junk";
        assert_eq!(find_startxref(data).unwrap(), 99);
    }

    #[test]
    fn startxref_missing() {
        assert!(matches!(
            find_startxref(b"%PDF-1.4\n%%EOF"),
            Err(PdfError::CrossReference(_))
        ));
    }

    #[test]
    fn classic_table_with_off_by_one_subsection() {
        let data = Bytes::from_static(
            b"xref\n1 3\n0000000000 65535 f \n0000000015 00000 n \n0000000042 00000 n \ntrailer\n<< /Size 3 /Root 1 0 R >>\n",
        );
        let section = load_table(&data, 0).unwrap();
        assert_eq!(
            section.entries.get(&1),
            Some(&XrefEntry::InUse {
                offset: 15,
                genno: 0
            })
        );
        assert_eq!(
            section.entries.get(&2),
            Some(&XrefEntry::InUse {
                offset: 42,
                genno: 0
            })
        );
        assert!(section.entries.get(&0).is_some_and(XrefEntry::is_free));
        assert_eq!(section.trailer.get_int("Size"), Some(3));
    }

    #[test]
    fn trailer_merge_keeps_newest_values() {
        let mut newest = Dictionary::new();
        newest.insert("Size", 10);
        newest.insert("Prev", 100);
        let mut older = Dictionary::new();
        older.insert("Size", 5);
        older.insert("Info", ObjectId::new(7, 0));
        older.insert("Prev", 50);
        let mut trailer = Trailer::from_dict(newest);
        trailer.merge_older(&older);
        assert_eq!(trailer.size, Some(10));
        assert_eq!(trailer.info, Some(ObjectId::new(7, 0)));
        assert_eq!(trailer.prev, Some(100));
    }
}
