//! Incremental updates.
//!
//! New and changed objects are appended after the unmodified original bytes
//! together with a cross-reference section covering only them. The new
//! trailer's `/Prev` points at the original section, so every object that
//! was not touched is still found at its old offset.

use super::serialize::{CountingWriter, write_indirect};
use super::xref_out;
use crate::document::{Document, XrefEntry, XrefKind};
use crate::error::{PdfError, Result};
use crate::model::{ObjectId, PdfValue};
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Change {
    Object(PdfValue),
    Free,
}

/// Pending edits on top of a [`Document`].
#[derive(Debug)]
pub struct IncrementalUpdate<'a> {
    base: &'a Document,
    changes: BTreeMap<ObjectId, Change>,
    /// First unused object number; may sit one past `u32::MAX`
    next_objnum: u64,
    /// New `/Info` for the appended trailer
    info: Option<ObjectId>,
}

impl<'a> IncrementalUpdate<'a> {
    pub fn new(base: &'a Document) -> Self {
        let declared = u64::from(base.trailer().size.unwrap_or(0));
        let next_objnum = declared.max(u64::from(base.xref().max_objnum()) + 1).max(1);
        Self {
            base,
            changes: BTreeMap::new(),
            next_objnum,
            info: None,
        }
    }

    pub const fn base(&self) -> &'a Document {
        self.base
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Add an object under a fresh number. Fails once the file has used
    /// up every object number.
    pub fn new_object(&mut self, value: impl Into<PdfValue>) -> Result<ObjectId> {
        let id = ObjectId::new(self.fresh_objnum()?, 0);
        self.next_objnum += 1;
        self.changes.insert(id, Change::Object(value.into()));
        Ok(id)
    }

    fn fresh_objnum(&self) -> Result<u32> {
        u32::try_from(self.next_objnum).map_err(|_| {
            PdfError::DocumentStructure("no object numbers left for an incremental update".into())
        })
    }

    fn is_known(&self, id: ObjectId) -> bool {
        if self.changes.contains_key(&id) {
            return true;
        }
        match self.base.xref().get(id.objnum) {
            Some(XrefEntry::InUse { genno, .. }) => *genno == id.genno,
            Some(XrefEntry::Compressed { .. }) => id.genno == 0,
            _ => false,
        }
    }

    /// Current value of `id`, edits included.
    pub fn get(&self, id: ObjectId) -> Result<Arc<PdfValue>> {
        match self.changes.get(&id) {
            Some(Change::Object(value)) => Ok(Arc::new(value.clone())),
            Some(Change::Free) => Err(PdfError::ObjectNotFound(id)),
            None => self.base.resolve(id),
        }
    }

    /// Give an existing object a new value under the same identity.
    pub fn replace(&mut self, id: ObjectId, value: impl Into<PdfValue>) -> Result<()> {
        if !self.is_known(id) || matches!(self.changes.get(&id), Some(Change::Free)) {
            return Err(PdfError::ObjectNotFound(id));
        }
        self.changes.insert(id, Change::Object(value.into()));
        Ok(())
    }

    /// Mark an object free. Its number is not reused by this update.
    pub fn remove(&mut self, id: ObjectId) -> Result<()> {
        if !self.is_known(id) {
            return Err(PdfError::ObjectNotFound(id));
        }
        self.changes.insert(id, Change::Free);
        Ok(())
    }

    /// Point the appended trailer's `/Info` at `id`.
    pub fn set_info(&mut self, id: ObjectId) -> Result<()> {
        if !self.is_known(id) || matches!(self.changes.get(&id), Some(Change::Free)) {
            return Err(PdfError::ObjectNotFound(id));
        }
        self.info = Some(id);
        Ok(())
    }

    /// Append the update to `sink`: the original bytes, then the changed
    /// objects and a new cross-reference section of the same kind as the
    /// file's own.
    pub fn write_to<W: Write>(&self, sink: W) -> Result<W> {
        let kind = self.base.declared_xref().kind();
        let prev = match (kind, self.base.startxref()) {
            (XrefKind::Table | XrefKind::Stream, Some(prev)) => prev,
            _ => {
                return Err(PdfError::CrossReference(
                    "cannot append to a file whose cross-reference table was reconstructed".into(),
                ));
            }
        };

        let original = self.base.bytes();
        let mut out = CountingWriter::new(sink);
        out.write_all(original)?;
        if !original.ends_with(b"\n") && !original.ends_with(b"\r") {
            out.write_all(b"\n")?;
        }

        let mut entries = BTreeMap::new();
        for (&id, change) in &self.changes {
            match change {
                Change::Object(value) => {
                    entries.insert(
                        id.objnum,
                        XrefEntry::InUse {
                            offset: out.position() as usize,
                            genno: id.genno,
                        },
                    );
                    write_indirect(&mut out, id, value)?;
                }
                Change::Free => {
                    entries.insert(
                        id.objnum,
                        XrefEntry::Free {
                            next: 0,
                            genno: id.genno.saturating_add(1),
                        },
                    );
                }
            }
        }

        let mut trailer = self.base.declared_xref().trailer.dict.clone();
        for key in ["Prev", "XRefStm", "Length", "Filter", "DecodeParms", "W", "Index", "Type"] {
            trailer.remove(key);
        }
        trailer.insert("Prev", prev);
        if let Some(info) = self.info {
            trailer.insert("Info", info);
        }

        match kind {
            XrefKind::Stream => {
                let objnum = self.fresh_objnum()?;
                trailer.insert("Size", i64::from(objnum) + 1);
                xref_out::write_stream(&mut out, entries, &trailer, objnum)?;
            }
            _ => {
                trailer.insert("Size", self.next_objnum as i64);
                xref_out::write_table(&mut out, &entries, &trailer)?;
            }
        }

        out.flush()?;
        tracing::debug!(
            changes = self.changes.len(),
            appended = out.position() as usize - original.len(),
            "wrote incremental update"
        );
        Ok(out.into_inner())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.write_to(Vec::with_capacity(self.base.bytes().len() + 4096))
    }
}
