//! The resolved view over one input file.
//!
//! A [`Document`] owns the byte source, the merged cross-reference table and
//! a cache of every object resolved so far. Objects are parsed on first
//! dereference and stay cached for the document's lifetime, so repeated
//! lookups always see the same value.

use super::object_stream::ObjectStream;
use super::options::ParseOptions;
use super::repair;
use super::xref::{self, CrossReferenceTable, Trailer, XrefEntry, XrefKind};
use crate::codec;
use crate::error::{PdfError, Result, StructuralWarning};
use crate::model::equivalence::StructuralClasses;
use crate::model::{Dictionary, ObjectId, PdfStream, PdfValue};
use crate::parser::ObjectParser;
use crate::utils::PdfVersion;
use crate::writer::IncrementalUpdate;
use bytes::Bytes;
use memmap2::Mmap;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a loaded document, used to key cloned objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(u64);

impl DocumentId {
    fn next() -> Self {
        Self(NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A parsed PDF file.
pub struct Document {
    id: DocumentId,
    data: Bytes,
    version: PdfVersion,
    options: ParseOptions,
    xref: CrossReferenceTable,
    /// Scanned table, built the first time an object header disagrees with
    /// the declared table. `None` when the scan itself failed.
    repaired: OnceLock<Option<CrossReferenceTable>>,
    /// Set once `repaired` should be consulted before `xref`.
    use_repaired: AtomicBool,
    cache: Mutex<FxHashMap<ObjectId, Arc<PdfValue>>>,
    objstm_cache: Mutex<FxHashMap<u32, Arc<ObjectStream>>>,
    /// Objects currently being parsed, for cycles through `/Length` or
    /// object stream containers
    resolving: Mutex<FxHashSet<ObjectId>>,
    warnings: Mutex<Vec<StructuralWarning>>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id)
            .field("len", &self.data.len())
            .field("version", &self.version)
            .field("xref_kind", &self.xref.kind())
            .field("objects", &self.xref.len())
            .finish()
    }
}

impl Document {
    /// Parse a document from shared bytes without copying them.
    pub fn from_bytes(data: Bytes) -> Result<Self> {
        Self::with_options(data, ParseOptions::default())
    }

    /// Parse a document from any byte buffer (copies the data).
    pub fn new<D: AsRef<[u8]>>(data: D) -> Result<Self> {
        Self::from_bytes(Bytes::copy_from_slice(data.as_ref()))
    }

    /// Memory-map and parse a file. The mapping lives as long as the
    /// document and any stream payloads taken from it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(path, ParseOptions::default())
    }

    pub fn open_with_options(path: impl AsRef<Path>, options: ParseOptions) -> Result<Self> {
        let file = File::open(path)?;
        // SAFETY: the mapping is read-only and the file is not modified
        // through this process while the document is alive.
        let mmap = unsafe { Mmap::map(&file)? };
        Self::with_options(Bytes::from_owner(mmap), options)
    }

    pub fn with_options(data: Bytes, options: ParseOptions) -> Result<Self> {
        let version = PdfVersion::from_header(&data).unwrap_or_default();
        let mut warnings = Vec::new();

        let declared = xref::find_startxref(&data)
            .and_then(|pos| xref::load_chain(&data, pos, options.max_xref_chain));

        let xref = match declared {
            Ok((table, found)) if table.trailer.root.is_some() => {
                warnings.extend(found);
                table
            }
            Ok((table, found)) => {
                warnings.extend(found);
                Self::reconstruct_or_fail(
                    &data,
                    Some(&table),
                    "trailer has no /Root",
                    &options,
                    &mut warnings,
                    PdfError::DocumentStructure("trailer has no /Root".into()),
                )?
            }
            Err(err) => {
                let reason = err.to_string();
                Self::reconstruct_or_fail(&data, None, &reason, &options, &mut warnings, err)?
            }
        };

        for warning in &warnings {
            tracing::warn!(%warning, "structural warning");
        }

        let doc = Self {
            id: DocumentId::next(),
            data,
            version,
            options,
            xref,
            repaired: OnceLock::new(),
            use_repaired: AtomicBool::new(false),
            cache: Mutex::new(FxHashMap::default()),
            objstm_cache: Mutex::new(FxHashMap::default()),
            resolving: Mutex::new(FxHashSet::default()),
            warnings: Mutex::new(warnings),
        };

        if doc.catalog().is_err() && doc.switch_to_repaired() {
            tracing::debug!("catalog unreachable through declared table, using scanned table");
        }
        doc.catalog()?;
        Ok(doc)
    }

    fn reconstruct_or_fail(
        data: &Bytes,
        declared: Option<&CrossReferenceTable>,
        reason: &str,
        options: &ParseOptions,
        warnings: &mut Vec<StructuralWarning>,
        err: PdfError,
    ) -> Result<CrossReferenceTable> {
        if !options.reconstruct_on_failure {
            return Err(err);
        }
        tracing::debug!(reason, "falling back to xref reconstruction");
        let (table, found) = repair::reconstruct(data, declared, reason, options.max_nesting)?;
        warnings.extend(found);
        if table.trailer.root.is_none() {
            return Err(PdfError::DocumentStructure(
                "no /Root found in trailer or catalog scan".into(),
            ));
        }
        Ok(table)
    }

    pub const fn id(&self) -> DocumentId {
        self.id
    }

    pub const fn version(&self) -> PdfVersion {
        self.version
    }

    pub const fn options(&self) -> &ParseOptions {
        &self.options
    }

    /// The whole file.
    pub fn bytes(&self) -> &Bytes {
        &self.data
    }

    /// The table objects are resolved through.
    pub fn xref(&self) -> &CrossReferenceTable {
        if self.use_repaired.load(Ordering::Acquire)
            && let Some(Some(table)) = self.repaired.get()
        {
            return table;
        }
        &self.xref
    }

    /// The table as declared by the file (or reconstructed at load time).
    pub const fn declared_xref(&self) -> &CrossReferenceTable {
        &self.xref
    }

    pub fn trailer(&self) -> &Trailer {
        &self.xref().trailer
    }

    /// Offset of the newest cross-reference section, if the file has one.
    pub fn startxref(&self) -> Option<usize> {
        self.xref.startxref()
    }

    /// Whether the table in use came from a scan rather than the file.
    pub fn is_reconstructed(&self) -> bool {
        self.xref().kind() == XrefKind::Reconstructed
    }

    /// Identities of every live entry, ascending.
    pub fn object_ids(&self) -> Vec<ObjectId> {
        self.xref().live_ids()
    }

    /// Number of live entries that resolve to something other than null.
    pub fn resolvable_object_count(&self) -> usize {
        self.object_ids()
            .into_iter()
            .filter(|&id| self.resolve(id).is_ok_and(|v| !v.is_null()))
            .count()
    }

    /// Warnings recorded so far.
    pub fn warnings(&self) -> Vec<StructuralWarning> {
        self.warnings
            .lock()
            .map(|w| w.clone())
            .unwrap_or_default()
    }

    pub(crate) fn warn(&self, warning: StructuralWarning) {
        tracing::warn!(%warning, "structural warning");
        if let Ok(mut warnings) = self.warnings.lock()
            && !warnings.contains(&warning)
        {
            warnings.push(warning);
        }
    }

    /// The document catalog (`/Root`).
    pub fn catalog(&self) -> Result<Arc<PdfValue>> {
        let root = self
            .trailer()
            .root
            .ok_or_else(|| PdfError::DocumentStructure("trailer has no /Root".into()))?;
        let catalog = self.resolve(root)?;
        match catalog.as_ref() {
            PdfValue::Dict(_) => Ok(catalog),
            other => Err(PdfError::DocumentStructure(format!(
                "/Root {root} is a {}, not a dictionary",
                other.type_name()
            ))),
        }
    }

    /// Resolve an object by identity.
    ///
    /// Free and missing entries resolve to null and record a
    /// [`StructuralWarning::DanglingReference`]. Errors are reserved for
    /// objects that exist but cannot be parsed.
    pub fn resolve(&self, id: ObjectId) -> Result<Arc<PdfValue>> {
        if let Ok(cache) = self.cache.lock()
            && let Some(value) = cache.get(&id)
        {
            return Ok(Arc::clone(value));
        }

        {
            let Ok(mut resolving) = self.resolving.lock() else {
                return Err(PdfError::ObjectNotFound(id));
            };
            if !resolving.insert(id) {
                return Err(PdfError::syntax(0, format!("circular reference through {id}")));
            }
        }
        let result = self.load(id);
        if let Ok(mut resolving) = self.resolving.lock() {
            resolving.remove(&id);
        }

        let value = Arc::new(result?);
        tracing::trace!(%id, kind = value.type_name(), "resolved object");
        if let Ok(mut cache) = self.cache.lock() {
            cache.entry(id).or_insert_with(|| Arc::clone(&value));
        }
        Ok(value)
    }

    /// Follow one level of reference; direct values are returned as-is.
    pub fn resolve_value(&self, value: &PdfValue) -> Result<Arc<PdfValue>> {
        match value {
            PdfValue::Ref(id) => self.resolve(*id),
            other => Ok(Arc::new(other.clone())),
        }
    }

    /// Look up `key` in a dictionary and dereference it.
    pub fn get_resolved(&self, dict: &Dictionary, key: &str) -> Option<Arc<PdfValue>> {
        let value = dict.get(key)?;
        self.resolve_value(value).ok().filter(|v| !v.is_null())
    }

    fn dangling(&self, id: ObjectId) -> Result<PdfValue> {
        self.warn(StructuralWarning::DanglingReference(id));
        Ok(PdfValue::Null)
    }

    fn load(&self, id: ObjectId) -> Result<PdfValue> {
        let entry = self.xref().get(id.objnum).copied();
        match entry {
            None | Some(XrefEntry::Free { .. }) => self.dangling(id),
            Some(XrefEntry::InUse { genno, .. }) if genno != id.genno => self.dangling(id),
            Some(XrefEntry::InUse { offset, .. }) => self.load_direct(id, offset),
            Some(XrefEntry::Compressed { .. }) if id.genno != 0 => self.dangling(id),
            Some(XrefEntry::Compressed { container, index }) => {
                self.load_compressed(id, container, index)
            }
        }
    }

    fn parse_at(&self, offset: usize) -> Result<crate::parser::IndirectObject> {
        if offset >= self.data.len() {
            return Err(PdfError::syntax(offset, "object offset beyond end of file"));
        }
        let mut parser = ObjectParser::from_bytes(&self.data).with_max_depth(self.options.max_nesting);
        parser.seek(offset);
        parser.parse_indirect(|length_id| self.resolve(length_id).ok()?.as_int().ok())
    }

    /// Parse the object at `offset`. If the header there names a different
    /// object, or nothing parses, retry through the scanned table.
    fn load_direct(&self, id: ObjectId, offset: usize) -> Result<PdfValue> {
        let (found, failure) = match self.parse_at(offset) {
            Ok(object) if object.id == id || !self.options.verify_object_headers => {
                if let Some(warning) = object.warning {
                    self.warn(warning);
                }
                return Ok(object.value);
            }
            Ok(object) => (Some(object.id), None),
            Err(err) => (None, Some(err)),
        };

        self.warn(StructuralWarning::HeaderMismatch {
            expected: id,
            found,
            offset,
        });

        if self.xref().kind() != XrefKind::Reconstructed && self.switch_to_repaired() {
            match self.xref().get(id.objnum).copied() {
                Some(XrefEntry::InUse {
                    offset: repaired,
                    genno,
                }) if repaired != offset && genno == id.genno => {
                    let object = self.parse_at(repaired)?;
                    if let Some(warning) = object.warning {
                        self.warn(warning);
                    }
                    return Ok(object.value);
                }
                Some(XrefEntry::Compressed { container, index }) if id.genno == 0 => {
                    return self.load_compressed(id, container, index);
                }
                _ => {}
            }
        }

        match failure {
            Some(err) => Err(err),
            None => self.dangling(id),
        }
    }

    /// Build the scanned table once and route lookups through it.
    /// Returns false when reconstruction is disabled or failed.
    fn switch_to_repaired(&self) -> bool {
        if !self.options.reconstruct_on_failure {
            return false;
        }
        let repaired = self.repaired.get_or_init(|| {
            match repair::reconstruct(
                &self.data,
                Some(&self.xref),
                "object header does not match cross-reference entry",
                self.options.max_nesting,
            ) {
                Ok((table, warnings)) => {
                    for warning in warnings {
                        self.warn(warning);
                    }
                    Some(table)
                }
                Err(err) => {
                    tracing::debug!(%err, "reconstruction failed");
                    None
                }
            }
        });
        let usable = repaired.is_some();
        if usable && !self.use_repaired.swap(true, Ordering::AcqRel) {
            // Nulls cached through the declared table may resolve now
            if let Ok(mut cache) = self.cache.lock() {
                cache.retain(|_, v| !v.is_null());
            }
        }
        usable
    }

    fn load_compressed(&self, id: ObjectId, container: u32, index: usize) -> Result<PdfValue> {
        let objstm = self.object_stream(container)?;
        objstm.get(index, id.objnum)
    }

    fn object_stream(&self, container: u32) -> Result<Arc<ObjectStream>> {
        if let Ok(cache) = self.objstm_cache.lock()
            && let Some(objstm) = cache.get(&container)
        {
            return Ok(Arc::clone(objstm));
        }

        let value = self.resolve(ObjectId::new(container, 0))?;
        let stream = value.as_stream()?;
        let data = self.decode_stream(stream)?;
        let objstm = Arc::new(ObjectStream::new(stream, data, self.options.max_nesting)?);
        tracing::debug!(container, objects = objstm.len(), "loaded object stream");

        if let Ok(mut cache) = self.objstm_cache.lock() {
            cache.insert(container, Arc::clone(&objstm));
        }
        Ok(objstm)
    }

    /// Decode a stream's payload.
    ///
    /// Indirect `/Filter` and `/DecodeParms` are resolved first. Corrupt
    /// compressed data is decoded as far as possible and reported as
    /// [`StructuralWarning::CorruptCompressedData`]; unknown filters and
    /// other failures are errors, and the raw bytes stay on the stream.
    pub fn decode_stream(&self, stream: &PdfStream) -> Result<Vec<u8>> {
        let mut dict = Dictionary::new();
        for key in ["Filter", "DecodeParms"] {
            if let Some(value) = stream.get(key) {
                dict.insert(key, self.resolve_deep(value, 2));
            }
        }
        let view = PdfStream::from_parts(dict, stream.raw_bytes());

        let (data, recovered) = codec::registry().decode_recovering(
            view.raw_data(),
            &view.filters(),
            &view.decode_params(),
        )?;
        for err in recovered {
            let (filter, msg) = match err {
                PdfError::FilterDecode { filter, msg, .. } => (filter, msg),
                other => (String::from("unknown"), other.to_string()),
            };
            self.warn(StructuralWarning::CorruptCompressedData { filter, msg });
        }
        Ok(data)
    }

    /// Inline references up to `depth` levels inside arrays and dictionaries.
    fn resolve_deep(&self, value: &PdfValue, depth: usize) -> PdfValue {
        match value {
            PdfValue::Ref(id) if depth > 0 => self
                .resolve(*id)
                .map(|v| self.resolve_deep(&v, depth - 1))
                .unwrap_or(PdfValue::Null),
            PdfValue::Array(arr) if depth > 0 => {
                PdfValue::Array(arr.iter().map(|v| self.resolve_deep(v, depth - 1)).collect())
            }
            PdfValue::Dict(dict) if depth > 0 => PdfValue::Dict(
                dict.iter()
                    .map(|(k, v)| (k.clone(), self.resolve_deep(v, depth - 1)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Every object reachable from `roots`, each with its resolved value.
    pub(crate) fn reachable(&self, roots: &[ObjectId]) -> Vec<(ObjectId, Arc<PdfValue>)> {
        let mut seen = FxHashSet::default();
        let mut queue: VecDeque<ObjectId> = roots.iter().copied().collect();
        let mut out = Vec::new();
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            let Ok(value) = self.resolve(id) else {
                continue;
            };
            value.for_each_ref(&mut |r| queue.push_back(r));
            out.push((id, value));
        }
        out
    }

    /// Structural equality of two objects of this document: same content
    /// after sorting keys, streams compared by decoded payload, references
    /// compared by what they point at.
    pub fn structurally_equal(&self, a: ObjectId, b: ObjectId) -> bool {
        let objects = self.reachable(&[a, b]);
        let classes = StructuralClasses::compute(
            objects.iter().map(|(id, value)| (*id, value.as_ref())),
            |stream| {
                self.decode_stream(stream)
                    .unwrap_or_else(|_| stream.raw_data().to_vec())
            },
        );
        classes.equivalent(a, b)
    }

    /// Start an incremental update on top of this file.
    pub fn edit(&self) -> IncrementalUpdate<'_> {
        IncrementalUpdate::new(self)
    }
}
