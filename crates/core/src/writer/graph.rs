//! The writer's own object table.
//!
//! Objects are added directly or cloned out of source [`Document`]s. Every
//! cloned object is recorded in an identity map keyed by source document and
//! source id, so an object reachable along several paths is copied once and
//! all references to it are relinked to the same new id.

use super::options::{WriteOptions, XrefFormat};
use super::serialize::{CountingWriter, write_indirect};
use super::xref_out;
use crate::codec::{self, flate::deflate};
use crate::document::{Document, DocumentId, XrefEntry};
use crate::error::{PdfError, Result, StructuralWarning};
use crate::model::equivalence::StructuralClasses;
use crate::model::{Dictionary, Name, ObjectId, PdfStream, PdfValue};
use crate::parser::ContentStream;
use crate::utils::PdfVersion;
use flate2::Compression;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;
use std::io::Write;

/// Objects to be written, all with generation 0.
#[derive(Debug, Clone, Default)]
pub struct WriterGraph {
    objects: BTreeMap<u32, PdfValue>,
    identity: FxHashMap<(DocumentId, ObjectId), ObjectId>,
    next_objnum: u32,
    root: Option<ObjectId>,
    info: Option<ObjectId>,
    /// `/Pages` node that appended pages are attached to
    pages_root: Option<ObjectId>,
    version: PdfVersion,
}

impl WriterGraph {
    pub fn new() -> Self {
        Self {
            next_objnum: 1,
            ..Self::default()
        }
    }

    /// Copy everything reachable from a document's catalog and info
    /// dictionary.
    pub fn from_document(doc: &Document) -> Result<Self> {
        let mut graph = Self::new();
        graph.version = doc.version();
        let root = doc
            .trailer()
            .root
            .ok_or_else(|| PdfError::DocumentStructure("trailer has no /Root".into()))?;
        let root = graph.clone_from(doc, root)?;
        graph.root = Some(root);
        if let Some(info) = doc.trailer().info {
            graph.info = Some(graph.clone_from(doc, info)?);
        }
        graph.pages_root = graph
            .get(root)?
            .as_dict()
            .ok()
            .and_then(|catalog| catalog.get("Pages"))
            .and_then(|pages| pages.as_ref().ok());
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        id.genno == 0 && self.objects.contains_key(&id.objnum)
    }

    pub fn object_ids(&self) -> Vec<ObjectId> {
        self.objects.keys().map(|&n| ObjectId::new(n, 0)).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &PdfValue)> {
        self.objects.iter().map(|(&n, v)| (ObjectId::new(n, 0), v))
    }

    pub const fn root(&self) -> Option<ObjectId> {
        self.root
    }

    pub const fn info(&self) -> Option<ObjectId> {
        self.info
    }

    pub const fn version(&self) -> PdfVersion {
        self.version
    }

    pub fn set_version(&mut self, version: PdfVersion) {
        self.version = version;
    }

    fn allocate(&mut self) -> ObjectId {
        let id = ObjectId::new(self.next_objnum, 0);
        self.next_objnum += 1;
        id
    }

    /// Store `value` under the next unused object number.
    pub fn add_object(&mut self, value: impl Into<PdfValue>) -> ObjectId {
        let id = self.allocate();
        self.objects.insert(id.objnum, value.into());
        id
    }

    pub fn get(&self, id: ObjectId) -> Result<&PdfValue> {
        if id.genno != 0 {
            return Err(PdfError::ForeignObject(id));
        }
        self.objects
            .get(&id.objnum)
            .ok_or(PdfError::ForeignObject(id))
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Result<&mut PdfValue> {
        if id.genno != 0 {
            return Err(PdfError::ForeignObject(id));
        }
        self.objects
            .get_mut(&id.objnum)
            .ok_or(PdfError::ForeignObject(id))
    }

    /// Swap in a new value, returning the old one.
    pub fn replace(&mut self, id: ObjectId, value: impl Into<PdfValue>) -> Result<PdfValue> {
        let slot = self.get_mut(id)?;
        Ok(std::mem::replace(slot, value.into()))
    }

    /// Drop an object. References to it are left dangling.
    pub fn remove(&mut self, id: ObjectId) -> Result<PdfValue> {
        self.get(id)?;
        let value = self.objects.remove(&id.objnum).ok_or(PdfError::ForeignObject(id))?;
        if self.root == Some(id) {
            self.root = None;
        }
        if self.info == Some(id) {
            self.info = None;
        }
        if self.pages_root == Some(id) {
            self.pages_root = None;
        }
        Ok(value)
    }

    pub fn set_root(&mut self, id: ObjectId) -> Result<()> {
        self.get(id)?.as_dict()?;
        self.root = Some(id);
        Ok(())
    }

    pub fn set_info(&mut self, id: ObjectId) -> Result<()> {
        self.get(id)?.as_dict()?;
        self.info = Some(id);
        Ok(())
    }

    /// Id that `source` maps to in this graph, if it was cloned.
    pub fn mapped(&self, doc: &Document, source: ObjectId) -> Option<ObjectId> {
        self.identity.get(&(doc.id(), source)).copied()
    }

    /// Copy `id` and everything it references from `doc`.
    ///
    /// Objects already cloned from the same document are reused, so shared
    /// structure stays shared and cycles terminate.
    pub fn clone_from(&mut self, doc: &Document, id: ObjectId) -> Result<ObjectId> {
        let mut pending = Vec::new();
        let new_id = self.map_source(doc.id(), id, &mut pending);
        self.clone_pending(doc, pending);
        Ok(new_id)
    }

    /// New id for `source`, allocating and queueing it on first sight.
    fn map_source(
        &mut self,
        doc: DocumentId,
        source: ObjectId,
        pending: &mut Vec<(ObjectId, ObjectId)>,
    ) -> ObjectId {
        if let Some(&id) = self.identity.get(&(doc, source)) {
            return id;
        }
        let id = self.allocate();
        // Placeholder until the clone is filled in
        self.objects.insert(id.objnum, PdfValue::Null);
        self.identity.insert((doc, source), id);
        pending.push((source, id));
        id
    }

    /// Fill in queued clones. An object that fails to parse is copied as
    /// null and reported as a warning on `doc`.
    fn clone_pending(&mut self, doc: &Document, mut pending: Vec<(ObjectId, ObjectId)>) {
        while let Some((source, target)) = pending.pop() {
            let mut value = match doc.resolve(source) {
                Ok(value) => value.as_ref().clone(),
                Err(err) => {
                    doc.warn(StructuralWarning::UnreadableObject {
                        id: source,
                        msg: err.to_string(),
                    });
                    PdfValue::Null
                }
            };
            self.relink(doc.id(), &mut value, &mut pending);
            self.objects.insert(target.objnum, value);
        }
    }

    /// Rewrite every reference in `value` to this graph's ids.
    fn relink(
        &mut self,
        doc: DocumentId,
        value: &mut PdfValue,
        pending: &mut Vec<(ObjectId, ObjectId)>,
    ) {
        if let PdfValue::Stream(stream) = value {
            // The serializer writes a direct length
            let len = stream.raw_data().len();
            stream.dict.insert("Length", len);
        }
        value.map_refs(&mut |r| self.map_source(doc, r, pending));
    }

    /// Writer-owned `/Pages` node, creating it and a catalog if needed.
    fn ensure_pages_root(&mut self) -> Result<ObjectId> {
        if let Some(pages) = self.pages_root {
            return Ok(pages);
        }
        let mut pages = Dictionary::new();
        pages.insert("Type", PdfValue::name("Pages"));
        pages.insert("Kids", Vec::<PdfValue>::new());
        pages.insert("Count", 0);
        let pages = self.add_object(pages);
        self.pages_root = Some(pages);

        match self.root {
            Some(root) => {
                self.get_mut(root)?.as_dict_mut()?.insert("Pages", pages);
            }
            None => {
                let mut catalog = Dictionary::new();
                catalog.insert("Type", PdfValue::name("Catalog"));
                catalog.insert("Pages", pages);
                self.root = Some(self.add_object(catalog));
            }
        }
        Ok(pages)
    }

    /// Append every page of `doc` to this graph's page tree.
    ///
    /// Inherited attributes are copied onto each page, since the source's
    /// intermediate nodes are not carried over. Resources shared between
    /// pages stay shared. Returns the new page ids in order.
    pub fn append_pages(&mut self, doc: &Document) -> Result<Vec<ObjectId>> {
        let pages_root = self.ensure_pages_root()?;
        let source_pages = doc.pages()?;
        let doc_id = doc.id();

        // Register pages first so links between them (annotations, named
        // destinations) resolve to the new copies.
        let mut pending = Vec::new();
        let mut new_ids = Vec::with_capacity(source_pages.len());
        for page in &source_pages {
            // Always a fresh copy, so appending a document twice repeats
            // its pages while resources stay shared
            let id = self.add_object(PdfValue::Null);
            self.identity.insert((doc_id, page.id), id);
            new_ids.push(id);
        }

        for (page, &id) in source_pages.iter().zip(&new_ids) {
            let mut dict = doc.materialize(page);
            dict.remove("Parent");
            let mut value = PdfValue::Dict(dict);
            self.relink(doc_id, &mut value, &mut pending);
            if let PdfValue::Dict(dict) = &mut value {
                dict.insert("Parent", pages_root);
            }
            self.objects.insert(id.objnum, value);
        }
        self.clone_pending(doc, pending);

        let pages = self.get_mut(pages_root)?.as_dict_mut()?;
        let mut kids = match pages.remove("Kids") {
            Some(PdfValue::Array(kids)) => kids,
            _ => Vec::new(),
        };
        kids.extend(new_ids.iter().map(|&id| PdfValue::Ref(id)));
        let count = pages.get_int("Count").unwrap_or(0) + new_ids.len() as i64;
        pages.insert("Kids", kids);
        pages.insert("Count", count);

        self.version = self.version.max(doc.version());
        tracing::debug!(pages = new_ids.len(), "appended pages");
        Ok(new_ids)
    }

    /// Merge structurally equal dictionaries and streams.
    ///
    /// References to merged objects are pointed at the lowest-numbered
    /// member of each group and the other members are dropped. The catalog,
    /// info dictionary and page tree nodes are never merged. Returns how
    /// many objects were removed.
    pub fn deduplicate(&mut self) -> usize {
        let classes = StructuralClasses::compute(self.iter(), |stream| {
            codec::decode(stream.raw_data(), &stream.filters(), &stream.decode_params())
                .unwrap_or_else(|_| stream.raw_data().to_vec())
        });

        let keep: FxHashSet<ObjectId> = [self.root, self.info, self.pages_root]
            .into_iter()
            .flatten()
            .collect();
        let mergeable = |id: &ObjectId| {
            !keep.contains(id)
                && match self.objects.get(&id.objnum) {
                    Some(PdfValue::Dict(d)) => {
                        !(d.has_type("Page") || d.has_type("Pages") || d.has_type("Catalog"))
                    }
                    Some(PdfValue::Stream(_)) => true,
                    _ => false,
                }
        };

        let mut replacement: FxHashMap<ObjectId, ObjectId> = FxHashMap::default();
        for group in classes.groups() {
            let members: Vec<ObjectId> = group.into_iter().filter(|id| mergeable(id)).collect();
            if let Some((&survivor, rest)) = members.split_first() {
                for &dup in rest {
                    replacement.insert(dup, survivor);
                }
            }
        }
        if replacement.is_empty() {
            return 0;
        }

        for dup in replacement.keys() {
            self.objects.remove(&dup.objnum);
        }
        for value in self.objects.values_mut() {
            value.map_refs(&mut |r| replacement.get(&r).copied().unwrap_or(r));
        }
        tracing::debug!(removed = replacement.len(), "deduplicated objects");
        replacement.len()
    }

    /// Flate-encode every stream that has no filter. Returns how many
    /// streams were encoded.
    pub fn compress_streams(&mut self) -> Result<usize> {
        let mut count = 0;
        for value in self.objects.values_mut() {
            if let PdfValue::Stream(stream) = value
                && compress_stream(stream)?
            {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Every page in this graph, found by walking from the catalog.
    pub fn page_ids(&self) -> Vec<ObjectId> {
        let Some(root) = self.root else {
            return Vec::new();
        };
        let Some(start) = self
            .get(root)
            .ok()
            .and_then(|c| c.as_dict().ok())
            .and_then(|c| c.get("Pages"))
            .and_then(|p| p.as_ref().ok())
        else {
            return Vec::new();
        };

        let mut pages = Vec::new();
        let mut stack = vec![start];
        let mut visited = FxHashSet::default();
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(dict) = self.get(id).ok().and_then(|v| v.as_dict().ok()) else {
                continue;
            };
            if dict.has_type("Pages") || (dict.get("Type").is_none() && dict.contains_key("Kids")) {
                if let Some(PdfValue::Array(kids)) = self.deref(dict.get("Kids")) {
                    stack.extend(kids.iter().rev().filter_map(|k| k.as_ref().ok()));
                }
            } else {
                pages.push(id);
            }
        }
        pages
    }

    fn deref<'a>(&'a self, value: Option<&'a PdfValue>) -> Option<&'a PdfValue> {
        match value? {
            PdfValue::Ref(id) => self.get(*id).ok(),
            other => Some(other),
        }
    }

    /// `key` on the page or the nearest ancestor that has it.
    fn inherited(&self, page: ObjectId, key: &str) -> Option<&PdfValue> {
        let mut visited = FxHashSet::default();
        let mut current = page;
        loop {
            if !visited.insert(current) {
                return None;
            }
            let dict = self.get(current).ok()?.as_dict().ok()?;
            if let Some(value) = dict.get(key) {
                return self.deref(Some(value));
            }
            current = dict.get("Parent")?.as_ref().ok()?;
        }
    }

    fn content_ids(&self, page: ObjectId) -> Result<Vec<ObjectId>> {
        let dict = self.get(page)?.as_dict()?;
        Ok(match dict.get("Contents") {
            Some(PdfValue::Ref(id)) => match self.get(*id)? {
                PdfValue::Array(arr) => arr.iter().filter_map(|v| v.as_ref().ok()).collect(),
                _ => vec![*id],
            },
            Some(PdfValue::Array(arr)) => arr.iter().filter_map(|v| v.as_ref().ok()).collect(),
            _ => Vec::new(),
        })
    }

    /// Decoded content of a page, streams joined by a newline.
    pub fn page_content(&self, page: ObjectId) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for id in self.content_ids(page)? {
            let stream = self.get(id)?.as_stream()?;
            if !out.is_empty() {
                out.push(b'\n');
            }
            out.extend_from_slice(&self.decode(stream)?);
        }
        Ok(out)
    }

    /// Decode a stream whose filter entries may be references into this graph.
    fn decode(&self, stream: &PdfStream) -> Result<Vec<u8>> {
        let mut dict = Dictionary::new();
        for key in ["Filter", "DecodeParms"] {
            if let Some(value) = self.deref(stream.get(key)) {
                dict.insert(key, value.clone());
            }
        }
        let view = PdfStream::new(dict, stream.raw_bytes());
        codec::decode(view.raw_data(), &view.filters(), &view.decode_params())
    }

    /// Replace a page's content with a single flate-encoded stream holding
    /// the re-serialized operations. The old content streams are left for
    /// [`WriterGraph::collect_garbage`].
    pub fn recompress_content(&mut self, page: ObjectId) -> Result<()> {
        let content = ContentStream::parse(&self.page_content(page)?)?;
        self.set_page_content(page, &content)
    }

    fn set_page_content(&mut self, page: ObjectId, content: &ContentStream) -> Result<()> {
        let mut stream = PdfStream::new(Dictionary::new(), content.to_bytes());
        compress_stream(&mut stream)?;
        let id = self.add_object(stream);
        self.get_mut(page)?.as_dict_mut()?.insert("Contents", id);
        Ok(())
    }

    /// Remove inline images and `Do` of image XObjects from every page,
    /// dropping the image entries from the page resources. Returns how many
    /// operations were removed.
    pub fn strip_images(&mut self) -> Result<usize> {
        // Resolve every page's images up front: pages may share one
        // /XObject dictionary, which is edited below
        let plans: Vec<(ObjectId, FxHashSet<Name>)> = self
            .page_ids()
            .into_iter()
            .map(|page| (page, self.image_xobjects(page)))
            .collect();

        let mut removed = 0;
        for (page, images) in plans {
            let content = ContentStream::parse(&self.page_content(page)?)?;
            let before = content.len();
            let content = content.filter(|op| {
                if op.is_inline_image() {
                    return false;
                }
                !(op.is("Do")
                    && matches!(op.operands.first(), Some(PdfValue::Name(n)) if images.contains(n)))
            });
            if content.len() == before {
                continue;
            }
            removed += before - content.len();
            self.set_page_content(page, &content)?;
            self.drop_xobjects(page, &images)?;
        }
        Ok(removed)
    }

    fn xobject_dict_id(&self, page: ObjectId) -> Option<(Option<ObjectId>, Option<ObjectId>)> {
        // (resources object, xobject dictionary object) when indirect
        let page_dict = self.get(page).ok()?.as_dict().ok()?;
        let resources_ref = match page_dict.get("Resources") {
            Some(PdfValue::Ref(id)) => Some(*id),
            _ => None,
        };
        let resources = self.inherited(page, "Resources")?.as_dict().ok()?;
        let xobject_ref = match resources.get("XObject") {
            Some(PdfValue::Ref(id)) => Some(*id),
            _ => None,
        };
        Some((resources_ref, xobject_ref))
    }

    fn image_xobjects(&self, page: ObjectId) -> FxHashSet<Name> {
        let Some(resources) = self.inherited(page, "Resources").and_then(|r| r.as_dict().ok()) else {
            return FxHashSet::default();
        };
        let Some(PdfValue::Dict(xobjects)) = self.deref(resources.get("XObject")) else {
            return FxHashSet::default();
        };
        xobjects
            .iter()
            .filter(|(_, v)| {
                self.deref(Some(v))
                    .and_then(|x| x.as_stream().ok())
                    .is_some_and(|s| s.dict.get_name("Subtype") == Some("Image"))
            })
            .map(|(k, _)| k.clone())
            .collect()
    }

    fn drop_xobjects(&mut self, page: ObjectId, images: &FxHashSet<Name>) -> Result<()> {
        let Some((resources_ref, xobject_ref)) = self.xobject_dict_id(page) else {
            return Ok(());
        };
        let xobjects = match (xobject_ref, resources_ref) {
            (Some(id), _) => self.get_mut(id)?.as_dict_mut()?,
            (None, Some(id)) => match self.get_mut(id)?.as_dict_mut()?.get_mut("XObject") {
                Some(PdfValue::Dict(d)) => d,
                _ => return Ok(()),
            },
            (None, None) => {
                // Resources written directly on the page (or an ancestor)
                let resources = self.inherited(page, "Resources").cloned();
                let Some(PdfValue::Dict(mut resources)) = resources else {
                    return Ok(());
                };
                if let Some(PdfValue::Dict(xobjects)) = resources.get_mut("XObject") {
                    for name in images {
                        xobjects.remove(name.as_str());
                    }
                }
                self.get_mut(page)?.as_dict_mut()?.insert("Resources", resources);
                return Ok(());
            }
        };
        for name in images {
            xobjects.remove(name.as_str());
        }
        Ok(())
    }

    /// Drop objects unreachable from the catalog and info dictionary.
    /// Returns how many were dropped.
    pub fn collect_garbage(&mut self) -> usize {
        let mut reachable = FxHashSet::default();
        let mut stack: Vec<ObjectId> = [self.root, self.info].into_iter().flatten().collect();
        while let Some(id) = stack.pop() {
            if !reachable.insert(id.objnum) {
                continue;
            }
            if let Some(value) = self.objects.get(&id.objnum) {
                value.for_each_ref(&mut |r| stack.push(r));
            }
        }
        let before = self.objects.len();
        self.objects.retain(|objnum, _| reachable.contains(objnum));
        before - self.objects.len()
    }

    /// Full rewrite: header, every object in ascending order, one
    /// cross-reference section and the trailer.
    pub fn write<W: Write>(&self, sink: W, options: &WriteOptions) -> Result<W> {
        let root = self
            .root
            .ok_or_else(|| PdfError::DocumentStructure("no catalog set".into()))?;

        let mut version = options.header_version.unwrap_or(self.version);
        if options.xref_format == XrefFormat::Stream {
            version = version.max(PdfVersion::V1_5);
        }

        let mut out = CountingWriter::new(sink);
        writeln!(out, "%PDF-{version}")?;
        if options.binary_comment {
            out.write_all(b"%\xE2\xE3\xCF\xD3\n")?;
        }

        let mut entries = BTreeMap::new();
        for (&objnum, value) in &self.objects {
            entries.insert(
                objnum,
                XrefEntry::InUse {
                    offset: out.position() as usize,
                    genno: 0,
                },
            );
            let id = ObjectId::new(objnum, 0);
            match value {
                PdfValue::Stream(stream) if options.compress_streams => {
                    let mut stream = stream.as_ref().clone();
                    compress_stream(&mut stream)?;
                    write_indirect(&mut out, id, &PdfValue::from(stream))?;
                }
                _ => write_indirect(&mut out, id, value)?,
            }
        }

        let last = self.objects.keys().next_back().copied().unwrap_or(0);
        let size = match options.xref_format {
            XrefFormat::Table => last + 1,
            XrefFormat::Stream => last + 2,
        };
        link_free_list(&mut entries, size);

        let mut trailer = Dictionary::new();
        trailer.insert("Size", i64::from(size));
        trailer.insert("Root", root);
        if let Some(info) = self.info {
            trailer.insert("Info", info);
        }

        match options.xref_format {
            XrefFormat::Table => xref_out::write_table(&mut out, &entries, &trailer)?,
            XrefFormat::Stream => xref_out::write_stream(&mut out, entries, &trailer, last + 1)?,
        };
        out.flush()?;
        tracing::debug!(objects = self.objects.len(), bytes = out.position(), "wrote document");
        Ok(out.into_inner())
    }

    pub fn to_bytes(&self, options: &WriteOptions) -> Result<Vec<u8>> {
        self.write(Vec::new(), options)
    }
}

/// Fill gaps below `size` with free entries chained from object 0.
fn link_free_list(entries: &mut BTreeMap<u32, XrefEntry>, size: u32) {
    let free: Vec<u32> = (1..size)
        .filter(|n| !entries.contains_key(n))
        .collect();
    let mut next = 0;
    for &objnum in free.iter().rev() {
        entries.insert(objnum, XrefEntry::Free { next, genno: 1 });
        next = objnum;
    }
    entries.insert(0, XrefEntry::Free { next, genno: 65535 });
}

/// Flate-encode a stream with no filter; false when it already had one.
fn compress_stream(stream: &mut PdfStream) -> Result<bool> {
    if stream.get("Filter").is_some() {
        return Ok(false);
    }
    let encoded = deflate(stream.raw_data(), Compression::default())?;
    stream.dict.insert("Filter", PdfValue::name("FlateDecode"));
    stream.set_raw_data(encoded);
    Ok(true)
}
