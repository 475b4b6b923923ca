//! Page tree traversal.
//!
//! A page is an ordinary dictionary; [`PageNode`] adds its identity and the
//! lookups that depend on its position in the tree.

use super::graph::Document;
use crate::error::{Result, StructuralWarning};
use crate::model::{Dictionary, ObjectId, PdfValue};
use crate::parser::ContentStream;
use rustc_hash::FxHashSet;
use std::sync::Arc;

/// Attributes a page takes from its ancestors when it lacks them.
pub const INHERITABLE: [&str; 4] = ["Resources", "MediaBox", "CropBox", "Rotate"];

/// A page dictionary and its object id.
#[derive(Debug, Clone, PartialEq)]
pub struct PageNode {
    pub id: ObjectId,
    pub dict: Dictionary,
}

impl PageNode {
    pub fn get(&self, key: &str) -> Option<&PdfValue> {
        self.dict.get(key)
    }

    /// References held in `/Contents`, in order.
    pub fn content_ids(&self, doc: &Document) -> Vec<ObjectId> {
        match self.dict.get("Contents") {
            Some(PdfValue::Ref(id)) => match doc.resolve(*id).as_deref() {
                // An indirect array of content streams
                Ok(PdfValue::Array(arr)) => arr.iter().filter_map(|v| v.as_ref().ok()).collect(),
                _ => vec![*id],
            },
            Some(PdfValue::Array(arr)) => arr.iter().filter_map(|v| v.as_ref().ok()).collect(),
            _ => Vec::new(),
        }
    }
}

impl Document {
    /// Pages in document order: depth-first, left to right from the
    /// catalog's `/Pages`, intermediate nodes flattened.
    ///
    /// A node reached a second time is skipped with a
    /// [`StructuralWarning::PageTreeCycle`]. When the tree yields no page at
    /// all, every `/Type /Page` object is listed in object order instead.
    pub fn pages(&self) -> Result<Vec<PageNode>> {
        let catalog = self.catalog()?;
        let mut pages = Vec::new();

        if let Some(root) = catalog.as_dict()?.get("Pages").and_then(|v| v.as_ref().ok()) {
            let mut stack = vec![root];
            let mut visited = FxHashSet::default();

            while let Some(id) = stack.pop() {
                if !visited.insert(id) {
                    self.warn(StructuralWarning::PageTreeCycle(id));
                    continue;
                }
                let node = self.resolve(id);
                let Some(dict) = node.as_deref().ok().and_then(|n| n.as_dict().ok()) else {
                    self.warn(StructuralWarning::BadPageNode(id));
                    continue;
                };

                let is_tree_node = dict.has_type("Pages")
                    || (dict.get("Type").is_none() && dict.contains_key("Kids"));
                if is_tree_node {
                    let kids = dict
                        .get("Kids")
                        .and_then(|kids| self.resolve_value(kids).ok())
                        .unwrap_or_else(|| Arc::new(PdfValue::Null));
                    let Ok(kids) = kids.as_array() else {
                        self.warn(StructuralWarning::BadPageNode(id));
                        continue;
                    };
                    for kid in kids.iter().rev() {
                        let kid = match kid {
                            PdfValue::Ref(kid) => Some(*kid),
                            PdfValue::Int(n) => u32::try_from(*n)
                                .ok()
                                .filter(|&objnum| objnum > 0)
                                .map(|objnum| ObjectId::new(objnum, 0)),
                            _ => None,
                        };
                        match kid {
                            Some(kid) => stack.push(kid),
                            None => self.warn(StructuralWarning::BadPageNode(id)),
                        }
                    }
                } else if dict.has_type("Page") || dict.get("Type").is_none() {
                    pages.push(PageNode {
                        id,
                        dict: dict.clone(),
                    });
                } else {
                    self.warn(StructuralWarning::BadPageNode(id));
                }
            }
        }

        if pages.is_empty() {
            pages = self.scan_pages();
        }
        tracing::debug!(count = pages.len(), "collected pages");
        Ok(pages)
    }

    fn scan_pages(&self) -> Vec<PageNode> {
        self.object_ids()
            .into_iter()
            .filter_map(|id| {
                let value = self.resolve(id).ok()?;
                let dict = value.as_dict().ok()?;
                dict.has_type("Page").then(|| PageNode {
                    id,
                    dict: dict.clone(),
                })
            })
            .collect()
    }

    pub fn page_count(&self) -> Result<usize> {
        Ok(self.pages()?.len())
    }

    /// Value of `key` on the page or its nearest ancestor, dereferenced.
    ///
    /// The `/Parent` walk stops with a [`StructuralWarning::ParentCycle`] if
    /// it revisits a node.
    pub fn get_inherited(&self, page: &PageNode, key: &str) -> Option<Arc<PdfValue>> {
        let value = self.find_inherited(page, key)?;
        self.resolve_value(&value).ok().filter(|v| !v.is_null())
    }

    /// Like [`Document::get_inherited`] but the value is returned as
    /// written, so shared resources stay references.
    fn find_inherited(&self, page: &PageNode, key: &str) -> Option<PdfValue> {
        if let Some(value) = page.dict.get(key) {
            return Some(value.clone());
        }
        let mut visited = FxHashSet::default();
        visited.insert(page.id);
        let mut parent = page.dict.get("Parent")?.as_ref().ok()?;

        loop {
            if !visited.insert(parent) {
                self.warn(StructuralWarning::ParentCycle(parent));
                return None;
            }
            let node = self.resolve(parent).ok()?;
            let dict = node.as_dict().ok()?;
            if let Some(value) = dict.get(key) {
                return Some(value.clone());
            }
            parent = dict.get("Parent")?.as_ref().ok()?;
        }
    }

    /// Page dictionary with the inheritable attributes copied in.
    pub fn materialize(&self, page: &PageNode) -> Dictionary {
        let mut dict = page.dict.clone();
        for key in INHERITABLE {
            if !dict.contains_key(key)
                && let Some(value) = self.find_inherited(page, key)
            {
                dict.insert(key, value);
            }
        }
        dict
    }

    /// Decoded content of a page, streams joined by a newline.
    pub fn page_content(&self, page: &PageNode) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for id in page.content_ids(self) {
            let value = self.resolve(id)?;
            let Ok(stream) = value.as_stream() else {
                continue;
            };
            if !out.is_empty() {
                out.push(b'\n');
            }
            out.extend_from_slice(&self.decode_stream(stream)?);
        }
        Ok(out)
    }

    /// Page content as operations.
    pub fn page_operations(&self, page: &PageNode) -> Result<ContentStream> {
        ContentStream::parse(&self.page_content(page)?)
    }
}
