//! Error types for quire.
//!
//! Two channels exist: [`PdfError`] for results that cannot be recovered from
//! locally, and [`StructuralWarning`] for anomalies the reader routes around.
//! Warnings are collected on the [`Document`](crate::document::Document) and
//! never returned as `Err`.

use crate::model::ObjectId;
use thiserror::Error;

/// Primary error type for PDF reading and writing.
#[derive(Error, Debug)]
pub enum PdfError {
    #[error("syntax error at offset {pos}: {msg}")]
    Syntax { pos: usize, msg: String },

    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("cross-reference error: {0}")]
    CrossReference(String),

    #[error("unsupported filter: /{0}")]
    UnsupportedFilter(String),

    #[error("{filter} decode failed{}: {msg}", .pos.map(|p| format!(" at byte {p}")).unwrap_or_default())]
    FilterDecode {
        filter: String,
        pos: Option<usize>,
        msg: String,
    },

    #[error("document structure error: {0}")]
    DocumentStructure(String),

    #[error("object {0} is not owned by this writer")]
    ForeignObject(ObjectId),

    #[error("type error: expected {expected}, got {got}")]
    TypeError {
        expected: &'static str,
        got: &'static str,
    },

    #[error("key not found: {0}")]
    KeyError(String),

    #[error("PDF object not found: {0}")]
    ObjectNotFound(ObjectId),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PdfError {
    pub(crate) fn syntax(pos: usize, msg: impl Into<String>) -> Self {
        Self::Syntax {
            pos,
            msg: msg.into(),
        }
    }

    pub(crate) fn decode(filter: &str, pos: Option<usize>, msg: impl Into<String>) -> Self {
        Self::FilterDecode {
            filter: filter.to_string(),
            pos,
            msg: msg.into(),
        }
    }
}

/// Convenience Result type alias for PdfError.
pub type Result<T> = std::result::Result<T, PdfError>;

/// Non-fatal anomaly found while reading a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralWarning {
    /// A reference pointed at a free or missing entry and resolved to null.
    DanglingReference(ObjectId),
    /// A page tree node was reached twice; the subtree was skipped.
    PageTreeCycle(ObjectId),
    /// The `/Parent` chain of a page loops back on itself.
    ParentCycle(ObjectId),
    /// The object found at an xref offset declares a different identity.
    HeaderMismatch {
        expected: ObjectId,
        found: Option<ObjectId>,
        offset: usize,
    },
    /// The cross-reference data was rebuilt by scanning the file.
    XrefReconstructed { reason: String, objects: usize },
    /// Two sources disagree about where an object lives.
    ConflictingOffset {
        objnum: u32,
        kept: usize,
        dropped: usize,
    },
    /// A stream's `/Length` did not line up with `endstream`.
    BrokenStreamLength { id: Option<ObjectId>, declared: i64 },
    /// Compressed data was truncated or corrupt; partial output was kept.
    CorruptCompressedData { filter: String, msg: String },
    /// A `/Kids` entry was neither a page nor a page tree node.
    BadPageNode(ObjectId),
    /// An object could not be parsed while copying; null was written instead.
    UnreadableObject { id: ObjectId, msg: String },
}

impl std::fmt::Display for StructuralWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DanglingReference(id) => write!(f, "dangling reference {id} resolved to null"),
            Self::PageTreeCycle(id) => write!(f, "page tree cycle at {id}, subtree skipped"),
            Self::ParentCycle(id) => write!(f, "/Parent chain cycles at {id}"),
            Self::HeaderMismatch {
                expected,
                found,
                offset,
            } => match found {
                Some(found) => write!(
                    f,
                    "xref says {expected} at offset {offset}, header declares {found}"
                ),
                None => write!(f, "xref says {expected} at offset {offset}, no object header"),
            },
            Self::XrefReconstructed { reason, objects } => {
                write!(f, "xref reconstructed ({objects} objects): {reason}")
            }
            Self::ConflictingOffset {
                objnum,
                kept,
                dropped,
            } => write!(
                f,
                "object {objnum} found at {kept} and {dropped}; keeping {kept}"
            ),
            Self::BrokenStreamLength { id, declared } => match id {
                Some(id) => write!(f, "stream {id}: /Length {declared} ignored"),
                None => write!(f, "stream: /Length {declared} ignored"),
            },
            Self::CorruptCompressedData { filter, msg } => {
                write!(f, "corrupt {filter} data, partial output kept: {msg}")
            }
            Self::BadPageNode(id) => write!(f, "page tree node {id} is not a page or /Pages"),
            Self::UnreadableObject { id, msg } => {
                write!(f, "object {id} unreadable, copied as null: {msg}")
            }
        }
    }
}
