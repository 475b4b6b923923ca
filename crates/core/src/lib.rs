//! quire - PDF object model, cross-reference resolution, stream filters and
//! a writer with deduplication and incremental updates.

pub mod codec;
pub mod document;
pub mod error;
pub mod model;
pub mod parser;
pub mod utils;
pub mod writer;

pub use document::{Document, PageNode, ParseOptions};
pub use error::{PdfError, Result, StructuralWarning};
pub use model::{Dictionary, Name, ObjectId, PdfStream, PdfValue};
pub use parser::{ContentStream, Operation};
pub use utils::PdfVersion;
pub use writer::{IncrementalUpdate, WriteOptions, WriterGraph, XrefFormat};
