//! Reading documents.
//!
//! - `xref` - cross-reference tables, streams and the trailer chain
//! - `repair` - table reconstruction by scanning for object headers
//! - `object_stream` - objects packed in `/ObjStm` containers
//! - `graph` - the [`Document`]: resolution, caching, stream decoding
//! - `page` - page tree traversal and inherited attributes
//! - `options` - [`ParseOptions`]

pub mod graph;
pub mod object_stream;
pub mod options;
pub mod page;
pub mod repair;
pub mod xref;

pub use graph::{Document, DocumentId};
pub use object_stream::ObjectStream;
pub use options::ParseOptions;
pub use page::{INHERITABLE, PageNode};
pub use xref::{CrossReferenceTable, Trailer, XrefEntry, XrefKind};
