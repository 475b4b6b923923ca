//! Writing documents.
//!
//! - `serialize` - canonical object syntax and offset counting
//! - `graph` - [`WriterGraph`]: cloning, page merging, deduplication, full rewrite
//! - `incremental` - [`IncrementalUpdate`]: edits appended after the original bytes
//! - `xref_out` - cross-reference tables and streams on output
//! - `options` - [`WriteOptions`]

pub mod graph;
pub mod incremental;
pub mod options;
pub mod serialize;
mod xref_out;

pub use graph::WriterGraph;
pub use incremental::IncrementalUpdate;
pub use options::{WriteOptions, XrefFormat};
pub use serialize::{CountingWriter, to_bytes, write_value};
