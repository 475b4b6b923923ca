//! PDF value model.

pub mod equivalence;
pub mod objects;

pub use objects::{Dictionary, Name, ObjectId, PdfStream, PdfValue};
