//! Parsing: bytes to tokens, tokens to values, content streams to operations.
//!
//! - `lexer`: tokenizer with seek/resume
//! - `object_parser`: PDF object syntax, indirect object wrappers, streams
//! - `content`: content stream operations, inline images kept intact

pub mod content;
pub mod lexer;
pub mod object_parser;

pub use content::{ContentStream, Operation};
pub use lexer::{Keyword, Lexer, Token};
pub use object_parser::{IndirectObject, ObjectParser};
