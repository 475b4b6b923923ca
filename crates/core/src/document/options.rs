//! Parsing configuration.

use crate::parser::object_parser::DEFAULT_MAX_NESTING;

/// Knobs for [`Document`](super::Document) loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Rebuild the cross-reference table by scanning the file when the
    /// declared one is missing or unreadable.
    pub reconstruct_on_failure: bool,
    /// Compare each object's `N G obj` header with its table entry and
    /// switch to the reconstructed table on mismatch.
    pub verify_object_headers: bool,
    /// Longest `/Prev` chain that is followed.
    pub max_xref_chain: usize,
    /// Array/dictionary nesting limit.
    pub max_nesting: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            reconstruct_on_failure: true,
            verify_object_headers: true,
            max_xref_chain: 1024,
            max_nesting: DEFAULT_MAX_NESTING,
        }
    }
}

impl ParseOptions {
    pub const fn with_reconstruct_on_failure(mut self, enabled: bool) -> Self {
        self.reconstruct_on_failure = enabled;
        self
    }

    pub const fn with_verify_object_headers(mut self, enabled: bool) -> Self {
        self.verify_object_headers = enabled;
        self
    }

    pub const fn with_max_xref_chain(mut self, max: usize) -> Self {
        self.max_xref_chain = max;
        self
    }

    pub const fn with_max_nesting(mut self, max: usize) -> Self {
        self.max_nesting = max;
        self
    }
}
