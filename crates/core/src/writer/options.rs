//! Output configuration.

use crate::utils::PdfVersion;

/// Cross-reference section flavour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum XrefFormat {
    /// `xref` keyword with 20-byte records
    #[default]
    Table,
    /// `/Type /XRef` stream, PDF 1.5 and later
    Stream,
}

/// Knobs for [`WriterGraph::write`](super::WriterGraph::write).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOptions {
    pub xref_format: XrefFormat,
    /// Flate-encode streams that have no filter while writing.
    pub compress_streams: bool,
    /// Header version; defaults to the highest version of the sources.
    pub header_version: Option<PdfVersion>,
    /// Emit the `%` line of high bytes after the header that marks the
    /// file as binary.
    pub binary_comment: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            xref_format: XrefFormat::Table,
            compress_streams: false,
            header_version: None,
            binary_comment: true,
        }
    }
}

impl WriteOptions {
    pub const fn with_xref_format(mut self, format: XrefFormat) -> Self {
        self.xref_format = format;
        self
    }

    pub const fn with_compress_streams(mut self, enabled: bool) -> Self {
        self.compress_streams = enabled;
        self
    }

    pub const fn with_header_version(mut self, version: PdfVersion) -> Self {
        self.header_version = Some(version);
        self
    }

    pub const fn with_binary_comment(mut self, enabled: bool) -> Self {
        self.binary_comment = enabled;
        self
    }
}
