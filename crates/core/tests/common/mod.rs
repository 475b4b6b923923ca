//! In-memory PDF construction for integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;

/// Assembles a file from object bodies, computing every offset.
#[derive(Debug, Clone)]
pub struct PdfBuilder {
    version: &'static str,
    objects: BTreeMap<u32, Vec<u8>>,
    /// Objects stored in object streams: (container, index)
    compressed: BTreeMap<u32, (u32, u16)>,
    trailer: String,
}

impl Default for PdfBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self {
            version: "1.4",
            objects: BTreeMap::new(),
            compressed: BTreeMap::new(),
            trailer: String::new(),
        }
    }

    pub fn version(mut self, version: &'static str) -> Self {
        self.version = version;
        self
    }

    pub fn object(mut self, objnum: u32, body: impl AsRef<[u8]>) -> Self {
        self.objects.insert(objnum, body.as_ref().to_vec());
        self
    }

    /// A stream object with a correct direct `/Length`.
    pub fn stream(self, objnum: u32, dict_entries: &str, data: &[u8]) -> Self {
        let mut body =
            format!("<< {dict_entries} /Length {} >>\nstream\n", data.len()).into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(b"\nendstream");
        self.object(objnum, body)
    }

    /// Index `objnum` as entry `index` of object stream `container`. Only
    /// [`PdfBuilder::build_xref_stream`] can express this.
    pub fn compressed(mut self, objnum: u32, container: u32, index: u16) -> Self {
        self.compressed.insert(objnum, (container, index));
        self
    }

    /// Extra trailer entries besides `/Size`.
    pub fn trailer(mut self, entries: &str) -> Self {
        self.trailer = entries.to_string();
        self
    }

    fn size(&self) -> u32 {
        let last = self.objects.keys().chain(self.compressed.keys()).max();
        last.map_or(1, |n| n + 1)
    }

    /// Header and object bodies, with the offset of each object.
    fn body(&self) -> (Vec<u8>, BTreeMap<u32, usize>) {
        let mut out = format!("%PDF-{}\n%\u{e2}\u{e3}\n", self.version).into_bytes();
        let mut offsets = BTreeMap::new();
        for (&objnum, body) in &self.objects {
            offsets.insert(objnum, out.len());
            out.extend_from_slice(format!("{objnum} 0 obj\n").as_bytes());
            out.extend_from_slice(body);
            out.extend_from_slice(b"\nendobj\n");
        }
        (out, offsets)
    }

    /// File with a classic `xref` table.
    pub fn build(&self) -> Vec<u8> {
        self.build_with_offsets().0
    }

    pub fn build_with_offsets(&self) -> (Vec<u8>, BTreeMap<u32, usize>) {
        let (mut out, offsets) = self.body();
        let size = self.size();
        let startxref = out.len();
        out.extend_from_slice(format!("xref\n0 {size}\n").as_bytes());
        for objnum in 0..size {
            let line = match offsets.get(&objnum) {
                Some(offset) => format!("{offset:010} 00000 n \n"),
                None if objnum == 0 => "0000000000 65535 f \n".to_string(),
                None => "0000000000 00001 f \n".to_string(),
            };
            out.extend_from_slice(line.as_bytes());
        }
        out.extend_from_slice(
            format!(
                "trailer\n<< /Size {size} {} >>\nstartxref\n{startxref}\n%%EOF\n",
                self.trailer
            )
            .as_bytes(),
        );
        (out, offsets)
    }

    /// File indexed by an uncompressed cross-reference stream with
    /// `/W [1 4 2]`, stored as the next free object number.
    pub fn build_xref_stream(&self) -> Vec<u8> {
        let (mut out, offsets) = self.body();
        let xref_objnum = self.size();
        let size = xref_objnum + 1;
        let startxref = out.len();

        let mut rows = Vec::new();
        for objnum in 0..size {
            let (kind, field2, field3): (u8, u32, u16) = match offsets.get(&objnum) {
                Some(&offset) => (1, offset as u32, 0),
                None if self.compressed.contains_key(&objnum) => {
                    let (container, index) = self.compressed[&objnum];
                    (2, container, index)
                }
                None if objnum == xref_objnum => (1, startxref as u32, 0),
                None if objnum == 0 => (0, 0, 65535),
                None => (0, 0, 1),
            };
            rows.push(kind);
            rows.extend_from_slice(&field2.to_be_bytes());
            rows.extend_from_slice(&field3.to_be_bytes());
        }

        out.extend_from_slice(
            format!(
                "{xref_objnum} 0 obj\n<< /Type /XRef /Size {size} /W [1 4 2] {} /Length {} >>\nstream\n",
                self.trailer,
                rows.len()
            )
            .as_bytes(),
        );
        out.extend_from_slice(&rows);
        out.extend_from_slice(
            format!("\nendstream\nendobj\nstartxref\n{startxref}\n%%EOF\n").as_bytes(),
        );
        out
    }
}

/// Catalog 1, page tree 2, then one page and one content stream per entry
/// of `contents`, numbered from 3.
pub fn simple_document(contents: &[&[u8]]) -> PdfBuilder {
    let page_ids: Vec<u32> = (0..contents.len() as u32).map(|i| 3 + 2 * i).collect();
    let kids = page_ids
        .iter()
        .map(|id| format!("{id} 0 R"))
        .collect::<Vec<_>>()
        .join(" ");
    let mut builder = PdfBuilder::new()
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(
            2,
            format!(
                "<< /Type /Pages /Kids [{kids}] /Count {} /MediaBox [0 0 612 792] >>",
                contents.len()
            ),
        )
        .trailer("/Root 1 0 R");
    for (page, content) in page_ids.iter().zip(contents) {
        builder = builder
            .object(
                *page,
                format!("<< /Type /Page /Parent 2 0 R /Contents {} 0 R >>", page + 1),
            )
            .stream(page + 1, "", content);
    }
    builder
}
