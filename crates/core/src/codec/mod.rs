//! Stream filters.
//!
//! Every filter is a stateless [`Filter`] registered by name in a
//! [`FilterRegistry`]. Adding a filter is a matter of implementing the trait
//! and registering it; the pipeline itself never changes.
//!
//! - `flate`: FlateDecode, strict and best-effort decoding
//! - `lzw`: LZWDecode with `/EarlyChange`
//! - `ascii85`: ASCII85Decode and ASCIIHexDecode
//! - `runlength`: RunLengthDecode
//! - `predictor`: TIFF and PNG predictors, applied as a separate step

pub mod ascii85;
pub mod flate;
pub mod lzw;
pub mod predictor;
pub mod runlength;

pub use ascii85::{Ascii85Filter, AsciiHexFilter, ascii85decode, ascii85encode, asciihexdecode};
pub use flate::FlateFilter;
pub use lzw::{LzwFilter, lzwdecode, lzwdecode_with_earlychange};
pub use predictor::{Predictor, paeth_predictor};
pub use runlength::{RunLengthFilter, rldecode, rlencode};

use crate::error::{PdfError, Result};
use crate::model::{Dictionary, Name};
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// A named, reversible byte transform.
pub trait Filter: Send + Sync {
    fn decode(&self, data: &[u8], params: Option<&Dictionary>) -> Result<Vec<u8>>;

    fn encode(&self, data: &[u8], params: Option<&Dictionary>) -> Result<Vec<u8>>;

    /// Decode damaged input as far as possible: the output produced so far
    /// plus the error that stopped it. Filters without a recovery mode
    /// simply fail.
    fn decode_partial(
        &self,
        data: &[u8],
        params: Option<&Dictionary>,
    ) -> Result<(Vec<u8>, Option<PdfError>)> {
        self.decode(data, params).map(|out| (out, None))
    }

    /// Whether `/Predictor` in this filter's parameters applies to its output.
    fn uses_predictor(&self) -> bool {
        false
    }
}

/// Filters by `/Filter` name, abbreviations included.
#[derive(Clone, Default)]
pub struct FilterRegistry {
    filters: FxHashMap<String, Arc<dyn Filter>>,
}

static STANDARD: Lazy<FilterRegistry> = Lazy::new(FilterRegistry::standard);

/// The process-wide registry with the standard filter set.
pub fn registry() -> &'static FilterRegistry {
    &STANDARD
}

impl FilterRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// FlateDecode, LZWDecode, ASCIIHexDecode, ASCII85Decode, RunLengthDecode
    /// and their inline-image abbreviations.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        let flate: Arc<dyn Filter> = Arc::new(FlateFilter);
        let lzw: Arc<dyn Filter> = Arc::new(LzwFilter);
        let hex: Arc<dyn Filter> = Arc::new(AsciiHexFilter);
        let a85: Arc<dyn Filter> = Arc::new(Ascii85Filter);
        let rl: Arc<dyn Filter> = Arc::new(RunLengthFilter);
        for (name, filter) in [
            ("FlateDecode", &flate),
            ("Fl", &flate),
            ("LZWDecode", &lzw),
            ("LZW", &lzw),
            ("ASCIIHexDecode", &hex),
            ("AHx", &hex),
            ("ASCII85Decode", &a85),
            ("A85", &a85),
            ("RunLengthDecode", &rl),
            ("RL", &rl),
        ] {
            registry.register(name, Arc::clone(filter));
        }
        registry
    }

    pub fn register(&mut self, name: &str, filter: Arc<dyn Filter>) {
        self.filters.insert(name.to_string(), filter);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Filter> {
        self.filters.get(name).map(|f| f.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    /// Look up every filter of a chain before touching any data, so an
    /// unknown name fails without partial work.
    fn chain<'a>(&'a self, filters: &[Name]) -> Result<Vec<&'a dyn Filter>> {
        filters
            .iter()
            .map(|name| {
                self.get(name.as_str())
                    .ok_or_else(|| PdfError::UnsupportedFilter(name.as_str().to_string()))
            })
            .collect()
    }

    /// Apply filters in declared order. `params[i]` belongs to `filters[i]`.
    pub fn decode(
        &self,
        raw: &[u8],
        filters: &[Name],
        params: &[Option<Dictionary>],
    ) -> Result<Vec<u8>> {
        let chain = self.chain(filters)?;
        let mut data = raw.to_vec();
        for (i, filter) in chain.into_iter().enumerate() {
            let p = params.get(i).and_then(Option::as_ref);
            data = filter.decode(&data, p)?;
            data = unpredict(filter, &data, p)?;
        }
        Ok(data)
    }

    /// Like [`FilterRegistry::decode`], but a filter that fails part way
    /// hands back its partial output and the chain continues with it.
    /// Recovered failures are returned alongside the data.
    pub fn decode_recovering(
        &self,
        raw: &[u8],
        filters: &[Name],
        params: &[Option<Dictionary>],
    ) -> Result<(Vec<u8>, Vec<PdfError>)> {
        let chain = self.chain(filters)?;
        let mut data = raw.to_vec();
        let mut recovered = Vec::new();
        for (i, filter) in chain.into_iter().enumerate() {
            let p = params.get(i).and_then(Option::as_ref);
            let (out, err) = filter.decode_partial(&data, p)?;
            recovered.extend(err);
            data = unpredict(filter, &out, p)?;
        }
        Ok((data, recovered))
    }

    /// Apply filters in reverse order, so that [`FilterRegistry::decode`]
    /// with the same arguments restores `data`.
    pub fn encode(
        &self,
        data: &[u8],
        filters: &[Name],
        params: &[Option<Dictionary>],
    ) -> Result<Vec<u8>> {
        let chain = self.chain(filters)?;
        let mut data = data.to_vec();
        for (i, filter) in chain.into_iter().enumerate().rev() {
            let p = params.get(i).and_then(Option::as_ref);
            if filter.uses_predictor()
                && let Some(predictor) = Predictor::from_params(p)?
            {
                data = predictor.encode(&data)?;
            }
            data = filter.encode(&data, p)?;
        }
        Ok(data)
    }
}

fn unpredict(filter: &dyn Filter, data: &[u8], params: Option<&Dictionary>) -> Result<Vec<u8>> {
    if filter.uses_predictor()
        && let Some(predictor) = Predictor::from_params(params)?
    {
        return predictor.decode(data);
    }
    Ok(data.to_vec())
}

/// Decode with the standard registry.
pub fn decode(raw: &[u8], filters: &[Name], params: &[Option<Dictionary>]) -> Result<Vec<u8>> {
    registry().decode(raw, filters, params)
}

/// Encode with the standard registry.
pub fn encode(data: &[u8], filters: &[Name], params: &[Option<Dictionary>]) -> Result<Vec<u8>> {
    registry().encode(data, filters, params)
}
