//! PDF object types.
//!
//! [`PdfValue`] is a closed union over every value that can appear in PDF
//! object syntax. References are stored as bare [`ObjectId`]s and resolved
//! through a [`Document`](crate::document::Document); a value never owns the
//! object it points at.

use crate::error::{PdfError, Result};
use bytes::Bytes;
use indexmap::IndexMap;
use smol_str::SmolStr;
use std::borrow::Borrow;
use std::fmt;

/// Identity of an indirect object: object number plus generation number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    /// Object number
    pub objnum: u32,
    /// Generation number
    pub genno: u16,
}

impl ObjectId {
    /// Create a new object id.
    pub const fn new(objnum: u32, genno: u16) -> Self {
        Self { objnum, genno }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.objnum, self.genno)
    }
}

/// A PDF name (e.g. `/Type`).
///
/// Names compare as symbols. Bytes map one-to-one onto chars `U+0000..=U+00FF`
/// so that any name read from a file serializes back to the same bytes.
/// [`Name::new`] stores a char past `U+00FF` as its UTF-8 bytes, so such a
/// name equals the one parsed back from its serialized form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(SmolStr);

impl Name {
    pub fn new(name: &str) -> Self {
        if name.chars().all(|c| u32::from(c) <= 0xFF) {
            return Self(SmolStr::new(name));
        }
        let mut bytes = Vec::with_capacity(name.len());
        for c in name.chars() {
            match u8::try_from(u32::from(c)) {
                Ok(b) => bytes.push(b),
                Err(_) => {
                    let mut buf = [0u8; 4];
                    bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                }
            }
        }
        Self::from_bytes(&bytes)
    }

    /// Build a name from raw (already `#`-unescaped) bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        if bytes.is_ascii() {
            // ASCII is identical under both mappings
            return Self(SmolStr::new(std::str::from_utf8(bytes).unwrap_or_default()));
        }
        Self(bytes.iter().map(|&b| char::from(b)).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Raw bytes of the name, inverse of [`Name::from_bytes`].
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0
            .chars()
            .filter_map(|c| u8::try_from(u32::from(c)).ok())
            .collect()
    }
}

impl Borrow<str> for Name {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0)
    }
}

/// Dictionary with unique name keys, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dictionary(IndexMap<Name, PdfValue>);

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&PdfValue> {
        self.0.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut PdfValue> {
        self.0.get_mut(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Insert a value, returning the previous one. An existing key keeps its position.
    pub fn insert(&mut self, key: impl Into<Name>, value: impl Into<PdfValue>) -> Option<PdfValue> {
        self.0.insert(key.into(), value.into())
    }

    /// Remove a key while preserving the order of the remaining entries.
    pub fn remove(&mut self, key: &str) -> Option<PdfValue> {
        self.0.shift_remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Name, &PdfValue)> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&Name, &mut PdfValue)> {
        self.0.iter_mut()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Name> {
        self.0.keys()
    }

    /// Get a direct name value.
    pub fn get_name(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.as_name().ok())
    }

    /// Get a direct integer value.
    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_int().ok())
    }

    /// Check `/Type` against a name.
    pub fn has_type(&self, type_name: &str) -> bool {
        self.get_name("Type") == Some(type_name)
    }
}

impl FromIterator<(Name, PdfValue)> for Dictionary {
    fn from_iter<I: IntoIterator<Item = (Name, PdfValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Dictionary {
    type Item = (Name, PdfValue);
    type IntoIter = indexmap::map::IntoIter<Name, PdfValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// PDF Object types - the fundamental value type in PDF.
#[derive(Debug, Clone, PartialEq)]
pub enum PdfValue {
    /// Null object
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Real (floating point) value
    Real(f64),
    /// Byte string; literal and hex forms share this representation
    String(Vec<u8>),
    /// Name object (e.g., /Type, /Font)
    Name(Name),
    /// Array of objects
    Array(Vec<Self>),
    /// Dictionary (name -> object mapping)
    Dict(Dictionary),
    /// Stream (dictionary + binary data)
    Stream(Box<PdfStream>),
    /// Indirect object reference
    Ref(ObjectId),
}

impl PdfValue {
    /// Shorthand for a name value.
    pub fn name(name: &str) -> Self {
        Self::Name(Name::new(name))
    }

    /// Check if this is a null object
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get as boolean
    pub const fn as_bool(&self) -> Result<bool> {
        match self {
            Self::Bool(b) => Ok(*b),
            _ => Err(self.type_error("bool")),
        }
    }

    /// Get as integer
    pub const fn as_int(&self) -> Result<i64> {
        match self {
            Self::Int(n) => Ok(*n),
            _ => Err(self.type_error("int")),
        }
    }

    /// Get numeric value (int or real coerced to f64)
    pub const fn as_num(&self) -> Result<f64> {
        match self {
            Self::Int(n) => Ok(*n as f64),
            Self::Real(n) => Ok(*n),
            _ => Err(self.type_error("number")),
        }
    }

    /// Get as name string
    pub fn as_name(&self) -> Result<&str> {
        match self {
            Self::Name(n) => Ok(n.as_str()),
            _ => Err(self.type_error("name")),
        }
    }

    /// Get as byte string
    pub fn as_string(&self) -> Result<&[u8]> {
        match self {
            Self::String(s) => Ok(s),
            _ => Err(self.type_error("string")),
        }
    }

    /// Get as array
    pub fn as_array(&self) -> Result<&[Self]> {
        match self {
            Self::Array(arr) => Ok(arr),
            _ => Err(self.type_error("array")),
        }
    }

    /// Get as dictionary. Streams expose their dictionary too.
    pub fn as_dict(&self) -> Result<&Dictionary> {
        match self {
            Self::Dict(d) => Ok(d),
            Self::Stream(s) => Ok(&s.dict),
            _ => Err(self.type_error("dict")),
        }
    }

    /// Mutable dictionary access, streams included.
    pub fn as_dict_mut(&mut self) -> Result<&mut Dictionary> {
        match self {
            Self::Dict(d) => Ok(d),
            Self::Stream(s) => Ok(&mut s.dict),
            _ => Err(self.type_error("dict")),
        }
    }

    /// Get as stream
    pub fn as_stream(&self) -> Result<&PdfStream> {
        match self {
            Self::Stream(s) => Ok(s),
            _ => Err(self.type_error("stream")),
        }
    }

    /// Get as object reference
    pub const fn as_ref(&self) -> Result<ObjectId> {
        match self {
            Self::Ref(r) => Ok(*r),
            _ => Err(self.type_error("ref")),
        }
    }

    const fn type_error(&self, expected: &'static str) -> PdfError {
        PdfError::TypeError {
            expected,
            got: self.type_name(),
        }
    }

    /// Get type name for error messages
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Real(_) => "real",
            Self::String(_) => "string",
            Self::Name(_) => "name",
            Self::Array(_) => "array",
            Self::Dict(_) => "dict",
            Self::Stream(_) => "stream",
            Self::Ref(_) => "ref",
        }
    }

    /// Visit every reference reachable without dereferencing.
    pub fn for_each_ref(&self, f: &mut impl FnMut(ObjectId)) {
        match self {
            Self::Ref(id) => f(*id),
            Self::Array(arr) => arr.iter().for_each(|v| v.for_each_ref(f)),
            Self::Dict(d) => d.iter().for_each(|(_, v)| v.for_each_ref(f)),
            Self::Stream(s) => s.dict.iter().for_each(|(_, v)| v.for_each_ref(f)),
            _ => {}
        }
    }

    /// Rewrite every reference in place.
    pub fn map_refs(&mut self, f: &mut impl FnMut(ObjectId) -> ObjectId) {
        match self {
            Self::Ref(id) => *id = f(*id),
            Self::Array(arr) => arr.iter_mut().for_each(|v| v.map_refs(f)),
            Self::Dict(d) => d.iter_mut().for_each(|(_, v)| v.map_refs(f)),
            Self::Stream(s) => s.dict.iter_mut().for_each(|(_, v)| v.map_refs(f)),
            _ => {}
        }
    }
}

impl From<bool> for PdfValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for PdfValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for PdfValue {
    fn from(n: i32) -> Self {
        Self::Int(n as i64)
    }
}

impl From<usize> for PdfValue {
    fn from(n: usize) -> Self {
        Self::Int(n as i64)
    }
}

impl From<f64> for PdfValue {
    fn from(n: f64) -> Self {
        Self::Real(n)
    }
}

impl From<Name> for PdfValue {
    fn from(n: Name) -> Self {
        Self::Name(n)
    }
}

impl From<ObjectId> for PdfValue {
    fn from(id: ObjectId) -> Self {
        Self::Ref(id)
    }
}

impl From<Dictionary> for PdfValue {
    fn from(d: Dictionary) -> Self {
        Self::Dict(d)
    }
}

impl From<Vec<PdfValue>> for PdfValue {
    fn from(arr: Vec<PdfValue>) -> Self {
        Self::Array(arr)
    }
}

impl From<PdfStream> for PdfValue {
    fn from(s: PdfStream) -> Self {
        Self::Stream(Box::new(s))
    }
}

/// PDF Stream - dictionary attributes + raw (still encoded) payload.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfStream {
    /// Stream dictionary
    pub dict: Dictionary,
    /// Raw (possibly encoded) data
    raw: Bytes,
}

impl PdfStream {
    /// Create a new stream. `/Length` is set from the payload.
    pub fn new(mut dict: Dictionary, raw: impl Into<Bytes>) -> Self {
        let raw = raw.into();
        dict.insert("Length", raw.len());
        Self { dict, raw }
    }

    /// Create a stream exactly as read, leaving `/Length` untouched.
    pub(crate) fn from_parts(dict: Dictionary, raw: Bytes) -> Self {
        Self { dict, raw }
    }

    /// Get raw (undecoded) data.
    pub fn raw_data(&self) -> &[u8] {
        self.raw.as_ref()
    }

    /// Get raw data as shared bytes.
    pub fn raw_bytes(&self) -> Bytes {
        self.raw.clone()
    }

    /// Replace the raw payload and keep `/Length` in sync.
    pub fn set_raw_data(&mut self, data: impl Into<Bytes>) {
        self.raw = data.into();
        self.dict.insert("Length", self.raw.len());
    }

    /// Get attribute by name.
    pub fn get(&self, name: &str) -> Option<&PdfValue> {
        self.dict.get(name)
    }

    /// Declared filter names, in decode order. Only direct names are listed.
    pub fn filters(&self) -> Vec<Name> {
        match self.dict.get("Filter") {
            Some(PdfValue::Name(n)) => vec![n.clone()],
            Some(PdfValue::Array(arr)) => arr
                .iter()
                .filter_map(|v| match v {
                    PdfValue::Name(n) => Some(n.clone()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Per-filter parameter dictionaries, aligned with [`PdfStream::filters`].
    pub fn decode_params(&self) -> Vec<Option<Dictionary>> {
        let count = self.filters().len();
        let mut params = match self.dict.get("DecodeParms") {
            Some(PdfValue::Dict(d)) => vec![Some(d.clone())],
            Some(PdfValue::Array(arr)) => arr
                .iter()
                .map(|v| match v {
                    PdfValue::Dict(d) => Some(d.clone()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };
        params.resize(count, None);
        params
    }

    /// Decode the payload with the default filter registry.
    ///
    /// Filter entries that are indirect references must be resolved first;
    /// [`Document::decode_stream`](crate::document::Document::decode_stream) does that.
    pub fn decode(&self) -> Result<Vec<u8>> {
        crate::codec::decode(&self.raw, &self.filters(), &self.decode_params())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_bytes_roundtrip_non_ascii() {
        let raw = [b'A', 0xE9, b'#', 0x00];
        let name = Name::from_bytes(&raw);
        assert_eq!(name.to_bytes(), raw);
    }

    #[test]
    fn dictionary_remove_preserves_order() {
        let mut dict = Dictionary::new();
        dict.insert("A", 1);
        dict.insert("B", 2);
        dict.insert("C", 3);
        dict.remove("B");
        let keys: Vec<&str> = dict.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, ["A", "C"]);
    }

    #[test]
    fn stream_params_align_with_filters() {
        let mut dict = Dictionary::new();
        dict.insert(
            "Filter",
            vec![PdfValue::name("ASCIIHexDecode"), PdfValue::name("FlateDecode")],
        );
        let stream = PdfStream::new(dict, Bytes::new());
        assert_eq!(stream.filters().len(), 2);
        assert_eq!(stream.decode_params(), vec![None, None]);
        assert_eq!(stream.get("Length"), Some(&PdfValue::Int(0)));
    }

    #[test]
    fn for_each_ref_walks_nested_values() {
        let mut inner = Dictionary::new();
        inner.insert("F1", ObjectId::new(7, 0));
        let value = PdfValue::Array(vec![
            PdfValue::Ref(ObjectId::new(3, 0)),
            PdfValue::Dict(inner),
        ]);
        let mut seen = Vec::new();
        value.for_each_ref(&mut |id| seen.push(id.objnum));
        assert_eq!(seen, [3, 7]);
    }
}
