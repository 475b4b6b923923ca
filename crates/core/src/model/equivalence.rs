//! Structural equality over an object graph.
//!
//! Two objects are equivalent when their content matches after sorting
//! dictionary keys, ignoring stream `/Length`, comparing stream payloads
//! decoded, and treating references as equal when their targets are
//! equivalent. The last rule makes equality a property of the whole graph,
//! so classes are computed by partition refinement: start from the
//! reference-free shape of every object and split classes until the classes
//! of referenced objects agree too. Cycles need no special handling.

use super::objects::{Dictionary, ObjectId, PdfStream, PdfValue};
use crate::writer::serialize::write_value;
use itertools::Itertools;
use rustc_hash::FxHashMap;

/// Placeholder written where a reference stood. Object 0 is never live.
const REF_MARKER: ObjectId = ObjectId::new(0, 0);

/// Equivalence classes of a set of objects.
#[derive(Debug, Clone, Default)]
pub struct StructuralClasses {
    classes: FxHashMap<ObjectId, usize>,
}

struct Shape {
    id: ObjectId,
    template: usize,
    refs: Vec<ObjectId>,
}

impl StructuralClasses {
    /// Classify `objects`. `payload` returns the bytes a stream is compared
    /// by, normally its decoded data.
    ///
    /// References to objects outside the set are only equal to references
    /// to the same object.
    pub fn compute<'a>(
        objects: impl IntoIterator<Item = (ObjectId, &'a PdfValue)>,
        mut payload: impl FnMut(&PdfStream) -> Vec<u8>,
    ) -> Self {
        let mut templates: FxHashMap<Vec<u8>, usize> = FxHashMap::default();
        let mut shapes = Vec::new();
        for (id, value) in objects {
            let (bytes, refs) = shape_of(value, &mut payload);
            let next = templates.len();
            let template = *templates.entry(bytes).or_insert(next);
            shapes.push(Shape { id, template, refs });
        }

        let mut classes: FxHashMap<ObjectId, usize> =
            shapes.iter().map(|s| (s.id, s.template)).collect();
        let mut count = templates.len();

        loop {
            let mut signatures: FxHashMap<(usize, Vec<Target>), usize> = FxHashMap::default();
            let mut refined = FxHashMap::default();
            for shape in &shapes {
                let targets = shape
                    .refs
                    .iter()
                    .map(|r| match classes.get(r) {
                        Some(&class) => Target::Class(class),
                        None => Target::Outside(*r),
                    })
                    .collect();
                let next = signatures.len();
                let class = *signatures.entry((shape.template, targets)).or_insert(next);
                refined.insert(shape.id, class);
            }
            classes = refined;
            // Refinement only ever splits classes
            if signatures.len() == count {
                break;
            }
            count = signatures.len();
        }

        Self { classes }
    }

    pub fn class_of(&self, id: ObjectId) -> Option<usize> {
        self.classes.get(&id).copied()
    }

    pub fn equivalent(&self, a: ObjectId, b: ObjectId) -> bool {
        matches!((self.class_of(a), self.class_of(b)), (Some(x), Some(y)) if x == y)
    }

    /// Classes with more than one member, each sorted by id, ordered by
    /// their smallest member.
    pub fn groups(&self) -> Vec<Vec<ObjectId>> {
        let mut by_class: FxHashMap<usize, Vec<ObjectId>> = FxHashMap::default();
        for (&id, &class) in &self.classes {
            by_class.entry(class).or_default().push(id);
        }
        let mut groups: Vec<Vec<ObjectId>> = by_class
            .into_values()
            .filter(|members| members.len() > 1)
            .map(|mut members| {
                members.sort_unstable();
                members
            })
            .collect();
        groups.sort_unstable_by_key(|members| members[0]);
        groups
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Target {
    Class(usize),
    Outside(ObjectId),
}

/// Canonical bytes of `value` with references blanked out, and the
/// references in the order they were blanked.
fn shape_of(
    value: &PdfValue,
    payload: &mut impl FnMut(&PdfStream) -> Vec<u8>,
) -> (Vec<u8>, Vec<ObjectId>) {
    let mut out = Vec::new();
    let mut refs = Vec::new();
    let mut blank = |id: ObjectId| {
        refs.push(id);
        REF_MARKER
    };

    match value {
        PdfValue::Stream(stream) => {
            let mut dict = sorted(&stream.dict);
            dict.remove("Length");
            let mut dict = PdfValue::Dict(dict);
            dict.map_refs(&mut blank);
            write_value(&mut out, &dict);
            out.extend_from_slice(b"stream\n");
            out.extend_from_slice(&payload(stream));
        }
        other => {
            let mut value = canonical(other);
            value.map_refs(&mut blank);
            write_value(&mut out, &value);
        }
    }
    (out, refs)
}

fn canonical(value: &PdfValue) -> PdfValue {
    match value {
        PdfValue::Array(arr) => PdfValue::Array(arr.iter().map(canonical).collect()),
        PdfValue::Dict(dict) => PdfValue::Dict(sorted(dict)),
        other => other.clone(),
    }
}

fn sorted(dict: &Dictionary) -> Dictionary {
    dict.iter()
        .sorted_by(|a, b| a.0.as_str().cmp(b.0.as_str()))
        .map(|(key, value)| (key.clone(), canonical(value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict(entries: &[(&str, PdfValue)]) -> PdfValue {
        let mut d = Dictionary::new();
        for (k, v) in entries {
            d.insert(*k, v.clone());
        }
        PdfValue::Dict(d)
    }

    fn raw(stream: &PdfStream) -> Vec<u8> {
        stream.raw_data().to_vec()
    }

    #[test]
    fn key_order_is_ignored() {
        let a = dict(&[("A", 1.into()), ("B", 2.into())]);
        let b = dict(&[("B", 2.into()), ("A", 1.into())]);
        let ids = [ObjectId::new(1, 0), ObjectId::new(2, 0)];
        let classes = StructuralClasses::compute([(ids[0], &a), (ids[1], &b)], raw);
        assert!(classes.equivalent(ids[0], ids[1]));
    }

    #[test]
    fn references_compare_by_target() {
        let font_a = dict(&[("Type", PdfValue::name("Font"))]);
        let font_b = font_a.clone();
        let other = dict(&[("Type", PdfValue::name("XObject"))]);
        let res1 = dict(&[("F", ObjectId::new(1, 0).into())]);
        let res2 = dict(&[("F", ObjectId::new(2, 0).into())]);
        let res3 = dict(&[("F", ObjectId::new(3, 0).into())]);
        let objects = [
            (ObjectId::new(1, 0), &font_a),
            (ObjectId::new(2, 0), &font_b),
            (ObjectId::new(3, 0), &other),
            (ObjectId::new(4, 0), &res1),
            (ObjectId::new(5, 0), &res2),
            (ObjectId::new(6, 0), &res3),
        ];
        let classes = StructuralClasses::compute(objects, raw);
        assert!(classes.equivalent(ObjectId::new(4, 0), ObjectId::new(5, 0)));
        assert!(!classes.equivalent(ObjectId::new(4, 0), ObjectId::new(6, 0)));
        assert_eq!(
            classes.groups(),
            vec![
                vec![ObjectId::new(1, 0), ObjectId::new(2, 0)],
                vec![ObjectId::new(4, 0), ObjectId::new(5, 0)],
            ]
        );
    }

    #[test]
    fn cycles_terminate() {
        let a = dict(&[("Next", ObjectId::new(2, 0).into())]);
        let b = dict(&[("Next", ObjectId::new(1, 0).into())]);
        let classes =
            StructuralClasses::compute([(ObjectId::new(1, 0), &a), (ObjectId::new(2, 0), &b)], raw);
        assert!(classes.equivalent(ObjectId::new(1, 0), ObjectId::new(2, 0)));
    }

    #[test]
    fn stream_length_is_ignored() {
        let mut d1 = Dictionary::new();
        d1.insert("Length", ObjectId::new(9, 0));
        let s1 = PdfValue::from(PdfStream::from_parts(d1, bytes::Bytes::from_static(b"abc")));
        let s2 = PdfValue::from(PdfStream::new(Dictionary::new(), b"abc".to_vec()));
        let s3 = PdfValue::from(PdfStream::new(Dictionary::new(), b"abd".to_vec()));
        let classes = StructuralClasses::compute(
            [
                (ObjectId::new(1, 0), &s1),
                (ObjectId::new(2, 0), &s2),
                (ObjectId::new(3, 0), &s3),
            ],
            raw,
        );
        assert!(classes.equivalent(ObjectId::new(1, 0), ObjectId::new(2, 0)));
        assert!(!classes.equivalent(ObjectId::new(2, 0), ObjectId::new(3, 0)));
    }
}
