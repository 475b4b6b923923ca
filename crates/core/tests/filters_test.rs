use proptest::prelude::*;
use quire_core::codec::{self, paeth_predictor, registry};
use quire_core::{Dictionary, Name, PdfError};

fn names(list: &[&str]) -> Vec<Name> {
    list.iter().map(|n| Name::new(n)).collect()
}

fn predictor_params(predictor: i64, columns: i64) -> Dictionary {
    let mut parms = Dictionary::new();
    parms.insert("Predictor", predictor);
    parms.insert("Columns", columns);
    parms
}

#[test]
fn flate_hello_world() {
    let encoded = hex::decode("789ccb48cdc9c95728cf2fca4901001a0b045d").unwrap();
    let out = codec::decode(&encoded, &names(&["FlateDecode"]), &[None]).unwrap();
    assert_eq!(out, b"hello world");
}

#[test]
fn truncated_flate_is_strict_error_but_recoverable() {
    let data: Vec<u8> = (0..2000u32).map(|i| (i * 7 % 251) as u8).collect();
    let filters = names(&["FlateDecode"]);
    let encoded = codec::encode(&data, &filters, &[None]).unwrap();
    let cut = &encoded[..encoded.len() - 8];

    assert!(matches!(
        codec::decode(cut, &filters, &[None]),
        Err(PdfError::FilterDecode { .. })
    ));

    let (partial, errors) = registry().decode_recovering(cut, &filters, &[None]).unwrap();
    assert_eq!(errors.len(), 1);
    assert!(!partial.is_empty());
    assert!(data.starts_with(&partial));
}

#[test]
fn ascii_hex_ignores_whitespace_and_pads() {
    let out = codec::decode(b"48 65\n6C6C 6F7>", &names(&["ASCIIHexDecode"]), &[None]).unwrap();
    assert_eq!(out, b"Hello\x70");
}

#[test]
fn ascii85_known_value() {
    let out = codec::decode(b"<~87cURD]i,\"Ebo80~>", &names(&["A85"]), &[None]).unwrap();
    assert_eq!(out, b"Hello World!");
}

#[test]
fn run_length_literal_and_repeat() {
    // 3 literal bytes, then 'z' repeated 4 times, then EOD
    let out = codec::decode(b"\x02abc\xFDz\x80", &names(&["RunLengthDecode"]), &[None]).unwrap();
    assert_eq!(out, b"abczzzz");
}

#[test]
fn png_up_predictor_decodes_rows() {
    // Two rows of three bytes, both tagged Up (2)
    let raw = [2u8, 1, 2, 3, 2, 1, 1, 1];
    let encoded = codec::encode(&raw, &names(&["FlateDecode"]), &[None]).unwrap();
    let out = codec::decode(
        &encoded,
        &names(&["FlateDecode"]),
        &[Some(predictor_params(12, 3))],
    )
    .unwrap();
    assert_eq!(out, [1, 2, 3, 2, 3, 4]);
}

#[test]
fn paeth_picks_nearest_neighbour() {
    assert_eq!(paeth_predictor(10, 20, 10), 20);
    assert_eq!(paeth_predictor(20, 10, 10), 20);
    assert_eq!(paeth_predictor(0, 0, 0), 0);
}

#[test]
fn unknown_filter_fails_before_decoding() {
    let err = codec::decode(b"xx", &names(&["ASCIIHexDecode", "DCTDecode"]), &[None, None])
        .unwrap_err();
    assert!(matches!(err, PdfError::UnsupportedFilter(ref n) if n == "DCTDecode"));
}

proptest! {
    #[test]
    fn filters_restore_their_input(
        data in proptest::collection::vec(any::<u8>(), 0..2048),
        filter in prop_oneof![
            Just("FlateDecode"),
            Just("LZWDecode"),
            Just("ASCIIHexDecode"),
            Just("ASCII85Decode"),
            Just("RunLengthDecode"),
        ],
    ) {
        let filters = names(&[filter]);
        let encoded = codec::encode(&data, &filters, &[None]).unwrap();
        prop_assert_eq!(codec::decode(&encoded, &filters, &[None]).unwrap(), data);
    }

    #[test]
    fn png_predictors_restore_rows(
        rows in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 8), 1..32),
        predictor in 10i64..=15,
    ) {
        let data: Vec<u8> = rows.concat();
        let filters = names(&["FlateDecode"]);
        let params = [Some(predictor_params(predictor, 8))];
        let encoded = codec::encode(&data, &filters, &params).unwrap();
        prop_assert_eq!(codec::decode(&encoded, &filters, &params).unwrap(), data);
    }

    #[test]
    fn out_of_range_predictor_parameters_fail_cleanly(
        data in proptest::collection::vec(any::<u8>(), 0..256),
        predictor in prop_oneof![Just(2i64), 10i64..=15],
        colors in prop_oneof![Just(-1i64), 1i64..=4, Just(i64::MAX)],
        bits in prop_oneof![Just(0i64), Just(8i64), Just(16i64), Just(1i64 << 40)],
        columns in prop_oneof![
            1i64..=64,
            Just(1i64 << 40),
            Just(4_611_686_018_427_387_904i64),
            Just(i64::MAX),
        ],
    ) {
        let mut parms = predictor_params(predictor, columns);
        parms.insert("Colors", colors);
        parms.insert("BitsPerComponent", bits);
        let filters = names(&["FlateDecode"]);
        let encoded = codec::encode(&data, &filters, &[None]).unwrap();
        match codec::decode(&encoded, &filters, &[Some(parms)]) {
            Ok(decoded) => prop_assert!(decoded.len() <= data.len()),
            Err(err) => prop_assert!(matches!(err, PdfError::FilterDecode { .. }), "expected FilterDecode error, got {:?}", err),
        }
    }
}
