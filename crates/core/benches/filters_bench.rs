//! Benchmarks for stream filters.
//!
//! Benchmark groups:
//! - `filters_decode`: decoding throughput per filter
//! - `filters_predictor`: PNG predictor undo on image-shaped rows

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

use quire_core::{Dictionary, Name, codec};

/// Text-like payload: repetitive enough to compress, varied enough to
/// exercise the literal paths.
fn generate_payload(len: usize) -> Vec<u8> {
    let words: &[&[u8]] = &[
        b"BT /F1 12 Tf ",
        b"72 712 Td ",
        b"(quarterly report) Tj ",
        b"0 -14 Td ",
        b"(net revenue 1,024.50) Tj ",
        b"ET\n",
    ];
    let mut data = Vec::with_capacity(len);
    let mut i = 0;
    while data.len() < len {
        data.extend_from_slice(words[i % words.len()]);
        data.push(b'0' + (i % 10) as u8);
        i += 1;
    }
    data.truncate(len);
    data
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("filters_decode");

    for filter in ["FlateDecode", "LZWDecode", "ASCIIHexDecode", "ASCII85Decode", "RunLengthDecode"] {
        for len in [16 * 1024usize, 1024 * 1024] {
            let data = generate_payload(len);
            let filters = [Name::new(filter)];
            let encoded = codec::encode(&data, &filters, &[None]).unwrap();
            group.throughput(Throughput::Bytes(len as u64));
            group.bench_with_input(BenchmarkId::new(filter, len), &encoded, |b, encoded| {
                b.iter(|| codec::decode(black_box(encoded), &filters, &[None]).unwrap())
            });
        }
    }

    group.finish();
}

fn bench_predictor(c: &mut Criterion) {
    let mut group = c.benchmark_group("filters_predictor");

    for (width, height) in [(256usize, 256usize), (1024, 1024)] {
        let mut params = Dictionary::new();
        params.insert("Predictor", 15);
        params.insert("Colors", 3);
        params.insert("Columns", width as i64);
        let params = [Some(params)];
        let filters = [Name::new("FlateDecode")];

        let pixels: Vec<u8> = (0..width * height * 3)
            .map(|i| ((i / 3) % width + (i / (3 * width))) as u8)
            .collect();
        let encoded = codec::encode(&pixels, &filters, &params).unwrap();

        group.throughput(Throughput::Bytes(pixels.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("png_rgb", format!("{width}x{height}")),
            &encoded,
            |b, encoded| b.iter(|| codec::decode(black_box(encoded), &filters, &params).unwrap()),
        );
    }

    group.finish();
}

criterion_group!(benches, bench_decode, bench_predictor);
criterion_main!(benches);
