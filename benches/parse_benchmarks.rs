//! Benchmarks for scanning, segmenting and exporting.
//!
//! Run with: cargo bench
//!
//! Inputs are synthesised in memory, no fixtures needed.

use std::hint::black_box;

use criterion::{Criterion, Throughput};
use rtmv::{
    ByteOrder, LoadOptions, PackageHeader, ParseOptions, RtmvFile, encode_package, parse, segment,
};

/// Alternating runs of 30 video packages and 2 image packages.
fn synthetic_recording(packages: usize, payload_len: usize) -> Vec<u8> {
    let payload = vec![0x5Au8; payload_len];
    let mut bytes = Vec::with_capacity(packages * (payload_len + 128));
    for index in 0..packages {
        let header = PackageHeader {
            vid_codec: if index % 32 < 30 { 4 } else { 1 },
            timestamp: index as f64 / 30.0,
            ..PackageHeader::default()
        };
        bytes.extend(encode_package(&header, &payload, ByteOrder::Big));
    }
    bytes
}

/// Same recording with a few bytes of garbage every 100 packages.
fn damaged_recording(packages: usize, payload_len: usize) -> Vec<u8> {
    let clean = synthetic_recording(packages, payload_len);
    let stride = (payload_len + 128) * 100;
    let mut bytes = Vec::with_capacity(clean.len() + clean.len() / stride * 7);
    for chunk in clean.chunks(stride) {
        bytes.extend_from_slice(chunk);
        bytes.extend_from_slice(b"PaVEjnk");
    }
    bytes
}

fn benchmark_parse(criterion: &mut Criterion) {
    let clean = synthetic_recording(10_000, 4096);
    let damaged = damaged_recording(10_000, 4096);
    let options = ParseOptions::default();

    let mut group = criterion.benchmark_group("parse");
    group.throughput(Throughput::Bytes(clean.len() as u64));
    group.bench_function("clean 10k packages", |bencher| {
        bencher.iter(|| parse(black_box(&clean), &options).unwrap());
    });
    group.throughput(Throughput::Bytes(damaged.len() as u64));
    group.bench_function("damaged 10k packages", |bencher| {
        bencher.iter(|| parse(black_box(&damaged), &options).unwrap());
    });
    group.finish();
}

fn benchmark_segment(criterion: &mut Criterion) {
    let bytes = synthetic_recording(10_000, 64);
    let table = parse(&bytes, &ParseOptions::default()).unwrap();

    criterion.bench_function("segment 10k packages", |bencher| {
        bencher.iter(|| segment(black_box(&table)));
    });
}

fn benchmark_load(criterion: &mut Criterion) {
    let bytes = synthetic_recording(2_000, 4096);
    let options = LoadOptions::new().without_demuxer().with_probe_images(false);

    criterion.bench_function("load from bytes 2k packages", |bencher| {
        bencher.iter(|| RtmvFile::from_bytes(black_box(bytes.clone()), &options).unwrap());
    });
}

criterion::criterion_group!(benches, benchmark_parse, benchmark_segment, benchmark_load);
criterion::criterion_main!(benches);
