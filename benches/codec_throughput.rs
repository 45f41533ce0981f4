//! Benchmarks for frame decoding and stream scanning
//!
//! Covers:
//! - Single frame decode at typical channel counts
//! - Scanner throughput over a clean multi-probe recording
//! - Scanner throughput when every frame follows a burst of garbage
//! - Sample unpacking into caller buffers
//!
//! Platform: Cross-platform (synthetic data, CI-safe)

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use viperstream::codec::{self, FrameScanner, ScanEvent};
use viperstream::diagnostics::{Diagnostics, SessionPolicy};
use viperstream::test_utils::synthetic_stream;

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_frame");

    for channels in [8usize, 64, 384] {
        let bytes = synthetic_stream(1, 1, channels, 1);
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(channels), &bytes, |b, bytes| {
            b.iter(|| black_box(codec::decode(black_box(bytes))))
        });
    }

    group.finish();
}

fn scan_all(bytes: &[u8], chunk: usize) -> usize {
    let mut scanner = FrameScanner::new();
    let mut diagnostics = Diagnostics::new(SessionPolicy::Follow);
    let mut frames = 0;

    for piece in bytes.chunks(chunk) {
        scanner.extend(piece);
        while let Some(event) = scanner.next_event() {
            match event {
                ScanEvent::Frame { frame, wire_len } => {
                    diagnostics.observe_frame(&frame, wire_len);
                    frames += 1;
                }
                ScanEvent::Fault(error) => {
                    if let Some(kind) = error.kind() {
                        diagnostics.observe_fault(kind);
                    }
                }
            }
        }
    }
    frames
}

fn bench_scan_clean(c: &mut Criterion) {
    let bytes = synthetic_stream(2_000, 4, 64, 1);

    let mut group = c.benchmark_group("scan_clean");
    group.throughput(Throughput::Bytes(bytes.len() as u64));

    for chunk in [4_096usize, 65_536] {
        group.bench_with_input(BenchmarkId::from_parameter(chunk), &chunk, |b, &chunk| {
            b.iter(|| black_box(scan_all(black_box(&bytes), chunk)))
        });
    }

    group.finish();
}

fn bench_scan_noisy(c: &mut Criterion) {
    let clean = synthetic_stream(2_000, 1, 64, 1);
    let frame = codec::frame_len(64);

    // Seven bytes of noise before each frame
    let mut bytes = Vec::with_capacity(clean.len() + clean.len() / frame * 7);
    for chunk in clean.chunks(frame) {
        bytes.extend_from_slice(&[0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77]);
        bytes.extend_from_slice(chunk);
    }

    let mut group = c.benchmark_group("scan_noisy");
    group.throughput(Throughput::Bytes(bytes.len() as u64));
    group.bench_function("garbage_between_frames", |b| b.iter(|| black_box(scan_all(black_box(&bytes), 65_536))));
    group.finish();
}

fn bench_unpack(c: &mut Criterion) {
    let bytes = synthetic_stream(1, 1, 384, 1);
    let frame = match codec::decode(&bytes) {
        Ok(frame) => frame,
        Err(error) => panic!("synthetic frame failed to decode: {error}"),
    };
    let mut out = vec![0i16; 384];

    c.bench_function("unpack_384_channels", |b| {
        b.iter(|| {
            let result = codec::unpack_samples(black_box(&frame.payload), 384, &mut out);
            black_box(result.is_ok())
        })
    });
}

criterion_group!(benches, bench_decode, bench_scan_clean, bench_scan_noisy, bench_unpack);
criterion_main!(benches);
