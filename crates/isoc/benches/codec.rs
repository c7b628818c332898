//! Criterion benchmarks for the ISO framing codec.
//!
//! Run: cargo bench -p isoc --bench codec
//!
//! Results show:
//!   encode_in_place/*   header stamping into a pool buffer (no copy)
//!   write_frame/*       headers + SDU copy into a flat slice
//!   decode/*            parse of a received frame

#![allow(
    clippy::expect_used,  // benchmark helpers use expect for brevity
    clippy::indexing_slicing,
    missing_docs,         // criterion_group! macro generates undocumented items
)]

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use isoc::codec::{decode, encode, write_frame};
use isoc::config::{IsocConfig, MAX_FRAME_LEN, MAX_SDU_LEN};
use isoc::header::ConnectionHandle;
use isoc::pool::SduPool;

const HANDLE: ConnectionHandle = ConnectionHandle::new(0x0060);
const SIZES: [usize; 3] = [0, 100, MAX_SDU_LEN];

fn bench_encode_in_place(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_in_place");
    let config = IsocConfig::new().with_max_sdu_size(550);
    for &size in &SIZES {
        let mut pool: SduPool = SduPool::new(&config).expect("valid pool");
        let mut buffer = pool.acquire().expect("slot");
        buffer.fill_payload(&vec![0x5A; size]);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| encode(&mut buffer, HANDLE, black_box(7), Some(1234), size).expect("fits"));
        });
        pool.release(buffer);
    }
    group.finish();
}

fn bench_write_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_frame");
    for &size in &SIZES {
        let sdu = vec![0x5A; size];
        let mut out = vec![0u8; MAX_FRAME_LEN];
        group.bench_with_input(BenchmarkId::from_parameter(size), &sdu, |b, sdu| {
            b.iter(|| write_frame(&mut out, HANDLE, black_box(7), None, sdu).expect("fits"));
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    for &size in &SIZES {
        let mut out = vec![0u8; MAX_FRAME_LEN];
        let len = write_frame(&mut out, HANDLE, 7, Some(1234), &vec![0x5A; size]).expect("fits");
        let frame = &out[..len];
        group.bench_with_input(BenchmarkId::from_parameter(size), frame, |b, frame| {
            b.iter(|| decode(black_box(frame)).expect("valid frame"));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode_in_place, bench_write_frame, bench_decode);
criterion_main!(benches);
