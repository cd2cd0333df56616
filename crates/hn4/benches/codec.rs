// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TCC codec throughput over the payload shapes the engine sees most:
//! sparse tensor pages, sensor ramps, and incompressible noise.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use hn4::codec::ScanTuning;
use hn4::policy::DeviceClass;
use hn4::{compress, compress_bound, decompress};

const PAGE: usize = 4096;

fn sparse_page() -> Vec<u8> {
    let mut page = vec![0u8; PAGE];
    for w in (0..PAGE / 4).step_by(9) {
        page[w * 4..w * 4 + 4].copy_from_slice(&(w as u32).to_le_bytes());
    }
    page
}

fn ramp_page() -> Vec<u8> {
    (0..PAGE).map(|i| ((i / 16) % 256) as u8).collect()
}

fn noise_page() -> Vec<u8> {
    fastrand::seed(0x7CC);
    (0..PAGE).map(|_| fastrand::u8(..)).collect()
}

fn bench_codec(c: &mut Criterion) {
    let tuning = ScanTuning::for_device(DeviceClass::Ssd, 0);
    let shapes = [
        ("sparse", sparse_page()),
        ("ramp", ramp_page()),
        ("noise", noise_page()),
    ];

    let mut group = c.benchmark_group("tcc");
    group.throughput(Throughput::Bytes(PAGE as u64));
    for (name, src) in &shapes {
        let mut packed = vec![0u8; compress_bound(src.len())];
        group.bench_function(format!("compress/{name}"), |b| {
            b.iter(|| compress(black_box(src), &mut packed, &tuning).expect("compress"))
        });

        let n = compress(src, &mut packed, &tuning).expect("compress");
        let stream = &packed[..n];
        let mut out = vec![0u8; PAGE];
        group.bench_function(format!("decompress/{name}"), |b| {
            b.iter(|| decompress(black_box(stream), &mut out).expect("decompress"))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_codec);
criterion_main!(benches);
