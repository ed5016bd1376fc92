//! Criterion benchmarks
//! Encode cost of characteristic planes: smooth, noisy, uniform.

use criterion::{criterion_group, criterion_main, Criterion};
use monoplane::{encode, Parameters};

fn bench_encode(c: &mut Criterion) {
    let params = Parameters::new(64, 64, 256);

    let smooth: Vec<u8> = (0..64 * 64)
        .map(|i| ((i % 64) / 2 + (i / 64) / 2) as u8)
        .collect();
    let noisy: Vec<u8> = (0..64u32 * 64)
        .map(|i| (i.wrapping_mul(2654435761) >> 19) as u8)
        .collect();
    let uniform = vec![42u8; 64 * 64];

    c.bench_function("encode_smooth_64x64", |b| {
        b.iter(|| encode(&smooth, &params, |_, _| false).unwrap())
    });
    c.bench_function("encode_noisy_64x64", |b| {
        b.iter(|| encode(&noisy, &params, |_, _| false).unwrap())
    });
    c.bench_function("encode_uniform_64x64", |b| {
        b.iter(|| encode(&uniform, &params, |_, _| false).unwrap())
    });
}

criterion_group!(benches, bench_encode);
criterion_main!(benches);
