//! Kernel benchmarks: dispatched SIMD paths vs scalar reference

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use pf_dsp::simd::{self, scalar};

fn make_buffer(len: usize) -> Vec<f32> {
    (0..len).map(|i| ((i as f32) * 0.37).sin()).collect()
}

fn bench_sum(c: &mut Criterion) {
    let buf = make_buffer(4096);
    c.bench_function("sum_dispatched_4096", |b| {
        b.iter(|| simd::sum(black_box(&buf)))
    });
    c.bench_function("sum_scalar_4096", |b| {
        b.iter(|| scalar::sum(black_box(&buf)))
    });
}

fn bench_sum_of_squares(c: &mut Criterion) {
    let buf = make_buffer(4096);
    c.bench_function("sum_of_squares_dispatched_4096", |b| {
        b.iter(|| simd::sum_of_squares(black_box(&buf)))
    });
    c.bench_function("sum_of_squares_scalar_4096", |b| {
        b.iter(|| scalar::sum_of_squares(black_box(&buf)))
    });
}

fn bench_rectify(c: &mut Criterion) {
    let buf = make_buffer(4096);
    c.bench_function("abs_inplace_dispatched_4096", |b| {
        b.iter_batched(
            || buf.clone(),
            |mut chunk| simd::abs_inplace(black_box(&mut chunk)),
            criterion::BatchSize::SmallInput,
        )
    });
}

fn bench_dot_product(c: &mut Criterion) {
    let a = make_buffer(512);
    let b_taps = make_buffer(512);
    c.bench_function("dot_product_dispatched_512", |b| {
        b.iter(|| simd::dot_product(black_box(&a), black_box(&b_taps)))
    });
}

criterion_group!(benches, bench_sum, bench_sum_of_squares, bench_rectify, bench_dot_product);
criterion_main!(benches);
