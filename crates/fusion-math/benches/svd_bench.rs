// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — SVD Benchmarks
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use criterion::{criterion_group, criterion_main, Criterion};
use fusion_math::linalg::{jacobi_svd, null_space};
use ndarray::Array2;
use std::hint::black_box;

fn test_matrix(m: usize, n: usize) -> Array2<f64> {
    Array2::from_shape_fn((m, n), |(i, j)| ((i * 7 + j * 3) as f64 * 0.37).sin())
}

fn bench_svd_tall(c: &mut Criterion) {
    let a = test_matrix(120, 30);
    c.bench_function("jacobi_svd_120x30", |b| {
        b.iter(|| {
            let svd = jacobi_svd(black_box(&a));
            black_box(svd.s[0]);
        })
    });
}

fn bench_null_space_wide(c: &mut Criterion) {
    let a = test_matrix(12, 40);
    c.bench_function("null_space_12x40", |b| {
        b.iter(|| {
            let z = null_space(black_box(&a));
            black_box(z.ncols());
        })
    });
}

criterion_group!(benches, bench_svd_tall, bench_null_space_wide);
criterion_main!(benches);
