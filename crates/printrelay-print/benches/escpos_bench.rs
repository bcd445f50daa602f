// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for ESC/POS rasterization in the printrelay-print
// crate.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use image::{DynamicImage, Rgb, RgbImage};

use printrelay_print::escpos::{encode_receipt, rasterize, resize_to_width};

/// A receipt-shaped test image: dark text-like stripes on white.
fn receipt(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        if (y / 12) % 2 == 0 && x % 7 < 4 {
            Rgb([20, 20, 20])
        } else {
            Rgb([250, 250, 250])
        }
    }))
}

fn bench_rasterize(c: &mut Criterion) {
    let img = receipt(384, 1200);
    c.bench_function("rasterize (384x1200)", |b| {
        b.iter(|| rasterize(black_box(&img)))
    });
}

fn bench_resize(c: &mut Criterion) {
    let img = receipt(800, 2500);
    c.bench_function("resize_to_width (800 -> 384)", |b| {
        b.iter(|| resize_to_width(black_box(&img), 384))
    });
}

fn bench_encode_receipt(c: &mut Criterion) {
    let img = receipt(576, 2000);
    c.bench_function("encode_receipt (576x2000 -> 576)", |b| {
        b.iter(|| encode_receipt(black_box(&img), 576))
    });
}

criterion_group!(benches, bench_rasterize, bench_resize, bench_encode_receipt);
criterion_main!(benches);
