//! Blob counter benchmarks over synthetic half-resolution frames.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use opensight_vision::{BlobCounter, GrayImage};

/// Thresholded 320x240 image with a rectangular border outline, the shape
/// the frame processor hands to the counter every frame.
fn border_image() -> GrayImage {
    let mut img = GrayImage::new(320, 240);
    for x in 60..=260 {
        for t in 0..4 {
            img.set(x, 60 + t, 255);
            img.set(x, 180 - t, 255);
        }
    }
    for y in 60..=180 {
        for t in 0..4 {
            img.set(60 + t, y, 255);
            img.set(260 - t, y, 255);
        }
    }
    img
}

fn bench_blob_counter(c: &mut Criterion) {
    let img = border_image();

    c.bench_function("label_border_frame", |b| {
        let mut counter = BlobCounter::new();
        counter.coupled_size_filtering = true;
        counter.min_width = 15;
        counter.min_height = 15;
        b.iter(|| {
            counter.process(black_box(&img.as_view())).unwrap();
            black_box(counter.blobs().len())
        })
    });

    c.bench_function("edge_points", |b| {
        let mut counter = BlobCounter::new();
        counter.coupled_size_filtering = true;
        counter.min_width = 15;
        counter.min_height = 15;
        counter.process(&img.as_view()).unwrap();
        let blob = counter.blobs()[0].clone();
        b.iter(|| black_box(counter.blob_edge_points(&blob).unwrap().len()))
    });
}

criterion_group!(benches, bench_blob_counter);
criterion_main!(benches);
