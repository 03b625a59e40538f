use criterion::{criterion_group, criterion_main, black_box, Criterion};

use strata::core::config::StreamingConfig;
use strata::point_cloud::{Octree, Point};

use glam::Vec3;

fn sample_points(n: usize) -> Vec<Point> {
    (0..n)
        .map(|i| {
            let t = i as f32 * 0.013;
            Point::new(
                [t.sin() * 20.0, (i as f32 * 0.002).cos() * 20.0, t.cos() * 20.0],
                1.0,
                [0.5, 0.5, 0.5],
            )
        })
        .collect()
}

fn bench_octree_build_10k(c: &mut Criterion) {
    c.bench_function("octree_build_10k", |b| {
        b.iter_batched(
            || (sample_points(10_000), tempfile::tempdir().unwrap()),
            |(points, dir)| {
                let streaming = StreamingConfig::default();
                let tree = Octree::build(black_box(points), dir.path(), &streaming).unwrap();
                black_box(tree);
            },
            criterion::BatchSize::LargeInput,
        );
    });
}

fn bench_octree_build_100k(c: &mut Criterion) {
    c.bench_function("octree_build_100k", |b| {
        b.iter_batched(
            || (sample_points(100_000), tempfile::tempdir().unwrap()),
            |(points, dir)| {
                let streaming = StreamingConfig::default();
                let tree = Octree::build(black_box(points), dir.path(), &streaming).unwrap();
                black_box(tree);
            },
            criterion::BatchSize::LargeInput,
        );
    });
}

fn bench_render_visible(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let streaming = StreamingConfig::default();
    let lod = strata::core::config::LodConfig::default();
    let mut tree = Octree::build(sample_points(20_000), dir.path(), &streaming).unwrap();

    c.bench_function("octree_render_visible", |b| {
        b.iter(|| {
            let items = tree.render_visible(black_box(Vec3::ZERO), &lod, 2.0);
            black_box(items);
        });
    });
}

criterion_group!(benches, bench_octree_build_10k, bench_octree_build_100k, bench_render_visible);
criterion_main!(benches);
