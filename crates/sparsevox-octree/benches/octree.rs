use criterion::{black_box, criterion_group, criterion_main, Criterion};
use glam::{DVec3, IVec3, Vec3};

use sparsevox_core::Ray;
use sparsevox_octree::SparseVirtualizedVoxelOctree;

fn large_octree() -> SparseVirtualizedVoxelOctree {
    SparseVirtualizedVoxelOctree::new(DVec3::ZERO, Vec3::new(90.0, 30.0, 90.0), 0.1, 0)
        .expect("valid volume")
}

fn bench_set_sphere(c: &mut Criterion) {
    c.bench_function("set_sphere_r3_2048", |b| {
        b.iter(|| {
            let mut octree = large_octree();
            octree.set_sphere(black_box(DVec3::ZERO), black_box(3.0), 200)
        });
    });
}

fn bench_set_scattered(c: &mut Criterion) {
    let mut octree =
        SparseVirtualizedVoxelOctree::new(DVec3::ZERO, Vec3::splat(64.0), 1.0, 4096).unwrap();
    c.bench_function("set_toggle_128", |b| {
        let mut value = 0u8;
        b.iter(|| {
            value ^= 1;
            octree.set(black_box(IVec3::new(37, 90, 12)), value).unwrap()
        });
    });
}

fn bench_get(c: &mut Criterion) {
    let mut octree = large_octree();
    octree.set_sphere(DVec3::ZERO, 3.0, 200);
    c.bench_function("get_world_inside_sphere", |b| {
        b.iter(|| octree.get_world(black_box(DVec3::new(1.0, 0.5, -0.25))));
    });
}

fn bench_cast_ray(c: &mut Criterion) {
    let mut octree = large_octree();
    octree.set_sphere(DVec3::ZERO, 3.0, 200);
    let hit = Ray::towards(DVec3::new(1.0, 10.0, 1.0), DVec3::ZERO);
    let miss = Ray::new(DVec3::new(20.0, 10.0, -20.0), DVec3::new(0.3, 1.0, 0.2));

    c.bench_function("cast_ray_hit_sphere", |b| {
        b.iter(|| octree.cast_ray(black_box(&hit)));
    });
    c.bench_function("cast_ray_empty_space", |b| {
        b.iter(|| octree.cast_ray(black_box(&miss)));
    });
}

criterion_group!(
    benches,
    bench_set_sphere,
    bench_set_scattered,
    bench_get,
    bench_cast_ray
);
criterion_main!(benches);
