use criterion::{criterion_group, criterion_main, Criterion, black_box};

use glam::UVec3;

use svo_builder::core::BuilderConfig;
use svo_builder::scene::{CpuBackend, SceneBuilder};
use svo_builder::voxel::svo::{FragmentEntry, OctreeLevelBuilder};

/// Fragments of a solid sphere centered in a chunk of `size`^3
fn sphere_fragments(size: u32, radius: f32) -> Vec<FragmentEntry> {
    let center = size as f32 / 2.0;
    let mut fragments = Vec::new();
    for z in 0..size {
        for y in 0..size {
            for x in 0..size {
                let d = ((x as f32 + 0.5 - center).powi(2)
                    + (y as f32 + 0.5 - center).powi(2)
                    + (z as f32 + 0.5 - center).powi(2))
                .sqrt();
                if d <= radius {
                    fragments.push(FragmentEntry::new(UVec3::new(x, y, z), 0x7F7F7F));
                }
            }
        }
    }
    fragments
}

fn bench_level_build(c: &mut Criterion, size: u32) {
    let fragments = sphere_fragments(size, size as f32 * 0.45);
    let mut builder = OctreeLevelBuilder::new(size);

    c.bench_function(&format!("octree_level_build_{}", size), |b| {
        b.iter(|| builder.build(black_box(&fragments)).unwrap());
    });
}

fn bench_octree_build_32(c: &mut Criterion) {
    bench_level_build(c, 32);
}

fn bench_octree_build_64(c: &mut Criterion) {
    bench_level_build(c, 64);
}

fn bench_octree_build_128(c: &mut Criterion) {
    bench_level_build(c, 128);
}

fn bench_cpu_scene(c: &mut Criterion) {
    let config = BuilderConfig {
        chunk_voxel_dim: 32,
        chunk_dim: [4, 2, 4],
        arena_capacity_bytes: 256 << 20,
        ..Default::default()
    };
    let backend = CpuBackend::with_terrain(&config).expect("valid config");
    let mut builder = SceneBuilder::new(config, backend).expect("valid config");

    let mut group = c.benchmark_group("scene");
    group.sample_size(10);
    group.bench_function("cpu_scene_4x2x4_32", |b| {
        b.iter(|| builder.build_scene().expect("scene fits arena"));
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_octree_build_32,
    bench_octree_build_64,
    bench_octree_build_128,
    bench_cpu_scene,
);
criterion_main!(benches);
