use criterion::{criterion_group, criterion_main, Criterion};
use murk_core::math::{Mat4, Vec2, Vec3};
use murk_core::renderer::{CameraFrame, CullRecord, MAX_LIGHT_RECORDS};
use murk_lanes::fog_lane::DepthSlicing;
use murk_lanes::render_lane::{GridLayout, VisibilityGrid, VisibilityGridLane};
use std::hint::black_box;

fn bench_grids(c: &mut Criterion) {
    let camera = CameraFrame {
        frame_id: 1,
        position: Vec3::ZERO,
        world_to_view: Mat4::IDENTITY,
        tan_half_fov: Vec2::new(1.0, 0.5625),
        near: 0.1,
        far: 200.0,
        viewport: (1920, 1080),
        reverse_depth: false,
        elapsed_seconds: 0.0,
    };

    // A full light list spread over the view.
    let records: Vec<CullRecord> = (0..MAX_LIGHT_RECORDS)
        .map(|i| {
            let t = i as f32 / MAX_LIGHT_RECORDS as f32;
            let z = 2.0 + t * 80.0;
            let angle = t * 37.0;
            CullRecord::sphere(Vec3::new(angle.cos() * z * 0.6, angle.sin() * z * 0.3, z), 3.0)
        })
        .collect();

    let mut group = c.benchmark_group("Visibility Grid");

    let tiles = GridLayout::Tiles2D {
        tile_size: 16,
        viewport: camera.viewport,
    };
    let mut grid = VisibilityGrid::new(tiles.cell_dims(), 128);
    let lane = VisibilityGridLane::new(128);
    group.bench_function("Tiles 16px (1080p, 255 lights)", |b| {
        b.iter(|| black_box(lane.build(&records, &camera, &tiles, &mut grid)));
    });

    let froxels = GridLayout::Froxels3D {
        volume: [240, 135, 64],
        cluster: [4, 4, 4],
        slicing: DepthSlicing {
            near: camera.near,
            distance: 64.0,
            slices: 64,
        },
    };
    let mut grid = VisibilityGrid::new(froxels.cell_dims(), 64);
    let lane = VisibilityGridLane::new(64);
    group.bench_function("Froxel clusters 4x4x4 (1080p, 255 lights)", |b| {
        b.iter(|| black_box(lane.build(&records, &camera, &froxels, &mut grid)));
    });

    group.finish();
}

criterion_group!(benches, bench_grids);
criterion_main!(benches);
