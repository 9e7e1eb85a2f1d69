// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Soundness of the visibility grid: a light is listed in every cell it touches.

use murk_core::math::{Mat4, Vec2, Vec3};
use murk_core::renderer::{CameraFrame, CullRecord};
use murk_lanes::fog_lane::DepthSlicing;
use murk_lanes::render_lane::{GridLayout, VisibilityGrid, VisibilityGridLane};

fn camera() -> CameraFrame {
    CameraFrame {
        frame_id: 1,
        position: Vec3::ZERO,
        world_to_view: Mat4::IDENTITY,
        tan_half_fov: Vec2::new(1.0, 1.0),
        near: 0.1,
        far: 50.0,
        viewport: (64, 64),
        reverse_depth: false,
        elapsed_seconds: 0.0,
    }
}

/// Deterministic pseudo random sphere lights in front of the camera.
fn lights(count: usize) -> Vec<CullRecord> {
    let mut state = 0x2545_f491u32;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        state as f32 / u32::MAX as f32
    };
    (0..count)
        .map(|_| {
            let z = 1.0 + next() * 30.0;
            let x = (next() * 2.0 - 1.0) * z;
            let y = (next() * 2.0 - 1.0) * z;
            CullRecord::sphere(Vec3::new(x, y, z), 0.5 + next() * 3.0)
        })
        .collect()
}

fn assert_sound(layout: GridLayout, records: &[CullRecord]) {
    let camera = camera();
    let mut grid = VisibilityGrid::new([1, 1, 1], 1);
    let dropped = VisibilityGridLane::new(records.len()).build(records, &camera, &layout, &mut grid);
    assert_eq!(dropped, 0);

    let [w, h, d] = grid.dims();
    for z in 0..d {
        for y in 0..h {
            for x in 0..w {
                let frustum = layout.cell_frustum([x, y, z], &camera);
                let bucket = grid.cell_at(x, y, z);
                // Any light containing a cell corner must be listed.
                for (i, record) in records.iter().enumerate() {
                    let center = Vec3::new(record.pos_rad[0], record.pos_rad[1], record.pos_rad[2]);
                    let radius = record.pos_rad[3];
                    let touches = frustum
                        .corners
                        .iter()
                        .any(|corner| (*corner - center).length() < radius);
                    if touches {
                        assert!(bucket.contains(&(i as u32)), "light {i} missing from cell {x},{y},{z}");
                    }
                }
            }
        }
    }
}

#[test]
fn test_tile_grid_is_conservative() {
    let layout = GridLayout::Tiles2D {
        tile_size: 16,
        viewport: (64, 64),
    };
    assert_sound(layout, &lights(40));
}

#[test]
fn test_froxel_grid_is_conservative() {
    let layout = GridLayout::Froxels3D {
        volume: [16, 16, 32],
        cluster: [4, 4, 4],
        slicing: DepthSlicing {
            near: 0.1,
            distance: 40.0,
            slices: 32,
        },
    };
    assert_sound(layout, &lights(40));
}

#[test]
fn test_light_behind_camera_is_in_no_cell() {
    let layout = GridLayout::Tiles2D {
        tile_size: 16,
        viewport: (64, 64),
    };
    let records = [CullRecord::sphere(Vec3::new(0.0, 0.0, -10.0), 2.0)];
    let mut grid = VisibilityGrid::new([1, 1, 1], 4);
    VisibilityGridLane::new(4).build(&records, &camera(), &layout, &mut grid);
    assert!(grid.counts().iter().all(|&c| c == 0));
}
