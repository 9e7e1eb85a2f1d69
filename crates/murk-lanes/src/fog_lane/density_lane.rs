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

//! Fog density injection.

use murk_core::lane::{Lane, LaneError, LaneKind, LaneWorkload};
use murk_core::math::{saturate, Mat4, Vec3, Vec4};
use murk_core::renderer::{DensityInjectionMode, FogVolumeShape, HeightFogParams};
use rayon::prelude::*;

use super::clip_stencil::ClipVolumeStencil;
use super::fog_volume_list::FogVolumeInjectRecord;
use super::volume::VoxelMapping;
use super::{FogFrame, FogLane, FogProgram};

/// Upper bound of the exponent in height falloff terms.
const MAX_FALLOFF_EXPONENT: f32 = 80.0;

/// Integer lattice hash mapped to `[0, 1]`.
fn lattice_hash(x: i32, y: i32, z: i32) -> f32 {
    let mut h = (x as u32).wrapping_mul(0x8da6_b343)
        ^ (y as u32).wrapping_mul(0xd816_3841)
        ^ (z as u32).wrapping_mul(0xcb1a_b31f);
    h ^= h >> 13;
    h = h.wrapping_mul(0x5bd1_e995);
    h ^= h >> 15;
    h as f32 / u32::MAX as f32
}

/// Smooth 3D value noise in `[0, 1]`.
pub fn value_noise(p: Vec3) -> f32 {
    let cell = [p.x.floor(), p.y.floor(), p.z.floor()];
    let f = [p.x - cell[0], p.y - cell[1], p.z - cell[2]].map(|t| t * t * (3.0 - 2.0 * t));
    let [ix, iy, iz] = cell.map(|c| c as i32);
    let corner = |dx: i32, dy: i32, dz: i32| lattice_hash(ix + dx, iy + dy, iz + dz);
    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    let x00 = lerp(corner(0, 0, 0), corner(1, 0, 0), f[0]);
    let x10 = lerp(corner(0, 1, 0), corner(1, 1, 0), f[0]);
    let x01 = lerp(corner(0, 0, 1), corner(1, 0, 1), f[0]);
    let x11 = lerp(corner(0, 1, 1), corner(1, 1, 1), f[0]);
    lerp(lerp(x00, x10, f[1]), lerp(x01, x11, f[1]), f[2])
}

/// Exponential height fog density at `world`.
pub fn height_fog_density(params: &HeightFogParams, world: Vec3) -> f32 {
    let exponent = (-params.falloff * (world.y - params.base_height)).min(MAX_FALLOFF_EXPONENT);
    params.density * exponent.exp()
}

/// Density contributed by one local fog volume at `world`, before colour
/// blending. `eye_distance` is the camera distance driving the ramp.
pub fn fog_volume_density(
    record: &FogVolumeInjectRecord,
    world_to_object: &Mat4,
    world: Vec3,
    eye_distance: f32,
) -> f32 {
    let p = world_to_object.transform_point3(world);
    let shape_distance = match record.shape() {
        FogVolumeShape::Ellipsoid => p.length(),
        FogVolumeShape::Box => p.abs().max_element(),
    };
    if shape_distance > 1.0 {
        return 0.0;
    }
    let edge = saturate((1.0 - shape_distance) * record.inv_soft_edge);

    let falloff_dir = Vec3::from(record.height_falloff_dir);
    let base = Vec3::from(record.height_falloff_base);
    let exponent = (-(world - base).dot(falloff_dir)).min(MAX_FALLOFF_EXPONENT);
    let mut density = record.global_density * exponent.exp() + record.density_offset;

    let [inv_distance, offset, influence, rest] = record.ramp_params;
    density *= saturate(eye_distance * inv_distance + offset) * influence + rest;

    if record.noise_scale > 0.0 {
        let q = (world - Vec3::from(record.wind_offset))
            .mul_elements(Vec3::from(record.noise_frequency));
        let n = value_noise(q) * 2.0 - 1.0;
        density *= (1.0 + record.noise_scale * (n + record.noise_offset)).max(0.0);
    }
    (density * edge).max(0.0)
}

/// Writes albedo (`rgb`) and extinction (`a`) into the current density
/// volume, from height fog or from the prepared local fog volumes.
#[derive(Debug, Default, Clone, Copy)]
pub struct DensityInjectionLane;

impl DensityInjectionLane {
    /// Creates the lane.
    pub fn new() -> Self {
        Self
    }
}

impl Lane for DensityInjectionLane {
    fn strategy_name(&self) -> &'static str {
        "FogDensityInjection"
    }

    fn lane_kind(&self) -> LaneKind {
        LaneKind::Fog
    }

    fn estimate_cost(&self, workload: &LaneWorkload) -> f32 {
        workload.voxels as f32 * 0.000004
    }
}

impl FogLane for DensityInjectionLane {
    fn program(&self) -> FogProgram {
        FogProgram::DensityInjection
    }

    fn execute(&self, frame: &mut FogFrame<'_>) -> Result<(), LaneError> {
        frame.programs.require(self.program())?;
        let dims = frame.volumes.dims();
        let mapping = VoxelMapping::new(frame.camera, frame.slicing(), dims).ok_or_else(|| {
            LaneError::InvalidInput {
                expected: "invertible camera transform",
                received: format!("{:?}", frame.camera.world_to_view),
            }
        })?;
        let eye = frame.camera.position;
        let mode = frame.config.injection_mode;
        let height_fog = frame.config.height_fog;
        let albedo = height_fog.albedo.to_vec3();
        let fog_volumes: Vec<(FogVolumeInjectRecord, Mat4)> = frame
            .fog_volumes
            .iter()
            .map(|r| (*r, r.world_to_object()))
            .collect();

        let stencil = &frame.volumes.stencil;
        let density = frame.volumes.density.current_mut();
        let slice_len = density.slice_len();
        if slice_len == 0 {
            return Ok(());
        }
        density
            .as_mut_slice()
            .par_chunks_mut(slice_len)
            .enumerate()
            .for_each(|(z, slice)| {
                let z = z as u32;
                for (i, voxel) in slice.iter_mut().enumerate() {
                    let x = i as u32 % dims[0];
                    let y = i as u32 / dims[0];
                    let world = mapping.world_position(x, y, z);
                    *voxel = match mode {
                        DensityInjectionMode::HeightFog => {
                            albedo.extend(height_fog_density(&height_fog, world))
                        }
                        DensityInjectionMode::LocalVolumes => {
                            local_volumes_at(&fog_volumes, stencil, [x, y, z], world, eye)
                        }
                    };
                }
            });
        Ok(())
    }
}

fn local_volumes_at(
    volumes: &[(FogVolumeInjectRecord, Mat4)],
    stencil: &ClipVolumeStencil,
    voxel: [u32; 3],
    world: Vec3,
    eye: Vec3,
) -> Vec4 {
    let eye_distance = (world - eye).length();
    let voxel_stencil = stencil.get(voxel[0], voxel[1], voxel[2]);
    let mut total = 0.0;
    let mut color = Vec3::ZERO;
    for (record, world_to_object) in volumes {
        if record.affects_this_area_only() && voxel_stencil != record.encoded_stencil_ref() {
            continue;
        }
        let d = fog_volume_density(record, world_to_object, world, eye_distance);
        if d > 0.0 {
            total += d;
            color += Vec3::from(record.fog_color) * d;
        }
    }
    if total > 0.0 {
        (color / total).extend(total)
    } else {
        Vec4::ZERO
    }
}
