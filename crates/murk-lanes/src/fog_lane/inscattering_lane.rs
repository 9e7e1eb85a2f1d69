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

//! Light accumulation into the in-scattering volume.
//!
//! Each voxel walks the light bucket of its fog cluster and sums the light
//! reaching it, weighted by a Henyey-Greenstein phase function. Lights carry
//! their own phase lobe in the shade record's colour `w`; zero selects the
//! configured anisotropy.

use murk_core::lane::{Lane, LaneError, LaneKind, LaneWorkload};
use murk_core::math::{saturate, Vec3, Vec4, PI};
use murk_core::renderer::{LightKind, ShadeRecord};
use rayon::prelude::*;

use super::volume::{SunShadowMap, VoxelMapping};
use super::{FogFrame, FogLane, FogProgram};

const MIN_BULB_SIZE: f32 = 0.001;
const PROJECTOR_EDGE_SHARPNESS: f32 = 8.0;

/// Henyey-Greenstein phase function for anisotropy `g`.
pub fn henyey_greenstein(g: f32, cos_theta: f32) -> f32 {
    let g2 = g * g;
    let denom = (1.0 + g2 - 2.0 * g * cos_theta).max(1e-6);
    (1.0 - g2) / (4.0 * PI * denom * denom.sqrt())
}

/// Inverse-square falloff around an emitter of size `bulb`, windowed to
/// reach zero at `radius`.
pub fn distance_attenuation(distance: f32, radius: f32, bulb: f32) -> f32 {
    if distance >= radius || radius <= 0.0 {
        return 0.0;
    }
    let base = 1.0 / (1.0 + distance / bulb.max(MIN_BULB_SIZE)).powi(2);
    let ratio = distance / radius;
    let window = saturate(1.0 - ratio * ratio * ratio * ratio);
    base * window * window
}

/// Index of the cube face seen in direction `dir`, ordered +X, -X, +Y, -Y, +Z, -Z.
pub fn cube_face(dir: Vec3) -> u32 {
    let a = dir.abs();
    if a.x >= a.y && a.x >= a.z {
        u32::from(dir.x < 0.0)
    } else if a.y >= a.z {
        2 + u32::from(dir.y < 0.0)
    } else {
        4 + u32::from(dir.z < 0.0)
    }
}

/// Per-voxel inputs shared by every light.
struct Sample<'a> {
    /// Camera-relative voxel position.
    rel: Vec3,
    /// World voxel position.
    world: Vec3,
    /// Unit direction from the camera to the voxel.
    view_dir: Vec3,
    default_g: f32,
    sun_shadow: Option<&'a SunShadowMap>,
}

impl Sample<'_> {
    fn phase(&self, shade: &ShadeRecord, to_light: Vec3) -> f32 {
        let lobe = shade.color[3];
        let g = if lobe != 0.0 { lobe } else { self.default_g };
        henyey_greenstein(g, self.view_dir.dot(to_light))
    }
}

/// Radiance reaching `sample` from one light, already phase-weighted.
fn light_contribution(shade: &ShadeRecord, sample: &Sample<'_>) -> Vec3 {
    let color = Vec3::new(shade.color[0], shade.color[1], shade.color[2]);
    let Some(kind) = shade.kind() else {
        return Vec3::ZERO;
    };
    let light_rel = Vec3::new(shade.pos_rad[0], shade.pos_rad[1], shade.pos_rad[2]);
    let radius = shade.pos_rad[3];

    match kind {
        LightKind::Sun => {
            let to_light = light_rel.normalize();
            let visibility = sample
                .sun_shadow
                .map_or(1.0, |map| map.visibility(sample.world));
            color * (visibility * sample.phase(shade, to_light))
        }
        LightKind::Probe => {
            let p = shade.projector().transform_point3(sample.rel);
            let d = p.abs().max_element();
            if d > 1.0 {
                return Vec3::ZERO;
            }
            let falloff = saturate((1.0 - d) / shade.attenuation_params[0].max(1e-3));
            color * (falloff / (4.0 * PI))
        }
        _ => {
            let offset = light_rel - sample.rel;
            let distance = offset.length();
            let mut attenuation =
                distance_attenuation(distance, radius, shade.attenuation_params[0]);
            if attenuation <= 0.0 {
                return Vec3::ZERO;
            }
            let to_light = offset / distance.max(1e-6);
            match kind {
                LightKind::AmbientProjector | LightKind::RegularProjector => {
                    let p = shade.projector() * sample.rel.extend(1.0);
                    if p.w <= 0.0 {
                        return Vec3::ZERO;
                    }
                    let (u, v) = (p.x / p.w, p.y / p.w);
                    let edge = u.min(1.0 - u).min(v).min(1.0 - v);
                    attenuation *= saturate(edge * PROJECTOR_EDGE_SHARPNESS);
                }
                LightKind::RegularPointFace => {
                    if cube_face(-to_light) != shade.atlas_slot {
                        return Vec3::ZERO;
                    }
                }
                LightKind::AmbientArea | LightKind::RegularArea => {
                    let facing = shade.projector().transform_point3(sample.rel).x / distance.max(1e-6);
                    if facing < shade.attenuation_params[1] {
                        return Vec3::ZERO;
                    }
                    attenuation *= saturate(facing);
                }
                _ => {}
            }
            color * (attenuation * sample.phase(shade, to_light))
        }
    }
}

/// Fills the current in-scattering volume: `rgb` is albedo times density
/// times the summed light, `a` is the density. Voxels behind the scene
/// depth of their column receive no light.
#[derive(Debug, Default, Clone, Copy)]
pub struct InScatteringLane;

impl InScatteringLane {
    /// Creates the lane.
    pub fn new() -> Self {
        Self
    }
}

impl Lane for InScatteringLane {
    fn strategy_name(&self) -> &'static str {
        "ClusteredInScattering"
    }

    fn lane_kind(&self) -> LaneKind {
        LaneKind::Fog
    }

    fn estimate_cost(&self, workload: &LaneWorkload) -> f32 {
        let voxels = workload.voxels as f32;
        voxels * 0.000004 + voxels * workload.lights as f32 * 0.0000002
    }
}

impl FogLane for InScatteringLane {
    fn program(&self) -> FogProgram {
        FogProgram::InScattering
    }

    fn execute(&self, frame: &mut FogFrame<'_>) -> Result<(), LaneError> {
        frame.programs.require(self.program())?;
        let grid = frame.grid.ok_or_else(|| LaneError::missing("fog light grid"))?;
        let dims = frame.volumes.dims();
        let mapping = VoxelMapping::new(frame.camera, frame.slicing(), dims).ok_or_else(|| {
            LaneError::InvalidInput {
                expected: "invertible camera transform",
                received: format!("{:?}", frame.camera.world_to_view),
            }
        })?;
        let cluster = frame.cluster.map(|c| c.max(1));
        let grid_dims = grid.dims();
        let expected = [0, 1, 2].map(|i| dims[i].div_ceil(cluster[i]));
        if grid_dims != expected {
            return Err(LaneError::InvalidInput {
                expected: "fog grid matching the volume clusters",
                received: format!("{grid_dims:?}, expected {expected:?}"),
            });
        }

        let shade_records = frame.shade_records;
        let camera_position = frame.camera.position;
        let default_g = frame.config.anisotropy;
        let volumes = &mut *frame.volumes;
        let density = volumes.density.current();
        let max_depth = &volumes.max_depth;
        let sun_shadow = volumes.sun_shadow.as_ref();
        let target = volumes.scattering.current_mut();
        let slice_len = target.slice_len();
        if slice_len == 0 {
            return Ok(());
        }

        target
            .as_mut_slice()
            .par_chunks_mut(slice_len)
            .enumerate()
            .for_each(|(z, slice)| {
                let z = z as u32;
                let slice_depth = mapping.slice_depth(z);
                for (i, out) in slice.iter_mut().enumerate() {
                    let (x, y) = (i as u32 % dims[0], i as u32 / dims[0]);
                    let medium = density.get(x, y, z);
                    if medium.w <= 0.0 || slice_depth > max_depth.get(x, y) {
                        *out = Vec4::new(0.0, 0.0, 0.0, medium.w);
                        continue;
                    }
                    let world = mapping.world_position(x, y, z);
                    let rel = world - camera_position;
                    let sample = Sample {
                        rel,
                        world,
                        view_dir: rel.normalize(),
                        default_g,
                        sun_shadow,
                    };
                    let bucket = grid.cell_at(x / cluster[0], y / cluster[1], z / cluster[2]);
                    let light = bucket
                        .iter()
                        .filter_map(|&index| shade_records.get(index as usize))
                        .fold(Vec3::ZERO, |acc, shade| acc + light_contribution(shade, &sample));
                    let albedo = medium.truncate();
                    *out = albedo.mul_elements(light).extend(1.0) * medium.w;
                }
            });
        Ok(())
    }
}
