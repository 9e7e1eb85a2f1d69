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

//! Front-to-back integration of the in-scattering volume.

use murk_core::lane::{Lane, LaneError, LaneKind, LaneWorkload};
use murk_core::math::Vec3;
use murk_core::renderer::{BufferSlot, GraphicsDevice, ResourceError};
use rayon::prelude::*;

use super::volume::VolumeBuffers;
use super::{FogFrame, FogLane, FogProgram};

/// Extinction below which a slice is treated as clear air.
const MIN_EXTINCTION: f32 = 1e-5;

/// Integrates every voxel column front to back.
///
/// For slice `z` of thickness `d` and extinction `s`, the slice transmittance
/// is `exp(-s * d)`; the accumulated light grows by the slice's in-scattered
/// light weighted by the transmittance in front of it. Each output voxel
/// holds the light accumulated up to its far edge in `rgb` and the remaining
/// transmittance in `a`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RaymarchLane;

impl RaymarchLane {
    /// Creates the lane.
    pub fn new() -> Self {
        Self
    }

    /// Uploads the integrated volume for the shading pass.
    pub fn publish(
        &self,
        volumes: &VolumeBuffers,
        device: &dyn GraphicsDevice,
    ) -> Result<(), ResourceError> {
        device.write_buffer(
            BufferSlot::ScatteringVolume,
            bytemuck::cast_slice(volumes.fog_output.as_slice()),
        )
    }
}

impl Lane for RaymarchLane {
    fn strategy_name(&self) -> &'static str {
        "FrontToBackRaymarch"
    }

    fn lane_kind(&self) -> LaneKind {
        LaneKind::Fog
    }

    fn estimate_cost(&self, workload: &LaneWorkload) -> f32 {
        workload.voxels as f32 * 0.000001
    }
}

impl FogLane for RaymarchLane {
    fn program(&self) -> FogProgram {
        FogProgram::Raymarch
    }

    fn execute(&self, frame: &mut FogFrame<'_>) -> Result<(), LaneError> {
        frame.programs.require(self.program())?;
        let slicing = frame.slicing();
        let volumes = &mut *frame.volumes;
        let [_, _, depth] = volumes.dims();
        let slice_len = volumes.fog_output.slice_len();
        if slice_len == 0 {
            return Ok(());
        }

        let scattering = volumes.scattering.current();
        let mut columns = vec![(Vec3::ZERO, 1.0f32); slice_len];
        let slices = volumes.fog_output.as_mut_slice().chunks_mut(slice_len);
        for (z, out) in slices.enumerate().take(depth as usize) {
            let (near, far) = slicing.slice_range(z as u32, z as u32 + 1);
            let thickness = (far - near).max(0.0);
            let start = z * slice_len;
            let source = &scattering.as_slice()[start..start + slice_len];
            out.par_iter_mut()
                .zip(columns.par_iter_mut())
                .zip(source.par_iter())
                .for_each(|((out, (light, transmittance)), voxel)| {
                    let extinction = voxel.w.max(0.0);
                    let slice_transmittance = (-extinction * thickness).exp();
                    let scattered = voxel.truncate() * (1.0 - slice_transmittance)
                        / extinction.max(MIN_EXTINCTION);
                    *light += scattered * *transmittance;
                    *transmittance *= slice_transmittance;
                    *out = light.extend(*transmittance);
                });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fog_lane::fixture::FogFixture;
    use approx::assert_abs_diff_eq;
    use murk_core::math::Vec4;
    use murk_core::renderer::{FogConfig, HeadlessDevice};

    fn integrated_at(volumes: &VolumeBuffers, x: u32, y: u32, z: u32) -> (Vec3, f32) {
        let v = volumes.fog_output.get(x, y, z);
        (v.truncate(), v.w)
    }

    fn fixture() -> FogFixture {
        FogFixture::new(
            (8, 8),
            FogConfig {
                volume_scale: 4,
                depth_slices: 16,
                raymarch_distance: 20.0,
                ..FogConfig::default()
            },
        )
    }

    #[test]
    fn test_clear_air_keeps_full_transmittance() {
        let mut fx = fixture();
        RaymarchLane::new().execute(&mut fx.frame()).unwrap();
        assert!(fx
            .volumes
            .fog_output
            .as_slice()
            .iter()
            .all(|v| *v == Vec4::new(0.0, 0.0, 0.0, 1.0)));
    }

    #[test]
    fn test_uniform_medium_matches_closed_form() {
        let mut fx = fixture();
        let sigma = 0.1;
        fx.volumes
            .scattering
            .current_mut()
            .fill(Vec4::new(0.2, 0.4, 0.6, sigma));
        RaymarchLane::new().execute(&mut fx.frame()).unwrap();

        let slicing = fx.frame().slicing();
        for z in [0u32, 7, 15] {
            let (_, far) = slicing.slice_range(z, z + 1);
            let expected_t = (-sigma * (far - slicing.near)).exp();
            let (light, t) = integrated_at(&fx.volumes, 1, 1, z);
            assert_abs_diff_eq!(t, expected_t, epsilon = 1e-4);
            // Telescoping sum of T * (1 - T_slice) / sigma.
            assert_abs_diff_eq!(light.x, 0.2 * (1.0 - expected_t) / sigma, epsilon = 1e-3);
            assert_abs_diff_eq!(light.z, 0.6 * (1.0 - expected_t) / sigma, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_transmittance_is_monotonic() {
        let mut fx = fixture();
        let current = fx.volumes.scattering.current_mut();
        for z in 0..16 {
            for y in 0..2 {
                for x in 0..2 {
                    current.set(x, y, z, Vec4::new(1.0, 1.0, 1.0, (z % 3) as f32 * 0.2));
                }
            }
        }
        RaymarchLane::new().execute(&mut fx.frame()).unwrap();
        let mut last = 1.0;
        for z in 0..16 {
            let (_, t) = integrated_at(&fx.volumes, 0, 1, z);
            assert!(t <= last);
            last = t;
        }
        assert!(last < 1.0);
    }

    #[test]
    fn test_missing_program_leaves_output_untouched() {
        let mut fx = fixture();
        fx.programs = fx.programs.without(FogProgram::Raymarch);
        fx.volumes.fog_output.fill(Vec4::new(1.0, 1.0, 1.0, 1.0));
        assert!(RaymarchLane::new().execute(&mut fx.frame()).is_err());
        assert_eq!(fx.volumes.fog_output.get(0, 0, 0), Vec4::new(1.0, 1.0, 1.0, 1.0));
    }

    #[test]
    fn test_publish_uploads_the_whole_volume() {
        let fx = fixture();
        let device = HeadlessDevice::new();
        RaymarchLane::new().publish(&fx.volumes, &device).unwrap();
        let bytes = device.buffer(BufferSlot::ScatteringVolume).unwrap();
        assert_eq!(bytes.len(), fx.volumes.fog_output.as_slice().len() * 16);
    }
}
