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

//! Occlusion-aware separable blur of the fog volumes.

use murk_core::lane::{Lane, LaneError, LaneKind, LaneWorkload};
use murk_core::math::Vec4;
use murk_core::renderer::config::MAX_BLUR_ITERATIONS;
use rayon::prelude::*;

use super::volume::{Texture2D, Volume3D};
use super::{FogFrame, FogLane, FogProgram};

/// Binomial 3-tap weights.
pub const BLUR_KERNEL: [f32; 3] = [1.0, 2.0, 1.0];

#[derive(Clone, Copy)]
enum Axis {
    X,
    Y,
}

/// Blurs every slice of `volume` along x then y using `scratch`.
///
/// A neighbour only contributes when it is on the same side of the scene
/// depth as the centre voxel, so light does not leak across silhouettes.
pub fn blur_volume(
    volume: &mut Volume3D<Vec4>,
    scratch: &mut Volume3D<Vec4>,
    max_depth: &Texture2D<f32>,
    slice_depths: &[f32],
) {
    blur_pass(volume, scratch, max_depth, slice_depths, Axis::X);
    blur_pass(scratch, volume, max_depth, slice_depths, Axis::Y);
}

fn blur_pass(
    src: &Volume3D<Vec4>,
    dst: &mut Volume3D<Vec4>,
    max_depth: &Texture2D<f32>,
    slice_depths: &[f32],
    axis: Axis,
) {
    let [w, h, _] = src.dims();
    let slice_len = src.slice_len();
    if slice_len == 0 {
        return;
    }
    dst.as_mut_slice()
        .par_chunks_mut(slice_len)
        .enumerate()
        .for_each(|(z, slice)| {
            let z = z as u32;
            let depth = slice_depths[z as usize];
            let occluded = |x: u32, y: u32| depth > max_depth.get(x, y);
            for (i, out) in slice.iter_mut().enumerate() {
                let (x, y) = (i as u32 % w, i as u32 / w);
                let center_occluded = occluded(x, y);
                let mut sum = Vec4::ZERO;
                let mut weight = 0.0;
                for (tap, &k) in BLUR_KERNEL.iter().enumerate() {
                    let offset = tap as i64 - 1;
                    let (nx, ny) = match axis {
                        Axis::X => (i64::from(x) + offset, i64::from(y)),
                        Axis::Y => (i64::from(x), i64::from(y) + offset),
                    };
                    if nx < 0 || ny < 0 || nx >= i64::from(w) || ny >= i64::from(h) {
                        continue;
                    }
                    let (nx, ny) = (nx as u32, ny as u32);
                    if occluded(nx, ny) != center_occluded {
                        continue;
                    }
                    sum += src.get(nx, ny, z) * k;
                    weight += k;
                }
                *out = sum / weight;
            }
        });
}

/// Runs the configured number of blur iterations over the current
/// in-scattering volume, and over density in legacy mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlurLane;

impl BlurLane {
    /// Creates the lane.
    pub fn new() -> Self {
        Self
    }
}

impl Lane for BlurLane {
    fn strategy_name(&self) -> &'static str {
        "SeparableVolumeBlur"
    }

    fn lane_kind(&self) -> LaneKind {
        LaneKind::Fog
    }

    fn estimate_cost(&self, workload: &LaneWorkload) -> f32 {
        workload.voxels as f32 * 0.000001
    }
}

impl FogLane for BlurLane {
    fn program(&self) -> FogProgram {
        FogProgram::Blur
    }

    fn execute(&self, frame: &mut FogFrame<'_>) -> Result<(), LaneError> {
        frame.programs.require(self.program())?;
        let iterations = frame.config.blur_iterations.min(MAX_BLUR_ITERATIONS);
        if iterations == 0 {
            return Ok(());
        }
        let slicing = frame.slicing();
        let slice_depths: Vec<f32> = (0..slicing.slices).map(|z| slicing.slice_center(z)).collect();

        let volumes = &mut *frame.volumes;
        let legacy = volumes.is_legacy();
        for _ in 0..iterations {
            blur_volume(
                volumes.scattering.current_mut(),
                &mut volumes.blur_scratch,
                &volumes.max_depth,
                &slice_depths,
            );
            if legacy {
                blur_volume(
                    volumes.density.current_mut(),
                    &mut volumes.blur_scratch,
                    &volumes.max_depth,
                    &slice_depths,
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fog_lane::fixture::FogFixture;
    use approx::assert_abs_diff_eq;
    use murk_core::renderer::FogConfig;

    fn spike_volume() -> Volume3D<Vec4> {
        let mut v = Volume3D::new([3, 3, 1]);
        v.set(1, 1, 0, Vec4::new(16.0, 0.0, 0.0, 16.0));
        v
    }

    #[test]
    fn test_spike_spreads_with_binomial_weights() {
        let mut volume = spike_volume();
        let mut scratch = Volume3D::new([3, 3, 1]);
        let open = Texture2D::filled(3, 3, f32::MAX);
        blur_volume(&mut volume, &mut scratch, &open, &[1.0]);
        // Inner taps weigh 4 in total, edge taps 3.
        assert_abs_diff_eq!(volume.get(1, 1, 0).x, 16.0 * 2.0 / 4.0 * 2.0 / 4.0);
        assert_abs_diff_eq!(volume.get(0, 1, 0).x, 16.0 / 3.0 * 2.0 / 4.0);
        assert_abs_diff_eq!(volume.get(0, 0, 0).x, 16.0 / 3.0 / 3.0);
    }

    #[test]
    fn test_blur_does_not_cross_occlusion_boundary() {
        let mut volume = spike_volume();
        let mut scratch = Volume3D::new([3, 3, 1]);
        // Column x = 0 is occluded at the slice depth.
        let mut depth = Texture2D::filled(3, 3, f32::MAX);
        for y in 0..3 {
            depth.set(0, y, 0.5);
        }
        blur_volume(&mut volume, &mut scratch, &depth, &[1.0]);
        for y in 0..3 {
            assert_eq!(volume.get(0, y, 0).x, 0.0);
        }
        assert!(volume.get(2, 1, 0).x > 0.0);
    }

    #[test]
    fn test_zero_iterations_is_a_no_op() {
        let mut fx = FogFixture::new(
            (16, 16),
            FogConfig {
                blur_iterations: 0,
                ..FogConfig::default()
            },
        );
        fx.volumes
            .scattering
            .current_mut()
            .set(0, 0, 0, Vec4::new(1.0, 1.0, 1.0, 1.0));
        BlurLane::new().execute(&mut fx.frame()).unwrap();
        assert_eq!(
            fx.volumes.scattering.current().get(0, 0, 0),
            Vec4::new(1.0, 1.0, 1.0, 1.0)
        );
    }
}
