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

//! Temporal reprojection of the in-scattering volume.
//!
//! The previous frame's result is resampled at the position each voxel had
//! in the previous frame's volume and blended with the current result.
//! History is only used once it has been built up over several frames
//! without a discontinuity; until then the pass bypasses blending.

use murk_core::lane::{Lane, LaneError, LaneKind, LaneWorkload};
use murk_core::math::{Mat4, Vec3, Vec4};
use murk_core::renderer::{CameraFrame, FogConfig};
use rayon::prelude::*;

use super::volume::{DepthSlicing, Volume3D, VoxelMapping};
use super::{FogFrame, FogLane, FogProgram};

/// Frames of camera history kept, and frames of bypass before history is trusted.
pub const MAX_FRAME_NUM: usize = 4;
/// Raymarch distance change that invalidates history.
pub const RAYMARCH_DISTANCE_TOLERANCE: f32 = 0.2;

/// How far the temporal history can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HistoryTrust {
    /// No usable history.
    #[default]
    Cold,
    /// History is being rebuilt; the value counts the frames still to wait.
    Warming(u8),
    /// History can be blended.
    Warm,
}

impl HistoryTrust {
    /// State after one more frame of the reprojection pass.
    pub fn advance(self) -> Self {
        match self {
            HistoryTrust::Cold => HistoryTrust::Warming(MAX_FRAME_NUM as u8 - 1),
            HistoryTrust::Warming(n) if n <= 1 => HistoryTrust::Warm,
            HistoryTrust::Warming(n) => HistoryTrust::Warming(n - 1),
            HistoryTrust::Warm => HistoryTrust::Warm,
        }
    }

    /// Whether blending is allowed.
    pub fn is_warm(self) -> bool {
        self == HistoryTrust::Warm
    }
}

/// Camera state a frame's volume was produced with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryFrame {
    /// World to clip transform, linear depth in `w`.
    pub view_projection: Mat4,
    /// Depth distribution of the volume.
    pub slicing: DepthSlicing,
}

/// Camera history ring and trust state of the reprojection pass.
#[derive(Debug, Clone, Default)]
pub struct ReprojectionState {
    ring: [Option<HistoryFrame>; MAX_FRAME_NUM],
    frame_index: usize,
    trust: HistoryTrust,
    reverse_depth: Option<bool>,
    raymarch_distance: Option<f32>,
    bypassed: bool,
}

impl ReprojectionState {
    /// Fresh state with no history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current trust state.
    pub fn trust(&self) -> HistoryTrust {
        self.trust
    }

    /// Whether the last run of the pass passed the current volume through.
    pub fn was_bypassed(&self) -> bool {
        self.bypassed
    }

    /// Drops every history. The next run starts cold.
    pub fn invalidate(&mut self) {
        self.ring = [None; MAX_FRAME_NUM];
        self.trust = HistoryTrust::Cold;
    }

    /// Checks this frame's inputs against the last seen ones and invalidates
    /// history on a discontinuity. Returns whether one was found.
    ///
    /// Discontinuities are a volume reallocation, a reverse-depth toggle and
    /// a raymarch distance change beyond [`RAYMARCH_DISTANCE_TOLERANCE`].
    pub fn observe(&mut self, camera: &CameraFrame, config: &FogConfig, reallocated: bool) -> bool {
        let depth_toggled = self
            .reverse_depth
            .is_some_and(|previous| previous != camera.reverse_depth);
        let distance_changed = self.raymarch_distance.is_some_and(|previous| {
            (previous - config.raymarch_distance).abs() > RAYMARCH_DISTANCE_TOLERANCE
        });
        self.reverse_depth = Some(camera.reverse_depth);
        self.raymarch_distance = Some(config.raymarch_distance);

        let discontinuity = reallocated || depth_toggled || distance_changed;
        if discontinuity {
            log::debug!(
                "Fog history reset (reallocated: {}, depth toggled: {}, distance changed: {})",
                reallocated,
                depth_toggled,
                distance_changed
            );
            self.invalidate();
        }
        discontinuity
    }

    /// The camera state of the previous frame, if any.
    pub fn previous_frame(&self) -> Option<&HistoryFrame> {
        let previous = (self.frame_index + MAX_FRAME_NUM - 1) % MAX_FRAME_NUM;
        self.ring[previous].as_ref()
    }

    fn record(&mut self, frame: HistoryFrame) {
        self.ring[self.frame_index] = Some(frame);
        self.frame_index = (self.frame_index + 1) % MAX_FRAME_NUM;
        self.trust = self.trust.advance();
    }
}

/// Blend weight of the history for a configured factor in `[0, 1]`.
#[inline]
pub fn history_weight(blend_factor: f32) -> f32 {
    0.5 * blend_factor.clamp(0.0, 1.0)
}

/// Normalised volume coordinates of `world` in a volume produced with `history`.
fn history_coords(history: &HistoryFrame, world: Vec3) -> Option<Vec3> {
    let clip = history.view_projection * world.extend(1.0);
    if clip.w <= 0.0 {
        return None;
    }
    Some(Vec3::new(
        (clip.x / clip.w) * 0.5 + 0.5,
        0.5 - (clip.y / clip.w) * 0.5,
        history.slicing.coord_of(clip.w),
    ))
}

/// Blends the current in-scattering volume with the reprojected previous
/// result: `current * (1 - w) + history * w`, with `w` half the configured
/// factor. Voxels that were outside the previous volume keep their current
/// value. In legacy mode density is reprojected the same way.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReprojectionLane;

impl ReprojectionLane {
    /// Creates the lane.
    pub fn new() -> Self {
        Self
    }
}

fn reproject(
    current: &mut Volume3D<Vec4>,
    previous: &Volume3D<Vec4>,
    mapping: &VoxelMapping,
    history: &HistoryFrame,
    weight: f32,
) {
    let [w, _, _] = current.dims();
    let slice_len = current.slice_len();
    if slice_len == 0 || previous.dims() != current.dims() {
        return;
    }
    current
        .as_mut_slice()
        .par_chunks_mut(slice_len)
        .enumerate()
        .for_each(|(z, slice)| {
            for (i, voxel) in slice.iter_mut().enumerate() {
                let (x, y) = (i as u32 % w, i as u32 / w);
                let world = mapping.world_position(x, y, z as u32);
                let sample = history_coords(history, world)
                    .and_then(|uvw| previous.sample_trilinear(uvw));
                if let Some(past) = sample {
                    *voxel = *voxel * (1.0 - weight) + past * weight;
                }
            }
        });
}

impl Lane for ReprojectionLane {
    fn strategy_name(&self) -> &'static str {
        "TemporalReprojection"
    }

    fn lane_kind(&self) -> LaneKind {
        LaneKind::Fog
    }

    fn estimate_cost(&self, workload: &LaneWorkload) -> f32 {
        workload.voxels as f32 * 0.000002
    }
}

impl FogLane for ReprojectionLane {
    fn program(&self) -> FogProgram {
        FogProgram::Reprojection
    }

    fn execute(&self, frame: &mut FogFrame<'_>) -> Result<(), LaneError> {
        frame.programs.require(self.program())?;
        let slicing = frame.slicing();
        let dims = frame.volumes.dims();
        let mapping = VoxelMapping::new(frame.camera, slicing, dims).ok_or_else(|| {
            LaneError::InvalidInput {
                expected: "invertible camera transform",
                received: format!("{:?}", frame.camera.world_to_view),
            }
        })?;
        let this_frame = HistoryFrame {
            view_projection: frame.camera.view_projection(),
            slicing,
        };
        let weight = history_weight(frame.config.reprojection_blend);

        let state = &mut *frame.reprojection;
        let history = state.previous_frame().copied().filter(|_| state.trust.is_warm());
        state.bypassed = history.is_none() || weight == 0.0;
        if let Some(history) = history.filter(|_| weight > 0.0) {
            let volumes = &mut *frame.volumes;
            let (current, previous) = volumes.scattering.split();
            reproject(current, previous, &mapping, &history, weight);
            if let Some(density) = volumes.density.as_ping_pong_mut() {
                let (current, previous) = density.split();
                reproject(current, previous, &mapping, &history, weight);
            }
        }
        state.record(this_frame);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fog_lane::fixture::FogFixture;
    use approx::assert_abs_diff_eq;

    fn fill(volume: &mut Volume3D<Vec4>, value: f32) {
        volume.fill(Vec4::new(value, value, value, value));
    }

    fn fixture(blend: f32) -> FogFixture {
        FogFixture::new(
            (16, 16),
            FogConfig {
                volume_scale: 4,
                depth_slices: 8,
                reprojection_blend: blend,
                ..FogConfig::default()
            },
        )
    }

    /// Runs one frame: swap, write `value` as the current result, reproject.
    fn run_frame(fx: &mut FogFixture, value: f32) {
        fx.volumes.begin_frame();
        fill(fx.volumes.scattering.current_mut(), value);
        ReprojectionLane::new().execute(&mut fx.frame()).unwrap();
    }

    #[test]
    fn test_trust_needs_four_frames() {
        let mut trust = HistoryTrust::Cold;
        let mut steps = Vec::new();
        for _ in 0..5 {
            trust = trust.advance();
            steps.push(trust);
        }
        assert_eq!(
            steps,
            vec![
                HistoryTrust::Warming(3),
                HistoryTrust::Warming(2),
                HistoryTrust::Warming(1),
                HistoryTrust::Warm,
                HistoryTrust::Warm,
            ]
        );
    }

    #[test]
    fn test_bypass_until_warm_then_blend() {
        let mut fx = fixture(1.0);
        for _ in 0..4 {
            run_frame(&mut fx, 2.0);
            assert!(fx.reprojection.was_bypassed());
        }
        assert!(fx.reprojection.trust().is_warm());

        run_frame(&mut fx, 4.0);
        assert!(!fx.reprojection.was_bypassed());
        let center = fx.volumes.scattering.current().get(2, 2, 4);
        // Static camera: history is exactly last frame's value.
        assert_abs_diff_eq!(center.x, 4.0 * 0.5 + 2.0 * 0.5, epsilon = 1e-4);
    }

    #[test]
    fn test_zero_blend_returns_current_exactly() {
        let mut fx = fixture(0.0);
        for _ in 0..6 {
            run_frame(&mut fx, 1.0);
        }
        run_frame(&mut fx, 3.0);
        assert!(fx.reprojection.was_bypassed());
        assert!(fx
            .volumes
            .scattering
            .current()
            .as_slice()
            .iter()
            .all(|v| *v == Vec4::new(3.0, 3.0, 3.0, 3.0)));
    }

    #[test]
    fn test_discontinuities_reset_trust() {
        let mut fx = fixture(1.0);
        let config = fx.config;
        for _ in 0..4 {
            run_frame(&mut fx, 1.0);
        }
        assert!(!fx.reprojection.observe(&fx.camera, &config, false));
        assert!(fx.reprojection.trust().is_warm());

        let mut farther = config;
        farther.raymarch_distance += 0.1;
        assert!(!fx.reprojection.observe(&fx.camera, &farther, false));
        farther.raymarch_distance += 0.5;
        assert!(fx.reprojection.observe(&fx.camera, &farther, false));
        assert_eq!(fx.reprojection.trust(), HistoryTrust::Cold);

        for _ in 0..4 {
            run_frame(&mut fx, 1.0);
        }
        let mut camera = fx.camera;
        camera.reverse_depth = true;
        assert!(fx.reprojection.observe(&camera, &farther, false));
        assert!(fx.reprojection.observe(&camera, &farther, true));
        assert!(fx.reprojection.previous_frame().is_none());
    }

    #[test]
    fn test_trust_does_not_advance_without_the_program() {
        let mut fx = fixture(1.0);
        fx.programs = fx.programs.without(FogProgram::Reprojection);
        fx.volumes.begin_frame();
        let result = ReprojectionLane::new().execute(&mut fx.frame());
        assert!(result.is_err());
        assert_eq!(fx.reprojection.trust(), HistoryTrust::Cold);
    }

    #[test]
    fn test_out_of_bounds_history_is_ignored() {
        let history = HistoryFrame {
            view_projection: Mat4::perspective_linear_depth(1.0, 1.0),
            slicing: DepthSlicing {
                near: 0.1,
                distance: 10.0,
                slices: 8,
            },
        };
        assert!(history_coords(&history, Vec3::new(0.0, 0.0, -1.0)).is_none());
        let far = history_coords(&history, Vec3::new(0.0, 0.0, 1.0)).expect("in front");
        assert!(far.z < 1.0);
    }
}
