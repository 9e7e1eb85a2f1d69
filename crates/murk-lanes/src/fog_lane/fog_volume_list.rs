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

//! Per-pass lists of local fog volumes and their GPU records.
//!
//! Fog volumes are submitted into one of a small fixed set of lists, keyed by
//! the submitting thread and the recursion level of the pass (main view or a
//! reflection). Each list holds at most [`MAX_FOG_VOLUMES`] entries; further
//! submissions are dropped and counted.

use bytemuck::{Pod, Zeroable};
use murk_core::math::{Mat4, Vec4};
use murk_core::renderer::{
    BufferSlot, CameraFrame, CullRecord, FogVolumeDescriptor, FogVolumeShape, GraphicsDevice,
    ResourceError, VolumeType,
};

use super::clip_stencil::encode_stencil_ref;

/// Capacity of one fog volume list.
pub const MAX_FOG_VOLUMES: usize = 64;
/// Number of submitting threads.
pub const MAX_PASS_THREADS: usize = 2;
/// Number of pass recursion levels.
pub const MAX_RECURSION_LEVELS: usize = 2;

const DENSITY_SCALE: f32 = 0.1;
const MIN_SOFT_EDGE: f32 = 0.0001;
const FALLOFF_SCALE: f32 = 1.0 / 64.0;
const MIN_RAMP_DISTANCE: f32 = 0.1;
const NOISE_NORMALIZATION: f32 = 1.0 / 1.5;
const MIN_VIEW_DEPTH: f32 = 0.000001;

/// Identifies one fog volume list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PassContext {
    /// Submitting thread, below [`MAX_PASS_THREADS`].
    pub thread: usize,
    /// Pass recursion level, below [`MAX_RECURSION_LEVELS`].
    pub recursion_level: usize,
}

impl PassContext {
    /// The main view of the first thread.
    pub const MAIN: PassContext = PassContext {
        thread: 0,
        recursion_level: 0,
    };

    fn is_valid(&self) -> bool {
        self.thread < MAX_PASS_THREADS && self.recursion_level < MAX_RECURSION_LEVELS
    }
}

/// GPU record describing how one fog volume injects density.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FogVolumeInjectRecord {
    /// Bit 0: shape, bits 1-8: encoded stencil reference, bit 9: affects this area only.
    pub misc_flag: u32,
    /// Fog albedo.
    pub fog_color: [f32; 3],
    /// Scaled global density.
    pub global_density: f32,
    /// World-space center.
    pub volume_position: [f32; 3],
    /// World point where the height falloff equals one.
    pub height_falloff_base: [f32; 3],
    /// Reciprocal soft edge width.
    pub inv_soft_edge: f32,
    /// Scaled height falloff direction.
    pub height_falloff_dir: [f32; 3],
    /// Density added after the falloff.
    pub density_offset: f32,
    /// `(1 / d, -start / d, influence, 1 - influence)` with `d` the ramp distance.
    pub ramp_params: [f32; 4],
    /// Noise scroll offset, wind times elapsed time.
    pub wind_offset: [f32; 3],
    /// Seconds since start when the record was prepared.
    pub noise_elapsed_time: f32,
    /// Noise spatial frequency.
    pub noise_frequency: [f32; 3],
    /// Normalised noise strength.
    pub noise_scale: f32,
    /// Camera position in object space.
    pub eye_position_os: [f32; 3],
    /// Constant noise offset.
    pub noise_offset: f32,
    /// World to unit object space, column major.
    pub world_to_object: [[f32; 4]; 4],
    _pad: [f32; 4],
}

impl FogVolumeInjectRecord {
    /// Shape of the volume.
    pub fn shape(&self) -> FogVolumeShape {
        if self.misc_flag & 1 == 0 {
            FogVolumeShape::Ellipsoid
        } else {
            FogVolumeShape::Box
        }
    }

    /// Encoded stencil reference compared against the clip stencil.
    pub fn encoded_stencil_ref(&self) -> u8 {
        ((self.misc_flag >> 1) & 0xFF) as u8
    }

    /// Whether the volume only fills voxels with a matching stencil.
    pub fn affects_this_area_only(&self) -> bool {
        (self.misc_flag >> 9) & 1 != 0
    }

    /// World to unit object space transform.
    pub fn world_to_object(&self) -> Mat4 {
        let [c0, c1, c2, c3] = self.world_to_object.map(Vec4::from_array);
        Mat4::from_cols(c0, c1, c2, c3)
    }
}

/// Cull and inject records of one prepared fog volume list.
///
/// Caller-owned and reused across frames; [`FogVolumeAggregator::prepare`]
/// resets it.
#[derive(Debug, Clone)]
pub struct PreparedFogVolumes {
    cull: Vec<CullRecord>,
    inject: Vec<FogVolumeInjectRecord>,
    len: usize,
    culled: u32,
}

impl Default for PreparedFogVolumes {
    fn default() -> Self {
        Self::new()
    }
}

impl PreparedFogVolumes {
    /// Zeroed storage for [`MAX_FOG_VOLUMES`] records.
    pub fn new() -> Self {
        Self {
            cull: vec![Zeroable::zeroed(); MAX_FOG_VOLUMES],
            inject: vec![Zeroable::zeroed(); MAX_FOG_VOLUMES],
            len: 0,
            culled: 0,
        }
    }

    fn reset(&mut self) {
        self.cull[..self.len].fill(Zeroable::zeroed());
        self.inject[..self.len].fill(Zeroable::zeroed());
        self.len = 0;
        self.culled = 0;
    }

    /// Number of prepared volumes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no volume survived.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Volumes rejected because they start beyond the raymarch end.
    pub fn culled(&self) -> u32 {
        self.culled
    }

    /// Prepared cull records.
    pub fn cull_records(&self) -> &[CullRecord] {
        &self.cull[..self.len]
    }

    /// Prepared inject records.
    pub fn inject_records(&self) -> &[FogVolumeInjectRecord] {
        &self.inject[..self.len]
    }

    /// Uploads both arrays at full capacity.
    pub fn publish(&self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        device.write_buffer(BufferSlot::FogVolumeCullRecords, bytemuck::cast_slice(&self.cull))?;
        device.write_buffer(
            BufferSlot::FogVolumeInjectRecords,
            bytemuck::cast_slice(&self.inject),
        )
    }
}

/// Collects fog volumes per pass context.
#[derive(Debug, Clone, Default)]
pub struct FogVolumeAggregator {
    lists: [[Vec<FogVolumeDescriptor>; MAX_RECURSION_LEVELS]; MAX_PASS_THREADS],
    dropped: [[u32; MAX_RECURSION_LEVELS]; MAX_PASS_THREADS],
}

impl FogVolumeAggregator {
    /// Creates empty lists.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empties the list of `ctx` for a new pass.
    pub fn clear(&mut self, ctx: PassContext) {
        if ctx.is_valid() {
            self.lists[ctx.thread][ctx.recursion_level].clear();
            self.dropped[ctx.thread][ctx.recursion_level] = 0;
        }
    }

    /// Appends `volume` to the list of `ctx`.
    ///
    /// Returns `false` and counts a drop when the list is full. An invalid
    /// context is rejected without counting.
    pub fn push(&mut self, ctx: PassContext, volume: FogVolumeDescriptor) -> bool {
        if !ctx.is_valid() {
            log::warn!("Fog volume submitted for invalid pass context {:?}", ctx);
            return false;
        }
        let list = &mut self.lists[ctx.thread][ctx.recursion_level];
        if list.len() >= MAX_FOG_VOLUMES {
            self.dropped[ctx.thread][ctx.recursion_level] += 1;
            return false;
        }
        list.push(volume);
        true
    }

    /// Volumes submitted for `ctx`.
    pub fn volumes(&self, ctx: PassContext) -> &[FogVolumeDescriptor] {
        if ctx.is_valid() {
            &self.lists[ctx.thread][ctx.recursion_level]
        } else {
            &[]
        }
    }

    /// Submissions dropped for `ctx` since its last clear.
    pub fn dropped(&self, ctx: PassContext) -> u32 {
        if ctx.is_valid() {
            self.dropped[ctx.thread][ctx.recursion_level]
        } else {
            0
        }
    }

    /// Converts the list of `ctx` into GPU records.
    ///
    /// A volume is skipped when the view depth of its nearest bound along the
    /// camera axis lies beyond `raymarch_end`, or when its transform cannot
    /// be inverted.
    pub fn prepare(
        &self,
        ctx: PassContext,
        camera: &CameraFrame,
        raymarch_end: f32,
        out: &mut PreparedFogVolumes,
    ) {
        out.reset();
        let forward = camera.forward();
        let view = &camera.world_to_view;
        for volume in self.volumes(ctx) {
            let center = volume.center();
            let radius = volume.bounding_radius();
            let near_bound = center - forward * radius;
            let min_depth = camera.view_depth(near_bound).max(MIN_VIEW_DEPTH);
            if min_depth > raymarch_end {
                out.culled += 1;
                continue;
            }
            let Some(world_to_object) = volume.world_transform.inverse() else {
                out.culled += 1;
                continue;
            };

            let pos_vs = view.transform_point3(center);
            let mut cull = CullRecord::sphere(pos_vs, radius);
            cull.volume_type = VolumeType::Obb as u32;
            cull.misc_flag = volume.shape as u32;
            for i in 0..3 {
                let axis = volume.world_transform.cols[i].truncate();
                let axis_vs = view.transform_vector3(axis.normalize()).normalize();
                cull.volume_params[i] = axis_vs.extend(axis.length()).to_array();
            }

            out.cull[out.len] = cull;
            out.inject[out.len] = inject_record(volume, world_to_object, camera);
            out.len += 1;
        }
    }
}

fn inject_record(
    volume: &FogVolumeDescriptor,
    world_to_object: Mat4,
    camera: &CameraFrame,
) -> FogVolumeInjectRecord {
    let stencil = u32::from(encode_stencil_ref(volume.stencil_ref));
    let misc_flag = volume.shape as u32
        | (stencil << 1)
        | (u32::from(volume.affects_this_area_only) << 9);

    let soft_edge = if volume.soft_edges > 0.0 {
        volume.soft_edges
    } else {
        MIN_SOFT_EDGE
    };
    let ramp = volume.ramp;
    let ramp_distance = (ramp.end - ramp.start).max(MIN_RAMP_DISTANCE);
    let inv_ramp = 1.0 / ramp_distance;
    let noise = volume.noise;
    let elapsed = camera.elapsed_seconds;

    FogVolumeInjectRecord {
        misc_flag,
        fog_color: volume.color.to_vec3().to_array(),
        global_density: volume.global_density * DENSITY_SCALE,
        volume_position: volume.center().to_array(),
        height_falloff_base: volume.height_falloff_base.to_array(),
        inv_soft_edge: 1.0 / soft_edge,
        height_falloff_dir: (volume.height_falloff_dir * FALLOFF_SCALE).to_array(),
        density_offset: volume.density_offset,
        ramp_params: [
            inv_ramp,
            -ramp.start * inv_ramp,
            ramp.influence,
            1.0 - ramp.influence,
        ],
        wind_offset: (noise.wind * elapsed).to_array(),
        noise_elapsed_time: elapsed,
        noise_frequency: noise.frequency.to_array(),
        noise_scale: noise.scale * NOISE_NORMALIZATION,
        eye_position_os: world_to_object.transform_point3(camera.position).to_array(),
        noise_offset: noise.offset,
        world_to_object: world_to_object.to_cols_array_2d(),
        _pad: [0.0; 4],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use murk_core::math::{Vec3, FRAC_PI_2};
    use murk_core::renderer::{FogRamp, HeadlessDevice};

    fn camera() -> CameraFrame {
        CameraFrame::look_at(1, Vec3::ZERO, Vec3::Z, Vec3::Y, FRAC_PI_2, (64, 64), 0.1, 200.0)
            .expect("valid camera")
    }

    fn box_at(z: f32) -> FogVolumeDescriptor {
        FogVolumeDescriptor::uniform_box(Vec3::new(0.0, 0.0, z), Vec3::ONE, 1.0)
    }

    #[test]
    fn test_inject_record_is_pod_sized() {
        assert_eq!(std::mem::size_of::<FogVolumeInjectRecord>(), 208);
        assert_eq!(std::mem::size_of::<FogVolumeInjectRecord>() % 16, 0);
    }

    #[test]
    fn test_push_beyond_capacity_drops_and_counts() {
        let mut aggregator = FogVolumeAggregator::new();
        for _ in 0..MAX_FOG_VOLUMES {
            assert!(aggregator.push(PassContext::MAIN, box_at(5.0)));
        }
        assert!(!aggregator.push(PassContext::MAIN, box_at(5.0)));
        assert!(!aggregator.push(PassContext::MAIN, box_at(5.0)));
        assert_eq!(aggregator.volumes(PassContext::MAIN).len(), MAX_FOG_VOLUMES);
        assert_eq!(aggregator.dropped(PassContext::MAIN), 2);

        let reflection = PassContext {
            thread: 0,
            recursion_level: 1,
        };
        assert!(aggregator.volumes(reflection).is_empty());
        aggregator.clear(PassContext::MAIN);
        assert_eq!(aggregator.dropped(PassContext::MAIN), 0);
    }

    #[test]
    fn test_invalid_context_is_rejected() {
        let mut aggregator = FogVolumeAggregator::new();
        let ctx = PassContext {
            thread: 2,
            recursion_level: 0,
        };
        assert!(!aggregator.push(ctx, box_at(5.0)));
        assert!(aggregator.volumes(ctx).is_empty());
    }

    #[test]
    fn test_prepare_culls_beyond_raymarch_end() {
        let mut aggregator = FogVolumeAggregator::new();
        aggregator.push(PassContext::MAIN, box_at(10.0));
        aggregator.push(PassContext::MAIN, box_at(100.0));
        // Behind the camera: near bound clamps to a tiny positive depth.
        aggregator.push(PassContext::MAIN, box_at(-50.0));
        let mut out = PreparedFogVolumes::new();
        aggregator.prepare(PassContext::MAIN, &camera(), 64.0, &mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(out.culled(), 1);
        assert_eq!(out.cull_records()[0].volume(), Some(VolumeType::Obb));
        assert_abs_diff_eq!(out.cull_records()[0].param(0).w, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_inject_packing() {
        let mut volume = box_at(10.0);
        volume.stencil_ref = 3;
        volume.affects_this_area_only = true;
        volume.global_density = 2.0;
        volume.height_falloff_dir = Vec3::new(0.0, 64.0, 0.0);
        volume.ramp = FogRamp {
            start: 10.0,
            end: 10.05,
            influence: 0.25,
        };
        volume.noise.scale = 1.5;
        let mut aggregator = FogVolumeAggregator::new();
        aggregator.push(PassContext::MAIN, volume);
        let mut out = PreparedFogVolumes::new();
        aggregator.prepare(PassContext::MAIN, &camera(), 64.0, &mut out);

        let record = out.inject_records()[0];
        assert_eq!(record.misc_flag, 1 | (4 << 1) | (1 << 9));
        assert_eq!(record.shape(), FogVolumeShape::Box);
        assert_eq!(record.encoded_stencil_ref(), 4);
        assert!(record.affects_this_area_only());
        assert_abs_diff_eq!(record.global_density, 0.2, epsilon = 1e-6);
        assert_abs_diff_eq!(record.inv_soft_edge, 10000.0, epsilon = 1e-1);
        assert_abs_diff_eq!(record.height_falloff_dir[1], 1.0);
        assert_abs_diff_eq!(record.ramp_params[0], 10.0, epsilon = 1e-4);
        assert_abs_diff_eq!(record.ramp_params[1], -100.0, epsilon = 1e-2);
        assert_eq!(&record.ramp_params[2..], &[0.25, 0.75]);
        assert_abs_diff_eq!(record.noise_scale, 1.0, epsilon = 1e-6);
        let object = record
            .world_to_object()
            .transform_point3(Vec3::new(0.5, 0.0, 10.0));
        assert_abs_diff_eq!(object.x, 0.5, epsilon = 1e-5);
    }

    #[test]
    fn test_prepare_resets_and_publishes_full_arrays() {
        let mut aggregator = FogVolumeAggregator::new();
        aggregator.push(PassContext::MAIN, box_at(10.0));
        let mut out = PreparedFogVolumes::new();
        aggregator.prepare(PassContext::MAIN, &camera(), 64.0, &mut out);
        aggregator.clear(PassContext::MAIN);
        aggregator.prepare(PassContext::MAIN, &camera(), 64.0, &mut out);
        assert!(out.is_empty());

        let device = HeadlessDevice::new();
        out.publish(&device).unwrap();
        let bytes = device.buffer(BufferSlot::FogVolumeInjectRecords).unwrap();
        assert_eq!(bytes.len(), MAX_FOG_VOLUMES * 208);
        assert!(bytes.iter().all(|&b| b == 0));
    }
}
