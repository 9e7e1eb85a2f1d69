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

//! Builds the compact cull/shade record arrays from the scene lights.
//!
//! The same lane type runs twice per frame with different
//! [`LightListPolicy`] values: once for tiled lighting and once for fog.
//! Each run writes its own caller-owned [`LightListBuffers`] and is capped
//! independently.
//!
//! # Skip policy
//!
//! A light is skipped (and counted) when its atlas texture cannot be cached
//! or when the list is full. Lights split into cube faces count one skip per
//! face that did not fit. Fake lights and lights filtered out by the policy
//! are ignored without counting.

use murk_core::lane::{Lane, LaneKind, LaneWorkload};
use murk_core::math::{degrees_to_radians, Mat3, Mat4, Vec3, Vec4, SQRT_2};
use murk_core::renderer::{
    BufferSlot, CameraFrame, CullRecord, FogConfig, GraphicsDevice, LightCommon,
    LightDescriptor, LightFlags, LightKind, LocalLight, LocalShape, ProbeLight, ResourceError,
    SceneLights, ShadeRecord, ShadowLink, SunLight, VolumeType, MAX_LIGHT_RECORDS,
};
use murk_core::renderer::config::BULB_SIZE_RANGE;

use super::atlas::AtlasSet;

/// Projector frustum angles above this get a culling margin, in degrees.
const WIDE_PROJECTOR_ANGLE: f32 = 50.0;
/// Margin added to wide projector frustums, in degrees.
const WIDE_PROJECTOR_MARGIN: f32 = 7.5;
/// Largest cone half angle used for culling, in degrees.
const MAX_CONE_ANGLE: f32 = 89.9;
/// Half angle of the cone enclosing one cube face, in degrees.
const CUBE_FACE_CONE_ANGLE: f32 = 59.5;
/// Area lights influence a box slightly larger than their radius.
const AREA_RADIUS_EXPANSION: f32 = 1.08;
/// Largest area light half angle when casting shadows, in degrees.
const AREA_SHADOW_MAX_ANGLE: f32 = 67.5;
/// Filter kernel of omnidirectional shadow maps.
const OMNI_SHADOW_KERNEL: f32 = 2.5;
/// Filter kernel of single-sided shadow maps.
const SPOT_SHADOW_KERNEL: f32 = 1.5;

/// Cube face directions in the order shadow faces are rendered.
const CUBE_FACE_DIRECTIONS: [Vec3; 6] = [
    Vec3::new(1.0, 0.0, 0.0),
    Vec3::new(-1.0, 0.0, 0.0),
    Vec3::new(0.0, 1.0, 0.0),
    Vec3::new(0.0, -1.0, 0.0),
    Vec3::new(0.0, 0.0, 1.0),
    Vec3::new(0.0, 0.0, -1.0),
];

/// Which pass a light list is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightListPolicy {
    /// Screen-space tiled lighting: every non-fake light.
    Tiled,
    /// Volumetric fog: only fog-enabled lights, intensity normalised by
    /// emitter size.
    Fog,
}

/// Caller-owned record arrays, reused frame after frame.
///
/// The arrays are allocated once at full capacity and zero-filled; `reset`
/// clears the used prefix and the count so no allocation happens per frame.
#[derive(Debug, Clone)]
pub struct LightListBuffers {
    cull: Vec<CullRecord>,
    shade: Vec<ShadeRecord>,
    len: usize,
    skipped: u32,
}

impl LightListBuffers {
    /// Allocates arrays for `capacity` records (at most 255).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.min(MAX_LIGHT_RECORDS);
        Self {
            cull: vec![bytemuck::Zeroable::zeroed(); capacity],
            shade: vec![bytemuck::Zeroable::zeroed(); capacity],
            len: 0,
            skipped: 0,
        }
    }

    /// Clears the records and the skip counter, keeping the allocation.
    /// Reallocates only when `capacity` changes.
    pub fn reset(&mut self, capacity: usize) {
        let capacity = capacity.min(MAX_LIGHT_RECORDS);
        if capacity != self.cull.len() {
            *self = Self::new(capacity);
            return;
        }
        self.cull[..self.len].fill(bytemuck::Zeroable::zeroed());
        self.shade[..self.len].fill(bytemuck::Zeroable::zeroed());
        self.len = 0;
        self.skipped = 0;
    }

    /// Appends a record pair. Returns `false` when the list is full.
    fn push(&mut self, cull: CullRecord, shade: ShadeRecord) -> bool {
        if self.is_full() {
            return false;
        }
        self.cull[self.len] = cull;
        self.shade[self.len] = shade;
        self.len += 1;
        true
    }

    fn skip(&mut self, count: u32) {
        self.skipped += count;
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` when no record was produced.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Maximum number of records.
    pub fn capacity(&self) -> usize {
        self.cull.len()
    }

    /// Returns `true` when no further record fits.
    pub fn is_full(&self) -> bool {
        self.len >= self.cull.len()
    }

    /// Lights or faces skipped while building this list.
    pub fn skipped(&self) -> u32 {
        self.skipped
    }

    /// Cull records, index-aligned with [`Self::shade_records`].
    pub fn cull_records(&self) -> &[CullRecord] {
        &self.cull[..self.len]
    }

    /// Shade records, index-aligned with [`Self::cull_records`].
    pub fn shade_records(&self) -> &[ShadeRecord] {
        &self.shade[..self.len]
    }

    /// Uploads both arrays at full capacity, unused entries zeroed.
    pub fn publish(
        &self,
        device: &dyn GraphicsDevice,
        cull_slot: BufferSlot,
        shade_slot: BufferSlot,
    ) -> Result<(), ResourceError> {
        device.write_buffer(cull_slot, bytemuck::cast_slice(&self.cull))?;
        device.write_buffer(shade_slot, bytemuck::cast_slice(&self.shade))
    }
}

/// Builds light lists for one pass.
#[derive(Debug, Clone, Copy)]
pub struct LightListLane {
    policy: LightListPolicy,
    min_bulb_size: f32,
    include_area_lights: bool,
}

impl Default for LightListLane {
    fn default() -> Self {
        Self::tiled()
    }
}

impl LightListLane {
    /// Lane for the tiled lighting pass.
    pub fn tiled() -> Self {
        Self {
            policy: LightListPolicy::Tiled,
            min_bulb_size: BULB_SIZE_RANGE.0,
            include_area_lights: true,
        }
    }

    /// Lane for the fog pass.
    pub fn fog(config: &FogConfig) -> Self {
        Self {
            policy: LightListPolicy::Fog,
            min_bulb_size: config
                .min_bulb_size
                .clamp(BULB_SIZE_RANGE.0, BULB_SIZE_RANGE.1),
            include_area_lights: config.include_area_lights,
        }
    }

    /// The pass this lane builds for.
    pub fn policy(&self) -> LightListPolicy {
        self.policy
    }

    /// Fills `out` from `scene`, inserting textures into `atlases`.
    ///
    /// `out` is reset first; its capacity bounds the list.
    pub fn build(
        &self,
        scene: &SceneLights,
        camera: &CameraFrame,
        atlases: &mut AtlasSet,
        device: &dyn GraphicsDevice,
        out: &mut LightListBuffers,
    ) {
        out.reset(out.capacity());
        for light in scene.iter() {
            self.push_light(light, camera, atlases, device, out);
        }
        if let Some(sun) = &scene.sun {
            self.push_light(LightDescriptor::Sun(sun), camera, atlases, device, out);
        }
        if out.skipped() > 0 {
            log::debug!(
                "{:?} light list: {} records, {} skipped",
                self.policy,
                out.len(),
                out.skipped()
            );
        }
    }

    fn push_light(
        &self,
        light: LightDescriptor<'_>,
        camera: &CameraFrame,
        atlases: &mut AtlasSet,
        device: &dyn GraphicsDevice,
        out: &mut LightListBuffers,
    ) {
        match light {
            LightDescriptor::Probe(probe) => {
                if self.accepts(&probe.common) {
                    self.push_probe(probe, camera, atlases, device, out);
                }
            }
            LightDescriptor::Ambient(local) => {
                if self.accepts_local(local) {
                    self.push_local(local, true, camera, atlases, device, out);
                }
            }
            LightDescriptor::Regular(local) => {
                if self.accepts_local(local) {
                    self.push_local(local, false, camera, atlases, device, out);
                }
            }
            LightDescriptor::Sun(sun) => self.push_sun(sun, camera, out),
        }
    }

    fn accepts(&self, common: &LightCommon) -> bool {
        if common.flags.contains(LightFlags::FAKE) {
            return false;
        }
        match self.policy {
            LightListPolicy::Tiled => true,
            LightListPolicy::Fog => common.flags.contains(LightFlags::VOLUMETRIC_FOG),
        }
    }

    fn accepts_local(&self, light: &LocalLight) -> bool {
        if !self.accepts(&light.common) {
            return false;
        }
        let is_area = matches!(light.shape, LocalShape::Area(a) if a.is_rectangular());
        !(is_area && self.policy == LightListPolicy::Fog && !self.include_area_lights)
    }

    fn push_probe(
        &self,
        probe: &ProbeLight,
        camera: &CameraFrame,
        atlases: &mut AtlasSet,
        device: &dyn GraphicsDevice,
        out: &mut LightListBuffers,
    ) {
        if out.is_full() {
            out.skip(1);
            return;
        }
        // Both cubemaps must live at the same index; half a probe is worse than none.
        let Some(slot) = atlases.specular_probes.insert(device, &probe.specular, None) else {
            out.skip(1);
            return;
        };
        if atlases
            .diffuse_probes
            .insert(device, &probe.diffuse, Some(slot as usize))
            .is_none()
        {
            out.skip(1);
            return;
        }

        let view = &camera.world_to_view;
        let common = &probe.common;
        let pos_vs = view.transform_point3(common.position);
        let extents = probe.extents;
        let mut cull = CullRecord::sphere(pos_vs, extents.length());
        cull.volume_type = VolumeType::Obb as u32;
        let mut half_depth = 0.0;
        for i in 0..3 {
            let axis_vs = view
                .transform_vector3(probe.orientation.cols[i].normalize())
                .normalize();
            cull.volume_params[i] = axis_vs.extend(extents[i]).to_array();
            half_depth += axis_vs.z.abs() * extents[i];
        }
        cull.depth_bounds = [pos_vs.z - half_depth, pos_vs.z + half_depth];

        let mut shade = self.shade_base(LightKind::Probe, common, camera, 1.0);
        shade.atlas_slot = slot;
        shade.attenuation_params = [probe.attenuation_falloff, 0.0];
        // Camera-relative world to unit probe box, used for parallax correction.
        let probe_to_world = Mat4::from_mat3_translation(
            orientation_basis(&probe.orientation),
            common.position - camera.position,
        ) * Mat4::from_scale(extents);
        if let Some(world_to_probe) = probe_to_world.inverse() {
            shade.projector_matrix = ShadeRecord::pack_matrix(&world_to_probe);
        }
        out.push(cull, shade);
    }

    fn push_local(
        &self,
        light: &LocalLight,
        ambient: bool,
        camera: &CameraFrame,
        atlases: &mut AtlasSet,
        device: &dyn GraphicsDevice,
        out: &mut LightListBuffers,
    ) {
        if out.is_full() {
            out.skip(1);
            return;
        }
        let common = &light.common;
        let view = &camera.world_to_view;
        let pos_vs = view.transform_point3(common.position);
        let radius = common.radius;

        let bulb = light.bulb_size.clamp(self.min_bulb_size, BULB_SIZE_RANGE.1);
        let intensity_mul = match (self.policy, ambient) {
            (LightListPolicy::Fog, false) => (1.0 + 1.0 / bulb).powi(2),
            _ => 1.0,
        };
        let casts_shadow = !ambient && light.shadow.is_some();

        let (cull, mut shade) = match light.shape {
            LocalShape::Projector(projector) => {
                let Some(slot) = atlases
                    .projector_gobos
                    .insert(device, &projector.gobo, None)
                else {
                    out.skip(1);
                    return;
                };
                let mut angle = projector.frustum_angle_degrees;
                if angle > WIDE_PROJECTOR_ANGLE {
                    angle += WIDE_PROJECTOR_MARGIN;
                }
                let base_radius =
                    radius * degrees_to_radians(angle.min(MAX_CONE_ANGLE)).tan() * SQRT_2;
                let axis_vs = view
                    .transform_vector3(projector.orientation.cols[0])
                    .normalize();
                let cull = cone_record(pos_vs, axis_vs, radius, base_radius);

                let kind = if ambient {
                    LightKind::AmbientProjector
                } else {
                    LightKind::RegularProjector
                };
                let mut shade = self.shade_base(kind, common, camera, intensity_mul);
                shade.atlas_slot = slot;
                let projector_matrix = projector_texture_matrix(
                    &projector.orientation,
                    common.position - camera.position,
                    projector.frustum_angle_degrees,
                );
                shade.projector_matrix = ShadeRecord::pack_matrix(&projector_matrix);
                (cull, shade)
            }
            LocalShape::Area(area) if area.is_rectangular() => {
                let expanded = radius * AREA_RADIUS_EXPANSION;
                let half_extents = Vec3::new(
                    expanded,
                    area.width * 0.5 + expanded,
                    area.height * 0.5 + expanded,
                );
                let mut cull = CullRecord::sphere(pos_vs, half_extents.length());
                cull.volume_type = VolumeType::Obb as u32;
                for i in 0..3 {
                    let axis_vs = view
                        .transform_vector3(area.orientation.cols[i].normalize())
                        .normalize();
                    cull.volume_params[i] = axis_vs.extend(half_extents[i]).to_array();
                }
                let depth_extent = radius + area.width.max(area.height);
                cull.depth_bounds = [pos_vs.z - depth_extent, pos_vs.z + depth_extent];

                let kind = if ambient {
                    LightKind::AmbientArea
                } else {
                    LightKind::RegularArea
                };
                let mut shade = self.shade_base(kind, common, camera, intensity_mul);
                let mut angle = area.frustum_angle_degrees;
                if casts_shadow {
                    angle = angle.min(AREA_SHADOW_MAX_ANGLE);
                }
                shade.attenuation_params = [bulb, degrees_to_radians(angle).cos()];
                // Camera-relative world to the unit emitting rectangle.
                let rect_to_world = Mat4::from_mat3_translation(
                    orientation_basis(&area.orientation),
                    common.position - camera.position,
                ) * Mat4::from_scale(Vec3::new(1.0, area.width * 0.5, area.height * 0.5));
                if let Some(world_to_rect) = rect_to_world.inverse() {
                    shade.projector_matrix = ShadeRecord::pack_matrix(&world_to_rect);
                }
                (cull, shade)
            }
            LocalShape::Point | LocalShape::Area(_) => {
                let kind = if ambient {
                    LightKind::AmbientPoint
                } else {
                    LightKind::RegularPoint
                };
                (
                    CullRecord::sphere(pos_vs, radius),
                    self.shade_base(kind, common, camera, intensity_mul),
                )
            }
        };
        if shade.attenuation_params == [0.0, 0.0] {
            shade.attenuation_params = [bulb, 0.0];
        }

        let Some(shadow) = light.shadow.filter(|_| casts_shadow) else {
            out.push(cull, shade);
            return;
        };

        let omni = shadow.omnidirectional && matches!(light.shape, LocalShape::Point);
        shade.shadow_mask_index = shadow.mask_index;
        shade.shadow_channel = one_hot(shadow.mask_channel);
        shade.shadow_matrix = face_shadow_matrix(&shadow, 0, camera);
        shade.shadow_params = face_shadow_params(&shadow, 0, omni);
        if !omni {
            out.push(cull, shade);
            return;
        }

        // Face 0 takes over the parent record; faces 1..5 are appended.
        let face_radius = radius * degrees_to_radians(CUBE_FACE_CONE_ANGLE).tan() * SQRT_2;
        let face_kind = LightKind::RegularPointFace as u32;
        let face_cull = |face: usize| {
            let axis_vs = view.transform_vector3(CUBE_FACE_DIRECTIONS[face]).normalize();
            cone_record(pos_vs, axis_vs, radius, face_radius)
        };
        shade.light_kind = face_kind;
        shade.atlas_slot = 0;
        out.push(face_cull(0), shade);

        let faces = shadow.side_count();
        for face in 1..faces {
            if out.is_full() {
                out.skip((faces - face) as u32);
                return;
            }
            let mut face_shade = shade;
            face_shade.atlas_slot = face as u32;
            face_shade.shadow_matrix = face_shadow_matrix(&shadow, face, camera);
            face_shade.shadow_params = face_shadow_params(&shadow, face, omni);
            out.push(face_cull(face), face_shade);
        }
    }

    fn push_sun(&self, sun: &SunLight, camera: &CameraFrame, out: &mut LightListBuffers) {
        if out.is_full() {
            out.skip(1);
            return;
        }
        let dir_vs = camera
            .world_to_view
            .transform_vector3(sun.direction)
            .normalize();
        let cull = CullRecord {
            volume_type: VolumeType::Sun as u32,
            misc_flag: 0,
            depth_bounds: [0.0, f32::MAX],
            pos_rad: [0.0; 4],
            volume_params: [dir_vs.extend(0.0).to_array(), [0.0; 4], [0.0; 4]],
        };
        let mut shade = ShadeRecord::new(LightKind::Sun);
        let color = sun.color.to_vec3() * sun.intensity;
        shade.color = color.extend(sun.fog_radial_lobe).to_array();
        shade.pos_rad = (-sun.direction).extend(0.0).to_array();
        out.push(cull, shade);
    }

    fn shade_base(
        &self,
        kind: LightKind,
        common: &LightCommon,
        camera: &CameraFrame,
        intensity_mul: f32,
    ) -> ShadeRecord {
        let mut shade = ShadeRecord::new(kind);
        shade.pos_rad = (common.position - camera.position)
            .extend(common.radius)
            .to_array();
        let color = common.color.to_vec3() * (common.intensity * intensity_mul);
        shade.color = color.extend(common.fog_radial_lobe).to_array();
        shade.stencil_ids = common
            .stencil_refs
            .map(|r| r.map_or(0, |value| u16::from(value) + 1));
        shade
    }
}

impl Lane for LightListLane {
    fn strategy_name(&self) -> &'static str {
        match self.policy {
            LightListPolicy::Tiled => "TiledLightList",
            LightListPolicy::Fog => "FogLightList",
        }
    }

    fn lane_kind(&self) -> LaneKind {
        LaneKind::Lighting
    }

    fn estimate_cost(&self, workload: &LaneWorkload) -> f32 {
        0.05 + workload.lights as f32 * 0.002
    }
}

/// Cone culling record with apex `apex_vs`, unit `axis_vs`, length `height`.
fn cone_record(apex_vs: Vec3, axis_vs: Vec3, height: f32, base_radius: f32) -> CullRecord {
    let mut cull = CullRecord::sphere(apex_vs, height);
    cull.volume_type = VolumeType::Cone as u32;
    cull.volume_params[0] = axis_vs.extend(base_radius).to_array();
    // Depth extent of the cone's bounding box: apex plus base disk.
    let base_center = apex_vs + axis_vs * height;
    let disk_z = base_radius * (1.0 - axis_vs.z * axis_vs.z).max(0.0).sqrt();
    cull.depth_bounds = [
        apex_vs.z.min(base_center.z - disk_z),
        apex_vs.z.max(base_center.z + disk_z),
    ];
    cull
}

/// Orthonormalised copy of an orientation.
fn orientation_basis(m: &Mat3) -> Mat3 {
    Mat3::from_cols(
        m.cols[0].normalize(),
        m.cols[1].normalize(),
        m.cols[2].normalize(),
    )
}

/// Camera-relative world position to projector texture space `[0, 1]^2`.
///
/// Column 0 of `orientation` is the projection direction, columns 1 and 2
/// map to texture u and v.
fn projector_texture_matrix(orientation: &Mat3, rel_position: Vec3, half_angle_deg: f32) -> Mat4 {
    let basis = orientation_basis(orientation);
    let (forward, right, up) = (basis.cols[0], basis.cols[1], basis.cols[2]);
    let light_view = Mat4::from_cols(
        Vec4::new(right.x, up.x, forward.x, 0.0),
        Vec4::new(right.y, up.y, forward.y, 0.0),
        Vec4::new(right.z, up.z, forward.z, 0.0),
        Vec4::new(
            -right.dot(rel_position),
            -up.dot(rel_position),
            -forward.dot(rel_position),
            1.0,
        ),
    );
    let tan = degrees_to_radians(half_angle_deg.clamp(0.1, MAX_CONE_ANGLE)).tan();
    let projection = Mat4::perspective_linear_depth(tan, tan);
    // ndc [-1, 1] to uv [0, 1] with v pointing down.
    let bias = Mat4::from_cols(
        Vec4::new(0.5, 0.0, 0.0, 0.0),
        Vec4::new(0.0, -0.5, 0.0, 0.0),
        Vec4::new(0.0, 0.0, 1.0, 0.0),
        Vec4::new(0.5, 0.5, 0.0, 1.0),
    );
    bias * projection * light_view
}

fn face_shadow_matrix(shadow: &ShadowLink, face: usize, camera: &CameraFrame) -> [[f32; 4]; 4] {
    let m = shadow.face_matrices[face] * Mat4::from_translation(camera.position);
    ShadeRecord::pack_matrix(&m)
}

fn face_shadow_params(shadow: &ShadowLink, face: usize, omni: bool) -> [f32; 2] {
    if shadow.generation_mask & (1 << face) == 0 {
        return [0.0, 0.0];
    }
    let kernel = if omni {
        OMNI_SHADOW_KERNEL
    } else {
        SPOT_SHADOW_KERNEL
    };
    let pool = shadow.pool_size.max(1.0);
    [kernel * shadow.texture_size / pool, shadow.depth_bias]
}

fn one_hot(channel: u8) -> [f32; 4] {
    let mut v = [0.0; 4];
    v[usize::from(channel % 4)] = 1.0;
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use murk_core::math::Vec2;
    use murk_core::renderer::{
        AtlasSetConfig, HeadlessDevice, ProjectorParams, TextureFormat, TextureSource,
    };

    fn camera() -> CameraFrame {
        CameraFrame {
            frame_id: 1,
            position: Vec3::ZERO,
            world_to_view: Mat4::IDENTITY,
            tan_half_fov: Vec2::new(1.0, 1.0),
            near: 0.1,
            far: 100.0,
            viewport: (64, 64),
            reverse_depth: false,
            elapsed_seconds: 0.0,
        }
    }

    fn shadow(omni: bool, mask: u8) -> ShadowLink {
        ShadowLink {
            omnidirectional: omni,
            generation_mask: mask,
            face_matrices: [Mat4::IDENTITY; 6],
            texture_size: 512.0,
            pool_size: 4096.0,
            depth_bias: 0.002,
            mask_channel: 2,
            mask_index: 1,
        }
    }

    #[test]
    fn test_point_light_produces_sphere() {
        let device = HeadlessDevice::new();
        let mut atlases = AtlasSet::new(&AtlasSetConfig::default());
        let mut scene = SceneLights::default();
        scene.regular.push(LocalLight::point(Vec3::new(0.0, 0.0, 10.0), 2.0));
        let mut out = LightListBuffers::new(MAX_LIGHT_RECORDS);
        LightListLane::tiled().build(&scene, &camera(), &mut atlases, &device, &mut out);
        assert_eq!(out.len(), 1);
        let cull = out.cull_records()[0];
        assert_eq!(cull.volume(), Some(VolumeType::Sphere));
        assert_eq!(cull.depth_bounds, [8.0, 12.0]);
        assert_eq!(out.shade_records()[0].kind(), Some(LightKind::RegularPoint));
    }

    #[test]
    fn test_fog_policy_filters_and_normalises() {
        let device = HeadlessDevice::new();
        let mut atlases = AtlasSet::new(&AtlasSetConfig::default());
        let mut scene = SceneLights::default();
        let mut no_fog = LocalLight::point(Vec3::new(0.0, 0.0, 5.0), 1.0);
        no_fog.common.flags = LightFlags::NONE;
        let mut fake = LocalLight::point(Vec3::new(0.0, 0.0, 5.0), 1.0);
        fake.common.flags = LightFlags::VOLUMETRIC_FOG | LightFlags::FAKE;
        let mut bulb = LocalLight::point(Vec3::new(0.0, 0.0, 5.0), 1.0);
        bulb.bulb_size = 1.0;
        scene.regular.extend([no_fog, fake, bulb]);

        let fog_lane = LightListLane::fog(&FogConfig::default());
        let mut out = LightListBuffers::new(MAX_LIGHT_RECORDS);
        fog_lane.build(&scene, &camera(), &mut atlases, &device, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out.skipped(), 0);
        // (1 + 1/1)^2 = 4
        assert_abs_diff_eq!(out.shade_records()[0].color[0], 4.0);

        LightListLane::tiled().build(&scene, &camera(), &mut atlases, &device, &mut out);
        assert_eq!(out.len(), 2);
        assert_abs_diff_eq!(out.shade_records()[1].color[0], 1.0);
    }

    #[test]
    fn test_wide_projector_gets_margin() {
        let device = HeadlessDevice::new();
        let mut atlases = AtlasSet::new(&AtlasSetConfig::default());
        let mut light = LocalLight::point(Vec3::new(0.0, 0.0, 10.0), 4.0);
        light.shape = LocalShape::Projector(ProjectorParams {
            orientation: Mat3::from_cols(Vec3::Z, Vec3::X, Vec3::Y),
            frustum_angle_degrees: 60.0,
            gobo: TextureSource::resident_2d(1, 256, TextureFormat::Bc1RgbaUnorm),
        });
        let mut scene = SceneLights::default();
        scene.regular.push(light);
        let mut out = LightListBuffers::new(8);
        LightListLane::tiled().build(&scene, &camera(), &mut atlases, &device, &mut out);
        let cull = out.cull_records()[0];
        assert_eq!(cull.volume(), Some(VolumeType::Cone));
        let expected = 4.0 * degrees_to_radians(67.5).tan() * SQRT_2;
        assert_abs_diff_eq!(cull.volume_params[0][3], expected, epsilon = 1e-4);
        assert_abs_diff_eq!(cull.volume_params[0][2], 1.0, epsilon = 1e-6);
        // Axis along +Z: apex at 10, base center at 14.
        assert_abs_diff_eq!(cull.depth_bounds[0], 10.0, epsilon = 1e-4);
        assert_abs_diff_eq!(cull.depth_bounds[1], 14.0, epsilon = 1e-4);
    }

    #[test]
    fn test_projectors_beyond_atlas_capacity_are_skipped() {
        let device = HeadlessDevice::new();
        let mut config = AtlasSetConfig::default();
        config.projector_gobos.capacity = 2;
        let mut atlases = AtlasSet::new(&config);
        atlases.begin_frame(1);
        let mut scene = SceneLights::default();
        for id in 1..=3 {
            let mut light = LocalLight::point(Vec3::new(0.0, 0.0, 10.0), 4.0);
            light.shape = LocalShape::Projector(ProjectorParams {
                orientation: Mat3::from_cols(Vec3::Z, Vec3::X, Vec3::Y),
                frustum_angle_degrees: 60.0,
                gobo: TextureSource::resident_2d(id, 256, TextureFormat::Bc1RgbaUnorm),
            });
            scene.regular.push(light);
        }
        let mut out = LightListBuffers::new(8);
        LightListLane::tiled().build(&scene, &camera(), &mut atlases, &device, &mut out);

        assert_eq!(out.len(), 2);
        assert_eq!(out.skipped(), 1);
        let slots: Vec<u32> = out.shade_records().iter().map(|s| s.atlas_slot).collect();
        assert_eq!(slots, vec![0, 1]);
        assert_eq!(atlases.projector_gobos.update_count(), 2);
    }

    #[test]
    fn test_omni_shadow_splits_into_six_faces() {
        let device = HeadlessDevice::new();
        let mut atlases = AtlasSet::new(&AtlasSetConfig::default());
        let mut light = LocalLight::point(Vec3::new(0.0, 0.0, 10.0), 2.0);
        light.shadow = Some(shadow(true, 0b00_0101));
        let mut scene = SceneLights::default();
        scene.regular.push(light);
        let mut out = LightListBuffers::new(MAX_LIGHT_RECORDS);
        LightListLane::tiled().build(&scene, &camera(), &mut atlases, &device, &mut out);

        assert_eq!(out.len(), 6);
        for (face, shade) in out.shade_records().iter().enumerate() {
            assert_eq!(shade.kind(), Some(LightKind::RegularPointFace));
            assert_eq!(shade.atlas_slot, face as u32);
            assert_eq!(shade.shadow_channel, [0.0, 0.0, 1.0, 0.0]);
        }
        assert!(out
            .cull_records()
            .iter()
            .all(|c| c.volume() == Some(VolumeType::Cone)));
        assert_abs_diff_eq!(out.shade_records()[0].shadow_params[0], 2.5 * 512.0 / 4096.0);
        assert_eq!(out.shade_records()[1].shadow_params, [0.0, 0.0]);
        assert_ne!(out.shade_records()[2].shadow_params, [0.0, 0.0]);
    }

    #[test]
    fn test_face_split_counts_faces_that_do_not_fit() {
        let device = HeadlessDevice::new();
        let mut atlases = AtlasSet::new(&AtlasSetConfig::default());
        let mut light = LocalLight::point(Vec3::new(0.0, 0.0, 10.0), 2.0);
        light.shadow = Some(shadow(true, 0x3f));
        let mut scene = SceneLights::default();
        scene.regular.push(LocalLight::point(Vec3::new(0.0, 0.0, 3.0), 1.0));
        scene.regular.push(light);
        let mut out = LightListBuffers::new(4);
        LightListLane::tiled().build(&scene, &camera(), &mut atlases, &device, &mut out);
        assert_eq!(out.len(), 4);
        assert_eq!(out.skipped(), 3);
    }

    #[test]
    fn test_sun_is_appended_last() {
        let device = HeadlessDevice::new();
        let mut atlases = AtlasSet::new(&AtlasSetConfig::default());
        let mut scene = SceneLights::default();
        scene.sun = Some(SunLight::default());
        scene.ambient.push(LocalLight::point(Vec3::new(1.0, 0.0, 3.0), 1.0));
        let mut out = LightListBuffers::new(MAX_LIGHT_RECORDS);
        LightListLane::tiled().build(&scene, &camera(), &mut atlases, &device, &mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(out.shade_records()[0].kind(), Some(LightKind::AmbientPoint));
        let sun = out.cull_records()[1];
        assert_eq!(sun.volume(), Some(VolumeType::Sun));
        assert_eq!(sun.depth_bounds, [0.0, f32::MAX]);
    }

    #[test]
    fn test_stencil_ids_are_offset_by_one() {
        let device = HeadlessDevice::new();
        let mut atlases = AtlasSet::new(&AtlasSetConfig::default());
        let mut light = LocalLight::point(Vec3::new(0.0, 0.0, 3.0), 1.0);
        light.common.stencil_refs = [Some(0), Some(7)];
        let mut scene = SceneLights::default();
        scene.regular.push(light);
        let mut out = LightListBuffers::new(1);
        LightListLane::tiled().build(&scene, &camera(), &mut atlases, &device, &mut out);
        assert_eq!(out.shade_records()[0].stencil_ids, [1, 8]);
    }

    #[test]
    fn test_reset_reuses_allocation() {
        let mut out = LightListBuffers::new(3);
        assert!(out.push(CullRecord::sphere(Vec3::Z, 1.0), ShadeRecord::new(LightKind::Sun)));
        out.skip(2);
        out.reset(3);
        assert!(out.is_empty());
        assert_eq!(out.skipped(), 0);
        assert_eq!(out.capacity(), 3);
        assert_eq!(out.cull[0], <CullRecord as bytemuck::Zeroable>::zeroed());
    }

    #[test]
    fn test_publish_writes_full_capacity() {
        let device = HeadlessDevice::new();
        let out = LightListBuffers::new(MAX_LIGHT_RECORDS);
        out.publish(&device, BufferSlot::TiledCullRecords, BufferSlot::TiledShadeRecords)
            .unwrap();
        assert_eq!(
            device.buffer(BufferSlot::TiledCullRecords).map(|b| b.len()),
            Some(MAX_LIGHT_RECORDS * 80)
        );
        assert_eq!(
            device.buffer(BufferSlot::TiledShadeRecords).map(|b| b.len()),
            Some(MAX_LIGHT_RECORDS * 208)
        );
    }
}
