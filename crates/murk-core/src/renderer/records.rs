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

//! GPU-visible light records.
//!
//! Every light that survives the list builder produces exactly one
//! [`CullRecord`] and one [`ShadeRecord`] at the same array index. Cull
//! records carry only the geometry needed by the visibility grid; shade
//! records carry what the shading and fog passes need to light a sample.
//!
//! # Memory Layout
//!
//! Both records are `#[repr(C)]` and made of 4-byte fields only, so they can
//! be cast to bytes with `bytemuck` and uploaded as-is.

use bytemuck::{Pod, Zeroable};

use crate::math::{Mat4, Vec2, Vec3, Vec4};

/// Hard cap on the number of records in one light list.
pub const MAX_LIGHT_RECORDS: usize = 255;

/// Atlas slot sentinel meaning "no texture".
pub const ATLAS_SLOT_NONE: u32 = u32::MAX;

/// Culling volume of a light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum VolumeType {
    /// Sphere around `pos_rad.xyz` of radius `pos_rad.w`.
    Sphere = 1,
    /// Cone with apex at `pos_rad.xyz`, axis and base radius in `volume_params[0]`.
    Cone = 2,
    /// Oriented box; `volume_params[i]` holds unit axis `i` and its half extent.
    Obb = 3,
    /// Always visible.
    Sun = 4,
}

impl VolumeType {
    /// Decodes the raw tag stored in a record.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(Self::Sphere),
            2 => Some(Self::Cone),
            3 => Some(Self::Obb),
            4 => Some(Self::Sun),
            _ => None,
        }
    }
}

/// Shading model of a light record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum LightKind {
    /// Environment probe.
    Probe = 1,
    /// Ambient point light.
    AmbientPoint = 2,
    /// Ambient projector.
    AmbientProjector = 3,
    /// Ambient area light.
    AmbientArea = 4,
    /// Regular point light.
    RegularPoint = 5,
    /// Regular projector.
    RegularProjector = 6,
    /// One cube face of a shadow-casting point light.
    RegularPointFace = 7,
    /// Regular area light.
    RegularArea = 8,
    /// Directional sun.
    Sun = 9,
}

impl LightKind {
    /// Decodes the raw tag stored in a record.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(Self::Probe),
            2 => Some(Self::AmbientPoint),
            3 => Some(Self::AmbientProjector),
            4 => Some(Self::AmbientArea),
            5 => Some(Self::RegularPoint),
            6 => Some(Self::RegularProjector),
            7 => Some(Self::RegularPointFace),
            8 => Some(Self::RegularArea),
            9 => Some(Self::Sun),
            _ => None,
        }
    }
}

/// Geometry-only description of a light, in view space.
///
/// Total size: 80 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CullRecord {
    /// Raw [`VolumeType`].
    pub volume_type: u32,
    /// Free bits for the consumer. Unused by lights.
    pub misc_flag: u32,
    /// View-space depth range `[min, max]`.
    pub depth_bounds: [f32; 2],
    /// View-space position and radius.
    pub pos_rad: [f32; 4],
    /// Shape parameters, see [`VolumeType`].
    pub volume_params: [[f32; 4]; 3],
}

impl CullRecord {
    /// A sphere of `radius` around the view-space position `pos_vs`, with
    /// the default depth bounds `z ± radius`.
    pub fn sphere(pos_vs: Vec3, radius: f32) -> Self {
        Self {
            volume_type: VolumeType::Sphere as u32,
            misc_flag: 0,
            depth_bounds: [pos_vs.z - radius, pos_vs.z + radius],
            pos_rad: pos_vs.extend(radius).to_array(),
            volume_params: [[0.0; 4]; 3],
        }
    }

    /// Decoded volume type, if the tag is valid.
    #[inline]
    pub fn volume(&self) -> Option<VolumeType> {
        VolumeType::from_raw(self.volume_type)
    }

    /// View-space position.
    #[inline]
    pub fn position(&self) -> Vec3 {
        Vec4::from_array(self.pos_rad).truncate()
    }

    /// Radius stored with the position.
    #[inline]
    pub fn radius(&self) -> f32 {
        self.pos_rad[3]
    }

    /// Volume parameter `i` as a vector.
    #[inline]
    pub fn param(&self, i: usize) -> Vec4 {
        Vec4::from_array(self.volume_params[i])
    }

    /// Depth bounds as a vector.
    #[inline]
    pub fn depth_range(&self) -> Vec2 {
        Vec2::new(self.depth_bounds[0], self.depth_bounds[1])
    }
}

/// Shading description of a light.
///
/// Total size: 208 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ShadeRecord {
    /// Raw [`LightKind`].
    pub light_kind: u32,
    /// Atlas slot of the light's texture, or [`ATLAS_SLOT_NONE`]. For cube
    /// face records this holds the face index.
    pub atlas_slot: u32,
    /// Layer of the screen-space shadow mask.
    pub shadow_mask_index: u32,
    /// Clip-volume stencil references plus one; 0 means unrestricted.
    pub stencil_ids: [u16; 2],
    /// Camera-relative world position and radius.
    pub pos_rad: [f32; 4],
    /// Attenuation parameters, interpretation depends on the kind.
    pub attenuation_params: [f32; 2],
    /// Shadow filter kernel scale and depth bias.
    pub shadow_params: [f32; 2],
    /// Premultiplied color; `w` holds the fog radial lobe.
    pub color: [f32; 4],
    /// One-hot selector of the shadow mask channel.
    pub shadow_channel: [f32; 4],
    /// Camera-relative world to projector texture space.
    pub projector_matrix: [[f32; 4]; 4],
    /// Camera-relative world to shadow-map texture space.
    pub shadow_matrix: [[f32; 4]; 4],
}

impl ShadeRecord {
    /// A record of `kind` without texture or shadow.
    pub fn new(kind: LightKind) -> Self {
        Self {
            light_kind: kind as u32,
            atlas_slot: ATLAS_SLOT_NONE,
            ..Zeroable::zeroed()
        }
    }

    /// Decoded light kind, if the tag is valid.
    #[inline]
    pub fn kind(&self) -> Option<LightKind> {
        LightKind::from_raw(self.light_kind)
    }

    /// Color as a vector.
    #[inline]
    pub fn color_vec(&self) -> Vec4 {
        Vec4::from_array(self.color)
    }

    /// The projector matrix as a [`Mat4`].
    #[inline]
    pub fn projector(&self) -> Mat4 {
        let [c0, c1, c2, c3] = self.projector_matrix.map(Vec4::from_array);
        Mat4::from_cols(c0, c1, c2, c3)
    }

    /// Stores a matrix into one of the matrix fields.
    #[inline]
    pub fn pack_matrix(m: &Mat4) -> [[f32; 4]; 4] {
        m.to_cols_array_2d()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{align_of, size_of};

    #[test]
    fn test_cull_record_size() {
        assert_eq!(size_of::<CullRecord>(), 80);
        assert_eq!(size_of::<CullRecord>() % 16, 0);
        assert_eq!(align_of::<CullRecord>(), 4);
    }

    #[test]
    fn test_shade_record_size() {
        assert_eq!(size_of::<ShadeRecord>(), 208);
        assert_eq!(size_of::<ShadeRecord>() % 16, 0);
    }

    #[test]
    fn test_sphere_default_depth_bounds() {
        let r = CullRecord::sphere(Vec3::new(0.0, 1.0, 10.0), 2.0);
        assert_eq!(r.depth_bounds, [8.0, 12.0]);
        assert_eq!(r.volume(), Some(VolumeType::Sphere));
        assert_eq!(r.radius(), 2.0);
    }

    #[test]
    fn test_new_shade_record_has_no_slot() {
        let s = ShadeRecord::new(LightKind::RegularPoint);
        assert_eq!(s.atlas_slot, ATLAS_SLOT_NONE);
        assert_eq!(s.kind(), Some(LightKind::RegularPoint));
    }

    #[test]
    fn test_raw_tags_round_trip() {
        for raw in 1..=9 {
            assert_eq!(LightKind::from_raw(raw).map(|k| k as u32), Some(raw));
        }
        assert!(VolumeType::from_raw(0).is_none());
    }
}
