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

//! Scene light descriptors consumed by the light list builder.
//!
//! The scene owns these values and hands them over read-only every frame as
//! three ordered collections (probes, ambient lights, regular lights) plus an
//! optional sun. [`SceneLights::iter`] flattens them into [`LightDescriptor`]
//! values in submission order, which is the order capacity truncation keeps.

use crate::math::{LinearRgba, Mat3, Mat4, Vec3};
use crate::renderer::texture::TextureSource;
use std::ops::BitOr;

/// Bit flags carried by every local light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LightFlags(pub u32);

impl LightFlags {
    /// No flag set.
    pub const NONE: Self = Self(0);
    /// The light participates in volumetric fog.
    pub const VOLUMETRIC_FOG: Self = Self(1 << 0);
    /// Editor-only helper light that never reaches the GPU.
    pub const FAKE: Self = Self(1 << 1);

    /// Returns `true` if every bit of `other` is set.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for LightFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Properties shared by probes and local lights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightCommon {
    /// World-space position.
    pub position: Vec3,
    /// Influence radius in world units.
    pub radius: f32,
    /// Linear color.
    pub color: LinearRgba,
    /// Intensity multiplier applied to `color`.
    pub intensity: f32,
    /// Behaviour flags.
    pub flags: LightFlags,
    /// Up to two clip-volume stencil references the light is restricted to.
    pub stencil_refs: [Option<u8>; 2],
    /// Anisotropy of the light's in-scattering lobe in fog, in `[-1, 1]`.
    pub fog_radial_lobe: f32,
}

impl LightCommon {
    /// A white light of unit intensity at `position`, visible in fog.
    pub fn new(position: Vec3, radius: f32) -> Self {
        Self {
            position,
            radius,
            color: LinearRgba::WHITE,
            intensity: 1.0,
            flags: LightFlags::VOLUMETRIC_FOG,
            stencil_refs: [None, None],
            fog_radial_lobe: 0.0,
        }
    }
}

/// An environment probe: a box-shaped region lit by a pair of cubemaps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeLight {
    /// Shared light properties.
    pub common: LightCommon,
    /// Object orientation. Columns are the box axes in world space.
    pub orientation: Mat3,
    /// Half extents of the probe box along its axes.
    pub extents: Vec3,
    /// Fraction of the box used to fade the probe out near its border.
    pub attenuation_falloff: f32,
    /// Prefiltered specular cubemap.
    pub specular: TextureSource,
    /// Irradiance cubemap. Lives in the same slot index as `specular`.
    pub diffuse: TextureSource,
}

/// A light that projects a texture through a frustum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectorParams {
    /// Light orientation. Column 0 is the projection direction.
    pub orientation: Mat3,
    /// Half angle of the projection frustum, in degrees.
    pub frustum_angle_degrees: f32,
    /// Texture projected by the light.
    pub gobo: TextureSource,
}

/// A rectangular area light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AreaParams {
    /// Light orientation. Column 0 is the emission direction, columns 1 and 2
    /// span the rectangle.
    pub orientation: Mat3,
    /// Width of the emitting rectangle.
    pub width: f32,
    /// Height of the emitting rectangle.
    pub height: f32,
    /// Half angle of the emission frustum, in degrees.
    pub frustum_angle_degrees: f32,
}

impl AreaParams {
    /// A degenerate rectangle is shaded as a point light.
    pub fn is_rectangular(&self) -> bool {
        self.width > 0.0 && self.height > 0.0 && self.frustum_angle_degrees > 0.0
    }
}

/// Emission shape of a local light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocalShape {
    /// Omnidirectional light.
    Point,
    /// Textured projector.
    Projector(ProjectorParams),
    /// Rectangular area light.
    Area(AreaParams),
}

/// Link between a light and the shadow maps rendered for it this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowLink {
    /// Omnidirectional lights render one shadow map per cube face.
    pub omnidirectional: bool,
    /// Bit `i` is set when face `i` actually rendered a shadow map.
    pub generation_mask: u8,
    /// World to shadow-map texture space, per face. Only face 0 is used
    /// for single-sided shadows.
    pub face_matrices: [Mat4; 6],
    /// Resolution of one face in the shadow pool, in texels.
    pub texture_size: f32,
    /// Resolution of the whole shadow pool, in texels.
    pub pool_size: f32,
    /// Depth bias applied when comparing against the shadow map.
    pub depth_bias: f32,
    /// Channel of the screen-space shadow mask holding this light's term.
    pub mask_channel: u8,
    /// Layer of the screen-space shadow mask.
    pub mask_index: u32,
}

impl ShadowLink {
    /// Number of shadow sides, and thus of record faces, for this light.
    #[inline]
    pub const fn side_count(&self) -> usize {
        if self.omnidirectional {
            6
        } else {
            1
        }
    }
}

/// A point, projector or area light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalLight {
    /// Shared light properties.
    pub common: LightCommon,
    /// Emission shape.
    pub shape: LocalShape,
    /// Physical size of the emitter, used to normalise fog intensity.
    pub bulb_size: f32,
    /// Shadow linkage, for shadow-casting regular lights.
    pub shadow: Option<ShadowLink>,
}

impl LocalLight {
    /// A white point light.
    pub fn point(position: Vec3, radius: f32) -> Self {
        Self {
            common: LightCommon::new(position, radius),
            shape: LocalShape::Point,
            bulb_size: 0.05,
            shadow: None,
        }
    }
}

/// The directional sun light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SunLight {
    /// Direction the light travels, in world space (normalized).
    pub direction: Vec3,
    /// Linear color.
    pub color: LinearRgba,
    /// Intensity multiplier.
    pub intensity: f32,
    /// Anisotropy of the sun's in-scattering lobe.
    pub fog_radial_lobe: f32,
}

impl Default for SunLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(0.0, -1.0, -0.5).normalize(),
            color: LinearRgba::WHITE,
            intensity: 1.0,
            fog_radial_lobe: 0.6,
        }
    }
}

/// One scene light, dispatched once per light by the list builder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightDescriptor<'a> {
    /// Environment probe.
    Probe(&'a ProbeLight),
    /// Ambient light: adds to indirect lighting, never casts shadows.
    Ambient(&'a LocalLight),
    /// Regular direct light.
    Regular(&'a LocalLight),
    /// Directional sun light.
    Sun(&'a SunLight),
}

/// The per-frame light enumeration handed over by the scene.
#[derive(Debug, Clone, Default)]
pub struct SceneLights {
    /// Environment probes.
    pub probes: Vec<ProbeLight>,
    /// Ambient lights.
    pub ambient: Vec<LocalLight>,
    /// Regular lights.
    pub regular: Vec<LocalLight>,
    /// Optional sun.
    pub sun: Option<SunLight>,
}

impl SceneLights {
    /// Probes, then ambient lights, then regular lights, in submission order.
    /// The sun is not included; it is always appended last by the builder.
    pub fn iter(&self) -> impl Iterator<Item = LightDescriptor<'_>> {
        self.probes
            .iter()
            .map(LightDescriptor::Probe)
            .chain(self.ambient.iter().map(LightDescriptor::Ambient))
            .chain(self.regular.iter().map(LightDescriptor::Regular))
    }

    /// Total number of local lights and probes.
    pub fn len(&self) -> usize {
        self.probes.len() + self.ambient.len() + self.regular.len()
    }

    /// Returns `true` if the scene has no local light and no probe.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iteration_keeps_collection_order() {
        let mut scene = SceneLights::default();
        scene.regular.push(LocalLight::point(Vec3::new(3.0, 0.0, 0.0), 1.0));
        scene.ambient.push(LocalLight::point(Vec3::new(2.0, 0.0, 0.0), 1.0));
        let kinds: Vec<_> = scene
            .iter()
            .map(|l| match l {
                LightDescriptor::Ambient(_) => "ambient",
                LightDescriptor::Regular(_) => "regular",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, vec!["ambient", "regular"]);
        assert_eq!(scene.len(), 2);
    }

    #[test]
    fn test_flags_combine() {
        let flags = LightFlags::VOLUMETRIC_FOG | LightFlags::FAKE;
        assert!(flags.contains(LightFlags::FAKE));
        assert!(!LightFlags::NONE.contains(LightFlags::FAKE));
    }
}
