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

//! Descriptors of local fog volumes and clip volumes.

use crate::math::{LinearRgba, Mat4, Vec3};

/// Shape of a local fog volume in its unit object space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum FogVolumeShape {
    /// Unit sphere.
    Ellipsoid = 0,
    /// Unit cube `[-1, 1]^3`.
    Box = 1,
}

/// Distance ramp applied to a fog volume's density.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FogRamp {
    /// Camera distance at which the ramp starts.
    pub start: f32,
    /// Camera distance at which the ramp reaches full density.
    pub end: f32,
    /// How much the ramp influences the final density, in `[0, 1]`.
    pub influence: f32,
}

impl Default for FogRamp {
    fn default() -> Self {
        Self {
            start: 0.0,
            end: 50.0,
            influence: 0.0,
        }
    }
}

/// Animated value noise modulating a fog volume's density.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FogNoise {
    /// Strength of the noise; 0 disables it.
    pub scale: f32,
    /// Spatial frequency along each object axis.
    pub frequency: Vec3,
    /// Constant offset added to the noise value.
    pub offset: f32,
    /// World-space wind velocity scrolling the noise.
    pub wind: Vec3,
}

impl Default for FogNoise {
    fn default() -> Self {
        Self {
            scale: 0.0,
            frequency: Vec3::ONE,
            offset: 0.0,
            wind: Vec3::ZERO,
        }
    }
}

/// A user-submitted local fog volume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FogVolumeDescriptor {
    /// Unit shape in object space.
    pub shape: FogVolumeShape,
    /// Object to world transform. The shape spans `[-1, 1]` in object space.
    pub world_transform: Mat4,
    /// Fog albedo.
    pub color: LinearRgba,
    /// Density scale.
    pub global_density: f32,
    /// Density added after height falloff.
    pub density_offset: f32,
    /// Soft edge width in `[0, 1]` of the unit shape.
    pub soft_edges: f32,
    /// World-space height falloff direction scaled by the falloff rate.
    pub height_falloff_dir: Vec3,
    /// World-space point where the height falloff equals one.
    pub height_falloff_base: Vec3,
    /// Distance ramp.
    pub ramp: FogRamp,
    /// Density noise.
    pub noise: FogNoise,
    /// Restrict the volume to voxels whose clip stencil matches `stencil_ref`.
    pub affects_this_area_only: bool,
    /// Clip-volume stencil reference.
    pub stencil_ref: u8,
}

impl FogVolumeDescriptor {
    /// A uniform fog box centered at `center` with half extents `half_extents`.
    pub fn uniform_box(center: Vec3, half_extents: Vec3, density: f32) -> Self {
        Self {
            shape: FogVolumeShape::Box,
            world_transform: Mat4::from_translation(center) * Mat4::from_scale(half_extents),
            color: LinearRgba::WHITE,
            global_density: density,
            density_offset: 0.0,
            soft_edges: 0.0,
            height_falloff_dir: Vec3::ZERO,
            height_falloff_base: center,
            ramp: FogRamp::default(),
            noise: FogNoise::default(),
            affects_this_area_only: false,
            stencil_ref: 0,
        }
    }

    /// World-space center of the volume.
    pub fn center(&self) -> Vec3 {
        self.world_transform.cols[3].truncate()
    }

    /// Radius of a sphere bounding the volume.
    pub fn bounding_radius(&self) -> f32 {
        let axes = Vec3::new(
            self.world_transform.cols[0].truncate().length(),
            self.world_transform.cols[1].truncate().length(),
            self.world_transform.cols[2].truncate().length(),
        );
        axes.length()
    }
}

/// A unit-box clip volume tagging the voxels it covers with a stencil reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipVolume {
    /// Object to world transform of the unit cube `[-1, 1]^3`.
    pub world_transform: Mat4,
    /// Stencil reference written into covered voxels. 0 is reserved for "outside".
    pub stencil_ref: u8,
}
