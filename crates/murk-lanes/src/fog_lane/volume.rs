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

//! Storage of the fog volumes: 3D grids, 2D maps and the ping-pong pair.

use murk_core::math::{Mat4, Vec2, Vec3, Vec4};
use murk_core::renderer::CameraFrame;

use super::clip_stencil::ClipVolumeStencil;

/// Maps normalised depth coordinates of the fog volume to view depth.
///
/// Slices follow a squared distribution so that voxels close to the camera
/// are thinner: `depth(t) = near + distance * t²` for `t` in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthSlicing {
    /// View depth of the first slice boundary.
    pub near: f32,
    /// View distance covered by the volume.
    pub distance: f32,
    /// Number of slices.
    pub slices: u32,
}

impl DepthSlicing {
    /// View depth at normalised coordinate `t`.
    #[inline]
    pub fn depth_at(&self, t: f32) -> f32 {
        self.near + self.distance * t * t
    }

    /// Normalised coordinate of view depth `depth` (not clamped above 1).
    #[inline]
    pub fn coord_of(&self, depth: f32) -> f32 {
        ((depth - self.near).max(0.0) / self.distance).sqrt()
    }

    /// View depth range of slices `[first, last)`.
    #[inline]
    pub fn slice_range(&self, first: u32, last: u32) -> (f32, f32) {
        let n = self.slices.max(1) as f32;
        (self.depth_at(first as f32 / n), self.depth_at(last as f32 / n))
    }

    /// View depth at the center of slice `z`.
    #[inline]
    pub fn slice_center(&self, z: u32) -> f32 {
        self.depth_at((z as f32 + 0.5) / self.slices.max(1) as f32)
    }
}

/// Normalised device coordinates of the center of texel `(x, y)` in a
/// `width × height` grid. Y points up in NDC and down in texel rows.
#[inline]
pub fn texel_center_ndc(x: u32, y: u32, width: u32, height: u32) -> Vec2 {
    Vec2::new(
        (x as f32 + 0.5) / width as f32 * 2.0 - 1.0,
        1.0 - (y as f32 + 0.5) / height as f32 * 2.0,
    )
}

/// Voxel centers of the fog volume in view and world space for one camera.
#[derive(Debug, Clone, Copy)]
pub struct VoxelMapping {
    view_to_world: Mat4,
    tan_half_fov: Vec2,
    dims: [u32; 3],
    slicing: DepthSlicing,
}

impl VoxelMapping {
    /// Returns `None` if the camera transform cannot be inverted.
    pub fn new(camera: &CameraFrame, slicing: DepthSlicing, dims: [u32; 3]) -> Option<Self> {
        Some(Self {
            view_to_world: camera.view_to_world()?,
            tan_half_fov: camera.tan_half_fov,
            dims,
            slicing,
        })
    }

    /// The depth distribution in use.
    pub fn slicing(&self) -> DepthSlicing {
        self.slicing
    }

    /// View depth of slice `z`'s center.
    #[inline]
    pub fn slice_depth(&self, z: u32) -> f32 {
        self.slicing.slice_center(z)
    }

    /// View-space center of voxel `(x, y, z)`.
    #[inline]
    pub fn view_position(&self, x: u32, y: u32, z: u32) -> Vec3 {
        let ndc = texel_center_ndc(x, y, self.dims[0], self.dims[1]);
        let depth = self.slice_depth(z);
        Vec3::new(
            ndc.x * self.tan_half_fov.x * depth,
            ndc.y * self.tan_half_fov.y * depth,
            depth,
        )
    }

    /// World-space center of voxel `(x, y, z)`.
    #[inline]
    pub fn world_position(&self, x: u32, y: u32, z: u32) -> Vec3 {
        self.view_to_world
            .transform_point3(self.view_position(x, y, z))
    }
}

/// A dense 2D map.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture2D<T> {
    width: u32,
    height: u32,
    data: Vec<T>,
}

impl<T: Copy + Default> Texture2D<T> {
    /// A map filled with `T::default()`.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![T::default(); width as usize * height as usize],
        }
    }

    /// A map filled with `value`.
    pub fn filled(width: u32, height: u32, value: T) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }

    /// Builds a map from row-major data. Returns `None` on size mismatch.
    pub fn from_data(width: u32, height: u32, data: Vec<T>) -> Option<Self> {
        (data.len() == width as usize * height as usize).then_some(Self {
            width,
            height,
            data,
        })
    }

    /// Width in texels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in texels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Texel at `(x, y)`.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> T {
        self.data[y as usize * self.width as usize + x as usize]
    }

    /// Writes the texel at `(x, y)`.
    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: T) {
        let w = self.width as usize;
        self.data[y as usize * w + x as usize] = value;
    }

    /// Row-major texels.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Row-major texels, mutable.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
}

/// A dense 3D grid stored slice by slice, rows within slices.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume3D<T> {
    dims: [u32; 3],
    data: Vec<T>,
}

impl<T: Copy + Default> Volume3D<T> {
    /// A volume filled with `T::default()`.
    pub fn new(dims: [u32; 3]) -> Self {
        let len = dims.iter().map(|&d| d as usize).product();
        Self {
            dims,
            data: vec![T::default(); len],
        }
    }

    /// Dimensions in voxels.
    #[inline]
    pub fn dims(&self) -> [u32; 3] {
        self.dims
    }

    /// Voxels in one depth slice.
    #[inline]
    pub fn slice_len(&self) -> usize {
        self.dims[0] as usize * self.dims[1] as usize
    }

    /// Linear index of voxel `(x, y, z)`.
    #[inline]
    pub fn index(&self, x: u32, y: u32, z: u32) -> usize {
        (z as usize * self.dims[1] as usize + y as usize) * self.dims[0] as usize + x as usize
    }

    /// Voxel at `(x, y, z)`.
    #[inline]
    pub fn get(&self, x: u32, y: u32, z: u32) -> T {
        self.data[self.index(x, y, z)]
    }

    /// Writes voxel `(x, y, z)`.
    #[inline]
    pub fn set(&mut self, x: u32, y: u32, z: u32, value: T) {
        let i = self.index(x, y, z);
        self.data[i] = value;
    }

    /// Sets every voxel to `value`.
    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    /// Overwrites this volume with `other`, which must have the same shape.
    pub fn copy_from(&mut self, other: &Self) {
        self.data.copy_from_slice(&other.data);
    }

    /// All voxels.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// All voxels, mutable.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl Volume3D<Vec4> {
    /// Trilinear sample at normalised coordinates `uvw`, voxel centers at
    /// `(i + 0.5) / n`. Returns `None` outside `[0, 1]^3`.
    pub fn sample_trilinear(&self, uvw: Vec3) -> Option<Vec4> {
        if !(0.0..=1.0).contains(&uvw.x)
            || !(0.0..=1.0).contains(&uvw.y)
            || !(0.0..=1.0).contains(&uvw.z)
        {
            return None;
        }
        let mut base = [0u32; 3];
        let mut frac = [0.0f32; 3];
        for axis in 0..3 {
            let n = self.dims[axis];
            let p = (uvw[axis] * n as f32 - 0.5).clamp(0.0, (n - 1) as f32);
            let i = (p.floor() as u32).min(n.saturating_sub(2));
            base[axis] = i;
            frac[axis] = if n > 1 { p - i as f32 } else { 0.0 };
        }
        let fetch = |dx: u32, dy: u32, dz: u32| {
            let x = (base[0] + dx).min(self.dims[0] - 1);
            let y = (base[1] + dy).min(self.dims[1] - 1);
            let z = (base[2] + dz).min(self.dims[2] - 1);
            self.get(x, y, z)
        };
        let lerp_x = |dy, dz| Vec4::lerp(fetch(0, dy, dz), fetch(1, dy, dz), frac[0]);
        let lerp_y = |dz| Vec4::lerp(lerp_x(0, dz), lerp_x(1, dz), frac[1]);
        Some(Vec4::lerp(lerp_y(0), lerp_y(1), frac[2]))
    }
}

/// Two same-shaped resources alternating between "current" (written this
/// frame) and "previous" (last frame's result, read-only).
///
/// The roles are selected by `frame_counter % 2`, so a stage holding the
/// pair from [`PingPong::split`] can never read and write the same buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct PingPong<T> {
    slots: [T; 2],
    frame_counter: u64,
}

impl<T> PingPong<T> {
    /// Creates the pair; `a` starts as current.
    pub fn new(a: T, b: T) -> Self {
        Self {
            slots: [a, b],
            frame_counter: 0,
        }
    }

    /// Index of the current buffer.
    #[inline]
    pub fn frame_parity(&self) -> usize {
        (self.frame_counter % 2) as usize
    }

    /// Swaps the roles for a new frame.
    pub fn advance(&mut self) {
        self.frame_counter = self.frame_counter.wrapping_add(1);
    }

    /// The buffer written this frame.
    pub fn current(&self) -> &T {
        &self.slots[self.frame_parity()]
    }

    /// The buffer written this frame, mutable.
    pub fn current_mut(&mut self) -> &mut T {
        &mut self.slots[self.frame_parity()]
    }

    /// Last frame's buffer.
    pub fn previous(&self) -> &T {
        &self.slots[1 - self.frame_parity()]
    }

    /// Current (mutable) and previous (shared) at once.
    pub fn split(&mut self) -> (&mut T, &T) {
        let [a, b] = &mut self.slots;
        if self.frame_counter % 2 == 0 {
            (a, b)
        } else {
            (b, a)
        }
    }
}

/// A sun shadow map: orthographic depth seen from the sun.
#[derive(Debug, Clone, PartialEq)]
pub struct SunShadowMap {
    /// World position to `(u, v, depth)` with `u, v` in `[0, 1]`.
    pub world_to_shadow: Mat4,
    /// Depth of the closest occluder per texel.
    pub depth: Texture2D<f32>,
}

impl SunShadowMap {
    /// Depth tolerance of the visibility test.
    pub const BIAS: f32 = 1e-3;

    /// 1 if `world` is lit by the sun, 0 if it is shadowed. Points outside
    /// the map, and every point of an empty map, are lit.
    pub fn visibility(&self, world: Vec3) -> f32 {
        if self.depth.width() == 0 || self.depth.height() == 0 {
            return 1.0;
        }
        let p = self.world_to_shadow.transform_point3(world);
        if !(0.0..1.0).contains(&p.x) || !(0.0..1.0).contains(&p.y) {
            return 1.0;
        }
        let x = ((p.x * self.depth.width() as f32) as u32).min(self.depth.width() - 1);
        let y = ((p.y * self.depth.height() as f32) as u32).min(self.depth.height() - 1);
        if p.z <= self.depth.get(x, y) + Self::BIAS {
            1.0
        } else {
            0.0
        }
    }

    /// A copy reduced by `factor` along both axes, keeping the farthest
    /// occluder of each block.
    pub fn downscaled(&self, factor: u32) -> SunShadowMap {
        let factor = factor.max(1);
        if factor == 1 {
            return self.clone();
        }
        let (w, h) = (self.depth.width(), self.depth.height());
        let mut depth = Texture2D::filled(w.div_ceil(factor), h.div_ceil(factor), f32::MIN);
        for y in 0..h {
            for x in 0..w {
                let (dx, dy) = (x / factor, y / factor);
                let d = depth.get(dx, dy).max(self.depth.get(x, y));
                depth.set(dx, dy, d);
            }
        }
        SunShadowMap {
            world_to_shadow: self.world_to_shadow,
            depth,
        }
    }
}

/// Density storage: single in the default mode, double-buffered in the
/// legacy mode where density is also blurred and reprojected.
#[derive(Debug, Clone, PartialEq)]
pub enum DensityStorage {
    /// One volume rewritten every frame.
    Single(Volume3D<Vec4>),
    /// Current and previous density.
    Double(PingPong<Volume3D<Vec4>>),
}

impl DensityStorage {
    /// Density written this frame: albedo in `rgb`, extinction in `a`.
    pub fn current(&self) -> &Volume3D<Vec4> {
        match self {
            DensityStorage::Single(v) => v,
            DensityStorage::Double(pair) => pair.current(),
        }
    }

    /// Density written this frame, mutable.
    pub fn current_mut(&mut self) -> &mut Volume3D<Vec4> {
        match self {
            DensityStorage::Single(v) => v,
            DensityStorage::Double(pair) => pair.current_mut(),
        }
    }

    /// The double-buffered pair, in legacy mode.
    pub fn as_ping_pong_mut(&mut self) -> Option<&mut PingPong<Volume3D<Vec4>>> {
        match self {
            DensityStorage::Single(_) => None,
            DensityStorage::Double(pair) => Some(pair),
        }
    }

    fn advance(&mut self) {
        if let DensityStorage::Double(pair) = self {
            pair.advance();
        }
    }
}

/// Every texture the fog accumulator owns.
#[derive(Debug, Clone)]
pub struct VolumeBuffers {
    dims: [u32; 3],
    legacy: bool,
    /// Farthest scene depth per voxel column.
    pub max_depth: Texture2D<f32>,
    /// Horizontal pass of the depth downscale: volume width by source height.
    pub depth_temp: Texture2D<f32>,
    /// Downscaled sun shadow for this frame, if any.
    pub sun_shadow: Option<SunShadowMap>,
    /// Fog density and albedo.
    pub density: DensityStorage,
    /// Lit fog: `rgb` in-scattered light, `a` extinction.
    pub scattering: PingPong<Volume3D<Vec4>>,
    /// Intermediate of the separable blur.
    pub blur_scratch: Volume3D<Vec4>,
    /// Integrated result: `rgb` accumulated light, `a` transmittance.
    pub fog_output: Volume3D<Vec4>,
    /// Clip-volume stencil.
    pub stencil: ClipVolumeStencil,
    frame_counter: u64,
}

impl Default for VolumeBuffers {
    fn default() -> Self {
        Self::new([0, 0, 0], false)
    }
}

impl VolumeBuffers {
    /// Allocates every volume at `dims`.
    pub fn new(dims: [u32; 3], legacy: bool) -> Self {
        let volume = || Volume3D::<Vec4>::new(dims);
        let density = if legacy {
            DensityStorage::Double(PingPong::new(volume(), volume()))
        } else {
            DensityStorage::Single(volume())
        };
        Self {
            dims,
            legacy,
            max_depth: Texture2D::filled(dims[0], dims[1], f32::MAX),
            depth_temp: Texture2D::new(0, 0),
            sun_shadow: None,
            density,
            scattering: PingPong::new(volume(), volume()),
            blur_scratch: volume(),
            fog_output: volume(),
            stencil: ClipVolumeStencil::new(dims),
            frame_counter: 0,
        }
    }

    /// Reallocates when the shape or mode changed. Returns whether it did;
    /// a reallocation invalidates every history.
    pub fn ensure(&mut self, dims: [u32; 3], legacy: bool) -> bool {
        if self.dims == dims && self.legacy == legacy {
            return false;
        }
        log::debug!(
            "Reallocating fog volumes: {:?} -> {:?} (legacy: {})",
            self.dims,
            dims,
            legacy
        );
        *self = Self::new(dims, legacy);
        true
    }

    /// Swaps the double-buffered volumes for a new frame.
    pub fn begin_frame(&mut self) {
        self.frame_counter = self.frame_counter.wrapping_add(1);
        self.scattering.advance();
        self.density.advance();
    }

    /// Volume size in voxels.
    pub fn dims(&self) -> [u32; 3] {
        self.dims
    }

    /// Whether density is double-buffered.
    pub fn is_legacy(&self) -> bool {
        self.legacy
    }

    /// Frames run since the last allocation.
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    /// Whether the voxel at slice `z` lies behind the scene in column `(x, y)`.
    #[inline]
    pub fn is_occluded(&self, x: u32, y: u32, slice_depth: f32) -> bool {
        slice_depth > self.max_depth.get(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_ping_pong_swaps_every_frame() {
        let mut pair = PingPong::new(1, 2);
        assert_eq!((*pair.current(), *pair.previous()), (1, 2));
        pair.advance();
        assert_eq!((*pair.current(), *pair.previous()), (2, 1));
        let (cur, prev) = pair.split();
        *cur = 5;
        assert_eq!(*prev, 1);
        assert_eq!(*pair.current(), 5);
        pair.advance();
        assert_eq!(pair.frame_parity(), 0);
    }

    #[test]
    fn test_depth_slicing_is_squared() {
        let slicing = DepthSlicing {
            near: 1.0,
            distance: 100.0,
            slices: 4,
        };
        assert_abs_diff_eq!(slicing.depth_at(0.5), 26.0);
        let (a, b) = slicing.slice_range(0, 4);
        assert_abs_diff_eq!(a, 1.0);
        assert_abs_diff_eq!(b, 101.0);
        assert_abs_diff_eq!(slicing.coord_of(slicing.slice_center(2)), 2.5 / 4.0, epsilon = 1e-5);
    }

    #[test]
    fn test_trilinear_at_voxel_center_is_exact() {
        let mut v = Volume3D::<Vec4>::new([4, 3, 2]);
        v.set(2, 1, 1, Vec4::new(1.0, 2.0, 3.0, 4.0));
        let uvw = Vec3::new(2.5 / 4.0, 1.5 / 3.0, 1.5 / 2.0);
        let s = v.sample_trilinear(uvw).expect("inside");
        assert_abs_diff_eq!(s.w, 4.0, epsilon = 1e-5);
        assert!(v.sample_trilinear(Vec3::new(1.5, 0.5, 0.5)).is_none());
    }

    #[test]
    fn test_trilinear_interpolates_between_centers() {
        let mut v = Volume3D::<Vec4>::new([2, 1, 1]);
        v.set(1, 0, 0, Vec4::new(2.0, 0.0, 0.0, 0.0));
        let s = v.sample_trilinear(Vec3::new(0.5, 0.5, 0.5)).expect("inside");
        assert_abs_diff_eq!(s.x, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_ensure_reallocates_on_change_only() {
        let mut buffers = VolumeBuffers::default();
        assert!(buffers.ensure([4, 4, 8], false));
        assert!(!buffers.ensure([4, 4, 8], false));
        assert!(buffers.ensure([4, 4, 8], true));
        assert!(buffers.density.as_ping_pong_mut().is_some());
        assert_eq!(buffers.max_depth.get(3, 3), f32::MAX);
    }

    #[test]
    fn test_shadow_downscale_keeps_farthest() {
        let depth = Texture2D::from_data(2, 2, vec![1.0, 4.0, 2.0, 3.0]).expect("2x2");
        let map = SunShadowMap {
            world_to_shadow: Mat4::IDENTITY,
            depth,
        };
        let half = map.downscaled(2);
        assert_eq!(half.depth.width(), 1);
        assert_eq!(half.depth.get(0, 0), 4.0);
        assert_eq!(map.visibility(Vec3::new(0.25, 0.25, 0.5)), 1.0);
        assert_eq!(map.visibility(Vec3::new(0.25, 0.25, 2.0)), 0.0);
        assert_eq!(map.visibility(Vec3::new(1.5, 0.25, 9.0)), 1.0);
    }

    #[test]
    fn test_empty_shadow_map_lights_everything() {
        let map = SunShadowMap {
            world_to_shadow: Mat4::IDENTITY,
            depth: Texture2D::new(0, 0),
        };
        assert_eq!(map.visibility(Vec3::new(0.5, 0.5, 9.0)), 1.0);
        assert_eq!(map.downscaled(2).visibility(Vec3::new(0.5, 0.5, 9.0)), 1.0);
    }

    #[test]
    fn test_texel_center_ndc_flips_y() {
        let ndc = texel_center_ndc(0, 0, 2, 2);
        assert_abs_diff_eq!(ndc.x, -0.5);
        assert_abs_diff_eq!(ndc.y, 0.5);
    }
}
