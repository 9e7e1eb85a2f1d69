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

//! Per-frame camera state.

use crate::math::{Mat4, Vec2, Vec3};

/// Camera and frame state used by every stage of the pipeline.
///
/// View space is right-handed with +Z forward: a point in front of the
/// camera has a positive view depth equal to its `z`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraFrame {
    /// Monotonic frame identifier. Two calls with the same id are the same frame.
    pub frame_id: u64,
    /// World-space camera position.
    pub position: Vec3,
    /// World to view transform.
    pub world_to_view: Mat4,
    /// Tangents of the horizontal and vertical half field of view.
    pub tan_half_fov: Vec2,
    /// Near plane distance.
    pub near: f32,
    /// Far plane distance.
    pub far: f32,
    /// Render target size in pixels.
    pub viewport: (u32, u32),
    /// Whether the depth buffer uses reversed Z.
    pub reverse_depth: bool,
    /// Seconds since start, drives fog noise animation.
    pub elapsed_seconds: f32,
}

impl CameraFrame {
    /// Builds a camera looking from `eye` toward `target`.
    ///
    /// Returns `None` if the view basis is degenerate.
    #[allow(clippy::too_many_arguments)]
    pub fn look_at(
        frame_id: u64,
        eye: Vec3,
        target: Vec3,
        up: Vec3,
        fov_y_radians: f32,
        viewport: (u32, u32),
        near: f32,
        far: f32,
    ) -> Option<Self> {
        let world_to_view = Mat4::look_at_forward_z(eye, target, up)?;
        let aspect = viewport.0.max(1) as f32 / viewport.1.max(1) as f32;
        let tan_y = (fov_y_radians * 0.5).tan();
        Some(Self {
            frame_id,
            position: eye,
            world_to_view,
            tan_half_fov: Vec2::new(tan_y * aspect, tan_y),
            near,
            far,
            viewport,
            reverse_depth: false,
            elapsed_seconds: 0.0,
        })
    }

    /// World-space forward direction (view +Z).
    pub fn forward(&self) -> Vec3 {
        self.world_to_view.get_row(2).truncate()
    }

    /// View to world transform.
    pub fn view_to_world(&self) -> Option<Mat4> {
        self.world_to_view.affine_inverse()
    }

    /// Projection keeping linear depth in `w`.
    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_linear_depth(self.tan_half_fov.x, self.tan_half_fov.y)
    }

    /// World to clip transform.
    pub fn view_projection(&self) -> Mat4 {
        self.projection() * self.world_to_view
    }

    /// View-space point at normalized device coordinates `ndc` and view depth `depth`.
    #[inline]
    pub fn view_point(&self, ndc: Vec2, depth: f32) -> Vec3 {
        Vec3::new(
            ndc.x * self.tan_half_fov.x * depth,
            ndc.y * self.tan_half_fov.y * depth,
            depth,
        )
    }

    /// View depth of a world-space point.
    #[inline]
    pub fn view_depth(&self, world: Vec3) -> f32 {
        self.world_to_view.transform_point3(world).z
    }
}
