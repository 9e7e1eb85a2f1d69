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

//! Provides column-major 3x3 and 4x4 matrix types.

use super::{Vec3, Vec4, EPSILON};
use serde::{Deserialize, Serialize};
use std::ops::Mul;

// --- Mat3 ---

/// A 3x3 column-major matrix, used for rotations and object orientations.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[repr(C)]
pub struct Mat3 {
    /// The columns of the matrix.
    pub cols: [Vec3; 3],
}

impl Mat3 {
    /// The identity matrix.
    pub const IDENTITY: Self = Self {
        cols: [Vec3::X, Vec3::Y, Vec3::Z],
    };

    /// Creates a new matrix from three column vectors.
    #[inline]
    pub const fn from_cols(c0: Vec3, c1: Vec3, c2: Vec3) -> Self {
        Self { cols: [c0, c1, c2] }
    }

    /// Creates a rotation around the Y axis.
    pub fn from_rotation_y(angle_radians: f32) -> Self {
        let (s, c) = angle_radians.sin_cos();
        Self::from_cols(
            Vec3::new(c, 0.0, -s),
            Vec3::Y,
            Vec3::new(s, 0.0, c),
        )
    }

    /// Creates a rotation around the Z axis.
    pub fn from_rotation_z(angle_radians: f32) -> Self {
        let (s, c) = angle_radians.sin_cos();
        Self::from_cols(
            Vec3::new(c, s, 0.0),
            Vec3::new(-s, c, 0.0),
            Vec3::Z,
        )
    }

    /// Extracts the upper-left 3x3 part of a [`Mat4`].
    pub fn from_mat4(m4: &Mat4) -> Self {
        Self::from_cols(
            m4.cols[0].truncate(),
            m4.cols[1].truncate(),
            m4.cols[2].truncate(),
        )
    }

    /// Returns the transpose of the matrix.
    pub fn transpose(&self) -> Self {
        let [a, b, c] = self.cols;
        Self::from_cols(
            Vec3::new(a.x, b.x, c.x),
            Vec3::new(a.y, b.y, c.y),
            Vec3::new(a.z, b.z, c.z),
        )
    }

    /// Computes the determinant.
    pub fn determinant(&self) -> f32 {
        let [a, b, c] = self.cols;
        a.dot(b.cross(c))
    }

    /// Computes the inverse, or `None` if the matrix is singular.
    pub fn inverse(&self) -> Option<Self> {
        let [a, b, c] = self.cols;
        let det = self.determinant();
        if det.abs() < EPSILON * EPSILON {
            return None;
        }
        let inv_det = 1.0 / det;
        // Rows of the inverse are the cross products of the columns.
        let r0 = b.cross(c) * inv_det;
        let r1 = c.cross(a) * inv_det;
        let r2 = a.cross(b) * inv_det;
        Some(Self::from_cols(r0, r1, r2).transpose())
    }

    /// Promotes to a [`Mat4`] with no translation.
    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_cols(
            self.cols[0].extend(0.0),
            self.cols[1].extend(0.0),
            self.cols[2].extend(0.0),
            Vec4::new(0.0, 0.0, 0.0, 1.0),
        )
    }
}

impl Default for Mat3 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul<Vec3> for Mat3 {
    type Output = Vec3;
    #[inline]
    fn mul(self, v: Vec3) -> Vec3 {
        self.cols[0] * v.x + self.cols[1] * v.y + self.cols[2] * v.z
    }
}

impl Mul<Mat3> for Mat3 {
    type Output = Mat3;
    #[inline]
    fn mul(self, rhs: Mat3) -> Mat3 {
        Mat3::from_cols(self * rhs.cols[0], self * rhs.cols[1], self * rhs.cols[2])
    }
}

// --- Mat4 ---

/// A 4x4 column-major matrix, used for view, projection and object transforms.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[repr(C)]
pub struct Mat4 {
    /// The columns of the matrix.
    pub cols: [Vec4; 4],
}

impl Mat4 {
    /// The identity matrix.
    pub const IDENTITY: Self = Self {
        cols: [
            Vec4::new(1.0, 0.0, 0.0, 0.0),
            Vec4::new(0.0, 1.0, 0.0, 0.0),
            Vec4::new(0.0, 0.0, 1.0, 0.0),
            Vec4::new(0.0, 0.0, 0.0, 1.0),
        ],
    };

    /// Creates a new matrix from four column vectors.
    #[inline]
    pub const fn from_cols(c0: Vec4, c1: Vec4, c2: Vec4, c3: Vec4) -> Self {
        Self {
            cols: [c0, c1, c2, c3],
        }
    }

    /// Returns a row of the matrix.
    #[inline]
    pub fn get_row(&self, index: usize) -> Vec4 {
        Vec4::new(
            self.cols[0][index],
            self.cols[1][index],
            self.cols[2][index],
            self.cols[3][index],
        )
    }

    /// Creates a translation matrix.
    pub fn from_translation(v: Vec3) -> Self {
        let mut m = Self::IDENTITY;
        m.cols[3] = v.extend(1.0);
        m
    }

    /// Creates a non-uniform scale matrix.
    pub fn from_scale(s: Vec3) -> Self {
        Self::from_cols(
            Vec4::new(s.x, 0.0, 0.0, 0.0),
            Vec4::new(0.0, s.y, 0.0, 0.0),
            Vec4::new(0.0, 0.0, s.z, 0.0),
            Vec4::new(0.0, 0.0, 0.0, 1.0),
        )
    }

    /// Builds an affine transform from a linear part and a translation.
    pub fn from_mat3_translation(linear: Mat3, translation: Vec3) -> Self {
        let mut m = linear.to_mat4();
        m.cols[3] = translation.extend(1.0);
        m
    }

    /// Builds a view matrix looking from `eye` toward `target`.
    ///
    /// The resulting view space has +X right, +Y up and **+Z forward**, so
    /// points in front of the camera have positive depth.
    /// Returns `None` if `eye == target` or `up` is parallel to the view direction.
    pub fn look_at_forward_z(eye: Vec3, target: Vec3, up: Vec3) -> Option<Self> {
        let forward = (target - eye).normalize();
        if forward == Vec3::ZERO {
            return None;
        }
        let right = up.cross(forward).normalize();
        if right == Vec3::ZERO {
            return None;
        }
        let true_up = forward.cross(right);
        Some(Self::from_cols(
            Vec4::new(right.x, true_up.x, forward.x, 0.0),
            Vec4::new(right.y, true_up.y, forward.y, 0.0),
            Vec4::new(right.z, true_up.z, forward.z, 0.0),
            Vec4::new(-right.dot(eye), -true_up.dot(eye), -forward.dot(eye), 1.0),
        ))
    }

    /// Projection that keeps linear view depth in `w`.
    ///
    /// `clip.xy / clip.w` gives normalized device coordinates in `[-1, 1]`
    /// and `clip.w` is the view-space depth. The depth distribution of
    /// volumes is handled by their own slice mapping, not by this matrix.
    pub fn perspective_linear_depth(tan_half_fov_x: f32, tan_half_fov_y: f32) -> Self {
        Self::from_cols(
            Vec4::new(1.0 / tan_half_fov_x, 0.0, 0.0, 0.0),
            Vec4::new(0.0, 1.0 / tan_half_fov_y, 0.0, 0.0),
            Vec4::new(0.0, 0.0, 1.0, 1.0),
            Vec4::ZERO,
        )
    }

    /// Right-handed orthographic projection into `[-1, 1]` xy and `[0, 1]` z.
    pub fn orthographic_rh_zo(
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    ) -> Self {
        let rcp_width = 1.0 / (right - left);
        let rcp_height = 1.0 / (top - bottom);
        let r = 1.0 / (near - far);
        Self::from_cols(
            Vec4::new(2.0 * rcp_width, 0.0, 0.0, 0.0),
            Vec4::new(0.0, 2.0 * rcp_height, 0.0, 0.0),
            Vec4::new(0.0, 0.0, r, 0.0),
            Vec4::new(
                -(left + right) * rcp_width,
                -(top + bottom) * rcp_height,
                r * near,
                1.0,
            ),
        )
    }

    /// Transforms a point (w = 1) without perspective division.
    #[inline]
    pub fn transform_point3(&self, p: Vec3) -> Vec3 {
        (*self * p.extend(1.0)).truncate()
    }

    /// Transforms a direction (w = 0).
    #[inline]
    pub fn transform_vector3(&self, v: Vec3) -> Vec3 {
        (*self * v.extend(0.0)).truncate()
    }

    /// Returns the transpose of the matrix.
    pub fn transpose(&self) -> Self {
        Self::from_cols(
            self.get_row(0),
            self.get_row(1),
            self.get_row(2),
            self.get_row(3),
        )
    }

    /// Returns the matrix as a column-major `[[f32; 4]; 4]`.
    #[inline]
    pub fn to_cols_array_2d(&self) -> [[f32; 4]; 4] {
        [
            self.cols[0].to_array(),
            self.cols[1].to_array(),
            self.cols[2].to_array(),
            self.cols[3].to_array(),
        ]
    }

    /// Computes the general inverse, or `None` if the matrix is singular.
    pub fn inverse(&self) -> Option<Self> {
        let m = self.to_cols_array_2d();
        // a(row, col)
        let a = |r: usize, c: usize| m[c][r];

        let s0 = a(0, 0) * a(1, 1) - a(1, 0) * a(0, 1);
        let s1 = a(0, 0) * a(1, 2) - a(1, 0) * a(0, 2);
        let s2 = a(0, 0) * a(1, 3) - a(1, 0) * a(0, 3);
        let s3 = a(0, 1) * a(1, 2) - a(1, 1) * a(0, 2);
        let s4 = a(0, 1) * a(1, 3) - a(1, 1) * a(0, 3);
        let s5 = a(0, 2) * a(1, 3) - a(1, 2) * a(0, 3);

        let c5 = a(2, 2) * a(3, 3) - a(3, 2) * a(2, 3);
        let c4 = a(2, 1) * a(3, 3) - a(3, 1) * a(2, 3);
        let c3 = a(2, 1) * a(3, 2) - a(3, 1) * a(2, 2);
        let c2 = a(2, 0) * a(3, 3) - a(3, 0) * a(2, 3);
        let c1 = a(2, 0) * a(3, 2) - a(3, 0) * a(2, 2);
        let c0 = a(2, 0) * a(3, 1) - a(3, 0) * a(2, 1);

        let det = s0 * c5 - s1 * c4 + s2 * c3 + s3 * c2 - s4 * c1 + s5 * c0;
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let inv = 1.0 / det;

        let mut b = [[0.0f32; 4]; 4];
        let mut set = |r: usize, c: usize, v: f32| b[c][r] = v * inv;
        set(0, 0, a(1, 1) * c5 - a(1, 2) * c4 + a(1, 3) * c3);
        set(0, 1, -a(0, 1) * c5 + a(0, 2) * c4 - a(0, 3) * c3);
        set(0, 2, a(3, 1) * s5 - a(3, 2) * s4 + a(3, 3) * s3);
        set(0, 3, -a(2, 1) * s5 + a(2, 2) * s4 - a(2, 3) * s3);
        set(1, 0, -a(1, 0) * c5 + a(1, 2) * c2 - a(1, 3) * c1);
        set(1, 1, a(0, 0) * c5 - a(0, 2) * c2 + a(0, 3) * c1);
        set(1, 2, -a(3, 0) * s5 + a(3, 2) * s2 - a(3, 3) * s1);
        set(1, 3, a(2, 0) * s5 - a(2, 2) * s2 + a(2, 3) * s1);
        set(2, 0, a(1, 0) * c4 - a(1, 1) * c2 + a(1, 3) * c0);
        set(2, 1, -a(0, 0) * c4 + a(0, 1) * c2 - a(0, 3) * c0);
        set(2, 2, a(3, 0) * s4 - a(3, 1) * s2 + a(3, 3) * s0);
        set(2, 3, -a(2, 0) * s4 + a(2, 1) * s2 - a(2, 3) * s0);
        set(3, 0, -a(1, 0) * c3 + a(1, 1) * c1 - a(1, 2) * c0);
        set(3, 1, a(0, 0) * c3 - a(0, 1) * c1 + a(0, 2) * c0);
        set(3, 2, -a(3, 0) * s3 + a(3, 1) * s1 - a(3, 2) * s0);
        set(3, 3, a(2, 0) * s3 - a(2, 1) * s1 + a(2, 2) * s0);

        Some(Self::from_cols(
            Vec4::from_array(b[0]),
            Vec4::from_array(b[1]),
            Vec4::from_array(b[2]),
            Vec4::from_array(b[3]),
        ))
    }

    /// Inverse of an affine transform (linear part plus translation).
    pub fn affine_inverse(&self) -> Option<Self> {
        let linear_inv = Mat3::from_mat4(self).inverse()?;
        let translation = -(linear_inv * self.cols[3].truncate());
        Some(Self::from_mat3_translation(linear_inv, translation))
    }
}

impl Default for Mat4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul<Mat4> for Mat4 {
    type Output = Mat4;
    #[inline]
    fn mul(self, rhs: Mat4) -> Mat4 {
        Mat4::from_cols(
            self * rhs.cols[0],
            self * rhs.cols[1],
            self * rhs.cols[2],
            self * rhs.cols[3],
        )
    }
}

impl Mul<Vec4> for Mat4 {
    type Output = Vec4;
    #[inline]
    fn mul(self, v: Vec4) -> Vec4 {
        self.cols[0] * v.x + self.cols[1] * v.y + self.cols[2] * v.z + self.cols[3] * v.w
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn assert_mat4_eq(a: &Mat4, b: &Mat4) {
        for c in 0..4 {
            for r in 0..4 {
                assert_abs_diff_eq!(a.cols[c][r], b.cols[c][r], epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn test_mat4_inverse_round_trips_affine_transform() {
        let m = Mat4::from_translation(Vec3::new(1.0, -2.0, 3.0))
            * Mat3::from_rotation_y(0.7).to_mat4()
            * Mat4::from_scale(Vec3::new(2.0, 0.5, 4.0));
        let inv = m.inverse().expect("invertible");
        assert_mat4_eq(&(m * inv), &Mat4::IDENTITY);
        let affine = m.affine_inverse().expect("invertible");
        assert_mat4_eq(&inv, &affine);
    }

    #[test]
    fn test_singular_matrix_has_no_inverse() {
        assert!(Mat4::from_scale(Vec3::new(1.0, 0.0, 1.0)).inverse().is_none());
    }

    #[test]
    fn test_look_at_puts_target_on_positive_z() {
        let view = Mat4::look_at_forward_z(Vec3::ZERO, Vec3::new(0.0, 0.0, -5.0), Vec3::Y)
            .expect("valid basis");
        let p = view.transform_point3(Vec3::new(0.0, 0.0, -5.0));
        assert_abs_diff_eq!(p.z, 5.0, epsilon = 1e-5);
        assert_abs_diff_eq!(p.x, 0.0, epsilon = 1e-5);
        // +Y stays up.
        let up = view.transform_vector3(Vec3::Y);
        assert_abs_diff_eq!(up.y, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_linear_depth_projection_keeps_depth_in_w() {
        let proj = Mat4::perspective_linear_depth(1.0, 0.5);
        let clip = proj * Vec4::new(2.0, 1.0, 4.0, 1.0);
        assert_abs_diff_eq!(clip.w, 4.0);
        assert_abs_diff_eq!(clip.x / clip.w, 0.5);
        assert_abs_diff_eq!(clip.y / clip.w, 0.5);
    }
}
