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

//! Intersection tests between culling records and grid cells.
//!
//! A cell is the frustum slab spanned by an NDC rectangle between two view
//! depths. Its four side planes pass through the camera origin, so each is
//! fully described by its normal.

use murk_core::math::{Plane, Vec3};
use murk_core::renderer::{CullRecord, VolumeType};

/// The view-space volume covered by one grid cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellFrustum {
    /// Left, right, bottom, top, near, far. Normals point inward.
    pub planes: [Plane; 6],
    /// The eight corners, near face first.
    pub corners: [Vec3; 8],
    /// View depth range `[near, far]`.
    pub depth: [f32; 2],
    /// Bounding sphere center.
    pub center: Vec3,
    /// Bounding sphere radius.
    pub radius: f32,
}

impl CellFrustum {
    /// Builds the cell spanning NDC `[x0, x1] × [y0, y1]` between view depths
    /// `near` and `far`, for a camera with half-FOV tangents `tan_x`, `tan_y`.
    pub fn new(ndc_x: [f32; 2], ndc_y: [f32; 2], near: f32, far: f32, tan_x: f32, tan_y: f32) -> Self {
        let [x0, x1] = ndc_x;
        let [y0, y1] = ndc_y;
        let side = |normal: Vec3| Plane {
            normal: normal.normalize(),
            d: 0.0,
        };
        let planes = [
            side(Vec3::new(1.0, 0.0, -x0 * tan_x)),
            side(Vec3::new(-1.0, 0.0, x1 * tan_x)),
            side(Vec3::new(0.0, 1.0, -y0 * tan_y)),
            side(Vec3::new(0.0, -1.0, y1 * tan_y)),
            Plane {
                normal: Vec3::Z,
                d: -near,
            },
            Plane {
                normal: -Vec3::Z,
                d: far,
            },
        ];

        let corner = |x: f32, y: f32, z: f32| Vec3::new(x * tan_x * z, y * tan_y * z, z);
        let mut corners = [Vec3::ZERO; 8];
        for (i, &z) in [near, far].iter().enumerate() {
            corners[i * 4] = corner(x0, y0, z);
            corners[i * 4 + 1] = corner(x1, y0, z);
            corners[i * 4 + 2] = corner(x0, y1, z);
            corners[i * 4 + 3] = corner(x1, y1, z);
        }
        let center = corners.iter().fold(Vec3::ZERO, |acc, &c| acc + c) * 0.125;
        let radius = corners
            .iter()
            .map(|&c| (c - center).length())
            .fold(0.0, f32::max);

        Self {
            planes,
            corners,
            depth: [near, far],
            center,
            radius,
        }
    }

    /// Conservative test of `record` against this cell.
    ///
    /// May report false positives, never false negatives. Sun records always
    /// intersect; unknown volume types never do.
    pub fn intersects(&self, record: &CullRecord) -> bool {
        let volume = match record.volume() {
            Some(VolumeType::Sun) => return true,
            Some(v) => v,
            None => return false,
        };
        let [min_z, max_z] = record.depth_bounds;
        if max_z < self.depth[0] || min_z > self.depth[1] {
            return false;
        }
        match volume {
            VolumeType::Sphere => self.intersects_sphere(record.position(), record.radius()),
            VolumeType::Obb => {
                let axes = [0, 1, 2].map(|i| {
                    let p = record.param(i);
                    (p.truncate(), p.w)
                });
                self.intersects_obb(record.position(), &axes)
            }
            VolumeType::Cone => {
                let p = record.param(0);
                self.intersects_cone(record.position(), p.truncate(), record.radius(), p.w)
            }
            VolumeType::Sun => true,
        }
    }

    /// Sphere against the six planes.
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.signed_distance(center) >= -radius)
    }

    /// Oriented box given as center and `(unit axis, half extent)` pairs.
    ///
    /// Runs the plane test with the box's projected radius, then separates
    /// along the box's own axes using the cell corners.
    pub fn intersects_obb(&self, center: Vec3, axes: &[(Vec3, f32); 3]) -> bool {
        for plane in &self.planes {
            let r: f32 = axes
                .iter()
                .map(|(axis, extent)| plane.normal.dot(*axis).abs() * extent)
                .sum();
            if plane.signed_distance(center) < -r {
                return false;
            }
        }
        axes.iter().all(|(axis, extent)| {
            let (lo, hi) = self.corners.iter().fold((f32::MAX, f32::MIN), |(lo, hi), &c| {
                let d = axis.dot(c - center);
                (lo.min(d), hi.max(d))
            });
            hi >= -extent && lo <= *extent
        })
    }

    /// Cone with `apex`, unit `axis`, length `height` and base radius
    /// `base_radius`, against the cell's bounding sphere.
    pub fn intersects_cone(&self, apex: Vec3, axis: Vec3, height: f32, base_radius: f32) -> bool {
        let v = self.center - apex;
        let v_len_sq = v.length_squared();
        let v1 = v.dot(axis);
        let angle = base_radius.atan2(height);
        let distance_closest = angle.cos() * (v_len_sq - v1 * v1).max(0.0).sqrt() - v1 * angle.sin();
        let angle_cull = distance_closest > self.radius;
        let front_cull = v1 > self.radius + height;
        let back_cull = v1 < -self.radius;
        !(angle_cull || front_cull || back_cull)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murk_core::math::Vec4;

    fn full_view(near: f32, far: f32) -> CellFrustum {
        CellFrustum::new([-1.0, 1.0], [-1.0, 1.0], near, far, 1.0, 1.0)
    }

    #[test]
    fn test_sphere_inside_and_outside() {
        let cell = full_view(1.0, 20.0);
        assert!(cell.intersects_sphere(Vec3::new(0.0, 0.0, 10.0), 1.0));
        assert!(!cell.intersects_sphere(Vec3::new(30.0, 0.0, 10.0), 1.0));
        assert!(!cell.intersects_sphere(Vec3::new(0.0, 0.0, -5.0), 1.0));
        assert!(cell.intersects_sphere(Vec3::new(0.0, 0.0, 0.5), 1.0));
    }

    #[test]
    fn test_corners_lie_on_side_planes() {
        let cell = CellFrustum::new([-0.5, 0.25], [0.0, 0.5], 2.0, 8.0, 0.7, 0.4);
        for c in cell.corners {
            for plane in &cell.planes {
                assert!(plane.signed_distance(c) > -1e-4);
            }
        }
        assert!(cell.planes[..4].iter().any(|p| p.signed_distance(cell.corners[0]).abs() < 1e-4));
    }

    #[test]
    fn test_depth_bounds_reject_first() {
        let cell = full_view(1.0, 5.0);
        let mut record = CullRecord::sphere(Vec3::new(0.0, 0.0, 3.0), 1.0);
        assert!(cell.intersects(&record));
        record.depth_bounds = [6.0, 7.0];
        assert!(!cell.intersects(&record));
    }

    #[test]
    fn test_sun_always_and_unknown_never() {
        let cell = full_view(1.0, 5.0);
        let mut record = CullRecord::sphere(Vec3::new(100.0, 0.0, -100.0), 0.0);
        record.volume_type = VolumeType::Sun as u32;
        assert!(cell.intersects(&record));
        record.volume_type = 0;
        record.pos_rad = [0.0, 0.0, 3.0, 10.0];
        assert!(!cell.intersects(&record));
    }

    #[test]
    fn test_obb_separated_on_own_axis() {
        let cell = CellFrustum::new([-0.1, 0.1], [-0.1, 0.1], 9.0, 11.0, 1.0, 1.0);
        let inv_sqrt2 = std::f32::consts::FRAC_1_SQRT_2;
        let axes = [
            (Vec3::new(inv_sqrt2, inv_sqrt2, 0.0), 0.1),
            (Vec3::new(-inv_sqrt2, inv_sqrt2, 0.0), 5.0),
            (Vec3::Z, 5.0),
        ];
        // Thin slab rotated 45 degrees, offset diagonally past the cell.
        assert!(!cell.intersects_obb(Vec3::new(2.5, 2.5, 10.0), &axes));
        assert!(cell.intersects_obb(Vec3::new(0.0, 0.0, 10.0), &axes));
    }

    #[test]
    fn test_cone_front_back_and_side() {
        let cell = CellFrustum::new([-0.1, 0.1], [-0.1, 0.1], 9.0, 11.0, 1.0, 1.0);
        // Pointing at the cell.
        assert!(cell.intersects_cone(Vec3::ZERO, Vec3::Z, 20.0, 5.0));
        // Too short to reach it.
        assert!(!cell.intersects_cone(Vec3::ZERO, Vec3::Z, 5.0, 2.0));
        // Pointing away.
        assert!(!cell.intersects_cone(Vec3::new(0.0, 0.0, 15.0), Vec3::Z, 20.0, 5.0));
        // Narrow cone pointing sideways.
        assert!(!cell.intersects_cone(Vec3::new(0.0, 0.0, 10.0) - Vec3::X * 5.0, Vec3::Y, 20.0, 0.5));
    }

    #[test]
    fn test_cone_record_dispatch() {
        let cell = full_view(1.0, 20.0);
        let mut record = CullRecord::sphere(Vec3::new(0.0, 0.0, 2.0), 10.0);
        record.volume_type = VolumeType::Cone as u32;
        record.volume_params[0] = Vec4::new(0.0, 0.0, 1.0, 3.0).to_array();
        assert!(cell.intersects(&record));
    }
}
