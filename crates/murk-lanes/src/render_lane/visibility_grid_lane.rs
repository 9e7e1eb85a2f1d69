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

//! Per-cell visible light lists for screen tiles and fog froxels.

use murk_core::lane::{Lane, LaneKind, LaneWorkload};
use murk_core::renderer::{BufferSlot, CameraFrame, CullRecord, GraphicsDevice, ResourceError};
use rayon::prelude::*;

use super::culling::CellFrustum;
use crate::fog_lane::volume::DepthSlicing;

/// Fixed cost of dispatching the grid build.
const COMPUTE_PASS_OVERHEAD: f32 = 0.5;
/// Cost per grid cell.
const PER_CELL_COST: f32 = 0.0001;
/// Cost per light-versus-cell test.
const LIGHT_CELL_TEST_COST: f32 = 0.00001;

/// How the view is partitioned into cells.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GridLayout {
    /// Screen tiles of `tile_size` pixels covering the whole depth range.
    Tiles2D {
        /// Tile width and height in pixels.
        tile_size: u32,
        /// Render target size in pixels.
        viewport: (u32, u32),
    },
    /// Clusters of fog voxels.
    Froxels3D {
        /// Fog volume size in voxels.
        volume: [u32; 3],
        /// Voxels per cluster along each axis.
        cluster: [u32; 3],
        /// Depth distribution of the fog volume slices.
        slicing: DepthSlicing,
    },
}

impl GridLayout {
    /// Number of cells along each axis.
    pub fn cell_dims(&self) -> [u32; 3] {
        match *self {
            GridLayout::Tiles2D { tile_size, viewport } => {
                let ts = tile_size.max(1);
                [
                    viewport.0.max(1).div_ceil(ts),
                    viewport.1.max(1).div_ceil(ts),
                    1,
                ]
            }
            GridLayout::Froxels3D {
                volume, cluster, ..
            } => [0, 1, 2].map(|i| volume[i].max(1).div_ceil(cluster[i].max(1))),
        }
    }

    /// The view-space frustum of cell `(x, y, z)`.
    pub fn cell_frustum(&self, cell: [u32; 3], camera: &CameraFrame) -> CellFrustum {
        let tan = camera.tan_half_fov;
        match *self {
            GridLayout::Tiles2D { tile_size, viewport } => {
                let (w, h) = (viewport.0.max(1), viewport.1.max(1));
                let ts = tile_size.max(1);
                let (ndc_x, ndc_y) = ndc_rect(cell, [ts, ts, 1], [w, h]);
                CellFrustum::new(ndc_x, ndc_y, camera.near, camera.far, tan.x, tan.y)
            }
            GridLayout::Froxels3D {
                volume,
                cluster,
                slicing,
            } => {
                let (ndc_x, ndc_y) = ndc_rect(cell, cluster, [volume[0], volume[1]]);
                let first = cell[2] * cluster[2];
                let last = ((cell[2] + 1) * cluster[2]).min(volume[2]);
                let (near, far) = slicing.slice_range(first, last);
                CellFrustum::new(ndc_x, ndc_y, near, far, tan.x, tan.y)
            }
        }
    }
}

/// NDC rectangle of the cell covering texels `[cell * size, (cell + 1) * size)`
/// of a `extent` grid. Rows grow downward, NDC y grows upward.
fn ndc_rect(cell: [u32; 3], size: [u32; 3], extent: [u32; 2]) -> ([f32; 2], [f32; 2]) {
    let span = |i: usize| {
        let lo = (cell[i] * size[i]).min(extent[i]) as f32 / extent[i] as f32;
        let hi = ((cell[i] + 1) * size[i]).min(extent[i]) as f32 / extent[i] as f32;
        (lo, hi)
    };
    let (x0, x1) = span(0);
    let (y0, y1) = span(1);
    ([x0 * 2.0 - 1.0, x1 * 2.0 - 1.0], [1.0 - y1 * 2.0, 1.0 - y0 * 2.0])
}

/// Fixed-capacity buckets of light indices, one per cell.
///
/// Buckets live in one flat array so each cell owns a disjoint chunk.
#[derive(Debug, Clone, Default)]
pub struct VisibilityGrid {
    dims: [u32; 3],
    bucket_capacity: usize,
    counts: Vec<u32>,
    indices: Vec<u32>,
    overflow: u64,
}

impl VisibilityGrid {
    /// Creates an empty grid.
    pub fn new(dims: [u32; 3], bucket_capacity: usize) -> Self {
        let mut grid = Self::default();
        grid.resize(dims, bucket_capacity);
        grid
    }

    /// Reshapes the grid, clearing it. Reuses the allocation when possible.
    pub fn resize(&mut self, dims: [u32; 3], bucket_capacity: usize) {
        let cells = dims.iter().map(|&d| d as usize).product::<usize>();
        self.dims = dims;
        self.bucket_capacity = bucket_capacity.max(1);
        self.counts.clear();
        self.counts.resize(cells, 0);
        self.indices.clear();
        self.indices.resize(cells * self.bucket_capacity, 0);
        self.overflow = 0;
    }

    /// Cells along each axis.
    pub fn dims(&self) -> [u32; 3] {
        self.dims
    }

    /// Total number of cells.
    pub fn cell_count(&self) -> usize {
        self.counts.len()
    }

    /// Maximum indices per cell.
    pub fn bucket_capacity(&self) -> usize {
        self.bucket_capacity
    }

    /// Indices dropped because a bucket was full during the last build.
    pub fn overflow(&self) -> u64 {
        self.overflow
    }

    /// Linear index of cell `(x, y, z)`.
    #[inline]
    pub fn cell_index(&self, x: u32, y: u32, z: u32) -> usize {
        (z as usize * self.dims[1] as usize + y as usize) * self.dims[0] as usize + x as usize
    }

    /// Light indices of the cell at linear index `cell`.
    pub fn cell(&self, cell: usize) -> &[u32] {
        let start = cell * self.bucket_capacity;
        &self.indices[start..start + self.counts[cell] as usize]
    }

    /// Light indices of cell `(x, y, z)`.
    pub fn cell_at(&self, x: u32, y: u32, z: u32) -> &[u32] {
        self.cell(self.cell_index(x, y, z))
    }

    /// Per-cell counts.
    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    /// Uploads counts and the flat index buffer.
    pub fn publish(
        &self,
        device: &dyn GraphicsDevice,
        counts_slot: BufferSlot,
        indices_slot: BufferSlot,
    ) -> Result<(), ResourceError> {
        device.write_buffer(counts_slot, bytemuck::cast_slice(&self.counts))?;
        device.write_buffer(indices_slot, bytemuck::cast_slice(&self.indices))
    }
}

/// Fills a [`VisibilityGrid`] by testing every cull record against every cell.
#[derive(Debug, Clone, Copy)]
pub struct VisibilityGridLane {
    bucket_capacity: usize,
}

impl Default for VisibilityGridLane {
    fn default() -> Self {
        Self::new(128)
    }
}

impl VisibilityGridLane {
    /// A lane producing buckets of `bucket_capacity` indices.
    pub fn new(bucket_capacity: usize) -> Self {
        Self {
            bucket_capacity: bucket_capacity.max(1),
        }
    }

    /// Rebuilds `grid` for `layout`. Returns the number of dropped indices.
    ///
    /// Cells are processed in parallel; each writes only its own bucket.
    pub fn build(
        &self,
        records: &[CullRecord],
        camera: &CameraFrame,
        layout: &GridLayout,
        grid: &mut VisibilityGrid,
    ) -> u64 {
        let dims = layout.cell_dims();
        if grid.dims != dims || grid.bucket_capacity != self.bucket_capacity {
            grid.resize(dims, self.bucket_capacity);
        }
        let cap = grid.bucket_capacity;
        let plane = dims[0] as usize * dims[1] as usize;

        let overflow: u64 = grid
            .indices
            .par_chunks_mut(cap)
            .zip(grid.counts.par_iter_mut())
            .enumerate()
            .map(|(cell, (bucket, count))| {
                let coords = [
                    (cell % dims[0] as usize) as u32,
                    ((cell % plane) / dims[0] as usize) as u32,
                    (cell / plane) as u32,
                ];
                let frustum = layout.cell_frustum(coords, camera);
                let mut n = 0;
                let mut dropped = 0u64;
                for (i, record) in records.iter().enumerate() {
                    if !frustum.intersects(record) {
                        continue;
                    }
                    if n < cap {
                        bucket[n] = i as u32;
                        n += 1;
                    } else {
                        dropped += 1;
                    }
                }
                bucket[n..].fill(0);
                *count = n as u32;
                dropped
            })
            .sum();

        grid.overflow = overflow;
        if overflow > 0 {
            log::trace!("Visibility grid dropped {} light indices", overflow);
        }
        overflow
    }
}

impl Lane for VisibilityGridLane {
    fn strategy_name(&self) -> &'static str {
        "ClusteredVisibilityGrid"
    }

    fn lane_kind(&self) -> LaneKind {
        LaneKind::Culling
    }

    fn estimate_cost(&self, workload: &LaneWorkload) -> f32 {
        let cells = workload.cells as f32;
        COMPUTE_PASS_OVERHEAD
            + cells * PER_CELL_COST
            + cells * workload.lights as f32 * LIGHT_CELL_TEST_COST
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murk_core::math::{Vec3, FRAC_PI_2};
    use murk_core::renderer::{HeadlessDevice, VolumeType};

    fn camera() -> CameraFrame {
        CameraFrame::look_at(1, Vec3::ZERO, Vec3::Z, Vec3::Y, FRAC_PI_2, (64, 64), 0.1, 100.0)
            .expect("valid camera")
    }

    fn tiles() -> GridLayout {
        GridLayout::Tiles2D {
            tile_size: 16,
            viewport: (64, 64),
        }
    }

    #[test]
    fn test_tile_dims_round_up() {
        let layout = GridLayout::Tiles2D {
            tile_size: 16,
            viewport: (100, 33),
        };
        assert_eq!(layout.cell_dims(), [7, 3, 1]);
    }

    #[test]
    fn test_froxel_dims_round_up() {
        let layout = GridLayout::Froxels3D {
            volume: [30, 17, 64],
            cluster: [4, 4, 4],
            slicing: DepthSlicing {
                near: 0.1,
                distance: 64.0,
                slices: 64,
            },
        };
        assert_eq!(layout.cell_dims(), [8, 5, 16]);
    }

    #[test]
    fn test_top_left_tile_maps_to_top_left_ndc() {
        let (x, y) = ndc_rect([0, 0, 0], [16, 16, 1], [64, 64]);
        assert_eq!(x, [-1.0, -0.5]);
        assert_eq!(y, [0.5, 1.0]);
    }

    #[test]
    fn test_tile_frustum_spans_camera_depth() {
        let cam = camera();
        let frustum = tiles().cell_frustum([3, 0, 0], &cam);
        assert_eq!(frustum.depth, [cam.near, cam.far]);
        assert!(frustum.center.x > 0.0 && frustum.center.y > 0.0);
    }

    #[test]
    fn test_small_light_lands_in_its_tile_only() {
        // Up-right of the view center: NDC (0.75, 0.75) at depth 10.
        let record = CullRecord::sphere(Vec3::new(7.5, 7.5, 10.0), 0.5);
        let mut grid = VisibilityGrid::default();
        VisibilityGridLane::new(8).build(&[record], &camera(), &tiles(), &mut grid);
        assert_eq!(grid.cell_at(3, 0, 0), &[0]);
        assert!(grid.cell_at(0, 3, 0).is_empty());
        assert_eq!(grid.counts().iter().sum::<u32>(), 1);
    }

    #[test]
    fn test_sun_hits_every_cell() {
        let mut sun = CullRecord::sphere(Vec3::ZERO, 0.0);
        sun.volume_type = VolumeType::Sun as u32;
        sun.depth_bounds = [0.0, f32::MAX];
        let mut grid = VisibilityGrid::default();
        VisibilityGridLane::new(4).build(&[sun], &camera(), &tiles(), &mut grid);
        assert!(grid.counts().iter().all(|&c| c == 1));
    }

    #[test]
    fn test_overflow_drops_and_counts() {
        let big = CullRecord::sphere(Vec3::new(0.0, 0.0, 10.0), 500.0);
        let records = vec![big; 6];
        let mut grid = VisibilityGrid::default();
        let dropped = VisibilityGridLane::new(4).build(&records, &camera(), &tiles(), &mut grid);
        assert_eq!(dropped, 16 * 2);
        assert_eq!(grid.overflow(), 32);
        assert_eq!(grid.cell_at(1, 1, 0), &[0, 1, 2, 3]);
    }

    #[test]
    fn test_rebuild_clears_stale_indices() {
        let big = CullRecord::sphere(Vec3::new(0.0, 0.0, 10.0), 500.0);
        let mut grid = VisibilityGrid::default();
        let lane = VisibilityGridLane::new(4);
        lane.build(&[big, big, big], &camera(), &tiles(), &mut grid);
        lane.build(&[big], &camera(), &tiles(), &mut grid);
        let device = HeadlessDevice::new();
        grid.publish(&device, BufferSlot::TileLightCounts, BufferSlot::TileLightIndices)
            .unwrap();
        let indices = device.buffer(BufferSlot::TileLightIndices).unwrap();
        assert_eq!(indices.len(), 16 * 4 * 4);
        // First bucket: index 0, then zero padding.
        assert!(indices[..16].iter().all(|&b| b == 0));
        assert_eq!(grid.counts()[0], 1);
    }

    #[test]
    fn test_cost_grows_with_work() {
        let lane = VisibilityGridLane::default();
        let small = lane.estimate_cost(&LaneWorkload {
            lights: 1,
            cells: 16,
            voxels: 0,
        });
        let large = lane.estimate_cost(&LaneWorkload {
            lights: 200,
            cells: 4096,
            voxels: 0,
        });
        assert!(large > small);
    }
}
