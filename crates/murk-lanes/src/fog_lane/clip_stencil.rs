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

//! Clip-volume stencil of the fog volume.
//!
//! Each voxel stores the encoded stencil reference of the clip volume that
//! covers it (`stencil_ref + 1`, wrapping), or 0 when none does. Fog volumes
//! restricted to their own area compare against this value.

use std::ops::Range;

use murk_core::lane::{Lane, LaneError, LaneKind, LaneWorkload};
use murk_core::math::Mat4;

use super::volume::{Volume3D, VoxelMapping};
use super::{FogFrame, FogLane, FogProgram};

/// Encoded stencil value written for a clip volume with reference `stencil_ref`.
#[inline]
pub fn encode_stencil_ref(stencil_ref: u8) -> u8 {
    stencil_ref.wrapping_add(1)
}

/// Voxel stencil plus the progress of its incremental rebuild.
///
/// After an allocation or a history break the stencil is rebuilt a quarter
/// of the slices per frame; once every slice has been written it is fully
/// refreshed each frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipVolumeStencil {
    voxels: Volume3D<u8>,
    cursor: u32,
    complete: bool,
}

impl ClipVolumeStencil {
    /// An empty stencil awaiting its first rebuild.
    pub fn new(dims: [u32; 3]) -> Self {
        Self {
            voxels: Volume3D::new(dims),
            cursor: 0,
            complete: false,
        }
    }

    /// Restarts the incremental rebuild.
    pub fn invalidate(&mut self) {
        self.cursor = 0;
        self.complete = false;
    }

    /// Whether every slice has been written since the last invalidation.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Slices to write this frame.
    pub fn pending_slices(&self) -> Range<u32> {
        let depth = self.voxels.dims()[2];
        if self.complete {
            return 0..depth;
        }
        let step = depth.div_ceil(4).max(1);
        self.cursor..(self.cursor + step).min(depth)
    }

    /// Marks `slices` as written.
    pub fn commit(&mut self, slices: Range<u32>) {
        self.cursor = self.cursor.max(slices.end);
        if self.cursor >= self.voxels.dims()[2] {
            self.complete = true;
        }
    }

    /// Encoded stencil of voxel `(x, y, z)`.
    #[inline]
    pub fn get(&self, x: u32, y: u32, z: u32) -> u8 {
        self.voxels.get(x, y, z)
    }

    /// The stencil voxels.
    pub fn voxels(&self) -> &Volume3D<u8> {
        &self.voxels
    }
}

/// Rasterizes unit-box clip volumes into the voxel stencil.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClipStencilLane;

impl ClipStencilLane {
    /// Creates the lane.
    pub fn new() -> Self {
        Self
    }
}

impl Lane for ClipStencilLane {
    fn strategy_name(&self) -> &'static str {
        "ClipVolumeStencil"
    }

    fn lane_kind(&self) -> LaneKind {
        LaneKind::Fog
    }

    fn estimate_cost(&self, workload: &LaneWorkload) -> f32 {
        workload.voxels as f32 * 0.000002
    }
}

impl FogLane for ClipStencilLane {
    fn program(&self) -> FogProgram {
        FogProgram::ClipStencil
    }

    fn execute(&self, frame: &mut FogFrame<'_>) -> Result<(), LaneError> {
        frame.programs.require(self.program())?;
        let dims = frame.volumes.dims();
        let mapping = VoxelMapping::new(frame.camera, frame.slicing(), dims).ok_or_else(|| {
            LaneError::InvalidInput {
                expected: "invertible camera transform",
                received: format!("{:?}", frame.camera.world_to_view),
            }
        })?;
        let clips: Vec<(Mat4, u8)> = frame
            .clip_volumes
            .iter()
            .filter_map(|clip| {
                let world_to_object = clip.world_transform.inverse()?;
                Some((world_to_object, encode_stencil_ref(clip.stencil_ref)))
            })
            .collect();

        let stencil = &mut frame.volumes.stencil;
        let slices = stencil.pending_slices();
        for z in slices.clone() {
            for y in 0..dims[1] {
                for x in 0..dims[0] {
                    let world = mapping.world_position(x, y, z);
                    let value = clips
                        .iter()
                        .rev()
                        .find(|(world_to_object, _)| {
                            world_to_object.transform_point3(world).abs().max_element() <= 1.0
                        })
                        .map_or(0, |&(_, value)| value);
                    stencil.voxels.set(x, y, z, value);
                }
            }
        }
        stencil.commit(slices);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rebuild_takes_four_frames_then_refreshes_all() {
        let mut stencil = ClipVolumeStencil::new([2, 2, 10]);
        let mut written = Vec::new();
        while !stencil.is_complete() {
            let range = stencil.pending_slices();
            written.push(range.clone());
            stencil.commit(range);
        }
        assert_eq!(written, vec![0..3, 3..6, 6..9, 9..10]);
        assert_eq!(stencil.pending_slices(), 0..10);

        stencil.invalidate();
        assert_eq!(stencil.pending_slices(), 0..3);
    }

    #[test]
    fn test_encoding_reserves_zero() {
        assert_eq!(encode_stencil_ref(0), 1);
        assert_eq!(encode_stencil_ref(254), 255);
    }
}
