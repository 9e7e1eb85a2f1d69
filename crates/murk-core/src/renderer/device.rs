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

//! The seam between the pipeline and a graphics backend.
//!
//! Lanes never talk to a graphics API directly. Whatever they publish for
//! the downstream shading pass goes through [`GraphicsDevice`]: full-buffer
//! uploads of record arrays and grids, and per-mip copies into atlas slots.

use crate::renderer::error::ResourceError;
use crate::renderer::texture::TextureId;

/// The well-known GPU buffers written by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferSlot {
    /// Cull records of the tiled lighting pass.
    TiledCullRecords,
    /// Shade records of the tiled lighting pass.
    TiledShadeRecords,
    /// Per-tile light counts.
    TileLightCounts,
    /// Per-tile light index buckets.
    TileLightIndices,
    /// Cull records of the fog pass.
    FogCullRecords,
    /// Shade records of the fog pass.
    FogShadeRecords,
    /// Per-cluster light counts of the fog grid.
    FroxelLightCounts,
    /// Per-cluster light index buckets of the fog grid.
    FroxelLightIndices,
    /// Culling records of the prepared local fog volumes.
    FogVolumeCullRecords,
    /// Injection records of the prepared local fog volumes.
    FogVolumeInjectRecords,
    /// Integrated fog scattering volume.
    ScatteringVolume,
}

/// Which atlas array a copy targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtlasKind {
    /// Prefiltered specular probe cubemaps.
    SpecularProbes,
    /// Irradiance probe cubemaps.
    DiffuseProbes,
    /// Projector textures.
    ProjectorGobos,
}

/// One sub-resource copy from a source texture into an atlas slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtlasCopy {
    /// Destination atlas.
    pub atlas: AtlasKind,
    /// Source texture.
    pub source: TextureId,
    /// Source mip level.
    pub source_mip: u32,
    /// Destination slot.
    pub slot: u32,
    /// Destination mip level.
    pub target_mip: u32,
    /// Cube face, 0 for 2D textures.
    pub face: u32,
}

/// A graphics backend able to receive the pipeline's outputs.
pub trait GraphicsDevice: Send + Sync + std::fmt::Debug {
    /// Replaces the whole content of `slot` with `data`.
    fn write_buffer(&self, slot: BufferSlot, data: &[u8]) -> Result<(), ResourceError>;

    /// Copies one sub-resource of a source texture into an atlas slot.
    fn copy_to_atlas(&self, copy: &AtlasCopy) -> Result<(), ResourceError>;
}
