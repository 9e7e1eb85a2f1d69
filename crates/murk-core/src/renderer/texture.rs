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

//! Texture handles and descriptors seen by the resource atlas.
//!
//! The atlas never owns texture memory of its sources. It only needs enough
//! metadata to decide whether a source can be copied into one of its array
//! slots, and a stable identity to recognise a source it already holds.

use serde::{Deserialize, Serialize};

/// An opaque handle to a texture owned by the asset system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

/// Pixel formats that atlas slots and their sources may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TextureFormat {
    /// 8-bit RGBA, normalized.
    #[default]
    Rgba8Unorm,
    /// 16-bit float RGBA.
    Rgba16Float,
    /// Packed 11/11/10 float RGB.
    Rg11b10Float,
    /// BC1 block compression.
    Bc1RgbaUnorm,
    /// BC3 block compression.
    Bc3RgbaUnorm,
    /// BC6H unsigned HDR block compression.
    Bc6hRgbUfloat,
}

/// How much of a texture's data is resident on the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Residency {
    /// No data has been loaded (missing file or not yet requested).
    NotLoaded,
    /// A streamed texture with only part of its mip chain resident.
    PartiallyStreamed,
    /// Every mip level is resident.
    Resident,
}

/// Metadata of a texture that may be cached in an atlas slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureSource {
    /// Identity of the source texture.
    pub id: TextureId,
    /// Width of mip 0, in pixels.
    pub width: u32,
    /// Height of mip 0, in pixels.
    pub height: u32,
    /// Number of mip levels.
    pub mip_count: u32,
    /// Pixel format.
    pub format: TextureFormat,
    /// Whether this is a cubemap (6 faces).
    pub is_cube: bool,
    /// Residency state.
    pub residency: Residency,
    /// Frame stamp of the last content change, or 0 if the texture was
    /// never modified after load.
    pub update_stamp: u64,
}

impl TextureSource {
    /// A fully resident square 2D texture with a complete mip chain.
    pub fn resident_2d(id: u64, size: u32, format: TextureFormat) -> Self {
        Self {
            id: TextureId(id),
            width: size,
            height: size,
            mip_count: mip_levels_for(size),
            format,
            is_cube: false,
            residency: Residency::Resident,
            update_stamp: 0,
        }
    }

    /// A fully resident cubemap with a complete mip chain.
    pub fn resident_cube(id: u64, size: u32, format: TextureFormat) -> Self {
        Self {
            is_cube: true,
            ..Self::resident_2d(id, size, format)
        }
    }

    /// Number of faces to copy per mip level.
    #[inline]
    pub const fn face_count(&self) -> u32 {
        if self.is_cube {
            6
        } else {
            1
        }
    }
}

/// Shape of one atlas texture array. Every slot has the same shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtlasDescriptor {
    /// Number of array slots.
    pub capacity: usize,
    /// Width and height of each slot, in pixels.
    pub size: u32,
    /// Number of mip levels per slot.
    pub mip_count: u32,
    /// Pixel format of the array.
    pub format: TextureFormat,
    /// Whether each slot is a cubemap.
    pub is_cube: bool,
}

/// Number of mips of a full chain for a square texture of `size` pixels.
#[inline]
pub const fn mip_levels_for(size: u32) -> u32 {
    if size == 0 {
        0
    } else {
        32 - size.leading_zeros()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_levels_for_power_of_two() {
        assert_eq!(mip_levels_for(1), 1);
        assert_eq!(mip_levels_for(256), 9);
        assert_eq!(mip_levels_for(0), 0);
    }

    #[test]
    fn test_cube_source_has_six_faces() {
        let cube = TextureSource::resident_cube(7, 128, TextureFormat::Bc6hRgbUfloat);
        assert_eq!(cube.face_count(), 6);
        assert_eq!(cube.mip_count, 8);
    }
}
