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

//! Error types of the GPU resource seam.

use std::fmt;

use crate::renderer::device::BufferSlot;

/// An error reported by a [`GraphicsDevice`](crate::renderer::GraphicsDevice).
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceError {
    /// The device is gone; nothing can be uploaded anymore.
    DeviceLost,
    /// A buffer upload exceeded the buffer's allocated size.
    BufferOverflow {
        /// Destination buffer.
        slot: BufferSlot,
        /// Bytes requested.
        requested: usize,
        /// Bytes available.
        capacity: usize,
    },
    /// An atlas copy referenced a slot or mip outside the atlas.
    InvalidAtlasRegion {
        /// Slot index of the copy.
        slot: u32,
        /// Target mip of the copy.
        mip: u32,
    },
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::DeviceLost => write!(f, "Graphics device lost"),
            ResourceError::BufferOverflow {
                slot,
                requested,
                capacity,
            } => write!(
                f,
                "Upload of {requested} bytes to {slot:?} exceeds its {capacity} byte capacity"
            ),
            ResourceError::InvalidAtlasRegion { slot, mip } => {
                write!(f, "Atlas copy targets invalid region (slot {slot}, mip {mip})")
            }
        }
    }
}

impl std::error::Error for ResourceError {}
