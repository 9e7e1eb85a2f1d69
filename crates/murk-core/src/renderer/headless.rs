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

//! A [`GraphicsDevice`] that keeps uploads in memory.
//!
//! Used by the sandbox and by tests to observe exactly what the pipeline
//! would have sent to a GPU.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::renderer::device::{AtlasCopy, BufferSlot, GraphicsDevice};
use crate::renderer::error::ResourceError;

#[derive(Debug, Default)]
struct HeadlessState {
    buffers: HashMap<BufferSlot, Vec<u8>>,
    writes: HashMap<BufferSlot, u64>,
    copies: Vec<AtlasCopy>,
}

/// In-memory device recording buffer contents and atlas copies.
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    state: Mutex<HeadlessState>,
}

impl HeadlessDevice {
    /// Creates an empty device.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last bytes written to `slot`.
    pub fn buffer(&self, slot: BufferSlot) -> Option<Vec<u8>> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.buffers.get(&slot).cloned())
    }

    /// Number of uploads to `slot` so far.
    pub fn write_count(&self, slot: BufferSlot) -> u64 {
        self.state
            .lock()
            .map(|s| s.writes.get(&slot).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Every atlas copy received so far, in order.
    pub fn atlas_copies(&self) -> Vec<AtlasCopy> {
        self.state
            .lock()
            .map(|s| s.copies.clone())
            .unwrap_or_default()
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn write_buffer(&self, slot: BufferSlot, data: &[u8]) -> Result<(), ResourceError> {
        let mut state = self.state.lock().map_err(|_| ResourceError::DeviceLost)?;
        state.buffers.insert(slot, data.to_vec());
        *state.writes.entry(slot).or_insert(0) += 1;
        Ok(())
    }

    fn copy_to_atlas(&self, copy: &AtlasCopy) -> Result<(), ResourceError> {
        let mut state = self.state.lock().map_err(|_| ResourceError::DeviceLost)?;
        state.copies.push(*copy);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::device::AtlasKind;
    use crate::renderer::texture::TextureId;

    #[test]
    fn test_write_replaces_previous_content() {
        let device = HeadlessDevice::new();
        device.write_buffer(BufferSlot::FogCullRecords, &[1, 2, 3]).unwrap();
        device.write_buffer(BufferSlot::FogCullRecords, &[4]).unwrap();
        assert_eq!(device.buffer(BufferSlot::FogCullRecords), Some(vec![4]));
        assert_eq!(device.write_count(BufferSlot::FogCullRecords), 2);
        assert_eq!(device.write_count(BufferSlot::TiledCullRecords), 0);
    }

    #[test]
    fn test_copies_are_recorded_in_order() {
        let device = HeadlessDevice::new();
        for mip in 0..3 {
            device
                .copy_to_atlas(&AtlasCopy {
                    atlas: AtlasKind::ProjectorGobos,
                    source: TextureId(9),
                    source_mip: mip,
                    slot: 0,
                    target_mip: mip,
                    face: 0,
                })
                .unwrap();
        }
        let mips: Vec<u32> = device.atlas_copies().iter().map(|c| c.target_mip).collect();
        assert_eq!(mips, vec![0, 1, 2]);
    }
}
