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

//! Per-frame counters of the pipeline.
//!
//! Every skip policy of the pipeline increments one of these counters
//! instead of failing the frame. The agents reset them at the start of a
//! frame and log a summary at the end.

/// Counters describing what one frame dropped, skipped or refreshed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameDiagnostics {
    /// Records in the tiled light list.
    pub tiled_lights: u32,
    /// Records in the fog light list.
    pub fog_lights: u32,
    /// Lights or light faces dropped by the tiled list builder.
    pub tiled_skipped_lights: u32,
    /// Lights or light faces dropped by the fog list builder.
    pub fog_skipped_lights: u32,
    /// Successful atlas insertions that copied texture data.
    pub atlas_updates: u32,
    /// Light indices dropped because a cell bucket was full.
    pub grid_overflow: u64,
    /// Fog volumes dropped because a context list was full.
    pub dropped_fog_volumes: u32,
    /// Fog volumes rejected because they start beyond the raymarch end.
    pub culled_fog_volumes: u32,
    /// Whether temporal reprojection was bypassed this frame.
    pub reprojection_bypassed: bool,
    /// Fog stages that could not run this frame.
    pub failed_stages: u32,
}

impl FrameDiagnostics {
    /// Clears every counter for a new frame.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Logs the counters at debug level, and warns on anything dropped.
    pub fn log_summary(&self, frame_id: u64) {
        log::debug!(
            "frame {frame_id}: {} tiled / {} fog lights, {} atlas updates, {} fog volumes culled",
            self.tiled_lights,
            self.fog_lights,
            self.atlas_updates,
            self.culled_fog_volumes
        );
        if self.tiled_skipped_lights > 0
            || self.fog_skipped_lights > 0
            || self.grid_overflow > 0
            || self.dropped_fog_volumes > 0
        {
            log::debug!(
                "frame {frame_id}: skipped {} tiled / {} fog lights, dropped {} cell indices and {} fog volumes",
                self.tiled_skipped_lights,
                self.fog_skipped_lights,
                self.grid_overflow,
                self.dropped_fog_volumes
            );
        }
        if self.failed_stages > 0 {
            log::warn!("frame {frame_id}: {} fog stages did not run", self.failed_stages);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_clears_both_skip_counters() {
        let mut diagnostics = FrameDiagnostics {
            tiled_skipped_lights: 3,
            fog_skipped_lights: 2,
            failed_stages: 1,
            ..FrameDiagnostics::default()
        };
        diagnostics.reset();
        assert_eq!(diagnostics, FrameDiagnostics::default());
    }
}
