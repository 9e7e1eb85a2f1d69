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

//! Defines the TiledLightingAgent.

use murk_core::lane::{Lane, LaneWorkload};
use murk_core::renderer::{
    BufferSlot, FrameDiagnostics, GraphicsDevice, LightingConfig, MAX_LIGHT_RECORDS,
};
use murk_lanes::render_lane::{
    AtlasSet, GridLayout, LightListBuffers, LightListLane, VisibilityGrid, VisibilityGridLane,
};

use crate::pipeline::FrameInputs;

/// Builds and publishes the light list and tile grid of the tiled lighting pass.
#[derive(Debug)]
pub struct TiledLightingAgent {
    config: LightingConfig,
    // Shared builder, tiled policy.
    list_lane: LightListLane,
    grid_lane: VisibilityGridLane,
    // Caller-owned buffers reused every frame.
    lights: LightListBuffers,
    grid: VisibilityGrid,
    frame_count: u64,
}

impl TiledLightingAgent {
    /// Creates the agent with buffers sized from `config`.
    pub fn new(config: LightingConfig) -> Self {
        let capacity = config.max_tiled_lights.min(MAX_LIGHT_RECORDS);
        let bucket_capacity = config.max_lights_per_tile.max(1) as usize;
        log::info!(
            "TiledLightingAgent: {} px tiles, {} lights per tile, {} records",
            config.tile_size.pixels(),
            bucket_capacity,
            capacity
        );
        Self {
            config,
            list_lane: LightListLane::tiled(),
            grid_lane: VisibilityGridLane::new(bucket_capacity),
            lights: LightListBuffers::new(capacity),
            grid: VisibilityGrid::default(),
            frame_count: 0,
        }
    }

    /// Replaces the configuration. Buffers are resized on the next update.
    pub fn set_config(&mut self, config: LightingConfig) {
        self.grid_lane = VisibilityGridLane::new(config.max_lights_per_tile.max(1) as usize);
        self.config = config;
    }

    /// Current configuration.
    pub fn config(&self) -> &LightingConfig {
        &self.config
    }

    /// Grid layout for a render target of `viewport` pixels.
    pub fn layout(&self, viewport: (u32, u32)) -> GridLayout {
        GridLayout::Tiles2D {
            tile_size: self.config.tile_size.pixels(),
            viewport,
        }
    }

    /// Runs the pass for one frame.
    pub fn update(
        &mut self,
        inputs: &FrameInputs<'_>,
        atlases: &mut AtlasSet,
        device: &dyn GraphicsDevice,
        diagnostics: &mut FrameDiagnostics,
    ) {
        let camera = inputs.camera;
        self.lights
            .reset(self.config.max_tiled_lights.min(MAX_LIGHT_RECORDS));
        self.list_lane
            .build(inputs.scene, camera, atlases, device, &mut self.lights);

        let layout = self.layout(camera.viewport);
        let overflow = self.grid_lane.build(
            self.lights.cull_records(),
            camera,
            &layout,
            &mut self.grid,
        );

        diagnostics.tiled_lights = self.lights.len() as u32;
        diagnostics.tiled_skipped_lights += self.lights.skipped();
        diagnostics.grid_overflow += overflow;

        if let Err(e) = self.lights.publish(
            device,
            BufferSlot::TiledCullRecords,
            BufferSlot::TiledShadeRecords,
        ) {
            log::error!("TiledLightingAgent: failed to upload light list: {e}");
        }
        if let Err(e) = self.grid.publish(
            device,
            BufferSlot::TileLightCounts,
            BufferSlot::TileLightIndices,
        ) {
            log::error!("TiledLightingAgent: failed to upload tile grid: {e}");
        }

        self.frame_count += 1;
        log::trace!(
            "TiledLightingAgent: frame {} estimated cost {:.3}",
            camera.frame_id,
            self.estimate_cost(camera.viewport)
        );
    }

    /// Estimated cost of the grid build for `viewport`.
    pub fn estimate_cost(&self, viewport: (u32, u32)) -> f32 {
        let dims = self.layout(viewport).cell_dims();
        let workload = LaneWorkload {
            lights: self.lights.len(),
            cells: dims.iter().map(|&d| d as usize).product(),
            voxels: 0,
        };
        self.list_lane.estimate_cost(&workload) + self.grid_lane.estimate_cost(&workload)
    }

    /// The light list built by the last update.
    pub fn lights(&self) -> &LightListBuffers {
        &self.lights
    }

    /// The tile grid built by the last update.
    pub fn grid(&self) -> &VisibilityGrid {
        &self.grid
    }

    /// Frames processed since creation.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

impl Default for TiledLightingAgent {
    fn default() -> Self {
        Self::new(LightingConfig::default())
    }
}
