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

//! Defines the VolumetricFogAgent.

use murk_core::lane::{Lane, LaneError, LaneWorkload};
use murk_core::renderer::{
    BufferSlot, FogConfig, FrameDiagnostics, GraphicsDevice, MAX_LIGHT_RECORDS,
};
use murk_lanes::fog_lane::{
    BlurLane, ClipStencilLane, DensityInjectionLane, DepthDownscaleLane, DepthSlicing, FogFrame,
    FogLane, FogProgram, FogVolumeAggregator, InScatteringLane, PassContext, PreparedFogVolumes, ProgramSet,
    RaymarchLane, ReprojectionLane, ReprojectionState, VolumeBuffers,
};
use murk_lanes::render_lane::{
    AtlasSet, GridLayout, LightListBuffers, LightListLane, VisibilityGrid, VisibilityGridLane,
};

use crate::pipeline::FrameInputs;

/// Runs `stages` in order against `frame`. Returns how many failed.
fn run_stages(stages: &[Box<dyn FogLane>], frame: &mut FogFrame<'_>) -> u32 {
    let mut failed = 0;
    for stage in stages {
        if let Err(e) = stage.execute(frame) {
            failed += 1;
            match e {
                LaneError::ProgramUnavailable { program } => log::warn!(
                    "VolumetricFogAgent: stage '{}' skipped, program '{program}' unavailable",
                    stage.strategy_name()
                ),
                other => log::warn!(
                    "VolumetricFogAgent: stage '{}' failed: {other}",
                    stage.strategy_name()
                ),
            }
        }
    }
    failed
}

/// The agent responsible for the volumetric fog pass.
pub struct VolumetricFogAgent {
    config: FogConfig,
    programs: ProgramSet,
    // Fog light list, built independently of the tiled one.
    list_lane: LightListLane,
    lights: LightListBuffers,
    grid_lane: VisibilityGridLane,
    grid: VisibilityGrid,
    // Stages before and after the fog light grid build.
    pre_grid_stages: Vec<Box<dyn FogLane>>,
    post_grid_stages: Vec<Box<dyn FogLane>>,
    raymarch: RaymarchLane,
    prepared: PreparedFogVolumes,
    volumes: VolumeBuffers,
    reprojection: ReprojectionState,
    frame_count: u64,
}

impl std::fmt::Debug for VolumetricFogAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumetricFogAgent")
            .field("config", &self.config)
            .field("programs", &self.programs)
            .field("dims", &self.volumes.dims())
            .field("trust", &self.reprojection.trust())
            .field("frame_count", &self.frame_count)
            .finish()
    }
}

impl VolumetricFogAgent {
    /// Creates the agent. Volumes are allocated on the first update.
    pub fn new(config: FogConfig) -> Self {
        let config = config.sanitized();
        log::info!(
            "VolumetricFogAgent: {} slices over {} m, {:?} injection",
            config.depth_slices,
            config.raymarch_distance,
            config.injection_mode
        );
        Self {
            list_lane: LightListLane::fog(&config),
            lights: LightListBuffers::new(config.max_fog_lights.min(MAX_LIGHT_RECORDS)),
            grid_lane: VisibilityGridLane::new(config.max_lights_per_froxel as usize),
            grid: VisibilityGrid::default(),
            pre_grid_stages: vec![
                Box::new(DepthDownscaleLane::new()),
                Box::new(ClipStencilLane::new()),
                Box::new(DensityInjectionLane::new()),
            ],
            post_grid_stages: vec![
                Box::new(InScatteringLane::new()),
                Box::new(BlurLane::new()),
                Box::new(ReprojectionLane::new()),
                Box::new(RaymarchLane::new()),
            ],
            raymarch: RaymarchLane::new(),
            prepared: PreparedFogVolumes::new(),
            volumes: VolumeBuffers::default(),
            reprojection: ReprojectionState::new(),
            programs: ProgramSet::all(),
            frame_count: 0,
            config,
        }
    }

    /// Replaces the configuration. Changes that alter the volumes or the
    /// raymarch distance reset the temporal history on the next update.
    pub fn set_config(&mut self, config: FogConfig) {
        let config = config.sanitized();
        self.list_lane = LightListLane::fog(&config);
        self.grid_lane = VisibilityGridLane::new(config.max_lights_per_froxel as usize);
        self.config = config;
    }

    /// Current, sanitized configuration.
    pub fn config(&self) -> &FogConfig {
        &self.config
    }

    /// Declares which compute programs are available.
    pub fn set_programs(&mut self, programs: ProgramSet) {
        self.programs = programs;
    }

    /// Programs the stages may dispatch.
    pub fn programs(&self) -> ProgramSet {
        self.programs
    }

    /// Runs the fog pass for one frame.
    ///
    /// Fog volumes are taken from the `context` list of `aggregator`.
    pub fn update(
        &mut self,
        inputs: &FrameInputs<'_>,
        atlases: &mut AtlasSet,
        device: &dyn GraphicsDevice,
        aggregator: &FogVolumeAggregator,
        context: PassContext,
        diagnostics: &mut FrameDiagnostics,
    ) {
        if !self.config.enabled {
            return;
        }
        let camera = inputs.camera;
        let dims = self.config.volume_dimensions(camera.viewport);
        let reallocated = self.volumes.ensure(dims, self.config.legacy_density);
        if self.reprojection.observe(camera, &self.config, reallocated) {
            self.volumes.stencil.invalidate();
        }
        self.volumes.begin_frame();

        self.lights
            .reset(self.config.max_fog_lights.min(MAX_LIGHT_RECORDS));
        self.list_lane
            .build(inputs.scene, camera, atlases, device, &mut self.lights);
        diagnostics.fog_lights = self.lights.len() as u32;
        diagnostics.fog_skipped_lights += self.lights.skipped();

        let raymarch_end = camera.near + self.config.raymarch_distance;
        aggregator.prepare(context, camera, raymarch_end, &mut self.prepared);
        diagnostics.culled_fog_volumes += self.prepared.culled();
        diagnostics.dropped_fog_volumes += aggregator.dropped(context);

        let mut failed = {
            let mut frame = FogFrame {
                camera,
                config: &self.config,
                programs: self.programs,
                scene_depth: inputs.scene_depth,
                sun_shadow: inputs.sun_shadow,
                clip_volumes: inputs.clip_volumes,
                fog_volumes: self.prepared.inject_records(),
                cull_records: self.lights.cull_records(),
                shade_records: self.lights.shade_records(),
                grid: None,
                cluster: self.config.froxel_size,
                volumes: &mut self.volumes,
                reprojection: &mut self.reprojection,
            };
            run_stages(&self.pre_grid_stages, &mut frame)
        };

        let layout = GridLayout::Froxels3D {
            volume: dims,
            cluster: self.config.froxel_size,
            slicing: DepthSlicing {
                near: camera.near,
                distance: self.config.raymarch_distance,
                slices: dims[2],
            },
        };
        diagnostics.grid_overflow += self.grid_lane.build(
            self.lights.cull_records(),
            camera,
            &layout,
            &mut self.grid,
        );

        failed += {
            let mut frame = FogFrame {
                camera,
                config: &self.config,
                programs: self.programs,
                scene_depth: inputs.scene_depth,
                sun_shadow: inputs.sun_shadow,
                clip_volumes: inputs.clip_volumes,
                fog_volumes: self.prepared.inject_records(),
                cull_records: self.lights.cull_records(),
                shade_records: self.lights.shade_records(),
                grid: Some(&self.grid),
                cluster: self.config.froxel_size,
                volumes: &mut self.volumes,
                reprojection: &mut self.reprojection,
            };
            run_stages(&self.post_grid_stages, &mut frame)
        };
        // A reprojection stage that did not run leaves the trust untouched.
        diagnostics.reprojection_bypassed = !self.programs.contains(FogProgram::Reprojection)
            || self.reprojection.was_bypassed();
        diagnostics.failed_stages += failed;

        self.publish(device);
        self.frame_count += 1;
    }

    fn publish(&self, device: &dyn GraphicsDevice) {
        let results = [
            self.lights.publish(
                device,
                BufferSlot::FogCullRecords,
                BufferSlot::FogShadeRecords,
            ),
            self.grid.publish(
                device,
                BufferSlot::FroxelLightCounts,
                BufferSlot::FroxelLightIndices,
            ),
            self.prepared.publish(device),
            self.raymarch.publish(&self.volumes, device),
        ];
        for e in results.into_iter().filter_map(Result::err) {
            log::error!("VolumetricFogAgent: upload failed: {e}");
        }
    }

    /// Estimated cost of every stage for a volume of `dims` voxels.
    pub fn estimate_cost(&self, dims: [u32; 3]) -> f32 {
        let workload = LaneWorkload {
            lights: self.lights.len(),
            cells: dims
                .iter()
                .zip(self.config.froxel_size)
                .map(|(&d, c)| d.div_ceil(c.max(1)) as usize)
                .product(),
            voxels: dims.iter().map(|&d| d as usize).product(),
        };
        self.pre_grid_stages
            .iter()
            .chain(&self.post_grid_stages)
            .map(|stage| stage.estimate_cost(&workload))
            .sum::<f32>()
            + self.grid_lane.estimate_cost(&workload)
    }

    /// The fog volumes of the last update.
    pub fn volumes(&self) -> &VolumeBuffers {
        &self.volumes
    }

    /// Temporal history state.
    pub fn reprojection(&self) -> &ReprojectionState {
        &self.reprojection
    }

    /// The fog light list of the last update.
    pub fn lights(&self) -> &LightListBuffers {
        &self.lights
    }

    /// The fog light grid of the last update.
    pub fn grid(&self) -> &VisibilityGrid {
        &self.grid
    }

    /// The fog volumes prepared by the last update.
    pub fn prepared_volumes(&self) -> &PreparedFogVolumes {
        &self.prepared
    }

    /// Frames processed since creation.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

impl Default for VolumetricFogAgent {
    fn default() -> Self {
        Self::new(FogConfig::default())
    }
}
