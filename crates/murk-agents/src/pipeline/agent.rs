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

//! Defines the FramePipeline and its per-frame inputs.

use std::sync::Arc;

use murk_core::renderer::{
    CameraFrame, ClipVolume, FogVolumeDescriptor, FrameDiagnostics, GraphicsDevice,
    PipelineConfig, SceneLights,
};
use murk_lanes::fog_lane::{
    FogVolumeAggregator, PassContext, ProgramSet, SunShadowMap, Texture2D,
};
use murk_lanes::render_lane::AtlasSet;

use crate::fog_agent::VolumetricFogAgent;
use crate::lighting_agent::TiledLightingAgent;

/// Everything the scene hands over for one frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameInputs<'a> {
    /// Camera of the frame.
    pub camera: &'a CameraFrame,
    /// Scene lights, read-only.
    pub scene: &'a SceneLights,
    /// Full resolution linear view depth, if a depth pre-pass ran.
    pub scene_depth: Option<&'a Texture2D<f32>>,
    /// Sun shadow map, if the sun casts shadows.
    pub sun_shadow: Option<&'a SunShadowMap>,
    /// Clip volumes tagging fog voxels.
    pub clip_volumes: &'a [ClipVolume],
}

impl<'a> FrameInputs<'a> {
    /// Inputs with only a camera and lights.
    pub fn new(camera: &'a CameraFrame, scene: &'a SceneLights) -> Self {
        Self {
            camera,
            scene,
            scene_depth: None,
            sun_shadow: None,
            clip_volumes: &[],
        }
    }
}

/// Runs the lighting preparation and fog passes in order, every frame.
///
/// The pipeline owns the atlases shared by both passes and the fog volume
/// lists the scene submits to. Nothing it does fails a frame: every dropped
/// or skipped item ends up in the returned [`FrameDiagnostics`].
pub struct FramePipeline {
    config: PipelineConfig,
    device: Arc<dyn GraphicsDevice>,
    atlases: AtlasSet,
    fog_volumes: FogVolumeAggregator,
    lighting: TiledLightingAgent,
    fog: VolumetricFogAgent,
    diagnostics: FrameDiagnostics,
    frame_count: u64,
}

impl FramePipeline {
    /// Creates the pipeline on `device`.
    pub fn new(config: PipelineConfig, device: Arc<dyn GraphicsDevice>) -> Self {
        let config = config.sanitized();
        Self {
            atlases: AtlasSet::new(&config.atlases),
            fog_volumes: FogVolumeAggregator::new(),
            lighting: TiledLightingAgent::new(config.lighting),
            fog: VolumetricFogAgent::new(config.fog),
            diagnostics: FrameDiagnostics::default(),
            frame_count: 0,
            device,
            config,
        }
    }

    /// Submits a fog volume for the next frame. Returns `false` when the
    /// list of `context` is full.
    pub fn push_fog_volume(&mut self, context: PassContext, volume: FogVolumeDescriptor) -> bool {
        self.fog_volumes.push(context, volume)
    }

    /// Replaces the lighting and fog configuration. The atlases keep their
    /// shape until the pipeline is recreated.
    pub fn set_config(&mut self, config: PipelineConfig) {
        let config = config.sanitized();
        if config.atlases != self.config.atlases {
            log::warn!("FramePipeline: atlas shape changes require a new pipeline, ignored");
        }
        self.lighting.set_config(config.lighting);
        self.fog.set_config(config.fog);
        self.config = PipelineConfig {
            atlases: self.config.atlases,
            ..config
        };
    }

    /// Declares which fog programs are available.
    pub fn set_fog_programs(&mut self, programs: ProgramSet) {
        self.fog.set_programs(programs);
    }

    /// Runs both passes for one frame and returns the frame's counters.
    ///
    /// Fog volumes submitted since the last frame are consumed.
    pub fn render_frame(&mut self, inputs: &FrameInputs<'_>) -> &FrameDiagnostics {
        let frame_id = inputs.camera.frame_id;
        self.diagnostics.reset();
        self.atlases.begin_frame(frame_id);
        let updates_before = self.atlases.update_count();

        let device = self.device.as_ref();
        self.lighting
            .update(inputs, &mut self.atlases, device, &mut self.diagnostics);
        self.fog.update(
            inputs,
            &mut self.atlases,
            device,
            &self.fog_volumes,
            PassContext::MAIN,
            &mut self.diagnostics,
        );

        self.diagnostics.atlas_updates =
            self.atlases.update_count().saturating_sub(updates_before) as u32;
        self.fog_volumes.clear(PassContext::MAIN);
        self.diagnostics.log_summary(frame_id);
        self.frame_count += 1;
        &self.diagnostics
    }

    /// Counters of the last frame.
    pub fn diagnostics(&self) -> &FrameDiagnostics {
        &self.diagnostics
    }

    /// Sanitized configuration in use.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The shared atlases.
    pub fn atlases(&self) -> &AtlasSet {
        &self.atlases
    }

    /// The tiled lighting agent.
    pub fn lighting(&self) -> &TiledLightingAgent {
        &self.lighting
    }

    /// The volumetric fog agent.
    pub fn fog(&self) -> &VolumetricFogAgent {
        &self.fog
    }

    /// Fog volumes submitted for the coming frame.
    pub fn fog_volumes(&self) -> &FogVolumeAggregator {
        &self.fog_volumes
    }

    /// The device outputs are published to.
    pub fn device(&self) -> &Arc<dyn GraphicsDevice> {
        &self.device
    }

    /// Frames rendered since creation.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

impl std::fmt::Debug for FramePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramePipeline")
            .field("config", &self.config)
            .field("fog", &self.fog)
            .field("frame_count", &self.frame_count)
            .finish()
    }
}
