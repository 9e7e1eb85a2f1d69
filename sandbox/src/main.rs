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

// Murk sandbox
// Runs a few frames of a demo scene on a headless device and logs what the
// pipeline produced.

use std::sync::Arc;

use anyhow::{Context, Result};
use murk_agents::pipeline::{FrameInputs, FramePipeline};
use murk_core::math::{Mat3, Mat4, Vec3, FRAC_PI_2};
use murk_core::renderer::{
    AreaParams, BufferSlot, CameraFrame, ClipVolume, FogVolumeDescriptor, FogVolumeShape,
    HeadlessDevice, LightCommon, LocalLight, LocalShape, PipelineConfig, ProbeLight,
    ProjectorParams, SceneLights, ShadowLink, SunLight, TextureFormat, TextureSource,
};
use murk_lanes::fog_lane::{PassContext, SunShadowMap, Texture2D};

const VIEWPORT: (u32, u32) = (320, 180);
const FRAMES: u64 = 8;

fn demo_scene() -> SceneLights {
    let mut scene = SceneLights::default();

    scene.probes.push(ProbeLight {
        common: LightCommon::new(Vec3::new(0.0, 2.0, 12.0), 10.0),
        orientation: Mat3::IDENTITY,
        extents: Vec3::new(8.0, 4.0, 8.0),
        attenuation_falloff: 0.5,
        specular: TextureSource::resident_cube(100, 256, TextureFormat::Bc6hRgbUfloat),
        diffuse: TextureSource::resident_cube(101, 32, TextureFormat::Bc6hRgbUfloat),
    });

    let mut lamp = LocalLight::point(Vec3::new(-3.0, 1.5, 8.0), 6.0);
    lamp.shadow = Some(ShadowLink {
        omnidirectional: true,
        generation_mask: 0x3F,
        face_matrices: [Mat4::IDENTITY; 6],
        texture_size: 512.0,
        pool_size: 4096.0,
        depth_bias: 0.002,
        mask_channel: 0,
        mask_index: 0,
    });
    scene.regular.push(lamp);

    let mut spot = LocalLight::point(Vec3::new(2.0, 4.0, 10.0), 12.0);
    spot.shape = LocalShape::Projector(ProjectorParams {
        orientation: Mat3::from_cols(Vec3::new(0.0, -1.0, 0.0), Vec3::X, Vec3::Z),
        frustum_angle_degrees: 40.0,
        gobo: TextureSource::resident_2d(200, 256, TextureFormat::Bc1RgbaUnorm),
    });
    scene.regular.push(spot);

    let mut panel = LocalLight::point(Vec3::new(0.0, 3.0, 16.0), 5.0);
    panel.shape = LocalShape::Area(AreaParams {
        orientation: Mat3::IDENTITY,
        width: 2.0,
        height: 1.0,
        frustum_angle_degrees: 80.0,
    });
    scene.ambient.push(panel);

    for i in 0..24 {
        let x = (i % 6) as f32 * 2.0 - 5.0;
        let z = 6.0 + (i / 6) as f32 * 4.0;
        scene.regular.push(LocalLight::point(Vec3::new(x, 0.5, z), 2.5));
    }

    scene.sun = Some(SunLight::default());
    scene
}

fn demo_fog_volumes() -> [FogVolumeDescriptor; 2] {
    let mut mist = FogVolumeDescriptor::uniform_box(
        Vec3::new(0.0, 0.0, 10.0),
        Vec3::new(6.0, 1.0, 6.0),
        0.8,
    );
    mist.soft_edges = 0.5;
    mist.height_falloff_dir = Vec3::Y;
    let mut cloud = FogVolumeDescriptor::uniform_box(Vec3::new(4.0, 2.0, 18.0), Vec3::ONE * 3.0, 1.5);
    cloud.shape = FogVolumeShape::Ellipsoid;
    cloud.affects_this_area_only = true;
    cloud.stencil_ref = 1;
    [mist, cloud]
}

fn load_config() -> Result<PipelineConfig> {
    match std::env::args().nth(1) {
        Some(path) => PipelineConfig::load(&path)
            .with_context(|| format!("Failed to load pipeline configuration '{path}'")),
        None => Ok(PipelineConfig::default().sanitized()),
    }
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = load_config()?;
    log::debug!(
        "Pipeline configuration:\n{}",
        config
            .to_ron_string()
            .context("Failed to serialize configuration")?
    );

    let device = Arc::new(HeadlessDevice::new());
    let mut pipeline = FramePipeline::new(config, device.clone());
    let scene = demo_scene();
    let clip_volumes = [ClipVolume {
        world_transform: Mat4::from_translation(Vec3::new(4.0, 2.0, 18.0))
            * Mat4::from_scale(Vec3::ONE * 4.0),
        stencil_ref: 1,
    }];
    let scene_depth = Texture2D::filled(VIEWPORT.0, VIEWPORT.1, 40.0f32);
    let sun_shadow = SunShadowMap {
        world_to_shadow: Mat4::orthographic_rh_zo(-30.0, 30.0, -30.0, 30.0, 0.0, 100.0),
        depth: Texture2D::filled(256, 256, 1.0f32),
    };

    for frame_id in 1..=FRAMES {
        let eye = Vec3::new(0.0, 1.7, frame_id as f32 * 0.05);
        let camera = CameraFrame::look_at(
            frame_id,
            eye,
            eye + Vec3::Z,
            Vec3::Y,
            FRAC_PI_2,
            VIEWPORT,
            0.1,
            200.0,
        )
        .context("Degenerate demo camera")?;

        for volume in demo_fog_volumes() {
            pipeline.push_fog_volume(PassContext::MAIN, volume);
        }
        let inputs = FrameInputs {
            scene_depth: Some(&scene_depth),
            sun_shadow: Some(&sun_shadow),
            clip_volumes: &clip_volumes,
            ..FrameInputs::new(&camera, &scene)
        };
        let diagnostics = *pipeline.render_frame(&inputs);
        log::info!(
            "frame {frame_id}: {} tiled / {} fog lights, {} / {} skipped, {} atlas updates, reprojection {}",
            diagnostics.tiled_lights,
            diagnostics.fog_lights,
            diagnostics.tiled_skipped_lights,
            diagnostics.fog_skipped_lights,
            diagnostics.atlas_updates,
            if diagnostics.reprojection_bypassed { "bypassed" } else { "blended" }
        );
    }

    let fog_output = &pipeline.fog().volumes().fog_output;
    let [w, h, d] = fog_output.dims();
    let far = fog_output.get(w / 2, h / 2, d.saturating_sub(1));
    log::info!(
        "Center column after {FRAMES} frames: in-scattering ({:.4}, {:.4}, {:.4}), transmittance {:.4}",
        far.x,
        far.y,
        far.z,
        far.w
    );
    log::info!(
        "Scattering volume upload: {} bytes",
        device
            .buffer(BufferSlot::ScatteringVolume)
            .map_or(0, |bytes| bytes.len())
    );
    Ok(())
}
