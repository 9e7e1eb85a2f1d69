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

//! Volumetric fog lanes.
//!
//! The fog accumulator runs as a fixed sequence of stages, each a
//! [`FogLane`] executed against a [`FogFrame`]. A frame borrows the volume
//! storage mutably and every other input immutably, so a stage can only
//! write the resources the frame hands out.
//!
//! Stage order: depth downscale, clip stencil, density injection, light grid
//! build (a [`crate::render_lane::VisibilityGridLane`]), in-scattering, blur,
//! reprojection, raymarch.

mod blur_lane;
mod clip_stencil;
mod density_lane;
mod depth_downscale_lane;
mod fog_volume_list;
mod inscattering_lane;
mod raymarch_lane;
mod reprojection_lane;
pub mod volume;

pub use blur_lane::*;
pub use clip_stencil::*;
pub use density_lane::*;
pub use depth_downscale_lane::*;
pub use fog_volume_list::*;
pub use inscattering_lane::*;
pub use raymarch_lane::*;
pub use reprojection_lane::*;
pub use volume::{
    DensityStorage, DepthSlicing, PingPong, SunShadowMap, Texture2D, Volume3D, VolumeBuffers,
};

use murk_core::lane::{Lane, LaneError};
use murk_core::renderer::{CameraFrame, ClipVolume, CullRecord, FogConfig, ShadeRecord};

use crate::render_lane::VisibilityGrid;

/// Compute programs the fog stages dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FogProgram {
    /// Max-filters scene depth down to the volume's resolution.
    DepthDownscale,
    /// Tags voxels covered by clip volumes.
    ClipStencil,
    /// Writes fog density and albedo.
    DensityInjection,
    /// Accumulates light into the current in-scattering volume.
    InScattering,
    /// Occlusion-aware separable blur.
    Blur,
    /// Blends the current volume with last frame's history.
    Reprojection,
    /// Front-to-back integration along view rays.
    Raymarch,
}

impl FogProgram {
    /// Every program, in stage order.
    pub const ALL: [FogProgram; 7] = [
        FogProgram::DepthDownscale,
        FogProgram::ClipStencil,
        FogProgram::DensityInjection,
        FogProgram::InScattering,
        FogProgram::Blur,
        FogProgram::Reprojection,
        FogProgram::Raymarch,
    ];

    /// Name used in logs and errors.
    pub const fn name(self) -> &'static str {
        match self {
            FogProgram::DepthDownscale => "DownscaleDepth",
            FogProgram::ClipStencil => "ClipVolumeStencil",
            FogProgram::DensityInjection => "InjectFogDensity",
            FogProgram::InScattering => "InjectInscattering",
            FogProgram::Blur => "BlurInscattering",
            FogProgram::Reprojection => "ReprojectVolume",
            FogProgram::Raymarch => "RaymarchVolume",
        }
    }

    const fn bit(self) -> u8 {
        1 << self as u8
    }
}

/// The set of fog programs that compiled and can be dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramSet(u8);

impl Default for ProgramSet {
    fn default() -> Self {
        Self::all()
    }
}

impl ProgramSet {
    /// Every program available.
    pub const fn all() -> Self {
        Self(0x7F)
    }

    /// No program available.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// This set minus `program`.
    pub const fn without(self, program: FogProgram) -> Self {
        Self(self.0 & !program.bit())
    }

    /// This set plus `program`.
    pub const fn with(self, program: FogProgram) -> Self {
        Self(self.0 | program.bit())
    }

    /// Whether `program` can be dispatched.
    pub const fn contains(self, program: FogProgram) -> bool {
        self.0 & program.bit() != 0
    }

    /// Fails with [`LaneError::ProgramUnavailable`] when `program` is missing.
    pub fn require(self, program: FogProgram) -> Result<(), LaneError> {
        if self.contains(program) {
            Ok(())
        } else {
            Err(LaneError::ProgramUnavailable {
                program: program.name(),
            })
        }
    }
}

/// Everything one fog stage may read or write this frame.
pub struct FogFrame<'a> {
    /// Camera of the frame.
    pub camera: &'a CameraFrame,
    /// Sanitized fog configuration.
    pub config: &'a FogConfig,
    /// Programs that can be dispatched.
    pub programs: ProgramSet,
    /// Full resolution linear view depth, if a depth pre-pass ran.
    pub scene_depth: Option<&'a Texture2D<f32>>,
    /// Sun shadow map, if the sun casts shadows.
    pub sun_shadow: Option<&'a SunShadowMap>,
    /// Clip volumes for the voxel stencil.
    pub clip_volumes: &'a [ClipVolume],
    /// Prepared local fog volumes.
    pub fog_volumes: &'a [FogVolumeInjectRecord],
    /// Fog light cull records.
    pub cull_records: &'a [CullRecord],
    /// Fog light shade records, parallel to `cull_records`.
    pub shade_records: &'a [ShadeRecord],
    /// Fog light grid, available once the grid stage has run.
    pub grid: Option<&'a VisibilityGrid>,
    /// Voxels per grid cluster.
    pub cluster: [u32; 3],
    /// Volume storage.
    pub volumes: &'a mut VolumeBuffers,
    /// Temporal history bookkeeping.
    pub reprojection: &'a mut ReprojectionState,
}

impl FogFrame<'_> {
    /// Depth distribution of the volume for this frame's camera.
    pub fn slicing(&self) -> DepthSlicing {
        DepthSlicing {
            near: self.camera.near,
            distance: self.config.raymarch_distance,
            slices: self.volumes.dims()[2],
        }
    }
}

/// A stage of the volumetric fog accumulator.
pub trait FogLane: Lane {
    /// The compute program this stage dispatches.
    fn program(&self) -> FogProgram;

    /// Runs the stage. Implementations call `frame.programs.require(...)`
    /// before touching any resource.
    fn execute(&self, frame: &mut FogFrame<'_>) -> Result<(), LaneError>;
}

#[cfg(test)]
pub(crate) mod fixture {
    //! Owns every input of a [`FogFrame`] for stage tests.

    use super::*;
    use murk_core::math::{Vec3, FRAC_PI_2};

    pub(crate) struct FogFixture {
        pub camera: CameraFrame,
        pub config: FogConfig,
        pub programs: ProgramSet,
        pub scene_depth: Option<Texture2D<f32>>,
        pub sun_shadow: Option<SunShadowMap>,
        pub clip_volumes: Vec<ClipVolume>,
        pub fog_volumes: Vec<FogVolumeInjectRecord>,
        pub cull: Vec<CullRecord>,
        pub shade: Vec<ShadeRecord>,
        pub grid: Option<VisibilityGrid>,
        pub volumes: VolumeBuffers,
        pub reprojection: ReprojectionState,
    }

    impl FogFixture {
        /// Camera at the origin looking down +Z with a 90 degree FOV.
        pub fn new(viewport: (u32, u32), config: FogConfig) -> Self {
            let config = config.sanitized();
            let camera = CameraFrame::look_at(1, Vec3::ZERO, Vec3::Z, Vec3::Y, FRAC_PI_2, viewport, 0.1, 100.0)
                .expect("valid camera");
            let mut volumes = VolumeBuffers::default();
            volumes.ensure(config.volume_dimensions(viewport), config.legacy_density);
            Self {
                camera,
                config,
                programs: ProgramSet::all(),
                scene_depth: None,
                sun_shadow: None,
                clip_volumes: Vec::new(),
                fog_volumes: Vec::new(),
                cull: Vec::new(),
                shade: Vec::new(),
                grid: None,
                volumes,
                reprojection: ReprojectionState::new(),
            }
        }

        pub fn frame(&mut self) -> FogFrame<'_> {
            FogFrame {
                camera: &self.camera,
                config: &self.config,
                programs: self.programs,
                scene_depth: self.scene_depth.as_ref(),
                sun_shadow: self.sun_shadow.as_ref(),
                clip_volumes: &self.clip_volumes,
                fog_volumes: &self.fog_volumes,
                cull_records: &self.cull,
                shade_records: &self.shade,
                grid: self.grid.as_ref(),
                cluster: self.config.froxel_size,
                volumes: &mut self.volumes,
                reprojection: &mut self.reprojection,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_set_membership() {
        let set = ProgramSet::all().without(FogProgram::Blur);
        assert!(!set.contains(FogProgram::Blur));
        assert!(FogProgram::ALL
            .iter()
            .filter(|&&p| p != FogProgram::Blur)
            .all(|&p| set.contains(p)));
        assert!(set.with(FogProgram::Blur) == ProgramSet::all());
    }

    #[test]
    fn test_require_names_missing_program() {
        let err = ProgramSet::empty()
            .require(FogProgram::Raymarch)
            .unwrap_err();
        assert!(matches!(
            err,
            LaneError::ProgramUnavailable {
                program: "RaymarchVolume"
            }
        ));
    }
}
