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

//! Configuration surface of the lighting and fog pipeline.
//!
//! Every struct has a `Default` matching the shipping settings and is
//! `serde`-enabled so a whole [`PipelineConfig`] can be stored as RON.
//! Consumers should call [`PipelineConfig::sanitized`] once after loading;
//! the lanes assume the clamped ranges documented on each field.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::math::LinearRgba;
use crate::renderer::records::MAX_LIGHT_RECORDS;
use crate::renderer::texture::{AtlasDescriptor, TextureFormat};

/// Errors raised while loading or saving a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read or written.
    #[error("configuration I/O failed for '{path}': {source}")]
    Io {
        /// File that failed.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The RON text is not a valid configuration.
    #[error("invalid configuration: {0}")]
    InvalidFormat(String),
    /// The configuration could not be serialized.
    #[error("failed to serialize configuration: {0}")]
    ProcessingFailed(String),
}

/// The tile size for screen-space light culling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TileSize {
    /// 16×16 pixel tiles (standard, precise culling).
    #[default]
    X16,
    /// 32×32 pixel tiles (less overhead, coarser culling).
    X32,
}

impl TileSize {
    /// Returns the tile size in pixels.
    #[inline]
    pub const fn pixels(&self) -> u32 {
        match self {
            TileSize::X16 => 16,
            TileSize::X32 => 32,
        }
    }

    /// Calculates the number of tiles needed for a given screen dimension.
    #[inline]
    pub const fn tile_count(&self, screen_size: u32) -> u32 {
        screen_size.div_ceil(self.pixels())
    }
}

/// Configuration of the tiled lighting pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingConfig {
    /// The tile size for light culling.
    pub tile_size: TileSize,
    /// Bucket capacity of one tile. Extra indices are dropped.
    pub max_lights_per_tile: u32,
    /// Record capacity of the tiled light list, at most 255.
    pub max_tiled_lights: usize,
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl LightingConfig {
    /// Creates a configuration with default values.
    pub const fn new() -> Self {
        Self {
            tile_size: TileSize::X16,
            max_lights_per_tile: 128,
            max_tiled_lights: MAX_LIGHT_RECORDS,
        }
    }

    /// Creates a configuration optimized for low overhead.
    pub const fn low_overhead() -> Self {
        Self {
            tile_size: TileSize::X32,
            max_lights_per_tile: 64,
            max_tiled_lights: MAX_LIGHT_RECORDS,
        }
    }

    /// Calculates the tile grid dimensions for a given screen size.
    #[inline]
    pub const fn tile_dimensions(&self, screen_width: u32, screen_height: u32) -> (u32, u32) {
        (
            self.tile_size.tile_count(screen_width),
            self.tile_size.tile_count(screen_height),
        )
    }
}

/// Shapes of the three atlases shared by the lighting and fog passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasSetConfig {
    /// Prefiltered specular probe cubemaps.
    pub specular_probes: AtlasDescriptor,
    /// Irradiance probe cubemaps, slot-aligned with `specular_probes`.
    pub diffuse_probes: AtlasDescriptor,
    /// Projector gobos.
    pub projector_gobos: AtlasDescriptor,
}

impl Default for AtlasSetConfig {
    fn default() -> Self {
        Self {
            specular_probes: AtlasDescriptor {
                capacity: 64,
                size: 256,
                mip_count: 7,
                format: TextureFormat::Bc6hRgbUfloat,
                is_cube: true,
            },
            diffuse_probes: AtlasDescriptor {
                capacity: 64,
                size: 32,
                mip_count: 1,
                format: TextureFormat::Bc6hRgbUfloat,
                is_cube: true,
            },
            projector_gobos: AtlasDescriptor {
                capacity: 64,
                size: 256,
                mip_count: 1,
                format: TextureFormat::Bc1RgbaUnorm,
                is_cube: false,
            },
        }
    }
}

/// Which density source fills the fog volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DensityInjectionMode {
    /// Closed-form exponential height fog.
    #[default]
    HeightFog,
    /// Aggregated local fog volumes, masked by the clip-volume stencil.
    LocalVolumes,
}

/// Quality tier of the downscaled sun shadow used by the fog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ShadowQuality {
    /// The sun is unshadowed in fog.
    Off,
    /// Full resolution shadow map.
    Full,
    /// Shadow map downscaled by two.
    #[default]
    Half,
    /// Shadow map downscaled by four.
    Quarter,
}

impl ShadowQuality {
    /// Downscale factor of the shadow map, or `None` when shadows are off.
    pub const fn downscale_factor(&self) -> Option<u32> {
        match self {
            ShadowQuality::Off => None,
            ShadowQuality::Full => Some(1),
            ShadowQuality::Half => Some(2),
            ShadowQuality::Quarter => Some(4),
        }
    }
}

/// Global exponential height fog.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeightFogParams {
    /// Extinction coefficient at `base_height`.
    pub density: f32,
    /// Exponential decay rate per world unit above `base_height`.
    pub falloff: f32,
    /// World height of the reference density.
    pub base_height: f32,
    /// Scattering albedo.
    pub albedo: LinearRgba,
}

impl Default for HeightFogParams {
    fn default() -> Self {
        Self {
            density: 0.02,
            falloff: 0.1,
            base_height: 0.0,
            albedo: LinearRgba::rgb(0.8, 0.85, 0.9),
        }
    }
}

/// Smallest and largest depth slice counts of the fog volume.
pub const FOG_DEPTH_SLICES_RANGE: (u32, u32) = (4, 255);
/// Largest honoured blur iteration count.
pub const MAX_BLUR_ITERATIONS: u32 = 4;
/// Emitter size bounds used to normalise fog intensity.
pub const BULB_SIZE_RANGE: (f32, f32) = (0.001, 2.0);

/// Configuration of the volumetric fog pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FogConfig {
    /// Master switch.
    pub enabled: bool,
    /// Voxels per fog light cluster along x, y and depth.
    pub froxel_size: [u32; 3],
    /// Screen pixels per voxel horizontally and vertically, at least 2.
    pub volume_scale: u32,
    /// Depth slices, in `[4, 255]` and a multiple of 4.
    pub depth_slices: u32,
    /// Record capacity of the fog light list, at most 255.
    pub max_fog_lights: usize,
    /// Bucket capacity of one fog cluster.
    pub max_lights_per_froxel: u32,
    /// View distance covered by the volume, from the near plane.
    pub raymarch_distance: f32,
    /// Temporal blend factor in `[0, 1]`; 0 disables history.
    pub reprojection_blend: f32,
    /// Density source.
    pub injection_mode: DensityInjectionMode,
    /// Sun shadow tier.
    pub shadow_quality: ShadowQuality,
    /// Blur passes over the in-scattering volume, at most 4.
    pub blur_iterations: u32,
    /// Lower precision mode that also double-buffers and blurs density.
    pub legacy_density: bool,
    /// Height fog parameters used in [`DensityInjectionMode::HeightFog`].
    pub height_fog: HeightFogParams,
    /// Default anisotropy of the phase function for lights without a lobe.
    pub anisotropy: f32,
    /// Lower bound of emitter size when normalising fog intensity.
    pub min_bulb_size: f32,
    /// Whether area lights contribute to fog.
    pub include_area_lights: bool,
}

impl Default for FogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            froxel_size: [4, 4, 4],
            volume_scale: 8,
            depth_slices: 64,
            max_fog_lights: MAX_LIGHT_RECORDS,
            max_lights_per_froxel: 64,
            raymarch_distance: 64.0,
            reprojection_blend: 0.8,
            injection_mode: DensityInjectionMode::HeightFog,
            shadow_quality: ShadowQuality::Half,
            blur_iterations: 1,
            legacy_density: false,
            height_fog: HeightFogParams::default(),
            anisotropy: 0.6,
            min_bulb_size: 0.1,
            include_area_lights: true,
        }
    }
}

impl FogConfig {
    /// Returns a copy with every field clamped to its legal range.
    pub fn sanitized(mut self) -> Self {
        let (lo, hi) = FOG_DEPTH_SLICES_RANGE;
        self.depth_slices = self.depth_slices.clamp(lo, hi) & !3;
        self.volume_scale = self.volume_scale.max(2);
        self.froxel_size = self.froxel_size.map(|s| s.max(1));
        self.max_fog_lights = self.max_fog_lights.min(MAX_LIGHT_RECORDS);
        self.max_lights_per_froxel = self.max_lights_per_froxel.max(1);
        self.raymarch_distance = self.raymarch_distance.max(1.0);
        self.reprojection_blend = self.reprojection_blend.clamp(0.0, 1.0);
        self.blur_iterations = self.blur_iterations.min(MAX_BLUR_ITERATIONS);
        self.anisotropy = self.anisotropy.clamp(-0.99, 0.99);
        self.min_bulb_size = self.min_bulb_size.clamp(BULB_SIZE_RANGE.0, BULB_SIZE_RANGE.1);
        self
    }

    /// Fog volume size in voxels for a render target of `viewport` pixels.
    pub fn volume_dimensions(&self, viewport: (u32, u32)) -> [u32; 3] {
        let scale = self.volume_scale.max(2);
        [
            viewport.0.div_ceil(scale).max(1),
            viewport.1.div_ceil(scale).max(1),
            self.depth_slices,
        ]
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Tiled lighting pass.
    pub lighting: LightingConfig,
    /// Shared texture atlases.
    pub atlases: AtlasSetConfig,
    /// Volumetric fog pass.
    pub fog: FogConfig,
}

impl PipelineConfig {
    /// Returns a copy with every field clamped to its legal range.
    pub fn sanitized(mut self) -> Self {
        self.lighting.max_tiled_lights = self.lighting.max_tiled_lights.min(MAX_LIGHT_RECORDS);
        self.lighting.max_lights_per_tile = self.lighting.max_lights_per_tile.max(1);
        for atlas in [
            &mut self.atlases.specular_probes,
            &mut self.atlases.diffuse_probes,
            &mut self.atlases.projector_gobos,
        ] {
            atlas.capacity = atlas.capacity.max(1);
        }
        self.fog = self.fog.sanitized();
        self
    }

    /// Parses a configuration from RON text. Missing fields keep their defaults.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        ron::de::from_str(text).map_err(|e| ConfigError::InvalidFormat(e.to_string()))
    }

    /// Serializes the configuration as pretty RON.
    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        let pretty = ron::ser::PrettyConfig::default().indentor("  ".to_string());
        ron::ser::to_string_pretty(self, pretty)
            .map_err(|e| ConfigError::ProcessingFailed(e.to_string()))
    }

    /// Loads and sanitizes a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_ron_str(&text)?.sanitized();
        log::info!("Loaded pipeline configuration from '{}'", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_slices_are_clamped_and_aligned() {
        let cfg = FogConfig {
            depth_slices: 1000,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(cfg.depth_slices, 252);

        let cfg = FogConfig {
            depth_slices: 1,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(cfg.depth_slices, 4);

        let cfg = FogConfig {
            depth_slices: 67,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(cfg.depth_slices, 64);
    }

    #[test]
    fn test_blur_and_blend_are_clamped() {
        let cfg = FogConfig {
            blur_iterations: 9,
            reprojection_blend: 3.0,
            max_fog_lights: 4000,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(cfg.blur_iterations, MAX_BLUR_ITERATIONS);
        assert_eq!(cfg.reprojection_blend, 1.0);
        assert_eq!(cfg.max_fog_lights, MAX_LIGHT_RECORDS);
    }

    #[test]
    fn test_volume_dimensions_round_up() {
        let cfg = FogConfig {
            volume_scale: 1,
            ..Default::default()
        };
        // Scale is never below 2.
        assert_eq!(cfg.volume_dimensions((101, 50)), [51, 25, 64]);
    }

    #[test]
    fn test_tile_dimensions() {
        assert_eq!(LightingConfig::new().tile_dimensions(1920, 1080), (120, 68));
        assert_eq!(LightingConfig::low_overhead().tile_dimensions(1920, 1080), (60, 34));
    }

    #[test]
    fn test_ron_round_trip_and_partial_documents() {
        let cfg = PipelineConfig::default();
        let text = cfg.to_ron_string().expect("serializes");
        assert_eq!(PipelineConfig::from_ron_str(&text).expect("parses"), cfg);

        let partial = "(fog: (blur_iterations: 3, injection_mode: LocalVolumes))";
        let parsed = PipelineConfig::from_ron_str(partial).expect("parses");
        assert_eq!(parsed.fog.blur_iterations, 3);
        assert_eq!(parsed.fog.injection_mode, DensityInjectionMode::LocalVolumes);
        assert_eq!(parsed.lighting, LightingConfig::default());
    }

    #[test]
    fn test_invalid_ron_is_reported() {
        let err = PipelineConfig::from_ron_str("(fog: (blur_iterations: \"many\"))").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFormat(_)));
    }
}
