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

//! Downscales scene depth and the sun shadow map to the fog volume.

use std::ops::Range;

use murk_core::lane::{Lane, LaneError, LaneKind, LaneWorkload};
use rayon::prelude::*;

use super::volume::Texture2D;
use super::{FogFrame, FogLane, FogProgram};

/// Source texels covered by destination texel `i` when `src` texels map to `dst`.
fn source_span(i: u32, dst: u32, src: u32) -> Range<u32> {
    let start = (u64::from(i) * u64::from(src) / u64::from(dst)) as u32;
    let end = ((u64::from(i) + 1) * u64::from(src) / u64::from(dst)) as u32;
    start.min(src - 1)..end.max(start + 1).min(src)
}

/// Max-filters linear scene depth into one value per voxel column, in a
/// horizontal then a vertical pass, and downscales the sun shadow map to the
/// configured quality tier.
#[derive(Debug, Default, Clone, Copy)]
pub struct DepthDownscaleLane;

impl DepthDownscaleLane {
    /// Creates the lane.
    pub fn new() -> Self {
        Self
    }
}

impl Lane for DepthDownscaleLane {
    fn strategy_name(&self) -> &'static str {
        "MaxDepthDownscale"
    }

    fn lane_kind(&self) -> LaneKind {
        LaneKind::Fog
    }

    fn estimate_cost(&self, _workload: &LaneWorkload) -> f32 {
        0.1
    }
}

impl FogLane for DepthDownscaleLane {
    fn program(&self) -> FogProgram {
        FogProgram::DepthDownscale
    }

    fn execute(&self, frame: &mut FogFrame<'_>) -> Result<(), LaneError> {
        frame.programs.require(self.program())?;
        let [w, h, _] = frame.volumes.dims();
        let volumes = &mut *frame.volumes;

        volumes.sun_shadow = match (frame.sun_shadow, frame.config.shadow_quality.downscale_factor()) {
            (Some(map), Some(factor)) => Some(map.downscaled(factor)),
            _ => None,
        };

        let Some(depth) = frame.scene_depth else {
            volumes.max_depth.as_mut_slice().fill(f32::MAX);
            return Ok(());
        };
        let (sw, sh) = (depth.width(), depth.height());
        if sw == 0 || sh == 0 {
            return Err(LaneError::InvalidInput {
                expected: "non-empty scene depth",
                received: format!("{sw}x{sh}"),
            });
        }

        if w == 0 || h == 0 {
            return Ok(());
        }

        if volumes.depth_temp.width() != w || volumes.depth_temp.height() != sh {
            volumes.depth_temp = Texture2D::new(w, sh);
        }
        volumes
            .depth_temp
            .as_mut_slice()
            .par_chunks_mut(w as usize)
            .enumerate()
            .for_each(|(sy, row)| {
                for (x, out) in row.iter_mut().enumerate() {
                    *out = source_span(x as u32, w, sw)
                        .map(|sx| depth.get(sx, sy as u32))
                        .fold(f32::MIN, f32::max);
                }
            });

        let temp = &volumes.depth_temp;
        volumes
            .max_depth
            .as_mut_slice()
            .par_chunks_mut(w as usize)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, out) in row.iter_mut().enumerate() {
                    *out = source_span(y as u32, h, sh)
                        .map(|sy| temp.get(x as u32, sy))
                        .fold(f32::MIN, f32::max);
                }
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixture::FogFixture;
    use super::super::volume::SunShadowMap;
    use super::*;
    use murk_core::math::Mat4;
    use murk_core::renderer::{FogConfig, ShadowQuality};

    fn fixture() -> FogFixture {
        // 8x8 pixels at scale 4 gives a 2x2 volume.
        FogFixture::new(
            (8, 8),
            FogConfig {
                volume_scale: 4,
                depth_slices: 4,
                ..FogConfig::default()
            },
        )
    }

    #[test]
    fn test_source_span_covers_everything() {
        assert_eq!(source_span(0, 2, 8), 0..4);
        assert_eq!(source_span(1, 2, 8), 4..8);
        assert_eq!(source_span(2, 3, 2), 1..2);
    }

    #[test]
    fn test_max_depth_per_column() {
        let mut fx = fixture();
        let mut data = vec![1.0; 64];
        data[2 * 8 + 6] = 7.0; // pixel (6, 2): top right quadrant
        fx.scene_depth = Texture2D::from_data(8, 8, data);
        DepthDownscaleLane::new().execute(&mut fx.frame()).unwrap();
        assert_eq!(fx.volumes.max_depth.get(1, 0), 7.0);
        assert_eq!(fx.volumes.max_depth.get(0, 0), 1.0);
        assert_eq!(fx.volumes.max_depth.get(1, 1), 1.0);
        assert_eq!(fx.volumes.depth_temp.width(), 2);
        assert_eq!(fx.volumes.depth_temp.height(), 8);
    }

    #[test]
    fn test_uneven_source_reaches_every_column() {
        let mut fx = fixture();
        let mut data = vec![1.0; 9];
        data[2 * 3 + 2] = 5.0;
        data[0] = 2.0;
        fx.scene_depth = Texture2D::from_data(3, 3, data);
        DepthDownscaleLane::new().execute(&mut fx.frame()).unwrap();
        assert_eq!(fx.volumes.max_depth.as_slice(), &[2.0, 1.0, 1.0, 5.0]);
    }

    #[test]
    fn test_no_depth_means_no_occluder() {
        let mut fx = fixture();
        fx.volumes.max_depth.set(0, 0, 3.0);
        DepthDownscaleLane::new().execute(&mut fx.frame()).unwrap();
        assert!(fx.volumes.max_depth.as_slice().iter().all(|&d| d == f32::MAX));
    }

    #[test]
    fn test_shadow_follows_quality_tier() {
        let mut fx = fixture();
        fx.sun_shadow = Some(SunShadowMap {
            world_to_shadow: Mat4::IDENTITY,
            depth: Texture2D::new(8, 8),
        });
        fx.config.shadow_quality = ShadowQuality::Quarter;
        DepthDownscaleLane::new().execute(&mut fx.frame()).unwrap();
        assert_eq!(fx.volumes.sun_shadow.as_ref().map(|m| m.depth.width()), Some(2));

        fx.config.shadow_quality = ShadowQuality::Off;
        DepthDownscaleLane::new().execute(&mut fx.frame()).unwrap();
        assert!(fx.volumes.sun_shadow.is_none());
    }

    #[test]
    fn test_missing_program_leaves_volume_untouched() {
        let mut fx = fixture();
        fx.programs = fx.programs.without(FogProgram::DepthDownscale);
        fx.volumes.max_depth.set(0, 0, 3.0);
        let result = DepthDownscaleLane::new().execute(&mut fx.frame());
        assert!(matches!(result, Err(LaneError::ProgramUnavailable { .. })));
        assert_eq!(fx.volumes.max_depth.get(0, 0), 3.0);
    }
}
