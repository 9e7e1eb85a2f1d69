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

//! Renderer-facing data contracts of the lighting and fog pipeline.

pub mod camera;
pub mod config;
pub mod device;
pub mod diagnostics;
pub mod error;
pub mod fog;
pub mod headless;
pub mod light;
pub mod records;
pub mod texture;

pub use self::camera::CameraFrame;
pub use self::config::{
    AtlasSetConfig, ConfigError, DensityInjectionMode, FogConfig, HeightFogParams,
    LightingConfig, PipelineConfig, ShadowQuality, TileSize,
};
pub use self::device::{AtlasCopy, AtlasKind, BufferSlot, GraphicsDevice};
pub use self::diagnostics::FrameDiagnostics;
pub use self::error::ResourceError;
pub use self::fog::{ClipVolume, FogNoise, FogRamp, FogVolumeDescriptor, FogVolumeShape};
pub use self::headless::HeadlessDevice;
pub use self::light::{
    AreaParams, LightCommon, LightDescriptor, LightFlags, LocalLight, LocalShape, ProbeLight,
    ProjectorParams, SceneLights, ShadowLink, SunLight,
};
pub use self::records::{
    CullRecord, LightKind, ShadeRecord, VolumeType, ATLAS_SLOT_NONE, MAX_LIGHT_RECORDS,
};
pub use self::texture::{
    AtlasDescriptor, Residency, TextureFormat, TextureId, TextureSource,
};
