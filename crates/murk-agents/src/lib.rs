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

//! Per-frame orchestration of the murk lanes.
//!
//! Agents own the long-lived state of a pass (record buffers, grids, fog
//! volumes, temporal history) and drive the stateless lanes over it in a
//! fixed order. [`pipeline::FramePipeline`] ties the tiled lighting and
//! volumetric fog agents together with the shared resource atlases.

#![warn(missing_docs)]

pub mod fog_agent;
pub mod lighting_agent;
pub mod pipeline;
