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

//! Hot-path lanes of the murk pipeline.
//!
//! A lane is one interchangeable strategy for a unit of per-frame work. The
//! [`render_lane`] module builds light lists, maintains the resource atlases
//! and bins lights into visibility grids; [`fog_lane`] holds the stages of
//! the volumetric fog accumulator and the local fog volume aggregator.
//!
//! Lanes hold no frame state of their own. Everything they read or write is
//! borrowed from the agent driving them.

#![warn(missing_docs)]

pub mod fog_lane;
pub mod render_lane;
