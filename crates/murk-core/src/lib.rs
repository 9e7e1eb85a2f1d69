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

//! Foundational crate of the murk lighting and fog pipeline.
//!
//! `murk-core` holds everything the hot-path lanes and the per-frame agents
//! agree on: math primitives, the scene light descriptors, the GPU record
//! layouts, configuration, diagnostics and the [`renderer::GraphicsDevice`]
//! seam through which buffers and atlas copies leave the CPU.

#![warn(missing_docs)]

pub mod lane;
pub mod math;
pub mod renderer;
