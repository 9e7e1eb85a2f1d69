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

//! Acts as the agent of the volumetric fog pass.
//!
//! The agent owns the fog volumes, the fog light list and grid, and the
//! temporal history. It detects discontinuities, swaps the double-buffered
//! volumes and runs the fog stages in their fixed order. A stage that cannot
//! run is logged and counted; the rest of the frame proceeds.

mod agent;

pub use agent::*;
