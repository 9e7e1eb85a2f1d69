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

//! # Lane Abstraction
//!
//! A **Lane** is a reusable processing strategy owned by an agent. Each lane
//! encapsulates one algorithmic step of the per-frame pipeline (building a
//! light list, filling a visibility grid, one fog stage).
//!
//! ## Architecture
//!
//! The Lane system follows a two-level trait hierarchy:
//!
//! 1. **`Lane`** (this trait): identity, classification and cost estimation,
//!    shared by every lane.
//!
//! 2. **Domain-specific traits** extend `Lane` with a typed execution method,
//!    e.g. `FogLane: Lane` in `murk-lanes` which runs against a typed fog frame.
//!
//! Execution inputs are passed as typed borrows rather than through a
//! type-erased map, so the borrow checker enforces which stage may write
//! which resource.

use std::fmt;

/// Error type for lane operations.
#[derive(Debug)]
pub enum LaneError {
    /// The compute program the lane dispatches is not available.
    ProgramUnavailable {
        /// Name of the missing program.
        program: &'static str,
    },
    /// A required input of the lane is missing or malformed.
    InvalidInput {
        /// What the lane expected.
        expected: &'static str,
        /// Description of what was received.
        received: String,
    },
    /// A domain-specific error occurred during execution.
    ExecutionFailed(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for LaneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaneError::ProgramUnavailable { program } => {
                write!(f, "Compute program '{program}' is unavailable")
            }
            LaneError::InvalidInput { expected, received } => {
                write!(f, "Invalid lane input: expected {expected}, got {received}")
            }
            LaneError::ExecutionFailed(e) => write!(f, "Lane execution failed: {e}"),
        }
    }
}

impl std::error::Error for LaneError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LaneError::ExecutionFailed(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl LaneError {
    /// Convenience constructor for an input that was not provided.
    pub fn missing(what: &'static str) -> Self {
        LaneError::InvalidInput {
            expected: what,
            received: "nothing".into(),
        }
    }
}

/// Classification of lane types, used for logging and cost accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LaneKind {
    /// Light list construction and atlas management.
    Lighting,
    /// Visibility grid construction.
    Culling,
    /// Volumetric fog stages.
    Fog,
}

impl fmt::Display for LaneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaneKind::Lighting => write!(f, "Lighting"),
            LaneKind::Culling => write!(f, "Culling"),
            LaneKind::Fog => write!(f, "Fog"),
        }
    }
}

/// Size of the work a lane is about to perform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaneWorkload {
    /// Lights considered.
    pub lights: usize,
    /// Grid cells to fill.
    pub cells: usize,
    /// Fog voxels to process.
    pub voxels: usize,
}

/// Common interface of every lane.
pub trait Lane: Send + Sync {
    /// Human-readable strategy name, used in logs.
    fn strategy_name(&self) -> &'static str;

    /// Classification of the lane.
    fn lane_kind(&self) -> LaneKind;

    /// Relative cost of running the lane on `workload`.
    fn estimate_cost(&self, _workload: &LaneWorkload) -> f32 {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopLane;

    impl Lane for NoopLane {
        fn strategy_name(&self) -> &'static str {
            "Noop"
        }

        fn lane_kind(&self) -> LaneKind {
            LaneKind::Fog
        }
    }

    #[test]
    fn test_default_cost_is_one() {
        assert_eq!(NoopLane.estimate_cost(&LaneWorkload::default()), 1.0);
        assert_eq!(NoopLane.lane_kind().to_string(), "Fog");
    }

    #[test]
    fn test_lane_error_display() {
        let err = LaneError::ProgramUnavailable { program: "fog_raymarch" };
        assert_eq!(err.to_string(), "Compute program 'fog_raymarch' is unavailable");
        assert!(LaneError::missing("depth buffer").to_string().contains("depth buffer"));
    }
}
