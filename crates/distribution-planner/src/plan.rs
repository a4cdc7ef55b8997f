// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Distribution plan: the output of the planner.
//!
//! A plan is an ordered sequence of `(layer range → device id)` pairs plus
//! the strategy that produced it. It is the contract between the planner
//! and the model loader: every layer appears in exactly one range, ranges
//! are contiguous and ascending, and `degraded` says whether any range was
//! pushed to CPU while an accelerator was available.

use crate::{PlannerError, Tier};
use std::fmt;

pub use device_detect::CPU_DEVICE_ID;

/// How layers are spread across devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// The whole model on one device.
    SingleDevice,
    /// Contiguous ranges over several accelerators, proportional to budget.
    ModelParallel,
    /// Stages on accelerators in priority order, CPU as the final stage.
    PipelineParallel,
    /// Leading layers on the best device, the trailing remainder on CPU.
    LayerOffload,
}

impl Strategy {
    /// Every strategy the planner can emit.
    pub const ALL: [Strategy; 4] = [
        Strategy::SingleDevice,
        Strategy::ModelParallel,
        Strategy::PipelineParallel,
        Strategy::LayerOffload,
    ];
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Strategy::SingleDevice => "single-device",
            Strategy::ModelParallel => "model-parallel",
            Strategy::PipelineParallel => "pipeline-parallel",
            Strategy::LayerOffload => "layer-offload",
        })
    }
}

/// Half-open range of layer indices `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub struct LayerRange {
    pub start: u32,
    pub end: u32,
}

impl LayerRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Number of layers in the range.
    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    /// Returns `true` if the range holds no layers.
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Iterates over the layer indices.
    pub fn iter(&self) -> std::ops::Range<u32> {
        self.start..self.end
    }
}

impl fmt::Display for LayerRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// One range of layers placed on one device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize)]
pub struct Assignment {
    pub layers: LayerRange,
    pub device_id: String,
}

impl Assignment {
    /// Returns `true` if this range is on the host CPU.
    pub fn is_cpu(&self) -> bool {
        self.device_id == CPU_DEVICE_ID
    }
}

/// The complete distribution plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize)]
pub struct DistributionPlan {
    /// Strategy that produced the plan.
    pub strategy: Strategy,
    /// Ordered layer ranges and their devices.
    pub assignment: Vec<Assignment>,
    /// `true` if some range is on CPU although an accelerator was present.
    pub degraded: bool,
    /// Number of layers in the model the plan was computed for.
    pub layer_count: u32,
}

impl DistributionPlan {
    /// The tier this plan belongs to.
    ///
    /// A layer-offload plan that placed nothing on an accelerator is
    /// [`Tier::CpuOnly`].
    pub fn tier(&self) -> Tier {
        match self.strategy {
            Strategy::SingleDevice => Tier::SingleDevice,
            Strategy::ModelParallel | Strategy::PipelineParallel => Tier::Parallel,
            Strategy::LayerOffload if self.assignment.iter().all(Assignment::is_cpu) => Tier::CpuOnly,
            Strategy::LayerOffload => Tier::LayerOffload,
        }
    }

    /// Device ids in assignment order (a device may appear once per range).
    pub fn devices(&self) -> impl Iterator<Item = &str> {
        self.assignment.iter().map(|a| a.device_id.as_str())
    }

    /// Number of layers placed on `device_id`.
    pub fn layers_on(&self, device_id: &str) -> u32 {
        self.assignment
            .iter()
            .filter(|a| a.device_id == device_id)
            .map(|a| a.layers.len())
            .sum()
    }

    /// Number of layers placed on accelerators.
    pub fn accelerator_layers(&self) -> u32 {
        self.assignment
            .iter()
            .filter(|a| !a.is_cpu())
            .map(|a| a.layers.len())
            .sum()
    }

    /// Returns `true` if any range is on CPU.
    pub fn uses_cpu(&self) -> bool {
        self.assignment.iter().any(Assignment::is_cpu)
    }

    /// Device owning `layer`, if covered.
    pub fn device_for_layer(&self, layer: u32) -> Option<&str> {
        self.assignment
            .iter()
            .find(|a| a.layers.start <= layer && layer < a.layers.end)
            .map(|a| a.device_id.as_str())
    }

    /// Checks the coverage invariant.
    ///
    /// Checks:
    /// - Plan is non-empty.
    /// - No empty ranges.
    /// - Ranges are contiguous and ascending, starting at layer 0.
    /// - The last range ends at `layer_count`.
    pub fn validate(&self) -> Result<(), PlannerError> {
        if self.assignment.is_empty() {
            return Err(PlannerError::EmptyPlan);
        }

        let mut expected_start = 0;
        for (i, a) in self.assignment.iter().enumerate() {
            if a.layers.is_empty() {
                return Err(PlannerError::InvalidPlan {
                    strategy: self.strategy.to_string(),
                    detail: format!("range {i} ({}) on {} is empty", a.layers, a.device_id),
                });
            }
            if a.layers.start != expected_start {
                return Err(PlannerError::InvalidPlan {
                    strategy: self.strategy.to_string(),
                    detail: format!(
                        "range {i} starts at layer {}, expected {expected_start}",
                        a.layers.start
                    ),
                });
            }
            expected_start = a.layers.end;
        }

        if expected_start != self.layer_count {
            return Err(PlannerError::IncompleteCoverage {
                covered: expected_start,
                expected: self.layer_count,
            });
        }
        Ok(())
    }

    /// Compact placement description, e.g. `cuda:0[0..30) + cpu[30..32)`.
    pub fn device_summary(&self) -> String {
        self.assignment
            .iter()
            .map(|a| format!("{}[{})", a.device_id, a.layers))
            .collect::<Vec<_>>()
            .join(" + ")
    }

    /// Returns a human-readable summary of the plan.
    pub fn summary(&self) -> String {
        format!(
            "{} ({} tier{}): {}",
            self.strategy,
            self.tier(),
            if self.degraded { ", degraded" } else { "" },
            self.device_summary()
        )
    }
}

/// Builder for constructing a [`DistributionPlan`] range by range.
///
/// Consecutive ranges on the same device are merged; zero-length ranges
/// are dropped.
pub(crate) struct PlanBuilder {
    strategy: Strategy,
    layer_count: u32,
    next_layer: u32,
    assignment: Vec<Assignment>,
}

impl PlanBuilder {
    pub fn new(strategy: Strategy, layer_count: u32) -> Self {
        Self {
            strategy,
            layer_count,
            next_layer: 0,
            assignment: Vec::new(),
        }
    }

    /// Layers not yet assigned.
    pub fn remaining(&self) -> u32 {
        self.layer_count - self.next_layer
    }

    /// Places the next `count` layers on `device_id`.
    pub fn push(&mut self, device_id: &str, count: u32) {
        let count = count.min(self.remaining());
        if count == 0 {
            return;
        }
        let start = self.next_layer;
        self.next_layer += count;

        if let Some(last) = self.assignment.last_mut() {
            if last.device_id == device_id {
                last.layers.end = self.next_layer;
                return;
            }
        }
        self.assignment.push(Assignment {
            layers: LayerRange::new(start, self.next_layer),
            device_id: device_id.to_string(),
        });
    }

    /// Places every remaining layer on `device_id`.
    pub fn push_rest(&mut self, device_id: &str) {
        let rest = self.remaining();
        self.push(device_id, rest);
    }

    /// Finishes the plan; `has_accelerator` refers to the device list the
    /// plan was computed from.
    pub fn build(self, has_accelerator: bool) -> DistributionPlan {
        let degraded = has_accelerator && self.assignment.iter().any(Assignment::is_cpu);
        DistributionPlan {
            strategy: self.strategy,
            assignment: self.assignment,
            degraded,
            layer_count: self.layer_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assign(start: u32, end: u32, dev: &str) -> Assignment {
        Assignment {
            layers: LayerRange::new(start, end),
            device_id: dev.to_string(),
        }
    }

    fn sample_plan() -> DistributionPlan {
        DistributionPlan {
            strategy: Strategy::LayerOffload,
            assignment: vec![assign(0, 30, "cuda:0"), assign(30, 32, "cpu")],
            degraded: true,
            layer_count: 32,
        }
    }

    #[test]
    fn test_validate_ok() {
        sample_plan().validate().unwrap();
    }

    #[test]
    fn test_validate_empty() {
        let mut plan = sample_plan();
        plan.assignment.clear();
        assert_eq!(plan.validate(), Err(PlannerError::EmptyPlan));
    }

    #[test]
    fn test_validate_gap() {
        let mut plan = sample_plan();
        plan.assignment[1] = assign(31, 32, "cpu");
        assert!(matches!(plan.validate(), Err(PlannerError::InvalidPlan { .. })));
    }

    #[test]
    fn test_validate_overlap() {
        let mut plan = sample_plan();
        plan.assignment[1] = assign(29, 32, "cpu");
        assert!(matches!(plan.validate(), Err(PlannerError::InvalidPlan { .. })));
    }

    #[test]
    fn test_validate_short() {
        let mut plan = sample_plan();
        plan.layer_count = 40;
        assert_eq!(
            plan.validate(),
            Err(PlannerError::IncompleteCoverage {
                covered: 32,
                expected: 40
            })
        );
    }

    #[test]
    fn test_validate_empty_range() {
        let mut plan = sample_plan();
        plan.assignment.insert(1, assign(30, 30, "cuda:1"));
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_tier() {
        assert_eq!(sample_plan().tier(), Tier::LayerOffload);
        let cpu_only = DistributionPlan {
            strategy: Strategy::LayerOffload,
            assignment: vec![assign(0, 32, "cpu")],
            degraded: true,
            layer_count: 32,
        };
        assert_eq!(cpu_only.tier(), Tier::CpuOnly);
    }

    #[test]
    fn test_layer_counts() {
        let plan = sample_plan();
        assert_eq!(plan.layers_on("cuda:0"), 30);
        assert_eq!(plan.layers_on("cpu"), 2);
        assert_eq!(plan.layers_on("cuda:1"), 0);
        assert_eq!(plan.accelerator_layers(), 30);
    }

    #[test]
    fn test_device_for_layer() {
        let plan = sample_plan();
        assert_eq!(plan.device_for_layer(0), Some("cuda:0"));
        assert_eq!(plan.device_for_layer(31), Some("cpu"));
        assert_eq!(plan.device_for_layer(32), None);
    }

    #[test]
    fn test_summary() {
        let s = sample_plan().summary();
        assert!(s.contains("layer-offload"));
        assert!(s.contains("degraded"));
        assert!(s.contains("cuda:0[0..30) + cpu[30..32)"));
    }

    #[test]
    fn test_builder_merges_and_drops() {
        let mut b = PlanBuilder::new(Strategy::PipelineParallel, 10);
        b.push("cuda:0", 3);
        b.push("cuda:0", 2);
        b.push("cuda:1", 0);
        b.push_rest("cpu");
        let plan = b.build(true);
        assert_eq!(plan.assignment, vec![assign(0, 5, "cuda:0"), assign(5, 10, "cpu")]);
        assert!(plan.degraded);
        plan.validate().unwrap();
    }

    #[test]
    fn test_builder_clamps_overflow() {
        let mut b = PlanBuilder::new(Strategy::SingleDevice, 4);
        b.push("cuda:0", 100);
        assert_eq!(b.remaining(), 0);
        let plan = b.build(true);
        assert!(!plan.degraded);
        plan.validate().unwrap();
    }

    #[test]
    fn test_serialize() {
        let json = serde_json::to_value(sample_plan()).unwrap();
        assert_eq!(json["strategy"], "layer_offload");
        assert_eq!(json["assignment"][1]["device_id"], "cpu");
    }
}
