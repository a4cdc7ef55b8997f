// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The planner: one function, four rules, first match wins.
//!
//! | Rule | Strategy | Tier | Applies when |
//! |---|---|---|---|
//! | 1 | `SingleDevice` | 0 | top device budget ≥ weights |
//! | 2 | `ModelParallel` | 1 | ≥ 2 accelerators jointly hold every layer |
//! | 3 | `PipelineParallel` | 1 | some accelerator reaches the stage threshold |
//! | 4 | `LayerOffload` | 2 | always |
//! | - | `LayerOffload` (all CPU) | 3 | `min_tier = CpuOnly` |
//!
//! Rules below `min_tier` are skipped, so raising `min_tier` never yields
//! a cheaper plan.
//!
//! Rules 2 to 4 fill an accelerator with whole layers only after setting
//! aside the activations of `activation_reserve_tokens` tokens, so a stage
//! that fills its device still has room to run.

use crate::strategy::{offload, parallel, pipeline, single, PlanInput};
use crate::{DistributionPlan, Tier};
use device_detect::DeviceProfile;
use model_catalog::ModelSpec;

/// Planner tuning.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Share of the model an accelerator must hold to host a pipeline stage.
    pub pipeline_min_fraction: f64,
    /// Context length whose activations every accelerator stage keeps free.
    pub activation_reserve_tokens: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            pipeline_min_fraction: 0.5,
            activation_reserve_tokens: 1024,
        }
    }
}

impl PlannerConfig {
    fn sanitized(&self) -> Self {
        let fraction = if self.pipeline_min_fraction.is_finite() {
            self.pipeline_min_fraction.clamp(0.0, 1.0)
        } else {
            Self::default().pipeline_min_fraction
        };
        Self {
            pipeline_min_fraction: fraction,
            activation_reserve_tokens: self.activation_reserve_tokens,
        }
    }
}

/// Chooses a distribution strategy and produces a plan.
///
/// Pure and deterministic: the same model, device list and `min_tier`
/// always give the same plan.
#[derive(Debug, Clone, Default)]
pub struct DistributionPlanner {
    config: PlannerConfig,
}

impl DistributionPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self {
            config: config.sanitized(),
        }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Plans `model` over `devices`, never choosing a tier below `min_tier`.
    ///
    /// Never fails. With a CPU-only device list the result is either
    /// `SingleDevice` on CPU or a CPU-only offload.
    pub fn plan(&self, model: &ModelSpec, devices: &[DeviceProfile], min_tier: Tier) -> DistributionPlan {
        let input = PlanInput::new(model, devices, &self.config);

        let mut plan = None;
        if min_tier <= Tier::SingleDevice {
            plan = single::try_plan(&input);
        }
        if plan.is_none() && min_tier <= Tier::Parallel {
            plan = parallel::try_plan(&input).or_else(|| pipeline::try_plan(&input));
        }
        if plan.is_none() && min_tier <= Tier::LayerOffload {
            plan = Some(offload::plan(&input));
        }
        let plan = plan.unwrap_or_else(|| offload::cpu_only(&input));

        debug_assert!(plan.validate().is_ok(), "planner produced invalid plan: {plan:?}");
        tracing::debug!(
            model = %model.identifier,
            min_tier = %min_tier,
            strategy = %plan.strategy,
            degraded = plan.degraded,
            placement = %plan.device_summary(),
            "planned"
        );
        plan
    }
}

/// Plans with the default configuration.
///
/// This is a convenience wrapper around [`DistributionPlanner::plan()`].
pub fn plan(model: &ModelSpec, devices: &[DeviceProfile], min_tier: Tier) -> DistributionPlan {
    DistributionPlanner::default().plan(model, devices, min_tier)
}
