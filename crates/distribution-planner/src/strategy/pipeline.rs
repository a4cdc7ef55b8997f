// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Rule 3: pipeline stages across qualifying accelerators, CPU last.
//!
//! An accelerator qualifies when its budget reaches the per-stage
//! threshold: `max(one layer, pipeline_min_fraction · weight)`. Qualifying
//! devices are filled in priority order, each taking as many whole layers
//! as fit; whatever is left becomes the CPU stage.

use super::PlanInput;
use crate::plan::PlanBuilder;
use crate::{DistributionPlan, Strategy, CPU_DEVICE_ID};

pub(crate) fn try_plan(input: &PlanInput<'_>) -> Option<DistributionPlan> {
    let threshold = stage_threshold(input);
    let stages: Vec<_> = input
        .accelerators()
        .filter(|d| d.memory_budget_bytes >= threshold)
        .collect();
    if stages.is_empty() {
        return None;
    }

    let mut builder = PlanBuilder::new(Strategy::PipelineParallel, input.layers);
    for device in stages {
        builder.push(&device.id, input.capacity(device));
    }
    builder.push_rest(CPU_DEVICE_ID);
    Some(builder.build(input.has_accelerator))
}

/// Minimum budget for an accelerator to host a pipeline stage.
pub(crate) fn stage_threshold(input: &PlanInput<'_>) -> u64 {
    let fraction = input.config.pipeline_min_fraction;
    let by_fraction = (input.weight_bytes as f64 * fraction).ceil() as u64;
    by_fraction.max(input.per_layer_bytes)
}
