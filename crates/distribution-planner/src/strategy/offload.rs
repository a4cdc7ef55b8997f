// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Rule 4: layer offload, and the CPU-only fallback.
//!
//! The best device (highest priority) takes the leading layers that fit,
//! but never all of them: at least the final layer goes to CPU, so the
//! plan is always strictly cheaper on the accelerator than a single-device
//! placement.

use super::PlanInput;
use crate::plan::PlanBuilder;
use crate::{DistributionPlan, Strategy, CPU_DEVICE_ID};

/// Always produces a plan.
pub(crate) fn plan(input: &PlanInput<'_>) -> DistributionPlan {
    let mut builder = PlanBuilder::new(Strategy::LayerOffload, input.layers);
    if let Some(best) = input.devices.first().filter(|d| d.is_accelerator()) {
        let fit = input.capacity(best).min(input.layers - 1);
        builder.push(&best.id, fit);
    }
    builder.push_rest(CPU_DEVICE_ID);
    builder.build(input.has_accelerator)
}

/// Every layer on CPU.
pub(crate) fn cpu_only(input: &PlanInput<'_>) -> DistributionPlan {
    let mut builder = PlanBuilder::new(Strategy::LayerOffload, input.layers);
    builder.push_rest(CPU_DEVICE_ID);
    builder.build(input.has_accelerator)
}
