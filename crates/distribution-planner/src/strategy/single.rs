// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Rule 1: the whole model on the highest-priority device.

use super::PlanInput;
use crate::plan::PlanBuilder;
use crate::{DistributionPlan, Strategy};

/// Applies when the top device's budget covers the full weight size.
pub(crate) fn try_plan(input: &PlanInput<'_>) -> Option<DistributionPlan> {
    let top = input.devices.first()?;
    if top.memory_budget_bytes < input.weight_bytes {
        return None;
    }

    let mut builder = PlanBuilder::new(Strategy::SingleDevice, input.layers);
    builder.push_rest(&top.id);
    Some(builder.build(input.has_accelerator))
}
