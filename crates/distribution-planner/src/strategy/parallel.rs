// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Rule 2: model parallelism across accelerators.
//!
//! Accelerators are taken largest budget first (ties keep priority order)
//! until at least two are chosen and their budgets cover the model. Each
//! gets a contiguous range proportional to its budget:
//!
//! ```text
//! count_i = min(⌊L · b_i / Σb⌋, cap_i)      cap_i = ⌊b_i / per_layer⌋
//! ```
//! Leftover layers are handed out one at a time in the same order to
//! devices with spare capacity. If capacity runs out first the rule does
//! not apply.

use super::PlanInput;
use crate::plan::PlanBuilder;
use crate::{DistributionPlan, Strategy};
use device_detect::DeviceProfile;

pub(crate) fn try_plan(input: &PlanInput<'_>) -> Option<DistributionPlan> {
    let mut accelerators: Vec<&DeviceProfile> = input.accelerators().collect();
    if accelerators.len() < 2 {
        return None;
    }
    accelerators.sort_by(|a, b| b.memory_budget_bytes.cmp(&a.memory_budget_bytes));

    let mut total_budget: u64 = 0;
    let mut take = 0;
    for device in &accelerators {
        total_budget = total_budget.saturating_add(device.memory_budget_bytes);
        take += 1;
        if take >= 2 && total_budget >= input.weight_bytes {
            break;
        }
    }
    if total_budget < input.weight_bytes || total_budget == 0 {
        return None;
    }
    let chosen = &accelerators[..take];

    let caps: Vec<u32> = chosen.iter().map(|d| input.capacity(d)).collect();
    let mut counts: Vec<u32> = chosen
        .iter()
        .zip(&caps)
        .map(|(d, &cap)| {
            let share = input.layers as u128 * d.memory_budget_bytes as u128 / total_budget as u128;
            (share as u32).min(cap)
        })
        .collect();

    let mut remaining = input.layers - counts.iter().sum::<u32>();
    while remaining > 0 {
        let mut progressed = false;
        for (count, &cap) in counts.iter_mut().zip(&caps) {
            if remaining == 0 {
                break;
            }
            if *count < cap {
                *count += 1;
                remaining -= 1;
                progressed = true;
            }
        }
        if !progressed {
            tracing::debug!(
                unplaced = remaining,
                "model-parallel: accelerators cannot hold every whole layer"
            );
            return None;
        }
    }

    let mut builder = PlanBuilder::new(Strategy::ModelParallel, input.layers);
    for (device, count) in chosen.iter().zip(counts) {
        builder.push(&device.id, count);
    }
    Some(builder.build(input.has_accelerator))
}
