// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The four placement rules, tried in order by the planner.
//!
//! Rules are purely arithmetic (no I/O) over a [`PlanInput`]. Each returns
//! `None` when it does not apply, except [`offload`], which always
//! produces a plan.

pub(crate) mod offload;
pub(crate) mod parallel;
pub(crate) mod pipeline;
pub(crate) mod single;

use crate::PlannerConfig;
use device_detect::DeviceProfile;
use model_catalog::ModelSpec;

/// Everything a rule needs, precomputed once per `plan()` call.
pub(crate) struct PlanInput<'a> {
    pub layers: u32,
    pub weight_bytes: u64,
    pub per_layer_bytes: u64,
    /// Activation bytes each accelerator stage keeps free.
    pub activation_reserve_bytes: u64,
    pub devices: &'a [DeviceProfile],
    pub has_accelerator: bool,
    pub config: &'a PlannerConfig,
}

impl<'a> PlanInput<'a> {
    pub fn new(model: &ModelSpec, devices: &'a [DeviceProfile], config: &'a PlannerConfig) -> Self {
        Self {
            layers: model.layer_count.max(1),
            weight_bytes: model.weight_size_bytes,
            per_layer_bytes: model.per_layer_bytes().max(1),
            activation_reserve_bytes: model.activation_bytes(config.activation_reserve_tokens),
            devices,
            has_accelerator: device_detect::has_accelerator(devices),
            config,
        }
    }

    /// Accelerators in priority order.
    pub fn accelerators(&self) -> impl Iterator<Item = &'a DeviceProfile> {
        self.devices.iter().filter(|d| d.is_accelerator())
    }

    /// Whole layers that fit in a device's budget once the activation
    /// reserve is set aside, capped at the layer count.
    pub fn capacity(&self, device: &DeviceProfile) -> u32 {
        let usable = device.memory_budget_bytes.saturating_sub(self.activation_reserve_bytes);
        (usable / self.per_layer_bytes).min(self.layers as u64) as u32
    }
}
