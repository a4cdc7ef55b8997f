// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # distribution-planner
//!
//! Decides how a model's layers are spread across the detected devices.
//!
//! # Strategies
//!
//! | Strategy | Devices | Degraded | Tier |
//! |---|---|---|---|
//! | [`Strategy::SingleDevice`] | 1 | no | 0 |
//! | [`Strategy::ModelParallel`] | ≥ 2 accelerators | no | 1 |
//! | [`Strategy::PipelineParallel`] | accelerators + CPU stage | if CPU used | 1 |
//! | [`Strategy::LayerOffload`] | best device + CPU | if an accelerator exists | 2 / 3 |
//!
//! Strategy selection is a tagged enum chosen by one planner function.
//! Planning is pure arithmetic over [`ModelSpec`](model_catalog::ModelSpec)
//! and [`DeviceProfile`](device_detect::DeviceProfile)s, never fails, and
//! is deterministic, so it is cheap to call again after a failure with a
//! higher `min_tier`.
//!
//! # Example
//! ```
//! use device_detect::{DeviceKind, DeviceProfile};
//! use device_memory::ByteSize;
//! use distribution_planner::{plan, Strategy, Tier};
//! use model_catalog::{ModelSpec, Precision};
//!
//! let devices = vec![
//!     DeviceProfile::new("cuda:0", "GPU", DeviceKind::GpuVendorA, ByteSize::from_gb(2)),
//!     DeviceProfile::cpu(ByteSize::from_gb(32)),
//! ];
//! let model = ModelSpec::from_weight_size("m", ByteSize::from_gb(10), 40, 4096, Precision::F16);
//!
//! let p = plan(&model, &devices, Tier::SingleDevice);
//! assert_eq!(p.strategy, Strategy::LayerOffload);
//! assert!(p.degraded);
//! ```

mod error;
pub(crate) mod plan;
mod planner;
pub(crate) mod strategy;
mod tier;

pub use error::PlannerError;
pub use plan::{Assignment, DistributionPlan, LayerRange, Strategy, CPU_DEVICE_ID};
pub use planner::{plan, DistributionPlanner, PlannerConfig};
pub use tier::Tier;
