// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # device-detect
//!
//! Discovers the compute devices a model can be spread across and the
//! memory budget of each.
//!
//! # Probed Devices
//! - **CUDA GPUs**: `nvidia-smi`, budget = free VRAM.
//! - **ROCm GPUs**: amdgpu sysfs VRAM counters, budget = total − used.
//! - **Unified memory**: Apple Silicon GPU, budget = share of system RAM.
//! - **NPUs**: Intel / AMD via `/sys/class/accel`, budget = share of
//!   available RAM.
//! - **CPU**: always present, budget = available system memory.
//!
//! # Graceful Degradation
//! Detection never fails. A probe that cannot run (missing tool, missing
//! sysfs path, wrong platform) is logged and that device kind omitted; the
//! worst case is a CPU-only list.
//!
//! # Example
//! ```no_run
//! use device_detect::{DetectorConfig, DeviceDetector};
//!
//! let devices = DeviceDetector::new(DetectorConfig::default()).detect();
//! for d in &devices {
//!     println!("{}", d.summary());
//! }
//! ```

mod detector;
mod error;
mod hints;
mod memory;
pub mod probe;
mod profile;

pub use detector::{detect, DeviceDetector};
pub use error::ProbeError;
pub use hints::{AcceleratorHints, DetectorConfig, Hint, HintKey, FORCE_CPU_ENV};
pub use memory::SystemMemory;
pub use profile::{has_accelerator, primary_device, secondary_device, DeviceKind, DeviceProfile, CPU_DEVICE_ID};
