// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! NPUs exposed through the Linux compute-accelerator class.
//!
//! Both the Intel (`intel_vpu`) and AMD (`amdxdna`) drivers register
//! `/sys/class/accel/accelN`. The owning driver is read from the device's
//! `uevent` file. NPUs work out of host memory, so the budget is a share of
//! available system memory.

use super::{numbered_entries, read_sysfs_file, DeviceProbe};
use crate::{DeviceKind, DeviceProfile, HintKey, ProbeError, SystemMemory};
use device_memory::ByteSize;
use std::path::PathBuf;

const ACCEL_ROOT: &str = "/sys/class/accel";

/// Lists NPUs bound to one driver.
#[derive(Debug, Clone)]
pub struct NpuProbe {
    accel_root: PathBuf,
    driver: &'static str,
    vendor_name: &'static str,
    hint_key: HintKey,
    fraction: f64,
}

impl NpuProbe {
    /// Intel NPU (`intel_vpu` driver), governed by `USE_INTEL_NPU`.
    pub fn intel(fraction: f64) -> Self {
        Self {
            accel_root: PathBuf::from(ACCEL_ROOT),
            driver: "intel_vpu",
            vendor_name: "Intel NPU",
            hint_key: HintKey::IntelNpu,
            fraction,
        }
    }

    /// AMD NPU (`amdxdna` driver), governed by `USE_AMD_NPU`.
    pub fn amd(fraction: f64) -> Self {
        Self {
            accel_root: PathBuf::from(ACCEL_ROOT),
            driver: "amdxdna",
            vendor_name: "AMD NPU",
            hint_key: HintKey::AmdNpu,
            fraction,
        }
    }

    /// Walks a different accel class directory.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.accel_root = root.into();
        self
    }
}

impl DeviceProbe for NpuProbe {
    fn hint_key(&self) -> HintKey {
        self.hint_key
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::Npu
    }

    fn probe(&self, host: &SystemMemory) -> Result<Vec<DeviceProfile>, ProbeError> {
        if !self.accel_root.exists() {
            return Err(ProbeError::NotAvailable {
                what: self.accel_root.display().to_string(),
            });
        }

        let budget = ByteSize::from_bytes(host.available_bytes).scaled(self.fraction);
        let mut devices = Vec::new();
        for (index, entry) in numbered_entries(&self.accel_root, "accel")? {
            let Ok(uevent) = read_sysfs_file(&entry.join("device").join("uevent")) else {
                continue;
            };
            let bound = uevent
                .lines()
                .filter_map(|l| l.strip_prefix("DRIVER="))
                .any(|d| d.trim() == self.driver);
            if bound {
                devices.push(DeviceProfile::new(
                    format!("npu:{index}"),
                    self.vendor_name,
                    DeviceKind::Npu,
                    budget,
                ));
            }
        }

        if devices.is_empty() {
            return Err(ProbeError::NotAvailable {
                what: format!("{} ({})", self.vendor_name, self.driver),
            });
        }
        Ok(devices)
    }
}
