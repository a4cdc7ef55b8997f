// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Accelerator probes.
//!
//! Each probe answers for one accelerator family and is governed by one
//! [`HintKey`]. Probes are plain synchronous queries (a vendor tool, a
//! sysfs walk, a platform check) and report failure as a [`ProbeError`],
//! which the detector swallows.
//!
//! | Probe | Kind | Source |
//! |---|---|---|
//! | [`NvidiaSmiProbe`] | `GpuVendorA` | `nvidia-smi --query-gpu` |
//! | [`RocmSysfsProbe`] | `GpuVendorB` | `/sys/class/drm/card*/device/mem_info_vram_*` |
//! | [`UnifiedMemoryProbe`] | `UnifiedMemory` | Apple Silicon, share of system RAM |
//! | [`NpuProbe`] | `Npu` | `/sys/class/accel/accel*/device/uevent` driver match |

mod amd;
mod npu;
mod nvidia;
mod unified;

pub use amd::RocmSysfsProbe;
pub use npu::NpuProbe;
pub use nvidia::NvidiaSmiProbe;
pub use unified::UnifiedMemoryProbe;

use crate::{DetectorConfig, DeviceKind, DeviceProfile, HintKey, ProbeError, SystemMemory};
use std::path::Path;

/// A source of accelerator profiles for one family.
pub trait DeviceProbe: Send + Sync {
    /// The hint governing this probe.
    fn hint_key(&self) -> HintKey;

    /// The kind of device this probe reports.
    fn kind(&self) -> DeviceKind;

    /// Queries the host. Profiles are returned with rank 0.
    fn probe(&self, host: &SystemMemory) -> Result<Vec<DeviceProfile>, ProbeError>;
}

/// The probes used on a real host.
pub fn default_probes(config: &DetectorConfig) -> Vec<Box<dyn DeviceProbe>> {
    vec![
        Box::new(NvidiaSmiProbe::new()),
        Box::new(RocmSysfsProbe::new()),
        Box::new(UnifiedMemoryProbe::new(config.unified_memory_fraction)),
        Box::new(NpuProbe::intel(config.npu_memory_fraction)),
        Box::new(NpuProbe::amd(config.npu_memory_fraction)),
    ]
}

/// Reads a sysfs file and returns its trimmed content.
pub(crate) fn read_sysfs_file(path: &Path) -> Result<String, ProbeError> {
    if !path.exists() {
        return Err(ProbeError::NotAvailable {
            what: path.display().to_string(),
        });
    }
    std::fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|e| ProbeError::ReadError {
            path: path.display().to_string(),
            source: e,
        })
}

/// Reads a sysfs file holding a single decimal integer.
pub(crate) fn read_sysfs_u64(path: &Path) -> Result<u64, ProbeError> {
    let content = read_sysfs_file(path)?;
    content.parse::<u64>().map_err(|_| ProbeError::ParseError {
        source_name: path.display().to_string(),
        detail: format!("expected integer, got '{content}'"),
    })
}

/// Lists `root/<prefix>N` entries sorted by `N`.
pub(crate) fn numbered_entries(root: &Path, prefix: &str) -> Result<Vec<(u32, std::path::PathBuf)>, ProbeError> {
    let entries = std::fs::read_dir(root).map_err(|e| ProbeError::ReadError {
        path: root.display().to_string(),
        source: e,
    })?;

    let mut found: Vec<(u32, std::path::PathBuf)> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name();
            let index = name.to_str()?.strip_prefix(prefix)?.parse::<u32>().ok()?;
            Some((index, entry.path()))
        })
        .collect();
    found.sort_by_key(|(index, _)| *index);
    Ok(found)
}
