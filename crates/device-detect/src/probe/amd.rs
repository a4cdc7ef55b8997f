// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! ROCm GPUs via the amdgpu sysfs interface.
//!
//! The amdgpu driver exposes VRAM counters per card:
//! `/sys/class/drm/cardN/device/mem_info_vram_total` and
//! `.../mem_info_vram_used`, both in bytes. The budget is `total - used`.

use super::{numbered_entries, read_sysfs_file, read_sysfs_u64, DeviceProbe};
use crate::{DeviceKind, DeviceProfile, HintKey, ProbeError, SystemMemory};
use device_memory::ByteSize;
use std::path::{Path, PathBuf};

const DRM_ROOT: &str = "/sys/class/drm";
const AMD_PCI_VENDOR: &str = "0x1002";

/// Lists AMD GPUs with VRAM counters.
#[derive(Debug, Clone)]
pub struct RocmSysfsProbe {
    drm_root: PathBuf,
}

impl RocmSysfsProbe {
    pub fn new() -> Self {
        Self::with_root(DRM_ROOT)
    }

    /// Walks a different DRM class directory.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            drm_root: root.into(),
        }
    }

    fn read_card(card: &Path) -> Result<Option<(String, u64, u64)>, ProbeError> {
        let device = card.join("device");
        match read_sysfs_file(&device.join("vendor")) {
            Ok(vendor) if vendor == AMD_PCI_VENDOR => {}
            _ => return Ok(None),
        }

        let total = read_sysfs_u64(&device.join("mem_info_vram_total"))?;
        let used = read_sysfs_u64(&device.join("mem_info_vram_used"))?;
        let name = read_sysfs_file(&device.join("product_name"))
            .ok()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "AMD Radeon GPU".to_string());

        Ok(Some((name, total, used)))
    }
}

impl Default for RocmSysfsProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceProbe for RocmSysfsProbe {
    fn hint_key(&self) -> HintKey {
        HintKey::Rocm
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::GpuVendorB
    }

    fn probe(&self, _host: &SystemMemory) -> Result<Vec<DeviceProfile>, ProbeError> {
        if !self.drm_root.exists() {
            return Err(ProbeError::NotAvailable {
                what: self.drm_root.display().to_string(),
            });
        }

        let mut devices = Vec::new();
        for (_, card) in numbered_entries(&self.drm_root, "card")? {
            let Some((name, total, used)) = Self::read_card(&card)? else {
                continue;
            };
            let index = devices.len();
            devices.push(
                DeviceProfile::new(
                    format!("rocm:{index}"),
                    name,
                    DeviceKind::GpuVendorB,
                    ByteSize::from_bytes(total.saturating_sub(used)),
                )
                .with_total_memory(ByteSize::from_bytes(total)),
            );
        }
        Ok(devices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_card(root: &Path, card: &str, vendor: &str, total: u64, used: u64) {
        let dev = root.join(card).join("device");
        std::fs::create_dir_all(&dev).unwrap();
        std::fs::write(dev.join("vendor"), format!("{vendor}\n")).unwrap();
        std::fs::write(dev.join("mem_info_vram_total"), format!("{total}\n")).unwrap();
        std::fs::write(dev.join("mem_info_vram_used"), format!("{used}\n")).unwrap();
    }

    fn host() -> SystemMemory {
        SystemMemory {
            total_bytes: 0,
            available_bytes: 0,
        }
    }

    #[test]
    fn test_reads_amd_cards_only() {
        let root = std::env::temp_dir().join("adaptive_rt_drm_test");
        let _ = std::fs::remove_dir_all(&root);
        fake_card(&root, "card0", "0x8086", 0, 0);
        fake_card(&root, "card1", AMD_PCI_VENDOR, 16 << 30, 2 << 30);
        std::fs::create_dir_all(root.join("card1-DP-1")).unwrap();

        let devices = RocmSysfsProbe::with_root(&root).probe(&host()).unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].id, "rocm:0");
        assert_eq!(devices[0].kind, DeviceKind::GpuVendorB);
        assert_eq!(devices[0].memory_budget_bytes, 14 << 30);
        assert_eq!(devices[0].total_memory_bytes, Some(16 << 30));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_missing_root() {
        let probe = RocmSysfsProbe::with_root("/nonexistent/adaptive-rt/drm");
        assert!(matches!(
            probe.probe(&host()),
            Err(ProbeError::NotAvailable { .. })
        ));
    }
}
