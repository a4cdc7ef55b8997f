// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Unified-memory accelerators (Apple Silicon GPU through Metal / MPS).
//!
//! The GPU shares physical memory with the CPU, so its budget is a fixed
//! share of total system memory rather than a vendor-reported figure.

use super::DeviceProbe;
use crate::{DeviceKind, DeviceProfile, HintKey, ProbeError, SystemMemory};
use device_memory::ByteSize;

/// Reports the Apple Silicon GPU on macOS/aarch64.
#[derive(Debug, Clone)]
pub struct UnifiedMemoryProbe {
    supported: bool,
    fraction: f64,
}

impl UnifiedMemoryProbe {
    /// Probe for the current platform.
    pub fn new(fraction: f64) -> Self {
        Self {
            supported: cfg!(all(target_os = "macos", target_arch = "aarch64")),
            fraction,
        }
    }

    /// Probe with an explicit platform answer.
    pub fn with_support(supported: bool, fraction: f64) -> Self {
        Self {
            supported,
            fraction,
        }
    }
}

impl DeviceProbe for UnifiedMemoryProbe {
    fn hint_key(&self) -> HintKey {
        HintKey::Mps
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::UnifiedMemory
    }

    fn probe(&self, host: &SystemMemory) -> Result<Vec<DeviceProfile>, ProbeError> {
        if !self.supported {
            return Err(ProbeError::NotAvailable {
                what: "unified-memory GPU".to_string(),
            });
        }
        if host.total_bytes == 0 {
            return Err(ProbeError::ParseError {
                source_name: "system memory".to_string(),
                detail: "total memory reported as zero".to_string(),
            });
        }

        let total = ByteSize::from_bytes(host.total_bytes);
        Ok(vec![DeviceProfile::new(
            "mps:0",
            "Apple Silicon GPU (Metal)",
            DeviceKind::UnifiedMemory,
            total.scaled(self.fraction),
        )
        .with_total_memory(total)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_is_share_of_total() {
        let host = SystemMemory {
            total_bytes: 16 << 30,
            available_bytes: 8 << 30,
        };
        let devices = UnifiedMemoryProbe::with_support(true, 0.75)
            .probe(&host)
            .unwrap();
        assert_eq!(devices[0].id, "mps:0");
        assert_eq!(devices[0].memory_budget_bytes, 12 << 30);
    }

    #[test]
    fn test_unsupported_platform() {
        let host = SystemMemory {
            total_bytes: 16 << 30,
            available_bytes: 8 << 30,
        };
        assert!(UnifiedMemoryProbe::with_support(false, 0.75)
            .probe(&host)
            .is_err());
    }
}
