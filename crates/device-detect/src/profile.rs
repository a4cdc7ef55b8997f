// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Device descriptions produced by detection.

use device_memory::ByteSize;
use std::fmt;

/// Device id of the host CPU. Every CPU profile carries it.
pub const CPU_DEVICE_ID: &str = "cpu";

/// The kind of compute device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// Discrete GPU driven through CUDA.
    GpuVendorA,
    /// Discrete GPU driven through ROCm.
    GpuVendorB,
    /// Unified-memory accelerator (Metal / MPS).
    UnifiedMemory,
    /// Neural processing unit.
    Npu,
    /// The host CPU.
    Cpu,
}

impl DeviceKind {
    /// Returns `true` for every kind except [`DeviceKind::Cpu`].
    pub fn is_accelerator(&self) -> bool {
        !matches!(self, DeviceKind::Cpu)
    }

    /// Returns `true` for discrete GPUs.
    pub fn is_discrete_gpu(&self) -> bool {
        matches!(self, DeviceKind::GpuVendorA | DeviceKind::GpuVendorB)
    }

    /// Returns `true` for kinds whose budget is carved out of host RAM.
    pub fn shares_host_memory(&self) -> bool {
        matches!(self, DeviceKind::UnifiedMemory | DeviceKind::Npu)
    }

    /// Short backend label used in device ids and logs.
    pub fn label(&self) -> &'static str {
        match self {
            DeviceKind::GpuVendorA => "cuda",
            DeviceKind::GpuVendorB => "rocm",
            DeviceKind::UnifiedMemory => "mps",
            DeviceKind::Npu => "npu",
            DeviceKind::Cpu => "cpu",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One usable compute device and its memory budget.
///
/// Profiles are produced by [`DeviceDetector`](crate::DeviceDetector) as an
/// ordered list (highest priority first, rank 0) and are not mutated
/// afterwards; re-detection produces a fresh list.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DeviceProfile {
    /// Stable identifier, e.g. `cuda:0`, `mps:0`, `cpu`.
    pub id: String,
    /// Human-readable device name.
    pub name: String,
    /// Device kind.
    pub kind: DeviceKind,
    /// Bytes the runtime may place on this device.
    pub memory_budget_bytes: u64,
    /// Total device memory, where the vendor reports it.
    pub total_memory_bytes: Option<u64>,
    /// Position in the detected list; 0 is the highest priority.
    pub priority_rank: u32,
}

impl DeviceProfile {
    /// Creates a profile with rank 0; the detector assigns final ranks.
    ///
    /// A [`DeviceKind::Cpu`] profile always gets [`CPU_DEVICE_ID`],
    /// whatever `id` says.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: DeviceKind,
        memory_budget: ByteSize,
    ) -> Self {
        let id = match kind {
            DeviceKind::Cpu => CPU_DEVICE_ID.to_string(),
            _ => id.into(),
        };
        Self {
            id,
            name: name.into(),
            kind,
            memory_budget_bytes: memory_budget.as_bytes(),
            total_memory_bytes: None,
            priority_rank: 0,
        }
    }

    /// The host CPU profile.
    pub fn cpu(memory_budget: ByteSize) -> Self {
        Self::new(CPU_DEVICE_ID, "Host CPU", DeviceKind::Cpu, memory_budget)
    }

    /// Sets the vendor-reported total memory.
    pub fn with_total_memory(mut self, total: ByteSize) -> Self {
        self.total_memory_bytes = Some(total.as_bytes());
        self
    }

    /// Returns `true` for non-CPU devices.
    pub fn is_accelerator(&self) -> bool {
        self.kind.is_accelerator()
    }

    /// Memory budget as a [`ByteSize`].
    pub fn budget(&self) -> ByteSize {
        ByteSize::from_bytes(self.memory_budget_bytes)
    }

    /// Returns a one-line summary suitable for logs and the CLI.
    pub fn summary(&self) -> String {
        let total = self
            .total_memory_bytes
            .map(|t| format!(" of {}", ByteSize::from_bytes(t)))
            .unwrap_or_default();
        format!(
            "#{} {:<8} {:<6} {}{} budget  {}",
            self.priority_rank,
            self.id,
            self.kind,
            self.budget(),
            total,
            self.name
        )
    }
}

/// Returns `true` if `devices` contains at least one accelerator.
pub fn has_accelerator(devices: &[DeviceProfile]) -> bool {
    devices.iter().any(DeviceProfile::is_accelerator)
}

/// The highest-priority device, if any.
pub fn primary_device(devices: &[DeviceProfile]) -> Option<&DeviceProfile> {
    devices.first()
}

/// The device that absorbs overflow from the primary.
///
/// This is the second device in priority order, or the primary itself when
/// it is the only one (the CPU-only case).
pub fn secondary_device(devices: &[DeviceProfile]) -> Option<&DeviceProfile> {
    devices.get(1).or_else(|| devices.first())
}
