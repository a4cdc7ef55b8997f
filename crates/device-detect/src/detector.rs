// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The device detector: runs probes, applies hints, orders the result.
//!
//! # Ordering
//! ```text
//!   [enabled NPUs] → discrete GPUs (free memory ↓) → unified memory → NPUs → CPU
//! ```
//! Within a slot, devices keep probe order. The CPU is always appended last,
//! so the returned list is never empty.

use crate::probe::{default_probes, DeviceProbe};
use crate::{DetectorConfig, DeviceKind, DeviceProfile, Hint, SystemMemory};
use device_memory::ByteSize;
use std::cmp::Ordering;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// CPU budget used when the host reports no memory at all.
const FALLBACK_CPU_BUDGET: ByteSize = ByteSize::from_gb(2);

/// Discovers usable compute devices.
pub struct DeviceDetector {
    config: DetectorConfig,
    probes: Vec<Box<dyn DeviceProbe>>,
    host_memory: Option<SystemMemory>,
}

impl DeviceDetector {
    /// Detector with the platform's default probes.
    pub fn new(config: DetectorConfig) -> Self {
        let probes = default_probes(&config);
        Self::with_probes(config, probes)
    }

    /// Detector with an explicit probe set.
    pub fn with_probes(config: DetectorConfig, probes: Vec<Box<dyn DeviceProbe>>) -> Self {
        Self {
            config,
            probes,
            host_memory: None,
        }
    }

    /// Uses a fixed host memory reading instead of querying the OS.
    pub fn with_host_memory(mut self, memory: SystemMemory) -> Self {
        self.host_memory = Some(memory);
        self
    }

    /// The detector's configuration.
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Probes the host and returns devices in priority order.
    ///
    /// Never fails: a probe that errors (or panics) is logged and its
    /// device kind omitted. The CPU is always present and always last.
    pub fn detect(&self) -> Vec<DeviceProfile> {
        let host = self.host_memory.unwrap_or_else(SystemMemory::read);
        let hints = &self.config.hints;

        let mut found: Vec<(u8, DeviceProfile)> = Vec::new();
        for probe in &self.probes {
            let key = probe.hint_key();
            let hint = hints.get(key);
            if hint == Hint::Disable {
                tracing::debug!(probe = ?key, kind = %probe.kind(), "probe disabled by hint");
                continue;
            }

            let result = catch_unwind(AssertUnwindSafe(|| probe.probe(&host)));
            let devices = match result {
                Ok(Ok(devices)) => devices,
                Ok(Err(e)) => {
                    if hint == Hint::Enable {
                        tracing::warn!(probe = ?key, error = %e, "accelerator enabled by hint but probe failed");
                    } else {
                        tracing::debug!(probe = ?key, error = %e, "probe found nothing");
                    }
                    continue;
                }
                Err(_) => {
                    tracing::warn!(probe = ?key, "probe panicked, omitting device kind");
                    continue;
                }
            };

            for device in devices {
                if device.kind == DeviceKind::Cpu {
                    continue;
                }
                found.push((slot(device.kind, hint), device));
            }
        }

        found.sort_by(|(slot_a, a), (slot_b, b)| {
            slot_a.cmp(slot_b).then_with(|| {
                if a.kind.is_discrete_gpu() && b.kind.is_discrete_gpu() {
                    b.memory_budget_bytes.cmp(&a.memory_budget_bytes)
                } else {
                    Ordering::Equal
                }
            })
        });

        let mut devices: Vec<DeviceProfile> = found.into_iter().map(|(_, d)| d).collect();
        devices.push(self.cpu_profile(&host));

        for (rank, device) in devices.iter_mut().enumerate() {
            device.priority_rank = rank as u32;
        }

        for device in &devices {
            tracing::info!(
                rank = device.priority_rank,
                id = %device.id,
                kind = %device.kind,
                budget = %device.budget(),
                "detected device"
            );
        }

        devices
    }

    fn cpu_profile(&self, host: &SystemMemory) -> DeviceProfile {
        let budget = match self.config.cpu_budget {
            Some(budget) => budget,
            None if host.available_bytes > 0 => ByteSize::from_bytes(host.available_bytes),
            None => {
                tracing::warn!(fallback = %FALLBACK_CPU_BUDGET, "host reported no available memory");
                FALLBACK_CPU_BUDGET
            }
        };

        let cpu = DeviceProfile::cpu(budget);
        if host.total_bytes > 0 {
            cpu.with_total_memory(ByteSize::from_bytes(host.total_bytes))
        } else {
            cpu
        }
    }
}

/// Priority slot for a device; lower sorts first.
fn slot(kind: DeviceKind, hint: Hint) -> u8 {
    match kind {
        DeviceKind::Npu if hint == Hint::Enable => 0,
        DeviceKind::GpuVendorA | DeviceKind::GpuVendorB => 1,
        DeviceKind::UnifiedMemory => 2,
        DeviceKind::Npu => 3,
        DeviceKind::Cpu => 4,
    }
}

/// Detects devices with the default probes.
///
/// This is a convenience wrapper around [`DeviceDetector::detect()`].
pub fn detect(config: &DetectorConfig) -> Vec<DeviceProfile> {
    DeviceDetector::new(config.clone()).detect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HintKey, ProbeError};
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Arc;

    struct FakeProbe {
        key: HintKey,
        kind: DeviceKind,
        devices: Option<Vec<DeviceProfile>>,
        calls: Arc<AtomicUsize>,
    }

    impl FakeProbe {
        fn ok(key: HintKey, kind: DeviceKind, devices: Vec<DeviceProfile>) -> Box<Self> {
            Box::new(Self {
                key,
                kind,
                devices: Some(devices),
                calls: Arc::new(AtomicUsize::new(0)),
            })
        }

        fn failing(key: HintKey, kind: DeviceKind) -> Box<Self> {
            Box::new(Self {
                key,
                kind,
                devices: None,
                calls: Arc::new(AtomicUsize::new(0)),
            })
        }
    }

    impl DeviceProbe for FakeProbe {
        fn hint_key(&self) -> HintKey {
            self.key
        }

        fn kind(&self) -> DeviceKind {
            self.kind
        }

        fn probe(&self, _host: &SystemMemory) -> Result<Vec<DeviceProfile>, ProbeError> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            self.devices.clone().ok_or_else(|| ProbeError::NotAvailable {
                what: "fake".to_string(),
            })
        }
    }

    struct PanickingProbe;

    impl DeviceProbe for PanickingProbe {
        fn hint_key(&self) -> HintKey {
            HintKey::Rocm
        }

        fn kind(&self) -> DeviceKind {
            DeviceKind::GpuVendorB
        }

        fn probe(&self, _host: &SystemMemory) -> Result<Vec<DeviceProfile>, ProbeError> {
            panic!("driver exploded")
        }
    }

    fn host() -> SystemMemory {
        SystemMemory {
            total_bytes: 64 << 30,
            available_bytes: 32 << 30,
        }
    }

    fn gpu(id: &str, gb: u64) -> DeviceProfile {
        DeviceProfile::new(id, id, DeviceKind::GpuVendorA, ByteSize::from_gb(gb))
    }

    fn npu() -> DeviceProfile {
        DeviceProfile::new("npu:0", "Intel NPU", DeviceKind::Npu, ByteSize::from_gb(8))
    }

    fn mps() -> DeviceProfile {
        DeviceProfile::new("mps:0", "Apple GPU", DeviceKind::UnifiedMemory, ByteSize::from_gb(12))
    }

    fn ids(devices: &[DeviceProfile]) -> Vec<&str> {
        devices.iter().map(|d| d.id.as_str()).collect()
    }

    #[test]
    fn test_cpu_only_host() {
        let detector = DeviceDetector::with_probes(
            DetectorConfig::default(),
            vec![FakeProbe::failing(HintKey::Cuda, DeviceKind::GpuVendorA)],
        )
        .with_host_memory(host());
        let devices = detector.detect();
        assert_eq!(ids(&devices), vec!["cpu"]);
        assert_eq!(devices[0].memory_budget_bytes, 32 << 30);
        assert_eq!(devices[0].total_memory_bytes, Some(64 << 30));
        assert_eq!(devices[0].priority_rank, 0);
    }

    #[test]
    fn test_default_ordering() {
        let detector = DeviceDetector::with_probes(
            DetectorConfig::default(),
            vec![
                FakeProbe::ok(HintKey::IntelNpu, DeviceKind::Npu, vec![npu()]),
                FakeProbe::ok(HintKey::Mps, DeviceKind::UnifiedMemory, vec![mps()]),
                FakeProbe::ok(
                    HintKey::Cuda,
                    DeviceKind::GpuVendorA,
                    vec![gpu("cuda:0", 4), gpu("cuda:1", 10)],
                ),
            ],
        )
        .with_host_memory(host());

        let devices = detector.detect();
        assert_eq!(ids(&devices), vec!["cuda:1", "cuda:0", "mps:0", "npu:0", "cpu"]);
        let ranks: Vec<u32> = devices.iter().map(|d| d.priority_rank).collect();
        assert_eq!(ranks, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_enable_hint_raises_npu() {
        let mut config = DetectorConfig::default();
        config.hints.intel_npu = Hint::Enable;
        let detector = DeviceDetector::with_probes(
            config,
            vec![
                FakeProbe::ok(HintKey::Cuda, DeviceKind::GpuVendorA, vec![gpu("cuda:0", 8)]),
                FakeProbe::ok(HintKey::IntelNpu, DeviceKind::Npu, vec![npu()]),
            ],
        )
        .with_host_memory(host());
        assert_eq!(ids(&detector.detect()), vec!["npu:0", "cuda:0", "cpu"]);
    }

    #[test]
    fn test_enable_hint_does_not_invent_device() {
        let mut config = DetectorConfig::default();
        config.hints.intel_npu = Hint::Enable;
        let detector = DeviceDetector::with_probes(
            config,
            vec![FakeProbe::failing(HintKey::IntelNpu, DeviceKind::Npu)],
        )
        .with_host_memory(host());
        assert_eq!(ids(&detector.detect()), vec!["cpu"]);
    }

    #[test]
    fn test_disable_hint_skips_probe() {
        let probe = FakeProbe::ok(HintKey::Cuda, DeviceKind::GpuVendorA, vec![gpu("cuda:0", 8)]);
        let calls = Arc::clone(&probe.calls);
        let mut config = DetectorConfig::default();
        config.hints.cuda = Hint::Disable;

        let detector = DeviceDetector::with_probes(config, vec![probe]).with_host_memory(host());
        assert_eq!(ids(&detector.detect()), vec!["cpu"]);
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 0);
    }

    #[test]
    fn test_force_cpu() {
        let mut config = DetectorConfig::default();
        config.hints.force_cpu = true;
        let detector = DeviceDetector::with_probes(
            config,
            vec![
                FakeProbe::ok(HintKey::Cuda, DeviceKind::GpuVendorA, vec![gpu("cuda:0", 8)]),
                FakeProbe::ok(HintKey::Mps, DeviceKind::UnifiedMemory, vec![mps()]),
            ],
        )
        .with_host_memory(host());
        assert_eq!(ids(&detector.detect()), vec!["cpu"]);
    }

    #[test]
    fn test_panicking_probe_is_absorbed() {
        let detector = DeviceDetector::with_probes(
            DetectorConfig::default(),
            vec![
                Box::new(PanickingProbe),
                FakeProbe::ok(HintKey::Cuda, DeviceKind::GpuVendorA, vec![gpu("cuda:0", 8)]),
            ],
        )
        .with_host_memory(host());
        assert_eq!(ids(&detector.detect()), vec!["cuda:0", "cpu"]);
    }

    #[test]
    fn test_cpu_budget_override_and_fallback() {
        let mut config = DetectorConfig::default();
        config.cpu_budget = Some(ByteSize::from_gb(3));
        let devices = DeviceDetector::with_probes(config, vec![])
            .with_host_memory(host())
            .detect();
        assert_eq!(devices[0].budget(), ByteSize::from_gb(3));

        let empty_host = SystemMemory {
            total_bytes: 0,
            available_bytes: 0,
        };
        let devices = DeviceDetector::with_probes(DetectorConfig::default(), vec![])
            .with_host_memory(empty_host)
            .detect();
        assert_eq!(devices[0].budget(), FALLBACK_CPU_BUDGET);
        assert_eq!(devices[0].total_memory_bytes, None);
    }

    #[test]
    fn test_detect_is_idempotent() {
        let detector = DeviceDetector::with_probes(
            DetectorConfig::default(),
            vec![FakeProbe::ok(
                HintKey::Cuda,
                DeviceKind::GpuVendorA,
                vec![gpu("cuda:0", 8)],
            )],
        )
        .with_host_memory(host());
        assert_eq!(detector.detect(), detector.detect());
    }

    #[test]
    fn test_real_host_always_has_cpu() {
        let devices = detect(&DetectorConfig::default());
        assert_eq!(devices.last().map(|d| d.kind), Some(DeviceKind::Cpu));
    }
}
