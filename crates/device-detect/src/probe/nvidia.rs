// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! CUDA GPUs via `nvidia-smi`.

use super::DeviceProbe;
use crate::{DeviceKind, DeviceProfile, HintKey, ProbeError, SystemMemory};
use device_memory::ByteSize;
use std::process::Command;

const QUERY_ARGS: [&str; 2] = [
    "--query-gpu=index,name,memory.free,memory.total",
    "--format=csv,noheader,nounits",
];

/// Lists CUDA devices with their free memory as the budget.
#[derive(Debug, Clone)]
pub struct NvidiaSmiProbe {
    program: String,
}

impl NvidiaSmiProbe {
    pub fn new() -> Self {
        Self::with_program("nvidia-smi")
    }

    /// Uses a different executable (e.g. an absolute path).
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Parses `index, name, free MiB, total MiB` lines.
    pub(crate) fn parse(output: &str) -> Result<Vec<DeviceProfile>, ProbeError> {
        let mut devices = Vec::new();
        for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let bad = |detail: &str| ProbeError::ParseError {
                source_name: "nvidia-smi".to_string(),
                detail: format!("{detail} in line '{line}'"),
            };

            // The name may itself contain commas, so peel fields off both ends.
            let (index, rest) = line.split_once(',').ok_or_else(|| bad("missing fields"))?;
            let mut tail = rest.rsplitn(3, ',');
            let total = tail.next().ok_or_else(|| bad("missing total"))?;
            let free = tail.next().ok_or_else(|| bad("missing free"))?;
            let name = tail.next().ok_or_else(|| bad("missing name"))?;

            let index: u32 = index.trim().parse().map_err(|_| bad("bad index"))?;
            let free_mb: u64 = free.trim().parse().map_err(|_| bad("bad free memory"))?;
            let total_mb: u64 = total.trim().parse().map_err(|_| bad("bad total memory"))?;

            devices.push(
                DeviceProfile::new(
                    format!("cuda:{index}"),
                    name.trim(),
                    DeviceKind::GpuVendorA,
                    ByteSize::from_mb(free_mb),
                )
                .with_total_memory(ByteSize::from_mb(total_mb)),
            );
        }
        Ok(devices)
    }
}

impl Default for NvidiaSmiProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceProbe for NvidiaSmiProbe {
    fn hint_key(&self) -> HintKey {
        HintKey::Cuda
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::GpuVendorA
    }

    fn probe(&self, _host: &SystemMemory) -> Result<Vec<DeviceProfile>, ProbeError> {
        let output = Command::new(&self.program)
            .args(QUERY_ARGS)
            .output()
            .map_err(|e| ProbeError::CommandFailed {
                command: self.program.clone(),
                detail: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(ProbeError::CommandFailed {
                command: self.program.clone(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Self::parse(&String::from_utf8_lossy(&output.stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_two_gpus() {
        let out = "0, NVIDIA GeForce RTX 3060, 11000, 12288\n1, Tesla T4, 15000, 15360\n";
        let devices = NvidiaSmiProbe::parse(out).unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].id, "cuda:0");
        assert_eq!(devices[0].name, "NVIDIA GeForce RTX 3060");
        assert_eq!(devices[0].memory_budget_bytes, 11000 * 1024 * 1024);
        assert_eq!(devices[0].total_memory_bytes, Some(12288 * 1024 * 1024));
        assert_eq!(devices[1].id, "cuda:1");
    }

    #[test]
    fn test_parse_name_with_comma() {
        let devices = NvidiaSmiProbe::parse("0, Quadro, Special Edition, 100, 200").unwrap();
        assert_eq!(devices[0].name, "Quadro, Special Edition");
        assert_eq!(devices[0].memory_budget_bytes, 100 * 1024 * 1024);
    }

    #[test]
    fn test_parse_empty() {
        assert!(NvidiaSmiProbe::parse("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_garbage() {
        assert!(NvidiaSmiProbe::parse("0, gpu, [N/A], 100").is_err());
        assert!(NvidiaSmiProbe::parse("no commas here").is_err());
    }

    #[test]
    fn test_missing_binary_is_probe_error() {
        let probe = NvidiaSmiProbe::with_program("/nonexistent/nvidia-smi-adaptive-rt");
        let host = SystemMemory {
            total_bytes: 0,
            available_bytes: 0,
        };
        assert!(matches!(
            probe.probe(&host),
            Err(ProbeError::CommandFailed { .. })
        ));
    }
}
