// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Host memory readings.
//!
//! On Linux the kernel's own `MemAvailable` estimate from `/proc/meminfo`
//! is used. Elsewhere (or if procfs is unreadable) the reading falls back
//! to `sysinfo`.

use crate::ProbeError;
use std::path::Path;

const MEMINFO_PATH: &str = "/proc/meminfo";

/// Host memory state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct SystemMemory {
    /// Total physical memory in bytes.
    pub total_bytes: u64,
    /// Memory a new allocation can use without swapping, in bytes.
    pub available_bytes: u64,
}

impl SystemMemory {
    /// Reads host memory, preferring procfs and falling back to `sysinfo`.
    pub fn read() -> Self {
        match Self::read_from(Path::new(MEMINFO_PATH)) {
            Ok(mem) => mem,
            Err(e) => {
                tracing::debug!(error = %e, "procfs meminfo unavailable, using sysinfo");
                Self::from_sysinfo()
            }
        }
    }

    /// Reads memory information from a `/proc/meminfo`-formatted file.
    pub(crate) fn read_from(path: &Path) -> Result<Self, ProbeError> {
        let content = std::fs::read_to_string(path).map_err(|e| ProbeError::ReadError {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::parse_meminfo(&content)
    }

    pub(crate) fn parse_meminfo(content: &str) -> Result<Self, ProbeError> {
        let mut total_kb: Option<u64> = None;
        let mut available_kb: Option<u64> = None;

        for line in content.lines() {
            let mut parts = line.split_whitespace();
            let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
                continue;
            };
            let slot = match key {
                "MemTotal:" => &mut total_kb,
                "MemAvailable:" => &mut available_kb,
                _ => continue,
            };
            *slot = Some(value.parse::<u64>().map_err(|_| ProbeError::ParseError {
                source_name: MEMINFO_PATH.to_string(),
                detail: format!("expected integer kB value for {key}, got '{value}'"),
            })?);

            if total_kb.is_some() && available_kb.is_some() {
                break;
            }
        }

        let missing = |field: &str| ProbeError::ParseError {
            source_name: MEMINFO_PATH.to_string(),
            detail: format!("{field} not found"),
        };
        let total_kb = total_kb.ok_or_else(|| missing("MemTotal"))?;
        let available_kb = available_kb.ok_or_else(|| missing("MemAvailable"))?;

        Ok(Self {
            total_bytes: total_kb * 1024,
            available_bytes: available_kb * 1024,
        })
    }

    fn from_sysinfo() -> Self {
        let mut sys = sysinfo::System::new();
        sys.refresh_memory();
        Self {
            total_bytes: sys.total_memory(),
            available_bytes: sys.available_memory(),
        }
    }
}
