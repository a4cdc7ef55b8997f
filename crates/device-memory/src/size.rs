// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Byte counts with human-readable parsing.
//!
//! Device budgets are reported in wildly different units (MiB from
//! `nvidia-smi`, bytes from sysfs, kB from `/proc/meminfo`), and config
//! files want `"8G"`. [`ByteSize`] normalises all of them to bytes.

use crate::MemoryError;
use std::fmt;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;

/// A byte count.
///
/// # Parsing
/// Binary suffixes, case-insensitive, optional whitespace:
/// - `"512M"` / `"512MB"` / `"512 MiB"` → 512 × 1024² bytes
/// - `"8G"` / `"8GB"` → 8 × 1024³ bytes
/// - `"2048K"` / `"2048KB"` → 2048 × 1024 bytes
/// - `"1073741824"` → raw byte count
///
/// # Examples
/// ```
/// use device_memory::ByteSize;
///
/// assert_eq!(ByteSize::parse("8G").unwrap(), ByteSize::from_gb(8));
/// assert_eq!(ByteSize::from_mb(1536).to_string(), "1.50 GB");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ByteSize(u64);

impl ByteSize {
    /// Zero bytes.
    pub const ZERO: ByteSize = ByteSize(0);

    /// Creates a size from a byte count.
    pub const fn from_bytes(bytes: u64) -> Self {
        Self(bytes)
    }

    /// Creates a size from kibibytes.
    pub const fn from_kb(kb: u64) -> Self {
        Self(kb * KIB)
    }

    /// Creates a size from mebibytes.
    pub const fn from_mb(mb: u64) -> Self {
        Self(mb * MIB)
    }

    /// Creates a size from gibibytes.
    pub const fn from_gb(gb: u64) -> Self {
        Self(gb * GIB)
    }

    /// Returns the size in bytes.
    pub const fn as_bytes(&self) -> u64 {
        self.0
    }

    /// Returns the size in mebibytes (truncated).
    pub const fn as_mb(&self) -> u64 {
        self.0 / MIB
    }

    /// Returns the size in gibibytes as a float, for display.
    pub fn as_gb_f64(&self) -> f64 {
        self.0 as f64 / GIB as f64
    }

    /// Scales the size by a fraction in `[0.0, 1.0]`, rounding down.
    pub fn scaled(&self, fraction: f64) -> Self {
        let fraction = fraction.clamp(0.0, 1.0);
        Self((self.0 as f64 * fraction) as u64)
    }

    /// Parses a human-readable size string.
    pub fn parse(s: &str) -> Result<Self, MemoryError> {
        let trimmed = s.trim();
        let invalid = |detail: &str| MemoryError::InvalidSize {
            input: s.to_string(),
            detail: detail.to_string(),
        };

        if trimmed.is_empty() {
            return Err(invalid("empty string"));
        }

        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        let (digits, suffix) = trimmed.split_at(split);

        if digits.is_empty() {
            return Err(invalid("expected a number followed by an optional K/M/G suffix"));
        }

        let multiplier = match suffix.trim().to_ascii_uppercase().as_str() {
            "" | "B" => 1,
            "K" | "KB" | "KIB" => KIB,
            "M" | "MB" | "MIB" => MIB,
            "G" | "GB" | "GIB" => GIB,
            "T" | "TB" | "TIB" => GIB * 1024,
            other => return Err(invalid(&format!("unknown suffix '{other}'"))),
        };

        let value: u64 = digits.parse().map_err(|_| invalid("number out of range"))?;
        value
            .checked_mul(multiplier)
            .map(Self)
            .ok_or_else(|| invalid("overflow"))
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        if b >= GIB {
            write!(f, "{:.2} GB", b as f64 / GIB as f64)
        } else if b >= MIB {
            write!(f, "{:.1} MB", b as f64 / MIB as f64)
        } else if b >= KIB {
            write!(f, "{:.1} KB", b as f64 / KIB as f64)
        } else {
            write!(f, "{b} B")
        }
    }
}

impl From<u64> for ByteSize {
    fn from(bytes: u64) -> Self {
        Self(bytes)
    }
}

impl serde::Serialize for ByteSize {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> serde::Deserialize<'de> for ByteSize {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(serde::Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bytes(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Bytes(b) => Ok(Self(b)),
            Raw::Text(s) => Self::parse(&s).map_err(serde::de::Error::custom),
        }
    }
}
