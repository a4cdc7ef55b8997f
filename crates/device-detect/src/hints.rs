// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Operator hints that force-enable or force-disable accelerator kinds.
//!
//! Hints come from the `[devices]` config section and from environment
//! variables (`USE_CUDA`, `USE_ROCM`, `USE_MPS`, `USE_INTEL_NPU`,
//! `USE_AMD_NPU`, `FORCE_CPU`). Environment values win over file values.
//!
//! # Semantics
//! - [`Hint::Disable`] is authoritative: the probe is never run.
//! - [`Hint::Enable`] on an NPU raises it above discrete GPUs. The probe
//!   still has to succeed; an enabled-but-missing device is omitted.
//! - [`Hint::Auto`] probes and places the device in its default slot.
//! - `force_cpu` disables every accelerator.

use device_memory::ByteSize;
use std::fmt;

/// Tri-state accelerator hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Hint {
    /// Probe and rank normally.
    #[default]
    Auto,
    /// Probe and, for NPUs, raise priority.
    Enable,
    /// Never probe.
    Disable,
}

impl Hint {
    /// Parses an environment-style flag.
    ///
    /// `1/true/yes/on` enable, `0/false/no/off` disable, `auto` or an empty
    /// string leave detection automatic. Anything else is `None`.
    pub fn parse_flag(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(Hint::Enable),
            "0" | "false" | "no" | "off" => Some(Hint::Disable),
            "" | "auto" => Some(Hint::Auto),
            _ => None,
        }
    }
}

impl fmt::Display for Hint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Hint::Auto => "auto",
            Hint::Enable => "enable",
            Hint::Disable => "disable",
        })
    }
}

impl serde::Serialize for Hint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Hint {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(serde::Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bool(bool),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Bool(true) => Ok(Hint::Enable),
            Raw::Bool(false) => Ok(Hint::Disable),
            Raw::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "enable" | "enabled" => Ok(Hint::Enable),
                "disable" | "disabled" => Ok(Hint::Disable),
                other => Hint::parse_flag(other).ok_or_else(|| {
                    serde::de::Error::custom(format!(
                        "invalid accelerator hint '{s}' (expected auto, enable, disable or a boolean)"
                    ))
                }),
            },
        }
    }
}

/// Which hint governs a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HintKey {
    Cuda,
    Rocm,
    Mps,
    IntelNpu,
    AmdNpu,
}

impl HintKey {
    /// Every key, in the order probes run.
    pub const ALL: [HintKey; 5] = [
        HintKey::Cuda,
        HintKey::Rocm,
        HintKey::Mps,
        HintKey::IntelNpu,
        HintKey::AmdNpu,
    ];

    /// Environment variable carrying this hint.
    pub fn env_var(&self) -> &'static str {
        match self {
            HintKey::Cuda => "USE_CUDA",
            HintKey::Rocm => "USE_ROCM",
            HintKey::Mps => "USE_MPS",
            HintKey::IntelNpu => "USE_INTEL_NPU",
            HintKey::AmdNpu => "USE_AMD_NPU",
        }
    }
}

/// Environment variable that disables every accelerator.
pub const FORCE_CPU_ENV: &str = "FORCE_CPU";

/// Per-kind accelerator hints.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AcceleratorHints {
    pub cuda: Hint,
    pub rocm: Hint,
    pub mps: Hint,
    pub intel_npu: Hint,
    pub amd_npu: Hint,
    /// Disables every accelerator when set.
    pub force_cpu: bool,
}

impl AcceleratorHints {
    /// Effective hint for a probe, taking `force_cpu` into account.
    pub fn get(&self, key: HintKey) -> Hint {
        if self.force_cpu {
            return Hint::Disable;
        }
        self.raw(key)
    }

    /// Sets the hint for one key.
    pub fn set(&mut self, key: HintKey, hint: Hint) {
        match key {
            HintKey::Cuda => self.cuda = hint,
            HintKey::Rocm => self.rocm = hint,
            HintKey::Mps => self.mps = hint,
            HintKey::IntelNpu => self.intel_npu = hint,
            HintKey::AmdNpu => self.amd_npu = hint,
        }
    }

    fn raw(&self, key: HintKey) -> Hint {
        match key {
            HintKey::Cuda => self.cuda,
            HintKey::Rocm => self.rocm,
            HintKey::Mps => self.mps,
            HintKey::IntelNpu => self.intel_npu,
            HintKey::AmdNpu => self.amd_npu,
        }
    }

    /// Applies environment overrides through `lookup`.
    ///
    /// `lookup` is normally `|k| std::env::var(k).ok()`; tests pass a map.
    /// Unrecognised values are logged and ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for key in HintKey::ALL {
            let Some(value) = lookup(key.env_var()) else {
                continue;
            };
            match Hint::parse_flag(&value) {
                Some(hint) => self.set(key, hint),
                None => tracing::warn!(var = key.env_var(), value = %value, "ignoring unrecognised accelerator hint"),
            }
        }

        if let Some(value) = lookup(FORCE_CPU_ENV) {
            match Hint::parse_flag(&value) {
                Some(Hint::Enable) => self.force_cpu = true,
                Some(Hint::Disable) => self.force_cpu = false,
                Some(Hint::Auto) => {}
                None => tracing::warn!(var = FORCE_CPU_ENV, value = %value, "ignoring unrecognised flag"),
            }
        }
    }
}

/// Detection settings: hints plus budget tuning.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    #[serde(flatten)]
    pub hints: AcceleratorHints,
    /// Overrides the CPU budget (default: available system memory).
    pub cpu_budget: Option<ByteSize>,
    /// Share of system memory a unified-memory accelerator may use.
    pub unified_memory_fraction: f64,
    /// Share of available system memory an NPU may use.
    pub npu_memory_fraction: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            hints: AcceleratorHints::default(),
            cpu_budget: None,
            unified_memory_fraction: 0.75,
            npu_memory_fraction: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(Hint::parse_flag("1"), Some(Hint::Enable));
        assert_eq!(Hint::parse_flag("YES"), Some(Hint::Enable));
        assert_eq!(Hint::parse_flag("false"), Some(Hint::Disable));
        assert_eq!(Hint::parse_flag(" auto "), Some(Hint::Auto));
        assert_eq!(Hint::parse_flag("maybe"), None);
    }

    #[test]
    fn test_env_overrides() {
        let mut hints = AcceleratorHints::default();
        hints.apply_env(lookup(&[("USE_INTEL_NPU", "1"), ("USE_CUDA", "0"), ("USE_MPS", "bogus")]));
        assert_eq!(hints.get(HintKey::IntelNpu), Hint::Enable);
        assert_eq!(hints.get(HintKey::Cuda), Hint::Disable);
        assert_eq!(hints.get(HintKey::Mps), Hint::Auto);
        assert_eq!(hints.get(HintKey::AmdNpu), Hint::Auto);
    }

    #[test]
    fn test_force_cpu_disables_everything() {
        let mut hints = AcceleratorHints::default();
        hints.apply_env(lookup(&[("USE_INTEL_NPU", "true"), ("FORCE_CPU", "1")]));
        for key in HintKey::ALL {
            assert_eq!(hints.get(key), Hint::Disable);
        }
    }

    #[test]
    fn test_deserialize_hints() {
        let cfg: DetectorConfig = toml::from_str(
            r#"
            cuda = false
            intel_npu = "enable"
            rocm = "auto"
            cpu_budget = "4G"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.hints.cuda, Hint::Disable);
        assert_eq!(cfg.hints.intel_npu, Hint::Enable);
        assert_eq!(cfg.hints.rocm, Hint::Auto);
        assert_eq!(cfg.cpu_budget, Some(ByteSize::from_gb(4)));
        assert!((cfg.unified_memory_fraction - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_deserialize_rejects_garbage() {
        let res: Result<DetectorConfig, _> = toml::from_str("cuda = \"sometimes\"");
        assert!(res.is_err());
    }
}
