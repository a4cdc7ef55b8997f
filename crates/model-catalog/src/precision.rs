// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Weight precision.

use std::fmt;

/// Numeric precision weights are held in once loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    F32,
    F16,
    Bf16,
    Int8,
}

impl Precision {
    /// Bytes per parameter.
    pub const fn bytes_per_param(&self) -> u32 {
        match self {
            Precision::F32 => 4,
            Precision::F16 | Precision::Bf16 => 2,
            Precision::Int8 => 1,
        }
    }

    /// Half precision when an accelerator will run the model, full
    /// precision on CPU-only hosts.
    pub const fn for_host(has_accelerator: bool) -> Self {
        if has_accelerator {
            Precision::F16
        } else {
            Precision::F32
        }
    }

    /// Parses a `torch_dtype` / dtype string as found in `config.json`.
    pub fn from_dtype_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "float32" | "f32" | "fp32" => Some(Precision::F32),
            "float16" | "f16" | "fp16" | "half" => Some(Precision::F16),
            "bfloat16" | "bf16" => Some(Precision::Bf16),
            "int8" | "i8" => Some(Precision::Int8),
            _ => None,
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Precision::F32 => "f32",
            Precision::F16 => "f16",
            Precision::Bf16 => "bf16",
            Precision::Int8 => "int8",
        })
    }
}
