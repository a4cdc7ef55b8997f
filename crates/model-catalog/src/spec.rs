// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Model resource footprint.

use crate::{CatalogError, Precision};
use device_memory::ByteSize;
use std::path::PathBuf;

/// What a model costs to hold, independent of its content.
///
/// Derived once per identifier and cached by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize)]
pub struct ModelSpec {
    /// Model identifier (hub id, directory name, or declared name).
    pub identifier: String,
    /// Estimated number of parameters.
    pub parameter_count_estimate: u64,
    /// Number of transformer layers; the unit of distribution.
    pub layer_count: u32,
    /// Total weight footprint at the loaded precision.
    pub weight_size_bytes: u64,
    /// Hidden dimension, used for activation estimates.
    pub hidden_size: u32,
    /// Bytes per parameter at the loaded precision.
    pub bytes_per_param: u32,
}

impl ModelSpec {
    /// Sizes a model from its parameter count and precision.
    ///
    /// ```
    /// use model_catalog::{ModelSpec, Precision};
    ///
    /// let spec = ModelSpec::from_parameter_count("tiny", 1_000_000_000, 22, 2048, Precision::F16);
    /// assert_eq!(spec.weight_size_bytes, 2_000_000_000);
    /// ```
    pub fn from_parameter_count(
        identifier: impl Into<String>,
        parameters: u64,
        layer_count: u32,
        hidden_size: u32,
        precision: Precision,
    ) -> Self {
        let bytes_per_param = precision.bytes_per_param();
        Self {
            identifier: identifier.into(),
            parameter_count_estimate: parameters,
            layer_count,
            weight_size_bytes: parameters.saturating_mul(bytes_per_param as u64),
            hidden_size,
            bytes_per_param,
        }
    }

    /// Sizes a model directly from a weight footprint.
    pub fn from_weight_size(
        identifier: impl Into<String>,
        weight_size: ByteSize,
        layer_count: u32,
        hidden_size: u32,
        precision: Precision,
    ) -> Self {
        let bytes_per_param = precision.bytes_per_param();
        Self {
            identifier: identifier.into(),
            parameter_count_estimate: weight_size.as_bytes() / bytes_per_param as u64,
            layer_count,
            weight_size_bytes: weight_size.as_bytes(),
            hidden_size,
            bytes_per_param,
        }
    }

    /// Checks that the footprint can be distributed.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let invalid = |detail: &str| CatalogError::InvalidSpec {
            identifier: self.identifier.clone(),
            detail: detail.to_string(),
        };
        if self.layer_count == 0 {
            return Err(invalid("layer_count must be at least 1"));
        }
        if self.weight_size_bytes == 0 {
            return Err(invalid("weight size is zero"));
        }
        if self.bytes_per_param == 0 {
            return Err(invalid("bytes_per_param is zero"));
        }
        Ok(())
    }

    /// Weight footprint.
    pub fn weight_size(&self) -> ByteSize {
        ByteSize::from_bytes(self.weight_size_bytes)
    }

    /// Bytes one layer needs, rounded up so that `layer_count` layers
    /// never undercount the total.
    pub fn per_layer_bytes(&self) -> u64 {
        self.weight_size_bytes.div_ceil(self.layer_count.max(1) as u64)
    }

    /// Exact weight bytes for layers `[start, end)`.
    ///
    /// Splits the total proportionally, so the ranges of any plan sum to
    /// exactly `weight_size_bytes`.
    pub fn bytes_for_layers(&self, start: u32, end: u32) -> u64 {
        let layers = self.layer_count.max(1) as u128;
        let weight = self.weight_size_bytes as u128;
        let offset = |layer: u32| (weight * layer.min(self.layer_count) as u128 / layers) as u64;
        offset(end).saturating_sub(offset(start))
    }

    /// Scratch bytes one layer pass needs for `tokens` activations.
    pub fn activation_bytes(&self, tokens: u32) -> u64 {
        (tokens.max(1) as u64)
            .saturating_mul(self.hidden_size.max(1) as u64)
            .saturating_mul(self.bytes_per_param as u64)
    }

    /// Returns a one-line summary.
    pub fn summary(&self) -> String {
        format!(
            "{}: {:.2}B params, {} layers, {} weights ({} B/param)",
            self.identifier,
            self.parameter_count_estimate as f64 / 1e9,
            self.layer_count,
            self.weight_size(),
            self.bytes_per_param,
        )
    }
}

/// Where a model's weights come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeightSource {
    /// SafeTensors shards on disk.
    SafeTensors(Vec<PathBuf>),
    /// No weight files; the footprint is declared only.
    Synthetic,
}

/// A model identifier resolved to its footprint and weights.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModel {
    pub spec: ModelSpec,
    pub weights: WeightSource,
}
