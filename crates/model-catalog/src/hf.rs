// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Footprint resolution from a Hugging Face-style model directory.
//!
//! The directory must contain a `config.json`; weights are any
//! `*.safetensors` shards next to it. Only SafeTensors *headers* are read
//! (through a memory map), so sizing a 70B model costs a few kilobytes of
//! I/O.
//!
//! # Parameter count
//! - With shards: the sum of element counts over every tensor.
//! - Without shards: the usual decoder estimate
//!   `12 · layers · hidden² + vocab · hidden`.

use crate::{CatalogError, ModelSpec, Precision, ResolvedModel, WeightSource};
use std::path::{Path, PathBuf};

/// Architecture config filename.
pub const CONFIG_FILE: &str = "config.json";

/// Fields of `config.json` that size the model. Unknown fields are ignored.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct HfConfig {
    #[serde(alias = "n_layer", alias = "num_layers")]
    pub num_hidden_layers: Option<u32>,
    #[serde(alias = "n_embd", alias = "d_model")]
    pub hidden_size: Option<u32>,
    pub vocab_size: Option<u64>,
    pub torch_dtype: Option<String>,
}

impl HfConfig {
    /// Reads `config.json` from a file path.
    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path).map_err(|e| CatalogError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(|e| CatalogError::ConfigParse {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Stored precision, if the config declares a recognised one.
    pub fn stored_precision(&self) -> Option<Precision> {
        self.torch_dtype.as_deref().and_then(Precision::from_dtype_str)
    }
}

/// Totals read from SafeTensors headers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TensorTotals {
    pub tensors: usize,
    pub parameters: u64,
    pub data_bytes: u64,
}

impl std::ops::AddAssign for TensorTotals {
    fn add_assign(&mut self, rhs: Self) {
        self.tensors += rhs.tensors;
        self.parameters += rhs.parameters;
        self.data_bytes += rhs.data_bytes;
    }
}

/// Reads tensor totals from one SafeTensors file.
///
/// Uses memory-mapped I/O; only the header and tensor offsets are touched.
pub fn read_tensor_totals(path: &Path) -> Result<TensorTotals, CatalogError> {
    let file = std::fs::File::open(path).map_err(|e| CatalogError::Io {
        path: path.display().to_string(),
        source: e,
    })?;

    // SAFETY: the file is opened read-only and the map is dropped before
    // returning; concurrent truncation would only surface as a parse error.
    let mmap = unsafe { memmap2::Mmap::map(&file) }.map_err(|e| CatalogError::SafeTensors {
        path: path.display().to_string(),
        detail: format!("mmap failed: {e}"),
    })?;

    let st = safetensors::SafeTensors::deserialize(&mmap).map_err(|e| CatalogError::SafeTensors {
        path: path.display().to_string(),
        detail: e.to_string(),
    })?;

    let mut totals = TensorTotals::default();
    for (_, view) in st.tensors() {
        totals.tensors += 1;
        totals.parameters += view.shape().iter().map(|&d| d as u64).product::<u64>();
        totals.data_bytes += view.data().len() as u64;
    }
    Ok(totals)
}

/// Lists `*.safetensors` files in `dir`, sorted by name.
pub fn find_shards(dir: &Path) -> Result<Vec<PathBuf>, CatalogError> {
    let entries = std::fs::read_dir(dir).map_err(|e| CatalogError::Io {
        path: dir.display().to_string(),
        source: e,
    })?;
    let mut shards: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "safetensors"))
        .collect();
    shards.sort();
    Ok(shards)
}

/// Resolves a model directory to its footprint.
///
/// `precision` overrides the loaded precision; otherwise an int8 checkpoint
/// stays int8 and everything else is loaded at `host_default`.
pub fn resolve_dir(
    identifier: &str,
    dir: &Path,
    precision: Option<Precision>,
    host_default: Precision,
) -> Result<ResolvedModel, CatalogError> {
    let config_path = dir.join(CONFIG_FILE);
    let config = HfConfig::from_file(&config_path)?;

    let layer_count = config
        .num_hidden_layers
        .ok_or_else(|| CatalogError::MissingField {
            path: config_path.display().to_string(),
            field: "num_hidden_layers".to_string(),
        })?;
    let hidden_size = config.hidden_size.unwrap_or(0);

    let shards = find_shards(dir)?;
    let parameters = if shards.is_empty() {
        estimate_parameters(&config).ok_or_else(|| CatalogError::MissingField {
            path: config_path.display().to_string(),
            field: "hidden_size (needed to estimate parameters without weights)".to_string(),
        })?
    } else {
        let mut totals = TensorTotals::default();
        for shard in &shards {
            totals += read_tensor_totals(shard)?;
        }
        tracing::debug!(
            model = identifier,
            shards = shards.len(),
            tensors = totals.tensors,
            parameters = totals.parameters,
            "read SafeTensors headers"
        );
        totals.parameters
    };

    let stored = config.stored_precision();
    let precision = precision
        .or(stored.filter(|p| *p == Precision::Int8))
        .unwrap_or(host_default);

    let spec = ModelSpec::from_parameter_count(identifier, parameters, layer_count, hidden_size, precision);
    spec.validate()?;

    tracing::info!(
        model = identifier,
        dir = %dir.display(),
        stored = ?stored,
        precision = %precision,
        "resolved model: {}",
        spec.summary()
    );

    let weights = if shards.is_empty() {
        WeightSource::Synthetic
    } else {
        WeightSource::SafeTensors(shards)
    };
    Ok(ResolvedModel { spec, weights })
}

/// Decoder-only parameter estimate from architecture fields.
fn estimate_parameters(config: &HfConfig) -> Option<u64> {
    let layers = config.num_hidden_layers? as u64;
    let hidden = config.hidden_size? as u64;
    let vocab = config.vocab_size.unwrap_or(0);
    Some(12 * layers * hidden * hidden + vocab * hidden)
}
