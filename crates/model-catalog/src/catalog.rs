// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Identifier → footprint resolution.
//!
//! # Lookup order
//! 1. A declared [`ModelEntry`] with that identifier.
//! 2. The identifier as a path to a model directory.
//! 3. `models_dir/<identifier>`, with `/` in hub ids also tried as `--`.

use crate::hf::{resolve_dir, CONFIG_FILE};
use crate::{CatalogError, ModelSpec, Precision, ResolvedModel, WeightSource};
use device_memory::ByteSize;
use std::path::{Path, PathBuf};

/// A model declared in configuration.
///
/// Either `path` points at a model directory, or the footprint is given
/// directly (`layers` plus `parameters` or `weight_size`), in which case
/// the model has no weight files.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ModelEntry {
    pub identifier: String,
    pub path: Option<PathBuf>,
    pub parameters: Option<u64>,
    pub layers: Option<u32>,
    pub hidden_size: Option<u32>,
    pub weight_size: Option<ByteSize>,
    pub precision: Option<Precision>,
}

impl ModelEntry {
    fn resolve(&self, host_default: Precision) -> Result<ResolvedModel, CatalogError> {
        if let Some(path) = &self.path {
            return resolve_dir(&self.identifier, path, self.precision, host_default);
        }

        let missing = |detail: &str| CatalogError::InvalidSpec {
            identifier: self.identifier.clone(),
            detail: detail.to_string(),
        };
        let layers = self.layers.ok_or_else(|| missing("declared model needs `layers`"))?;
        let hidden = self.hidden_size.unwrap_or(0);
        let precision = self.precision.unwrap_or(host_default);

        let spec = match (self.weight_size, self.parameters) {
            (Some(size), _) => ModelSpec::from_weight_size(&self.identifier, size, layers, hidden, precision),
            (None, Some(params)) => ModelSpec::from_parameter_count(&self.identifier, params, layers, hidden, precision),
            (None, None) => return Err(missing("declared model needs `parameters` or `weight_size`")),
        };
        spec.validate()?;

        Ok(ResolvedModel {
            spec,
            weights: WeightSource::Synthetic,
        })
    }
}

/// Resolves model identifiers to [`ResolvedModel`]s.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    models_dir: Option<PathBuf>,
    entries: Vec<ModelEntry>,
}

impl ModelCatalog {
    pub fn new(models_dir: Option<PathBuf>, entries: Vec<ModelEntry>) -> Self {
        Self { models_dir, entries }
    }

    /// Declared entries.
    pub fn entries(&self) -> &[ModelEntry] {
        &self.entries
    }

    /// Resolves `identifier`, loading at `host_default` precision unless
    /// the entry or checkpoint says otherwise.
    pub fn resolve(&self, identifier: &str, host_default: Precision) -> Result<ResolvedModel, CatalogError> {
        if let Some(entry) = self.entries.iter().find(|e| e.identifier == identifier) {
            tracing::debug!(model = identifier, "resolving declared model");
            return entry.resolve(host_default);
        }

        let candidates = self.candidate_dirs(identifier);
        for dir in &candidates {
            if dir.join(CONFIG_FILE).is_file() {
                return resolve_dir(identifier, dir, None, host_default);
            }
        }

        Err(CatalogError::NotFound {
            identifier: identifier.to_string(),
            searched: candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }

    fn candidate_dirs(&self, identifier: &str) -> Vec<PathBuf> {
        let mut dirs = vec![PathBuf::from(identifier)];
        if let Some(root) = &self.models_dir {
            dirs.push(root.join(identifier));
            if identifier.contains('/') {
                dirs.push(root.join(identifier.replace('/', "--")));
            }
        }
        dirs
    }
}

/// Returns `true` if `path` looks like a model directory.
pub fn is_model_dir(path: &Path) -> bool {
    path.join(CONFIG_FILE).is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hf::tests::{fresh_dir, write_safetensors};

    fn declared(id: &str) -> ModelEntry {
        ModelEntry {
            identifier: id.to_string(),
            layers: Some(32),
            weight_size: Some(ByteSize::from_gb(6)),
            hidden_size: Some(4096),
            ..Default::default()
        }
    }

    #[test]
    fn test_declared_entry() {
        let catalog = ModelCatalog::new(None, vec![declared("demo-6g")]);
        let resolved = catalog.resolve("demo-6g", Precision::F16).unwrap();
        assert_eq!(resolved.spec.weight_size(), ByteSize::from_gb(6));
        assert_eq!(resolved.spec.layer_count, 32);
        assert_eq!(resolved.weights, WeightSource::Synthetic);
    }

    #[test]
    fn test_declared_by_parameters() {
        let entry = ModelEntry {
            identifier: "p".to_string(),
            layers: Some(10),
            parameters: Some(1_000),
            ..Default::default()
        };
        let catalog = ModelCatalog::new(None, vec![entry]);
        let fp32 = catalog.resolve("p", Precision::F32).unwrap();
        assert_eq!(fp32.spec.weight_size_bytes, 4_000);
        let fp16 = catalog.resolve("p", Precision::F16).unwrap();
        assert_eq!(fp16.spec.weight_size_bytes, 2_000);
    }

    #[test]
    fn test_declared_entry_incomplete() {
        let entry = ModelEntry {
            identifier: "broken".to_string(),
            layers: Some(4),
            ..Default::default()
        };
        let catalog = ModelCatalog::new(None, vec![entry]);
        assert!(matches!(
            catalog.resolve("broken", Precision::F32),
            Err(CatalogError::InvalidSpec { .. })
        ));
    }

    #[test]
    fn test_models_dir_lookup_with_hub_id() {
        let root = fresh_dir("models_root");
        let model_dir = root.join("org--tiny");
        std::fs::create_dir_all(&model_dir).unwrap();
        std::fs::write(model_dir.join(CONFIG_FILE), r#"{"num_hidden_layers": 2, "hidden_size": 4}"#).unwrap();
        write_safetensors(&model_dir.join("model.safetensors"), &[("w", vec![4, 4])]);

        let catalog = ModelCatalog::new(Some(root.clone()), vec![]);
        let resolved = catalog.resolve("org/tiny", Precision::F32).unwrap();
        assert_eq!(resolved.spec.identifier, "org/tiny");
        assert_eq!(resolved.spec.parameter_count_estimate, 16);
        assert!(is_model_dir(&model_dir));
    }

    #[test]
    fn test_not_found() {
        let catalog = ModelCatalog::new(Some(PathBuf::from("/nonexistent/models")), vec![]);
        let err = catalog.resolve("nope", Precision::F32).unwrap_err();
        match err {
            CatalogError::NotFound { searched, .. } => assert!(searched.contains("/nonexistent/models/nope")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_entries_from_toml() {
        #[derive(serde::Deserialize)]
        struct Cfg {
            models: Vec<ModelEntry>,
        }
        let cfg: Cfg = toml::from_str(
            r#"
            [[models]]
            identifier = "big"
            layers = 80
            weight_size = "40G"
            precision = "f16"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.models[0].weight_size, Some(ByteSize::from_gb(40)));
        assert_eq!(cfg.models[0].precision, Some(Precision::F16));
    }
}
