// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Runtime configuration loaded from TOML files or constructed programmatically.
//!
//! # TOML Format
//! ```toml
//! models_dir = "./models"
//! default_model = "TinyLlama/TinyLlama-1.1B-Chat-v1.0"
//! allow_synthetic_weights = true
//!
//! [[models]]
//! identifier = "demo-7b"
//! layers = 32
//! parameters = 7000000000
//! hidden_size = 4096
//!
//! [planner]
//! pipeline_min_fraction = 0.5
//! activation_reserve_tokens = 1024
//!
//! [engine]
//! max_context_tokens = 1024
//! default_max_tokens = 128
//! accelerator_layer_latency_us = 20
//! cpu_layer_latency_us = 200
//!
//! [devices]
//! cuda = "auto"
//! intel_npu = "disable"
//! cpu_budget = "16G"
//! ```
//!
//! # Environment
//! [`RuntimeConfig::apply_env`] layers the process environment over file
//! values: `MODEL_PATH` replaces `default_model`, `USE_CUDA`, `USE_ROCM`,
//! `USE_MPS`, `USE_INTEL_NPU`, `USE_AMD_NPU` set accelerator hints and
//! `FORCE_CPU` disables every accelerator.

use device_detect::DetectorConfig;
use distribution_planner::PlannerConfig;
use model_catalog::{ModelCatalog, ModelEntry};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the default model identifier.
pub const MODEL_PATH_ENV: &str = "MODEL_PATH";

/// Configuration for the inference runtime.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Directory searched for model identifiers that are not declared.
    pub models_dir: Option<PathBuf>,
    /// Model served when a request names none.
    pub default_model: Option<String>,
    /// Whether declared models without weight files may be served by the
    /// synthetic backend.
    pub allow_synthetic_weights: bool,
    /// Declared catalog entries.
    pub models: Vec<ModelEntry>,
    /// Planner tuning.
    pub planner: PlannerConfig,
    /// Execution settings.
    pub engine: EngineConfig,
    /// Accelerator hints and budget overrides.
    pub devices: DetectorConfig,
}

impl RuntimeConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, super::RuntimeError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            super::RuntimeError::ConfigError(format!(
                "cannot read config '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, super::RuntimeError> {
        toml::from_str(toml_str).map_err(|e| {
            super::RuntimeError::ConfigError(format!("TOML parse error: {e}"))
        })
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, super::RuntimeError> {
        toml::to_string_pretty(self).map_err(|e| {
            super::RuntimeError::ConfigError(format!("TOML serialise error: {e}"))
        })
    }

    /// Applies environment overrides through `lookup`.
    ///
    /// `lookup` is normally `|k| std::env::var(k).ok()`; tests pass a map.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup(MODEL_PATH_ENV).filter(|m| !m.trim().is_empty()) {
            tracing::debug!(model = %model, "default model overridden from environment");
            self.default_model = Some(model.trim().to_string());
        }
        self.devices.hints.apply_env(&lookup);
    }

    /// Applies overrides from the process environment.
    ///
    /// This is a convenience wrapper around [`RuntimeConfig::apply_env()`].
    pub fn with_process_env(mut self) -> Self {
        self.apply_env(|key| std::env::var(key).ok());
        self
    }

    /// Planner settings for this runtime.
    ///
    /// The activation reserve never drops below the engine's context
    /// limit, the most one forward pass can reserve on a stage.
    pub fn planner_config(&self) -> PlannerConfig {
        PlannerConfig {
            activation_reserve_tokens: self
                .planner
                .activation_reserve_tokens
                .max(self.engine.max_context_tokens),
            ..self.planner.clone()
        }
    }

    /// Builds the model catalog described by this config.
    pub fn catalog(&self) -> ModelCatalog {
        ModelCatalog::new(self.models_dir.clone(), self.models.clone())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            models_dir: Some(PathBuf::from("./models")),
            default_model: None,
            allow_synthetic_weights: true,
            models: Vec::new(),
            planner: PlannerConfig::default(),
            engine: EngineConfig::default(),
            devices: DetectorConfig::default(),
        }
    }
}

/// Execution settings for the inference engine.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on prompt plus generated tokens; longer prompts are
    /// truncated.
    pub max_context_tokens: u32,
    /// Generation length when a request does not give one.
    pub default_max_tokens: u32,
    /// Simulated cost of one layer pass on an accelerator, in microseconds.
    pub accelerator_layer_latency_us: u64,
    /// Simulated cost of one layer pass on the CPU, in microseconds.
    pub cpu_layer_latency_us: u64,
    /// Deadline applied when a request does not give one.
    pub default_deadline_ms: Option<u64>,
}

impl EngineConfig {
    pub fn accelerator_layer_latency(&self) -> Duration {
        Duration::from_micros(self.accelerator_layer_latency_us)
    }

    pub fn cpu_layer_latency(&self) -> Duration {
        Duration::from_micros(self.cpu_layer_latency_us)
    }

    pub fn default_deadline(&self) -> Option<Duration> {
        self.default_deadline_ms.map(Duration::from_millis)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: 1024,
            default_max_tokens: 128,
            accelerator_layer_latency_us: 20,
            cpu_layer_latency_us: 200,
            default_deadline_ms: None,
        }
    }
}
