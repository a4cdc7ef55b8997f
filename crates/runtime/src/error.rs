// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the inference runtime.

use device_memory::MemoryError;
use distribution_planner::LayerRange;
use std::time::Duration;

/// Errors from materializing a model onto its devices.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadFailure {
    /// A device assigned by the plan could not hold its layer range.
    #[error("out of memory loading layers {layers} onto {device}: {source}")]
    OutOfMemory {
        device: String,
        layers: LayerRange,
        #[source]
        source: MemoryError,
    },

    /// Weight files are missing, unreadable or malformed.
    #[error("weights unavailable for '{identifier}': {detail}")]
    WeightsUnavailable { identifier: String, detail: String },
}

/// Errors from executing one inference request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InferError {
    /// Scratch memory could not be reserved during execution.
    #[error("out of memory during execution on {device}: {source}")]
    OutOfMemory {
        device: String,
        #[source]
        source: MemoryError,
    },

    /// Generation did not finish before the deadline.
    #[error("inference timed out after {deadline:?}")]
    Timeout { deadline: Duration },

    /// The request cannot be served as given.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The backend lost a device mid-execution.
    #[error("device {device} lost: {detail}")]
    DeviceLost { device: String, detail: String },
}

impl InferError {
    /// Returns `true` for failures the supervisor answers with a forced
    /// downgrade and a single retry.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, InferError::OutOfMemory { .. } | InferError::DeviceLost { .. })
    }

    /// The device that failed, for device-level failures.
    pub fn device(&self) -> Option<&str> {
        match self {
            InferError::OutOfMemory { device, .. } | InferError::DeviceLost { device, .. } => Some(device),
            InferError::Timeout { .. } | InferError::InvalidRequest(_) => None,
        }
    }
}

/// Errors surfaced to callers of the serving context.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Loading failed and was not recovered.
    #[error("load failed: {0}")]
    Load(#[from] LoadFailure),

    /// Inference failed and was not recovered.
    #[error("inference failed: {0}")]
    Infer(#[from] InferError),

    /// Every tier down to CPU-only failed to load; the identifier stays
    /// unavailable until devices are re-detected.
    #[error("no loadable plan for '{identifier}': {detail}")]
    PlanExhausted { identifier: String, detail: String },

    /// The model identifier could not be resolved.
    #[error("catalog error: {0}")]
    Catalog(#[from] model_catalog::CatalogError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}
