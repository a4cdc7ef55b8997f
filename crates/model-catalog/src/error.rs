// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for model resolution.

/// Errors that can occur when resolving a model identifier to a [`ModelSpec`](crate::ModelSpec).
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// A file in the model directory could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// `config.json` is malformed.
    #[error("failed to parse {path}: {source}")]
    ConfigParse {
        path: String,
        source: serde_json::Error,
    },

    /// `config.json` lacks a field needed to size the model.
    #[error("{path} has no {field}")]
    MissingField { path: String, field: String },

    /// A SafeTensors shard could not be parsed.
    #[error("failed to load SafeTensors {path}: {detail}")]
    SafeTensors { path: String, detail: String },

    /// The model's footprint is inconsistent (zero layers, zero weights, ...).
    #[error("invalid model '{identifier}': {detail}")]
    InvalidSpec { identifier: String, detail: String },

    /// The identifier is neither declared nor a readable model directory.
    #[error("model '{identifier}' not found (checked declared models and {searched})")]
    NotFound { identifier: String, searched: String },
}
