// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # model-catalog
//!
//! Resolves a model identifier to its resource footprint ([`ModelSpec`]):
//! how many layers it has, how many bytes of weights it needs at the
//! precision it will be loaded in, and where its weights live.
//!
//! # Sources
//! - **Declared entries**: `[[models]]` in the runtime config, either
//!   pointing at a directory or giving the footprint directly.
//! - **Model directories**: Hugging Face layout: `config.json` plus
//!   `*.safetensors` shards. Parameter counts come from SafeTensors headers.
//!
//! # Precision
//! Weights are sized at half precision when an accelerator is present and
//! at full precision on CPU-only hosts (see [`Precision::for_host`]),
//! unless the entry pins a precision or the checkpoint is int8.

mod catalog;
mod error;
pub mod hf;
mod precision;
mod spec;

pub use catalog::{is_model_dir, ModelCatalog, ModelEntry};
pub use error::CatalogError;
pub use precision::Precision;
pub use spec::{ModelSpec, ResolvedModel, WeightSource};
