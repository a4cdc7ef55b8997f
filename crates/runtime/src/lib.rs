// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # runtime
//!
//! Loads models onto whatever hardware is present and serves inference
//! requests against them, degrading gracefully when memory runs out.
//!
//! # Control Flow
//! ```text
//! ServingContext::infer(model, request)
//!     │  FIFO mutex: one request at a time
//!     ▼
//! ReloadSupervisor
//!     │  resolve ─▶ ModelCatalog          (ModelSpec, cached)
//!     │  plan    ─▶ DistributionPlanner   (over detected devices)
//!     │  load    ─▶ ModelLoader           (device arenas, mmap'd shards)
//!     ▼
//! InferenceEngine ─▶ ExecutionBackend     (forward passes per range)
//!     │
//!     ▼
//! InferenceResult { text, device_summary, degraded, metrics }
//! ```
//!
//! # Recovery
//! Out-of-memory while loading re-plans at the next cheaper tier, down to
//! CPU-only. Out-of-memory or device loss while executing forces a
//! layer-offload plan and retries the request once. See
//! [`ReloadSupervisor`] for the full state machine.
//!
//! # Async Execution
//! Requests suspend only inside forward passes and between loader stages.
//! A request deadline cancels generation at the next suspension point
//! without touching the loaded model.

mod backend;
mod config;
mod engine;
mod error;
mod loader;
mod metrics;
mod service;
mod supervisor;
pub mod tokenizer;

pub use backend::{ExecutionBackend, Fault, SyntheticBackend, SYNTHETIC_REPLY};
pub use config::{EngineConfig, RuntimeConfig, MODEL_PATH_ENV};
pub use engine::{Deadline, EngineStats, InferOptions, InferenceEngine, InferenceRequest, InferenceResult};
pub use error::{InferError, LoadFailure, RuntimeError};
pub use loader::{LoadOutcome, LoadedModel, ModelLoader};
pub use metrics::InferenceMetrics;
pub use service::{supported_strategies, Capabilities, DeviceSource, FixedDevices, ServingContext};
pub use supervisor::{ReloadSupervisor, SupervisorState, Transition};
