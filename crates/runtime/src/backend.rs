// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Execution backends.
//!
//! An [`ExecutionBackend`] runs forward passes over a layer range on one
//! device and picks the next token. The engine owns scheduling, memory
//! accounting and cancellation; the backend only reports how long a pass
//! took and whether the device failed.
//!
//! [`SyntheticBackend`] simulates per-layer latency and replies with a
//! fixed text. Faults can be queued to exercise the recovery paths.

use crate::config::EngineConfig;
use crate::tokenizer::{encode, EOS_TOKEN};
use crate::InferError;
use device_memory::MemoryError;
use distribution_planner::Assignment;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Executes model layers on devices.
pub trait ExecutionBackend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Runs one forward pass of `range.layers` on `range.device_id` over
    /// `context_len` tokens and returns the device time it takes.
    fn forward(&self, range: &Assignment, context_len: usize) -> Result<Duration, InferError>;

    /// Picks the next token given the full context and how many tokens
    /// have been generated so far.
    fn next_token(&self, context: &[u32], generated: usize) -> u32;
}

/// A device failure to raise on an upcoming forward pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The device reports an allocation failure.
    OutOfMemory,
    /// The device disappears.
    DeviceLost,
}

/// Default reply of the synthetic backend.
pub const SYNTHETIC_REPLY: &str = "This is a synthetic response.";

/// Latency-simulating backend with a fixed reply.
pub struct SyntheticBackend {
    reply: Vec<u32>,
    accelerator_latency: Duration,
    cpu_latency: Duration,
    faults: Mutex<VecDeque<Fault>>,
    forward_calls: AtomicU64,
}

impl SyntheticBackend {
    pub fn new(accelerator_latency: Duration, cpu_latency: Duration) -> Self {
        Self {
            reply: encode(SYNTHETIC_REPLY),
            accelerator_latency,
            cpu_latency,
            faults: Mutex::new(VecDeque::new()),
            forward_calls: AtomicU64::new(0),
        }
    }

    /// Backend using the latencies from an [`EngineConfig`].
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.accelerator_layer_latency(), config.cpu_layer_latency())
    }

    /// Replaces the reply text.
    pub fn with_reply(mut self, reply: &str) -> Self {
        self.reply = encode(reply);
        self
    }

    /// Queues a fault for the next forward pass. Faults fire in order, one
    /// per pass.
    pub fn inject_fault(&self, fault: Fault) {
        self.faults
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(fault);
    }

    /// Faults still queued.
    pub fn pending_faults(&self) -> usize {
        self.faults.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Forward passes executed so far, failed ones included.
    pub fn forward_calls(&self) -> u64 {
        self.forward_calls.load(Ordering::Relaxed)
    }

    fn take_fault(&self) -> Option<Fault> {
        self.faults.lock().unwrap_or_else(|e| e.into_inner()).pop_front()
    }
}

impl ExecutionBackend for SyntheticBackend {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn forward(&self, range: &Assignment, context_len: usize) -> Result<Duration, InferError> {
        self.forward_calls.fetch_add(1, Ordering::Relaxed);

        match self.take_fault() {
            Some(Fault::OutOfMemory) => {
                return Err(InferError::OutOfMemory {
                    device: range.device_id.clone(),
                    source: MemoryError::OutOfMemory {
                        device: range.device_id.clone(),
                        requested_bytes: context_len as u64,
                        available_bytes: 0,
                        capacity_bytes: 0,
                    },
                });
            }
            Some(Fault::DeviceLost) => {
                return Err(InferError::DeviceLost {
                    device: range.device_id.clone(),
                    detail: "device stopped responding".to_string(),
                });
            }
            None => {}
        }

        let per_layer = if range.is_cpu() {
            self.cpu_latency
        } else {
            self.accelerator_latency
        };
        Ok(per_layer.checked_mul(range.layers.len()).unwrap_or(Duration::MAX))
    }

    fn next_token(&self, _context: &[u32], generated: usize) -> u32 {
        self.reply.get(generated).copied().unwrap_or(EOS_TOKEN)
    }
}

impl std::fmt::Debug for SyntheticBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyntheticBackend")
            .field("accelerator_latency", &self.accelerator_latency)
            .field("cpu_latency", &self.cpu_latency)
            .field("pending_faults", &self.pending_faults())
            .finish()
    }
}
