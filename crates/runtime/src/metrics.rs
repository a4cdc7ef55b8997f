// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-request inference metrics.
//!
//! [`InferenceMetrics`] collects timing, token counts and per-device layer
//! passes for one request. They are logged at the end of every request and
//! returned with the result.

use std::collections::BTreeMap;
use std::time::Duration;

/// Metrics for a single inference request.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct InferenceMetrics {
    /// Total wall-clock time spent in the engine.
    pub total_duration: Duration,
    /// Tokens in the (possibly truncated) prompt.
    pub prompt_tokens: usize,
    /// Tokens generated.
    pub tokens_generated: usize,
    /// Layer passes executed per device id.
    pub layer_passes: BTreeMap<String, u64>,
    /// Largest activation reservation held during the request.
    pub peak_activation_bytes: u64,
}

impl InferenceMetrics {
    /// Creates an empty metrics container.
    pub fn new(prompt_tokens: usize) -> Self {
        Self {
            prompt_tokens,
            ..Default::default()
        }
    }

    /// Records `layers` passes on `device_id` with `activation_bytes` of
    /// scratch memory held.
    pub fn record_passes(&mut self, device_id: &str, layers: u32, activation_bytes: u64) {
        *self.layer_passes.entry(device_id.to_string()).or_default() += layers as u64;
        self.peak_activation_bytes = self.peak_activation_bytes.max(activation_bytes);
    }

    /// Finalises metrics with the total wall-clock time and token count.
    pub fn finalise(&mut self, total: Duration, tokens: usize) {
        self.total_duration = total;
        self.tokens_generated = tokens;
    }

    /// Total layer passes across all devices.
    pub fn total_layer_passes(&self) -> u64 {
        self.layer_passes.values().sum()
    }

    /// Returns tokens per second throughput.
    pub fn tokens_per_second(&self) -> f64 {
        let secs = self.total_duration.as_secs_f64();
        if secs <= 0.0 || self.tokens_generated == 0 {
            return 0.0;
        }
        self.tokens_generated as f64 / secs
    }

    /// Returns a human-readable summary suitable for CLI output.
    pub fn summary(&self) -> String {
        let passes = self
            .layer_passes
            .iter()
            .map(|(device, n)| format!("{device}={n}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "Inference: {:.2}ms total, {} prompt tokens, {} tokens ({:.1} tok/s), \
             layer passes [{}], peak activations {} B",
            self.total_duration.as_secs_f64() * 1000.0,
            self.prompt_tokens,
            self.tokens_generated,
            self.tokens_per_second(),
            passes,
            self.peak_activation_bytes,
        )
    }
}
