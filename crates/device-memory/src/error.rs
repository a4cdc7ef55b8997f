// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for device memory accounting.

/// Errors that can occur when reserving device memory.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    /// The reservation would exceed the device's capacity.
    #[error("out of memory on {device}: requested {requested_bytes} bytes, only {available_bytes} available (capacity: {capacity_bytes})")]
    OutOfMemory {
        device: String,
        requested_bytes: u64,
        available_bytes: u64,
        capacity_bytes: u64,
    },

    /// Attempted to reserve zero bytes.
    #[error("cannot reserve zero bytes")]
    ZeroSizedReservation,

    /// A byte-size string could not be parsed.
    #[error("invalid byte size '{input}': {detail}")]
    InvalidSize { input: String, detail: String },
}
