// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! RAII handle for reserved device memory.
//!
//! A [`Reservation`] is the only way to hold capacity on a
//! [`DeviceArena`](crate::DeviceArena). When it is dropped the bytes go back
//! to the arena, so tearing down a model is just dropping its reservations.

use crate::arena::ArenaInner;
use crate::ByteSize;
use std::sync::Arc;

/// Bytes held on one device until this value is dropped.
///
/// On a shared-memory arena it also holds the matching bytes in the pool.
pub struct Reservation {
    arena: Arc<ArenaInner>,
    bytes: u64,
    label: String,
    pooled: Option<Box<Reservation>>,
}

impl Reservation {
    pub(crate) fn new(arena: Arc<ArenaInner>, bytes: u64, label: String, pooled: Option<Reservation>) -> Self {
        Self {
            arena,
            bytes,
            label,
            pooled: pooled.map(Box::new),
        }
    }

    /// Number of bytes held.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Size held, for display.
    pub fn size(&self) -> ByteSize {
        ByteSize::from_bytes(self.bytes)
    }

    /// The device this reservation lives on.
    pub fn device_id(&self) -> &str {
        self.arena.device_id()
    }

    /// Free-form label given at reservation time (e.g. `"layers 0..12"`).
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.arena.release(self.bytes, &self.label);
    }
}

impl std::fmt::Debug for Reservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservation")
            .field("device", &self.device_id())
            .field("bytes", &self.bytes)
            .field("label", &self.label)
            .field("pooled", &self.pooled.is_some())
            .finish()
    }
}
