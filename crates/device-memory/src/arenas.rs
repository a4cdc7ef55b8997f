// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The set of arenas for one detected device list.

use crate::{ByteSize, DeviceArena};
use std::collections::BTreeMap;

/// Arenas keyed by device id.
///
/// Iteration order is by device id, which keeps summaries and logs stable.
#[derive(Debug, Clone, Default)]
pub struct DeviceArenas {
    arenas: BTreeMap<String, DeviceArena>,
}

impl DeviceArenas {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from `(device id, capacity)` pairs.
    pub fn from_capacities<I, S>(capacities: I) -> Self
    where
        I: IntoIterator<Item = (S, ByteSize)>,
        S: Into<String>,
    {
        let mut set = Self::new();
        for (id, capacity) in capacities {
            set.insert(DeviceArena::new(id, capacity));
        }
        set
    }

    /// Adds (or replaces) the arena for its device id.
    pub fn insert(&mut self, arena: DeviceArena) {
        self.arenas.insert(arena.device_id().to_string(), arena);
    }

    /// Looks up the arena for a device id.
    pub fn get(&self, device_id: &str) -> Option<&DeviceArena> {
        self.arenas.get(device_id)
    }

    /// Iterates over all arenas in device-id order.
    pub fn iter(&self) -> impl Iterator<Item = &DeviceArena> {
        self.arenas.values()
    }

    /// Number of arenas.
    pub fn len(&self) -> usize {
        self.arenas.len()
    }

    /// Returns `true` if there are no arenas.
    pub fn is_empty(&self) -> bool {
        self.arenas.is_empty()
    }

    /// Total bytes reserved across every device.
    ///
    /// Bytes on a shared-memory arena are counted once, in its pool.
    pub fn total_reserved_bytes(&self) -> u64 {
        self.arenas
            .values()
            .filter(|a| a.pool().is_none())
            .map(|a| a.reserved_bytes())
            .sum()
    }
}
