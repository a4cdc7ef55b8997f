// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-device memory arena with a hard capacity.
//!
//! The arena does not own the device memory itself; it is the ledger that
//! decides whether a placement fits. Weight shards and activation buffers
//! both go through it, so a plan that looked fine at planning time still
//! fails cleanly (with [`MemoryError::OutOfMemory`]) if the device cannot
//! actually hold it.
//!
//! # Shared Memory
//! An arena created with [`DeviceArena::sharing`] has its own ceiling and
//! also draws every byte from a pool arena (the host RAM ledger for
//! unified-memory GPUs and NPUs). A reservation must fit both.
//!
//! # Thread Safety
//! Reservation is a compare-and-swap loop on the reserved counter, so two
//! concurrent reservations can never jointly overshoot the capacity.

use crate::{ArenaStats, ByteSize, MemoryError, Reservation};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Shared state behind a [`DeviceArena`] and its outstanding reservations.
pub(crate) struct ArenaInner {
    device_id: String,
    capacity: u64,
    reserved: AtomicU64,
    stats: Mutex<ArenaStats>,
    pool: Option<DeviceArena>,
}

impl ArenaInner {
    pub(crate) fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Called by `Reservation::drop`.
    pub(crate) fn release(&self, bytes: u64, label: &str) {
        self.reserved.fetch_sub(bytes, Ordering::AcqRel);
        if let Ok(mut stats) = self.stats.lock() {
            stats.record_release();
        }
        tracing::trace!(device = %self.device_id, bytes, label, "released");
    }
}

/// Capacity ledger for a single compute device.
///
/// Cloning a `DeviceArena` yields another handle to the same ledger.
#[derive(Clone)]
pub struct DeviceArena {
    inner: Arc<ArenaInner>,
}

impl DeviceArena {
    /// Creates an arena for `device_id` with the given capacity.
    pub fn new(device_id: impl Into<String>, capacity: ByteSize) -> Self {
        Self::build(device_id.into(), capacity, None)
    }

    /// Creates an arena capped at `capacity` whose bytes also come out of
    /// `pool`.
    pub fn sharing(device_id: impl Into<String>, capacity: ByteSize, pool: &DeviceArena) -> Self {
        Self::build(device_id.into(), capacity, Some(pool.clone()))
    }

    fn build(device_id: String, capacity: ByteSize, pool: Option<DeviceArena>) -> Self {
        Self {
            inner: Arc::new(ArenaInner {
                device_id,
                capacity: capacity.as_bytes(),
                reserved: AtomicU64::new(0),
                stats: Mutex::new(ArenaStats::default()),
                pool,
            }),
        }
    }

    /// Reserves `bytes` on this device.
    ///
    /// Returns `Err(OutOfMemory)` without side effects (other than the OOM
    /// counter) when the reservation does not fit this arena or its pool.
    pub fn reserve(&self, bytes: u64, label: &str) -> Result<Reservation, MemoryError> {
        if bytes == 0 {
            return Err(MemoryError::ZeroSizedReservation);
        }

        let capacity = self.inner.capacity;
        let mut current = self.inner.reserved.load(Ordering::Acquire);
        let next = loop {
            let next = match current.checked_add(bytes) {
                Some(next) if next <= capacity => next,
                _ => return Err(self.out_of_memory(bytes, capacity.saturating_sub(current))),
            };

            match self.inner.reserved.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break next,
                Err(actual) => current = actual,
            }
        };

        let pooled = match &self.inner.pool {
            Some(pool) => match pool.reserve(bytes, label) {
                Ok(reservation) => Some(reservation),
                Err(e) => {
                    self.inner.reserved.fetch_sub(bytes, Ordering::AcqRel);
                    let pool_available = match e {
                        MemoryError::OutOfMemory { available_bytes, .. } => available_bytes,
                        _ => 0,
                    };
                    let available = capacity.saturating_sub(next - bytes).min(pool_available);
                    return Err(self.out_of_memory(bytes, available));
                }
            },
            None => None,
        };

        if let Ok(mut stats) = self.inner.stats.lock() {
            stats.record_reservation(bytes, next);
        }
        tracing::trace!(device = %self.inner.device_id, bytes, label, "reserved");
        Ok(Reservation::new(
            Arc::clone(&self.inner),
            bytes,
            label.to_string(),
            pooled,
        ))
    }

    fn out_of_memory(&self, bytes: u64, available: u64) -> MemoryError {
        if let Ok(mut stats) = self.inner.stats.lock() {
            stats.record_oom();
        }
        MemoryError::OutOfMemory {
            device: self.inner.device_id.clone(),
            requested_bytes: bytes,
            available_bytes: available,
            capacity_bytes: self.inner.capacity,
        }
    }

    /// The arena this one draws from, if it shares memory.
    pub fn pool(&self) -> Option<&DeviceArena> {
        self.inner.pool.as_ref()
    }

    /// Device id this arena accounts for.
    pub fn device_id(&self) -> &str {
        &self.inner.device_id
    }

    /// Hard capacity of the device.
    pub fn capacity(&self) -> ByteSize {
        ByteSize::from_bytes(self.inner.capacity)
    }

    /// Bytes currently held by live reservations.
    pub fn reserved_bytes(&self) -> u64 {
        self.inner.reserved.load(Ordering::Acquire)
    }

    /// Bytes still available for reservation, pool included.
    pub fn available_bytes(&self) -> u64 {
        let own = self.inner.capacity.saturating_sub(self.reserved_bytes());
        match &self.inner.pool {
            Some(pool) => own.min(pool.available_bytes()),
            None => own,
        }
    }

    /// Snapshot of the arena's statistics.
    pub fn stats(&self) -> ArenaStats {
        self.inner
            .stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for DeviceArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceArena")
            .field("device", &self.inner.device_id)
            .field("capacity", &self.capacity())
            .field("reserved", &ByteSize::from_bytes(self.reserved_bytes()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_and_drop() {
        let arena = DeviceArena::new("cuda:0", ByteSize::from_mb(1));
        let r = arena.reserve(1024, "w").unwrap();
        assert_eq!(arena.reserved_bytes(), 1024);
        assert_eq!(r.bytes(), 1024);
        assert_eq!(r.device_id(), "cuda:0");
        drop(r);
        assert_eq!(arena.reserved_bytes(), 0);
    }

    #[test]
    fn test_oom() {
        let arena = DeviceArena::new("cuda:0", ByteSize::from_bytes(1024));
        let _a = arena.reserve(512, "a").unwrap();
        let _b = arena.reserve(512, "b").unwrap();
        let err = arena.reserve(1, "c").unwrap_err();
        match err {
            MemoryError::OutOfMemory {
                device,
                available_bytes,
                ..
            } => {
                assert_eq!(device, "cuda:0");
                assert_eq!(available_bytes, 0);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(arena.stats().oom_count, 1);
    }

    #[test]
    fn test_zero_reservation() {
        let arena = DeviceArena::new("cpu", ByteSize::from_mb(1));
        assert_eq!(
            arena.reserve(0, "z").unwrap_err(),
            MemoryError::ZeroSizedReservation
        );
    }

    #[test]
    fn test_overflow_is_oom() {
        let arena = DeviceArena::new("cpu", ByteSize::from_bytes(u64::MAX));
        let _a = arena.reserve(u64::MAX - 1, "a").unwrap();
        assert!(arena.reserve(10, "b").is_err());
    }

    #[test]
    fn test_clones_share_ledger() {
        let arena = DeviceArena::new("rocm:0", ByteSize::from_mb(1));
        let other = arena.clone();
        let _r = other.reserve(4096, "shared").unwrap();
        assert_eq!(arena.reserved_bytes(), 4096);
        assert_eq!(arena.available_bytes(), 1024 * 1024 - 4096);
    }

    #[test]
    fn test_stats_peak() {
        let arena = DeviceArena::new("cpu", ByteSize::from_mb(1));
        let a = arena.reserve(1000, "a").unwrap();
        let b = arena.reserve(2000, "b").unwrap();
        drop(a);
        drop(b);
        let stats = arena.stats();
        assert_eq!(stats.peak_reserved_bytes, 3000);
        assert_eq!(stats.reservations, 2);
        assert_eq!(stats.releases, 2);
    }

    #[test]
    fn test_concurrent_reservations_never_overshoot() {
        let arena = DeviceArena::new("cuda:0", ByteSize::from_bytes(10_000));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let arena = arena.clone();
                std::thread::spawn(move || {
                    let mut held = Vec::new();
                    for _ in 0..100 {
                        if let Ok(r) = arena.reserve(300, "t") {
                            held.push(r);
                        }
                    }
                    held
                })
            })
            .collect();

        let held: Vec<_> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let total: u64 = held.iter().map(|r| r.bytes()).sum();
        assert!(total <= 10_000);
        assert_eq!(arena.reserved_bytes(), total);
    }

    #[test]
    fn test_shared_arena_draws_from_pool() {
        let host = DeviceArena::new("cpu", ByteSize::from_gb(16));
        let mps = DeviceArena::sharing("mps:0", ByteSize::from_gb(12), &host);

        let weights = mps.reserve(ByteSize::from_gb(12).as_bytes(), "w").unwrap();
        assert_eq!(host.reserved_bytes(), ByteSize::from_gb(12).as_bytes());
        assert_eq!(host.available_bytes(), ByteSize::from_gb(4).as_bytes());
        assert!(host.reserve(ByteSize::from_gb(8).as_bytes(), "cpu stage").is_err());

        drop(weights);
        assert_eq!(host.reserved_bytes(), 0);
        assert!(host.reserve(ByteSize::from_gb(8).as_bytes(), "cpu stage").is_ok());
    }

    #[test]
    fn test_shared_arena_pool_oom_rolls_back() {
        let host = DeviceArena::new("cpu", ByteSize::from_gb(4));
        let npu = DeviceArena::sharing("npu:0", ByteSize::from_gb(8), &host);
        let _held = host.reserve(ByteSize::from_gb(3).as_bytes(), "cpu").unwrap();

        let err = npu.reserve(ByteSize::from_gb(2).as_bytes(), "w").unwrap_err();
        match err {
            MemoryError::OutOfMemory {
                device,
                available_bytes,
                ..
            } => {
                assert_eq!(device, "npu:0");
                assert_eq!(available_bytes, ByteSize::from_gb(1).as_bytes());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(npu.reserved_bytes(), 0);
        assert_eq!(npu.stats().oom_count, 1);
        assert_eq!(npu.available_bytes(), ByteSize::from_gb(1).as_bytes());
        assert!(npu.pool().is_some());
    }

    #[test]
    fn test_debug_format() {
        let arena = DeviceArena::new("mps:0", ByteSize::from_gb(16));
        let debug = format!("{arena:?}");
        assert!(debug.contains("mps:0"));
        assert!(debug.contains("capacity"));
    }
}
