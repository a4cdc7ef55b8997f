// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # device-memory
//!
//! Budget-enforced memory accounting for every compute device a model is
//! spread across (discrete GPUs, unified-memory accelerators, NPUs and the
//! host CPU).
//!
//! # Key Components
//!
//! - [`ByteSize`]: a byte count with human-readable parsing (`"512M"`,
//!   `"8G"`, raw byte counts).
//! - [`DeviceArena`]: one device's memory ceiling. Reservations that would
//!   exceed it fail with [`MemoryError::OutOfMemory`].
//! - [`Reservation`]: an RAII handle for reserved bytes. Dropping it
//!   returns the bytes to its arena.
//! - [`DeviceArenas`]: the set of arenas for one detected device list,
//!   keyed by device id.
//! - [`ArenaStats`]: cumulative per-arena metrics (peak, OOM count).
//!
//! # Ownership Model
//!
//! ```text
//! DeviceArena::reserve(bytes)
//!       │
//!       ▼
//!   Reservation  ◄─── holds Arc<ArenaInner>
//!       │
//!       │  drop()
//!       ▼
//!   ArenaInner::release()  ──► reserved counter decremented
//! ```
//!
//! A loaded model holds one reservation per (layer range, device) pair.
//! Tearing the model down drops them all, so the old model's device memory
//! is returned before the next model reserves anything.
//!
//! # Example
//! ```
//! use device_memory::{ByteSize, DeviceArena};
//!
//! let gpu = DeviceArena::new("cuda:0", ByteSize::from_gb(8));
//! let weights = gpu.reserve(ByteSize::from_gb(6).as_bytes(), "layers 0..24").unwrap();
//! assert!(gpu.reserve(ByteSize::from_gb(4).as_bytes(), "too big").is_err());
//!
//! drop(weights);
//! assert_eq!(gpu.reserved_bytes(), 0);
//! ```

mod arena;
mod arenas;
mod error;
mod reservation;
mod size;
mod stats;

pub use arena::DeviceArena;
pub use arenas::DeviceArenas;
pub use error::MemoryError;
pub use reservation::Reservation;
pub use size::ByteSize;
pub use stats::ArenaStats;
