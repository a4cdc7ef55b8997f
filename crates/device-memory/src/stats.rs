// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-arena reservation statistics.

use crate::ByteSize;

/// Cumulative statistics about one device arena.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ArenaStats {
    /// Number of successful reservations.
    pub reservations: u64,
    /// Number of reservations returned (dropped).
    pub releases: u64,
    /// Number of reservation requests rejected for lack of capacity.
    pub oom_count: u64,
    /// High-water mark of reserved bytes.
    pub peak_reserved_bytes: u64,
    /// Total bytes ever reserved.
    pub cumulative_reserved_bytes: u64,
}

impl ArenaStats {
    pub(crate) fn record_reservation(&mut self, bytes: u64, reserved_now: u64) {
        self.reservations += 1;
        self.cumulative_reserved_bytes += bytes;
        self.peak_reserved_bytes = self.peak_reserved_bytes.max(reserved_now);
    }

    pub(crate) fn record_release(&mut self) {
        self.releases += 1;
    }

    pub(crate) fn record_oom(&mut self) {
        self.oom_count += 1;
    }

    /// Number of reservations still outstanding.
    pub fn live_reservations(&self) -> u64 {
        self.reservations.saturating_sub(self.releases)
    }

    /// Returns a one-line summary.
    pub fn summary(&self) -> String {
        format!(
            "{} reservations ({} live), {} OOMs, peak {}",
            self.reservations,
            self.live_reservations(),
            self.oom_count,
            ByteSize::from_bytes(self.peak_reserved_bytes),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_is_high_water_mark() {
        let mut s = ArenaStats::default();
        s.record_reservation(100, 100);
        s.record_reservation(50, 150);
        s.record_release();
        s.record_reservation(10, 60);
        assert_eq!(s.peak_reserved_bytes, 150);
        assert_eq!(s.cumulative_reserved_bytes, 160);
        assert_eq!(s.live_reservations(), 2);
    }

    #[test]
    fn test_summary() {
        let mut s = ArenaStats::default();
        s.record_reservation(1024, 1024);
        s.record_oom();
        let text = s.summary();
        assert!(text.contains("1 reservations"));
        assert!(text.contains("1 OOMs"));
    }
}
