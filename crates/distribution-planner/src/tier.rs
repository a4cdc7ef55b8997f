// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Capability tiers, least to most conservative.

use std::fmt;

/// Ranked strategy class.
///
/// ```text
///   SingleDevice  →  Parallel  →  LayerOffload  →  CpuOnly
///   (fastest)                                     (always fits)
/// ```
/// Passing a higher `min_tier` to the planner excludes every cheaper
/// strategy, which is how the runtime forces a downgrade after a failure.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Whole model on the highest-priority device.
    #[default]
    SingleDevice = 0,
    /// Model or pipeline parallelism across accelerators.
    Parallel = 1,
    /// Leading layers on the best accelerator, the rest on CPU.
    LayerOffload = 2,
    /// Everything on CPU.
    CpuOnly = 3,
}

impl Tier {
    /// All tiers in order.
    pub const ALL: [Tier; 4] = [Tier::SingleDevice, Tier::Parallel, Tier::LayerOffload, Tier::CpuOnly];

    /// The next more conservative tier, or `None` after [`Tier::CpuOnly`].
    pub fn next(&self) -> Option<Tier> {
        match self {
            Tier::SingleDevice => Some(Tier::Parallel),
            Tier::Parallel => Some(Tier::LayerOffload),
            Tier::LayerOffload => Some(Tier::CpuOnly),
            Tier::CpuOnly => None,
        }
    }

    /// Numeric rank, 0 = least conservative.
    pub fn rank(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Tier::SingleDevice => "single-device",
            Tier::Parallel => "parallel",
            Tier::LayerOffload => "layer-offload",
            Tier::CpuOnly => "cpu-only",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_chain_terminates() {
        let mut tier = Tier::SingleDevice;
        let mut seen = vec![tier];
        while let Some(next) = tier.next() {
            assert!(next > tier);
            tier = next;
            seen.push(tier);
        }
        assert_eq!(seen, Tier::ALL.to_vec());
    }

    #[test]
    fn test_rank() {
        assert_eq!(Tier::SingleDevice.rank(), 0);
        assert_eq!(Tier::CpuOnly.rank(), 3);
    }
}
