// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for plan validation.
//!
//! Planning itself never fails; these errors only come out of
//! [`DistributionPlan::validate`](crate::DistributionPlan::validate).

/// A distribution plan that violates the coverage invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlannerError {
    /// The plan assigns no layers.
    #[error("plan has no layer ranges")]
    EmptyPlan,

    /// A range is empty, out of order, overlapping, or leaves a gap.
    #[error("invalid {strategy} plan: {detail}")]
    InvalidPlan { strategy: String, detail: String },

    /// The ranges do not end at the model's last layer.
    #[error("plan covers {covered} of {expected} layers")]
    IncompleteCoverage { covered: u32, expected: u32 },
}
