// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for device probing.
//!
//! A [`ProbeError`] never escapes [`DeviceDetector::detect`](crate::DeviceDetector::detect):
//! the detector logs it and omits the device kind that failed.

/// Errors raised by an individual accelerator probe.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// An external query tool could not be run or exited unsuccessfully.
    #[error("`{command}` failed: {detail}")]
    CommandFailed { command: String, detail: String },

    /// Failed to read a sysfs or procfs file.
    #[error("failed to read {path}: {source}")]
    ReadError {
        path: String,
        source: std::io::Error,
    },

    /// A probe's output could not be parsed.
    #[error("failed to parse {source_name}: {detail}")]
    ParseError { source_name: String, detail: String },

    /// The accelerator kind does not exist on this platform.
    #[error("{what} not available on this host")]
    NotAvailable { what: String },
}
