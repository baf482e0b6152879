// SPDX-License-Identifier: MIT OR Apache-2.0
//! Errors from the worker-side protocol driver.

use thiserror::Error;

/// Errors from [`crate::run_worker_loop`] and its supporting types.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Failed to read a request line from stdin.
    #[error("failed to read request: {0}")]
    Io(#[source] std::io::Error),

    /// A request line could not be decoded as a value tree.
    #[error("malformed request: {0}")]
    Codec(#[from] appose_codec::CodecError),

    /// A request line was missing a required field or had the wrong type
    /// for one.
    #[error("malformed request: missing or invalid field '{field}'")]
    MissingField {
        /// The field name that was missing or mistyped.
        field: &'static str,
    },

    /// The internal response channel closed while the loop was still
    /// running — should not happen short of a writer-task panic.
    #[error("response channel closed")]
    ChannelClosed,
}
