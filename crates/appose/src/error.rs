// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types for the `appose` crate.

use thiserror::Error;

use crate::task::TaskStatus;

/// Errors from spawning and supervising a worker process.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Failed to spawn the worker process.
    #[error("failed to spawn worker: {0}")]
    Spawn(#[source] std::io::Error),

    /// A required stdio handle (stdin/stdout/stderr) was unavailable on a
    /// freshly spawned child — should not happen given `Stdio::piped()`
    /// on all three streams.
    #[error("worker process stdio unavailable")]
    Stdio,

    /// A referenced environment path does not exist.
    #[error("environment path does not exist: {}", .0.display())]
    MissingPath(std::path::PathBuf),

    /// The service has already been closed.
    #[error("service is already closed")]
    AlreadyClosed,

    /// Other I/O failure while supervising the worker.
    #[error("worker I/O error: {0}")]
    Io(#[source] std::io::Error),
}

/// Errors from operating on a [`crate::Task`].
#[derive(Debug, Error)]
pub enum TaskError {
    /// The requested operation is not valid in the task's current status.
    #[error("operation not permitted in task status {status:?}")]
    IllegalState {
        /// The status the task was in when the operation was attempted.
        status: TaskStatus,
    },

    /// Failed to encode a request for this task.
    #[error("failed to encode request: {0}")]
    Decode(#[source] appose_codec::CodecError),

    /// The owning Service's request channel is closed; the worker process
    /// is no longer reachable.
    #[error("owning service is closed")]
    ServiceClosed,
}
