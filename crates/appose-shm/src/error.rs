//! Errors from shared-memory operations.

use thiserror::Error;

/// Errors surfaced synchronously to the caller of a [`crate::SharedMemory`]
/// operation.
#[derive(Debug, Error)]
pub enum ShmError {
    /// `create` was asked for a name that is already in use.
    #[error("shared memory segment already exists: {0}")]
    Exists(String),

    /// `attach` was asked for a name that does not exist.
    #[error("shared memory segment not found: {0}")]
    NotFound(String),

    /// An OS-level failure occurred (`shm_open`, `mmap`, `CreateFileMapping`, …).
    #[error("shared memory I/O error: {0}")]
    Io(#[source] std::io::Error),

    /// The requested name exceeds the platform's name-length limit.
    #[error("shared memory name too long ({len} bytes, limit {limit}): {name}")]
    NameTooLong {
        /// The name that was rejected.
        name: String,
        /// Its length in bytes.
        len: usize,
        /// The platform limit.
        limit: usize,
    },

    /// An ndarray's `dtype`/`shape` does not fit within its backing segment.
    #[error("ndarray of {required} bytes does not fit in shared memory of {available} bytes")]
    TooSmall {
        /// Bytes required by dtype * product(shape).
        required: u64,
        /// Bytes available in the backing segment.
        available: u64,
    },

    /// Failed to generate a unique random name after repeated collisions.
    #[error("failed to generate a unique shared memory name after {attempts} attempts")]
    NameGeneration {
        /// Number of attempts made.
        attempts: u32,
    },
}
