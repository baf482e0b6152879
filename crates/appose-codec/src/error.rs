//! Errors produced by encoding and decoding wire values.

use thiserror::Error;

/// Errors from the [`crate::encode`]/[`crate::decode`] codec.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The value tree could not be serialized to JSON.
    #[error("serialization error: {0}")]
    Serialize(#[source] serde_json::Error),

    /// The input was not well-formed JSON.
    #[error("deserialization error: {0}")]
    Deserialize(#[source] serde_json::Error),

    /// The input contained more than one line.
    #[error("expected a single line of JSON, got {0} lines")]
    MultipleLines(usize),

    /// A sentinel object (`appose_type`) was missing a required key or had
    /// a key of the wrong shape.
    #[error("malformed {kind} sentinel: {reason}")]
    MalformedSentinel {
        /// `"shm"` or `"ndarray"`.
        kind: &'static str,
        /// Human-readable description of what was wrong.
        reason: String,
    },

    /// An ndarray sentinel named a `dtype` outside the supported set.
    #[error("unknown dtype: {0}")]
    UnknownDType(String),

    /// A shm or ndarray sentinel declared a non-positive size or shape
    /// dimension.
    #[error("non-positive size or shape dimension: {0}")]
    NonPositiveSize(String),
}
