// SPDX-License-Identifier: MIT OR Apache-2.0
//! Bridges between the wire value tree ([`appose_codec::Value`], platform
//! independent) and live, mapped [`appose_shm`] objects.
//!
//! `appose-codec` only knows about [`appose_codec::ShmRef`]/
//! [`appose_codec::NDArrayRef`] — thin name+size+dtype+shape descriptors.
//! Turning one into an actual memory-mapped segment (or the reverse) needs
//! a platform backend, which is why this conversion lives here instead of
//! in `appose-codec` itself.

use appose_codec::Value;
use appose_shm::{MemoryOrder, NDArray, ShmError, SharedMemory};

/// Build the wire [`Value`] for an ndarray already backed by shared
/// memory. Does not copy element data — only the descriptor crosses the
/// channel.
pub fn ndarray_to_value(nd: &NDArray) -> Value {
    Value::NDArray(nd.to_ref())
}

/// Build the wire [`Value`] for a bare shared-memory block.
pub fn shm_to_value(shm: &SharedMemory) -> Value {
    Value::Shm(appose_codec::ShmRef {
        name: shm.name().to_string(),
        size: shm.size(),
    })
}

/// Attach to the shared-memory segment a received [`Value::Shm`] refers
/// to.
///
/// # Errors
///
/// [`ShmError::NotFound`] if the segment no longer exists, e.g. because
/// the sending side already unlinked it.
pub fn attach_shm(value: &Value) -> Result<SharedMemory, ShmError> {
    match value {
        Value::Shm(shm_ref) => SharedMemory::attach(&shm_ref.name, shm_ref.size),
        _ => Err(ShmError::NotFound("value is not a shm reference".into())),
    }
}

/// Attach to the shared-memory segment a received [`Value::NDArray`]
/// refers to, wrapping it as a live [`NDArray`].
///
/// The wire format carries no memory-order field (see the crate-level
/// design notes); the attached array always reports
/// [`MemoryOrder::COrder`].
///
/// # Errors
///
/// [`ShmError::NotFound`] if the backing segment no longer exists,
/// [`ShmError::TooSmall`] if its size doesn't fit `dtype * shape`.
pub fn attach_ndarray(value: &Value) -> Result<NDArray, ShmError> {
    match value {
        Value::NDArray(nd_ref) => {
            let shm = SharedMemory::attach(&nd_ref.shm.name, nd_ref.shm.size)?;
            NDArray::wrap(nd_ref.dtype, nd_ref.shape.clone(), MemoryOrder::COrder, shm)
        }
        _ => Err(ShmError::NotFound("value is not an ndarray reference".into())),
    }
}
