//! The ndarray payload convention: a typed view over a shared-memory block.

use appose_codec::{DType, MemoryOrder, NDArrayRef, ShmRef};

use crate::error::ShmError;
use crate::shared_memory::SharedMemory;

/// A typed n-dimensional array view backed by a [`SharedMemory`] block.
///
/// `close`ing an `NDArray` closes its backing shared memory.
pub struct NDArray {
    dtype: DType,
    shape: Vec<u64>,
    order: MemoryOrder,
    shm: SharedMemory,
}

fn byte_len(dtype: DType, shape: &[u64]) -> u64 {
    dtype.size_of() * shape.iter().product::<u64>()
}

impl NDArray {
    /// Construct an ndarray with a freshly created shared-memory block sized
    /// exactly to `dtype`/`shape`.
    pub fn create(dtype: DType, shape: Vec<u64>, order: MemoryOrder) -> Result<Self, ShmError> {
        let size = byte_len(dtype, &shape);
        let shm = SharedMemory::create(None, size)?;
        Ok(Self {
            dtype,
            shape,
            order,
            shm,
        })
    }

    /// Wrap an existing shared-memory block as an ndarray.
    ///
    /// # Errors
    ///
    /// [`ShmError::TooSmall`] if `dtype * product(shape)` exceeds the
    /// backing segment's size.
    pub fn wrap(
        dtype: DType,
        shape: Vec<u64>,
        order: MemoryOrder,
        shm: SharedMemory,
    ) -> Result<Self, ShmError> {
        let required = byte_len(dtype, &shape);
        let available = shm.size();
        if required > available {
            return Err(ShmError::TooSmall {
                required,
                available,
            });
        }
        Ok(Self {
            dtype,
            shape,
            order,
            shm,
        })
    }

    /// Element type.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Dimension sizes.
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// Memory layout (not carried on the wire; see `DESIGN.md`).
    pub fn order(&self) -> MemoryOrder {
        self.order
    }

    /// The backing shared-memory block.
    pub fn shm(&self) -> &SharedMemory {
        &self.shm
    }

    /// View the element bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.shm.as_slice()[..byte_len(self.dtype, &self.shape) as usize]
    }

    /// Mutably view the element bytes.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        let n = byte_len(self.dtype, &self.shape) as usize;
        &mut self.shm.as_mut_slice()[..n]
    }

    /// Closes the backing shared memory.
    pub fn close(&mut self) -> Result<(), ShmError> {
        self.shm.close()
    }

    /// The wire descriptor for this ndarray (name + size of the backing
    /// segment, dtype, shape) — does not copy element data.
    pub fn to_ref(&self) -> NDArrayRef {
        NDArrayRef {
            dtype: self.dtype,
            shape: self.shape.clone(),
            shm: ShmRef {
                name: self.shm.name().to_string(),
                size: self.shm.size(),
            },
        }
    }
}
