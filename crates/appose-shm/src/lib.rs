//! appose-shm
//!
//! Cross-platform named shared memory (`create`/`attach`/`close`/`unlink`)
//! and the ndarray payload convention that rides over the Appose wire
//! protocol's `shm`/`ndarray` sentinels.
//!
//! Platform backends: POSIX `shm_open`/`ftruncate`/`mmap` on Unix (with a
//! Darwin-specific name-length limit and attach-on-collision behavior), and
//! `CreateFileMappingW`/`MapViewOfFile` on Windows. The backend is selected
//! at compile time via `cfg`, never at runtime.
#![warn(missing_docs)]

mod backend;
mod error;
mod ndarray;
mod shared_memory;

pub use appose_codec::{DType, MemoryOrder};
pub use error::ShmError;
pub use ndarray::NDArray;
pub use shared_memory::SharedMemory;
