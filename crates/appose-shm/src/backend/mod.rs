//! Platform backend abstraction.
//!
//! The concrete implementation is chosen once, at compile time, via `cfg`:
//! no inheritance chain or runtime `dyn` dispatch is needed since a given
//! binary only ever runs on one OS. [`ShmBackend`] exists so tests (and any
//! future additional platform) have a single, mockable seam.

use crate::error::ShmError;

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

/// A live mapping of a shared-memory segment in this process.
pub(crate) struct RawMapping {
    pub name: String,
    pub size: u64,
    pub ptr: *mut u8,
    #[cfg(unix)]
    pub fd: std::os::raw::c_int,
    #[cfg(windows)]
    pub mapping_handle: isize,
}

// SAFETY: the raw pointer is a process-local mapping address; `RawMapping`
// does not allow concurrent mutation through it, and the mapping stays
// valid for the lifetime of the owning `SharedMemory`.
unsafe impl Send for RawMapping {}

/// Platform operations backing [`crate::SharedMemory`].
pub(crate) trait ShmBackend {
    fn create(&self, name: Option<&str>, size: u64) -> Result<RawMapping, ShmError>;
    fn attach(&self, name: &str, size: u64) -> Result<RawMapping, ShmError>;
    fn close(&self, mapping: &mut RawMapping) -> Result<(), ShmError>;
    fn unlink(&self, name: &str) -> Result<(), ShmError>;
}

#[cfg(unix)]
pub(crate) fn platform_backend() -> &'static dyn ShmBackend {
    &unix::PosixBackend
}

#[cfg(windows)]
pub(crate) fn platform_backend() -> &'static dyn ShmBackend {
    &windows::WindowsBackend
}
