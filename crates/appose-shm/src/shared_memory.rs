//! Cross-platform named shared memory.

use crate::backend::{self, RawMapping};
use crate::error::ShmError;

/// A named, OS-level shared-memory segment mapped into this process.
///
/// Created by [`SharedMemory::create`] or attached to by
/// [`SharedMemory::attach`]. `close` releases this process's mapping;
/// `unlink` additionally removes the name from the kernel's namespace and
/// must be called by at most one participant across all cooperating
/// processes (ownership of `unlink` belongs to whichever side created the
/// segment — see the crate-level docs).
pub struct SharedMemory {
    mapping: Option<RawMapping>,
}

impl SharedMemory {
    /// Create a new segment of exactly `size` bytes.
    ///
    /// If `name` is `None`, a random, collision-checked name is generated.
    ///
    /// # Errors
    ///
    /// [`ShmError::Exists`] if the name is already in use, [`ShmError::Io`]
    /// for other OS errors.
    pub fn create(name: Option<&str>, size: u64) -> Result<Self, ShmError> {
        if size == 0 {
            return Err(ShmError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "shared memory size must be greater than zero",
            )));
        }
        let mapping = backend::platform_backend().create(name, size)?;
        Ok(Self {
            mapping: Some(mapping),
        })
    }

    /// Attach to an existing segment, mapping the first `size` bytes.
    ///
    /// # Errors
    ///
    /// [`ShmError::NotFound`] if no such segment exists, [`ShmError::Io`]
    /// for other OS errors.
    pub fn attach(name: &str, size: u64) -> Result<Self, ShmError> {
        let mapping = backend::platform_backend().attach(name, size)?;
        Ok(Self {
            mapping: Some(mapping),
        })
    }

    /// This segment's name.
    ///
    /// # Panics
    ///
    /// Panics if called after [`close`](Self::close) — a closed
    /// `SharedMemory` has no identity left to report.
    pub fn name(&self) -> &str {
        &self.mapping.as_ref().expect("use after close").name
    }

    /// This segment's size in bytes.
    pub fn size(&self) -> u64 {
        self.mapping.as_ref().map(|m| m.size).unwrap_or(0)
    }

    /// Raw address of the mapping, or `None` if this segment has been
    /// closed.
    ///
    /// Valid until the next call to [`close`](Self::close).
    pub fn pointer(&self) -> Option<*mut u8> {
        self.mapping.as_ref().map(|m| m.ptr)
    }

    /// View the mapped bytes.
    ///
    /// # Panics
    ///
    /// Panics if called after [`close`](Self::close).
    pub fn as_slice(&self) -> &[u8] {
        let mapping = self.mapping.as_ref().expect("use after close");
        unsafe { std::slice::from_raw_parts(mapping.ptr, mapping.size as usize) }
    }

    /// Mutably view the mapped bytes.
    ///
    /// # Panics
    ///
    /// Panics if called after [`close`](Self::close).
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        let mapping = self.mapping.as_mut().expect("use after close");
        unsafe { std::slice::from_raw_parts_mut(mapping.ptr, mapping.size as usize) }
    }

    /// Unmap and release this process's handle. Idempotent.
    ///
    /// Does not remove the name from the kernel namespace — call
    /// [`unlink`](Self::unlink) for that, exactly once, from whichever
    /// participant created the segment.
    pub fn close(&mut self) -> Result<(), ShmError> {
        match self.mapping.as_mut() {
            Some(mapping) => {
                backend::platform_backend().close(mapping)?;
                self.mapping = None;
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Remove the name globally. Idempotent on already-unlinked names.
    ///
    /// Must be called by exactly one participant across all processes
    /// sharing this segment.
    pub fn unlink(&self) -> Result<(), ShmError> {
        let name = match self.mapping.as_ref() {
            Some(m) => m.name.clone(),
            None => return Ok(()),
        };
        backend::platform_backend().unlink(&name)
    }
}

impl Drop for SharedMemory {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
