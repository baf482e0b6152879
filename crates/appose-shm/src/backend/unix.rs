//! POSIX (`shm_open`/`ftruncate`/`mmap`) shared memory.
//!
//! Names begin with `/`. On macOS, `shm_open` enforces a name-length limit
//! (`PSHMNAMLEN`, 30 bytes after the leading slash) that Linux does not; an
//! explicit name over that limit is rejected with `ShmError::NameTooLong`
//! rather than silently truncated, and auto-generated names are kept short
//! enough to always fit. We follow the spec's instruction to attach instead
//! of recreate when a `create` collides with an existing segment of the
//! same size on Darwin.

use std::ffi::CString;
use std::io;
use std::ptr;

use super::{RawMapping, ShmBackend};
use crate::error::ShmError;

#[cfg(target_os = "macos")]
const PSHMNAMLEN: usize = 30;

/// How many freshly generated names to try before giving up with
/// [`ShmError::NameGeneration`].
const GENERATED_NAME_ATTEMPTS: u32 = 8;

/// A random name short enough to fit under every supported platform's
/// length limit, including macOS's 30-byte `PSHMNAMLEN`.
fn generate_name() -> String {
    format!("/appose-{:016x}", uuid::Uuid::new_v4().as_u128() as u64)
}

pub(crate) struct PosixBackend;

impl PosixBackend {
    fn open_name(&self, name: &str, flags: libc::c_int) -> io::Result<libc::c_int> {
        let c_name = CString::new(name).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let fd = unsafe { libc::shm_open(c_name.as_ptr(), flags, 0o600) };
        if fd < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(fd)
        }
    }

    fn map(&self, fd: libc::c_int, size: u64) -> io::Result<*mut u8> {
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size as usize,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            Err(io::Error::last_os_error())
        } else {
            Ok(ptr as *mut u8)
        }
    }
}

#[cfg(target_os = "macos")]
fn platform_name(name: &str) -> Result<String, ShmError> {
    if let Some(rest) = name.strip_prefix('/') {
        if rest.len() > PSHMNAMLEN {
            return Err(ShmError::NameTooLong {
                name: name.to_string(),
                len: rest.len(),
                limit: PSHMNAMLEN,
            });
        }
    }
    Ok(name.to_string())
}

#[cfg(not(target_os = "macos"))]
fn platform_name(name: &str) -> Result<String, ShmError> {
    Ok(name.to_string())
}

impl PosixBackend {
    fn create_named(&self, requested: &str, size: u64) -> Result<RawMapping, ShmError> {
        let requested = requested.to_string();
        let name = platform_name(&requested)?;

        let create_flags = libc::O_CREAT | libc::O_EXCL | libc::O_RDWR;
        let fd = match self.open_name(&name, create_flags) {
            Ok(fd) => fd,
            Err(e) if e.raw_os_error() == Some(libc::EEXIST) => {
                #[cfg(target_os = "macos")]
                {
                    // Darwin: if an existing segment already matches the
                    // requested size, attach to it rather than failing.
                    let existing_fd = self
                        .open_name(&name, libc::O_RDWR)
                        .map_err(ShmError::Io)?;
                    let existing_size = fstat_size(existing_fd).map_err(ShmError::Io)?;
                    if existing_size == size {
                        let ptr = self.map(existing_fd, size).map_err(ShmError::Io)?;
                        return Ok(RawMapping {
                            name,
                            size,
                            ptr,
                            fd: existing_fd,
                        });
                    }
                    unsafe {
                        libc::close(existing_fd);
                    }
                    return Err(ShmError::Exists(name));
                }
                #[cfg(not(target_os = "macos"))]
                {
                    return Err(ShmError::Exists(name));
                }
            }
            Err(e) => return Err(ShmError::Io(e)),
        };

        if unsafe { libc::ftruncate(fd, size as libc::off_t) } != 0 {
            let err = io::Error::last_os_error();
            unsafe {
                libc::close(fd);
                let c_name = CString::new(name).ok();
                if let Some(c_name) = c_name {
                    libc::shm_unlink(c_name.as_ptr());
                }
            }
            return Err(ShmError::Io(err));
        }

        let ptr = match self.map(fd, size) {
            Ok(ptr) => ptr,
            Err(e) => {
                unsafe {
                    libc::close(fd);
                }
                return Err(ShmError::Io(e));
            }
        };

        Ok(RawMapping {
            name: requested_name_or(name, requested),
            size,
            ptr,
            fd,
        })
    }
}

impl ShmBackend for PosixBackend {
    fn create(&self, name: Option<&str>, size: u64) -> Result<RawMapping, ShmError> {
        match name {
            Some(n) => self.create_named(n, size),
            None => {
                for _ in 0..GENERATED_NAME_ATTEMPTS {
                    match self.create_named(&generate_name(), size) {
                        Ok(mapping) => return Ok(mapping),
                        Err(ShmError::Exists(_)) => continue,
                        Err(e) => return Err(e),
                    }
                }
                Err(ShmError::NameGeneration {
                    attempts: GENERATED_NAME_ATTEMPTS,
                })
            }
        }
    }

    fn attach(&self, name: &str, size: u64) -> Result<RawMapping, ShmError> {
        let platform = platform_name(name)?;
        let fd = match self.open_name(&platform, libc::O_RDWR) {
            Ok(fd) => fd,
            Err(e) if e.raw_os_error() == Some(libc::ENOENT) => {
                return Err(ShmError::NotFound(name.to_string()));
            }
            Err(e) => return Err(ShmError::Io(e)),
        };
        let ptr = match self.map(fd, size) {
            Ok(ptr) => ptr,
            Err(e) => {
                unsafe {
                    libc::close(fd);
                }
                return Err(ShmError::Io(e));
            }
        };
        Ok(RawMapping {
            name: name.to_string(),
            size,
            ptr,
            fd,
        })
    }

    fn close(&self, mapping: &mut RawMapping) -> Result<(), ShmError> {
        if mapping.ptr.is_null() {
            return Ok(());
        }
        let rc = unsafe { libc::munmap(mapping.ptr as *mut libc::c_void, mapping.size as usize) };
        unsafe {
            libc::close(mapping.fd);
        }
        mapping.ptr = ptr::null_mut();
        if rc != 0 {
            return Err(ShmError::Io(io::Error::last_os_error()));
        }
        Ok(())
    }

    fn unlink(&self, name: &str) -> Result<(), ShmError> {
        let platform = platform_name(name)?;
        let c_name = CString::new(platform.clone())
            .map_err(|e| ShmError::Io(io::Error::new(io::ErrorKind::InvalidInput, e)))?;
        let rc = unsafe { libc::shm_unlink(c_name.as_ptr()) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ENOENT) {
                return Ok(());
            }
            return Err(ShmError::Io(err));
        }
        Ok(())
    }
}

/// Prefer the caller's originally requested name over the (possibly
/// macOS-truncated) platform name, so `SharedMemory::name()` reflects what
/// was asked for whenever that's still a valid handle for future attaches.
#[cfg(target_os = "macos")]
fn requested_name_or(_platform: String, requested: String) -> String {
    requested
}

#[cfg(not(target_os = "macos"))]
fn requested_name_or(platform: String, _requested: String) -> String {
    platform
}

#[cfg(target_os = "macos")]
fn fstat_size(fd: libc::c_int) -> io::Result<u64> {
    use std::mem::MaybeUninit;
    let mut stat = MaybeUninit::<libc::stat>::uninit();
    let rc = unsafe { libc::fstat(fd, stat.as_mut_ptr()) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    let stat = unsafe { stat.assume_init() };
    Ok(stat.st_size as u64)
}
