//! Windows shared memory via `CreateFileMappingW`/`MapViewOfFile`.
//!
//! There is no separate unlink step on Windows: the kernel object is
//! reference-counted, and the name is released once the last handle to it
//! (in any process) is closed.

use std::ffi::c_void;

use windows::core::PCWSTR;
use windows::Win32::Foundation::{CloseHandle, GetLastError, ERROR_ALREADY_EXISTS, HANDLE};
use windows::Win32::System::Memory::{
    CreateFileMappingW, MapViewOfFile, OpenFileMappingW, UnmapViewOfFile, FILE_MAP_ALL_ACCESS,
    MEMORY_MAPPED_VIEW_ADDRESS, PAGE_READWRITE,
};

use super::{RawMapping, ShmBackend};
use crate::error::ShmError;

pub(crate) struct WindowsBackend;

/// How many freshly generated names to try before giving up with
/// [`ShmError::NameGeneration`]. Windows has no name-length limit like
/// macOS's `PSHMNAMLEN`, but `CreateFileMappingW` can still collide with a
/// mapping another process happens to hold open under the same name.
const GENERATED_NAME_ATTEMPTS: u32 = 8;

fn generate_name() -> String {
    format!("appose-{}", uuid::Uuid::new_v4().simple())
}

fn wide_name(name: &str) -> Vec<u16> {
    name.encode_utf16().chain(std::iter::once(0)).collect()
}

fn io_error_from_last() -> std::io::Error {
    std::io::Error::from_raw_os_error(unsafe { GetLastError().0 } as i32)
}

impl WindowsBackend {
    fn create_named(&self, requested: &str, size: u64) -> Result<RawMapping, ShmError> {
        let wide = wide_name(requested);

        let handle = unsafe {
            CreateFileMappingW(
                HANDLE(-1isize as *mut c_void),
                None,
                PAGE_READWRITE,
                (size >> 32) as u32,
                (size & 0xFFFF_FFFF) as u32,
                PCWSTR(wide.as_ptr()),
            )
        }
        .map_err(|_| ShmError::Io(io_error_from_last()))?;

        // CreateFileMappingW succeeds but reports ERROR_ALREADY_EXISTS when
        // a mapping of that name is already open elsewhere.
        if unsafe { GetLastError() } == ERROR_ALREADY_EXISTS {
            unsafe {
                let _ = CloseHandle(handle);
            }
            return Err(ShmError::Exists(requested.to_string()));
        }

        let view = unsafe { MapViewOfFile(handle, FILE_MAP_ALL_ACCESS, 0, 0, size as usize) };
        if view.Value.is_null() {
            let err = io_error_from_last();
            unsafe {
                let _ = CloseHandle(handle);
            }
            return Err(ShmError::Io(err));
        }

        Ok(RawMapping {
            name: requested.to_string(),
            size,
            ptr: view.Value as *mut u8,
            mapping_handle: handle.0 as isize,
        })
    }
}

impl ShmBackend for WindowsBackend {
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
        let wide = wide_name(name);
        let handle = unsafe { OpenFileMappingW(FILE_MAP_ALL_ACCESS.0, false, PCWSTR(wide.as_ptr())) }
            .map_err(|_| ShmError::NotFound(name.to_string()))?;

        let view = unsafe { MapViewOfFile(handle, FILE_MAP_ALL_ACCESS, 0, 0, size as usize) };
        if view.Value.is_null() {
            let err = io_error_from_last();
            unsafe {
                let _ = CloseHandle(handle);
            }
            return Err(ShmError::Io(err));
        }

        Ok(RawMapping {
            name: name.to_string(),
            size,
            ptr: view.Value as *mut u8,
            mapping_handle: handle.0 as isize,
        })
    }

    fn close(&self, mapping: &mut RawMapping) -> Result<(), ShmError> {
        if mapping.ptr.is_null() {
            return Ok(());
        }
        let view = MEMORY_MAPPED_VIEW_ADDRESS {
            Value: mapping.ptr as *mut c_void,
        };
        unsafe {
            let _ = UnmapViewOfFile(view);
            let _ = CloseHandle(HANDLE(mapping.mapping_handle as *mut c_void));
        }
        mapping.ptr = std::ptr::null_mut();
        Ok(())
    }

    fn unlink(&self, _name: &str) -> Result<(), ShmError> {
        // No explicit unlink on Windows; releasing the last handle (via
        // `close`) drops the name from the kernel's namespace.
        Ok(())
    }
}
