//! appose-codec
//!
//! Encodes and decodes the value tree that rides over the Appose worker
//! protocol: plain JSON, plus two sentinel object shapes
//! (`{"appose_type":"shm",...}` and `{"appose_type":"ndarray",...}`) that
//! carry shared-memory and ndarray references across the wire without
//! copying bulk numeric data through the pipe itself.
//!
//! This crate is deliberately platform-independent: it knows nothing about
//! `shm_open`/`mmap`/`CreateFileMapping`. [`ShmRef`] and [`NDArrayRef`] are
//! thin descriptors (name + size, dtype + shape + shm); attaching them to a
//! real mapped segment is the job of the `appose-shm` crate, one layer up.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod dtype;
mod error;
mod value;

pub use codec::{decode, encode};
pub use dtype::{DType, MemoryOrder};
pub use error::CodecError;
pub use value::{NDArrayRef, ShmRef, Value};
