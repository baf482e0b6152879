// SPDX-License-Identifier: MIT OR Apache-2.0
//! appose
//!
//! Cooperative computation across language runtimes: spawn a worker
//! process, hand it scripts to run, and exchange values (including bulk
//! arrays over shared memory) with it over stdin/stdout.
//!
//! An [`Environment`] describes where a worker's interpreter lives;
//! [`Environment::service`] spawns it as a [`Service`]; [`Service::task`]
//! creates a [`Task`] for one script execution, which [`Task::start`]
//! launches and [`Task::wait_for`] (or [`Task::listen`]) observes through
//! to completion, cancellation, failure, or a worker crash.
#![warn(missing_docs)]

pub mod environment;
pub mod error;
pub mod service;
pub mod task;
pub mod values;

pub use appose_codec::Value;
pub use environment::Environment;
pub use error::{ServiceError, TaskError};
pub use service::Service;
pub use task::{ResponseType, Task, TaskEvent, TaskStatus};
pub use values::{attach_ndarray, attach_shm, ndarray_to_value, shm_to_value};
