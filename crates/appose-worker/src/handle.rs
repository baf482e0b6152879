// SPDX-License-Identifier: MIT OR Apache-2.0
//! A handle a [`crate::WorkerHandler`] uses to report progress and results
//! for one in-flight task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use appose_codec::Value;
use indexmap::IndexMap;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Passed to [`crate::WorkerHandler::execute`] for one task.
///
/// Cheaply cloneable; a handler may stash a clone and keep calling
/// [`update`](Self::update) from a spawned task after `execute` itself
/// returns, as long as the clone stays alive.
#[derive(Clone)]
pub struct TaskHandle {
    uuid: Uuid,
    responses: mpsc::UnboundedSender<String>,
    cancel_requested: Arc<AtomicBool>,
    failed: Arc<Mutex<Option<String>>>,
    /// Accumulated output values, merged into the `COMPLETION` response's
    /// `outputs` field. A handler may populate this directly instead of
    /// (or in addition to) returning a `Value::Map` from `execute`.
    pub outputs: Arc<Mutex<IndexMap<String, Value>>>,
}

impl TaskHandle {
    pub(crate) fn new(uuid: Uuid, responses: mpsc::UnboundedSender<String>) -> Self {
        Self {
            uuid,
            responses,
            cancel_requested: Arc::new(AtomicBool::new(false)),
            failed: Arc::new(Mutex::new(None)),
            outputs: Arc::new(Mutex::new(IndexMap::new())),
        }
    }

    /// This task's identifier.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Emit an `UPDATE` response. Any subset of the three fields may be
    /// `None`.
    pub fn update(&self, message: Option<String>, current: Option<i64>, maximum: Option<i64>) {
        let mut map = IndexMap::new();
        map.insert("task".to_string(), Value::Str(self.uuid.to_string()));
        map.insert(
            "responseType".to_string(),
            Value::Str("UPDATE".to_string()),
        );
        if let Some(m) = message {
            map.insert("message".to_string(), Value::Str(m));
        }
        if let Some(c) = current {
            map.insert("current".to_string(), Value::Int(c));
        }
        if let Some(m) = maximum {
            map.insert("maximum".to_string(), Value::Int(m));
        }
        self.emit(Value::Map(map));
    }

    /// Whether a `CANCEL` request has arrived for this task. A
    /// cooperative handler should poll this periodically and return
    /// early once it turns `true`.
    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    /// Record a failure. If called before `execute` returns `Ok`, the
    /// loop emits `FAILURE` with this reason instead of `COMPLETION`,
    /// regardless of what `execute` returns.
    pub fn fail(&self, error: impl Into<String>) {
        *self.failed.lock().unwrap() = Some(error.into());
    }

    pub(crate) fn mark_cancel_requested(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
    }

    pub(crate) fn take_failure(&self) -> Option<String> {
        self.failed.lock().unwrap().take()
    }

    fn emit(&self, value: Value) {
        if let Ok(line) = appose_codec::encode(&value) {
            let _ = self.responses.send(line);
        }
    }
}
