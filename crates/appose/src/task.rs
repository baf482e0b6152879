//! A single script execution: state, listeners, outputs.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use appose_codec::Value;
use indexmap::IndexMap;
use tokio::sync::{mpsc, Notify};
use tracing::warn;
use uuid::Uuid;

use crate::error::TaskError;

/// A task's position in its state machine.
///
/// Transitions only in the order given in the module docs; once a task
/// reaches [`TaskStatus::Complete`], [`TaskStatus::Canceled`],
/// [`TaskStatus::Failed`], or [`TaskStatus::Crashed`], every field is
/// frozen and [`Task::wait_for`] returns immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Created, not yet started.
    Initial,
    /// `start()` has sent the `EXECUTE` request; awaiting `LAUNCH`.
    Queued,
    /// The worker has launched the script and may be emitting `UPDATE`s.
    Running,
    /// Finished successfully; `outputs` holds the result.
    Complete,
    /// Canceled cooperatively by the worker honoring a `CANCEL` request.
    Canceled,
    /// The script raised; `error` holds the worker's failure description.
    Failed,
    /// The worker process exited (or the stdout stream closed) while this
    /// task was still live.
    Crashed,
}

impl TaskStatus {
    /// True for any of the four terminal states.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Complete | TaskStatus::Canceled | TaskStatus::Failed | TaskStatus::Crashed
        )
    }
}

/// The kind of response a worker sent for a task, or a locally synthesized
/// crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    /// The worker has begun executing the script.
    Launch,
    /// A progress update (`message`/`current`/`maximum`, any subset).
    Update,
    /// The script returned normally.
    Completion,
    /// The script honored a cancel request.
    Cancelation,
    /// The script raised.
    Failure,
    /// Synthesized locally when the worker process exits (or stdout
    /// closes) with this task still live. Never sent by a worker.
    Crashed,
}

/// Delivered to every registered listener after a task's fields have been
/// updated for one response.
#[derive(Clone)]
pub struct TaskEvent {
    /// Which kind of response produced this event.
    pub response_type: ResponseType,
    /// The task, post-update.
    pub task: Arc<Task>,
}

type Listener = Arc<dyn Fn(&TaskEvent) + Send + Sync>;

struct Inner {
    status: TaskStatus,
    message: Option<String>,
    current: Option<i64>,
    maximum: Option<i64>,
    outputs: IndexMap<String, Value>,
    error: Option<String>,
    listeners: Vec<Listener>,
}

/// One script execution issued through a [`crate::Service`].
///
/// Identified by a UUID unique within its Service. Remains valid after
/// termination so results can be inspected; only responses that arrive
/// before a terminal transition change anything.
pub struct Task {
    uuid: Uuid,
    script: String,
    inputs: IndexMap<String, Value>,
    inner: Mutex<Inner>,
    notify: Notify,
    requests: mpsc::Sender<String>,
}

impl Task {
    pub(crate) fn new(
        uuid: Uuid,
        script: String,
        inputs: IndexMap<String, Value>,
        requests: mpsc::Sender<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            uuid,
            script,
            inputs,
            inner: Mutex::new(Inner {
                status: TaskStatus::Initial,
                message: None,
                current: None,
                maximum: None,
                outputs: IndexMap::new(),
                error: None,
                listeners: Vec::new(),
            }),
            notify: Notify::new(),
            requests,
        })
    }

    /// This task's identifier, unique within its owning Service.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// The script source this task executes.
    pub fn script(&self) -> &str {
        &self.script
    }

    /// The inputs bound when this task was created.
    pub fn inputs(&self) -> &IndexMap<String, Value> {
        &self.inputs
    }

    /// Current status.
    pub fn status(&self) -> TaskStatus {
        self.inner.lock().unwrap().status
    }

    /// Latest progress message, if any.
    pub fn message(&self) -> Option<String> {
        self.inner.lock().unwrap().message.clone()
    }

    /// Latest progress counter, if any.
    pub fn current(&self) -> Option<i64> {
        self.inner.lock().unwrap().current
    }

    /// Latest progress maximum, if any.
    pub fn maximum(&self) -> Option<i64> {
        self.inner.lock().unwrap().maximum
    }

    /// The outputs map. Empty until `COMPLETION`.
    pub fn outputs(&self) -> IndexMap<String, Value> {
        self.inner.lock().unwrap().outputs.clone()
    }

    /// The worker's failure description, set on `FAILED`/`CRASHED`.
    pub fn error(&self) -> Option<String> {
        self.inner.lock().unwrap().error.clone()
    }

    /// Register a listener for this task's events.
    ///
    /// # Errors
    ///
    /// [`TaskError::IllegalState`] if the task is already terminal —
    /// listeners may only be attached while the task is live, so that no
    /// caller can silently miss every event by registering too late.
    pub fn listen(
        &self,
        listener: impl Fn(&TaskEvent) + Send + Sync + 'static,
    ) -> Result<(), TaskError> {
        let mut guard = self.inner.lock().unwrap();
        if guard.status.is_terminal() {
            return Err(TaskError::IllegalState {
                status: guard.status,
            });
        }
        guard.listeners.push(Arc::new(listener));
        Ok(())
    }

    /// Transition to `Queued` and send the `EXECUTE` request.
    ///
    /// # Errors
    ///
    /// [`TaskError::IllegalState`] if the task is not in `Initial`.
    /// [`TaskError::ServiceClosed`] if the owning Service's stdin channel
    /// has already been closed.
    pub async fn start(self: &Arc<Self>) -> Result<(), TaskError> {
        {
            let mut guard = self.inner.lock().unwrap();
            if guard.status != TaskStatus::Initial {
                return Err(TaskError::IllegalState {
                    status: guard.status,
                });
            }
            guard.status = TaskStatus::Queued;
        }

        let request = Value::map([
            ("task".to_string(), Value::Str(self.uuid.to_string())),
            ("requestType".to_string(), Value::Str("EXECUTE".to_string())),
            ("script".to_string(), Value::Str(self.script.clone())),
            ("inputs".to_string(), Value::Map(self.inputs.clone())),
        ]);
        self.send(&request).await
    }

    /// Send a `CANCEL` request.
    ///
    /// Does not itself transition this task's state — the worker is
    /// expected to eventually answer with `CANCELATION` (or `COMPLETION`/
    /// `FAILURE`, if the script raced past the check). A no-op once the
    /// task is terminal; otherwise every call sends exactly one `CANCEL`
    /// line.
    pub async fn cancel(self: &Arc<Self>) -> Result<(), TaskError> {
        if self.status().is_terminal() {
            return Ok(());
        }
        let request = Value::map([
            ("task".to_string(), Value::Str(self.uuid.to_string())),
            ("requestType".to_string(), Value::Str("CANCEL".to_string())),
        ]);
        self.send(&request).await
    }

    async fn send(&self, request: &Value) -> Result<(), TaskError> {
        let line = appose_codec::encode(request).map_err(TaskError::Decode)?;
        self.requests
            .send(line)
            .await
            .map_err(|_| TaskError::ServiceClosed)
    }

    /// Block until this task reaches a terminal state, then return it.
    ///
    /// Reentrant-safe: any number of callers may await this concurrently.
    pub async fn wait_for(self: &Arc<Self>) -> Arc<Self> {
        loop {
            let notified = self.notify.notified();
            if self.status().is_terminal() {
                return Arc::clone(self);
            }
            notified.await;
        }
    }

    /// Apply one worker response (or a synthesized crash) to this task's
    /// state, then dispatch a [`TaskEvent`] to every listener in
    /// registration order. A listener panicking is caught and logged; it
    /// never interrupts dispatch to the remaining listeners.
    ///
    /// A response arriving after this task is already terminal is ignored,
    /// per the state machine's "terminal" row.
    pub(crate) fn apply_response(
        self: &Arc<Self>,
        kind: ResponseType,
        payload: Option<&IndexMap<String, Value>>,
    ) {
        let listeners = {
            let mut guard = self.inner.lock().unwrap();
            if guard.status.is_terminal() {
                return;
            }
            match kind {
                ResponseType::Launch => {
                    guard.status = TaskStatus::Running;
                }
                ResponseType::Update => {
                    if guard.status == TaskStatus::Queued {
                        guard.status = TaskStatus::Running;
                    }
                    if let Some(p) = payload {
                        if let Some(m) = p.get("message").and_then(Value::as_str) {
                            guard.message = Some(m.to_string());
                        }
                        if let Some(c) = p.get("current").and_then(Value::as_i64) {
                            guard.current = Some(c);
                        }
                        if let Some(m) = p.get("maximum").and_then(Value::as_i64) {
                            guard.maximum = Some(m);
                        }
                    }
                }
                ResponseType::Completion => {
                    guard.outputs = payload
                        .and_then(|p| p.get("outputs"))
                        .and_then(Value::as_map)
                        .cloned()
                        .unwrap_or_default();
                    guard.status = TaskStatus::Complete;
                }
                ResponseType::Cancelation => {
                    guard.status = TaskStatus::Canceled;
                }
                ResponseType::Failure | ResponseType::Crashed => {
                    guard.error = payload
                        .and_then(|p| p.get("error"))
                        .and_then(Value::as_str)
                        .map(|s| s.to_string());
                    guard.status = if kind == ResponseType::Failure {
                        TaskStatus::Failed
                    } else {
                        TaskStatus::Crashed
                    };
                }
            }
            guard.listeners.clone()
        };

        self.notify.notify_waiters();

        let event = TaskEvent {
            response_type: kind,
            task: Arc::clone(self),
        };
        for listener in &listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                warn!(target: "appose.task", task = %self.uuid, "listener panicked; continuing dispatch");
            }
        }
    }

    /// Mark this task `Crashed` with the given reason, as if a `FAILURE`
    /// response had arrived carrying it as `error`.
    pub(crate) fn crash(self: &Arc<Self>, reason: String) {
        let payload = IndexMap::from([("error".to_string(), Value::Str(reason))]);
        self.apply_response(ResponseType::Crashed, Some(&payload));
    }
}
