// SPDX-License-Identifier: MIT OR Apache-2.0
//! A running worker process and the multiplexed dispatch of its responses
//! across every concurrent [`Task`] it is executing.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use appose_codec::Value;
use indexmap::IndexMap;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, mpsc, Notify};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::environment::Environment;
use crate::error::ServiceError;
use crate::task::{ResponseType, Task};

/// How long [`Service::close`] waits for the worker to exit on its own
/// (after its stdin is closed) before force-killing it.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

const STDERR_BROADCAST_CAPACITY: usize = 256;

type TaskTable = Arc<Mutex<HashMap<Uuid, Arc<Task>>>>;

/// A spawned worker process, speaking the line-framed JSON protocol over
/// its stdin/stdout.
///
/// One `Service` multiplexes any number of concurrent [`Task`]s: every
/// request and response carries the task's UUID, and the stdout pump
/// dispatches each response line to the matching task. Dropping a
/// `Service` does not kill the worker — call [`close`](Self::close)
/// explicitly for an orderly (then forced, if needed) shutdown.
pub struct Service {
    child: Mutex<Option<Child>>,
    requests: mpsc::Sender<String>,
    tasks: TaskTable,
    stderr: broadcast::Sender<String>,
    shutdown: Arc<Notify>,
    closed: Arc<AtomicBool>,
}

impl Service {
    pub(crate) async fn spawn(
        env: &Environment,
        program: &Path,
        args: &[String],
        path_env: &str,
    ) -> Result<Self, ServiceError> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(env.base())
            .env("PATH", path_env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (k, v) in env.env_vars() {
            cmd.env(k, v);
        }

        let mut child = cmd.spawn().map_err(ServiceError::Spawn)?;
        let stdin = child.stdin.take().ok_or(ServiceError::Stdio)?;
        let stdout = child.stdout.take().ok_or(ServiceError::Stdio)?;
        let stderr = child.stderr.take().ok_or(ServiceError::Stdio)?;

        let (stderr_tx, _) = broadcast::channel(STDERR_BROADCAST_CAPACITY);
        let stderr_tx_pump = stderr_tx.clone();
        tokio::spawn(async move {
            let mut r = BufReader::new(stderr);
            let mut line = String::new();
            loop {
                line.clear();
                match r.read_line(&mut line).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        let s = line.trim_end().to_string();
                        if !s.is_empty() {
                            warn!(target: "appose.stderr", "{s}");
                            let _ = stderr_tx_pump.send(s);
                        }
                    }
                }
            }
        });

        let (tx, mut rx) = mpsc::channel::<String>(256);
        let shutdown = Arc::new(Notify::new());
        let shutdown_writer = Arc::clone(&shutdown);
        tokio::spawn(async move {
            let mut stdin = stdin;
            loop {
                tokio::select! {
                    _ = shutdown_writer.notified() => break,
                    maybe_line = rx.recv() => {
                        match maybe_line {
                            Some(line) => {
                                if stdin.write_all(line.as_bytes()).await.is_err() {
                                    break;
                                }
                                if stdin.flush().await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                }
            }
            // stdin dropped here, delivering EOF to the worker.
        });

        let tasks: TaskTable = Arc::new(Mutex::new(HashMap::new()));
        let reader_tasks = Arc::clone(&tasks);
        let closed = Arc::new(AtomicBool::new(false));
        let reader_closed = Arc::clone(&closed);
        tokio::spawn(async move {
            let mut r = BufReader::new(stdout);
            let mut line = String::new();
            loop {
                line.clear();
                match r.read_line(&mut line).await {
                    Ok(0) => break,
                    Err(e) => {
                        warn!(target: "appose.service", "stdout read error: {e}");
                        break;
                    }
                    Ok(_) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        dispatch(&reader_tasks, &line);
                    }
                }
            }
            // The worker is gone: no new task could ever complete, so the
            // Service is closed from here on, same as an explicit close().
            reader_closed.store(true, Ordering::SeqCst);
            crash_all(&reader_tasks, "worker process exited".to_string());
        });

        Ok(Self {
            child: Mutex::new(Some(child)),
            requests: tx,
            tasks,
            stderr: stderr_tx,
            shutdown,
            closed,
        })
    }

    /// Create a new task bound to `script`/`inputs`. Starts in
    /// [`crate::TaskStatus::Initial`] — call [`Task::start`] to run it.
    ///
    /// # Errors
    ///
    /// [`ServiceError::AlreadyClosed`] once [`close`](Self::close) has been
    /// called — a closed Service fails fast rather than accepting work it
    /// has no worker left to run.
    pub fn task(
        &self,
        script: impl Into<String>,
        inputs: Option<IndexMap<String, Value>>,
    ) -> Result<Arc<Task>, ServiceError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ServiceError::AlreadyClosed);
        }
        let uuid = Uuid::new_v4();
        let task = Task::new(
            uuid,
            script.into(),
            inputs.unwrap_or_default(),
            self.requests.clone(),
        );
        self.tasks.lock().unwrap().insert(uuid, Arc::clone(&task));
        debug!(target: "appose.service", task = %uuid, "task created");
        Ok(task)
    }

    /// Subscribe to raw stderr lines forwarded from the worker process, in
    /// addition to the `tracing::warn!` logging every line already
    /// receives.
    pub fn subscribe_stderr(&self) -> broadcast::Receiver<String> {
        self.stderr.subscribe()
    }

    /// Request an orderly shutdown.
    ///
    /// Closes the stdin pipe (the worker observes this as EOF), waits up
    /// to [`CLOSE_GRACE`] for the process to exit on its own, then
    /// force-kills it. Idempotent: calling `close` more than once is a
    /// no-op after the first call returns.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        // Dropping our own sender clone wouldn't close the channel — every
        // Task holds one too — so the writer pump is told directly instead.
        self.shutdown.notify_waiters();

        let child = self.child.lock().unwrap().take();
        let Some(mut child) = child else {
            return;
        };
        match tokio::time::timeout(CLOSE_GRACE, child.wait()).await {
            Ok(_) => {}
            Err(_) => {
                warn!(target: "appose.service", "worker did not exit within grace period; killing");
                let _ = child.start_kill();
                let _ = child.wait().await;
            }
        }
    }
}

fn dispatch(tasks: &TaskTable, line: &str) {
    let value = match appose_codec::decode(line) {
        Ok(v) => v,
        Err(e) => {
            warn!(target: "appose.service", "malformed response line: {e}");
            return;
        }
    };
    let map = match value.as_map() {
        Some(m) => m,
        None => {
            warn!(target: "appose.service", "response line was not a JSON object");
            return;
        }
    };
    let task_id = match map
        .get("task")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
    {
        Some(id) => id,
        None => {
            warn!(target: "appose.service", "response line missing valid 'task' field");
            return;
        }
    };
    let response_type = match map.get("responseType").and_then(Value::as_str) {
        Some("LAUNCH") => ResponseType::Launch,
        Some("UPDATE") => ResponseType::Update,
        Some("COMPLETION") => ResponseType::Completion,
        Some("CANCELATION") => ResponseType::Cancelation,
        Some("FAILURE") => ResponseType::Failure,
        Some(other) => {
            warn!(target: "appose.service", task = %task_id, "unknown responseType: {other}");
            return;
        }
        None => {
            warn!(target: "appose.service", task = %task_id, "response line missing 'responseType'");
            return;
        }
    };

    let task = { tasks.lock().unwrap().get(&task_id).cloned() };
    match task {
        Some(task) => task.apply_response(response_type, Some(map)),
        None => warn!(target: "appose.service", task = %task_id, "response for unknown task"),
    }
}

fn crash_all(tasks: &TaskTable, reason: String) {
    let snapshot: Vec<_> = tasks.lock().unwrap().values().cloned().collect();
    for task in snapshot {
        task.crash(reason.clone());
    }
}
