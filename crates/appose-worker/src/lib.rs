// SPDX-License-Identifier: MIT OR Apache-2.0
//! appose-worker
//!
//! Worker-side helpers for implementing the Appose stdio protocol in Rust:
//! a [`WorkerHandler`] trait and a [`run_worker_loop`] driver that reads
//! `EXECUTE`/`CANCEL` requests from stdin, dispatches each to the handler
//! as a concurrent task, and writes `LAUNCH`/`UPDATE`/`COMPLETION`/
//! `FAILURE`/`CANCELATION` responses to stdout.
//!
//! A conforming worker is usually a script in another language (see
//! `tests/fixtures/mock_worker.py` in the workspace root); this crate lets
//! a Rust program be one too, which is handy for Rust-to-Rust Appose
//! deployments and as a cheap in-process conformance double in tests.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod handle;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use appose_codec::Value;
use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

pub use error::WorkerError;
pub use handle::TaskHandle;

/// Implemented by a Rust program acting as an Appose worker.
///
/// [`run_worker_loop`] spawns one call to `execute` per `EXECUTE` request,
/// running concurrently with any other in-flight tasks.
#[async_trait]
pub trait WorkerHandler: Send + Sync + 'static {
    /// Run `script` with the given `inputs`, reporting progress and
    /// cancellation through `task`.
    ///
    /// A returned `Value::Map` is merged into the task's outputs; any
    /// other non-null value is stored under the key `"result"`; `None`
    /// leaves outputs as whatever `task.outputs` already holds. Returning
    /// `Err` produces a `FAILURE` response; calling
    /// [`TaskHandle::fail`](handle::TaskHandle::fail) beforehand has the
    /// same effect regardless of what is ultimately returned.
    async fn execute(
        &self,
        script: &str,
        inputs: IndexMap<String, Value>,
        task: TaskHandle,
    ) -> Result<Option<Value>, String>;
}

type HandleTable = Arc<Mutex<HashMap<Uuid, TaskHandle>>>;

/// Drive the Appose worker protocol over `reader`/`writer`, dispatching
/// every `EXECUTE` request to `handler` and every `CANCEL` request to the
/// matching in-flight task.
///
/// Returns once `reader` reaches EOF and every dispatched task has
/// finished responding. Malformed or unroutable request lines are logged
/// via `tracing::warn!` and otherwise ignored; they never stop the loop.
pub async fn run_worker_loop<H, R, W>(handler: H, reader: R, writer: W) -> Result<(), WorkerError>
where
    H: WorkerHandler,
    R: tokio::io::AsyncRead + Send + Unpin,
    W: tokio::io::AsyncWrite + Send + Unpin + 'static,
{
    let handler = Arc::new(handler);
    let (resp_tx, mut resp_rx) = mpsc::unbounded_channel::<String>();

    let writer_task = tokio::spawn(async move {
        let mut writer = writer;
        while let Some(line) = resp_rx.recv().await {
            if writer.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            if writer.flush().await.is_err() {
                break;
            }
        }
    });

    let handles: HandleTable = Arc::new(Mutex::new(HashMap::new()));
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    let mut dispatched = Vec::new();

    loop {
        line.clear();
        let n = reader.read_line(&mut line).await.map_err(WorkerError::Io)?;
        if n == 0 {
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let value = match appose_codec::decode(trimmed) {
            Ok(v) => v,
            Err(e) => {
                warn!(target: "appose.worker", "malformed request line: {e}");
                continue;
            }
        };
        let map = match value.as_map() {
            Some(m) => m,
            None => {
                warn!(target: "appose.worker", "request line was not a JSON object");
                continue;
            }
        };
        let task_id = match map
            .get("task")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
        {
            Some(id) => id,
            None => {
                warn!(target: "appose.worker", "request line missing valid 'task' field");
                continue;
            }
        };

        match map.get("requestType").and_then(Value::as_str) {
            Some("EXECUTE") => {
                let script = match map.get("script").and_then(Value::as_str) {
                    Some(s) => s.to_string(),
                    None => {
                        warn!(target: "appose.worker", task = %task_id, "EXECUTE missing 'script'");
                        continue;
                    }
                };
                let inputs = map
                    .get("inputs")
                    .and_then(Value::as_map)
                    .cloned()
                    .unwrap_or_default();

                let handle = TaskHandle::new(task_id, resp_tx.clone());
                handles.lock().unwrap().insert(task_id, handle.clone());

                let handler = Arc::clone(&handler);
                let resp_tx = resp_tx.clone();
                let handles = Arc::clone(&handles);
                dispatched.push(tokio::spawn(async move {
                    emit(&resp_tx, launch_response(task_id));
                    let result = handler.execute(&script, inputs, handle.clone()).await;
                    let response = finalize(task_id, &handle, result);
                    emit(&resp_tx, response);
                    handles.lock().unwrap().remove(&task_id);
                }));
            }
            Some("CANCEL") => {
                if let Some(handle) = handles.lock().unwrap().get(&task_id) {
                    handle.mark_cancel_requested();
                }
            }
            Some(other) => {
                warn!(target: "appose.worker", task = %task_id, "unknown requestType: {other}");
            }
            None => {
                warn!(target: "appose.worker", task = %task_id, "request missing 'requestType'");
            }
        }
    }

    for task in dispatched {
        let _ = task.await;
    }
    drop(resp_tx);
    let _ = writer_task.await;
    Ok(())
}

fn finalize(task_id: Uuid, handle: &TaskHandle, result: Result<Option<Value>, String>) -> Value {
    if let Some(err) = handle.take_failure() {
        return failure_response(task_id, err);
    }
    match result {
        Err(err) => failure_response(task_id, err),
        Ok(value) => {
            if handle.cancel_requested() {
                return cancelation_response(task_id);
            }
            let mut outputs = handle.outputs.lock().unwrap().clone();
            match value {
                Some(Value::Map(m)) => outputs.extend(m),
                Some(other) => {
                    outputs.insert("result".to_string(), other);
                }
                None => {}
            }
            completion_response(task_id, outputs)
        }
    }
}

fn launch_response(task_id: Uuid) -> Value {
    Value::map([
        ("task".to_string(), Value::Str(task_id.to_string())),
        ("responseType".to_string(), Value::Str("LAUNCH".to_string())),
    ])
}

fn completion_response(task_id: Uuid, outputs: IndexMap<String, Value>) -> Value {
    Value::map([
        ("task".to_string(), Value::Str(task_id.to_string())),
        (
            "responseType".to_string(),
            Value::Str("COMPLETION".to_string()),
        ),
        ("outputs".to_string(), Value::Map(outputs)),
    ])
}

fn cancelation_response(task_id: Uuid) -> Value {
    Value::map([
        ("task".to_string(), Value::Str(task_id.to_string())),
        (
            "responseType".to_string(),
            Value::Str("CANCELATION".to_string()),
        ),
    ])
}

fn failure_response(task_id: Uuid, error: String) -> Value {
    Value::map([
        ("task".to_string(), Value::Str(task_id.to_string())),
        (
            "responseType".to_string(),
            Value::Str("FAILURE".to_string()),
        ),
        ("error".to_string(), Value::Str(error)),
    ])
}

fn emit(sender: &mpsc::UnboundedSender<String>, value: Value) {
    match appose_codec::encode(&value) {
        Ok(line) => {
            let _ = sender.send(line);
        }
        Err(e) => warn!(target: "appose.worker", "failed to encode response: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn request(task: Uuid, fields: impl IntoIterator<Item = (String, Value)>) -> String {
        let mut map = IndexMap::new();
        map.insert("task".to_string(), Value::Str(task.to_string()));
        for (k, v) in fields {
            map.insert(k, v);
        }
        appose_codec::encode(&Value::Map(map)).unwrap()
    }

    async fn drain_lines(mut r: tokio::io::DuplexStream) -> Vec<Value> {
        let mut buf = Vec::new();
        r.read_to_end(&mut buf).await.unwrap();
        let text = String::from_utf8(buf).unwrap();
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| appose_codec::decode(l).unwrap())
            .collect()
    }

    fn response_type(v: &Value) -> &str {
        v.as_map()
            .and_then(|m| m.get("responseType"))
            .and_then(Value::as_str)
            .unwrap()
    }

    struct Echo;

    #[async_trait]
    impl WorkerHandler for Echo {
        async fn execute(
            &self,
            script: &str,
            _inputs: IndexMap<String, Value>,
            _task: TaskHandle,
        ) -> Result<Option<Value>, String> {
            Ok(Some(Value::Str(script.to_string())))
        }
    }

    struct Failing;

    #[async_trait]
    impl WorkerHandler for Failing {
        async fn execute(
            &self,
            _script: &str,
            _inputs: IndexMap<String, Value>,
            _task: TaskHandle,
        ) -> Result<Option<Value>, String> {
            Err("intentional failure".into())
        }
    }

    struct ChecksCancel;

    #[async_trait]
    impl WorkerHandler for ChecksCancel {
        async fn execute(
            &self,
            _script: &str,
            _inputs: IndexMap<String, Value>,
            task: TaskHandle,
        ) -> Result<Option<Value>, String> {
            while !task.cancel_requested() {
                tokio::task::yield_now().await;
            }
            Ok(None)
        }
    }

    #[tokio::test]
    async fn execute_emits_launch_then_completion() {
        let task_id = Uuid::new_v4();
        let input = request(
            task_id,
            [
                ("requestType".to_string(), Value::Str("EXECUTE".to_string())),
                ("script".to_string(), Value::Str("1 + 1".to_string())),
                ("inputs".to_string(), Value::Map(IndexMap::new())),
            ],
        );
        let (w, r) = tokio::io::duplex(4096);
        run_worker_loop(Echo, input.as_bytes(), w).await.unwrap();

        let responses = drain_lines(r).await;
        assert_eq!(responses.len(), 2);
        assert_eq!(response_type(&responses[0]), "LAUNCH");
        assert_eq!(response_type(&responses[1]), "COMPLETION");
        let outputs = responses[1].as_map().unwrap().get("outputs").unwrap();
        assert_eq!(
            outputs.as_map().unwrap().get("result"),
            Some(&Value::Str("1 + 1".to_string()))
        );
    }

    #[tokio::test]
    async fn failing_handler_emits_failure() {
        let task_id = Uuid::new_v4();
        let input = request(
            task_id,
            [
                ("requestType".to_string(), Value::Str("EXECUTE".to_string())),
                ("script".to_string(), Value::Str("boom".to_string())),
                ("inputs".to_string(), Value::Map(IndexMap::new())),
            ],
        );
        let (w, r) = tokio::io::duplex(4096);
        run_worker_loop(Failing, input.as_bytes(), w).await.unwrap();

        let responses = drain_lines(r).await;
        assert_eq!(response_type(&responses[1]), "FAILURE");
        assert_eq!(
            responses[1].as_map().unwrap().get("error"),
            Some(&Value::Str("intentional failure".to_string()))
        );
    }

    #[tokio::test]
    async fn cancel_before_return_yields_cancelation() {
        let task_id = Uuid::new_v4();
        let execute = request(
            task_id,
            [
                ("requestType".to_string(), Value::Str("EXECUTE".to_string())),
                ("script".to_string(), Value::Str("loop".to_string())),
                ("inputs".to_string(), Value::Map(IndexMap::new())),
            ],
        );
        let cancel = request(
            task_id,
            [("requestType".to_string(), Value::Str("CANCEL".to_string()))],
        );
        let input = format!("{execute}{cancel}");
        let (w, r) = tokio::io::duplex(4096);
        run_worker_loop(ChecksCancel, input.as_bytes(), w)
            .await
            .unwrap();

        let responses = drain_lines(r).await;
        assert_eq!(response_type(&responses[1]), "CANCELATION");
    }

    #[tokio::test]
    async fn task_handle_update_emits_update_response() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = TaskHandle::new(Uuid::new_v4(), tx);
        handle.update(Some("halfway".to_string()), Some(5), Some(10));

        let line = rx.try_recv().unwrap();
        let value = appose_codec::decode(&line).unwrap();
        assert_eq!(response_type(&value), "UPDATE");
        let map = value.as_map().unwrap();
        assert_eq!(map.get("message"), Some(&Value::Str("halfway".to_string())));
        assert_eq!(map.get("current"), Some(&Value::Int(5)));
        assert_eq!(map.get("maximum"), Some(&Value::Int(10)));
    }

    #[tokio::test]
    async fn unknown_request_type_is_ignored_not_fatal() {
        let task_id = Uuid::new_v4();
        let input = request(
            task_id,
            [("requestType".to_string(), Value::Str("PING".to_string()))],
        );
        let (w, r) = tokio::io::duplex(4096);
        run_worker_loop(Echo, input.as_bytes(), w).await.unwrap();
        assert!(drain_lines(r).await.is_empty());
    }
}
