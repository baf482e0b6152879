// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end lifecycle tests against the Python reference worker.
//!
//! A `require_python!` macro skips the whole test if no interpreter is on
//! `PATH`, so CI without Python degrades gracefully instead of failing.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use appose::{Environment, ResponseType, TaskStatus};
use appose_codec::Value;
use appose_shm::{DType, MemoryOrder, NDArray};
use indexmap::IndexMap;

fn mock_worker_path() -> String {
    let manifest = std::path::Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest
        .join("tests")
        .join("fixtures")
        .join("mock_worker.py")
        .to_string_lossy()
        .into_owned()
}

fn python_cmd() -> Option<String> {
    for cmd in &["python3", "python"] {
        if std::process::Command::new(cmd)
            .arg("--version")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .is_ok()
        {
            return Some(cmd.to_string());
        }
    }
    None
}

macro_rules! require_python {
    () => {
        match python_cmd() {
            Some(cmd) => cmd,
            None => {
                eprintln!("SKIP: python not found");
                return;
            }
        }
    };
}

async fn spawn_worker(py: &str) -> appose::Service {
    let env = Environment::new(
        std::env::temp_dir(),
        Vec::new(),
        Vec::new(),
        BTreeMap::new(),
    );
    env.service(vec![py.to_string(), mock_worker_path()])
        .await
        .expect("worker should spawn")
}

// ---------------------------------------------------------------------------
// 1. Arithmetic
// ---------------------------------------------------------------------------

#[tokio::test]
async fn arithmetic_completes_with_no_updates() {
    let py = require_python!();
    let service = spawn_worker(&py).await;

    let task = service
        .task("5 + 6", None)
        .expect("task should be accepted");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_listener = Arc::clone(&seen);
    task.listen(move |event| seen_listener.lock().unwrap().push(event.response_type))
        .unwrap();

    task.start().await.unwrap();
    let done = tokio::time::timeout(Duration::from_secs(10), task.wait_for())
        .await
        .expect("task should complete within timeout");

    assert_eq!(done.status(), TaskStatus::Complete);
    assert_eq!(done.outputs().get("result"), Some(&Value::Int(11)));

    let events = seen.lock().unwrap();
    assert!(
        !events
            .iter()
            .take_while(|r| **r != ResponseType::Completion)
            .any(|r| *r == ResponseType::Update),
        "no UPDATE should precede COMPLETION"
    );

    service.close().await;
}

// ---------------------------------------------------------------------------
// 2. Progress (Collatz stopping time for 9999)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn collatz_progress_emits_one_update_per_step() {
    let py = require_python!();
    let service = spawn_worker(&py).await;

    let script = r#"
n = 9999
i = 0
while n != 1:
    n = n // 2 if n % 2 == 0 else 3 * n + 1
    i += 1
    task.update(f"[{i}] -> {n}", i, None)
task.outputs['result'] = i
"#;
    let task = service.task(script, None).expect("task should be accepted");

    let events = Arc::new(Mutex::new(Vec::new()));
    let events_listener = Arc::clone(&events);
    task.listen(move |event| events_listener.lock().unwrap().push(event.response_type))
        .unwrap();

    task.start().await.unwrap();
    let done = tokio::time::timeout(Duration::from_secs(10), task.wait_for())
        .await
        .expect("task should complete within timeout");

    assert_eq!(done.status(), TaskStatus::Complete);
    assert_eq!(done.outputs().get("result"), Some(&Value::Int(91)));

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 93, "1 LAUNCH + 91 UPDATE + 1 COMPLETION");
    assert_eq!(events[0], ResponseType::Launch);
    assert_eq!(events[events.len() - 1], ResponseType::Completion);
    assert_eq!(
        events[1..events.len() - 1]
            .iter()
            .filter(|r| **r == ResponseType::Update)
            .count(),
        91
    );

    service.close().await;
}

// ---------------------------------------------------------------------------
// 3. Cancelation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_stops_an_infinite_loop() {
    let py = require_python!();
    let service = spawn_worker(&py).await;

    let script = "import time\nwhile not task.cancel_requested():\n    time.sleep(0.01)\n";
    let task = service.task(script, None).expect("task should be accepted");

    task.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    task.cancel().await.unwrap();

    let done = tokio::time::timeout(Duration::from_secs(10), task.wait_for())
        .await
        .expect("task should reach a terminal state within timeout");

    assert_eq!(done.status(), TaskStatus::Canceled);

    service.close().await;
}

// ---------------------------------------------------------------------------
// 4. Failure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn raising_script_fails_with_stack_trace() {
    let py = require_python!();
    let service = spawn_worker(&py).await;

    let task = service
        .task("raise ValueError('boom')", None)
        .expect("task should be accepted");

    task.start().await.unwrap();
    let done = tokio::time::timeout(Duration::from_secs(10), task.wait_for())
        .await
        .expect("task should fail within timeout");

    assert_eq!(done.status(), TaskStatus::Failed);
    let error = done.error().expect("failure carries an error description");
    assert!(error.contains("ValueError"));
    assert!(error.contains("boom"));

    service.close().await;
}

// ---------------------------------------------------------------------------
// 5. NDArray echo
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ndarray_echo_increments_every_element_in_place() {
    let py = require_python!();
    let service = spawn_worker(&py).await;

    let shape = vec![2u64, 20, 25];
    let mut nd = NDArray::create(DType::Float32, shape.clone(), MemoryOrder::COrder).unwrap();
    let count = shape.iter().product::<u64>() as usize;
    {
        let bytes = nd.as_bytes_mut();
        for i in 0..count {
            let value = i as f32;
            bytes[i * 4..i * 4 + 4].copy_from_slice(&value.to_le_bytes());
        }
    }

    let inputs = IndexMap::from([("arr".to_string(), appose::ndarray_to_value(&nd))]);
    let task = service
        .task("for i in range(len(arr)):\n    arr[i] = arr[i] + 1\n", Some(inputs))
        .expect("task should be accepted");

    task.start().await.unwrap();
    let done = tokio::time::timeout(Duration::from_secs(10), task.wait_for())
        .await
        .expect("task should complete within timeout");
    assert_eq!(done.status(), TaskStatus::Complete);

    let bytes = nd.as_bytes();
    for i in 0..count {
        let value = f32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap());
        assert_eq!(value, i as f32 + 1.0, "element {i} should be incremented");
    }

    nd.close().unwrap();
    service.close().await;
}

// ---------------------------------------------------------------------------
// 6. Crash recovery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn self_killed_worker_crashes_its_tasks_and_then_fails_fast() {
    let py = require_python!();
    let service = spawn_worker(&py).await;

    let script = "import os, signal\nos.kill(os.getpid(), signal.SIGKILL)\n";
    let task = service.task(script, None).expect("task should be accepted");

    task.start().await.unwrap();
    let done = tokio::time::timeout(Duration::from_secs(10), task.wait_for())
        .await
        .expect("task should observe the crash within timeout");

    assert_eq!(done.status(), TaskStatus::Crashed);
    assert!(done.error().is_some());

    // Give the reader pump a moment to mark the Service closed after EOF.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let err = service
        .task("1 + 1", None)
        .expect_err("a crashed worker's Service should fail fast on new tasks");
    assert!(matches!(err, appose::ServiceError::AlreadyClosed));
}
