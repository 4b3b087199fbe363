// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::{Sandbox, SandboxSpec};
use nr_core::{ErrorCode, ExecutionRequest};
use nr_nodes::FakeNode;
use nr_policy::{CompiledPolicy, SecurityAuditor};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;

fn spec(request: ExecutionRequest) -> SandboxSpec {
    SandboxSpec {
        request,
        node: Arc::new(FakeNode::echo("echo", 1)),
        policy: Arc::new(CompiledPolicy::permit_all()),
        auditor: Arc::new(SecurityAuditor::new()),
        epoch: Arc::new(|| 1_000),
    }
}

fn far_deadline() -> Instant {
    Instant::now() + Duration::from_secs(30)
}

/// Write an executable shell script standing in for the worker binary.
fn fake_worker(dir: &tempfile::TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("worker.sh");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "#!/bin/sh").unwrap();
    writeln!(file, "{body}").unwrap();
    drop(file);
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn sandbox_with(worker: PathBuf) -> ProcessSandbox {
    ProcessSandbox::new(ProcessSandboxConfig {
        worker_path: Some(worker),
        term_grace: Duration::from_millis(200),
        ..Default::default()
    })
}

#[tokio::test]
async fn nonexistent_worker_binary_fails_prepare() {
    let sandbox = sandbox_with(PathBuf::from("/nonexistent/nr-worker"));
    let err = sandbox.prepare(spec(ExecutionRequest::builder().build())).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::SandboxCrash);
}

#[tokio::test]
async fn valid_frame_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let worker = fake_worker(
        &dir,
        r#"cat > /dev/null
echo '{"output":{"encoding":"utf8","body":"hi"},"metrics":{"execution_time_ms":5,"memory_used_bytes":0,"cpu_time_ms":0,"network_requests":0,"bytes_sent":0,"bytes_received":0,"file_operations":0},"logs":[{"timestamp_ms":1,"level":"info","message":"from child"}]}'"#,
    );
    let sandbox = sandbox_with(worker);
    let mut handle = sandbox.prepare(spec(ExecutionRequest::builder().build())).await.unwrap();

    let output = handle.run(far_deadline(), &CancellationToken::new()).await.unwrap();
    assert_eq!(output.body, "hi");

    let logs = handle.take_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].message, "from child");

    let metrics = handle.collect_metrics();
    assert!(metrics.execution_time_ms >= 5);
    handle.dispose().await;
}

#[tokio::test]
async fn structured_child_error_passes_through() {
    let dir = tempfile::tempdir().unwrap();
    let worker = fake_worker(
        &dir,
        r#"cat > /dev/null
echo '{"error":{"code":"POLICY_DENY","message":"denied","retryable":false}}'"#,
    );
    let sandbox = sandbox_with(worker);
    let mut handle = sandbox.prepare(spec(ExecutionRequest::builder().build())).await.unwrap();

    let err = handle.run(far_deadline(), &CancellationToken::new()).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::PolicyDeny);
    assert!(!err.retryable);
    handle.dispose().await;
}

#[tokio::test]
async fn garbage_stdout_is_sandbox_crash() {
    let dir = tempfile::tempdir().unwrap();
    let worker = fake_worker(&dir, "cat > /dev/null\necho 'not a frame'");
    let sandbox = sandbox_with(worker);
    let mut handle = sandbox.prepare(spec(ExecutionRequest::builder().build())).await.unwrap();

    let err = handle.run(far_deadline(), &CancellationToken::new()).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::SandboxCrash);
    assert!(err.retryable);
    handle.dispose().await;
}

#[tokio::test]
async fn nonzero_exit_is_sandbox_crash() {
    let dir = tempfile::tempdir().unwrap();
    let worker = fake_worker(&dir, "cat > /dev/null\nexit 3");
    let sandbox = sandbox_with(worker);
    let mut handle = sandbox.prepare(spec(ExecutionRequest::builder().build())).await.unwrap();

    let err = handle.run(far_deadline(), &CancellationToken::new()).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::SandboxCrash);
    assert!(err.message.contains('3'));
    handle.dispose().await;
}

#[tokio::test]
async fn deadline_kills_hung_worker() {
    let dir = tempfile::tempdir().unwrap();
    let worker = fake_worker(&dir, "cat > /dev/null\nsleep 30");
    let sandbox = sandbox_with(worker);
    let mut handle = sandbox.prepare(spec(ExecutionRequest::builder().build())).await.unwrap();

    let start = Instant::now();
    let deadline = start + Duration::from_millis(200);
    let err = handle.run(deadline, &CancellationToken::new()).await.unwrap_err();

    assert_eq!(err.code, ErrorCode::Timeout);
    assert!(err.retryable);
    // Kill path, not the 30s sleep.
    assert!(start.elapsed() < Duration::from_secs(5));
    handle.dispose().await;
}

#[tokio::test]
async fn cancel_kills_hung_worker() {
    let dir = tempfile::tempdir().unwrap();
    let worker = fake_worker(&dir, "cat > /dev/null\nsleep 30");
    let sandbox = sandbox_with(worker);
    let mut handle = sandbox.prepare(spec(ExecutionRequest::builder().build())).await.unwrap();

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let err = handle.run(far_deadline(), &cancel).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::Cancelled);
    handle.dispose().await;
}

#[tokio::test]
async fn stderr_surfaces_as_error_logs() {
    let dir = tempfile::tempdir().unwrap();
    let worker = fake_worker(
        &dir,
        r#"cat > /dev/null
echo 'something broke' >&2
echo '{"output":{"encoding":"utf8","body":"ok"}}'"#,
    );
    let sandbox = sandbox_with(worker);
    let mut handle = sandbox.prepare(spec(ExecutionRequest::builder().build())).await.unwrap();

    handle.run(far_deadline(), &CancellationToken::new()).await.unwrap();
    let logs = handle.take_logs();
    assert!(logs.iter().any(|l| l.message == "something broke" && l.level == LogLevel::Error));
    handle.dispose().await;
}

#[tokio::test]
async fn dispose_without_run_reaps_child() {
    let dir = tempfile::tempdir().unwrap();
    let worker = fake_worker(&dir, "sleep 30");
    let sandbox = sandbox_with(worker);
    let mut handle = sandbox.prepare(spec(ExecutionRequest::builder().build())).await.unwrap();

    // Never ran; dispose must still tear the process down promptly.
    let start = Instant::now();
    handle.dispose().await;
    handle.dispose().await; // idempotent
    assert!(start.elapsed() < Duration::from_secs(5));
}
