// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::SandboxSpec;
use nr_core::{ErrorCode, Payload};
use nr_nodes::FakeNode;
use nr_policy::{CompiledPolicy, SecurityAuditor};
use std::time::Duration;

fn spec(input: &str) -> SandboxSpec {
    SandboxSpec {
        request: nr_core::ExecutionRequest::builder()
            .input_data(Payload::utf8(input))
            .build(),
        node: Arc::new(FakeNode::echo("echo", 1)),
        policy: Arc::new(CompiledPolicy::permit_all()),
        auditor: Arc::new(SecurityAuditor::new()),
        epoch: Arc::new(|| 0),
    }
}

fn far_deadline() -> Instant {
    Instant::now() + Duration::from_secs(30)
}

#[tokio::test]
async fn no_driver_prepare_fails_isolation_unavailable() {
    let sandbox = MicroVmSandbox::unavailable();
    assert!(!sandbox.available());

    let err = sandbox.prepare(spec("x")).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::IsolationUnavailable);
    assert!(!err.retryable);
}

#[tokio::test]
async fn fake_driver_round_trips() {
    let sandbox = MicroVmSandbox::new(Some(Arc::new(FakeMicroVmDriver::immediate())));
    assert!(sandbox.available());

    let mut handle = sandbox.prepare(spec("vm-input")).await.unwrap();
    let output = handle.run(far_deadline(), &CancellationToken::new()).await.unwrap();
    assert_eq!(output.body, "vm-input");
    handle.dispose().await;
}

#[tokio::test]
async fn slow_vm_times_out_and_stops() {
    let sandbox = MicroVmSandbox::new(Some(Arc::new(FakeMicroVmDriver {
        delay: Duration::from_secs(30),
    })));
    let mut handle = sandbox.prepare(spec("x")).await.unwrap();

    let start = Instant::now();
    let deadline = start + Duration::from_millis(100);
    let err = handle.run(deadline, &CancellationToken::new()).await.unwrap_err();

    assert_eq!(err.code, ErrorCode::Timeout);
    assert!(start.elapsed() < Duration::from_secs(5));
    handle.dispose().await;
}

#[tokio::test]
async fn cancel_stops_vm() {
    let sandbox = MicroVmSandbox::new(Some(Arc::new(FakeMicroVmDriver {
        delay: Duration::from_secs(30),
    })));
    let mut handle = sandbox.prepare(spec("x")).await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = handle.run(far_deadline(), &cancel).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::Cancelled);
    handle.dispose().await;
}

#[tokio::test]
async fn dispose_is_idempotent() {
    let sandbox = MicroVmSandbox::new(Some(Arc::new(FakeMicroVmDriver::immediate())));
    let mut handle = sandbox.prepare(spec("x")).await.unwrap();
    handle.dispose().await;
    handle.dispose().await;

    let err = handle.run(far_deadline(), &CancellationToken::new()).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::SandboxCrash);
}
