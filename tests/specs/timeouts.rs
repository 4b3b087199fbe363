// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario: deadline enforcement, including the child-process backend's
//! hard kill, and the `timeout_ms = 0` boundary.

use super::support::*;
use nr_broker::ConsumerConfig;
use nr_core::{
    ErrorCode, ExecutionRequest, IsolationLevel, RuntimeConfig, SecurityContext,
};
use nr_engine::LimiterConfig;
use nr_sandbox::ProcessSandboxConfig;
use std::time::{Duration, Instant};

#[tokio::test]
async fn slow_in_process_node_times_out_retryably() {
    let pipeline = pipeline(LimiterConfig::default(), ConsumerConfig::default());

    let request = ExecutionRequest::builder()
        .execution_id("exe-spec-timeout")
        .node_type("sleep")
        .parameters({
            let mut p = serde_json::Map::new();
            p.insert("ms".into(), serde_json::json!(30_000));
            p
        })
        .runtime_config(RuntimeConfig { timeout_ms: 300, ..Default::default() })
        .build();

    let started = Instant::now();
    let result = pipeline.engine.execute(request).await;

    assert!(!result.success);
    assert_eq!(result.error_code, Some(ErrorCode::Timeout));
    assert!(result.retryable);
    // Deadline with a small fixed grace, not the node's 30s sleep.
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(result.metrics.execution_time_ms >= 300);
}

#[tokio::test]
async fn hung_worker_process_is_killed_at_the_deadline() {
    let dir = tempfile::tempdir().unwrap();
    let worker = fake_worker_script(&dir, "cat > /dev/null\nsleep 30");
    let pipeline = pipeline_with(
        LimiterConfig::default(),
        ConsumerConfig::default(),
        ProcessSandboxConfig {
            worker_path: Some(worker),
            term_grace: Duration::from_millis(200),
            ..Default::default()
        },
    );

    let request = ExecutionRequest::builder()
        .execution_id("exe-spec-proc-timeout")
        .node_type("sleep")
        .security_context(SecurityContext {
            isolation: Some(IsolationLevel::Process),
            ..Default::default()
        })
        .runtime_config(RuntimeConfig { timeout_ms: 500, ..Default::default() })
        .build();

    let started = Instant::now();
    let result = pipeline.engine.execute(request).await;

    assert!(!result.success);
    assert_eq!(result.error_code, Some(ErrorCode::Timeout));
    assert!(result.retryable);
    // The kill path ran: the 30s worker never got to finish.
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(pipeline.engine.active_sessions().is_empty());
}

#[tokio::test]
async fn zero_timeout_fails_before_any_backend_work() {
    let pipeline = pipeline(LimiterConfig::default(), ConsumerConfig::default());

    let request = ExecutionRequest::builder()
        .execution_id("exe-spec-zero")
        .node_type("echo")
        .runtime_config(RuntimeConfig { timeout_ms: 0, ..Default::default() })
        .reply_to("replies")
        .build();
    pipeline.enqueue(&request, 0);
    pipeline.run_to_idle().await;

    // Timeout is retryable, so the first delivery requeues; the budget
    // then drains and the message dead-letters with the timeout reason.
    let dlq = pipeline.broker.dlq();
    assert_eq!(dlq.len(), 1);
    assert_eq!(dlq[0].1, "TIMEOUT");

    let result = pipeline.single_reply("replies");
    assert_eq!(result.error_code, Some(ErrorCode::Timeout));
    assert!(!result.retryable, "final attempt is not retryable");
}
