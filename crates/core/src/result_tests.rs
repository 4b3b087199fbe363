// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::id::ExecutionId;

#[test]
fn failure_has_empty_output_and_error_shape() {
    let err = NodeError::policy_deny("outbound to blocked.example denied");
    let result = ExecutionResult::failure(ExecutionId::from_string("exe-1"), &err);

    assert!(!result.success);
    assert!(result.output_data.is_empty());
    assert_eq!(result.error_code, Some(ErrorCode::PolicyDeny));
    assert_eq!(result.error_message.as_deref(), Some("outbound to blocked.example denied"));
    assert!(!result.retryable);
}

#[test]
fn success_carries_output() {
    let result = ExecutionResult::success(
        ExecutionId::from_string("exe-1"),
        Payload::utf8("hello"),
    );
    assert!(result.success);
    assert_eq!(result.output_data.body, "hello");
    assert!(result.error_code.is_none());
    assert!(!result.retryable);
}

#[yare::parameterized(
    success   = { None, true, "succeeded" },
    timeout   = { Some(ErrorCode::Timeout), false, "timed_out" },
    cancelled = { Some(ErrorCode::Cancelled), false, "cancelled" },
    crash     = { Some(ErrorCode::SandboxCrash), false, "failed" },
    deny      = { Some(ErrorCode::PolicyDeny), false, "failed" },
)]
fn status_label_per_outcome(code: Option<ErrorCode>, success: bool, expected: &str) {
    let result = if success {
        ExecutionResult::success(ExecutionId::from_string("exe-1"), Payload::empty())
    } else {
        // unwrap: every non-success row carries a code
        let err = NodeError::new(code.unwrap(), "x");
        ExecutionResult::failure(ExecutionId::from_string("exe-1"), &err)
    };
    assert_eq!(result.status_label(), expected);
}

#[test]
fn metrics_absorb_sums_counters_and_maxes_memory() {
    let mut base = ExecutionMetrics {
        execution_time_ms: 120,
        memory_used_bytes: 4096,
        cpu_time_ms: 50,
        network_requests: 1,
        bytes_sent: 10,
        bytes_received: 20,
        file_operations: 0,
    };
    let helper = ExecutionMetrics {
        execution_time_ms: 0,
        memory_used_bytes: 8192,
        cpu_time_ms: 5,
        network_requests: 2,
        bytes_sent: 100,
        bytes_received: 300,
        file_operations: 1,
    };
    base.absorb(&helper);

    assert_eq!(base.execution_time_ms, 120);
    assert_eq!(base.memory_used_bytes, 8192);
    assert_eq!(base.cpu_time_ms, 55);
    assert_eq!(base.network_requests, 3);
    assert_eq!(base.bytes_sent, 110);
    assert_eq!(base.bytes_received, 320);
    assert_eq!(base.file_operations, 1);
}

#[test]
fn result_serde_round_trip() {
    let err = NodeError::timeout(500);
    let result = ExecutionResult::failure(ExecutionId::from_string("exe-rt"), &err)
        .with_metrics(ExecutionMetrics { execution_time_ms: 501, ..Default::default() })
        .with_logs(vec![LogEntry::new(1, LogLevel::Warn, "deadline reached")]);

    let json = serde_json::to_string(&result).unwrap();
    let parsed: ExecutionResult = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, result);
}

#[test]
fn log_levels_ordered() {
    assert!(LogLevel::Debug < LogLevel::Info);
    assert!(LogLevel::Info < LogLevel::Warn);
    assert!(LogLevel::Warn < LogLevel::Error);
}
