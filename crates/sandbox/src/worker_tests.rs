// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use nr_core::ErrorCode;

#[test]
fn outcome_frame_round_trips() {
    let outcome = WorkerOutcome {
        output: Some(Payload::utf8("done")),
        error: None,
        metrics: ExecutionMetrics { execution_time_ms: 12, ..Default::default() },
        logs: vec![LogEntry::new(1, nr_core::LogLevel::Info, "hi")],
    };
    let json = serde_json::to_string(&outcome).unwrap();
    let parsed: WorkerOutcome = serde_json::from_str(&json).unwrap();

    assert_eq!(parsed.output.unwrap().body, "done");
    assert!(parsed.error.is_none());
    assert_eq!(parsed.metrics.execution_time_ms, 12);
    assert_eq!(parsed.logs.len(), 1);
}

#[test]
fn error_frame_round_trips() {
    let outcome = WorkerOutcome::from_error(NodeError::policy_deny("blocked"));
    let json = serde_json::to_string(&outcome).unwrap();
    let parsed: WorkerOutcome = serde_json::from_str(&json).unwrap();

    let error = parsed.error.unwrap();
    assert_eq!(error.code, ErrorCode::PolicyDeny);
    assert!(parsed.output.is_none());
}

#[test]
fn minimal_frame_decodes_with_defaults() {
    let parsed: WorkerOutcome =
        serde_json::from_str(r#"{"output":{"encoding":"utf8","body":"x"}}"#).unwrap();
    assert_eq!(parsed.metrics, ExecutionMetrics::default());
    assert!(parsed.logs.is_empty());
}

#[test]
fn env_id_parses_numeric_only() {
    std::env::remove_var("NR_TEST_WORKER_ID");
    assert_eq!(env_id("NR_TEST_WORKER_ID"), None);

    std::env::set_var("NR_TEST_WORKER_ID", "1000");
    assert_eq!(env_id("NR_TEST_WORKER_ID"), Some(1000));

    std::env::set_var("NR_TEST_WORKER_ID", "notanumber");
    assert_eq!(env_id("NR_TEST_WORKER_ID"), None);
    std::env::remove_var("NR_TEST_WORKER_ID");
}

#[test]
fn merge_rusage_never_decreases() {
    let base = ExecutionMetrics {
        memory_used_bytes: u64::MAX,
        cpu_time_ms: u64::MAX,
        ..Default::default()
    };
    let merged = merge_rusage(base);
    assert_eq!(merged.memory_used_bytes, u64::MAX);
    assert_eq!(merged.cpu_time_ms, u64::MAX);

    let merged = merge_rusage(ExecutionMetrics::default());
    // Real rusage numbers: plausible, not asserted exactly.
    assert!(merged.memory_used_bytes > 0);
}

#[test]
fn no_limits_requested_is_a_no_op() {
    // max_memory_bytes 0 and no uid/gid env vars: must not touch rlimits.
    let request = nr_core::ExecutionRequest::builder().build();
    assert!(apply_self_limits(&request).is_ok());
}
