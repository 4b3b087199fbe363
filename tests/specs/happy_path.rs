// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario: happy path, in-process isolation, full pipeline.

use super::support::*;
use nr_broker::ConsumerConfig;
use nr_core::{ExecutionRequest, IsolationLevel, Payload, RuntimeConfig, SecurityContext};
use nr_engine::LimiterConfig;

#[tokio::test]
async fn echo_round_trips_through_queue_engine_and_reply() {
    let pipeline = pipeline(LimiterConfig::default(), ConsumerConfig::default());
    let sessions_before = pipeline.engine.active_sessions().len();

    let request = ExecutionRequest::builder()
        .execution_id("exe-spec-happy")
        .step_id("stp-spec-1")
        .run_id("run-spec-1")
        .tenant_id("tnt-spec")
        .node_type("echo")
        .input_data(Payload::utf8("hello"))
        .security_context(SecurityContext {
            isolation: Some(IsolationLevel::InProcess),
            ..Default::default()
        })
        .runtime_config(RuntimeConfig { timeout_ms: 5_000, ..Default::default() })
        .reply_to("replies")
        .build();
    pipeline.enqueue(&request, 0);
    pipeline.run_to_idle().await;

    let result = pipeline.single_reply("replies");
    assert!(result.success);
    assert_eq!(result.output_data.body, "hello");
    assert!(!result.retryable);
    assert!(result.error_code.is_none());

    // Correlation ids survive the full round trip.
    assert_eq!(result.execution_id.as_str(), "exe-spec-happy");

    // Active set returns to its prior value; nothing dead-letters.
    assert_eq!(pipeline.engine.active_sessions().len(), sessions_before);
    assert!(pipeline.broker.dlq().is_empty());
}

#[tokio::test]
async fn request_fields_round_trip_through_a_noop_execution() {
    let pipeline = pipeline(LimiterConfig::default(), ConsumerConfig::default());

    let request = ExecutionRequest::builder()
        .execution_id("exe-rt")
        .step_id("stp-rt")
        .run_id("run-rt")
        .tenant_id("tnt-rt")
        .node_type("noop")
        .reply_to("replies")
        .build();

    // Encode exactly as the wire does, send, decode the reply.
    let encoded = serde_json::to_vec(&request).unwrap();
    let decoded: ExecutionRequest = serde_json::from_slice(&encoded).unwrap();
    assert_eq!(decoded, request);

    pipeline.enqueue(&request, 0);
    pipeline.run_to_idle().await;

    let result = pipeline.single_reply("replies");
    assert!(result.success);
    assert!(result.output_data.is_empty());
    assert_eq!(result.execution_id, request.execution_id);
}

#[tokio::test]
async fn higher_priority_messages_are_served_first() {
    let pipeline = pipeline(
        LimiterConfig::default(),
        ConsumerConfig { concurrency: 1, ..Default::default() },
    );

    for (id, priority) in [("exe-low", 1u8), ("exe-high", 9u8)] {
        let request = ExecutionRequest::builder()
            .execution_id(id)
            .node_type("echo")
            .input_data(Payload::utf8(id))
            .runtime_config(RuntimeConfig { priority, ..Default::default() })
            .reply_to("replies")
            .build();
        pipeline.enqueue(&request, 0);
    }
    pipeline.run_to_idle().await;

    let replies = pipeline.broker.published("replies");
    assert_eq!(replies.len(), 2);
    let first: nr_core::ExecutionResult = serde_json::from_slice(&replies[0]).unwrap();
    assert_eq!(first.execution_id.as_str(), "exe-high");
}
