// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario: retry accounting — requeue with incremented header until the
//! budget is spent, then dead-letter.

use super::support::*;
use nr_broker::ConsumerConfig;
use nr_core::{ExecutionRequest, SecurityContext};
use nr_engine::LimiterConfig;

/// An http node pointed at an unresolvable host fails with a retryable
/// NETWORK_ERROR without leaving the machine.
fn flaky_request(execution_id: &str) -> ExecutionRequest {
    let mut params = serde_json::Map::new();
    params.insert(
        "url".into(),
        serde_json::json!("https://nr-spec-nonexistent-host.invalid/"),
    );
    ExecutionRequest::builder()
        .execution_id(execution_id)
        .node_type("http")
        .parameters(params)
        .security_context(SecurityContext::default())
        .reply_to("replies")
        .build()
}

#[tokio::test]
async fn delivery_at_last_allowed_retry_requeues_then_dead_letters() {
    let pipeline = pipeline(
        LimiterConfig::default(),
        ConsumerConfig { max_retries: 3, ..Default::default() },
    );

    // Broker delivers with x-retry-count=2: one more attempt is allowed.
    pipeline.enqueue(&flaky_request("exe-spec-retry"), 2);
    pipeline.run_to_idle().await;

    // Attempt at 2 requeued with header 3; attempt at 3 dead-lettered.
    let dlq = pipeline.broker.dlq();
    assert_eq!(dlq.len(), 1);
    assert_eq!(dlq[0].1, "NETWORK_ERROR");

    // Exactly one terminal reply, with retryable flipped off.
    let result = pipeline.single_reply("replies");
    assert!(!result.success);
    assert!(!result.retryable);
    assert_eq!(result.execution_id.as_str(), "exe-spec-retry");
}

#[tokio::test]
async fn fresh_message_exhausts_full_budget_before_dlq() {
    let pipeline = pipeline(
        LimiterConfig::default(),
        ConsumerConfig { max_retries: 2, ..Default::default() },
    );

    pipeline.enqueue(&flaky_request("exe-spec-budget"), 0);
    pipeline.run_to_idle().await;

    // Attempts at retry_count 0, 1, 2; the last one dead-letters. Earlier
    // attempts publish nothing.
    assert_eq!(pipeline.broker.dlq().len(), 1);
    assert_eq!(pipeline.broker.published("replies").len(), 1);
}

#[tokio::test]
async fn non_retryable_failure_never_requeues() {
    let pipeline = pipeline(LimiterConfig::default(), ConsumerConfig::default());

    // Unknown node type: NODE_NOT_FOUND, non-retryable.
    let request = ExecutionRequest::builder()
        .execution_id("exe-spec-notfound")
        .node_type("does.not.exist")
        .reply_to("replies")
        .build();
    pipeline.enqueue(&request, 0);
    pipeline.run_to_idle().await;

    let dlq = pipeline.broker.dlq();
    assert_eq!(dlq.len(), 1);
    assert_eq!(dlq[0].1, "NODE_NOT_FOUND");

    let result = pipeline.single_reply("replies");
    assert!(!result.retryable);
}

#[tokio::test]
async fn undecodable_body_dead_letters_without_touching_the_engine() {
    let pipeline = pipeline(LimiterConfig::default(), ConsumerConfig::default());
    pipeline.broker.push(b"definitely not json".to_vec(), 0, 0, Some("replies".into()));
    pipeline.run_to_idle().await;

    let dlq = pipeline.broker.dlq();
    assert_eq!(dlq.len(), 1);
    assert!(dlq[0].1.starts_with("PARSE_ERROR"));
    // No reply for a body that never became a request.
    assert!(pipeline.broker.published("replies").is_empty());
    assert!(pipeline.engine.active_sessions().is_empty());
}
