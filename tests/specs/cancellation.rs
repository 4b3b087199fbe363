// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario: cancel during run — bounded delay to a terminal CANCELLED
//! result, exactly one cancellation event, idempotent repeats.

use super::support::*;
use nr_broker::ConsumerConfig;
use nr_core::{ErrorCode, ExecutionId, ExecutionRequest, RunnerEvent};
use nr_engine::LimiterConfig;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn slow_request(execution_id: &str) -> ExecutionRequest {
    let mut params = serde_json::Map::new();
    params.insert("ms".into(), serde_json::json!(30_000));
    ExecutionRequest::builder()
        .execution_id(execution_id)
        .node_type("sleep")
        .parameters(params)
        .reply_to("replies")
        .build()
}

#[tokio::test]
async fn cancel_mid_run_terminates_within_bounded_delay() {
    let pipeline = pipeline(LimiterConfig::default(), ConsumerConfig::default());
    let mut events = pipeline.engine.subscribe();
    let id = ExecutionId::from_string("exe-spec-cancel");

    let task = {
        let engine = Arc::clone(&pipeline.engine);
        let request = slow_request("exe-spec-cancel");
        tokio::spawn(async move { engine.execute(request).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let cancelled_at = Instant::now();
    assert!(pipeline.engine.cancel(id, "user"));
    // Idempotent repeats are no-ops.
    assert!(!pipeline.engine.cancel(id, "user"));
    assert!(!pipeline.engine.cancel(id, "again"));

    let result = task.await.unwrap();
    assert!(cancelled_at.elapsed() < Duration::from_secs(5));
    assert!(!result.success);
    assert_eq!(result.error_code, Some(ErrorCode::Cancelled));
    assert!(!result.retryable);

    // Exactly one session_cancelled event, and no further events for this
    // execution after its completion event.
    let mut cancelled = 0;
    let mut completed = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            RunnerEvent::SessionCancelled { execution_id, .. } if execution_id == id => {
                cancelled += 1;
            }
            RunnerEvent::SessionCompleted { execution_id, .. } if execution_id == id => {
                completed += 1;
            }
            _ => {}
        }
    }
    assert_eq!(cancelled, 1);
    assert_eq!(completed, 1);
    assert!(pipeline.engine.active_sessions().is_empty());
}

#[tokio::test]
async fn cancelled_execution_dead_letters_through_the_consumer() {
    let pipeline = pipeline(LimiterConfig::default(), ConsumerConfig::default());
    pipeline.enqueue(&slow_request("exe-spec-cancel-q"), 0);

    let task = {
        let consumer = Arc::clone(&pipeline.consumer);
        tokio::spawn(async move { consumer.run().await })
    };
    tokio::time::sleep(Duration::from_millis(150)).await;
    pipeline.engine.cancel(ExecutionId::from_string("exe-spec-cancel-q"), "operator");

    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if !pipeline.broker.dlq().is_empty() {
            break;
        }
    }
    pipeline.shutdown.cancel();
    task.await.unwrap().unwrap();

    let dlq = pipeline.broker.dlq();
    assert_eq!(dlq.len(), 1);
    assert_eq!(dlq[0].1, "CANCELLED");

    let result = pipeline.single_reply("replies");
    assert_eq!(result.error_code, Some(ErrorCode::Cancelled));
}

#[tokio::test]
async fn cancel_of_unknown_or_finished_execution_succeeds_quietly() {
    let pipeline = pipeline(LimiterConfig::default(), ConsumerConfig::default());

    assert!(!pipeline.engine.cancel(ExecutionId::from_string("exe-never"), "user"));

    let result = pipeline
        .engine
        .execute(ExecutionRequest::builder().execution_id("exe-quick").build())
        .await;
    assert!(result.success);
    assert!(!pipeline.engine.cancel(ExecutionId::from_string("exe-quick"), "late"));
}
