// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario: quota rejection at the tenant concurrency cap, and the
//! admission-cap/release invariants.

use super::support::*;
use nr_broker::ConsumerConfig;
use nr_core::{ErrorCode, ExecutionId, ExecutionRequest, RunnerEvent, TenantId};
use nr_engine::LimiterConfig;
use std::sync::Arc;
use std::time::Duration;

fn slow_request(execution_id: &str, tenant: &str) -> ExecutionRequest {
    let mut params = serde_json::Map::new();
    params.insert("ms".into(), serde_json::json!(30_000));
    ExecutionRequest::builder()
        .execution_id(execution_id)
        .tenant_id(tenant)
        .node_type("sleep")
        .parameters(params)
        .build()
}

#[tokio::test]
async fn admission_at_cap_rejects_within_bounded_time() {
    let pipeline = pipeline(
        LimiterConfig { tenant_max_concurrency: 1, ..Default::default() },
        ConsumerConfig::default(),
    );
    let mut events = pipeline.engine.subscribe();

    let blocker = {
        let engine = Arc::clone(&pipeline.engine);
        let request = slow_request("exe-spec-blocker", "tnt-capped");
        tokio::spawn(async move { engine.execute(request).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = std::time::Instant::now();
    let rejected = pipeline
        .engine
        .execute(
            ExecutionRequest::builder()
                .execution_id("exe-spec-rejected")
                .tenant_id("tnt-capped")
                .node_type("echo")
                .build(),
        )
        .await;

    // Bounded time: rejection is immediate, not queued behind the blocker.
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(rejected.error_code, Some(ErrorCode::QuotaExceeded));
    assert!(rejected.retryable, "concurrency cap is a transient window");

    // Exactly one quota event for the rejection.
    let quota_events: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
        .filter(|e| matches!(e, RunnerEvent::QuotaRejected { .. }))
        .collect();
    assert_eq!(quota_events.len(), 1);
    match &quota_events[0] {
        RunnerEvent::QuotaRejected { tenant_id, hard, .. } => {
            assert_eq!(*tenant_id, TenantId::from_string("tnt-capped"));
            assert!(!hard);
        }
        other => panic!("unexpected event {other:?}"),
    }

    // The tenant's counter never exceeded its cap.
    assert_eq!(pipeline.engine.limiter().tenant_usage(&TenantId::from_string("tnt-capped")).0, 1);

    pipeline.engine.cancel(ExecutionId::from_string("exe-spec-blocker"), "cleanup");
    let _ = blocker.await.unwrap();

    // Release is bounded: the reservation is gone as soon as the terminal
    // result is produced.
    assert_eq!(pipeline.engine.limiter().tenant_usage(&TenantId::from_string("tnt-capped")).0, 0);
    assert_eq!(pipeline.engine.limiter().global_running(), 0);
}

#[tokio::test]
async fn other_tenants_are_unaffected_by_a_full_tenant() {
    let pipeline = pipeline(
        LimiterConfig { tenant_max_concurrency: 1, ..Default::default() },
        ConsumerConfig::default(),
    );

    let blocker = {
        let engine = Arc::clone(&pipeline.engine);
        let request = slow_request("exe-full", "tnt-full");
        tokio::spawn(async move { engine.execute(request).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let ok = pipeline
        .engine
        .execute(
            ExecutionRequest::builder()
                .execution_id("exe-other-tenant")
                .tenant_id("tnt-other")
                .node_type("echo")
                .build(),
        )
        .await;
    assert!(ok.success);

    pipeline.engine.cancel(ExecutionId::from_string("exe-full"), "cleanup");
    let _ = blocker.await.unwrap();
}

#[tokio::test]
async fn hard_memory_rejection_dead_letters_through_the_consumer() {
    let pipeline = pipeline(
        LimiterConfig { tenant_max_reserved_bytes: 1_000, ..Default::default() },
        ConsumerConfig::default(),
    );

    let mut request = ExecutionRequest::builder()
        .execution_id("exe-spec-mem")
        .node_type("echo")
        .reply_to("replies")
        .build();
    request.runtime_config.max_memory_bytes = 1 << 30;

    pipeline.enqueue(&request, 0);
    pipeline.run_to_idle().await;

    // Hard cap: non-retryable, no requeue, straight to the DLQ.
    let dlq = pipeline.broker.dlq();
    assert_eq!(dlq.len(), 1);
    assert_eq!(dlq[0].1, "QUOTA_EXCEEDED");

    let result = pipeline.single_reply("replies");
    assert!(!result.retryable);
}

#[tokio::test]
async fn repeated_release_is_a_no_op() {
    let pipeline = pipeline(LimiterConfig::default(), ConsumerConfig::default());
    let limiter = pipeline.engine.limiter();

    let token = limiter.admit(TenantId::from_string("tnt-rel"), 100).unwrap();
    token.release();
    token.release();
    drop(token);

    assert_eq!(limiter.tenant_usage(&TenantId::from_string("tnt-rel")), (0, 0));
}
