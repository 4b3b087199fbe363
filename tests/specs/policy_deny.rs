// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario: network policy denies an outbound request; a blocked
//! violation is recorded and no outbound I/O happens.

use super::support::*;
use nr_broker::ConsumerConfig;
use nr_core::{ErrorCode, ExecutionRequest, SecurityContext};
use nr_engine::LimiterConfig;

fn http_request(execution_id: &str, url: &str, network: serde_json::Value) -> ExecutionRequest {
    let mut params = serde_json::Map::new();
    params.insert("url".into(), serde_json::json!(url));
    ExecutionRequest::builder()
        .execution_id(execution_id)
        .node_type("http")
        .parameters(params)
        .security_context(SecurityContext { network, ..Default::default() })
        .reply_to("replies")
        .build()
}

#[tokio::test]
async fn blocked_domain_yields_policy_deny_and_high_severity_violation() {
    let pipeline = pipeline(LimiterConfig::default(), ConsumerConfig::default());

    let request = http_request(
        "exe-spec-deny",
        "https://blocked.example/v1/data",
        serde_json::json!({ "blocked_domains": ["blocked.example"] }),
    );
    pipeline.enqueue(&request, 0);
    pipeline.run_to_idle().await;

    let result = pipeline.single_reply("replies");
    assert!(!result.success);
    assert_eq!(result.error_code, Some(ErrorCode::PolicyDeny));
    assert!(!result.retryable);
    assert!(result.output_data.is_empty());

    // Violation record: high severity, blocked, tied to this execution.
    let violations = pipeline
        .engine
        .auditor()
        .for_execution(nr_core::ExecutionId::from_string("exe-spec-deny"));
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].severity, nr_policy::Severity::High);
    assert!(violations[0].blocked);
    assert_eq!(violations[0].kind, nr_policy::ViolationKind::NetworkEgress);

    // Policy is monotone: the denied intent produced zero network metrics.
    assert_eq!(result.metrics.network_requests, 0);
    assert_eq!(result.metrics.bytes_sent, 0);

    // Non-retryable: straight to the DLQ.
    let dlq = pipeline.broker.dlq();
    assert_eq!(dlq.len(), 1);
    assert_eq!(dlq[0].1, "POLICY_DENY");
}

#[tokio::test]
async fn subdomains_of_blocked_suffix_are_also_denied() {
    let pipeline = pipeline(LimiterConfig::default(), ConsumerConfig::default());

    let request = http_request(
        "exe-spec-deny-sub",
        "https://api.internal.blocked.example/",
        serde_json::json!({ "blocked_domains": ["blocked.example"] }),
    );
    pipeline.enqueue(&request, 0);
    pipeline.run_to_idle().await;

    let result = pipeline.single_reply("replies");
    assert_eq!(result.error_code, Some(ErrorCode::PolicyDeny));
}
