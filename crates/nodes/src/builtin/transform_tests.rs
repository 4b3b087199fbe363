// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::context::{LogSink, NodeContext};
use crate::NodeHandler;
use nr_core::{ErrorCode, ExecutionId, Payload};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn ctx(input: &str, params: serde_json::Value) -> NodeContext {
    let epoch: crate::context::EpochFn = Arc::new(|| 0);
    let parameters = match params {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    NodeContext::new(
        ExecutionId::from_string("exe-t"),
        parameters,
        Payload::utf8(input),
        None,
        LogSink::new(Arc::clone(&epoch)),
        None,
        CancellationToken::new(),
        epoch,
    )
}

async fn run(input: &str, params: serde_json::Value) -> Result<serde_json::Value, nr_core::NodeError> {
    let output = TransformJsonNode.execute(&ctx(input, params)).await?;
    Ok(serde_json::from_str(&output.body).unwrap())
}

#[tokio::test]
async fn pick_keeps_only_listed_fields() {
    let out = run(
        r#"{"a":1,"b":2,"c":3}"#,
        serde_json::json!({"operation": "pick", "fields": ["a", "c"]}),
    )
    .await
    .unwrap();
    assert_eq!(out, serde_json::json!({"a": 1, "c": 3}));
}

#[tokio::test]
async fn drop_removes_listed_fields() {
    let out = run(
        r#"{"a":1,"b":2}"#,
        serde_json::json!({"operation": "drop", "fields": ["a"]}),
    )
    .await
    .unwrap();
    assert_eq!(out, serde_json::json!({"b": 2}));
}

#[tokio::test]
async fn rename_maps_keys() {
    let out = run(
        r#"{"old":1,"keep":2}"#,
        serde_json::json!({"operation": "rename", "mapping": {"old": "new"}}),
    )
    .await
    .unwrap();
    assert_eq!(out, serde_json::json!({"new": 1, "keep": 2}));
}

#[tokio::test]
async fn merge_overlays_values() {
    let out = run(
        r#"{"a":1,"b":2}"#,
        serde_json::json!({"operation": "merge", "value": {"b": 9, "c": 3}}),
    )
    .await
    .unwrap();
    assert_eq!(out, serde_json::json!({"a": 1, "b": 9, "c": 3}));
}

#[tokio::test]
async fn wrap_nests_input() {
    let out = run(r#"[1,2]"#, serde_json::json!({"operation": "wrap", "key": "items"}))
        .await
        .unwrap();
    assert_eq!(out, serde_json::json!({"items": [1, 2]}));
}

#[tokio::test]
async fn invalid_input_json_is_validation_error() {
    let err = run("not json", serde_json::json!({"operation": "pick", "fields": []}))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ValidationError);
}

#[tokio::test]
async fn missing_operation_is_validation_error() {
    let err = run("{}", serde_json::json!({})).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ValidationError);
}

#[tokio::test]
async fn unknown_operation_is_validation_error() {
    let err = run("{}", serde_json::json!({"operation": "explode"})).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ValidationError);
    assert!(err.message.contains("explode"));
}

#[tokio::test]
async fn rename_requires_object_input() {
    let err = run("[1]", serde_json::json!({"operation": "rename", "mapping": {}}))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ValidationError);
    assert!(err.message.contains("array"));
}

#[test]
fn validate_output_accepts_json_payload() {
    let ok = Payload::json(&serde_json::json!({"x": 1}));
    assert!(TransformJsonNode.validate_output(&ok).is_ok());

    let wrong_encoding = Payload::utf8("{}");
    assert!(TransformJsonNode.validate_output(&wrong_encoding).is_err());
}
