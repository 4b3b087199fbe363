// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON transform node.

use crate::{NodeContext, NodeHandler};
use async_trait::async_trait;
use nr_core::{Encoding, NodeError, Payload};
use serde_json::Value;

/// Applies a structural operation to a JSON input object.
///
/// `params.operation` selects the transform:
/// - `pick`: keep only `params.fields` (array of keys)
/// - `drop`: remove `params.fields`
/// - `rename`: rename keys per `params.mapping` (object old→new)
/// - `merge`: shallow-merge `params.value` (object) over the input
/// - `wrap`: nest the input under `params.key`
pub struct TransformJsonNode;

#[async_trait]
impl NodeHandler for TransformJsonNode {
    fn name(&self) -> &str {
        "transform.json"
    }

    fn version(&self) -> u32 {
        1
    }

    async fn execute(&self, ctx: &NodeContext) -> Result<Payload, NodeError> {
        let input: Value = serde_json::from_str(&ctx.input.body)
            .map_err(|e| NodeError::validation(format!("input is not valid JSON: {e}")))?;

        let operation = ctx
            .param_str("operation")
            .ok_or_else(|| NodeError::validation("missing parameter: operation"))?;

        let output = match operation {
            "pick" => pick(input, &field_list(ctx)?),
            "drop" => drop_fields(input, &field_list(ctx)?),
            "rename" => rename(input, ctx)?,
            "merge" => merge(input, ctx)?,
            "wrap" => wrap(input, ctx)?,
            other => {
                return Err(NodeError::validation(format!("unknown operation: {other}")));
            }
        };

        Ok(Payload::json(&output))
    }

    fn validate_output(&self, output: &Payload) -> Result<(), NodeError> {
        if output.encoding != Encoding::Json {
            return Err(NodeError::validation("transform.json must produce a JSON payload"));
        }
        serde_json::from_str::<Value>(&output.body)
            .map(|_| ())
            .map_err(|e| NodeError::validation(format!("output is not valid JSON: {e}")))
    }
}

fn field_list(ctx: &NodeContext) -> Result<Vec<String>, NodeError> {
    let fields = ctx
        .param("fields")
        .and_then(Value::as_array)
        .ok_or_else(|| NodeError::validation("missing parameter: fields (array)"))?;
    Ok(fields.iter().filter_map(Value::as_str).map(str::to_string).collect())
}

fn as_object(value: Value) -> Result<serde_json::Map<String, Value>, NodeError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(NodeError::validation(format!(
            "operation requires a JSON object input, got {}",
            json_type(&other)
        ))),
    }
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn pick(input: Value, fields: &[String]) -> Value {
    match input {
        Value::Object(map) => Value::Object(
            map.into_iter().filter(|(k, _)| fields.contains(k)).collect(),
        ),
        other => other,
    }
}

fn drop_fields(input: Value, fields: &[String]) -> Value {
    match input {
        Value::Object(map) => Value::Object(
            map.into_iter().filter(|(k, _)| !fields.contains(k)).collect(),
        ),
        other => other,
    }
}

fn rename(input: Value, ctx: &NodeContext) -> Result<Value, NodeError> {
    let mapping = ctx
        .param("mapping")
        .and_then(Value::as_object)
        .ok_or_else(|| NodeError::validation("missing parameter: mapping (object)"))?;
    let map = as_object(input)?;
    let renamed = map
        .into_iter()
        .map(|(k, v)| {
            let new_key = mapping.get(&k).and_then(Value::as_str).unwrap_or(&k).to_string();
            (new_key, v)
        })
        .collect();
    Ok(Value::Object(renamed))
}

fn merge(input: Value, ctx: &NodeContext) -> Result<Value, NodeError> {
    let overlay = ctx
        .param("value")
        .and_then(Value::as_object)
        .ok_or_else(|| NodeError::validation("missing parameter: value (object)"))?;
    let mut map = as_object(input)?;
    for (k, v) in overlay {
        map.insert(k.clone(), v.clone());
    }
    Ok(Value::Object(map))
}

fn wrap(input: Value, ctx: &NodeContext) -> Result<Value, NodeError> {
    let key = ctx
        .param_str("key")
        .ok_or_else(|| NodeError::validation("missing parameter: key"))?;
    let mut map = serde_json::Map::new();
    map.insert(key.to_string(), input);
    Ok(Value::Object(map))
}

#[cfg(test)]
#[path = "transform_tests.rs"]
mod tests;
