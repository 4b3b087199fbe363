// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP node: one policy-mediated request per execution.

use crate::{NodeContext, NodeHandler};
use async_trait::async_trait;
use nr_core::{NodeError, Payload};
use serde_json::Value;
use std::collections::HashMap;

/// Issues `params.method` (default GET) against `params.url` through the
/// execution's policy-mediated HTTP capability.
///
/// Output is a JSON object `{status, headers, body}`; the request body,
/// when present, comes from `params.body` (string) with the node's input
/// payload as fallback for non-GET methods.
pub struct HttpNode;

#[async_trait]
impl NodeHandler for HttpNode {
    fn name(&self) -> &str {
        "http"
    }

    fn version(&self) -> u32 {
        1
    }

    async fn execute(&self, ctx: &NodeContext) -> Result<Payload, NodeError> {
        let Some(client) = ctx.http.as_ref() else {
            return Err(NodeError::policy_deny("http capability not granted to this execution"));
        };

        let url = ctx
            .param_str("url")
            .ok_or_else(|| NodeError::validation("missing parameter: url"))?;
        let method = ctx.param_str("method").unwrap_or("GET").to_ascii_uppercase();

        let mut headers = HashMap::new();
        if let Some(map) = ctx.param("headers").and_then(Value::as_object) {
            for (name, value) in map {
                if let Some(v) = value.as_str() {
                    headers.insert(name.clone(), v.to_string());
                }
            }
        }

        let body = match ctx.param_str("body") {
            Some(b) => Some(b.to_string()),
            None if method != "GET" && !ctx.input.is_empty() => Some(ctx.input.body.clone()),
            None => None,
        };

        ctx.logger.info(format!("http {method} {url}"));

        let response = tokio::select! {
            r = client.request(&method, url, &headers, body) => r?,
            _ = ctx.cancel.cancelled() => {
                return Err(NodeError::cancelled("http request interrupted"));
            }
        };

        ctx.logger.debug(format!("http {} -> {}", url, response.status));

        Ok(Payload::json(&serde_json::json!({
            "status": response.status,
            "headers": response.headers,
            "body": response.body,
        })))
    }
}
