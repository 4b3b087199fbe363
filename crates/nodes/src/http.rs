// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Policy-mediated HTTP capability.
//!
//! Every outbound request consults the execution's compiled policy first;
//! denials are recorded as blocked violations and surface as `POLICY_DENY`.
//! Transport failures and 5xx responses normalize to retryable
//! `NETWORK_ERROR`.

use crate::context::EpochFn;
use nr_core::{ExecutionId, ExecutionMetrics, NodeError};
use nr_policy::{
    Decision, RequestDescriptor, SecurityAuditor, Severity, ViolationKind, CompiledPolicy,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Response handed back to the node: status, headers, body text.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

/// HTTP client bound to one execution's policy, auditor, and counters.
pub struct PolicyHttpClient {
    client: reqwest::Client,
    policy: Arc<CompiledPolicy>,
    auditor: Arc<SecurityAuditor>,
    execution_id: ExecutionId,
    epoch: EpochFn,
    counters: Mutex<ExecutionMetrics>,
}

impl PolicyHttpClient {
    pub fn new(
        policy: Arc<CompiledPolicy>,
        auditor: Arc<SecurityAuditor>,
        execution_id: ExecutionId,
        epoch: EpochFn,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            policy,
            auditor,
            execution_id,
            epoch,
            counters: Mutex::new(ExecutionMetrics::default()),
        }
    }

    /// Issue one request under the policy.
    pub async fn request(
        &self,
        method: &str,
        url: &str,
        headers: &HashMap<String, String>,
        body: Option<String>,
    ) -> Result<HttpResponse, NodeError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| NodeError::validation(format!("invalid url {url:?}: {e}")))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| NodeError::validation(format!("url {url:?} has no host")))?
            .to_string();
        let port = parsed.port_or_known_default().unwrap_or(443);

        let now_ms = (self.epoch)();
        let descriptor = RequestDescriptor::outbound(&host, port);
        match self.policy.decide(&descriptor, now_ms) {
            Decision::Deny { rule } => {
                self.auditor.record(
                    self.execution_id,
                    ViolationKind::NetworkEgress,
                    Severity::High,
                    format!("outbound request to {host}:{port} denied"),
                    serde_json::json!({ "host": host, "port": port, "rule": rule }),
                    true,
                    now_ms,
                );
                return Err(NodeError::policy_deny(format!(
                    "outbound request to {host}:{port} denied by {rule}"
                )));
            }
            Decision::AllowAndLog { rule } => {
                self.auditor.record(
                    self.execution_id,
                    ViolationKind::NetworkEgress,
                    Severity::Low,
                    format!("outbound request to {host}:{port} allowed with logging"),
                    serde_json::json!({ "host": host, "port": port, "rule": rule }),
                    false,
                    now_ms,
                );
            }
            Decision::Allow => {}
        }

        let _connection = self.policy.connection()?;

        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|_| NodeError::validation(format!("invalid http method {method:?}")))?;
        let mut builder = self.client.request(method, parsed);
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        let sent = body.as_ref().map(|b| b.len() as u64).unwrap_or(0);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(map_transport_error)?;
        let status = response.status();
        let mut response_headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                response_headers.insert(name.as_str().to_string(), v.to_string());
            }
        }
        let text = response.text().await.map_err(map_transport_error)?;
        let received = text.len() as u64;

        self.account(sent, received);

        if status.is_server_error() {
            return Err(NodeError::network(format!(
                "upstream returned {status} for {host}:{port}"
            )));
        }

        Ok(HttpResponse {
            status: status.as_u16(),
            headers: response_headers,
            body: text,
        })
    }

    fn account(&self, sent: u64, received: u64) {
        {
            let mut counters = self.counters.lock();
            counters.network_requests += 1;
            counters.bytes_sent += sent;
            counters.bytes_received += received;
        }
        self.policy.account(sent, received, (self.epoch)());
    }

    /// Realized counters since the client was created.
    pub fn metrics(&self) -> ExecutionMetrics {
        *self.counters.lock()
    }
}

// DNS failures, resets, and timeouts are all transient network errors.
fn map_transport_error(err: reqwest::Error) -> NodeError {
    NodeError::network(format!("http request failed: {err}"))
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
