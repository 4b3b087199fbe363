// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The inbound execution request and its security/runtime envelopes.
//!
//! An [`ExecutionRequest`] is immutable after receipt: the broker decodes it
//! from the queue body, the engine reads it, nothing mutates it. The JSON
//! form of this struct *is* the queue wire contract.

use crate::error::NodeError;
use crate::id::{ExecutionId, RunId, StepId, TenantId};
use serde::{Deserialize, Serialize};

/// Declared encoding of an opaque payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    #[default]
    Utf8,
    Base64,
    Json,
}

crate::simple_display! {
    Encoding {
        Utf8 => "utf8",
        Base64 => "base64",
        Json => "json",
    }
}

/// Opaque payload: bytes plus a declared encoding.
///
/// Used for both `input_data` and `output_data`. The engine never interprets
/// the body; declared shapes belong to the node implementation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default)]
    pub encoding: Encoding,
    #[serde(default)]
    pub body: String,
}

impl Payload {
    pub fn utf8(body: impl Into<String>) -> Self {
        Self { encoding: Encoding::Utf8, body: body.into() }
    }

    pub fn json(value: &serde_json::Value) -> Self {
        Self { encoding: Encoding::Json, body: value.to_string() }
    }

    /// Empty payload, used as `output_data` on every failure result.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }
}

/// The sandbox variant an execution must run under.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IsolationLevel {
    #[default]
    InProcess,
    Process,
    Microvm,
    Wasm,
}

crate::wire_str! {
    IsolationLevel {
        InProcess => "in-process",
        Process => "process",
        Microvm => "microvm",
        Wasm => "wasm",
    }
}

/// Per-execution resource ceilings beyond the wall-clock timeout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Ceiling on concurrent outbound connections (0 = policy default).
    #[serde(default)]
    pub max_connections: u32,
    /// Ceiling on file operations reported by the backend (0 = unlimited).
    #[serde(default)]
    pub max_file_operations: u64,
}

/// Isolation, network policy, and environment constraints for one execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityContext {
    /// Requested isolation; absent means the runner's configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isolation: Option<IsolationLevel>,
    /// Network policy document compiled once per execution by nr-policy.
    /// Kept as raw JSON here so nr-core stays wire-only.
    #[serde(default)]
    pub network: serde_json::Value,
    /// Environment variables the child-process backend may inherit.
    #[serde(default)]
    pub env_allowlist: Vec<String>,
    #[serde(default)]
    pub limits: ResourceLimits,
    /// PII redaction policy; absent means no redaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pii: Option<serde_json::Value>,
    /// Permit degrading microvm to the process backend when no driver exists.
    #[serde(default)]
    pub allow_fallback: bool,
}

/// Highest priority value accepted on the wire; higher values are clamped.
pub const MAX_PRIORITY: u8 = 9;

/// Hard upper bound on a single execution, enforced regardless of request.
pub const MAX_TIMEOUT_MS: u64 = 120_000;

/// Wall-clock, memory, and scheduling knobs for one execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub timeout_ms: u64,
    #[serde(default)]
    pub max_memory_bytes: u64,
    /// Requester's retry budget hint; the consumer's own budget wins.
    #[serde(default)]
    pub max_retries: u32,
    /// 0–9, higher first-served when the broker supports it.
    #[serde(default)]
    pub priority: u8,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { timeout_ms: 30_000, max_memory_bytes: 0, max_retries: 0, priority: 0 }
    }
}

impl RuntimeConfig {
    /// Priority clamped to the wire range.
    pub fn clamped_priority(&self) -> u8 {
        self.priority.min(MAX_PRIORITY)
    }

    /// Effective timeout, never exceeding the per-process hard bound.
    pub fn effective_timeout_ms(&self) -> u64 {
        self.timeout_ms.min(MAX_TIMEOUT_MS)
    }
}

/// One step-execution request, immutable after receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub execution_id: ExecutionId,
    pub step_id: StepId,
    pub run_id: RunId,
    pub tenant_id: TenantId,
    pub node_type: String,
    /// Omitted version resolves to the highest registered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_version: Option<u32>,
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub input_data: Payload,
    /// Opaque handle resolvable against an external credential store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_ref: Option<String>,
    #[serde(default)]
    pub security_context: SecurityContext,
    #[serde(default)]
    pub runtime_config: RuntimeConfig,
    /// Destination queue for the terminal result, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    /// Attached by the broker on redelivery; not set by requesters.
    #[serde(default)]
    pub retry_count: u32,
}

impl ExecutionRequest {
    /// Structural validation performed before admission.
    ///
    /// `timeout_ms == 0` is rejected here as an immediate timeout so no
    /// backend is ever prepared for it.
    pub fn validate(&self) -> Result<(), NodeError> {
        if self.execution_id.is_empty() {
            return Err(NodeError::validation("execution_id must not be empty"));
        }
        if self.tenant_id.is_empty() {
            return Err(NodeError::validation("tenant_id must not be empty"));
        }
        if self.node_type.is_empty() {
            return Err(NodeError::validation("node_type must not be empty"));
        }
        if self.runtime_config.timeout_ms == 0 {
            return Err(NodeError::timeout(0));
        }
        Ok(())
    }
}

crate::builder! {
    pub struct ExecutionRequestBuilder => ExecutionRequest {
        into {
            execution_id: ExecutionId = "exe-test-1",
            step_id: StepId = "stp-test-1",
            run_id: RunId = "run-test-1",
            tenant_id: TenantId = "tnt-test",
            node_type: String = "echo",
        }
        set {
            node_version: Option<u32> = None,
            parameters: serde_json::Map<String, serde_json::Value> = serde_json::Map::new(),
            input_data: Payload = Payload::utf8("hello"),
            security_context: SecurityContext = SecurityContext::default(),
            runtime_config: RuntimeConfig = RuntimeConfig::default(),
            retry_count: u32 = 0,
        }
        option {
            credentials_ref: String = None,
            reply_to: String = None,
        }
    }
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
