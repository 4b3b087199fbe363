// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy for node executions.
//!
//! Every failure that crosses the engine boundary is normalized into a
//! [`NodeError`] carrying one of the [`ErrorCode`] kinds. The broker layer
//! decides requeue-vs-DLQ purely from the `retryable` flag; the engine never
//! retries internally.

use serde::{Deserialize, Serialize};

/// Stable error code attached to every failed execution result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Plugin registry has no implementation for the requested node type.
    NodeNotFound,
    /// Message body or worker frame failed strict decoding.
    ParseError,
    /// Network policy or security auditor denied an outbound intent.
    PolicyDeny,
    /// Resource limiter rejected admission or a quota window was exhausted.
    QuotaExceeded,
    /// The requested isolation level has no available backend.
    IsolationUnavailable,
    /// Deadline elapsed before the backend produced output.
    Timeout,
    /// Backend died: process killed, VM stopped, wasm trap, panic.
    SandboxCrash,
    /// Transient network failure inside the policy-mediated HTTP helper.
    NetworkError,
    /// Input or output failed shape validation.
    ValidationError,
    /// Execution was cancelled externally.
    Cancelled,
    /// Catch-all for unclassified failures.
    Unknown,
}

impl ErrorCode {
    /// Default retryability per the taxonomy.
    ///
    /// `QuotaExceeded` has no single answer (hard caps are final, the
    /// concurrency window is transient), so its default is the conservative
    /// `false`; use [`NodeError::quota_exceeded`] to pick the right class.
    pub fn default_retryable(self) -> bool {
        match self {
            ErrorCode::Timeout
            | ErrorCode::SandboxCrash
            | ErrorCode::NetworkError
            | ErrorCode::Unknown => true,
            ErrorCode::NodeNotFound
            | ErrorCode::ParseError
            | ErrorCode::PolicyDeny
            | ErrorCode::QuotaExceeded
            | ErrorCode::IsolationUnavailable
            | ErrorCode::ValidationError
            | ErrorCode::Cancelled => false,
        }
    }
}

crate::simple_display! {
    ErrorCode {
        NodeNotFound => "NODE_NOT_FOUND",
        ParseError => "PARSE_ERROR",
        PolicyDeny => "POLICY_DENY",
        QuotaExceeded => "QUOTA_EXCEEDED",
        IsolationUnavailable => "ISOLATION_UNAVAILABLE",
        Timeout => "TIMEOUT",
        SandboxCrash => "SANDBOX_CRASH",
        NetworkError => "NETWORK_ERROR",
        ValidationError => "VALIDATION_ERROR",
        Cancelled => "CANCELLED",
        Unknown => "UNKNOWN",
    }
}

/// Structured, terminal error for one execution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct NodeError {
    pub code: ErrorCode,
    pub message: String,
    pub retryable: bool,
}

impl NodeError {
    /// Build an error with the taxonomy's default retryability.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), retryable: code.default_retryable() }
    }

    /// Quota rejection; `hard` caps are final, window limits are transient.
    pub fn quota_exceeded(message: impl Into<String>, hard: bool) -> Self {
        Self { code: ErrorCode::QuotaExceeded, message: message.into(), retryable: !hard }
    }

    /// Override the retryable flag (e.g. timeout on the final attempt).
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn node_not_found(node_type: &str, version: Option<u32>) -> Self {
        let message = match version {
            Some(v) => format!("no node registered for {node_type}@{v}"),
            None => format!("no node registered for {node_type}"),
        };
        Self::new(ErrorCode::NodeNotFound, message)
    }

    pub fn timeout(timeout_ms: u64) -> Self {
        Self::new(ErrorCode::Timeout, format!("execution exceeded {timeout_ms}ms deadline"))
    }

    pub fn cancelled(reason: &str) -> Self {
        Self::new(ErrorCode::Cancelled, format!("execution cancelled: {reason}"))
    }

    pub fn sandbox_crash(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SandboxCrash, message)
    }

    pub fn policy_deny(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PolicyDeny, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ParseError, message)
    }

    pub fn isolation_unavailable(level: &str) -> Self {
        Self::new(
            ErrorCode::IsolationUnavailable,
            format!("isolation level {level} is not available and fallback is disabled"),
        )
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NetworkError, message)
    }

    /// Wrap an unclassified failure.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unknown, message)
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
