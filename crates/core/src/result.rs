// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The terminal execution result, realized metrics, and captured logs.

use crate::error::{ErrorCode, NodeError};
use crate::id::ExecutionId;
use crate::request::Payload;
use serde::{Deserialize, Serialize};

/// Severity of a captured log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

crate::simple_display! {
    LogLevel {
        Debug => "debug",
        Info => "info",
        Warn => "warn",
        Error => "error",
    }
}

/// One log line captured during a run, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp_ms: u64,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn new(timestamp_ms: u64, level: LogLevel, message: impl Into<String>) -> Self {
        Self { timestamp_ms, level, message: message.into() }
    }
}

/// Realized resource usage for one execution.
///
/// Finalized by the backend before the result is emitted; the limiter's
/// rolling windows consume the network counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    pub execution_time_ms: u64,
    pub memory_used_bytes: u64,
    pub cpu_time_ms: u64,
    pub network_requests: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub file_operations: u64,
}

impl ExecutionMetrics {
    /// Merge counters accumulated by a capability (e.g. the HTTP helper)
    /// into the backend's own measurements.
    pub fn absorb(&mut self, other: &ExecutionMetrics) {
        self.network_requests += other.network_requests;
        self.bytes_sent += other.bytes_sent;
        self.bytes_received += other.bytes_received;
        self.file_operations += other.file_operations;
        self.memory_used_bytes = self.memory_used_bytes.max(other.memory_used_bytes);
        self.cpu_time_ms += other.cpu_time_ms;
    }
}

/// Single terminal result for one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub execution_id: ExecutionId,
    pub success: bool,
    #[serde(default)]
    pub output_data: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(default)]
    pub retryable: bool,
    #[serde(default)]
    pub metrics: ExecutionMetrics,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

impl ExecutionResult {
    pub fn success(execution_id: ExecutionId, output_data: Payload) -> Self {
        Self {
            execution_id,
            success: true,
            output_data,
            error_message: None,
            error_code: None,
            retryable: false,
            metrics: ExecutionMetrics::default(),
            logs: Vec::new(),
        }
    }

    /// Failure shape: `output_data` is always empty, code/message/retryable
    /// come from the normalized error.
    pub fn failure(execution_id: ExecutionId, error: &NodeError) -> Self {
        Self {
            execution_id,
            success: false,
            output_data: Payload::empty(),
            error_message: Some(error.message.clone()),
            error_code: Some(error.code),
            retryable: error.retryable,
            metrics: ExecutionMetrics::default(),
            logs: Vec::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: ExecutionMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_logs(mut self, logs: Vec<LogEntry>) -> Self {
        self.logs = logs;
        self
    }

    /// Status label used for the `executions_total{status}` counter.
    pub fn status_label(&self) -> &'static str {
        if self.success {
            return "succeeded";
        }
        match self.error_code {
            Some(ErrorCode::Timeout) => "timed_out",
            Some(ErrorCode::Cancelled) => "cancelled",
            _ => "failed",
        }
    }
}

#[cfg(test)]
#[path = "result_tests.rs"]
mod tests;
