// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capability context injected into node executions.

use crate::http::PolicyHttpClient;
use nr_core::{ExecutionId, LogEntry, LogLevel, Payload};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub use nr_core::EpochFn;

/// Ordered, thread-safe log capture for one execution.
///
/// Lines arrive from the node itself, from capabilities, and (for the
/// process backend) forwarded from the child; arrival order is preserved.
#[derive(Clone)]
pub struct LogSink {
    entries: Arc<Mutex<Vec<LogEntry>>>,
    epoch: EpochFn,
}

impl LogSink {
    pub fn new(epoch: EpochFn) -> Self {
        Self { entries: Arc::new(Mutex::new(Vec::new())), epoch }
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let entry = LogEntry::new((self.epoch)(), level, message);
        self.entries.lock().push(entry);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    /// Append an already-stamped entry (child-process log forwarding).
    pub fn push_raw(&self, entry: LogEntry) {
        self.entries.lock().push(entry);
    }

    /// Take every captured line, leaving the sink empty.
    pub fn drain(&self) -> Vec<LogEntry> {
        std::mem::take(&mut *self.entries.lock())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Everything a node implementation may touch during one execution.
///
/// No file system, no process spawning, no raw sockets: the injected
/// capability set is the node's entire world.
pub struct NodeContext {
    pub execution_id: ExecutionId,
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub input: Payload,
    /// Opaque credential material resolved by the engine, when requested.
    pub credentials: Option<String>,
    pub logger: LogSink,
    /// Policy-mediated HTTP; absent when the policy grants no egress.
    pub http: Option<Arc<PolicyHttpClient>>,
    pub cancel: CancellationToken,
    epoch: EpochFn,
}

impl NodeContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        execution_id: ExecutionId,
        parameters: serde_json::Map<String, serde_json::Value>,
        input: Payload,
        credentials: Option<String>,
        logger: LogSink,
        http: Option<Arc<PolicyHttpClient>>,
        cancel: CancellationToken,
        epoch: EpochFn,
    ) -> Self {
        Self { execution_id, parameters, input, credentials, logger, http, cancel, epoch }
    }

    pub fn epoch_ms(&self) -> u64 {
        (self.epoch)()
    }

    /// String parameter accessor.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(|v| v.as_str())
    }

    /// Unsigned integer parameter accessor.
    pub fn param_u64(&self, key: &str) -> Option<u64> {
        self.parameters.get(key).and_then(|v| v.as_u64())
    }

    pub fn param(&self, key: &str) -> Option<&serde_json::Value> {
        self.parameters.get(key)
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
