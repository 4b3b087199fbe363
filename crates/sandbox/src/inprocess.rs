// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process sandbox: fastest backend, restricted capability surface.
//!
//! The node runs as a future on the session's own task. It sees nothing but
//! the injected capability set: a scoped logger, the policy-mediated HTTP
//! client, and its parameter/input bags. No file system, no child
//! processes, no raw sockets.

use crate::{Sandbox, SandboxHandle, SandboxSpec};
use async_trait::async_trait;
use nr_core::{
    ExecutionMetrics, IsolationLevel, LogEntry, NodeError, Payload,
};
use nr_nodes::{LogSink, NodeContext, NodeHandler, PolicyHttpClient};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Stateless factory for in-process handles.
#[derive(Default)]
pub struct InProcessSandbox;

impl InProcessSandbox {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Sandbox for InProcessSandbox {
    fn isolation(&self) -> IsolationLevel {
        IsolationLevel::InProcess
    }

    async fn prepare(&self, spec: SandboxSpec) -> Result<Box<dyn SandboxHandle>, NodeError> {
        let logger = LogSink::new(Arc::clone(&spec.epoch));
        let http = Arc::new(PolicyHttpClient::new(
            Arc::clone(&spec.policy),
            Arc::clone(&spec.auditor),
            spec.request.execution_id,
            Arc::clone(&spec.epoch),
        ));

        Ok(Box::new(InProcessHandle {
            node: Arc::clone(&spec.node),
            logger: logger.clone(),
            http: Arc::clone(&http),
            context: Some(NodeContext::new(
                spec.request.execution_id,
                spec.request.parameters.clone(),
                spec.request.input_data.clone(),
                spec.request.credentials_ref.clone(),
                logger,
                Some(http),
                CancellationToken::new(),
                Arc::clone(&spec.epoch),
            )),
            metrics: ExecutionMetrics::default(),
        }))
    }
}

struct InProcessHandle {
    node: Arc<dyn NodeHandler>,
    logger: LogSink,
    http: Arc<PolicyHttpClient>,
    context: Option<NodeContext>,
    metrics: ExecutionMetrics,
}

#[async_trait]
impl SandboxHandle for InProcessHandle {
    async fn run(
        &mut self,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<Payload, NodeError> {
        let mut context = self
            .context
            .take()
            .ok_or_else(|| NodeError::sandbox_crash("in-process handle already consumed"))?;
        // The node observes the session's cancel signal directly.
        context.cancel = cancel.clone();

        let start = Instant::now();
        let remaining = deadline.saturating_duration_since(start);

        let result = tokio::select! {
            r = self.node.execute(&context) => r,
            _ = tokio::time::sleep(remaining) => {
                Err(NodeError::timeout(remaining.as_millis() as u64))
            }
            _ = cancel.cancelled() => {
                Err(NodeError::cancelled("session cancelled"))
            }
        };

        self.metrics.execution_time_ms = start.elapsed().as_millis() as u64;
        result
    }

    fn collect_metrics(&mut self) -> ExecutionMetrics {
        let mut metrics = self.metrics;
        metrics.absorb(&self.http.metrics());
        metrics
    }

    fn take_logs(&mut self) -> Vec<LogEntry> {
        self.logger.drain()
    }

    async fn dispose(&mut self) {
        // Nothing OS-level to release; dropping the context is enough.
        self.context = None;
    }
}

#[cfg(test)]
#[path = "inprocess_tests.rs"]
mod tests;
