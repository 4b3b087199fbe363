// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Micro-VM backend.
//!
//! The runner does not ship a VM monitor; deployments provide one through
//! the [`MicroVmDriver`] seam (own rootfs, own network namespace, one VM
//! per execution). Without a driver, `prepare` fails with
//! `ISOLATION_UNAVAILABLE`; selection may degrade to the process backend
//! only when the request sets `allow_fallback`.

use crate::worker::WorkerOutcome;
use crate::{Sandbox, SandboxHandle, SandboxSpec};
use async_trait::async_trait;
use nr_core::{
    ExecutionMetrics, ExecutionRequest, IsolationLevel, LogEntry, NodeError, Payload,
};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Deployment-provided VM monitor.
#[async_trait]
pub trait MicroVmDriver: Send + Sync {
    /// Boot one VM for one execution.
    async fn launch(
        &self,
        request: &ExecutionRequest,
    ) -> Result<Box<dyn MicroVmInstance>, NodeError>;
}

/// One booted VM, exclusively owned by its session.
#[async_trait]
pub trait MicroVmInstance: Send {
    /// Run the node inside the VM and return the worker-shaped outcome.
    async fn exec(
        &mut self,
        request: &ExecutionRequest,
        deadline: Instant,
    ) -> Result<WorkerOutcome, NodeError>;

    /// Stop the VM. Idempotent.
    async fn stop(&mut self);
}

/// Micro-VM backend; available iff a driver is configured.
#[derive(Default)]
pub struct MicroVmSandbox {
    driver: Option<Arc<dyn MicroVmDriver>>,
}

impl MicroVmSandbox {
    pub fn new(driver: Option<Arc<dyn MicroVmDriver>>) -> Self {
        Self { driver }
    }

    pub fn unavailable() -> Self {
        Self { driver: None }
    }
}

#[async_trait]
impl Sandbox for MicroVmSandbox {
    fn isolation(&self) -> IsolationLevel {
        IsolationLevel::Microvm
    }

    fn available(&self) -> bool {
        self.driver.is_some()
    }

    async fn prepare(&self, spec: SandboxSpec) -> Result<Box<dyn SandboxHandle>, NodeError> {
        let driver = self
            .driver
            .as_ref()
            .ok_or_else(|| NodeError::isolation_unavailable("microvm"))?;
        let instance = driver.launch(&spec.request).await?;

        Ok(Box::new(MicroVmHandle {
            instance: Some(instance),
            request: spec.request,
            outcome: None,
            execution_time_ms: 0,
        }))
    }
}

struct MicroVmHandle {
    instance: Option<Box<dyn MicroVmInstance>>,
    request: ExecutionRequest,
    outcome: Option<WorkerOutcome>,
    execution_time_ms: u64,
}

#[async_trait]
impl SandboxHandle for MicroVmHandle {
    async fn run(
        &mut self,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<Payload, NodeError> {
        let instance = self
            .instance
            .as_mut()
            .ok_or_else(|| NodeError::sandbox_crash("microvm handle already disposed"))?;

        let start = Instant::now();
        let outcome = tokio::select! {
            r = instance.exec(&self.request, deadline) => r,
            _ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => {
                instance.stop().await;
                self.execution_time_ms = start.elapsed().as_millis() as u64;
                let timeout_ms = deadline.saturating_duration_since(start).as_millis() as u64;
                return Err(NodeError::timeout(timeout_ms));
            }
            _ = cancel.cancelled() => {
                instance.stop().await;
                self.execution_time_ms = start.elapsed().as_millis() as u64;
                return Err(NodeError::cancelled("microvm stopped"));
            }
        };
        self.execution_time_ms = start.elapsed().as_millis() as u64;

        let outcome = outcome?;
        let result = match (&outcome.output, &outcome.error) {
            (_, Some(error)) => Err(error.clone()),
            (Some(output), None) => Ok(output.clone()),
            (None, None) => Err(NodeError::sandbox_crash("vm outcome had neither output nor error")),
        };
        self.outcome = Some(outcome);
        result
    }

    fn collect_metrics(&mut self) -> ExecutionMetrics {
        let mut metrics = self.outcome.as_ref().map(|o| o.metrics).unwrap_or_default();
        metrics.execution_time_ms = metrics.execution_time_ms.max(self.execution_time_ms);
        metrics
    }

    fn take_logs(&mut self) -> Vec<LogEntry> {
        self.outcome.as_mut().map(|o| std::mem::take(&mut o.logs)).unwrap_or_default()
    }

    async fn dispose(&mut self) {
        if let Some(mut instance) = self.instance.take() {
            instance.stop().await;
        }
    }
}

/// In-memory driver for tests: echoes the input after an optional delay.
#[cfg(any(test, feature = "test-support"))]
pub struct FakeMicroVmDriver {
    pub delay: std::time::Duration,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeMicroVmDriver {
    pub fn immediate() -> Self {
        Self { delay: std::time::Duration::ZERO }
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl MicroVmDriver for FakeMicroVmDriver {
    async fn launch(
        &self,
        _request: &ExecutionRequest,
    ) -> Result<Box<dyn MicroVmInstance>, NodeError> {
        Ok(Box::new(FakeInstance { delay: self.delay }))
    }
}

#[cfg(any(test, feature = "test-support"))]
struct FakeInstance {
    delay: std::time::Duration,
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl MicroVmInstance for FakeInstance {
    async fn exec(
        &mut self,
        request: &ExecutionRequest,
        _deadline: Instant,
    ) -> Result<WorkerOutcome, NodeError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(WorkerOutcome {
            output: Some(request.input_data.clone()),
            error: None,
            metrics: ExecutionMetrics::default(),
            logs: Vec::new(),
        })
    }

    async fn stop(&mut self) {}
}

#[cfg(test)]
#[path = "microvm_tests.rs"]
mod tests;
