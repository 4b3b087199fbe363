// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! nr-sandbox: the four isolation backends behind one contract.
//!
//! Every backend implements [`Sandbox`]: `prepare` produces an exclusive
//! [`SandboxHandle`] owned by the session, `run` races the node against the
//! deadline and the cancel signal, `collect_metrics`/`take_logs` finalize
//! observability data, `dispose` tears the backend down. Disposal runs on
//! every exit path; a handle is never reused.

pub mod inprocess;
pub mod microvm;
pub mod process;
pub mod select;
pub mod wasm;
pub mod worker;

use async_trait::async_trait;
use nr_core::{
    ExecutionMetrics, ExecutionRequest, IsolationLevel, LogEntry, NodeError, Payload,
};
use nr_nodes::NodeHandler;
use nr_policy::{CompiledPolicy, SecurityAuditor};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

pub use inprocess::InProcessSandbox;
pub use microvm::{MicroVmDriver, MicroVmInstance, MicroVmSandbox};
pub use process::{ProcessSandbox, ProcessSandboxConfig};
pub use select::SandboxSet;
pub use wasm::WasmSandbox;
pub use worker::{run_node_worker, WorkerOutcome, NODE_WORKER_FLAG};

#[cfg(any(test, feature = "test-support"))]
pub use microvm::FakeMicroVmDriver;

pub use nr_core::EpochFn;

/// Everything a backend needs to prepare one execution.
pub struct SandboxSpec {
    pub request: ExecutionRequest,
    pub node: Arc<dyn NodeHandler>,
    pub policy: Arc<CompiledPolicy>,
    pub auditor: Arc<SecurityAuditor>,
    pub epoch: EpochFn,
}

/// One isolation backend.
#[async_trait]
pub trait Sandbox: Send + Sync {
    fn isolation(&self) -> IsolationLevel;

    /// Whether this backend can serve executions in this deployment.
    fn available(&self) -> bool {
        true
    }

    /// Acquire a backend handle for one execution.
    async fn prepare(&self, spec: SandboxSpec) -> Result<Box<dyn SandboxHandle>, NodeError>;
}

/// Exclusive, single-use handle for one running execution.
#[async_trait]
pub trait SandboxHandle: Send {
    /// Run to completion, the deadline, or cancellation — whichever fires
    /// first. The engine races the same deadline cooperatively; backends
    /// with a hard-kill facility also enforce it themselves.
    async fn run(
        &mut self,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<Payload, NodeError>;

    /// Finalized resource usage. Called once, after `run` returns.
    fn collect_metrics(&mut self) -> ExecutionMetrics;

    /// Captured log lines in arrival order. Called once, after `run`.
    fn take_logs(&mut self) -> Vec<LogEntry>;

    /// Release the backend. Idempotent; runs on every exit path.
    async fn dispose(&mut self);
}

impl std::fmt::Debug for dyn SandboxHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SandboxHandle")
    }
}
