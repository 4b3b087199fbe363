// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child-process worker entry.
//!
//! The process backend re-execs the runner binary with [`NODE_WORKER_FLAG`].
//! The worker reads one JSON-encoded [`ExecutionRequest`] from stdin,
//! applies its resource limits *to itself* (rlimit, then gid/uid drop),
//! executes the node with the in-process executor over the builtin
//! registry, and writes one [`WorkerOutcome`] frame to stdout.
//!
//! Applying limits inside the child instead of via `pre_exec` keeps the
//! workspace free of unsafe code; by the time node code runs, the limits
//! are in place.

use crate::inprocess::InProcessSandbox;
use crate::{Sandbox, SandboxSpec};
use nix::sys::resource::{getrusage, setrlimit, Resource, UsageWho};
use nix::unistd::{setgid, setuid, Gid, Uid};
use nr_core::{
    Clock, ExecutionMetrics, ExecutionRequest, LogEntry, NodeError, Payload, SystemClock,
    MAX_TIMEOUT_MS,
};
use nr_nodes::registry::builtin_registry;
use nr_policy::{CompiledPolicy, NetworkPolicyDoc, SecurityAuditor};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// CLI flag that switches the runner binary into worker mode.
pub const NODE_WORKER_FLAG: &str = "--node-worker";

/// Environment variables the parent uses to pass sandbox identity.
pub const ENV_SANDBOX_UID: &str = "NR_SANDBOX_UID";
pub const ENV_SANDBOX_GID: &str = "NR_SANDBOX_GID";

/// The single frame a worker writes to stdout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerOutcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<NodeError>,
    #[serde(default)]
    pub metrics: ExecutionMetrics,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

impl WorkerOutcome {
    pub fn from_error(error: NodeError) -> Self {
        Self { output: None, error: Some(error), metrics: ExecutionMetrics::default(), logs: Vec::new() }
    }
}

/// Worker-mode entry point. Returns the process exit code.
///
/// Exit code 0 means a frame was written (success or structured error);
/// non-zero means the worker could not even produce a frame and the parent
/// must treat the run as a sandbox crash.
pub async fn run_node_worker() -> i32 {
    let mut body = String::new();
    if std::io::stdin().read_to_string(&mut body).is_err() {
        tracing::error!("node worker could not read stdin");
        return 2;
    }

    let request: ExecutionRequest = match serde_json::from_str(&body) {
        Ok(req) => req,
        Err(e) => {
            tracing::error!(error = %e, "node worker received undecodable request");
            return 2;
        }
    };

    let outcome = match apply_self_limits(&request) {
        Ok(()) => execute_request(request).await,
        Err(e) => WorkerOutcome::from_error(e),
    };

    match serde_json::to_string(&outcome) {
        Ok(frame) => {
            println!("{frame}");
            0
        }
        Err(e) => {
            tracing::error!(error = %e, "node worker could not encode outcome");
            2
        }
    }
}

/// Apply rlimits and drop privileges, in that order. gid before uid:
/// setgid is no longer permitted once uid drops.
fn apply_self_limits(request: &ExecutionRequest) -> Result<(), NodeError> {
    let max_memory = request.runtime_config.max_memory_bytes;
    if max_memory > 0 {
        setrlimit(Resource::RLIMIT_AS, max_memory, max_memory)
            .map_err(|e| NodeError::sandbox_crash(format!("setrlimit failed: {e}")))?;
    }

    if let Some(gid) = env_id(ENV_SANDBOX_GID) {
        setgid(Gid::from_raw(gid))
            .map_err(|e| NodeError::sandbox_crash(format!("setgid({gid}) failed: {e}")))?;
    }
    if let Some(uid) = env_id(ENV_SANDBOX_UID) {
        setuid(Uid::from_raw(uid))
            .map_err(|e| NodeError::sandbox_crash(format!("setuid({uid}) failed: {e}")))?;
    }
    Ok(())
}

fn env_id(var: &str) -> Option<u32> {
    std::env::var(var).ok().and_then(|v| v.parse().ok())
}

/// Execute the request with the in-process executor over the builtin
/// registry. The worker enforces its own deadline as a second line of
/// defense; the parent's hard kill is the first.
async fn execute_request(request: ExecutionRequest) -> WorkerOutcome {
    let epoch = SystemClock.epoch_fn();

    let policy_doc: NetworkPolicyDoc = if request.security_context.network.is_null() {
        NetworkPolicyDoc::permit_all()
    } else {
        match serde_json::from_value(request.security_context.network.clone()) {
            Ok(doc) => doc,
            Err(e) => {
                return WorkerOutcome::from_error(NodeError::validation(format!(
                    "invalid network policy document: {e}"
                )));
            }
        }
    };
    let policy = match CompiledPolicy::compile(&policy_doc) {
        Ok(p) => Arc::new(p),
        Err(e) => return WorkerOutcome::from_error(e),
    };
    let auditor = Arc::new(SecurityAuditor::new());

    let registry = builtin_registry();
    let node = match registry.resolve(&request.node_type, request.node_version) {
        Ok(node) => node,
        Err(e) => return WorkerOutcome::from_error(e),
    };

    let timeout_ms = request.runtime_config.effective_timeout_ms().min(MAX_TIMEOUT_MS);
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    let cancel = CancellationToken::new();

    let sandbox = InProcessSandbox::new();
    let mut handle = match sandbox
        .prepare(SandboxSpec {
            request,
            node,
            policy,
            auditor,
            epoch,
        })
        .await
    {
        Ok(handle) => handle,
        Err(e) => return WorkerOutcome::from_error(e),
    };

    let result = handle.run(deadline, &cancel).await;
    let metrics = merge_rusage(handle.collect_metrics());
    let logs = handle.take_logs();
    handle.dispose().await;

    match result {
        Ok(output) => WorkerOutcome { output: Some(output), error: None, metrics, logs },
        Err(error) => WorkerOutcome { output: None, error: Some(error), metrics, logs },
    }
}

/// Fold the worker's own rusage into the reported metrics: peak RSS and
/// CPU time are only measurable from inside the child.
fn merge_rusage(mut metrics: ExecutionMetrics) -> ExecutionMetrics {
    if let Ok(usage) = getrusage(UsageWho::RUSAGE_SELF) {
        // ru_maxrss is KiB on Linux.
        let max_rss_bytes = (usage.max_rss().max(0) as u64) * 1024;
        metrics.memory_used_bytes = metrics.memory_used_bytes.max(max_rss_bytes);

        let user = usage.user_time();
        let system = usage.system_time();
        let cpu_ms = (user.tv_sec() as u64 + system.tv_sec() as u64) * 1_000
            + (user.tv_usec() as u64 + system.tv_usec() as u64) / 1_000;
        metrics.cpu_time_ms = metrics.cpu_time_ms.max(cpu_ms);
    }
    metrics
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
