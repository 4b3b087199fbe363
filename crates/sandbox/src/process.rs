// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Forked child-process backend.
//!
//! One short-lived OS process per execution: the runner binary re-exec'd in
//! worker mode (see [`crate::worker`]), talking JSON over stdin/stdout. The
//! parent enforces the wall-clock deadline with a hard kill (SIGTERM, a
//! short grace, then SIGKILL) and a 120s upper bound independent of the
//! request's own timeout.

use crate::worker::{WorkerOutcome, ENV_SANDBOX_GID, ENV_SANDBOX_UID, NODE_WORKER_FLAG};
use crate::{Sandbox, SandboxHandle, SandboxSpec};
use async_trait::async_trait;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use nr_core::{
    ExecutionMetrics, IsolationLevel, LogEntry, LogLevel, NodeError, Payload, MAX_TIMEOUT_MS,
};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

/// Configuration for the process backend.
#[derive(Debug, Clone)]
pub struct ProcessSandboxConfig {
    /// Worker binary; defaults to the current executable.
    pub worker_path: Option<PathBuf>,
    /// Drop the child to this uid (worker applies it to itself).
    pub sandbox_uid: Option<u32>,
    /// Drop the child to this gid.
    pub sandbox_gid: Option<u32>,
    /// Grace between SIGTERM and SIGKILL.
    pub term_grace: Duration,
}

impl Default for ProcessSandboxConfig {
    fn default() -> Self {
        Self {
            worker_path: None,
            sandbox_uid: None,
            sandbox_gid: None,
            term_grace: Duration::from_secs(2),
        }
    }
}

/// Factory spawning one worker process per execution.
#[derive(Default)]
pub struct ProcessSandbox {
    config: ProcessSandboxConfig,
}

impl ProcessSandbox {
    pub fn new(config: ProcessSandboxConfig) -> Self {
        Self { config }
    }

    fn worker_binary(&self) -> Result<PathBuf, NodeError> {
        match &self.config.worker_path {
            Some(path) => Ok(path.clone()),
            None => std::env::current_exe()
                .map_err(|e| NodeError::sandbox_crash(format!("cannot locate worker binary: {e}"))),
        }
    }
}

#[async_trait]
impl Sandbox for ProcessSandbox {
    fn isolation(&self) -> IsolationLevel {
        IsolationLevel::Process
    }

    async fn prepare(&self, spec: SandboxSpec) -> Result<Box<dyn SandboxHandle>, NodeError> {
        let binary = self.worker_binary()?;
        let frame = serde_json::to_vec(&spec.request)
            .map_err(|e| NodeError::sandbox_crash(format!("cannot encode worker frame: {e}")))?;

        let mut command = Command::new(&binary);
        command
            .arg(NODE_WORKER_FLAG)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .env_clear();

        // Minimal environment: PATH plus the request's explicit allowlist.
        if let Ok(path) = std::env::var("PATH") {
            command.env("PATH", path);
        }
        for key in &spec.request.security_context.env_allowlist {
            if let Ok(value) = std::env::var(key) {
                command.env(key, value);
            }
        }
        if let Some(uid) = self.config.sandbox_uid {
            command.env(ENV_SANDBOX_UID, uid.to_string());
        }
        if let Some(gid) = self.config.sandbox_gid {
            command.env(ENV_SANDBOX_GID, gid.to_string());
        }

        let child = command.spawn().map_err(|e| {
            NodeError::sandbox_crash(format!("failed to spawn worker process: {e}"))
        })?;

        tracing::debug!(
            execution_id = %spec.request.execution_id,
            pid = child.id().unwrap_or(0),
            "worker process spawned"
        );

        Ok(Box::new(ProcessHandle {
            child: Some(child),
            frame,
            term_grace: self.config.term_grace,
            outcome: None,
            stderr_tail: Vec::new(),
            execution_time_ms: 0,
            epoch: spec.epoch,
        }))
    }
}

struct ProcessHandle {
    child: Option<Child>,
    frame: Vec<u8>,
    term_grace: Duration,
    outcome: Option<WorkerOutcome>,
    stderr_tail: Vec<String>,
    execution_time_ms: u64,
    epoch: crate::EpochFn,
}

impl ProcessHandle {
    /// SIGTERM, wait out the grace period, then SIGKILL.
    async fn terminate(&mut self) {
        let Some(child) = self.child.as_mut() else {
            return;
        };
        if let Some(pid) = child.id() {
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            let graceful =
                tokio::time::timeout(self.term_grace, child.wait()).await.is_ok();
            if graceful {
                self.child = None;
                return;
            }
        }
        let _ = child.kill().await;
        self.child = None;
    }
}

#[async_trait]
impl SandboxHandle for ProcessHandle {
    async fn run(
        &mut self,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<Payload, NodeError> {
        let start = Instant::now();
        // Hard per-process upper bound, independent of the request timeout.
        let hard_deadline = start + Duration::from_millis(MAX_TIMEOUT_MS);
        let effective = deadline.min(hard_deadline);

        let mut child = self
            .child
            .take()
            .ok_or_else(|| NodeError::sandbox_crash("process handle already consumed"))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&self.frame)
                .await
                .map_err(|e| NodeError::sandbox_crash(format!("worker stdin write failed: {e}")))?;
            // Close the pipe so the worker sees EOF.
            drop(stdin);
        }

        // Collect stdout/stderr concurrently so the child never blocks on a
        // full pipe.
        let stdout_task = child.stdout.take().map(|mut out| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = out.read_to_end(&mut buf).await;
                buf
            })
        });
        let stderr_task = child.stderr.take().map(|mut err| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = err.read_to_end(&mut buf).await;
                buf
            })
        });

        let waited = tokio::select! {
            status = child.wait() => Some(status),
            _ = tokio::time::sleep_until(tokio::time::Instant::from_std(effective)) => None,
            _ = cancel.cancelled() => {
                self.child = Some(child);
                self.terminate().await;
                self.execution_time_ms = start.elapsed().as_millis() as u64;
                return Err(NodeError::cancelled("worker process terminated"));
            }
        };

        self.execution_time_ms = start.elapsed().as_millis() as u64;

        let Some(status) = waited else {
            // Deadline fired first: hard kill, report timeout.
            self.child = Some(child);
            self.terminate().await;
            let timeout_ms = effective.duration_since(start).as_millis() as u64;
            return Err(NodeError::timeout(timeout_ms));
        };

        let status = status
            .map_err(|e| NodeError::sandbox_crash(format!("worker wait failed: {e}")))?;

        let stdout = match stdout_task {
            Some(task) => task.await.unwrap_or_default(),
            None => Vec::new(),
        };
        if let Some(task) = stderr_task {
            let stderr = task.await.unwrap_or_default();
            self.stderr_tail = String::from_utf8_lossy(&stderr)
                .lines()
                .map(str::to_string)
                .collect();
        }

        if !status.success() {
            return Err(NodeError::sandbox_crash(format!(
                "worker exited with {}",
                status.code().map(|c| c.to_string()).unwrap_or_else(|| "signal".into())
            )));
        }

        // The frame is the last non-empty stdout line.
        let text = String::from_utf8_lossy(&stdout);
        let frame_line = text
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| NodeError::sandbox_crash("worker produced no output frame"))?;
        let outcome: WorkerOutcome = serde_json::from_str(frame_line)
            .map_err(|e| NodeError::sandbox_crash(format!("undecodable worker frame: {e}")))?;

        let result = match (&outcome.output, &outcome.error) {
            (_, Some(error)) => Err(error.clone()),
            (Some(output), None) => Ok(output.clone()),
            (None, None) => Err(NodeError::sandbox_crash("worker frame had neither output nor error")),
        };
        self.outcome = Some(outcome);
        result
    }

    fn collect_metrics(&mut self) -> ExecutionMetrics {
        let mut metrics =
            self.outcome.as_ref().map(|o| o.metrics).unwrap_or_default();
        metrics.execution_time_ms = metrics.execution_time_ms.max(self.execution_time_ms);
        metrics
    }

    fn take_logs(&mut self) -> Vec<LogEntry> {
        let mut logs = self
            .outcome
            .as_mut()
            .map(|o| std::mem::take(&mut o.logs))
            .unwrap_or_default();
        let now_ms = (self.epoch)();
        for line in self.stderr_tail.drain(..) {
            logs.push(LogEntry::new(now_ms, LogLevel::Error, line));
        }
        logs
    }

    async fn dispose(&mut self) {
        if self.child.is_some() {
            self.terminate().await;
        }
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
