// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared rig for the integration specs: a full pipeline over the
//! in-memory broker with the real builtin registry and real backends.

use nr_broker::{Consumer, ConsumerConfig, InMemoryBroker};
use nr_core::{ExecutionRequest, ExecutionResult, SystemClock};
use nr_engine::{ExecutionEngine, LimiterConfig, ResourceLimiter};
use nr_nodes::registry::builtin_registry;
use nr_policy::SecurityAuditor;
use nr_sandbox::{
    InProcessSandbox, MicroVmSandbox, ProcessSandbox, ProcessSandboxConfig, SandboxSet,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub type SpecEngine = ExecutionEngine<SystemClock>;
pub type SpecConsumer = Consumer<InMemoryBroker, SystemClock>;

pub struct Pipeline {
    pub broker: Arc<InMemoryBroker>,
    pub engine: Arc<SpecEngine>,
    pub consumer: Arc<SpecConsumer>,
    pub shutdown: CancellationToken,
}

pub fn engine_with(
    limiter: LimiterConfig,
    process_config: ProcessSandboxConfig,
) -> Arc<SpecEngine> {
    let clock = SystemClock;
    Arc::new(ExecutionEngine::new(
        clock.clone(),
        Arc::new(builtin_registry()),
        Arc::new(SandboxSet::new(
            InProcessSandbox::new(),
            ProcessSandbox::new(process_config),
            MicroVmSandbox::unavailable(),
            None,
        )),
        Arc::new(ResourceLimiter::new(limiter, clock)),
        Arc::new(SecurityAuditor::new()),
    ))
}

pub fn pipeline(limiter: LimiterConfig, consumer_config: ConsumerConfig) -> Pipeline {
    pipeline_with(limiter, consumer_config, ProcessSandboxConfig::default())
}

pub fn pipeline_with(
    limiter: LimiterConfig,
    consumer_config: ConsumerConfig,
    process_config: ProcessSandboxConfig,
) -> Pipeline {
    let broker = Arc::new(InMemoryBroker::new());
    let engine = engine_with(limiter, process_config);
    let shutdown = CancellationToken::new();
    let consumer = Arc::new(Consumer::new(
        Arc::clone(&broker),
        Arc::clone(&engine),
        consumer_config,
        shutdown.clone(),
    ));
    Pipeline { broker, engine, consumer, shutdown }
}

impl Pipeline {
    /// Enqueue a request the way the orchestrator would.
    pub fn enqueue(&self, request: &ExecutionRequest, retry_count: u32) {
        let body = serde_json::to_vec(request).unwrap();
        self.broker.push(
            body,
            request.runtime_config.clamped_priority(),
            retry_count,
            request.reply_to.clone(),
        );
    }

    /// Run the consumer until the queue settles, then stop it.
    pub async fn run_to_idle(&self) {
        let task = {
            let consumer = Arc::clone(&self.consumer);
            tokio::spawn(async move { consumer.run().await })
        };
        for _ in 0..600 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if self.broker.queue_len() == 0 && self.broker.pending_len() == 0 {
                break;
            }
        }
        self.shutdown.cancel();
        task.await.unwrap().unwrap();
    }

    /// Decode the single reply published to `queue`.
    pub fn single_reply(&self, queue: &str) -> ExecutionResult {
        let replies = self.broker.published(queue);
        assert_eq!(replies.len(), 1, "expected exactly one reply on {queue}");
        serde_json::from_slice(&replies[0]).unwrap()
    }
}

/// Executable shell script standing in for the worker binary (specs cannot
/// re-exec the test harness as `nrd`).
pub fn fake_worker_script(dir: &tempfile::TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("worker.sh");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "#!/bin/sh").unwrap();
    writeln!(file, "{body}").unwrap();
    drop(file);
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    path
}
