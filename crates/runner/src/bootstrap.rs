// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Component wiring and the daemon run loop.

use crate::env;
use crate::health::Health;
use nr_broker::{AmqpBroker, AmqpConfig, Broker, Consumer, ConsumerConfig};
use nr_core::{IsolationLevel, SystemClock};
use nr_engine::{ExecutionEngine, LimiterConfig, ResourceLimiter};
use nr_nodes::registry::builtin_registry;
use nr_policy::{PiiMode, SecurityAuditor};
use nr_sandbox::{
    InProcessSandbox, MicroVmDriver, MicroVmSandbox, ProcessSandbox, ProcessSandboxConfig,
    SandboxSet, WasmSandbox,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Everything the daemon reads from the environment, gathered once.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub concurrency: usize,
    pub isolation_default: IsolationLevel,
    pub allowed_egress: Vec<String>,
    pub enable_microvm: bool,
    pub sandbox_uid: Option<u32>,
    pub sandbox_gid: Option<u32>,
    pub queue_url: String,
    pub queue: String,
    pub max_retries: u32,
    pub drain_deadline: Duration,
    pub pii_mode: PiiMode,
}

impl RunnerConfig {
    pub fn from_env() -> Self {
        Self {
            concurrency: env::concurrency(),
            isolation_default: env::isolation_default(),
            allowed_egress: env::allowed_egress(),
            enable_microvm: env::enable_microvm(),
            sandbox_uid: env::sandbox_uid(),
            sandbox_gid: env::sandbox_gid(),
            queue_url: env::queue_url(),
            queue: env::queue_name(),
            max_retries: env::max_retries(),
            drain_deadline: env::drain_deadline(),
            pii_mode: env::pii_mode(),
        }
    }
}

/// Daemon-level failures.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error(transparent)]
    Broker(#[from] nr_broker::BrokerError),
    #[error("signal handler install failed: {0}")]
    Signal(std::io::Error),
}

/// Build the engine from a config; the micro-VM driver is injected by the
/// deployment (none ships with the runner).
pub fn build_engine(
    config: &RunnerConfig,
    microvm_driver: Option<Arc<dyn MicroVmDriver>>,
) -> Arc<ExecutionEngine<SystemClock>> {
    let clock = SystemClock;

    let process = ProcessSandbox::new(ProcessSandboxConfig {
        worker_path: None,
        sandbox_uid: config.sandbox_uid,
        sandbox_gid: config.sandbox_gid,
        term_grace: Duration::from_secs(2),
    });
    let microvm = if config.enable_microvm {
        MicroVmSandbox::new(microvm_driver)
    } else {
        MicroVmSandbox::unavailable()
    };
    let wasm = match WasmSandbox::new() {
        Ok(wasm) => Some(wasm),
        Err(e) => {
            tracing::warn!(error = %e, "wasm backend unavailable");
            None
        }
    };
    let sandboxes = Arc::new(SandboxSet::new(InProcessSandbox::new(), process, microvm, wasm));

    let limiter = Arc::new(ResourceLimiter::new(LimiterConfig::default(), clock.clone()));

    Arc::new(
        ExecutionEngine::new(
            clock,
            Arc::new(builtin_registry()),
            sandboxes,
            limiter,
            Arc::new(SecurityAuditor::new()),
        )
        .with_default_isolation(config.isolation_default)
        .with_default_pii_mode(config.pii_mode)
        .with_egress_allowlist(config.allowed_egress.clone()),
    )
}

/// Run the daemon until a signal arrives and the drain completes.
pub async fn run_runner(
    config: RunnerConfig,
    microvm_driver: Option<Arc<dyn MicroVmDriver>>,
) -> Result<(), RunnerError> {
    tracing::info!(
        concurrency = config.concurrency,
        queue = %config.queue,
        isolation_default = %config.isolation_default,
        "runner starting"
    );

    let shutdown = CancellationToken::new();
    install_signal_handlers(shutdown.clone())?;

    let engine = build_engine(&config, microvm_driver);

    let health = Health::new();
    health.set_registry_populated(true);
    health.set_limiter_initialized(true);

    let amqp = AmqpConfig::new(&config.queue_url, &config.queue, config.concurrency as u16);
    let broker = Arc::new(AmqpBroker::connect_with_retry(amqp, &shutdown).await?);
    health.set_broker_connected(true);

    let consumer = Arc::new(Consumer::new(
        Arc::clone(&broker),
        engine,
        ConsumerConfig {
            concurrency: config.concurrency,
            max_retries: config.max_retries,
            drain_deadline: config.drain_deadline,
        },
        shutdown.clone(),
    ));

    // Refresh the health signals the external collector polls.
    let refresher = {
        let health = health.clone();
        let broker = Arc::clone(&broker);
        let consumer = Arc::clone(&consumer);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {
                        health.set_broker_connected(broker.is_connected());
                        health.set_free_slots(consumer.available_slots());
                    }
                }
            }
        })
    };

    let result = consumer.run().await;
    shutdown.cancel();
    let _ = refresher.await;

    tracing::info!("runner stopped");
    result.map_err(RunnerError::from)
}

fn install_signal_handlers(shutdown: CancellationToken) -> Result<(), RunnerError> {
    let mut sigterm =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .map_err(RunnerError::Signal)?;
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("SIGINT received, draining");
            }
            _ = sigterm.recv() => {
                tracing::info!("SIGTERM received, draining");
            }
        }
        shutdown.cancel();
    });
    Ok(())
}
