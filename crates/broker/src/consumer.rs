// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The message consumer: outermost driver of the runner.
//!
//! Bounded concurrency (one semaphore permit per in-flight message,
//! prefetch bounded to the same number), strict decode with straight-to-DLQ
//! on failure, reply publishing for terminal results, retry accounting via
//! the `x-retry-count` header, and drain-deadline shutdown.

use crate::{Broker, BrokerError, Delivery};
use nr_core::{telemetry, Clock, ErrorCode, ExecutionRequest, ExecutionResult};
use nr_engine::ExecutionEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Consumer knobs, all environment-driven in the daemon.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Worker slots; also the broker prefetch bound.
    pub concurrency: usize,
    /// Redeliveries before a retryable failure dead-letters.
    pub max_retries: u32,
    /// How long shutdown waits for in-flight sessions before cancelling.
    pub drain_deadline: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self { concurrency: 4, max_retries: 3, drain_deadline: Duration::from_secs(30) }
    }
}

/// Pulls step requests, drives the engine, settles every message.
pub struct Consumer<B: Broker, C: Clock + 'static> {
    broker: Arc<B>,
    engine: Arc<ExecutionEngine<C>>,
    config: ConsumerConfig,
    shutdown: CancellationToken,
    slots: Arc<Semaphore>,
}

impl<B: Broker, C: Clock + 'static> Consumer<B, C> {
    pub fn new(
        broker: Arc<B>,
        engine: Arc<ExecutionEngine<C>>,
        config: ConsumerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let slots = Arc::new(Semaphore::new(config.concurrency.max(1)));
        Self { broker, engine, config, shutdown, slots }
    }

    /// Free worker slots right now (liveness reporting).
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn is_connected(&self) -> bool {
        self.broker.is_connected()
    }

    /// Run until shutdown fires or the source closes, then drain.
    ///
    /// Drain: stop accepting, wait up to the drain deadline for in-flight
    /// sessions to finish naturally, cancel the rest, wait for their
    /// (immediate) terminal results.
    pub async fn run(&self) -> Result<(), BrokerError> {
        let mut in_flight: JoinSet<()> = JoinSet::new();

        loop {
            // Backpressure: hold a slot before taking a message.
            let permit = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                permit = Arc::clone(&self.slots).acquire_owned() => {
                    match permit {
                        Ok(p) => p,
                        Err(_) => break,
                    }
                }
            };

            let delivery = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    drop(permit);
                    break;
                }
                next = self.broker.next() => next?,
            };
            let Some(delivery) = delivery else {
                drop(permit);
                tracing::info!("message source closed");
                break;
            };

            let broker = Arc::clone(&self.broker);
            let engine = Arc::clone(&self.engine);
            let config = self.config.clone();
            in_flight.spawn(async move {
                handle_delivery(broker, engine, config, delivery).await;
                drop(permit);
            });

            // Reap already-finished workers without blocking the loop.
            while in_flight.try_join_next().is_some() {}
        }

        self.drain(in_flight).await;
        Ok(())
    }

    async fn drain(&self, mut in_flight: JoinSet<()>) {
        if in_flight.is_empty() {
            return;
        }
        tracing::info!(
            in_flight = in_flight.len(),
            drain_deadline_ms = self.config.drain_deadline.as_millis() as u64,
            "draining in-flight executions"
        );

        let drained = tokio::time::timeout(self.config.drain_deadline, async {
            while in_flight.join_next().await.is_some() {}
        })
        .await
        .is_ok();

        if !drained {
            let cancelled = self.engine.cancel_all("runner shutdown");
            tracing::warn!(cancelled, "drain deadline reached, cancelling remaining sessions");
            while in_flight.join_next().await.is_some() {}
        }
    }
}

/// Per-message protocol (spec order): decode, execute, publish terminal
/// reply, settle via ack / requeue / DLQ.
async fn handle_delivery<B: Broker, C: Clock + 'static>(
    broker: Arc<B>,
    engine: Arc<ExecutionEngine<C>>,
    config: ConsumerConfig,
    delivery: Delivery,
) {
    // 1. Strict decode; failures go straight to the DLQ.
    let request: ExecutionRequest = match serde_json::from_slice(&delivery.body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, "undecodable message routed to DLQ");
            settle_reject(&broker, &delivery, &format!("PARSE_ERROR: {e}")).await;
            return;
        }
    };

    // The broker's header is authoritative for retry accounting.
    let mut request = request;
    request.retry_count = delivery.retry_count;
    let reply_queue = delivery.reply_to.clone().or_else(|| request.reply_to.clone());
    let priority = request.runtime_config.clamped_priority();

    // 2. Execute to the single terminal result.
    let mut result = engine.execute(request).await;

    // 3. Retryable with budget left: requeue with the incremented header.
    //    No reply is published for a non-terminal attempt.
    if !result.success && result.retryable && delivery.retry_count < config.max_retries {
        metrics::counter!(telemetry::RETRIES_TOTAL).increment(1);
        tracing::info!(
            execution_id = %result.execution_id,
            retry_count = delivery.retry_count + 1,
            "requeueing retryable failure"
        );
        if let Err(e) = broker.requeue(&delivery, delivery.retry_count + 1).await {
            tracing::error!(error = %e, "requeue failed");
        }
        return;
    }

    // Retry budget exhausted: the result the requester sees is final.
    if !result.success && result.retryable {
        result.retryable = false;
    }

    // 4. Terminal result: publish the reply, then settle the source.
    if let Some(queue) = reply_queue {
        match serde_json::to_vec(&result) {
            Ok(body) => {
                if let Err(e) = broker.publish(&queue, body, priority).await {
                    tracing::error!(error = %e, queue = %queue, "reply publish failed");
                }
            }
            Err(e) => tracing::error!(error = %e, "result encode failed"),
        }
    }

    if result.success {
        if let Err(e) = broker.ack(&delivery).await {
            tracing::error!(error = %e, "ack failed");
        }
        return;
    }

    let reason = result
        .error_code
        .map(|c| c.to_string())
        .unwrap_or_else(|| ErrorCode::Unknown.to_string());
    settle_reject(&broker, &delivery, &reason).await;
}

async fn settle_reject<B: Broker>(broker: &Arc<B>, delivery: &Delivery, reason: &str) {
    metrics::counter!(telemetry::DLQ_TOTAL, "reason" => reason.to_string()).increment(1);
    if let Err(e) = broker.reject(delivery, reason).await {
        tracing::error!(error = %e, "dead-letter routing failed");
    }
}

/// Encode a result the way replies are published (spec wire shape).
pub fn encode_result(result: &ExecutionResult) -> Result<Vec<u8>, BrokerError> {
    serde_json::to_vec(result).map_err(|e| BrokerError::Publish(e.to_string()))
}

#[cfg(test)]
#[path = "consumer_tests.rs"]
mod tests;
