// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! nr-broker: the durable queue contract and the message consumer.
//!
//! One [`Broker`] trait covers the AMQP deployment ([`AmqpBroker`]) and the
//! in-memory double used by specs. The [`Consumer`] is the outermost
//! driver: bounded concurrency, strict decode, reply publishing, retry
//! accounting, dead-letter routing, and drain-deadline shutdown.

pub mod amqp;
pub mod consumer;

#[cfg(any(test, feature = "test-support"))]
pub mod memory;

use async_trait::async_trait;

pub use amqp::{AmqpBroker, AmqpConfig};
pub use consumer::{Consumer, ConsumerConfig};

#[cfg(any(test, feature = "test-support"))]
pub use memory::InMemoryBroker;

/// Header carrying the redelivery count. Part of the wire contract with
/// the orchestrator; the retry *budget* is configuration.
pub const RETRY_COUNT_HEADER: &str = "x-retry-count";

/// Header carrying the dead-letter reason.
pub const REASON_HEADER: &str = "reason";

/// Content type of every body this runner produces or accepts.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// One received message, decoupled from the transport.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Transport-local tag used for ack/nack bookkeeping.
    pub tag: u64,
    pub body: Vec<u8>,
    /// Value of `x-retry-count` (0 on first delivery).
    pub retry_count: u32,
    /// `reply-to` header; overrides the body's own `reply_to`.
    pub reply_to: Option<String>,
    pub priority: u8,
}

/// Errors from the broker transport.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("broker connection failed: {0}")]
    Connection(String),
    #[error("broker stream closed")]
    Closed,
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("acknowledge failed: {0}")]
    Ack(String),
}

/// The durable queue as the consumer sees it.
///
/// AMQP cannot mutate headers on a nack, so "requeue with incremented
/// retry header" is specified as republish-then-ack; implementations keep
/// that atomicity as close as the transport allows.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Next delivery; `Ok(None)` means the source is closed.
    async fn next(&self) -> Result<Option<Delivery>, BrokerError>;

    /// Acknowledge a fully handled message.
    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError>;

    /// Put the message back on the source queue with `retry_count` in its
    /// retry header, then acknowledge the original.
    async fn requeue(&self, delivery: &Delivery, retry_count: u32) -> Result<(), BrokerError>;

    /// Route the original body to the dead-letter queue with a `reason`
    /// header; the source message is settled.
    async fn reject(&self, delivery: &Delivery, reason: &str) -> Result<(), BrokerError>;

    /// Publish a result body to a named queue.
    async fn publish(&self, queue: &str, body: Vec<u8>, priority: u8)
        -> Result<(), BrokerError>;

    /// Transport liveness for health reporting.
    fn is_connected(&self) -> bool {
        true
    }
}
