// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory broker implementing the same contract as the AMQP transport.
//!
//! Honors priority ordering (higher first, FIFO within a priority) and the
//! requeue/reject semantics, with introspection hooks for specs.

use crate::{Broker, BrokerError, Delivery};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Notify;

#[derive(Debug, Clone)]
struct QueuedMessage {
    body: Vec<u8>,
    retry_count: u32,
    reply_to: Option<String>,
    priority: u8,
    seq: u64,
}

#[derive(Default)]
struct MemState {
    queue: Vec<QueuedMessage>,
    pending: HashMap<u64, QueuedMessage>,
    dlq: Vec<(Vec<u8>, String)>,
    published: HashMap<String, Vec<(Vec<u8>, u8)>>,
}

/// Test/spec broker backed by plain vectors.
#[derive(Default)]
pub struct InMemoryBroker {
    state: Mutex<MemState>,
    notify: Notify,
    closed: AtomicBool,
    next_tag: AtomicU64,
    next_seq: AtomicU64,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a message as the orchestrator would.
    pub fn push(&self, body: Vec<u8>, priority: u8, retry_count: u32, reply_to: Option<String>) {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.state.lock().queue.push(QueuedMessage {
            body,
            retry_count,
            reply_to,
            priority,
            seq,
        });
        self.notify.notify_waiters();
    }

    /// Stop delivering; `next` returns `None` once the queue drains.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Dead-lettered messages with their reasons.
    pub fn dlq(&self) -> Vec<(Vec<u8>, String)> {
        self.state.lock().dlq.clone()
    }

    /// Bodies published to a named queue.
    pub fn published(&self, queue: &str) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .published
            .get(queue)
            .map(|v| v.iter().map(|(b, _)| b.clone()).collect())
            .unwrap_or_default()
    }

    pub fn queue_len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    fn pop_highest_priority(&self) -> Option<(u64, QueuedMessage)> {
        let mut state = self.state.lock();
        if state.queue.is_empty() {
            return None;
        }
        // Higher priority first, FIFO within a priority level.
        let best = state
            .queue
            .iter()
            .enumerate()
            .max_by_key(|(_, m)| (m.priority, std::cmp::Reverse(m.seq)))
            .map(|(i, _)| i)?;
        let message = state.queue.remove(best);
        let tag = self.next_tag.fetch_add(1, Ordering::SeqCst);
        state.pending.insert(tag, message.clone());
        Some((tag, message))
    }

    fn settle(&self, tag: u64) -> Result<QueuedMessage, BrokerError> {
        self.state
            .lock()
            .pending
            .remove(&tag)
            .ok_or_else(|| BrokerError::Ack(format!("unknown delivery tag {tag}")))
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn next(&self) -> Result<Option<Delivery>, BrokerError> {
        loop {
            // Register interest before checking the queue so a push racing
            // this check cannot be missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some((tag, message)) = self.pop_highest_priority() {
                return Ok(Some(Delivery {
                    tag,
                    body: message.body,
                    retry_count: message.retry_count,
                    reply_to: message.reply_to,
                    priority: message.priority,
                }));
            }
            if self.closed.load(Ordering::SeqCst) {
                return Ok(None);
            }
            notified.await;
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        self.settle(delivery.tag).map(|_| ())
    }

    async fn requeue(&self, delivery: &Delivery, retry_count: u32) -> Result<(), BrokerError> {
        let message = self.settle(delivery.tag)?;
        self.push(message.body, message.priority, retry_count, message.reply_to);
        Ok(())
    }

    async fn reject(&self, delivery: &Delivery, reason: &str) -> Result<(), BrokerError> {
        let message = self.settle(delivery.tag)?;
        self.state.lock().dlq.push((message.body, reason.to_string()));
        Ok(())
    }

    async fn publish(&self, queue: &str, body: Vec<u8>, priority: u8) -> Result<(), BrokerError> {
        self.state
            .lock()
            .published
            .entry(queue.to_string())
            .or_default()
            .push((body, priority));
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
