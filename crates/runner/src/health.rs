// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Liveness and readiness signals for an external collector.
//!
//! The runner exposes no HTTP surface of its own (that belongs to the
//! deployment); this handle is the in-process source of truth an external
//! exporter polls.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct HealthInner {
    broker_connected: AtomicBool,
    free_slots: AtomicUsize,
    registry_populated: AtomicBool,
    limiter_initialized: AtomicBool,
}

/// Shared health handle; cheap to clone.
#[derive(Clone, Default)]
pub struct Health {
    inner: Arc<HealthInner>,
}

/// Point-in-time health, JSON-encodable for the collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub live: bool,
    pub ready: bool,
    pub broker_connected: bool,
    pub free_slots: usize,
}

impl Health {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_broker_connected(&self, connected: bool) {
        self.inner.broker_connected.store(connected, Ordering::SeqCst);
    }

    pub fn set_free_slots(&self, slots: usize) {
        self.inner.free_slots.store(slots, Ordering::SeqCst);
    }

    pub fn set_registry_populated(&self, populated: bool) {
        self.inner.registry_populated.store(populated, Ordering::SeqCst);
    }

    pub fn set_limiter_initialized(&self, initialized: bool) {
        self.inner.limiter_initialized.store(initialized, Ordering::SeqCst);
    }

    /// Liveness: consumer connected and at least one worker slot free.
    pub fn is_live(&self) -> bool {
        self.inner.broker_connected.load(Ordering::SeqCst)
            && self.inner.free_slots.load(Ordering::SeqCst) > 0
    }

    /// Readiness: plugin registry populated and limiter initialized.
    pub fn is_ready(&self) -> bool {
        self.inner.registry_populated.load(Ordering::SeqCst)
            && self.inner.limiter_initialized.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            live: self.is_live(),
            ready: self.is_ready(),
            broker_connected: self.inner.broker_connected.load(Ordering::SeqCst),
            free_slots: self.inner.free_slots.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
