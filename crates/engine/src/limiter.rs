// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource limiter: admission control and per-tenant usage tracking.
//!
//! Admission atomically checks tenant concurrency, reserved memory, the
//! global concurrency cap, and the tenant's rolling network window, then
//! reserves. The returned [`AdmissionToken`] releases on drop, so no exit
//! path can leak a reservation.

use nr_core::{telemetry, Clock, ExecutionMetrics, NodeError, TenantId, TokenId};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Limiter caps. Any cap set to 0 is unlimited.
#[derive(Debug, Clone)]
pub struct LimiterConfig {
    pub global_max_concurrency: u32,
    pub tenant_max_concurrency: u32,
    /// Ceiling on the sum of admitted `max_memory_bytes` per tenant.
    pub tenant_max_reserved_bytes: u64,
    /// Ceiling on observed network bytes per tenant per window.
    pub tenant_network_bytes_per_window: u64,
    pub network_window_ms: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            global_max_concurrency: 0,
            tenant_max_concurrency: 10,
            tenant_max_reserved_bytes: 0,
            tenant_network_bytes_per_window: 0,
            network_window_ms: 60_000,
        }
    }
}

/// Why an admission was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub reason: String,
    /// Hard rejections are final (non-retryable); the rest are transient
    /// windows that drain by themselves.
    pub hard: bool,
}

impl From<Rejection> for NodeError {
    fn from(rejection: Rejection) -> Self {
        NodeError::quota_exceeded(rejection.reason, rejection.hard)
    }
}

#[derive(Default, Debug)]
struct TenantUsage {
    running: u32,
    reserved_bytes: u64,
    /// (epoch_ms, bytes) samples inside the rolling network window.
    window: VecDeque<(u64, u64)>,
}

impl TenantUsage {
    fn is_idle(&self) -> bool {
        self.running == 0 && self.reserved_bytes == 0 && self.window.is_empty()
    }
}

#[derive(Default, Debug)]
struct LimiterState {
    global_running: u32,
    tenants: HashMap<TenantId, TenantUsage>,
}

#[derive(Debug)]
struct LimiterInner {
    config: LimiterConfig,
    state: Mutex<LimiterState>,
}

/// Guard for one admitted execution's reservation.
///
/// Releasing is idempotent: explicit `release()` and the drop guard can
/// both run without double-counting.
#[derive(Debug)]
pub struct AdmissionToken {
    id: TokenId,
    tenant_id: TenantId,
    reserved_bytes: u64,
    released: AtomicBool,
    inner: Arc<LimiterInner>,
}

impl AdmissionToken {
    pub fn id(&self) -> TokenId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Return the reservation. Safe to call more than once.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut state = self.inner.state.lock();
        state.global_running = state.global_running.saturating_sub(1);
        if let Some(usage) = state.tenants.get_mut(&self.tenant_id) {
            usage.running = usage.running.saturating_sub(1);
            usage.reserved_bytes = usage.reserved_bytes.saturating_sub(self.reserved_bytes);
            if usage.is_idle() {
                state.tenants.remove(&self.tenant_id);
            }
        }
    }
}

impl Drop for AdmissionToken {
    fn drop(&mut self) {
        self.release();
    }
}

/// Admission control and live usage tracking.
pub struct ResourceLimiter<C: Clock> {
    inner: Arc<LimiterInner>,
    clock: C,
}

impl<C: Clock> ResourceLimiter<C> {
    pub fn new(config: LimiterConfig, clock: C) -> Self {
        Self {
            inner: Arc::new(LimiterInner { config, state: Mutex::new(LimiterState::default()) }),
            clock,
        }
    }

    /// Atomically check every cap and reserve on success.
    pub fn admit(
        &self,
        tenant_id: TenantId,
        max_memory_bytes: u64,
    ) -> Result<AdmissionToken, Rejection> {
        let config = &self.inner.config;
        let now_ms = self.clock.epoch_ms();
        let mut state = self.inner.state.lock();

        if config.global_max_concurrency > 0
            && state.global_running >= config.global_max_concurrency
        {
            return Err(self.reject(
                tenant_id,
                format!("global concurrency cap {} reached", config.global_max_concurrency),
                false,
            ));
        }

        let usage = state.tenants.entry(tenant_id).or_default();

        if config.tenant_max_concurrency > 0 && usage.running >= config.tenant_max_concurrency {
            return Err(self.reject(
                tenant_id,
                format!("tenant concurrency cap {} reached", config.tenant_max_concurrency),
                false,
            ));
        }

        if config.tenant_max_reserved_bytes > 0
            && usage.reserved_bytes + max_memory_bytes > config.tenant_max_reserved_bytes
        {
            return Err(self.reject(
                tenant_id,
                format!(
                    "tenant memory budget exhausted ({} of {} bytes reserved)",
                    usage.reserved_bytes, config.tenant_max_reserved_bytes
                ),
                true,
            ));
        }

        if config.tenant_network_bytes_per_window > 0 {
            prune_window(&mut usage.window, now_ms, config.network_window_ms);
            let in_window: u64 = usage.window.iter().map(|(_, b)| b).sum();
            if in_window >= config.tenant_network_bytes_per_window {
                return Err(self.reject(
                    tenant_id,
                    format!(
                        "tenant network window exhausted ({in_window} of {} bytes)",
                        config.tenant_network_bytes_per_window
                    ),
                    false,
                ));
            }
        }

        usage.running += 1;
        usage.reserved_bytes += max_memory_bytes;
        state.global_running += 1;

        Ok(AdmissionToken {
            id: TokenId::new(),
            tenant_id,
            reserved_bytes: max_memory_bytes,
            released: AtomicBool::new(false),
            inner: Arc::clone(&self.inner),
        })
    }

    fn reject(&self, tenant_id: TenantId, reason: String, hard: bool) -> Rejection {
        metrics::counter!(telemetry::QUOTA_REJECTIONS_TOTAL, "tenant" => tenant_id.to_string())
            .increment(1);
        tracing::debug!(tenant_id = %tenant_id, reason = %reason, hard, "admission rejected");
        Rejection { reason, hard }
    }

    /// Record realized counters into the tenant's rolling window.
    pub fn observe(&self, tenant_id: TenantId, metrics: &ExecutionMetrics) {
        let bytes = metrics.bytes_sent + metrics.bytes_received;
        if bytes == 0 {
            return;
        }
        let now_ms = self.clock.epoch_ms();
        let window_ms = self.inner.config.network_window_ms;
        let mut state = self.inner.state.lock();
        let usage = state.tenants.entry(tenant_id).or_default();
        usage.window.push_back((now_ms, bytes));
        prune_window(&mut usage.window, now_ms, window_ms);
    }

    /// Live usage for one tenant: (running, reserved_bytes).
    pub fn tenant_usage(&self, tenant_id: &TenantId) -> (u32, u64) {
        let state = self.inner.state.lock();
        state
            .tenants
            .get(tenant_id)
            .map(|u| (u.running, u.reserved_bytes))
            .unwrap_or((0, 0))
    }

    pub fn global_running(&self) -> u32 {
        self.inner.state.lock().global_running
    }
}

fn prune_window(window: &mut VecDeque<(u64, u64)>, now_ms: u64, window_ms: u64) {
    while let Some((at_ms, _)) = window.front() {
        if now_ms.saturating_sub(*at_ms) > window_ms {
            window.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
#[path = "limiter_tests.rs"]
mod tests;
