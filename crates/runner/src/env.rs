// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the runner daemon.

use nr_core::IsolationLevel;
use nr_policy::PiiMode;
use std::time::Duration;

/// Worker slots and broker prefetch (`NR_CONCURRENCY`, default 4).
pub fn concurrency() -> usize {
    parse("NR_CONCURRENCY").unwrap_or(4)
}

/// Isolation for requests that name none (`NR_ISOLATION_DEFAULT`).
pub fn isolation_default() -> IsolationLevel {
    std::env::var("NR_ISOLATION_DEFAULT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(IsolationLevel::InProcess)
}

/// Comma-separated domain suffix allowlist (`NR_ALLOWED_EGRESS`).
pub fn allowed_egress() -> Vec<String> {
    std::env::var("NR_ALLOWED_EGRESS")
        .ok()
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Whether the micro-VM backend may be used when a driver is configured
/// (`NR_ENABLE_MICROVM`, default false).
pub fn enable_microvm() -> bool {
    std::env::var("NR_ENABLE_MICROVM")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Identity the child-process workers drop to (`NR_SANDBOX_UID`/`_GID`).
pub fn sandbox_uid() -> Option<u32> {
    parse("NR_SANDBOX_UID")
}

pub fn sandbox_gid() -> Option<u32> {
    parse("NR_SANDBOX_GID")
}

/// AMQP endpoint (`NR_QUEUE_URL`).
pub fn queue_url() -> String {
    std::env::var("NR_QUEUE_URL").unwrap_or_else(|_| "amqp://127.0.0.1:5672/%2f".to_string())
}

/// Work queue name (`NR_QUEUE`).
pub fn queue_name() -> String {
    std::env::var("NR_QUEUE").unwrap_or_else(|_| "nr.executions".to_string())
}

/// Retry budget before dead-lettering (`NR_MAX_RETRIES`, default 3).
pub fn max_retries() -> u32 {
    parse("NR_MAX_RETRIES").unwrap_or(3)
}

/// Shutdown drain deadline (`NR_DRAIN_DEADLINE_MS`, default 30s).
pub fn drain_deadline() -> Duration {
    parse("NR_DRAIN_DEADLINE_MS").map(Duration::from_millis).unwrap_or(Duration::from_secs(30))
}

/// Redaction mode when a request omits one (`NR_PII_MODE`, default mask).
pub fn pii_mode() -> PiiMode {
    std::env::var("NR_PII_MODE").ok().and_then(|s| s.parse().ok()).unwrap_or(PiiMode::Mask)
}

fn parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
