// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Discrete events the runner emits on its broadcast bus.
//!
//! Counters and histograms go through the `metrics` facade (see
//! [`crate::telemetry`]); anything an external observer needs as a discrete
//! occurrence is a [`RunnerEvent`].

use crate::id::{ExecutionId, TenantId, ViolationId};
use crate::request::IsolationLevel;
use crate::session::SessionState;
use serde::{Deserialize, Serialize};

/// Events emitted by the engine and auditor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RunnerEvent {
    /// A session entered the active set.
    SessionStarted {
        execution_id: ExecutionId,
        tenant_id: TenantId,
        isolation: IsolationLevel,
    },

    /// A session recorded its terminal state and left the active set.
    SessionCompleted {
        execution_id: ExecutionId,
        state: SessionState,
        duration_ms: u64,
    },

    /// First effective cancel call for a session. Emitted at most once per
    /// execution regardless of how many times cancel is called.
    SessionCancelled { execution_id: ExecutionId, reason: String },

    /// The security auditor recorded a violation.
    ViolationRecorded {
        violation_id: ViolationId,
        execution_id: ExecutionId,
        kind: String,
        severity: String,
        blocked: bool,
    },

    /// The resource limiter rejected an admission.
    QuotaRejected { tenant_id: TenantId, reason: String, hard: bool },
}

impl RunnerEvent {
    /// Event name for log spans (e.g. "session_cancelled")
    pub fn name(&self) -> &'static str {
        match self {
            RunnerEvent::SessionStarted { .. } => "session_started",
            RunnerEvent::SessionCompleted { .. } => "session_completed",
            RunnerEvent::SessionCancelled { .. } => "session_cancelled",
            RunnerEvent::ViolationRecorded { .. } => "violation_recorded",
            RunnerEvent::QuotaRejected { .. } => "quota_rejected",
        }
    }

    /// Key-value pairs for structured logging
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            RunnerEvent::SessionStarted { execution_id, tenant_id, isolation } => vec![
                ("execution_id", execution_id.to_string()),
                ("tenant_id", tenant_id.to_string()),
                ("isolation", isolation.to_string()),
            ],
            RunnerEvent::SessionCompleted { execution_id, state, duration_ms } => vec![
                ("execution_id", execution_id.to_string()),
                ("state", state.to_string()),
                ("duration_ms", duration_ms.to_string()),
            ],
            RunnerEvent::SessionCancelled { execution_id, reason } => vec![
                ("execution_id", execution_id.to_string()),
                ("reason", reason.clone()),
            ],
            RunnerEvent::ViolationRecorded {
                violation_id,
                execution_id,
                kind,
                severity,
                blocked,
            } => vec![
                ("violation_id", violation_id.to_string()),
                ("execution_id", execution_id.to_string()),
                ("kind", kind.clone()),
                ("severity", severity.clone()),
                ("blocked", blocked.to_string()),
            ],
            RunnerEvent::QuotaRejected { tenant_id, reason, hard } => vec![
                ("tenant_id", tenant_id.to_string()),
                ("reason", reason.clone()),
                ("hard", hard.to_string()),
            ],
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
