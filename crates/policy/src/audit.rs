// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Security auditor: violation records and payload/log redaction.
//!
//! The auditor is a cross-cutting observer. It never blocks an execution
//! itself; a *blocked* violation is one whose originating decision function
//! already returned deny, and the record documents that denial.

use crate::pii::PiiPolicy;
use nr_core::{telemetry, ExecutionId, LogEntry, Payload, ViolationId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Category of a recorded violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Outbound network intent denied or logged by policy.
    NetworkEgress,
    /// PII detected in a payload.
    PiiDetected,
    /// Disallowed environment variable access.
    EnvAccess,
    /// Resource ceiling exceeded during a run.
    ResourceLimit,
    /// Disallowed module or capability import.
    ModuleImport,
}

nr_core::simple_display! {
    ViolationKind {
        NetworkEgress => "network_egress",
        PiiDetected => "pii_detected",
        EnvAccess => "env_access",
        ResourceLimit => "resource_limit",
        ModuleImport => "module_import",
    }
}

/// Severity of a recorded violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

nr_core::simple_display! {
    Severity {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
}

/// One recorded violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub id: ViolationId,
    pub execution_id: ExecutionId,
    pub kind: ViolationKind,
    pub severity: Severity,
    pub description: String,
    #[serde(default)]
    pub details: serde_json::Value,
    pub blocked: bool,
    pub at_ms: u64,
}

/// Cross-cutting violation log plus the PII redaction entry points.
#[derive(Default)]
pub struct SecurityAuditor {
    violations: Mutex<Vec<Violation>>,
}

impl SecurityAuditor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a violation. Returns the stored record (id assigned here).
    pub fn record(
        &self,
        execution_id: ExecutionId,
        kind: ViolationKind,
        severity: Severity,
        description: impl Into<String>,
        details: serde_json::Value,
        blocked: bool,
        at_ms: u64,
    ) -> Violation {
        let violation = Violation {
            id: ViolationId::new(),
            execution_id,
            kind,
            severity,
            description: description.into(),
            details,
            blocked,
            at_ms,
        };
        tracing::warn!(
            violation_id = %violation.id,
            execution_id = %execution_id,
            kind = %kind,
            severity = %severity,
            blocked,
            "policy violation recorded"
        );
        metrics::counter!(
            telemetry::POLICY_VIOLATIONS_TOTAL,
            "type" => kind.to_string(),
            "severity" => severity.to_string(),
        )
        .increment(1);
        self.violations.lock().push(violation.clone());
        violation
    }

    /// Point-in-time copy of every recorded violation.
    pub fn snapshot(&self) -> Vec<Violation> {
        self.violations.lock().clone()
    }

    /// Violations recorded for one execution.
    pub fn for_execution(&self, execution_id: ExecutionId) -> Vec<Violation> {
        self.violations
            .lock()
            .iter()
            .filter(|v| v.execution_id == execution_id)
            .cloned()
            .collect()
    }

    /// Redact a payload in place per the PII policy. Records a detection
    /// violation (non-blocking) when anything was rewritten.
    pub fn redact_payload(
        &self,
        execution_id: ExecutionId,
        policy: &PiiPolicy,
        payload: &mut Payload,
        which: &str,
        at_ms: u64,
    ) {
        let (redacted, hits) = policy.redact(&payload.body);
        if hits > 0 {
            payload.body = redacted;
            self.record(
                execution_id,
                ViolationKind::PiiDetected,
                Severity::Medium,
                format!("{hits} PII span(s) redacted from {which} payload"),
                serde_json::json!({ "payload": which, "spans": hits, "mode": policy.mode.to_string() }),
                false,
                at_ms,
            );
        }
    }

    /// Redact captured log lines in place per the PII policy.
    pub fn redact_logs(
        &self,
        execution_id: ExecutionId,
        policy: &PiiPolicy,
        logs: &mut [LogEntry],
        at_ms: u64,
    ) {
        let mut total = 0;
        for entry in logs.iter_mut() {
            let (redacted, hits) = policy.redact(&entry.message);
            if hits > 0 {
                entry.message = redacted;
                total += hits;
            }
        }
        if total > 0 {
            self.record(
                execution_id,
                ViolationKind::PiiDetected,
                Severity::Low,
                format!("{total} PII span(s) redacted from logs"),
                serde_json::json!({ "payload": "logs", "spans": total }),
                false,
                at_ms,
            );
        }
    }
}

#[cfg(test)]
#[path = "audit_tests.rs"]
mod tests;
