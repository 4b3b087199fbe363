// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Metric names shared by every crate that records through the `metrics`
//! facade. Exporter wiring is external to the core; without a recorder
//! installed, recording is a no-op.

/// Counter, labeled `status` ∈ {succeeded, failed, cancelled, timed_out}.
pub const EXECUTIONS_TOTAL: &str = "nr_executions_total";

/// Histogram of wall-clock execution time in milliseconds.
pub const EXECUTION_DURATION_MS: &str = "nr_execution_duration_ms";

/// Gauge of sessions currently in the active set.
pub const ACTIVE_SESSIONS: &str = "nr_active_sessions";

/// Counter, labeled `tenant`, of limiter rejections.
pub const QUOTA_REJECTIONS_TOTAL: &str = "nr_quota_rejections_total";

/// Counter, labeled `type` and `severity`, of auditor violations.
pub const POLICY_VIOLATIONS_TOTAL: &str = "nr_policy_violations_total";

/// Counter, labeled `reason`, of messages routed to the dead-letter queue.
pub const DLQ_TOTAL: &str = "nr_dlq_total";

/// Counter of messages requeued for retry.
pub const RETRIES_TOTAL: &str = "nr_retries_total";
