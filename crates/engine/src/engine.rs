// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The execution engine: one request in, exactly one terminal result out.

use crate::limiter::ResourceLimiter;
use crate::sessions::{ActiveSessions, CancelOutcome};
use nr_core::{
    telemetry, Clock, ErrorCode, ExecutionMetrics, ExecutionRequest, ExecutionResult,
    ExecutionSession, ExecutionId, IsolationLevel, NodeError, Payload, RunnerEvent,
    SessionSnapshot, SessionState,
};
use nr_nodes::{NodeHandler, PluginRegistry};
use nr_policy::{CompiledPolicy, NetworkPolicyDoc, PiiPolicy, SecurityAuditor};
use nr_sandbox::{Sandbox, SandboxHandle, SandboxSet, SandboxSpec};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Engine-side slack on top of the backend deadline. The backend enforces
/// the real deadline (hard kill where it can); this guard only catches a
/// backend that fails to honor its contract.
const DEADLINE_GRACE: Duration = Duration::from_secs(1);

/// Capacity of the runner event bus.
const EVENT_BUS_CAPACITY: usize = 256;

/// Per-request orchestration: validation, admission, backend selection,
/// lifecycle tracking, cancellation, result assembly.
pub struct ExecutionEngine<C: Clock> {
    clock: C,
    registry: Arc<PluginRegistry>,
    sandboxes: Arc<SandboxSet>,
    limiter: Arc<ResourceLimiter<C>>,
    auditor: Arc<SecurityAuditor>,
    sessions: ActiveSessions,
    events: broadcast::Sender<RunnerEvent>,
    default_isolation: IsolationLevel,
    default_pii_mode: nr_policy::PiiMode,
    egress_allowlist: Vec<String>,
}

impl<C: Clock + 'static> ExecutionEngine<C> {
    pub fn new(
        clock: C,
        registry: Arc<PluginRegistry>,
        sandboxes: Arc<SandboxSet>,
        limiter: Arc<ResourceLimiter<C>>,
        auditor: Arc<SecurityAuditor>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            clock,
            registry,
            sandboxes,
            limiter,
            auditor,
            sessions: ActiveSessions::new(),
            events,
            default_isolation: IsolationLevel::InProcess,
            default_pii_mode: nr_policy::PiiMode::Mask,
            egress_allowlist: Vec::new(),
        }
    }

    /// Isolation applied when a request does not name one
    /// (`NR_ISOLATION_DEFAULT`).
    pub fn with_default_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.default_isolation = isolation;
        self
    }

    /// Redaction mode applied when a request asks for PII handling without
    /// naming a mode (`NR_PII_MODE`).
    pub fn with_default_pii_mode(mut self, mode: nr_policy::PiiMode) -> Self {
        self.default_pii_mode = mode;
        self
    }

    /// Runner-level egress allowlist (`NR_ALLOWED_EGRESS`): becomes the
    /// allowed-domains set of any request whose policy document does not
    /// carry its own.
    pub fn with_egress_allowlist(mut self, domains: Vec<String>) -> Self {
        self.egress_allowlist = domains;
        self
    }

    /// Subscribe to the runner event bus.
    pub fn subscribe(&self) -> broadcast::Receiver<RunnerEvent> {
        self.events.subscribe()
    }

    /// Point-in-time snapshot of the active set.
    pub fn active_sessions(&self) -> Vec<SessionSnapshot> {
        self.sessions.snapshot()
    }

    /// The auditor shared with capabilities and backends.
    pub fn auditor(&self) -> &Arc<SecurityAuditor> {
        &self.auditor
    }

    pub fn limiter(&self) -> &Arc<ResourceLimiter<C>> {
        &self.limiter
    }

    /// Cancel one execution. Idempotent: repeated calls (and calls after
    /// completion) succeed without effect; at most one `session_cancelled`
    /// event is ever emitted per execution.
    pub fn cancel(&self, execution_id: ExecutionId, reason: &str) -> bool {
        match self.sessions.request_cancel(execution_id, reason) {
            CancelOutcome::Signalled => {
                self.emit(RunnerEvent::SessionCancelled {
                    execution_id,
                    reason: reason.to_string(),
                });
                true
            }
            CancelOutcome::AlreadySignalled | CancelOutcome::NotActive => false,
        }
    }

    /// Cancel everything still active (shutdown path).
    pub fn cancel_all(&self, reason: &str) -> usize {
        let signalled = self.sessions.cancel_all(reason);
        for execution_id in &signalled {
            self.emit(RunnerEvent::SessionCancelled {
                execution_id: *execution_id,
                reason: reason.to_string(),
            });
        }
        signalled.len()
    }

    /// Execute one request to its single terminal result. Never panics
    /// across this boundary; every failure is normalized into the taxonomy
    /// and every acquisition is released before returning.
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        let started = self.clock.now();
        let execution_id = request.execution_id;

        tracing::info!(
            execution_id = %execution_id,
            tenant_id = %request.tenant_id,
            node_type = %request.node_type,
            isolation = %request.security_context.isolation.unwrap_or(self.default_isolation),
            "execution received"
        );

        let result = match self.run_to_terminal(request, started).await {
            Ok(result) => result,
            Err(error) => ExecutionResult::failure(execution_id, &error),
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        metrics::counter!(telemetry::EXECUTIONS_TOTAL, "status" => result.status_label())
            .increment(1);
        metrics::histogram!(telemetry::EXECUTION_DURATION_MS).record(duration_ms as f64);

        tracing::info!(
            execution_id = %execution_id,
            status = result.status_label(),
            duration_ms,
            "execution finished"
        );
        result
    }

    /// Everything from validation to terminal state. Failures before a
    /// session exists bubble out as errors; once a session is inserted,
    /// this always returns a result and always tears the session down.
    async fn run_to_terminal(
        &self,
        mut request: ExecutionRequest,
        started: Instant,
    ) -> Result<ExecutionResult, NodeError> {
        request.validate()?;

        let pii = parse_pii(&request, self.default_pii_mode)?;
        let policy = Arc::new(compile_network_policy(&request, &self.egress_allowlist)?);

        // Input-side redaction happens before any backend sees the payload.
        if let Some(pii) = &pii {
            self.auditor.redact_payload(
                request.execution_id,
                pii,
                &mut request.input_data,
                "input",
                self.clock.epoch_ms(),
            );
        }

        // Admission gate. The token releases on drop on every path below.
        let token = self
            .limiter
            .admit(request.tenant_id, request.runtime_config.max_memory_bytes)
            .map_err(|rejection| {
                self.emit(RunnerEvent::QuotaRejected {
                    tenant_id: request.tenant_id,
                    reason: rejection.reason.clone(),
                    hard: rejection.hard,
                });
                NodeError::from(rejection)
            })?;

        let node = self.registry.resolve(&request.node_type, request.node_version)?;

        let requested_isolation =
            request.security_context.isolation.unwrap_or(self.default_isolation);
        let effective_isolation =
            self.sandboxes.select(requested_isolation, request.security_context.allow_fallback)?;

        // From here on a session exists and all paths converge in finalize.
        let session = ExecutionSession::new(
            request.execution_id,
            request.tenant_id,
            effective_isolation,
            self.clock.epoch_ms(),
        );
        let cancel = self.sessions.insert(session);
        metrics::gauge!(telemetry::ACTIVE_SESSIONS).set(self.sessions.len() as f64);
        self.emit(RunnerEvent::SessionStarted {
            execution_id: request.execution_id,
            tenant_id: request.tenant_id,
            isolation: effective_isolation,
        });

        let outcome = self
            .drive_session(&request, node, policy, effective_isolation, &cancel, started)
            .await;

        let result = self.finalize(&request, pii.as_ref(), outcome, started);
        token.release();
        Ok(result)
    }

    /// Prepare and run under the session's cancel token and deadline.
    async fn drive_session(
        &self,
        request: &ExecutionRequest,
        node: Arc<dyn NodeHandler>,
        policy: Arc<CompiledPolicy>,
        effective_isolation: IsolationLevel,
        cancel: &CancellationToken,
        started: Instant,
    ) -> SessionOutcome {
        let execution_id = request.execution_id;
        let timeout_ms = request.runtime_config.effective_timeout_ms();
        let deadline = started + Duration::from_millis(timeout_ms);

        self.sessions.transition(execution_id, SessionState::Preparing, self.clock.epoch_ms());

        let sandbox = match self.sandboxes.sandbox(effective_isolation) {
            Ok(sandbox) => sandbox,
            Err(error) => return SessionOutcome::unprepared(error),
        };

        let spec = SandboxSpec {
            request: request.clone(),
            node,
            policy,
            auditor: Arc::clone(&self.auditor),
            epoch: self.clock.epoch_fn(),
        };

        // The backend enforces deadline and cancellation itself; the engine
        // re-checks both so a misbehaving backend cannot wedge the session.
        let engine_deadline = tokio::time::Instant::from_std(deadline + DEADLINE_GRACE);

        // Preparation also observes cancellation and the deadline: a session
        // cancelled while its backend boots never runs.
        let prepared = tokio::select! {
            p = sandbox.prepare(spec) => p,
            _ = tokio::time::sleep_until(engine_deadline) => Err(NodeError::timeout(timeout_ms)),
            _ = cancel.cancelled() => Err(self.cancel_error(execution_id)),
        };
        let mut handle = match prepared {
            Ok(handle) => handle,
            Err(error) => return SessionOutcome::unprepared(error),
        };

        self.sessions.transition(execution_id, SessionState::Running, self.clock.epoch_ms());
        let run_result = tokio::select! {
            r = handle.run(deadline, cancel) => r,
            _ = tokio::time::sleep_until(engine_deadline) => Err(NodeError::timeout(timeout_ms)),
            _ = cancel.cancelled() => Err(self.cancel_error(execution_id)),
        };

        // Cancellation may have surfaced from inside the backend as a
        // generic error; prefer the recorded reason.
        let run_result = match run_result {
            Err(e) if e.code == ErrorCode::Cancelled => Err(self.cancel_error(execution_id)),
            other => other,
        };

        let mut metrics = handle.collect_metrics();
        if metrics.execution_time_ms == 0 {
            metrics.execution_time_ms = started.elapsed().as_millis() as u64;
        }
        let logs = handle.take_logs();
        handle.dispose().await;

        SessionOutcome { result: run_result, metrics, logs }
    }

    fn cancel_error(&self, execution_id: ExecutionId) -> NodeError {
        let reason = self
            .sessions
            .cancel_reason(execution_id)
            .unwrap_or_else(|| "unspecified".to_string());
        NodeError::cancelled(&reason)
    }

    /// Output validation, output/log redaction, terminal recording,
    /// observation, and result assembly.
    fn finalize(
        &self,
        request: &ExecutionRequest,
        pii: Option<&PiiPolicy>,
        outcome: SessionOutcome,
        started: Instant,
    ) -> ExecutionResult {
        let execution_id = request.execution_id;
        let now_ms = self.clock.epoch_ms();
        let SessionOutcome { result, mut metrics, mut logs } = outcome;

        // Output shape validation belongs to the node implementation.
        let result = result.and_then(|payload| {
            // resolve() in drive_session succeeded, so this lookup cannot
            // miss; failure here would be a registry mutation mid-flight.
            match self.registry.resolve(&request.node_type, request.node_version) {
                Ok(node) => node.validate_output(&payload).map(|()| payload),
                Err(_) => Ok(payload),
            }
        });

        let mut result = match result {
            Ok(mut output) => {
                if let Some(pii) = pii {
                    self.auditor.redact_payload(execution_id, pii, &mut output, "output", now_ms);
                }
                ExecutionResult::success(execution_id, output)
            }
            Err(error) => ExecutionResult::failure(execution_id, &error),
        };

        if let Some(pii) = pii {
            self.auditor.redact_logs(execution_id, pii, &mut logs, now_ms);
        }

        metrics.execution_time_ms = metrics.execution_time_ms.max(
            started.elapsed().as_millis() as u64,
        );

        // File-operation ceiling is audited after the fact: the run is
        // already over, so the record documents the excess.
        let file_cap = request.security_context.limits.max_file_operations;
        if file_cap > 0 && metrics.file_operations > file_cap {
            self.auditor.record(
                execution_id,
                nr_policy::ViolationKind::ResourceLimit,
                nr_policy::Severity::Medium,
                format!("{} file operations exceeded the cap of {file_cap}", metrics.file_operations),
                serde_json::json!({ "file_operations": metrics.file_operations, "cap": file_cap }),
                false,
                now_ms,
            );
        }

        self.limiter.observe(request.tenant_id, &metrics);
        result.metrics = metrics;
        result.logs = logs;

        let terminal = match (result.success, result.error_code) {
            (true, _) => SessionState::Succeeded,
            (false, Some(ErrorCode::Timeout)) => SessionState::TimedOut,
            (false, Some(ErrorCode::Cancelled)) => SessionState::Cancelled,
            (false, _) => SessionState::Failed,
        };
        self.sessions.transition(execution_id, terminal, now_ms);
        let session = self.sessions.remove(execution_id);
        metrics::gauge!(telemetry::ACTIVE_SESSIONS).set(self.sessions.len() as f64);

        let duration_ms = session
            .and_then(|s| s.ended_at_ms.map(|end| end.saturating_sub(s.started_at_ms)))
            .unwrap_or(result.metrics.execution_time_ms);
        self.emit(RunnerEvent::SessionCompleted {
            execution_id,
            state: terminal,
            duration_ms,
        });

        result
    }

    fn emit(&self, event: RunnerEvent) {
        let fields = event.fields();
        tracing::debug!(event = event.name(), ?fields, "runner event");
        let _ = self.events.send(event);
    }
}

struct SessionOutcome {
    result: Result<Payload, NodeError>,
    metrics: ExecutionMetrics,
    logs: Vec<nr_core::LogEntry>,
}

impl SessionOutcome {
    fn unprepared(error: NodeError) -> Self {
        Self { result: Err(error), metrics: ExecutionMetrics::default(), logs: Vec::new() }
    }
}

fn compile_network_policy(
    request: &ExecutionRequest,
    egress_allowlist: &[String],
) -> Result<CompiledPolicy, NodeError> {
    let network = &request.security_context.network;
    let mut doc: NetworkPolicyDoc = if network.is_null() {
        NetworkPolicyDoc::permit_all()
    } else {
        serde_json::from_value(network.clone())
            .map_err(|e| NodeError::validation(format!("invalid network policy document: {e}")))?
    };
    if doc.allowed_domains.is_empty() && !egress_allowlist.is_empty() {
        doc.allowed_domains = egress_allowlist.to_vec();
    }
    // The security context's connection ceiling applies when the policy
    // document does not set a tighter one.
    let context_cap = request.security_context.limits.max_connections;
    if doc.max_connections == 0 && context_cap > 0 {
        doc.max_connections = context_cap;
    }
    CompiledPolicy::compile(&doc)
}

fn parse_pii(
    request: &ExecutionRequest,
    default_mode: nr_policy::PiiMode,
) -> Result<Option<PiiPolicy>, NodeError> {
    match &request.security_context.pii {
        None => Ok(None),
        Some(value) => {
            let mut value = value.clone();
            if let Some(map) = value.as_object_mut() {
                // The runner's configured mode applies when the request
                // asks for redaction without naming one.
                map.entry("mode")
                    .or_insert_with(|| serde_json::json!(default_mode.to_string()));
            }
            serde_json::from_value(value)
                .map(Some)
                .map_err(|e| NodeError::validation(format!("invalid pii policy: {e}")))
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
