// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory session record and its state machine.
//!
//! A session exists from admission until its terminal state is recorded and
//! the backend handle has been released. It is mutated only by its owning
//! execution task and the cancellation controller.

use crate::id::{ExecutionId, TenantId};
use crate::request::IsolationLevel;
use serde::{Deserialize, Serialize};

/// Lifecycle state of one execution session.
///
/// ```text
/// admitted → preparing → running → (succeeded | failed | cancelled | timed_out)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Admitted,
    Preparing,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    TimedOut,
}

crate::simple_display! {
    SessionState {
        Admitted => "admitted",
        Preparing => "preparing",
        Running => "running",
        Succeeded => "succeeded",
        Failed => "failed",
        Cancelled => "cancelled",
        TimedOut => "timed_out",
    }
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Succeeded
                | SessionState::Failed
                | SessionState::Cancelled
                | SessionState::TimedOut
        )
    }

    /// Whether the state machine permits `self → next`.
    ///
    /// Cancellation is reachable from every non-terminal state; the other
    /// transitions follow the linear pipeline.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            SessionState::Admitted => false,
            SessionState::Preparing => self == SessionState::Admitted,
            SessionState::Running => self == SessionState::Preparing,
            SessionState::Succeeded => self == SessionState::Running,
            // Preparation can fail or hit the deadline before the backend
            // ever accepts, so both are reachable from `preparing` too.
            SessionState::Failed | SessionState::TimedOut => {
                self == SessionState::Preparing || self == SessionState::Running
            }
            SessionState::Cancelled => true,
        }
    }
}

/// Mutable, core-owned record of one execution.
#[derive(Debug, Clone)]
pub struct ExecutionSession {
    pub execution_id: ExecutionId,
    pub tenant_id: TenantId,
    pub isolation: IsolationLevel,
    pub state: SessionState,
    pub started_at_ms: u64,
    pub ended_at_ms: Option<u64>,
    /// Reason recorded when a cancel was requested (first caller wins).
    pub cancel_reason: Option<String>,
}

impl ExecutionSession {
    pub fn new(
        execution_id: ExecutionId,
        tenant_id: TenantId,
        isolation: IsolationLevel,
        started_at_ms: u64,
    ) -> Self {
        Self {
            execution_id,
            tenant_id,
            isolation,
            state: SessionState::Admitted,
            started_at_ms,
            ended_at_ms: None,
            cancel_reason: None,
        }
    }

    /// Apply a transition if the state machine allows it.
    ///
    /// Returns `true` when the state changed. Invalid transitions are
    /// ignored rather than panicking so racing cancel/complete paths
    /// degrade to exactly one terminal state.
    pub fn transition(&mut self, next: SessionState, epoch_ms: u64) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        self.state = next;
        if next.is_terminal() {
            self.ended_at_ms = Some(epoch_ms);
        }
        true
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            execution_id: self.execution_id,
            tenant_id: self.tenant_id,
            isolation: self.isolation,
            state: self.state,
            started_at_ms: self.started_at_ms,
            ended_at_ms: self.ended_at_ms,
        }
    }
}

/// Point-in-time copy of a session, safe to consume concurrently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub execution_id: ExecutionId,
    pub tenant_id: TenantId,
    pub isolation: IsolationLevel,
    pub state: SessionState,
    pub started_at_ms: u64,
    pub ended_at_ms: Option<u64>,
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
