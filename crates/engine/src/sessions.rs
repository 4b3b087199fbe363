// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Active-session map.
//!
//! Sessions and backend handles are linked by `execution_id`; neither owns
//! the other. The map is the single shared structure; each session is
//! mutated only by its owning task and the cancellation controller, both
//! of which go through the map's narrow operations.

use nr_core::{ExecutionId, ExecutionSession, SessionSnapshot, SessionState};
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

struct SessionEntry {
    session: ExecutionSession,
    cancel: CancellationToken,
    /// Set once the first effective cancel was observed; bounds the
    /// `session_cancelled` event to at most one per execution.
    cancel_signalled: bool,
}

/// Result of a cancel request against the map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    /// First effective cancel: token fired, event should be emitted.
    Signalled,
    /// A previous cancel already fired; idempotent no-op.
    AlreadySignalled,
    /// Session finished or never existed; idempotent no-op.
    NotActive,
}

/// The shared active set.
#[derive(Default)]
pub struct ActiveSessions {
    map: Mutex<HashMap<ExecutionId, SessionEntry>>,
}

impl ActiveSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly admitted session; returns its cancel token.
    pub fn insert(&self, session: ExecutionSession) -> CancellationToken {
        let cancel = CancellationToken::new();
        let execution_id = session.execution_id;
        let entry = SessionEntry { session, cancel: cancel.clone(), cancel_signalled: false };
        self.map.lock().insert(execution_id, entry);
        cancel
    }

    /// Apply a state transition. Returns whether the state changed.
    pub fn transition(&self, id: ExecutionId, next: SessionState, epoch_ms: u64) -> bool {
        let mut map = self.map.lock();
        match map.get_mut(&id) {
            Some(entry) => entry.session.transition(next, epoch_ms),
            None => false,
        }
    }

    /// Request cancellation. Idempotent; the first effective call fires the
    /// token and records the reason.
    pub fn request_cancel(&self, id: ExecutionId, reason: &str) -> CancelOutcome {
        let mut map = self.map.lock();
        let Some(entry) = map.get_mut(&id) else {
            return CancelOutcome::NotActive;
        };
        if entry.session.is_terminal() {
            return CancelOutcome::NotActive;
        }
        if entry.cancel_signalled {
            return CancelOutcome::AlreadySignalled;
        }
        entry.cancel_signalled = true;
        entry.session.cancel_reason = Some(reason.to_string());
        entry.cancel.cancel();
        CancelOutcome::Signalled
    }

    /// Remove a session (after terminal recording and handle release).
    pub fn remove(&self, id: ExecutionId) -> Option<ExecutionSession> {
        self.map.lock().remove(&id).map(|entry| entry.session)
    }

    /// Point-in-time copy, safe to consume concurrently.
    pub fn snapshot(&self) -> Vec<SessionSnapshot> {
        self.map.lock().values().map(|entry| entry.session.snapshot()).collect()
    }

    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.lock().is_empty()
    }

    /// Cancel reason recorded for a session, if any.
    pub fn cancel_reason(&self, id: ExecutionId) -> Option<String> {
        self.map.lock().get(&id).and_then(|e| e.session.cancel_reason.clone())
    }

    /// Fire every active session's token (shutdown path). Returns the ids
    /// that were newly signalled.
    pub fn cancel_all(&self, reason: &str) -> Vec<ExecutionId> {
        let mut map = self.map.lock();
        let mut signalled = Vec::new();
        for (id, entry) in map.iter_mut() {
            if !entry.session.is_terminal() && !entry.cancel_signalled {
                entry.cancel_signalled = true;
                entry.session.cancel_reason = Some(reason.to_string());
                entry.cancel.cancel();
                signalled.push(*id);
            }
        }
        signalled
    }
}

#[cfg(test)]
#[path = "sessions_tests.rs"]
mod tests;
