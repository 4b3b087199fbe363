// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! nr-core: Core types for the Node Runner (nr) worker service

pub mod macros;

pub mod clock;
pub mod error;
pub mod event;
pub mod id;
pub mod request;
pub mod result;
pub mod session;
pub mod telemetry;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, EpochFn, FakeClock, SystemClock};
pub use error::{ErrorCode, NodeError};
pub use event::RunnerEvent;
pub use id::{short, ExecutionId, RunId, StepId, TenantId, TokenId, ViolationId};
#[cfg(any(test, feature = "test-support"))]
pub use request::ExecutionRequestBuilder;
pub use request::{
    Encoding, ExecutionRequest, IsolationLevel, Payload, ResourceLimits, RuntimeConfig,
    SecurityContext, MAX_PRIORITY, MAX_TIMEOUT_MS,
};
pub use result::{ExecutionMetrics, ExecutionResult, LogEntry, LogLevel};
pub use session::{ExecutionSession, SessionSnapshot, SessionState};
