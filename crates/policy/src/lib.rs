// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! nr-policy: per-execution network policy and the security auditor.
//!
//! A [`NetworkPolicyDoc`] arrives inside the request's security context and
//! is compiled once into an immutable [`CompiledPolicy`] whose `decide`
//! function answers every outbound intent for the duration of that
//! execution. The [`SecurityAuditor`] records violations and applies PII
//! redaction to payloads and captured logs.

pub mod audit;
pub mod compiled;
pub mod doc;
pub mod pii;

pub use audit::{SecurityAuditor, Severity, Violation, ViolationKind};
pub use compiled::{CompiledPolicy, Decision, Direction, Host, RequestDescriptor};
pub use doc::{FirewallRule, NetworkPolicyDoc, RuleAction};
pub use pii::{PiiKind, PiiMode, PiiPolicy};
