// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builders and proptest strategies shared with other crates' tests.
//!
//! Compiled only for tests or under the `test-support` feature.

#[cfg(feature = "proptest")]
pub mod strategies {
    use crate::error::ErrorCode;
    use crate::request::{Encoding, IsolationLevel, Payload};
    use crate::result::LogLevel;
    use crate::session::SessionState;
    use proptest::prelude::*;

    pub fn arb_isolation_level() -> impl Strategy<Value = IsolationLevel> {
        prop_oneof![
            Just(IsolationLevel::InProcess),
            Just(IsolationLevel::Process),
            Just(IsolationLevel::Microvm),
            Just(IsolationLevel::Wasm),
        ]
    }

    pub fn arb_session_state() -> impl Strategy<Value = SessionState> {
        prop_oneof![
            Just(SessionState::Admitted),
            Just(SessionState::Preparing),
            Just(SessionState::Running),
            Just(SessionState::Succeeded),
            Just(SessionState::Failed),
            Just(SessionState::Cancelled),
            Just(SessionState::TimedOut),
        ]
    }

    pub fn arb_error_code() -> impl Strategy<Value = ErrorCode> {
        prop_oneof![
            Just(ErrorCode::NodeNotFound),
            Just(ErrorCode::ParseError),
            Just(ErrorCode::PolicyDeny),
            Just(ErrorCode::QuotaExceeded),
            Just(ErrorCode::IsolationUnavailable),
            Just(ErrorCode::Timeout),
            Just(ErrorCode::SandboxCrash),
            Just(ErrorCode::NetworkError),
            Just(ErrorCode::ValidationError),
            Just(ErrorCode::Cancelled),
            Just(ErrorCode::Unknown),
        ]
    }

    pub fn arb_log_level() -> impl Strategy<Value = LogLevel> {
        prop_oneof![
            Just(LogLevel::Debug),
            Just(LogLevel::Info),
            Just(LogLevel::Warn),
            Just(LogLevel::Error),
        ]
    }

    pub fn arb_payload() -> impl Strategy<Value = Payload> {
        ("[a-zA-Z0-9 ]{0,64}").prop_map(|body| Payload { encoding: Encoding::Utf8, body })
    }
}
