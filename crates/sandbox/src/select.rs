// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic backend selection.
//!
//! Selection is a pure function of the requested isolation level, the
//! availability flags, and `allow_fallback`. Only the micro-VM level may
//! degrade (to the process backend), and only when the request explicitly
//! permits it.

use crate::inprocess::InProcessSandbox;
use crate::microvm::MicroVmSandbox;
use crate::process::ProcessSandbox;
use crate::wasm::WasmSandbox;
use crate::Sandbox;
use nr_core::{IsolationLevel, NodeError};

/// The backends one runner instance can dispatch to.
pub struct SandboxSet {
    inprocess: InProcessSandbox,
    process: ProcessSandbox,
    microvm: MicroVmSandbox,
    wasm: Option<WasmSandbox>,
}

impl SandboxSet {
    pub fn new(
        inprocess: InProcessSandbox,
        process: ProcessSandbox,
        microvm: MicroVmSandbox,
        wasm: Option<WasmSandbox>,
    ) -> Self {
        Self { inprocess, process, microvm, wasm }
    }

    /// Resolve the requested level to the effective one.
    ///
    /// `ISOLATION_UNAVAILABLE` when the level has no backend here and
    /// fallback is not permitted. Fallback applies to micro-VM only.
    pub fn select(
        &self,
        requested: IsolationLevel,
        allow_fallback: bool,
    ) -> Result<IsolationLevel, NodeError> {
        match requested {
            IsolationLevel::InProcess => Ok(IsolationLevel::InProcess),
            IsolationLevel::Process => Ok(IsolationLevel::Process),
            IsolationLevel::Microvm if self.microvm.available() => Ok(IsolationLevel::Microvm),
            IsolationLevel::Microvm if allow_fallback => {
                tracing::info!("microvm unavailable, falling back to process backend");
                Ok(IsolationLevel::Process)
            }
            IsolationLevel::Microvm => Err(NodeError::isolation_unavailable("microvm")),
            IsolationLevel::Wasm if self.wasm.is_some() => Ok(IsolationLevel::Wasm),
            IsolationLevel::Wasm => Err(NodeError::isolation_unavailable("wasm")),
        }
    }

    /// Backend for an *effective* level returned by [`Self::select`].
    pub fn sandbox(&self, effective: IsolationLevel) -> Result<&dyn Sandbox, NodeError> {
        match effective {
            IsolationLevel::InProcess => Ok(&self.inprocess),
            IsolationLevel::Process => Ok(&self.process),
            IsolationLevel::Microvm if self.microvm.available() => Ok(&self.microvm),
            IsolationLevel::Microvm => Err(NodeError::isolation_unavailable("microvm")),
            IsolationLevel::Wasm => self
                .wasm
                .as_ref()
                .map(|w| w as &dyn Sandbox)
                .ok_or_else(|| NodeError::isolation_unavailable("wasm")),
        }
    }
}

#[cfg(test)]
#[path = "select_tests.rs"]
mod tests;
