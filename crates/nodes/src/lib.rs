// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! nr-nodes: node implementations and the plugin registry.
//!
//! A node implementation is anything that can run one step of a workflow:
//! the [`NodeHandler`] trait. Handlers never see the outside world directly;
//! every capability (logging, HTTP) is injected through [`NodeContext`] so
//! the sandbox backends control exactly what a node can touch.

pub mod builtin;
pub mod context;
pub mod http;
pub mod registry;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

use async_trait::async_trait;
use nr_core::{NodeError, Payload};

pub use context::{LogSink, NodeContext};
pub use http::{HttpResponse, PolicyHttpClient};
pub use registry::PluginRegistry;

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeNode;

/// One node implementation, registered under `(name, version)`.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    /// Stable node-type identifier, e.g. `"http"` or `"transform.json"`.
    fn name(&self) -> &str;

    /// Registered version; lookup without a version resolves the highest.
    fn version(&self) -> u32;

    /// Run the node. Implementations observe `ctx.cancel` at their own
    /// suspension points; the engine additionally races the whole call
    /// against the deadline.
    async fn execute(&self, ctx: &NodeContext) -> Result<Payload, NodeError>;

    /// Validate the produced output against the node's declared shape.
    /// Default: no declared shape, anything passes.
    fn validate_output(&self, _output: &Payload) -> Result<(), NodeError> {
        Ok(())
    }

    /// WebAssembly artifact for this node, when one exists. Nodes without
    /// an artifact cannot run under the wasm isolation level.
    fn wasm_artifact(&self) -> Option<std::sync::Arc<[u8]>> {
        None
    }
}

impl std::fmt::Debug for dyn NodeHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("NodeHandler")
    }
}
