// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Trivial nodes: echo and noop.

use crate::{NodeContext, NodeHandler};
use async_trait::async_trait;
use nr_core::{NodeError, Payload};

/// Returns the input payload unchanged.
pub struct EchoNode;

#[async_trait]
impl NodeHandler for EchoNode {
    fn name(&self) -> &str {
        "echo"
    }

    fn version(&self) -> u32 {
        1
    }

    async fn execute(&self, ctx: &NodeContext) -> Result<Payload, NodeError> {
        ctx.logger.debug(format!("echoing {} bytes", ctx.input.len()));
        Ok(ctx.input.clone())
    }
}

/// Produces an empty payload regardless of input.
pub struct NoopNode;

#[async_trait]
impl NodeHandler for NoopNode {
    fn name(&self) -> &str {
        "noop"
    }

    fn version(&self) -> u32 {
        1
    }

    async fn execute(&self, _ctx: &NodeContext) -> Result<Payload, NodeError> {
        Ok(Payload::empty())
    }
}
