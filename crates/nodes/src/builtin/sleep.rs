// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sleep node: waits `ms` milliseconds, observing cancellation.

use crate::{NodeContext, NodeHandler};
use async_trait::async_trait;
use nr_core::{NodeError, Payload};
use std::time::Duration;

const DEFAULT_SLEEP_MS: u64 = 1_000;

/// Sleeps for `params.ms` milliseconds, then returns its input.
///
/// Primarily exists to exercise deadline and cancellation paths, but also
/// serves as a rate-limiting building block in workflows.
pub struct SleepNode;

#[async_trait]
impl NodeHandler for SleepNode {
    fn name(&self) -> &str {
        "sleep"
    }

    fn version(&self) -> u32 {
        1
    }

    async fn execute(&self, ctx: &NodeContext) -> Result<Payload, NodeError> {
        let ms = ctx.param_u64("ms").unwrap_or(DEFAULT_SLEEP_MS);
        ctx.logger.debug(format!("sleeping {ms}ms"));

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(ms)) => Ok(ctx.input.clone()),
            _ = ctx.cancel.cancelled() => {
                Err(NodeError::cancelled("sleep interrupted"))
            }
        }
    }
}
