// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configurable fake node for other crates' tests.

use crate::{NodeContext, NodeHandler};
use async_trait::async_trait;
use nr_core::{NodeError, Payload};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

type Behavior = Box<dyn Fn(&NodeContext) -> Result<Payload, NodeError> + Send + Sync>;
type OutputValidator = Box<dyn Fn(&Payload) -> Result<(), NodeError> + Send + Sync>;

/// Scriptable node handler: fixed name/version, programmable behavior,
/// call counting. Used by sandbox and engine tests.
pub struct FakeNode {
    name: String,
    version: u32,
    delay: Option<Duration>,
    behavior: Behavior,
    validator: Option<OutputValidator>,
    calls: Arc<Mutex<u32>>,
    wasm_artifact: Option<Arc<[u8]>>,
}

impl FakeNode {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
            delay: None,
            behavior: Box::new(|ctx| Ok(ctx.input.clone())),
            validator: None,
            calls: Arc::new(Mutex::new(0)),
            wasm_artifact: None,
        }
    }

    /// Echo node under the given name/version.
    pub fn echo(name: impl Into<String>, version: u32) -> Self {
        Self::new(name, version)
    }

    /// Always fails with the given error.
    pub fn failing(name: impl Into<String>, version: u32, error: NodeError) -> Self {
        let mut node = Self::new(name, version);
        node.behavior = Box::new(move |_| Err(error.clone()));
        node
    }

    /// Custom behavior closure.
    pub fn with_behavior(
        mut self,
        behavior: impl Fn(&NodeContext) -> Result<Payload, NodeError> + Send + Sync + 'static,
    ) -> Self {
        self.behavior = Box::new(behavior);
        self
    }

    /// Sleep before producing the result (deadline/cancellation tests).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Declared output shape check applied by the engine after a run.
    pub fn with_output_validator(
        mut self,
        validator: impl Fn(&Payload) -> Result<(), NodeError> + Send + Sync + 'static,
    ) -> Self {
        self.validator = Some(Box::new(validator));
        self
    }

    pub fn with_wasm_artifact(mut self, bytes: Vec<u8>) -> Self {
        self.wasm_artifact = Some(Arc::from(bytes.into_boxed_slice()));
        self
    }

    /// Shared call counter handle.
    pub fn call_count(&self) -> Arc<Mutex<u32>> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl NodeHandler for FakeNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> u32 {
        self.version
    }

    async fn execute(&self, ctx: &NodeContext) -> Result<Payload, NodeError> {
        *self.calls.lock() += 1;
        if let Some(delay) = self.delay {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = ctx.cancel.cancelled() => {
                    return Err(NodeError::cancelled("fake node interrupted"));
                }
            }
        }
        (self.behavior)(ctx)
    }

    fn validate_output(&self, output: &Payload) -> Result<(), NodeError> {
        match &self.validator {
            Some(validator) => validator(output),
            None => Ok(()),
        }
    }

    fn wasm_artifact(&self) -> Option<Arc<[u8]>> {
        self.wasm_artifact.clone()
    }
}
