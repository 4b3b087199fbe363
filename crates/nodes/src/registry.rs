// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plugin registry: `(node_type, version)` → implementation handle.

use crate::NodeHandler;
use nr_core::NodeError;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Registry of node implementations, keyed by type name with per-name
/// version maps. Registration is dynamic; lookups are lock-free reads
/// under an RwLock (many concurrent executions resolve, registration is
/// rare).
#[derive(Default)]
pub struct PluginRegistry {
    nodes: RwLock<HashMap<String, BTreeMap<u32, Arc<dyn NodeHandler>>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its own `(name, version)`. Re-registering
    /// the same pair replaces the previous handler.
    pub fn register(&self, handler: Arc<dyn NodeHandler>) {
        let name = handler.name().to_string();
        let version = handler.version();
        let replaced = self
            .nodes
            .write()
            .entry(name.clone())
            .or_default()
            .insert(version, handler)
            .is_some();
        if replaced {
            tracing::info!(node_type = %name, version, "node handler replaced");
        } else {
            tracing::debug!(node_type = %name, version, "node handler registered");
        }
    }

    /// Resolve a handler. An omitted version resolves the highest
    /// registered; a miss is `NODE_NOT_FOUND`.
    pub fn resolve(
        &self,
        node_type: &str,
        version: Option<u32>,
    ) -> Result<Arc<dyn NodeHandler>, NodeError> {
        let nodes = self.nodes.read();
        let versions = nodes
            .get(node_type)
            .ok_or_else(|| NodeError::node_not_found(node_type, version))?;
        let handler = match version {
            Some(v) => versions.get(&v),
            None => versions.last_key_value().map(|(_, h)| h),
        };
        handler
            .cloned()
            .ok_or_else(|| NodeError::node_not_found(node_type, version))
    }

    /// Remove one registered version. Returns whether anything was removed.
    pub fn deregister(&self, node_type: &str, version: u32) -> bool {
        let mut nodes = self.nodes.write();
        let Some(versions) = nodes.get_mut(node_type) else {
            return false;
        };
        let removed = versions.remove(&version).is_some();
        if versions.is_empty() {
            nodes.remove(node_type);
        }
        removed
    }

    /// Number of registered `(name, version)` pairs.
    pub fn len(&self) -> usize {
        self.nodes.read().values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Registered type names with their available versions, for readiness
    /// reporting and diagnostics.
    pub fn catalog(&self) -> Vec<(String, Vec<u32>)> {
        let mut listing: Vec<(String, Vec<u32>)> = self
            .nodes
            .read()
            .iter()
            .map(|(name, versions)| (name.clone(), versions.keys().copied().collect()))
            .collect();
        listing.sort_by(|a, b| a.0.cmp(&b.0));
        listing
    }
}

/// Registry preloaded with every built-in node.
pub fn builtin_registry() -> PluginRegistry {
    let registry = PluginRegistry::new();
    registry.register(Arc::new(crate::builtin::EchoNode));
    registry.register(Arc::new(crate::builtin::NoopNode));
    registry.register(Arc::new(crate::builtin::SleepNode));
    registry.register(Arc::new(crate::builtin::TransformJsonNode));
    registry.register(Arc::new(crate::builtin::HttpNode));
    registry
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
