// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The network policy document as it appears on the wire.
//!
//! This is the serde shape embedded in `SecurityContext.network`; it is
//! validated and frozen by [`crate::compiled::CompiledPolicy::compile`].

use serde::{Deserialize, Serialize};

/// Action a firewall rule takes on match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Allow,
    #[default]
    Deny,
    /// Allow, but record the decision as a low-severity audit entry.
    AllowAndLog,
}

nr_core::simple_display! {
    RuleAction {
        Allow => "allow",
        Deny => "deny",
        AllowAndLog => "allow_and_log",
    }
}

/// One firewall rule. Matching fields are conjunctive; an omitted field
/// matches anything. Rules are evaluated per direction, priority ascending,
/// first match wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FirewallRule {
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub direction: super::compiled::Direction,
    #[serde(default)]
    pub action: RuleAction,
    /// Domain suffix to match (e.g. "internal.example").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// CIDR block to match (e.g. "10.0.0.0/8").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// Per-execution network policy document.
///
/// Allow lists, when non-empty, are exhaustive: anything not matched is
/// denied. Deny lists always win over allow lists. `bandwidth_kbps` and
/// `max_connections` of 0 mean unlimited.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkPolicyDoc {
    #[serde(default)]
    pub allowed_domains: Vec<String>,
    #[serde(default)]
    pub blocked_domains: Vec<String>,
    #[serde(default)]
    pub allowed_ips: Vec<String>,
    #[serde(default)]
    pub blocked_ips: Vec<String>,
    #[serde(default)]
    pub allowed_ports: Vec<u16>,
    #[serde(default)]
    pub blocked_ports: Vec<u16>,
    #[serde(default)]
    pub rules: Vec<FirewallRule>,
    #[serde(default)]
    pub bandwidth_kbps: u64,
    #[serde(default)]
    pub max_connections: u32,
}

impl NetworkPolicyDoc {
    /// An empty document: everything allowed, nothing accounted.
    pub fn permit_all() -> Self {
        Self::default()
    }

    /// Whether this document constrains anything at all.
    pub fn is_empty(&self) -> bool {
        self.allowed_domains.is_empty()
            && self.blocked_domains.is_empty()
            && self.allowed_ips.is_empty()
            && self.blocked_ips.is_empty()
            && self.allowed_ports.is_empty()
            && self.blocked_ports.is_empty()
            && self.rules.is_empty()
            && self.bandwidth_kbps == 0
            && self.max_connections == 0
    }
}

#[cfg(test)]
#[path = "doc_tests.rs"]
mod tests;
