// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The compiled, per-execution policy decision function.
//!
//! Compilation happens once per execution; the rule set is immutable for
//! the execution's lifetime. Only the bandwidth window and the connection
//! counter are interior-mutable, both updated through `account` and the
//! connection guard.

use crate::doc::{FirewallRule, NetworkPolicyDoc, RuleAction};
use ipnet::IpNet;
use nr_core::NodeError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Traffic direction a rule or descriptor applies to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Outbound,
    Inbound,
}

nr_core::simple_display! {
    Direction {
        Outbound => "outbound",
        Inbound => "inbound",
    }
}

/// Target of one outbound (or inbound) intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Host {
    Domain(String),
    Ip(IpAddr),
}

impl Host {
    /// Parse a host string: IP literal or domain name.
    pub fn parse(s: &str) -> Self {
        match s.parse::<IpAddr>() {
            Ok(ip) => Host::Ip(ip),
            Err(_) => Host::Domain(s.to_ascii_lowercase()),
        }
    }
}

impl std::fmt::Display for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Host::Domain(d) => write!(f, "{d}"),
            Host::Ip(ip) => write!(f, "{ip}"),
        }
    }
}

/// One network intent presented to `decide`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub host: Host,
    pub port: u16,
    pub direction: Direction,
}

impl RequestDescriptor {
    pub fn outbound(host: &str, port: u16) -> Self {
        Self { host: Host::parse(host), port, direction: Direction::Outbound }
    }
}

/// Outcome of one policy decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// Denied; `rule` names the list or rule that matched.
    Deny { rule: String },
    /// Allowed, but the caller must record an audit entry.
    AllowAndLog { rule: String },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Decision::Deny { .. })
    }
}

#[derive(Debug)]
struct CompiledRule {
    priority: u32,
    direction: Direction,
    action: RuleAction,
    domain_suffix: Option<String>,
    cidr: Option<IpNet>,
    port: Option<u16>,
    label: String,
}

impl CompiledRule {
    fn matches(&self, desc: &RequestDescriptor) -> bool {
        if self.direction != desc.direction {
            return false;
        }
        if let Some(port) = self.port {
            if port != desc.port {
                return false;
            }
        }
        if let Some(ref suffix) = self.domain_suffix {
            match &desc.host {
                Host::Domain(d) if domain_matches(d, suffix) => {}
                _ => return false,
            }
        }
        if let Some(ref net) = self.cidr {
            match &desc.host {
                Host::Ip(ip) if net.contains(ip) => {}
                _ => return false,
            }
        }
        true
    }
}

/// Suffix match: `api.internal.example` matches `internal.example` and
/// `example`, but `notexample` does not match `example`.
fn domain_matches(domain: &str, suffix: &str) -> bool {
    let domain = domain.trim_end_matches('.');
    let suffix = suffix.trim_start_matches('.').trim_end_matches('.');
    if domain.len() == suffix.len() {
        return domain.eq_ignore_ascii_case(suffix);
    }
    domain.len() > suffix.len()
        && domain.as_bytes()[domain.len() - suffix.len() - 1] == b'.'
        && domain[domain.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}

#[derive(Debug)]
struct BandwidthWindow {
    window_start_ms: u64,
    bytes_in_window: u64,
    /// Set when the cap was exhausted; cleared when the window rolls over.
    exhausted_until_ms: u64,
}

/// Guard representing one live connection; dropping it releases the slot.
#[derive(Debug)]
pub struct ConnectionGuard {
    connections: Arc<AtomicU32>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.connections.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Window over which the bandwidth cap is measured.
const BANDWIDTH_WINDOW_MS: u64 = 1_000;

/// Immutable decision function compiled from one [`NetworkPolicyDoc`].
#[derive(Debug)]
pub struct CompiledPolicy {
    allowed_domains: Vec<String>,
    blocked_domains: Vec<String>,
    allowed_nets: Vec<IpNet>,
    blocked_nets: Vec<IpNet>,
    allowed_ports: Vec<u16>,
    blocked_ports: Vec<u16>,
    rules: Vec<CompiledRule>,
    bandwidth_bytes_per_window: u64,
    max_connections: u32,
    window: Mutex<BandwidthWindow>,
    connections: Arc<AtomicU32>,
}

impl CompiledPolicy {
    /// Compile a policy document. Invalid CIDR strings are a validation
    /// error: a policy that cannot be compiled never admits traffic.
    pub fn compile(doc: &NetworkPolicyDoc) -> Result<Self, NodeError> {
        let allowed_nets = parse_nets(&doc.allowed_ips)?;
        let blocked_nets = parse_nets(&doc.blocked_ips)?;

        let mut rules = Vec::with_capacity(doc.rules.len());
        for (idx, rule) in doc.rules.iter().enumerate() {
            rules.push(compile_rule(rule, idx)?);
        }
        // Priority ascending; stable sort keeps document order for ties.
        rules.sort_by_key(|r| r.priority);

        Ok(Self {
            allowed_domains: normalize_domains(&doc.allowed_domains),
            blocked_domains: normalize_domains(&doc.blocked_domains),
            allowed_nets,
            blocked_nets,
            allowed_ports: doc.allowed_ports.clone(),
            blocked_ports: doc.blocked_ports.clone(),
            rules,
            bandwidth_bytes_per_window: doc.bandwidth_kbps * 1024,
            max_connections: doc.max_connections,
            window: Mutex::new(BandwidthWindow {
                window_start_ms: 0,
                bytes_in_window: 0,
                exhausted_until_ms: 0,
            }),
            connections: Arc::new(AtomicU32::new(0)),
        })
    }

    /// A policy that allows everything (absent document).
    pub fn permit_all() -> Self {
        // compile of the empty doc cannot fail
        match Self::compile(&NetworkPolicyDoc::permit_all()) {
            Ok(p) => p,
            Err(_) => unreachable!("empty policy document always compiles"),
        }
    }

    /// Decide one intent. Deterministic: firewall rules first (priority
    /// ascending, first match), then deny lists, then allow lists
    /// (exhaustive when non-empty), then the bandwidth saturation flag.
    pub fn decide(&self, desc: &RequestDescriptor, now_ms: u64) -> Decision {
        if let Some(rule) = self.rules.iter().find(|r| r.matches(desc)) {
            return match rule.action {
                RuleAction::Allow => Decision::Allow,
                RuleAction::Deny => Decision::Deny { rule: rule.label.clone() },
                RuleAction::AllowAndLog => Decision::AllowAndLog { rule: rule.label.clone() },
            };
        }

        if self.blocked_ports.contains(&desc.port) {
            return Decision::Deny { rule: format!("blocked_ports:{}", desc.port) };
        }
        match &desc.host {
            Host::Domain(domain) => {
                if let Some(s) = self.blocked_domains.iter().find(|s| domain_matches(domain, s)) {
                    return Decision::Deny { rule: format!("blocked_domains:{s}") };
                }
                if !self.allowed_domains.is_empty()
                    && !self.allowed_domains.iter().any(|s| domain_matches(domain, s))
                {
                    return Decision::Deny { rule: "allowed_domains".into() };
                }
            }
            Host::Ip(ip) => {
                if let Some(net) = self.blocked_nets.iter().find(|net| net.contains(ip)) {
                    return Decision::Deny { rule: format!("blocked_ips:{net}") };
                }
                if !self.allowed_nets.is_empty()
                    && !self.allowed_nets.iter().any(|net| net.contains(ip))
                {
                    return Decision::Deny { rule: "allowed_ips".into() };
                }
            }
        }
        if !self.allowed_ports.is_empty() && !self.allowed_ports.contains(&desc.port) {
            return Decision::Deny { rule: format!("allowed_ports:{}", desc.port) };
        }

        if self.bandwidth_bytes_per_window > 0 {
            let window = self.window.lock();
            if now_ms < window.exhausted_until_ms {
                return Decision::Deny { rule: "bandwidth".into() };
            }
        }

        Decision::Allow
    }

    /// Record realized traffic against the bandwidth window.
    pub fn account(&self, bytes_sent: u64, bytes_received: u64, now_ms: u64) {
        if self.bandwidth_bytes_per_window == 0 {
            return;
        }
        let mut window = self.window.lock();
        if now_ms.saturating_sub(window.window_start_ms) >= BANDWIDTH_WINDOW_MS {
            window.window_start_ms = now_ms;
            window.bytes_in_window = 0;
        }
        window.bytes_in_window += bytes_sent + bytes_received;
        if window.bytes_in_window > self.bandwidth_bytes_per_window {
            window.exhausted_until_ms = window.window_start_ms + BANDWIDTH_WINDOW_MS;
        }
    }

    /// Claim a connection slot; fails when the concurrent-connection cap
    /// is reached. The slot is released when the guard drops.
    pub fn connection(&self) -> Result<ConnectionGuard, NodeError> {
        if self.max_connections > 0 {
            let prev = self.connections.fetch_add(1, Ordering::SeqCst);
            if prev >= self.max_connections {
                self.connections.fetch_sub(1, Ordering::SeqCst);
                return Err(NodeError::policy_deny(format!(
                    "connection cap of {} reached",
                    self.max_connections
                )));
            }
        } else {
            self.connections.fetch_add(1, Ordering::SeqCst);
        }
        Ok(ConnectionGuard { connections: Arc::clone(&self.connections) })
    }

    /// Live connection count (observability only).
    pub fn open_connections(&self) -> u32 {
        self.connections.load(Ordering::SeqCst)
    }
}

fn parse_nets(specs: &[String]) -> Result<Vec<IpNet>, NodeError> {
    specs
        .iter()
        .map(|s| {
            // Accept both bare IPs and CIDR notation.
            if let Ok(ip) = s.parse::<IpAddr>() {
                return Ok(IpNet::from(ip));
            }
            s.parse::<IpNet>()
                .map_err(|e| NodeError::validation(format!("invalid CIDR {s:?}: {e}")))
        })
        .collect()
}

fn normalize_domains(domains: &[String]) -> Vec<String> {
    domains.iter().map(|d| d.trim().trim_start_matches('.').to_ascii_lowercase()).collect()
}

fn compile_rule(rule: &FirewallRule, idx: usize) -> Result<CompiledRule, NodeError> {
    let cidr = match &rule.cidr {
        Some(s) => Some(
            s.parse::<IpNet>()
                .map_err(|e| NodeError::validation(format!("invalid rule CIDR {s:?}: {e}")))?,
        ),
        None => None,
    };
    Ok(CompiledRule {
        priority: rule.priority,
        direction: rule.direction,
        action: rule.action,
        domain_suffix: rule.domain.as_ref().map(|d| d.trim_start_matches('.').to_ascii_lowercase()),
        cidr,
        port: rule.port,
        label: format!("rule[{idx}]:p{}", rule.priority),
    })
}

#[cfg(test)]
#[path = "compiled_tests.rs"]
mod tests;
