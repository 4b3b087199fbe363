// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PII detection and redaction over payloads and log lines.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

/// How detected spans are rewritten.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiMode {
    /// Replace with `*` of equal length.
    #[default]
    Mask,
    /// Replace with a fixed token.
    Remove,
    /// Replace with a short digest.
    Hash,
}

nr_core::wire_str! {
    PiiMode {
        Mask => "mask",
        Remove => "remove",
        Hash => "hash",
    }
}

/// Categories of PII the detectors look for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiKind {
    Email,
    Phone,
    CardNumber,
    Ssn,
}

nr_core::simple_display! {
    PiiKind {
        Email => "email",
        Phone => "phone",
        CardNumber => "card_number",
        Ssn => "ssn",
    }
}

const ALL_KINDS: [PiiKind; 4] =
    [PiiKind::Email, PiiKind::Phone, PiiKind::CardNumber, PiiKind::Ssn];

/// Redaction policy attached to a security context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PiiPolicy {
    #[serde(default)]
    pub mode: PiiMode,
    /// Kinds to detect; empty means all.
    #[serde(default)]
    pub detect: Vec<PiiKind>,
}

impl PiiPolicy {
    pub fn with_mode(mode: PiiMode) -> Self {
        Self { mode, detect: Vec::new() }
    }

    fn kinds(&self) -> &[PiiKind] {
        if self.detect.is_empty() {
            &ALL_KINDS
        } else {
            &self.detect
        }
    }

    /// Rewrite every detected span in `text` per the policy mode.
    /// Returns the redacted text and the number of spans rewritten.
    pub fn redact(&self, text: &str) -> (String, usize) {
        let mut out = text.to_string();
        let mut hits = 0;
        for kind in self.kinds() {
            let re = detector(*kind);
            // Collect matches against the current text; replace back-to-front
            // so earlier ranges stay valid.
            let ranges: Vec<(usize, usize)> =
                re.find_iter(&out).map(|m| (m.start(), m.end())).collect();
            for (start, end) in ranges.into_iter().rev() {
                let replacement = match self.mode {
                    PiiMode::Mask => "*".repeat(end - start),
                    PiiMode::Remove => "[REDACTED]".to_string(),
                    PiiMode::Hash => hash_span(&out[start..end]),
                };
                out.replace_range(start..end, &replacement);
                hits += 1;
            }
        }
        (out, hits)
    }

    /// Detection only: kinds present in `text`, without rewriting.
    pub fn detect_kinds(&self, text: &str) -> Vec<PiiKind> {
        self.kinds().iter().copied().filter(|k| detector(*k).is_match(text)).collect()
    }
}

fn hash_span(span: &str) -> String {
    let digest = Sha256::digest(span.as_bytes());
    let hex: String = digest.iter().take(6).map(|b| format!("{b:02x}")).collect();
    format!("pii:{hex}")
}

// Patterns are literals; get_or_init cannot fail at runtime.
#[allow(clippy::expect_used)]
fn detector(kind: PiiKind) -> &'static regex::Regex {
    static EMAIL: OnceLock<regex::Regex> = OnceLock::new();
    static PHONE: OnceLock<regex::Regex> = OnceLock::new();
    static CARD: OnceLock<regex::Regex> = OnceLock::new();
    static SSN: OnceLock<regex::Regex> = OnceLock::new();

    match kind {
        PiiKind::Email => EMAIL.get_or_init(|| {
            regex::Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")
                .expect("email pattern")
        }),
        PiiKind::Phone => PHONE.get_or_init(|| {
            regex::Regex::new(r"\+?\d{1,3}[ .-]?\(?\d{2,4}\)?[ .-]?\d{3,4}[ .-]?\d{3,4}")
                .expect("phone pattern")
        }),
        PiiKind::CardNumber => CARD.get_or_init(|| {
            regex::Regex::new(r"\b(?:\d[ -]?){13,16}\b").expect("card pattern")
        }),
        PiiKind::Ssn => SSN.get_or_init(|| {
            regex::Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("ssn pattern")
        }),
    }
}

#[cfg(test)]
#[path = "pii_tests.rs"]
mod tests;
