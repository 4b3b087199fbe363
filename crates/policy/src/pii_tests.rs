// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn mask_preserves_length() {
    let policy = PiiPolicy::with_mode(PiiMode::Mask);
    let (out, hits) = policy.redact("contact: alice@example.com done");

    assert_eq!(hits, 1);
    assert_eq!(out, format!("contact: {} done", "*".repeat("alice@example.com".len())));
    assert_eq!(out.len(), "contact: alice@example.com done".len());
}

#[test]
fn remove_replaces_with_token() {
    let policy = PiiPolicy::with_mode(PiiMode::Remove);
    let (out, hits) = policy.redact("mail bob@example.org now");

    assert_eq!(hits, 1);
    assert_eq!(out, "mail [REDACTED] now");
}

#[test]
fn hash_is_stable_and_short() {
    let policy = PiiPolicy::with_mode(PiiMode::Hash);
    let (a, _) = policy.redact("x carol@example.net y");
    let (b, _) = policy.redact("x carol@example.net y");

    assert_eq!(a, b);
    assert!(a.contains("pii:"));
    assert!(!a.contains("carol@example.net"));
}

#[test]
fn ssn_detected() {
    let policy = PiiPolicy::with_mode(PiiMode::Mask);
    let (out, hits) = policy.redact("ssn 123-45-6789 end");
    assert_eq!(hits, 1);
    assert!(!out.contains("123-45-6789"));
}

#[test]
fn card_number_detected() {
    let policy = PiiPolicy {
        mode: PiiMode::Remove,
        detect: vec![PiiKind::CardNumber],
    };
    let (out, hits) = policy.redact("card 4111 1111 1111 1111 used");
    assert_eq!(hits, 1);
    assert!(out.contains("[REDACTED]"));
}

#[test]
fn restricted_kind_list_skips_others() {
    let policy = PiiPolicy { mode: PiiMode::Mask, detect: vec![PiiKind::Ssn] };
    let (out, hits) = policy.redact("mail dave@example.com ssn-free");

    assert_eq!(hits, 0);
    assert_eq!(out, "mail dave@example.com ssn-free");
}

#[test]
fn multiple_spans_all_rewritten() {
    let policy = PiiPolicy { mode: PiiMode::Remove, detect: vec![PiiKind::Email] };
    let (out, hits) = policy.redact("a@example.com and b@example.com");

    assert_eq!(hits, 2);
    assert_eq!(out, "[REDACTED] and [REDACTED]");
}

#[test]
fn clean_text_untouched() {
    let policy = PiiPolicy::default();
    let (out, hits) = policy.redact("nothing sensitive here");
    assert_eq!(hits, 0);
    assert_eq!(out, "nothing sensitive here");
}

#[test]
fn detect_kinds_reports_without_rewriting() {
    let policy = PiiPolicy::default();
    let kinds = policy.detect_kinds("reach me at eve@example.com");
    assert!(kinds.contains(&PiiKind::Email));
    assert!(!kinds.contains(&PiiKind::Ssn));
}

#[yare::parameterized(
    mask   = { "mask", PiiMode::Mask },
    remove = { "remove", PiiMode::Remove },
    hash   = { "hash", PiiMode::Hash },
)]
fn mode_parses(s: &str, expected: PiiMode) {
    assert_eq!(s.parse::<PiiMode>().unwrap(), expected);
    assert_eq!(expected.to_string(), s);
}

#[test]
fn unknown_mode_rejected() {
    assert!("shred".parse::<PiiMode>().is_err());
}
