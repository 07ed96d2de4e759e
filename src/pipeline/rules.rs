//! Filter rules — the matching predicate and rule application.
//!
//! A rule is four optional case-insensitive substring conditions ANDed
//! together, plus a set of email destinations. An unset condition is
//! vacuously true, so a rule with all four fields empty matches every
//! message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::pipeline::types::SmsMessage;

// ── Filter rule ─────────────────────────────────────────────────────

/// A user-defined filter rule.
///
/// Created and edited by the configuration surface; read-only to the
/// matching and forwarding logic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRule {
    /// Store-assigned identifier (0 before first insert).
    pub id: i64,
    /// Display label.
    pub name: String,
    /// Match when the sender contains this substring. `None`/empty = don't care.
    pub sender_contains: Option<String>,
    /// Match when the body contains this substring. `None`/empty = don't care.
    pub message_contains: Option<String>,
    /// Fail when the sender contains this substring. `None`/empty = never excludes.
    pub exclude_sender_contains: Option<String>,
    /// Fail when the body contains this substring. `None`/empty = never excludes.
    pub exclude_message_contains: Option<String>,
    /// Disabled rules are skipped entirely during matching.
    pub enabled: bool,
    /// Email destinations contributed by this rule.
    pub destinations: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl FilterRule {
    /// A new enabled rule with no conditions (matches everything).
    pub fn new(name: impl Into<String>, destinations: Vec<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            sender_contains: None,
            message_contains: None,
            exclude_sender_contains: None,
            exclude_message_contains: None,
            enabled: true,
            destinations,
            created_at: Utc::now(),
        }
    }
}

/// A (rule, message) pair where the predicate holds.
#[derive(Debug, Clone)]
pub struct FilterMatch<'a> {
    pub rule: &'a FilterRule,
    pub message: &'a SmsMessage,
}

// ── Predicate ───────────────────────────────────────────────────────

/// True when `haystack` contains `needle`, ignoring case.
fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// True when the condition is unset/empty (don't care).
fn is_unset(condition: &Option<String>) -> bool {
    condition.as_deref().is_none_or(str::is_empty)
}

/// The filter predicate: does `rule` match `message`?
///
/// Pure and total. Disabled rules never match, whether or not the caller
/// pre-filtered them.
pub fn rule_matches(message: &SmsMessage, rule: &FilterRule) -> bool {
    if !rule.enabled {
        return false;
    }

    let sender_match = is_unset(&rule.sender_contains)
        || contains_ignore_case(&message.sender, rule.sender_contains.as_deref().unwrap_or(""));

    let sender_exclude = is_unset(&rule.exclude_sender_contains)
        || !contains_ignore_case(
            &message.sender,
            rule.exclude_sender_contains.as_deref().unwrap_or(""),
        );

    let message_match = is_unset(&rule.message_contains)
        || contains_ignore_case(&message.body, rule.message_contains.as_deref().unwrap_or(""));

    let message_exclude = is_unset(&rule.exclude_message_contains)
        || !contains_ignore_case(
            &message.body,
            rule.exclude_message_contains.as_deref().unwrap_or(""),
        );

    sender_match && sender_exclude && message_match && message_exclude
}

// ── Matcher ─────────────────────────────────────────────────────────

/// Apply all rules to one message, returning matches in input rule order.
///
/// Disabled rules are skipped. An empty rule list yields an empty result,
/// not an error.
pub fn apply_rules<'a>(message: &'a SmsMessage, rules: &'a [FilterRule]) -> Vec<FilterMatch<'a>> {
    let matches: Vec<FilterMatch<'a>> = rules
        .iter()
        .filter(|rule| rule.enabled && rule_matches(message, rule))
        .map(|rule| FilterMatch { rule, message })
        .collect();

    debug!(
        message_id = %message.id,
        rules = rules.len(),
        matched = matches.len(),
        "Applied filter rules"
    );
    matches
}

/// Union of destination addresses across matches, de-duplicated by exact
/// string equality, first occurrence order preserved.
pub fn collect_destinations(matches: &[FilterMatch<'_>]) -> Vec<String> {
    let mut destinations: Vec<String> = Vec::new();
    for m in matches {
        for addr in &m.rule.destinations {
            if !destinations.contains(addr) {
                destinations.push(addr.clone());
            }
        }
    }
    destinations
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn message(sender: &str, body: &str) -> SmsMessage {
        SmsMessage::new("sms-1", sender, body, Utc::now())
    }

    fn rule() -> FilterRule {
        FilterRule::new("test rule", vec!["a@x.com".into()])
    }

    #[test]
    fn empty_rule_matches_everything() {
        let msg = message("ANYONE", "any text at all");
        assert!(rule_matches(&msg, &rule()));
    }

    #[test]
    fn sender_contains_is_case_insensitive() {
        let msg = message("Alice", "hi");
        let mut r = rule();
        r.sender_contains = Some("alice".into());
        assert!(rule_matches(&msg, &r));

        r.sender_contains = Some("ALICE".into());
        assert!(rule_matches(&msg, &r));
    }

    #[test]
    fn message_contains_is_case_insensitive() {
        let msg = message("BANK", "Your OTP is 1234");
        let mut r = rule();
        r.message_contains = Some("otp".into());
        assert!(rule_matches(&msg, &r));
    }

    #[test]
    fn sender_mismatch_fails() {
        let msg = message("SPAM-CO", "hi");
        let mut r = rule();
        r.sender_contains = Some("BANK".into());
        assert!(!rule_matches(&msg, &r));
    }

    #[test]
    fn exclude_wins_over_include() {
        // senderContains="A", excludeSenderContains="B", sender="AB" → no match
        let msg = message("AB", "hi");
        let mut r = rule();
        r.sender_contains = Some("A".into());
        r.exclude_sender_contains = Some("B".into());
        assert!(!rule_matches(&msg, &r));
    }

    #[test]
    fn exclude_message_blocks_match() {
        let msg = message("BANK", "PROMO: free credit");
        let mut r = rule();
        r.exclude_message_contains = Some("promo".into());
        assert!(!rule_matches(&msg, &r));
    }

    #[test]
    fn empty_string_condition_is_dont_care() {
        let msg = message("ANYONE", "anything");
        let mut r = rule();
        r.sender_contains = Some(String::new());
        r.exclude_message_contains = Some(String::new());
        assert!(rule_matches(&msg, &r));
    }

    #[test]
    fn disabled_rule_never_matches() {
        let msg = message("BANK", "OTP 1234");
        let mut r = rule();
        r.enabled = false;
        assert!(!rule_matches(&msg, &r));
    }

    #[test]
    fn apply_rules_skips_disabled() {
        let msg = message("BANK", "OTP 1234");
        let mut disabled = rule();
        disabled.enabled = false;
        let enabled = rule();

        let rules = vec![disabled, enabled];
        let matches = apply_rules(&msg, &rules);
        assert_eq!(matches.len(), 1);
        assert!(matches[0].rule.enabled);
    }

    #[test]
    fn apply_rules_preserves_input_order() {
        let msg = message("BANK", "OTP 1234");
        let mut first = rule();
        first.name = "first".into();
        let mut second = rule();
        second.name = "second".into();

        let rules = vec![first, second];
        let matches = apply_rules(&msg, &rules);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].rule.name, "first");
        assert_eq!(matches[1].rule.name, "second");
    }

    #[test]
    fn apply_rules_empty_list_is_empty() {
        let msg = message("BANK", "OTP 1234");
        assert!(apply_rules(&msg, &[]).is_empty());
    }

    #[test]
    fn collect_destinations_deduplicates() {
        let msg = message("BANK", "OTP 1234");
        let mut a = rule();
        a.destinations = vec!["a@x.com".into(), "b@x.com".into()];
        let mut b = rule();
        b.destinations = vec!["b@x.com".into(), "c@x.com".into()];

        let rules = vec![a, b];
        let matches = apply_rules(&msg, &rules);
        let destinations = collect_destinations(&matches);
        assert_eq!(destinations, vec!["a@x.com", "b@x.com", "c@x.com"]);
    }

    #[test]
    fn matched_rule_with_no_destinations_contributes_nothing() {
        let msg = message("BANK", "OTP 1234");
        let mut r = rule();
        r.destinations = Vec::new();

        let rules = vec![r];
        let matches = apply_rules(&msg, &rules);
        assert_eq!(matches.len(), 1);
        assert!(collect_destinations(&matches).is_empty());
    }
}
