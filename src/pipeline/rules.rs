//! Pre-LLM rules engine for fast pattern matching.
//!
//! Runs before the filter stage to drop mail that never needs a reply:
//! - noreply/no-reply senders
//! - Marketing/newsletter domains and unsubscribe footers
//! - Transactional notices (shipping, receipts)
//!
//! A message the engine rejects never reaches the LLM.

use regex::Regex;
use tracing::debug;

use crate::mail::MailMessage;
use crate::mail::types::sender_address;

/// Which field a rule matches against.
#[derive(Debug, Clone)]
pub enum RuleField {
    /// Bare sender address.
    Sender,
    Subject,
    Snippet,
}

/// A single ignore rule with a compiled regex.
#[derive(Debug, Clone)]
pub struct IgnoreRule {
    /// Human-readable pattern description.
    pub pattern: String,
    pub regex: Regex,
    pub field: RuleField,
    /// Why this rule triggers.
    pub reason: String,
}

/// Automated notices that are worth reading but never answering.
#[derive(Debug, Clone)]
pub struct TransactionalRule {
    pub regex: Regex,
    pub field: RuleField,
    pub label: String,
}

/// Pre-LLM rules engine.
pub struct RulesEngine {
    ignore_rules: Vec<IgnoreRule>,
    transactional_rules: Vec<TransactionalRule>,
    /// Senders that always reach the LLM (bypass every rule).
    always_review_patterns: Vec<Regex>,
}

impl RulesEngine {
    /// Create a rules engine with default ignore patterns.
    pub fn default_rules() -> Self {
        let ignore_rules = vec![
            IgnoreRule {
                pattern: "noreply@*".into(),
                regex: Regex::new(r"(?i)^no[\-_.]?reply@").unwrap(),
                field: RuleField::Sender,
                reason: "noreply sender".into(),
            },
            IgnoreRule {
                pattern: "*@marketing.*".into(),
                regex: Regex::new(r"(?i)@(marketing|newsletter|promo|campaign)\b").unwrap(),
                field: RuleField::Sender,
                reason: "marketing/newsletter sender".into(),
            },
            IgnoreRule {
                pattern: "mailer-daemon".into(),
                regex: Regex::new(r"(?i)^(mailer[\-_]?daemon|postmaster)@").unwrap(),
                field: RuleField::Sender,
                reason: "automated mail system".into(),
            },
            IgnoreRule {
                pattern: "unsubscribe in subject".into(),
                regex: Regex::new(r"(?i)\bunsubscribe\b").unwrap(),
                field: RuleField::Subject,
                reason: "newsletter/marketing (unsubscribe in subject)".into(),
            },
            IgnoreRule {
                pattern: "unsubscribe footer".into(),
                regex: Regex::new(
                    r"(?i)(click here to unsubscribe|manage your subscription|email preferences|opt[- ]?out)",
                )
                .unwrap(),
                field: RuleField::Snippet,
                reason: "bulk/marketing email (unsubscribe footer)".into(),
            },
            IgnoreRule {
                pattern: "notifications@github.com".into(),
                regex: Regex::new(r"(?i)^notifications@github\.com$").unwrap(),
                field: RuleField::Sender,
                reason: "GitHub notification".into(),
            },
        ];

        let transactional_rules = vec![
            TransactionalRule {
                regex: Regex::new(
                    r"(?i)(your (order|package|shipment)|tracking (number|update)|has (shipped|been delivered)|out for delivery)",
                )
                .unwrap(),
                field: RuleField::Snippet,
                label: "shipping/delivery update".into(),
            },
            TransactionalRule {
                regex: Regex::new(
                    r"(?i)(payment (received|confirmed)|receipt for|invoice #|your (receipt|transaction))",
                )
                .unwrap(),
                field: RuleField::Snippet,
                label: "payment/receipt".into(),
            },
        ];

        Self {
            ignore_rules,
            transactional_rules,
            always_review_patterns: Vec::new(),
        }
    }

    /// Create an empty rules engine (for testing).
    pub fn empty() -> Self {
        Self {
            ignore_rules: Vec::new(),
            transactional_rules: Vec::new(),
            always_review_patterns: Vec::new(),
        }
    }

    /// Add a sender pattern that always reaches the LLM.
    pub fn add_always_review(&mut self, pattern: &str) -> Result<(), regex::Error> {
        self.always_review_patterns.push(Regex::new(pattern)?);
        Ok(())
    }

    /// Add a custom ignore rule.
    pub fn add_ignore_rule(
        &mut self,
        pattern: &str,
        field: RuleField,
        reason: &str,
    ) -> Result<(), regex::Error> {
        self.ignore_rules.push(IgnoreRule {
            pattern: pattern.into(),
            regex: Regex::new(pattern)?,
            field,
            reason: reason.into(),
        });
        Ok(())
    }

    /// Evaluate a message against all rules.
    ///
    /// Returns the reason when the message should be dropped, `None` when it
    /// should go to the filter stage.
    pub fn evaluate(&self, message: &MailMessage) -> Option<String> {
        let sender = sender_address(&message.sender);

        if self.always_review_patterns.iter().any(|r| r.is_match(sender)) {
            debug!(sender = %sender, "Sender matches always-review pattern, bypassing rules");
            return None;
        }

        for rule in &self.ignore_rules {
            let Some(value) = field_value(message, sender, &rule.field) else {
                continue;
            };
            if rule.regex.is_match(value) {
                debug!(
                    email_id = %message.id,
                    sender = %sender,
                    rule = %rule.pattern,
                    "Message matched ignore rule"
                );
                return Some(rule.reason.clone());
            }
        }

        for rule in &self.transactional_rules {
            let Some(value) = field_value(message, sender, &rule.field) else {
                continue;
            };
            if rule.regex.is_match(value) {
                debug!(email_id = %message.id, label = %rule.label, "Message matched transactional rule");
                return Some(format!("transactional notice ({})", rule.label));
            }
        }

        None
    }
}

fn field_value<'a>(message: &'a MailMessage, sender: &'a str, field: &RuleField) -> Option<&'a str> {
    match field {
        RuleField::Sender => Some(sender),
        RuleField::Subject => message.subject.as_deref(),
        RuleField::Snippet => Some(&message.snippet),
    }
}
