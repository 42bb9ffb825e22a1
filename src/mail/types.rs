//! Mail types: message metadata, thread entries, drafts, recency filter,
//! and the text helpers shared by the IMAP layer and the drafting crew.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Maximum snippet length in characters.
pub const SNIPPET_MAX_CHARS: usize = 200;

/// Metadata for one message returned by a mail search.
///
/// Read-only to the poller: it filters on `id`, `thread_id` and `sender`
/// and never mutates the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailMessage {
    /// Provider message identifier.
    pub id: String,
    /// Provider thread identifier.
    pub thread_id: String,
    /// Short preview of the body.
    pub snippet: String,
    /// Sender field as delivered (may be `Name <addr>` or a bare address).
    pub sender: String,
    /// Subject line, if present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// When the message was sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<Utc>>,
}

impl MailMessage {
    pub fn new(
        id: impl Into<String>,
        thread_id: impl Into<String>,
        snippet: impl Into<String>,
        sender: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            thread_id: thread_id.into(),
            snippet: snippet.into(),
            sender: sender.into(),
            subject: None,
            received_at: None,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }
}

/// A message in an email thread with full headers, as returned by a
/// thread fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
    /// Who sent this message (email address).
    pub from: String,
    /// To recipients.
    pub to: Vec<String>,
    /// CC recipients.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<String>,
    /// Email subject line.
    pub subject: String,
    /// Message-ID header.
    pub message_id: String,
    /// Message body, quote-stripped.
    pub content: String,
    /// When the message was sent.
    pub timestamp: Option<DateTime<Utc>>,
    /// Whether the operator sent this message.
    pub is_outgoing: bool,
}

/// A reply draft to be stored in the mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftRequest {
    pub to: String,
    pub subject: String,
    pub body: String,
    /// Message-ID being replied to, for threading headers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,
}

impl DraftRequest {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
            in_reply_to: None,
        }
    }

    pub fn in_reply_to(mut self, message_id: impl Into<String>) -> Self {
        self.in_reply_to = Some(message_id.into());
        self
    }
}

/// "Messages newer than N days" search filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecencyFilter {
    days: u32,
}

impl RecencyFilter {
    pub fn days(days: u32) -> Self {
        Self { days: days.max(1) }
    }

    /// Length of the window.
    pub fn window(&self) -> Duration {
        Duration::from_secs(u64::from(self.days) * 86_400)
    }

    /// Provider search-query form, e.g. `newer_than:1d`.
    pub fn query(&self) -> String {
        format!("newer_than:{}d", self.days)
    }

    /// First calendar day inside the window.
    pub fn since_date(&self, now: DateTime<Utc>) -> NaiveDate {
        (now - chrono::Duration::days(i64::from(self.days))).date_naive()
    }

    /// IMAP `SINCE` criterion for the window, e.g. `SINCE 17-Oct-2026`.
    pub fn imap_criterion(&self, now: DateTime<Utc>) -> String {
        format!("SINCE {}", self.since_date(now).format("%d-%b-%Y"))
    }
}

impl Default for RecencyFilter {
    fn default() -> Self {
        Self::days(1)
    }
}

/// Strip quoted text from an email body.
///
/// Removes:
/// - Lines starting with `>` (quoted reply lines)
/// - Everything after an "On ... wrote:" attribution line
/// - Everything after an "--- Original Message ---" separator
pub fn strip_quoted_text(body: &str) -> String {
    let mut result = Vec::new();

    for line in body.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with('>') {
            continue;
        }

        if trimmed.starts_with("On ") && trimmed.ends_with("wrote:") {
            break;
        }

        if trimmed.starts_with("---") && trimmed.contains("Original Message") {
            break;
        }

        result.push(line);
    }

    while result.last().is_some_and(|l| l.trim().is_empty()) {
        result.pop();
    }

    result.join("\n")
}

/// Strip HTML tags and collapse whitespace.
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Build a single-line preview: quote-stripped, whitespace-collapsed, truncated.
pub fn make_snippet(body: &str) -> String {
    let stripped = strip_quoted_text(body);
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(SNIPPET_MAX_CHARS).collect()
}

/// Bare address from a `Name <addr>` sender field.
pub fn sender_address(sender: &str) -> &str {
    match (sender.rfind('<'), sender.rfind('>')) {
        (Some(start), Some(end)) if start < end => sender[start + 1..end].trim(),
        _ => sender.trim(),
    }
}

/// Extract email addresses from an optional mail_parser Address field.
pub fn extract_addresses(addr: Option<&mail_parser::Address>) -> Vec<String> {
    let Some(addr) = addr else {
        return Vec::new();
    };
    match addr {
        mail_parser::Address::List(addrs) => addrs
            .iter()
            .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            .collect(),
        mail_parser::Address::Group(groups) => groups
            .iter()
            .flat_map(|g| {
                g.addresses
                    .iter()
                    .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn sender_address_unwraps_display_name() {
        assert_eq!(sender_address("Alice <alice@ex.com>"), "alice@ex.com");
        assert_eq!(sender_address(" bob@ex.com "), "bob@ex.com");
        assert_eq!(sender_address("broken <"), "broken <");
    }

    #[test]
    fn strip_basic_quoted_lines() {
        let body = "Hello!\n\n> This is quoted\n> Another quoted line\nThanks";
        assert_eq!(strip_quoted_text(body), "Hello!\n\nThanks");
    }

    #[test]
    fn strip_on_wrote_attribution() {
        let body = "Sounds good!\n\nOn Mon, Jan 1, 2026 at 10:00 AM Alice <alice@ex.com> wrote:\n> Original message";
        assert_eq!(strip_quoted_text(body), "Sounds good!");
    }

    #[test]
    fn strip_original_message_separator() {
        let body = "My reply\n\n--- Original Message ---\nOld stuff here";
        assert_eq!(strip_quoted_text(body), "My reply");
    }

    #[test]
    fn strip_no_quotes() {
        let body = "Just a normal message\nWith multiple lines";
        assert_eq!(strip_quoted_text(body), body);
    }

    #[test]
    fn strip_html_nested_tags() {
        assert_eq!(
            strip_html("<div><b>Bold</b> and <i>italic</i></div>"),
            "Bold and italic"
        );
        assert_eq!(strip_html("<p>  Hello   World  </p>"), "Hello World");
    }

    #[test]
    fn snippet_collapses_and_truncates() {
        let body = format!("Hi there,\n\n{}\n> quoted", "word ".repeat(100));
        let snippet = make_snippet(&body);
        assert!(snippet.starts_with("Hi there, word"));
        assert_eq!(snippet.chars().count(), SNIPPET_MAX_CHARS);
        assert!(!snippet.contains("quoted"));
    }

    #[test]
    fn recency_filter_renders_query_and_window() {
        let filter = RecencyFilter::days(1);
        assert_eq!(filter.query(), "newer_than:1d");
        assert_eq!(filter.window(), Duration::from_secs(86_400));
        assert_eq!(RecencyFilter::days(0).query(), "newer_than:1d");
    }

    #[test]
    fn recency_filter_imap_criterion() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        assert_eq!(RecencyFilter::days(1).imap_criterion(now), "SINCE 28-Feb-2026");
        assert_eq!(RecencyFilter::days(7).imap_criterion(now), "SINCE 22-Feb-2026");
    }

    #[test]
    fn mail_message_serde_omits_empty_optionals() {
        let msg = MailMessage::new("1", "A", "hello", "x@y.com");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("subject"));
        assert!(!json.contains("received_at"));
    }
}
