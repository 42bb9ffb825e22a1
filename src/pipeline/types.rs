//! Shared types for the drafting pipeline.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::mail::MailMessage;

// ── Dispatch contract ───────────────────────────────────────────────

/// Downstream handler for a batch of new mail.
///
/// The poll loop does not depend on the result to keep running; it only
/// logs the report.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, batch: &[MailMessage]) -> Result<DispatchReport, PipelineError>;
}

/// Outcome of one dispatch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchReport {
    /// Ids handed to the filter stage.
    pub examined: Vec<String>,
    /// Ids removed by the rules engine before the LLM saw them.
    pub ignored: Vec<IgnoredEmail>,
    /// Ids the filter stage judged to need action.
    pub action_required: Vec<String>,
    /// Drafts that were stored.
    pub drafts: Vec<DraftOutcome>,
    /// Per-message failures in the analysis or writing stages.
    pub failures: Vec<DispatchFailure>,
}

impl DispatchReport {
    /// Every action-required message got a draft.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.drafts.len() == self.action_required.len()
    }
}

/// A message dropped by the rules engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IgnoredEmail {
    pub id: String,
    pub reason: String,
}

/// A stored reply draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftOutcome {
    pub email_id: String,
    pub thread_id: String,
    pub draft_id: String,
    pub to: String,
    pub subject: String,
}

/// A message whose draft could not be produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchFailure {
    pub email_id: String,
    pub reason: String,
}

// ── Stage outputs ───────────────────────────────────────────────────

/// Filter stage verdict.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterVerdict {
    #[serde(default)]
    pub checked_email_ids: Vec<String>,
    #[serde(default, alias = "action_required_emails")]
    pub action_required_email: Vec<String>,
}

/// Analysis stage output for one thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadAnalysis {
    pub thread_id: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default, deserialize_with = "points_from_any")]
    pub main_points: Vec<String>,
    /// Who is replying.
    #[serde(default)]
    pub user: String,
    /// Who the reply goes to.
    #[serde(default)]
    pub recipient: String,
    #[serde(default)]
    pub communication_style: String,
    pub sender_email: String,
}

/// Writer stage output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftedResponse {
    pub to: String,
    pub subject: String,
    pub message: String,
}

/// Accept `main_points` as a list or as one string.
fn points_from_any<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Points {
        List(Vec<String>),
        One(String),
    }

    Ok(match Points::deserialize(deserializer)? {
        Points::List(points) => points,
        Points::One(point) if point.trim().is_empty() => Vec::new(),
        Points::One(point) => vec![point],
    })
}
