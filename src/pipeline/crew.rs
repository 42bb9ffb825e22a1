//! Email drafting crew: filter, analyze, write.
//!
//! Nothing is sent. Every reply ends up in the drafts folder for a human to
//! review.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider,
};
use crate::mail::types::sender_address;
use crate::mail::{DraftRequest, DraftStore, EmailMessage, MailMessage, ThreadFetcher};
use crate::pipeline::prompts::{
    self, ACTION_AGENT, ANALYSIS_OUTPUT, FILTER_AGENT, FILTER_OUTPUT, WRITER_AGENT, WRITER_OUTPUT,
};
use crate::pipeline::rules::RulesEngine;
use crate::pipeline::types::{
    DispatchFailure, DispatchReport, Dispatcher, DraftOutcome, DraftedResponse, FilterVerdict,
    IgnoredEmail, ThreadAnalysis,
};

const FILTER_TEMPERATURE: f32 = 0.1;
const FILTER_MAX_TOKENS: u32 = 1024;

const ANALYSIS_TEMPERATURE: f32 = 0.2;
const ANALYSIS_MAX_TOKENS: u32 = 1024;

const WRITER_TEMPERATURE: f32 = 0.7;
const WRITER_MAX_TOKENS: u32 = 1500;

/// Three-stage drafting pipeline behind the `Dispatcher` contract.
pub struct EmailCrew {
    llm: Arc<dyn LlmProvider>,
    threads: Arc<dyn ThreadFetcher>,
    drafts: Arc<dyn DraftStore>,
    rules: RulesEngine,
    self_address: String,
}

impl EmailCrew {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        threads: Arc<dyn ThreadFetcher>,
        drafts: Arc<dyn DraftStore>,
        rules: RulesEngine,
        self_address: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            threads,
            drafts,
            rules,
            self_address: self_address.into(),
        }
    }

    /// Ask the filter agent which messages need a reply.
    async fn filter(&self, emails: &[MailMessage]) -> Result<Vec<String>, PipelineError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(prompts::agent_system_prompt(&FILTER_AGENT, FILTER_OUTPUT)),
            ChatMessage::user(prompts::filter_task(emails)),
        ])
        .with_temperature(FILTER_TEMPERATURE)
        .with_max_tokens(FILTER_MAX_TOKENS);

        let response = self
            .llm
            .complete(request)
            .await
            .map_err(|e| PipelineError::Filter(format!("LLM call failed: {e}")))?;

        let verdict: FilterVerdict = parse_response(&response).map_err(|e| {
            warn!(raw_response = %response.content, error = %e, "Unparseable filter verdict");
            PipelineError::Filter(format!("parse failed: {e}"))
        })?;

        let known: HashSet<&str> = emails.iter().map(|e| e.id.as_str()).collect();
        let mut picked = Vec::new();
        for id in verdict.action_required_email {
            if !known.contains(id.as_str()) {
                warn!(email_id = %id, "Filter returned an id outside the batch, dropping");
                continue;
            }
            if !picked.contains(&id) {
                picked.push(id);
            }
        }
        Ok(picked)
    }

    /// Fetch the thread and ask the action agent to analyze it.
    async fn analyze(
        &self,
        email: &MailMessage,
    ) -> Result<(ThreadAnalysis, Vec<EmailMessage>), PipelineError> {
        let thread = self.threads.fetch_thread(&email.thread_id).await?;

        let request = CompletionRequest::new(vec![
            ChatMessage::system(prompts::agent_system_prompt(&ACTION_AGENT, ANALYSIS_OUTPUT)),
            ChatMessage::user(prompts::analysis_task(email, &thread)),
        ])
        .with_temperature(ANALYSIS_TEMPERATURE)
        .with_max_tokens(ANALYSIS_MAX_TOKENS);

        let response = self.llm.complete(request).await?;
        let mut analysis: ThreadAnalysis =
            parse_response(&response).map_err(|e| PipelineError::Analysis {
                thread_id: email.thread_id.clone(),
                reason: e,
            })?;

        if analysis.thread_id != email.thread_id {
            debug!(
                expected = %email.thread_id,
                returned = %analysis.thread_id,
                "Analysis thread id differs, using the batch thread id"
            );
            analysis.thread_id = email.thread_id.clone();
        }
        Ok((analysis, thread))
    }

    /// Ask the writer agent for a reply and store it as a draft.
    async fn write(
        &self,
        email: &MailMessage,
        analysis: &ThreadAnalysis,
        thread: &[EmailMessage],
    ) -> Result<DraftOutcome, PipelineError> {
        let analysis_json = serde_json::to_string_pretty(analysis).map_err(|e| {
            PipelineError::Drafting {
                thread_id: email.thread_id.clone(),
                reason: e.to_string(),
            }
        })?;

        let request = CompletionRequest::new(vec![
            ChatMessage::system(prompts::agent_system_prompt(&WRITER_AGENT, WRITER_OUTPUT)),
            ChatMessage::user(prompts::writer_task(&analysis_json, &self.self_address)),
        ])
        .with_temperature(WRITER_TEMPERATURE)
        .with_max_tokens(WRITER_MAX_TOKENS);

        let response = self.llm.complete(request).await?;
        let drafted: DraftedResponse =
            parse_response(&response).map_err(|e| PipelineError::Drafting {
                thread_id: email.thread_id.clone(),
                reason: e,
            })?;

        if drafted.message.trim().is_empty() {
            return Err(PipelineError::Drafting {
                thread_id: email.thread_id.clone(),
                reason: "writer returned an empty message".to_string(),
            });
        }

        let to = first_non_empty(&[
            drafted.to.as_str(),
            analysis.sender_email.as_str(),
            sender_address(&email.sender),
        ]);
        let subject = if drafted.subject.trim().is_empty() {
            reply_subject(email.subject.as_deref().unwrap_or_default())
        } else {
            drafted.subject.trim().to_string()
        };

        let mut request = DraftRequest::new(to.clone(), subject.clone(), drafted.message);
        if let Some(parent) = reply_parent(thread) {
            request = request.in_reply_to(parent);
        }

        let draft_id = self.drafts.create_draft(&request).await?;
        info!(
            email_id = %email.id,
            thread_id = %email.thread_id,
            draft_id = %draft_id,
            to = %to,
            "Draft stored"
        );

        Ok(DraftOutcome {
            email_id: email.id.clone(),
            thread_id: email.thread_id.clone(),
            draft_id,
            to,
            subject,
        })
    }
}

#[async_trait]
impl Dispatcher for EmailCrew {
    async fn dispatch(&self, batch: &[MailMessage]) -> Result<DispatchReport, PipelineError> {
        let mut report = DispatchReport::default();

        let mut candidates = Vec::with_capacity(batch.len());
        for email in batch {
            match self.rules.evaluate(email) {
                Some(reason) => report.ignored.push(IgnoredEmail {
                    id: email.id.clone(),
                    reason,
                }),
                None => candidates.push(email.clone()),
            }
        }

        if candidates.is_empty() {
            debug!(ignored = report.ignored.len(), "Rules dropped the whole batch");
            return Ok(report);
        }

        report.examined = candidates.iter().map(|e| e.id.clone()).collect();
        info!(count = candidates.len(), "Filtering emails");
        report.action_required = self.filter(&candidates).await?;

        for id in &report.action_required {
            let Some(email) = candidates.iter().find(|e| &e.id == id) else {
                continue;
            };

            let result = match self.analyze(email).await {
                Ok((analysis, thread)) => self.write(email, &analysis, &thread).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(draft) => report.drafts.push(draft),
                Err(e) => {
                    warn!(email_id = %email.id, error = %e, "Drafting failed");
                    report.failures.push(DispatchFailure {
                        email_id: email.id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }
}

/// Parse `to|subject|message` draft tool input.
pub fn parse_draft_input(data: &str) -> Result<DraftRequest, PipelineError> {
    let parts: Vec<&str> = data.split('|').collect();
    let [to, subject, message] = parts.as_slice() else {
        return Err(PipelineError::InvalidDraftInput(format!(
            "expected 3 pipe-separated fields (to|subject|message), got {}",
            parts.len()
        )));
    };

    let to = to.trim();
    if to.is_empty() {
        return Err(PipelineError::InvalidDraftInput(
            "recipient is empty".to_string(),
        ));
    }
    Ok(DraftRequest::new(to, subject.trim(), message.trim()))
}

/// Extract a JSON value from LLM output (handles markdown wrapping and prose).
pub fn extract_json(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') || inner.starts_with('[') {
                return inner.to_string();
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}

/// Parse a stage's JSON, accepting a one-element list where an object is expected.
fn parse_stage_output<T: DeserializeOwned>(raw: &str) -> Result<T, String> {
    let json = extract_json(raw);
    let value: serde_json::Value =
        serde_json::from_str(&json).map_err(|e| format!("JSON parse error: {e}"))?;
    let value = match value {
        serde_json::Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
        other => other,
    };
    serde_json::from_value(value).map_err(|e| format!("unexpected shape: {e}"))
}

/// Parse a stage reply, noting when the model ran out of tokens mid-answer.
fn parse_response<T: DeserializeOwned>(response: &CompletionResponse) -> Result<T, String> {
    parse_stage_output(&response.content).map_err(|e| {
        if response.finish_reason == FinishReason::Length {
            format!("{e} (response truncated at max_tokens)")
        } else {
            e
        }
    })
}

/// Message-ID of the newest message not sent by the operator.
fn reply_parent(thread: &[EmailMessage]) -> Option<String> {
    thread
        .iter()
        .rev()
        .find(|m| !m.is_outgoing && !m.message_id.is_empty())
        .map(|m| m.message_id.clone())
}

fn reply_subject(subject: &str) -> String {
    let subject = subject.trim();
    if subject.to_ascii_lowercase().starts_with("re:") {
        subject.to_string()
    } else if subject.is_empty() {
        "Re: (no subject)".to_string()
    } else {
        format!("Re: {subject}")
    }
}

fn first_non_empty(candidates: &[&str]) -> String {
    candidates
        .iter()
        .map(|c| c.trim())
        .find(|c| !c.is_empty())
        .unwrap_or_default()
        .to_string()
}
