//! Bridges a rig-core `CompletionModel` to our `LlmProvider` trait.

use async_trait::async_trait;
use rig::completion::CompletionModel;
use rig::completion::message::{AssistantContent, Message};

use crate::error::LlmError;
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role,
};

/// Adapter over any rig completion model.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
}

impl<M> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let preamble = request.system_prompt();

        let mut turns: Vec<Message> = request
            .messages
            .iter()
            .filter_map(|m| match m.role {
                Role::User => Some(Message::user(m.content.clone())),
                Role::Assistant => Some(Message::assistant(m.content.clone())),
                Role::System => None,
            })
            .collect();

        let prompt = turns.pop().ok_or_else(|| LlmError::InvalidResponse {
            provider: self.model_name.clone(),
            reason: "request has no user or assistant message".to_string(),
        })?;

        let mut builder = self.model.completion_request(prompt).messages(turns);
        if let Some(preamble) = preamble {
            builder = builder.preamble(preamble);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(f64::from(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(u64::from(max_tokens));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify_failure(&self.model_name, e.to_string()))?;

        let content: String = response
            .choice
            .iter()
            .filter_map(|c| match c {
                AssistantContent::Text(text) => Some(text.text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        if content.is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: self.model_name.clone(),
                reason: "response contained no text".to_string(),
            });
        }

        let output_tokens = u32::try_from(response.usage.output_tokens).unwrap_or(u32::MAX);
        Ok(CompletionResponse {
            content,
            input_tokens: u32::try_from(response.usage.input_tokens).unwrap_or(u32::MAX),
            output_tokens,
            finish_reason: finish_reason(output_tokens, request.max_tokens),
        })
    }
}

/// Map a rig error message onto the error kinds callers act on.
fn classify_failure(provider: &str, reason: String) -> LlmError {
    let lower = reason.to_ascii_lowercase();
    if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests")
    {
        return LlmError::RateLimited {
            provider: provider.to_string(),
            retry_after: None,
        };
    }
    if lower.contains("401")
        || lower.contains("unauthorized")
        || lower.contains("invalid api key")
        || lower.contains("invalid x-api-key")
        || lower.contains("authentication_error")
    {
        return LlmError::AuthFailed {
            provider: provider.to_string(),
        };
    }
    LlmError::RequestFailed {
        provider: provider.to_string(),
        reason,
    }
}

/// rig does not surface the stop reason, so infer truncation from usage.
fn finish_reason(output_tokens: u32, max_tokens: Option<u32>) -> FinishReason {
    match max_tokens {
        Some(limit) if output_tokens >= limit => FinishReason::Length,
        _ => FinishReason::Stop,
    }
}
