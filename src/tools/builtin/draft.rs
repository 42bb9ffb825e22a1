//! Draft creation tool. Drafts are stored for review and never sent.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use crate::context::ToolContext;
use crate::mail::DraftStore;
use crate::pipeline::parse_draft_input;
use crate::tools::tool::{Tool, ToolError, ToolOutput, require_str};

pub struct CreateDraftTool {
    drafts: Arc<dyn DraftStore>,
}

impl CreateDraftTool {
    pub fn new(drafts: Arc<dyn DraftStore>) -> Self {
        Self { drafts }
    }
}

#[async_trait]
impl Tool for CreateDraftTool {
    fn name(&self) -> &str {
        "create_draft"
    }

    fn description(&self) -> &str {
        "Save an email draft for review. Input is a single pipe-separated string: \
         recipient|subject|message, e.g. \"alice@example.com|Re: Budget|Thanks, looks good.\""
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "data": {
                    "type": "string",
                    "description": "to|subject|message"
                }
            },
            "required": ["data"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let data = require_str(&params, "data")?;
        let draft =
            parse_draft_input(data).map_err(|e| ToolError::InvalidParameters(e.to_string()))?;

        let draft_id = self
            .drafts
            .create_draft(&draft)
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

        info!(draft_id = %draft_id, to = %draft.to, "Draft created");
        Ok(ToolOutput::success(
            json!({
                "status": "success",
                "message": format!("Draft created for {}", draft.to),
                "draft_id": draft_id,
                "to": draft.to,
                "subject": draft.subject,
            }),
            start.elapsed(),
        ))
    }
}
