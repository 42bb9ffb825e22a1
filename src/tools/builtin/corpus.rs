//! Corpus tools: create, populate, query, inspect and delete retrieval corpora.
//!
//! Every tool answers with a JSON object carrying `status` (`success`,
//! `warning` or `error`) and `message`. Backend failures are reported that
//! way; `ToolError` is reserved for malformed parameters.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{error, info};

use crate::context::ToolContext;
use crate::corpus::CorpusService;
use crate::corpus::names::{normalize_paths, sanitize_display_name};
use crate::tools::tool::{Tool, ToolError, ToolOutput, optional_bool, require_str};

fn corpus_name_param(description: &str) -> Value {
    json!({ "type": "string", "description": description })
}

/// Resolve the `corpus_name` parameter, falling back to the current corpus.
async fn corpus_name(
    service: &CorpusService,
    params: &Value,
    ctx: &ToolContext,
) -> Result<Option<String>, ToolError> {
    let raw = params
        .get("corpus_name")
        .map(|v| {
            v.as_str()
                .ok_or_else(|| ToolError::InvalidParameters("'corpus_name' must be a string".into()))
        })
        .transpose()?
        .unwrap_or_default();
    Ok(service.effective_name(raw, ctx).await)
}

fn no_corpus_selected() -> Value {
    json!({
        "status": "error",
        "message": "No corpus name given and no current corpus is set.",
    })
}

// ── create_corpus ───────────────────────────────────────────────────

pub struct CreateCorpusTool {
    service: Arc<CorpusService>,
}

impl CreateCorpusTool {
    pub fn new(service: Arc<CorpusService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for CreateCorpusTool {
    fn name(&self) -> &str {
        "create_corpus"
    }

    fn description(&self) -> &str {
        "Create a new retrieval corpus with the given name and make it the current corpus."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "corpus_name": corpus_name_param("Name for the new corpus")
            },
            "required": ["corpus_name"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let corpus_name = require_str(&params, "corpus_name")?.trim();
        if corpus_name.is_empty() {
            return Err(ToolError::InvalidParameters("'corpus_name' is empty".into()));
        }

        if self.service.check_corpus_exists(corpus_name, ctx).await {
            return Ok(ToolOutput::success(
                json!({
                    "status": "error",
                    "message": format!("Corpus '{corpus_name}' already exists. Please use a different name."),
                    "corpus_name": corpus_name,
                    "corpus_created": false,
                }),
                start.elapsed(),
            ));
        }

        let display_name = sanitize_display_name(corpus_name);
        let result = match self
            .service
            .backend()
            .create_corpus(&display_name, &self.service.settings().embedding_model)
            .await
        {
            Ok(corpus) => {
                ctx.mark_corpus(corpus_name, true).await;
                ctx.set_current_corpus(corpus_name).await;
                info!(corpus = %corpus_name, resource = %corpus.name, "Corpus created");
                json!({
                    "status": "success",
                    "message": format!("Corpus '{corpus_name}' created successfully."),
                    "corpus_name": corpus.name,
                    "display_name": corpus.display_name,
                    "corpus_created": true,
                })
            }
            Err(e) => {
                error!(corpus = %corpus_name, error = %e, "Create corpus failed");
                json!({
                    "status": "error",
                    "message": format!("Error creating corpus '{corpus_name}': {e}"),
                    "corpus_name": corpus_name,
                    "corpus_created": false,
                })
            }
        };
        Ok(ToolOutput::success(result, start.elapsed()))
    }
}

// ── add_data ────────────────────────────────────────────────────────

pub struct AddDataTool {
    service: Arc<CorpusService>,
}

impl AddDataTool {
    pub fn new(service: Arc<CorpusService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for AddDataTool {
    fn name(&self) -> &str {
        "add_data"
    }

    fn description(&self) -> &str {
        "Add documents to a corpus. Accepts Google Drive URLs \
         (https://drive.google.com/file/d/{FILE_ID}/view), Google Docs/Sheets/Slides URLs \
         (converted to Drive form) and Cloud Storage paths (gs://bucket/path). \
         An empty corpus_name uses the current corpus."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "corpus_name": corpus_name_param("Corpus to add data to"),
                "paths": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "URLs or gs:// paths to import"
                }
            },
            "required": ["corpus_name", "paths"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let Some(corpus_name) = corpus_name(&self.service, &params, ctx).await? else {
            return Ok(ToolOutput::success(no_corpus_selected(), start.elapsed()));
        };
        let raw_paths = params.get("paths").cloned().unwrap_or(Value::Null);

        if !self.service.check_corpus_exists(&corpus_name, ctx).await {
            return Ok(ToolOutput::success(
                json!({
                    "status": "error",
                    "message": format!(
                        "Corpus '{corpus_name}' does not exist. Please create it first using the create_corpus tool."
                    ),
                    "corpus_name": corpus_name,
                    "paths": raw_paths,
                }),
                start.elapsed(),
            ));
        }

        let paths: Option<Vec<&str>> = raw_paths
            .as_array()
            .filter(|a| !a.is_empty())
            .and_then(|a| a.iter().map(Value::as_str).collect());
        let Some(paths) = paths else {
            return Ok(ToolOutput::success(
                json!({
                    "status": "error",
                    "message": "Invalid paths provided. Please provide a list of valid URLs or GCS paths.",
                    "corpus_name": corpus_name,
                    "paths": raw_paths,
                }),
                start.elapsed(),
            ));
        };

        let normalized = normalize_paths(paths);
        if normalized.valid.is_empty() {
            return Ok(ToolOutput::success(
                json!({
                    "status": "error",
                    "message": "No valid paths provided. Please provide Google Drive URLs or GCS paths.",
                    "corpus_name": corpus_name,
                    "invalid_paths": normalized.invalid,
                }),
                start.elapsed(),
            ));
        }

        let resource = self.service.resource_name(&corpus_name).await;
        let request = self.service.import_request(normalized.valid.clone());
        let result = match self.service.backend().import_files(&resource, &request).await {
            Ok(count) => {
                ctx.set_current_corpus_if_unset(&corpus_name).await;
                let note = if normalized.conversions.is_empty() {
                    ""
                } else {
                    " (Converted Google Docs URLs to Drive format)"
                };
                json!({
                    "status": "success",
                    "message": format!("Successfully added {count} files to corpus '{corpus_name}'{note}"),
                    "corpus_name": corpus_name,
                    "files_added": count,
                    "paths": normalized.valid,
                    "conversions": normalized.conversions,
                    "invalid_paths": normalized.invalid,
                })
            }
            Err(e) => {
                error!(corpus = %corpus_name, error = %e, "Import failed");
                json!({
                    "status": "error",
                    "message": format!("Error adding data to corpus '{corpus_name}': {e}"),
                    "corpus_name": corpus_name,
                    "paths": raw_paths,
                })
            }
        };
        Ok(ToolOutput::success(result, start.elapsed()))
    }
}

// ── rag_query ───────────────────────────────────────────────────────

pub struct RagQueryTool {
    service: Arc<CorpusService>,
}

impl RagQueryTool {
    pub fn new(service: Arc<CorpusService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for RagQueryTool {
    fn name(&self) -> &str {
        "rag_query"
    }

    fn description(&self) -> &str {
        "Query a corpus with a question and return the most relevant passages. \
         Prefer the resource_name from list_corpora. An empty corpus_name uses the current corpus."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "corpus_name": corpus_name_param("Corpus to query"),
                "query": { "type": "string", "description": "The question to search for" }
            },
            "required": ["corpus_name", "query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let query = require_str(&params, "query")?;
        let Some(corpus_name) = corpus_name(&self.service, &params, ctx).await? else {
            return Ok(ToolOutput::success(no_corpus_selected(), start.elapsed()));
        };

        if !self.service.check_corpus_exists(&corpus_name, ctx).await {
            return Ok(ToolOutput::success(
                json!({
                    "status": "error",
                    "message": format!("Corpus '{corpus_name}' does not exist"),
                    "corpus_name": corpus_name,
                    "query": query,
                }),
                start.elapsed(),
            ));
        }

        let resource = self.service.resource_name(&corpus_name).await;
        info!(corpus = %corpus_name, query = %query, "Querying corpus");
        let request = self.service.retrieval_request(query);
        let result = match self.service.backend().retrieve(&resource, &request).await {
            Ok(contexts) if contexts.is_empty() => json!({
                "status": "warning",
                "message": format!("No relevant information found in the corpus {corpus_name} for query:\n{query}\n"),
                "corpus_name": corpus_name,
                "query": query,
                "results": [],
                "results_count": 0,
            }),
            Ok(contexts) => {
                let results: Vec<Value> = contexts
                    .iter()
                    .map(|c| {
                        json!({
                            "source_uri": c.source_uri,
                            "source_name": c.source_display_name,
                            "text": c.text,
                            "score": c.score,
                        })
                    })
                    .collect();
                json!({
                    "status": "success",
                    "message": format!("Successfully queried corpus {corpus_name}"),
                    "corpus_name": corpus_name,
                    "query": query,
                    "results_count": results.len(),
                    "results": results,
                })
            }
            Err(e) => {
                error!(corpus = %corpus_name, error = %e, "Query failed");
                json!({
                    "status": "error",
                    "message": format!("Error querying corpus {corpus_name}: {e}"),
                    "corpus_name": corpus_name,
                    "query": query,
                })
            }
        };
        Ok(ToolOutput::success(result, start.elapsed()))
    }
}

// ── list_corpora ────────────────────────────────────────────────────

pub struct ListCorporaTool {
    service: Arc<CorpusService>,
}

impl ListCorporaTool {
    pub fn new(service: Arc<CorpusService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for ListCorporaTool {
    fn name(&self) -> &str {
        "list_corpora"
    }

    fn description(&self) -> &str {
        "List all corpora with their resource names, display names and timestamps."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, _ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let result = match self.service.backend().list_corpora().await {
            Ok(corpora) => {
                let entries: Vec<Value> = corpora
                    .iter()
                    .map(|c| {
                        json!({
                            "resource_name": c.name,
                            "display_name": c.display_name,
                            "create_time": c.create_time.clone().unwrap_or_default(),
                            "update_time": c.update_time.clone().unwrap_or_default(),
                        })
                    })
                    .collect();
                json!({
                    "status": "success",
                    "message": format!("Found {} corpora", entries.len()),
                    "corpora": entries,
                })
            }
            Err(e) => json!({
                "status": "error",
                "message": format!("Error listing corpora: {e}"),
                "corpora": [],
            }),
        };
        Ok(ToolOutput::success(result, start.elapsed()))
    }
}

// ── get_corpus_info ─────────────────────────────────────────────────

pub struct GetCorpusInfoTool {
    service: Arc<CorpusService>,
}

impl GetCorpusInfoTool {
    pub fn new(service: Arc<CorpusService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for GetCorpusInfoTool {
    fn name(&self) -> &str {
        "get_corpus_info"
    }

    fn description(&self) -> &str {
        "Show a corpus's files with their ids, names and source URIs. \
         File ids are what delete_document expects."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "corpus_name": corpus_name_param("Corpus to inspect")
            },
            "required": ["corpus_name"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let Some(corpus_name) = corpus_name(&self.service, &params, ctx).await? else {
            return Ok(ToolOutput::success(no_corpus_selected(), start.elapsed()));
        };

        if !self.service.check_corpus_exists(&corpus_name, ctx).await {
            return Ok(ToolOutput::success(
                json!({
                    "status": "error",
                    "message": format!("Corpus '{corpus_name}' does not exist"),
                    "corpus_info": null,
                }),
                start.elapsed(),
            ));
        }

        let resource = self.service.resource_name(&corpus_name).await;
        let result = match self.service.backend().list_files(&resource).await {
            Ok(files) => {
                let details: Vec<Value> = files
                    .iter()
                    .map(|f| {
                        json!({
                            "file_id": f.file_id(),
                            "display_name": f.display_name,
                            "source_uri": f.source_uri,
                            "create_time": f.create_time.clone().unwrap_or_default(),
                            "update_time": f.update_time.clone().unwrap_or_default(),
                        })
                    })
                    .collect();
                json!({
                    "status": "success",
                    "message": format!("Successfully retrieved information for corpus '{corpus_name}'"),
                    "corpus_name": corpus_name,
                    "resource_name": resource,
                    "file_count": details.len(),
                    "files": details,
                })
            }
            Err(e) => json!({
                "status": "error",
                "message": format!("Error getting information for corpus '{corpus_name}': {e}"),
                "corpus_name": corpus_name,
            }),
        };
        Ok(ToolOutput::success(result, start.elapsed()))
    }
}

// ── delete_document ─────────────────────────────────────────────────

pub struct DeleteDocumentTool {
    service: Arc<CorpusService>,
}

impl DeleteDocumentTool {
    pub fn new(service: Arc<CorpusService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for DeleteDocumentTool {
    fn name(&self) -> &str {
        "delete_document"
    }

    fn description(&self) -> &str {
        "Delete one document from a corpus. Requires confirm=true. \
         Get the document id from get_corpus_info."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "corpus_name": corpus_name_param("Corpus containing the document"),
                "document_id": { "type": "string", "description": "File id from get_corpus_info" },
                "confirm": { "type": "boolean", "description": "Must be true to delete" }
            },
            "required": ["corpus_name", "document_id", "confirm"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let document_id = require_str(&params, "document_id")?.trim();
        let confirm = optional_bool(&params, "confirm");
        let Some(corpus_name) = corpus_name(&self.service, &params, ctx).await? else {
            return Ok(ToolOutput::success(no_corpus_selected(), start.elapsed()));
        };

        if !self.service.check_corpus_exists(&corpus_name, ctx).await {
            return Ok(ToolOutput::success(
                json!({
                    "status": "error",
                    "message": format!("Corpus '{corpus_name}' does not exist"),
                    "corpus_name": corpus_name,
                    "document_id": document_id,
                }),
                start.elapsed(),
            ));
        }

        if !confirm {
            return Ok(ToolOutput::success(
                json!({
                    "status": "error",
                    "message": "Deletion not confirmed. Please set confirm to true to proceed.",
                    "corpus_name": corpus_name,
                    "document_id": document_id,
                }),
                start.elapsed(),
            ));
        }

        let resource = self.service.resource_name(&corpus_name).await;
        let file = format!("{resource}/ragFiles/{document_id}");
        let result = match self.service.backend().delete_file(&file).await {
            Ok(()) => {
                info!(corpus = %corpus_name, document_id, "Document deleted");
                json!({
                    "status": "success",
                    "message": format!("Document '{document_id}' deleted successfully from corpus '{corpus_name}'"),
                    "corpus_name": corpus_name,
                    "document_id": document_id,
                })
            }
            Err(e) => json!({
                "status": "error",
                "message": format!("Error deleting document '{document_id}' from corpus '{corpus_name}': {e}"),
                "corpus_name": corpus_name,
                "document_id": document_id,
            }),
        };
        Ok(ToolOutput::success(result, start.elapsed()))
    }
}

// ── delete_corpus ───────────────────────────────────────────────────

pub struct DeleteCorpusTool {
    service: Arc<CorpusService>,
}

impl DeleteCorpusTool {
    pub fn new(service: Arc<CorpusService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for DeleteCorpusTool {
    fn name(&self) -> &str {
        "delete_corpus"
    }

    fn description(&self) -> &str {
        "Delete a corpus and all of its documents. Requires confirm=true."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "corpus_name": corpus_name_param("Corpus to delete"),
                "confirm": { "type": "boolean", "description": "Must be true to delete" }
            },
            "required": ["corpus_name", "confirm"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let corpus_name = require_str(&params, "corpus_name")?.trim().to_string();
        let confirm = optional_bool(&params, "confirm");

        if !self.service.check_corpus_exists(&corpus_name, ctx).await {
            return Ok(ToolOutput::success(
                json!({
                    "status": "error",
                    "message": format!("Corpus '{corpus_name}' does not exist"),
                    "corpus_name": corpus_name,
                }),
                start.elapsed(),
            ));
        }

        if !confirm {
            return Ok(ToolOutput::success(
                json!({
                    "status": "error",
                    "message": "Deletion not confirmed. Please set confirm to true to proceed.",
                    "corpus_name": corpus_name,
                }),
                start.elapsed(),
            ));
        }

        let resource = self.service.resource_name(&corpus_name).await;
        let result = match self.service.backend().delete_corpus(&resource).await {
            Ok(()) => {
                ctx.mark_corpus(&corpus_name, false).await;
                ctx.clear_current_corpus(&corpus_name).await;
                info!(corpus = %corpus_name, "Corpus deleted");
                json!({
                    "status": "success",
                    "message": format!("Corpus '{corpus_name}' deleted successfully."),
                    "corpus_name": corpus_name,
                })
            }
            Err(e) => json!({
                "status": "error",
                "message": format!("Error deleting corpus '{corpus_name}': {e}"),
                "corpus_name": corpus_name,
            }),
        };
        Ok(ToolOutput::success(result, start.elapsed()))
    }
}
