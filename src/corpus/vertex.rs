//! Vertex AI RAG Engine REST client.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::corpus::backend::CorpusBackend;
use crate::corpus::names::drive_file_id;
use crate::corpus::settings::CorpusSettings;
use crate::corpus::types::{
    CorpusFile, CorpusInfo, ImportRequest, RetrievalRequest, RetrievedContext,
};
use crate::error::CorpusError;

const OPERATION_POLL_INTERVAL: Duration = Duration::from_secs(2);
const OPERATION_POLL_ATTEMPTS: u32 = 90;
const LIST_PAGE_SIZE: u32 = 100;

/// `CorpusBackend` over the Vertex AI `ragCorpora` REST API.
pub struct VertexRagClient {
    client: reqwest::Client,
    settings: CorpusSettings,
    token: SecretString,
    base_url: String,
}

impl VertexRagClient {
    pub fn new(settings: CorpusSettings, token: SecretString) -> Self {
        let base_url = format!("https://{}-aiplatform.googleapis.com/v1", settings.location);
        Self {
            client: reqwest::Client::new(),
            settings,
            token,
            base_url,
        }
    }

    /// Read the bearer token from `GOOGLE_OAUTH_ACCESS_TOKEN`.
    pub fn from_env(settings: CorpusSettings) -> Result<Self, CorpusError> {
        let token = std::env::var("GOOGLE_OAUTH_ACCESS_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                CorpusError::MissingToken(
                    "set GOOGLE_OAUTH_ACCESS_TOKEN (e.g. from `gcloud auth print-access-token`)"
                        .to_string(),
                )
            })?;
        Ok(Self::new(settings, SecretString::from(token)))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn settings(&self) -> &CorpusSettings {
        &self.settings
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, CorpusError> {
        let resp = request.bearer_auth(self.token.expose_secret()).send().await?;
        let status = resp.status();
        let url = resp.url().to_string();
        let body = resp.text().await?;

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(CorpusError::NotFound(url));
        }
        if !status.is_success() {
            return Err(CorpusError::Status {
                status: status.as_u16(),
                body,
            });
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| CorpusError::InvalidResponse(e.to_string()))
    }

    /// Poll a long-running operation until it reports `done`, returning its `response`.
    async fn wait_operation(&self, mut operation: Value) -> Result<Value, CorpusError> {
        for attempt in 0..OPERATION_POLL_ATTEMPTS {
            if operation.get("done").and_then(Value::as_bool) == Some(true) {
                return operation_result(operation);
            }
            let name = operation
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| CorpusError::InvalidResponse("operation has no name".to_string()))?
                .to_string();
            debug!(operation = %name, attempt, "Waiting for operation");
            tokio::time::sleep(OPERATION_POLL_INTERVAL).await;
            operation = self.send(self.client.get(self.api_url(&name))).await?;
        }
        Err(CorpusError::Request(format!(
            "operation did not finish after {} polls",
            OPERATION_POLL_ATTEMPTS
        )))
    }
}

#[async_trait]
impl CorpusBackend for VertexRagClient {
    async fn list_corpora(&self) -> Result<Vec<CorpusInfo>, CorpusError> {
        let mut corpora = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let url = self.api_url(&format!("{}/ragCorpora", self.settings.parent()));
            let query = page_query(page_token.as_deref());
            let page = self.send(self.client.get(url).query(&query)).await?;
            corpora.extend(
                page.get("ragCorpora")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                    .filter_map(parse_corpus),
            );
            page_token = page
                .get("nextPageToken")
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty())
                .map(str::to_string);
            if page_token.is_none() {
                return Ok(corpora);
            }
        }
    }

    async fn create_corpus(
        &self,
        display_name: &str,
        embedding_model: &str,
    ) -> Result<CorpusInfo, CorpusError> {
        let parent = self.settings.parent();
        let body = json!({
            "displayName": display_name,
            "vectorDbConfig": {
                "ragEmbeddingModelConfig": {
                    "vertexPredictionEndpoint": {
                        "endpoint": format!("{parent}/{embedding_model}")
                    }
                }
            }
        });
        let operation = self
            .send(self.client.post(self.api_url(&format!("{parent}/ragCorpora"))).json(&body))
            .await?;
        let created = self.wait_operation(operation).await?;
        info!(display_name, "Corpus created");

        if let Some(corpus) = parse_corpus(&created) {
            return Ok(corpus);
        }
        // Some operations finish without echoing the corpus.
        self.list_corpora()
            .await?
            .into_iter()
            .find(|c| c.display_name == display_name)
            .ok_or_else(|| CorpusError::NotFound(display_name.to_string()))
    }

    async fn import_files(&self, corpus: &str, request: &ImportRequest) -> Result<u64, CorpusError> {
        let mut imported = 0;
        for body in import_bodies(request) {
            let operation = self
                .send(
                    self.client
                        .post(self.api_url(&format!("{corpus}/ragFiles:import")))
                        .json(&body),
                )
                .await?;
            let response = self.wait_operation(operation).await?;
            imported += json_u64(response.get("importedRagFilesCount")).unwrap_or(0);
        }
        info!(corpus, imported, "Import finished");
        Ok(imported)
    }

    async fn retrieve(
        &self,
        corpus: &str,
        request: &RetrievalRequest,
    ) -> Result<Vec<RetrievedContext>, CorpusError> {
        let body = json!({
            "vertexRagStore": {
                "ragResources": [{ "ragCorpus": corpus }]
            },
            "query": {
                "text": request.query,
                "ragRetrievalConfig": {
                    "topK": request.top_k,
                    "filter": { "vectorDistanceThreshold": request.distance_threshold }
                }
            }
        });
        let url = self.api_url(&format!("{}:retrieveContexts", self.settings.parent()));
        let response = self.send(self.client.post(url).json(&body)).await?;
        Ok(parse_contexts(&response))
    }

    async fn list_files(&self, corpus: &str) -> Result<Vec<CorpusFile>, CorpusError> {
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let url = self.api_url(&format!("{corpus}/ragFiles"));
            let query = page_query(page_token.as_deref());
            let page = self.send(self.client.get(url).query(&query)).await?;
            files.extend(
                page.get("ragFiles")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                    .filter_map(parse_file),
            );
            page_token = page
                .get("nextPageToken")
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty())
                .map(str::to_string);
            if page_token.is_none() {
                return Ok(files);
            }
        }
    }

    async fn delete_file(&self, file: &str) -> Result<(), CorpusError> {
        let operation = self.send(self.client.delete(self.api_url(file))).await?;
        self.wait_operation(operation).await?;
        Ok(())
    }

    async fn delete_corpus(&self, corpus: &str) -> Result<(), CorpusError> {
        let url = self.api_url(corpus);
        let operation = self
            .send(self.client.delete(url).query(&[("force", "true")]))
            .await?;
        self.wait_operation(operation).await?;
        Ok(())
    }
}

// ── Wire helpers ────────────────────────────────────────────────────

fn operation_result(operation: Value) -> Result<Value, CorpusError> {
    if let Some(error) = operation.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("operation failed");
        return Err(CorpusError::Request(message.to_string()));
    }
    Ok(operation.get("response").cloned().unwrap_or(Value::Null))
}

fn parse_corpus(value: &Value) -> Option<CorpusInfo> {
    let name = value.get("name")?.as_str()?.to_string();
    Some(CorpusInfo {
        display_name: str_field(value, "displayName"),
        create_time: value.get("createTime").and_then(Value::as_str).map(str::to_string),
        update_time: value.get("updateTime").and_then(Value::as_str).map(str::to_string),
        name,
    })
}

fn parse_file(value: &Value) -> Option<CorpusFile> {
    let name = value.get("name")?.as_str()?.to_string();
    let source_uri = value
        .pointer("/gcsSource/uris/0")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            value
                .pointer("/googleDriveSource/resourceIds/0/resourceId")
                .and_then(Value::as_str)
                .map(|id| format!("https://drive.google.com/file/d/{id}/view"))
        })
        .unwrap_or_default();
    Some(CorpusFile {
        display_name: str_field(value, "displayName"),
        source_uri,
        create_time: value.get("createTime").and_then(Value::as_str).map(str::to_string),
        update_time: value.get("updateTime").and_then(Value::as_str).map(str::to_string),
        name,
    })
}

fn parse_contexts(response: &Value) -> Vec<RetrievedContext> {
    response
        .pointer("/contexts/contexts")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .map(|ctx| RetrievedContext {
            source_uri: str_field(ctx, "sourceUri"),
            source_display_name: str_field(ctx, "sourceDisplayName"),
            text: str_field(ctx, "text"),
            score: ctx.get("score").and_then(Value::as_f64).unwrap_or(0.0),
        })
        .collect()
}

/// One import body per source kind; the API takes a single source per call.
fn import_bodies(request: &ImportRequest) -> Vec<Value> {
    let gcs: Vec<&str> = request
        .paths
        .iter()
        .map(String::as_str)
        .filter(|p| p.starts_with("gs://"))
        .collect();
    let drive: Vec<Value> = request
        .paths
        .iter()
        .filter_map(|p| drive_file_id(p))
        .map(|id| json!({ "resourceId": id, "resourceType": "RESOURCE_TYPE_FILE" }))
        .collect();

    let transformation = json!({
        "ragFileChunkingConfig": {
            "fixedLengthChunking": {
                "chunkSize": request.chunking.chunk_size,
                "chunkOverlap": request.chunking.chunk_overlap
            }
        }
    });

    let mut bodies = Vec::new();
    if !gcs.is_empty() {
        bodies.push(json!({
            "importRagFilesConfig": {
                "gcsSource": { "uris": gcs },
                "ragFileTransformationConfig": transformation,
                "maxEmbeddingRequestsPerMin": request.max_embedding_requests_per_minute
            }
        }));
    }
    if !drive.is_empty() {
        bodies.push(json!({
            "importRagFilesConfig": {
                "googleDriveSource": { "resourceIds": drive },
                "ragFileTransformationConfig": transformation,
                "maxEmbeddingRequestsPerMin": request.max_embedding_requests_per_minute
            }
        }));
    }
    bodies
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Query pairs for one page of a list call. reqwest encodes the values.
fn page_query(page_token: Option<&str>) -> Vec<(&'static str, String)> {
    let mut query = vec![("pageSize", LIST_PAGE_SIZE.to_string())];
    if let Some(token) = page_token {
        query.push(("pageToken", token.to_string()));
    }
    query
}

/// int64 fields arrive as JSON strings.
fn json_u64(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::types::ChunkingConfig;

    #[test]
    fn api_url_joins_base_and_path() {
        let client = VertexRagClient::new(CorpusSettings::new("p"), SecretString::from("t"));
        assert_eq!(
            client.api_url("projects/p/locations/us-central1/ragCorpora"),
            "https://us-central1-aiplatform.googleapis.com/v1/projects/p/locations/us-central1/ragCorpora"
        );
        let local = client.with_base_url("http://localhost:9000/v1/");
        assert_eq!(local.api_url("/x"), "http://localhost:9000/v1/x");
    }

    #[test]
    fn page_token_is_url_encoded() {
        let client = reqwest::Client::new();
        let request = client
            .get("https://example.com/v1/ragFiles")
            .query(&page_query(Some("a+b/c=&d")))
            .build()
            .unwrap();
        assert_eq!(
            request.url().query(),
            Some(format!("pageSize={LIST_PAGE_SIZE}&pageToken=a%2Bb%2Fc%3D%26d").as_str())
        );

        let first = page_query(None);
        assert_eq!(first, vec![("pageSize", LIST_PAGE_SIZE.to_string())]);
    }

    #[test]
    fn parses_corpus_listing_entry() {
        let value = json!({
            "name": "projects/p/locations/l/ragCorpora/1",
            "displayName": "docs",
            "createTime": "2025-01-01T00:00:00Z"
        });
        let corpus = parse_corpus(&value).unwrap();
        assert_eq!(corpus.display_name, "docs");
        assert_eq!(corpus.create_time.as_deref(), Some("2025-01-01T00:00:00Z"));
        assert!(corpus.update_time.is_none());
        assert!(parse_corpus(&json!({"displayName": "x"})).is_none());
    }

    #[test]
    fn parses_file_sources() {
        let gcs = parse_file(&json!({
            "name": "c/ragFiles/1",
            "displayName": "a.pdf",
            "gcsSource": {"uris": ["gs://b/a.pdf"]}
        }))
        .unwrap();
        assert_eq!(gcs.source_uri, "gs://b/a.pdf");

        let drive = parse_file(&json!({
            "name": "c/ragFiles/2",
            "googleDriveSource": {"resourceIds": [{"resourceId": "XYZ"}]}
        }))
        .unwrap();
        assert_eq!(drive.source_uri, "https://drive.google.com/file/d/XYZ/view");
        assert_eq!(drive.display_name, "");
    }

    #[test]
    fn parses_retrieved_contexts() {
        let response = json!({
            "contexts": {"contexts": [
                {"sourceUri": "gs://b/a.pdf", "sourceDisplayName": "a.pdf", "text": "alpha", "score": 0.12},
                {"text": "beta"}
            ]}
        });
        let contexts = parse_contexts(&response);
        assert_eq!(contexts.len(), 2);
        assert_eq!(contexts[0].score, 0.12);
        assert_eq!(contexts[1].source_uri, "");
        assert!(parse_contexts(&json!({})).is_empty());
    }

    #[test]
    fn import_bodies_split_by_source() {
        let request = ImportRequest {
            paths: vec![
                "gs://b/a.pdf".into(),
                "https://drive.google.com/file/d/XYZ/view".into(),
            ],
            chunking: ChunkingConfig {
                chunk_size: 512,
                chunk_overlap: 100,
            },
            max_embedding_requests_per_minute: 1000,
        };
        let bodies = import_bodies(&request);
        assert_eq!(bodies.len(), 2);
        assert_eq!(
            bodies[0].pointer("/importRagFilesConfig/gcsSource/uris/0"),
            Some(&json!("gs://b/a.pdf"))
        );
        assert_eq!(
            bodies[1].pointer("/importRagFilesConfig/googleDriveSource/resourceIds/0/resourceId"),
            Some(&json!("XYZ"))
        );
        assert_eq!(
            bodies[0].pointer(
                "/importRagFilesConfig/ragFileTransformationConfig/ragFileChunkingConfig/fixedLengthChunking/chunkSize"
            ),
            Some(&json!(512))
        );
    }

    #[test]
    fn operation_errors_surface() {
        let failed = json!({"done": true, "error": {"code": 3, "message": "bad uri"}});
        assert!(matches!(operation_result(failed), Err(CorpusError::Request(m)) if m == "bad uri"));
        let ok = json!({"done": true, "response": {"importedRagFilesCount": "4"}});
        let response = operation_result(ok).unwrap();
        assert_eq!(json_u64(response.get("importedRagFilesCount")), Some(4));
    }
}
