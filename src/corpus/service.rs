//! Name resolution and existence checks shared by the corpus tools.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::context::ToolContext;
use crate::corpus::backend::CorpusBackend;
use crate::corpus::names::{corpus_resource_name, is_resource_name};
use crate::corpus::settings::CorpusSettings;
use crate::corpus::types::{ChunkingConfig, ImportRequest, RetrievalRequest};

pub struct CorpusService {
    backend: Arc<dyn CorpusBackend>,
    settings: CorpusSettings,
}

impl CorpusService {
    pub fn new(backend: Arc<dyn CorpusBackend>, settings: CorpusSettings) -> Self {
        Self { backend, settings }
    }

    pub fn backend(&self) -> &dyn CorpusBackend {
        self.backend.as_ref()
    }

    pub fn settings(&self) -> &CorpusSettings {
        &self.settings
    }

    /// Full resource name for `name`, consulting the backend's display names.
    pub async fn resource_name(&self, name: &str) -> String {
        if is_resource_name(name) {
            return name.to_string();
        }
        let known = match self.backend.list_corpora().await {
            Ok(corpora) => corpora,
            Err(e) => {
                warn!(corpus = %name, error = %e, "Could not list corpora, resolving name locally");
                Vec::new()
            }
        };
        corpus_resource_name(name, &self.settings, &known)
    }

    /// Does `name` exist? Cached positives short-circuit the backend.
    ///
    /// A positive backend check is cached in the session and makes the
    /// corpus current if none is set. Backend errors count as "does not
    /// exist".
    pub async fn check_corpus_exists(&self, name: &str, ctx: &ToolContext) -> bool {
        if ctx.corpus_known(name).await {
            return true;
        }

        let corpora = match self.backend.list_corpora().await {
            Ok(corpora) => corpora,
            Err(e) => {
                warn!(corpus = %name, error = %e, "Error checking if corpus exists");
                return false;
            }
        };
        let resource = corpus_resource_name(name, &self.settings, &corpora);
        let found = corpora
            .iter()
            .any(|c| c.name == resource || c.display_name == name);
        if found {
            debug!(corpus = %name, resource = %resource, "Corpus exists");
            ctx.mark_corpus(name, true).await;
            ctx.set_current_corpus_if_unset(name).await;
        }
        found
    }

    /// Make `name` the current corpus if it exists.
    pub async fn set_current_corpus(&self, name: &str, ctx: &ToolContext) -> bool {
        if self.check_corpus_exists(name, ctx).await {
            ctx.set_current_corpus(name).await;
            return true;
        }
        false
    }

    /// An explicit name, or the session's current corpus when blank.
    pub async fn effective_name(&self, name: &str, ctx: &ToolContext) -> Option<String> {
        let name = name.trim();
        if name.is_empty() {
            ctx.current_corpus().await
        } else {
            Some(name.to_string())
        }
    }

    pub fn import_request(&self, paths: Vec<String>) -> ImportRequest {
        ImportRequest {
            paths,
            chunking: ChunkingConfig {
                chunk_size: self.settings.chunk_size,
                chunk_overlap: self.settings.chunk_overlap,
            },
            max_embedding_requests_per_minute: self.settings.embedding_requests_per_minute,
        }
    }

    pub fn retrieval_request(&self, query: &str) -> RetrievalRequest {
        RetrievalRequest {
            query: query.to_string(),
            top_k: self.settings.top_k,
            distance_threshold: self.settings.distance_threshold,
        }
    }
}
