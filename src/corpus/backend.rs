//! The managed retrieval backend contract.

use async_trait::async_trait;

use crate::corpus::types::{CorpusFile, CorpusInfo, ImportRequest, RetrievalRequest, RetrievedContext};
use crate::error::CorpusError;

/// Corpus CRUD and retrieval on a managed vector-search service.
///
/// All corpus and file arguments are full resource names.
#[async_trait]
pub trait CorpusBackend: Send + Sync {
    async fn list_corpora(&self) -> Result<Vec<CorpusInfo>, CorpusError>;

    async fn create_corpus(
        &self,
        display_name: &str,
        embedding_model: &str,
    ) -> Result<CorpusInfo, CorpusError>;

    /// Returns the number of files imported.
    async fn import_files(&self, corpus: &str, request: &ImportRequest) -> Result<u64, CorpusError>;

    async fn retrieve(
        &self,
        corpus: &str,
        request: &RetrievalRequest,
    ) -> Result<Vec<RetrievedContext>, CorpusError>;

    async fn list_files(&self, corpus: &str) -> Result<Vec<CorpusFile>, CorpusError>;

    async fn delete_file(&self, file: &str) -> Result<(), CorpusError>;

    async fn delete_corpus(&self, corpus: &str) -> Result<(), CorpusError>;
}
