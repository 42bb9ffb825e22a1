//! In-memory `CorpusBackend` for tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::corpus::backend::CorpusBackend;
use crate::corpus::types::{CorpusFile, CorpusInfo, ImportRequest, RetrievalRequest, RetrievedContext};
use crate::error::CorpusError;

const PARENT: &str = "projects/proj/locations/us-central1";

#[derive(Default)]
pub struct MemoryBackend {
    corpora: Mutex<BTreeMap<String, (CorpusInfo, Vec<CorpusFile>)>>,
    pub retrieval: Mutex<Vec<RetrievedContext>>,
    pub imports: Mutex<Vec<(String, ImportRequest)>>,
    pub queries: Mutex<Vec<(String, RetrievalRequest)>>,
    pub fail_all: bool,
    next_id: Mutex<u32>,
}

impl MemoryBackend {
    pub fn failing() -> Self {
        Self {
            fail_all: true,
            ..Default::default()
        }
    }

    pub async fn seed(&self, display_name: &str, files: &[&str]) -> String {
        let info = self.insert(display_name).await;
        let mut corpora = self.corpora.lock().await;
        if let Some((_, list)) = corpora.get_mut(&info.name) {
            for (i, uri) in files.iter().enumerate() {
                list.push(CorpusFile {
                    name: format!("{}/ragFiles/f{}", info.name, i + 1),
                    display_name: uri.rsplit('/').next().unwrap_or(uri).to_string(),
                    source_uri: uri.to_string(),
                    create_time: None,
                    update_time: None,
                });
            }
        }
        info.name
    }

    pub async fn corpus_names(&self) -> Vec<String> {
        self.corpora.lock().await.keys().cloned().collect()
    }

    pub async fn list_files_len(&self, corpus: &str) -> usize {
        self.corpora
            .lock()
            .await
            .get(corpus)
            .map_or(0, |(_, files)| files.len())
    }

    async fn insert(&self, display_name: &str) -> CorpusInfo {
        let mut next = self.next_id.lock().await;
        *next += 1;
        let info = CorpusInfo {
            name: format!("{PARENT}/ragCorpora/{}", *next),
            display_name: display_name.to_string(),
            create_time: Some("2025-06-01T00:00:00Z".to_string()),
            update_time: None,
        };
        self.corpora
            .lock()
            .await
            .insert(info.name.clone(), (info.clone(), Vec::new()));
        info
    }

    fn check(&self) -> Result<(), CorpusError> {
        if self.fail_all {
            return Err(CorpusError::Status {
                status: 503,
                body: "backend unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CorpusBackend for MemoryBackend {
    async fn list_corpora(&self) -> Result<Vec<CorpusInfo>, CorpusError> {
        self.check()?;
        Ok(self
            .corpora
            .lock()
            .await
            .values()
            .map(|(info, _)| info.clone())
            .collect())
    }

    async fn create_corpus(
        &self,
        display_name: &str,
        _embedding_model: &str,
    ) -> Result<CorpusInfo, CorpusError> {
        self.check()?;
        Ok(self.insert(display_name).await)
    }

    async fn import_files(&self, corpus: &str, request: &ImportRequest) -> Result<u64, CorpusError> {
        self.check()?;
        let mut corpora = self.corpora.lock().await;
        let (_, files) = corpora
            .get_mut(corpus)
            .ok_or_else(|| CorpusError::NotFound(corpus.to_string()))?;
        for uri in &request.paths {
            let n = files.len() + 1;
            files.push(CorpusFile {
                name: format!("{corpus}/ragFiles/f{n}"),
                display_name: uri.clone(),
                source_uri: uri.clone(),
                create_time: None,
                update_time: None,
            });
        }
        self.imports
            .lock()
            .await
            .push((corpus.to_string(), request.clone()));
        Ok(request.paths.len() as u64)
    }

    async fn retrieve(
        &self,
        corpus: &str,
        request: &RetrievalRequest,
    ) -> Result<Vec<RetrievedContext>, CorpusError> {
        self.check()?;
        self.queries
            .lock()
            .await
            .push((corpus.to_string(), request.clone()));
        Ok(self.retrieval.lock().await.clone())
    }

    async fn list_files(&self, corpus: &str) -> Result<Vec<CorpusFile>, CorpusError> {
        self.check()?;
        self.corpora
            .lock()
            .await
            .get(corpus)
            .map(|(_, files)| files.clone())
            .ok_or_else(|| CorpusError::NotFound(corpus.to_string()))
    }

    async fn delete_file(&self, file: &str) -> Result<(), CorpusError> {
        self.check()?;
        let mut corpora = self.corpora.lock().await;
        for (_, files) in corpora.values_mut() {
            if let Some(pos) = files.iter().position(|f| f.name == file) {
                files.remove(pos);
                return Ok(());
            }
        }
        Err(CorpusError::NotFound(file.to_string()))
    }

    async fn delete_corpus(&self, corpus: &str) -> Result<(), CorpusError> {
        self.check()?;
        self.corpora
            .lock()
            .await
            .remove(corpus)
            .map(|_| ())
            .ok_or_else(|| CorpusError::NotFound(corpus.to_string()))
    }
}
