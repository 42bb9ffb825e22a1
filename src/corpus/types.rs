//! Records exchanged with the corpus backend.

use serde::{Deserialize, Serialize};

/// A retrieval corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusInfo {
    /// Full resource name, `projects/*/locations/*/ragCorpora/*`.
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub create_time: Option<String>,
    #[serde(default)]
    pub update_time: Option<String>,
}

/// A file imported into a corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusFile {
    /// Full resource name, `.../ragCorpora/*/ragFiles/*`.
    pub name: String,
    pub display_name: String,
    pub source_uri: String,
    #[serde(default)]
    pub create_time: Option<String>,
    #[serde(default)]
    pub update_time: Option<String>,
}

impl CorpusFile {
    /// Last segment of the resource name.
    pub fn file_id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

/// One retrieved chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedContext {
    pub source_uri: String,
    pub source_display_name: String,
    pub text: String,
    /// Vector distance; lower is closer.
    pub score: f64,
}

/// Chunking applied when files are imported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: u32,
    pub chunk_overlap: u32,
}

/// Import request parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRequest {
    pub paths: Vec<String>,
    pub chunking: ChunkingConfig,
    pub max_embedding_requests_per_minute: u32,
}

/// Retrieval request parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalRequest {
    pub query: String,
    pub top_k: u32,
    pub distance_threshold: f64,
}
