//! Corpus backend settings.

use crate::error::ConfigError;

pub const DEFAULT_EMBEDDING_MODEL: &str = "publishers/google/models/text-embedding-005";
pub const DEFAULT_CHUNK_SIZE: u32 = 512;
pub const DEFAULT_CHUNK_OVERLAP: u32 = 100;
pub const DEFAULT_TOP_K: u32 = 3;
pub const DEFAULT_DISTANCE_THRESHOLD: f64 = 0.5;
pub const DEFAULT_EMBEDDING_REQUESTS_PER_MINUTE: u32 = 1000;
pub const DEFAULT_LOCATION: &str = "us-central1";

/// Embedding, chunking and retrieval parameters plus the project location.
#[derive(Debug, Clone, PartialEq)]
pub struct CorpusSettings {
    /// Publisher model path used for new corpora.
    pub embedding_model: String,
    pub chunk_size: u32,
    pub chunk_overlap: u32,
    pub top_k: u32,
    /// Contexts farther than this are dropped at retrieval.
    pub distance_threshold: f64,
    pub embedding_requests_per_minute: u32,
    pub project_id: String,
    pub location: String,
}

impl CorpusSettings {
    /// Defaults for the given project.
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            top_k: DEFAULT_TOP_K,
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
            embedding_requests_per_minute: DEFAULT_EMBEDDING_REQUESTS_PER_MINUTE,
            project_id: project_id.into(),
            location: DEFAULT_LOCATION.to_string(),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// `GOOGLE_CLOUD_PROJECT` (or `GCP_PROJECT`) is required,
    /// `GOOGLE_CLOUD_LOCATION` is optional.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let project_id = non_empty("GOOGLE_CLOUD_PROJECT")
            .or_else(|| non_empty("GCP_PROJECT"))
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "GOOGLE_CLOUD_PROJECT".to_string(),
                hint: "Set GOOGLE_CLOUD_PROJECT (or GCP_PROJECT) to the project that owns the corpora."
                    .to_string(),
            })?;

        let mut settings = Self::new(project_id);
        if let Some(location) = non_empty("GOOGLE_CLOUD_LOCATION") {
            settings.location = location;
        }
        Ok(settings)
    }

    /// `projects/{project}/locations/{location}`
    pub fn parent(&self) -> String {
        format!("projects/{}/locations/{}", self.project_id, self.location)
    }
}
