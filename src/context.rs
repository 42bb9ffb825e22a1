//! Per-session state shared by tool calls.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

const CURRENT_CORPUS_KEY: &str = "current_corpus";

/// Mutable key/value session state plus the handful of typed accessors the
/// corpus tools need.
#[derive(Debug)]
pub struct ToolContext {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    state: RwLock<HashMap<String, serde_json::Value>>,
}

impl Default for ToolContext {
    fn default() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            created_at: Utc::now(),
            state: RwLock::new(HashMap::new()),
        }
    }
}

impl ToolContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.state.read().await.get(key).cloned()
    }

    pub async fn set(&self, key: impl Into<String>, value: serde_json::Value) {
        self.state.write().await.insert(key.into(), value);
    }

    pub async fn remove(&self, key: &str) -> Option<serde_json::Value> {
        self.state.write().await.remove(key)
    }

    pub async fn current_corpus(&self) -> Option<String> {
        self.get(CURRENT_CORPUS_KEY)
            .await
            .and_then(|v| v.as_str().map(str::to_string))
            .filter(|s| !s.is_empty())
    }

    pub async fn set_current_corpus(&self, corpus: &str) {
        self.set(CURRENT_CORPUS_KEY, serde_json::json!(corpus)).await;
    }

    /// Set the current corpus only when none is set yet.
    pub async fn set_current_corpus_if_unset(&self, corpus: &str) {
        let mut state = self.state.write().await;
        let unset = state
            .get(CURRENT_CORPUS_KEY)
            .and_then(|v| v.as_str())
            .is_none_or(str::is_empty);
        if unset {
            state.insert(CURRENT_CORPUS_KEY.to_string(), serde_json::json!(corpus));
        }
    }

    /// Forget the current corpus if it is `corpus`.
    pub async fn clear_current_corpus(&self, corpus: &str) {
        let mut state = self.state.write().await;
        if state.get(CURRENT_CORPUS_KEY).and_then(|v| v.as_str()) == Some(corpus) {
            state.remove(CURRENT_CORPUS_KEY);
        }
    }

    pub async fn corpus_known(&self, corpus: &str) -> bool {
        self.get(&exists_key(corpus))
            .await
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub async fn mark_corpus(&self, corpus: &str, exists: bool) {
        self.set(exists_key(corpus), serde_json::json!(exists)).await;
    }
}

fn exists_key(corpus: &str) -> String {
    format!("corpus_exists_{corpus}")
}
