//! Poll state: the seen-id cache and the current batch.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::error::ConfigError;
use crate::mail::MailMessage;

/// Membership cache of message ids with last-sighting times.
///
/// Ids are evicted once they have not been returned by a search for longer
/// than `retention`. Retention is never shorter than the search window, so
/// an evicted id is one the search no longer returns.
#[derive(Debug, Clone)]
pub struct SeenCache {
    entries: HashMap<String, Instant>,
    retention: Duration,
}

impl SeenCache {
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            retention,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Record a sighting. Re-sighting refreshes the timestamp.
    pub fn mark(&mut self, id: &str, now: Instant) {
        self.entries.insert(id.to_string(), now);
    }

    /// Drop ids last sighted more than `retention` before `now`.
    /// Returns the number evicted.
    pub fn prune(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let retention = self.retention;
        self.entries
            .retain(|_, seen_at| now.saturating_duration_since(*seen_at) <= retention);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }
}

/// State owned by one mailbox's poll loop.
///
/// Created empty at startup, lives for the whole run, never persisted.
#[derive(Debug, Clone)]
pub struct PollState {
    pub(crate) seen: SeenCache,
    pub(crate) pending_batch: Vec<MailMessage>,
    self_address: String,
}

impl PollState {
    /// Fails on a blank operator address, which would match every sender.
    pub fn new(self_address: impl Into<String>, retention: Duration) -> Result<Self, ConfigError> {
        let self_address = self_address.into().trim().to_string();
        if self_address.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "MY_EMAIL".to_string(),
                message: "operator address must not be blank".to_string(),
            });
        }
        Ok(Self {
            seen: SeenCache::new(retention),
            pending_batch: Vec::new(),
            self_address,
        })
    }

    pub fn self_address(&self) -> &str {
        &self.self_address
    }

    pub fn seen(&self) -> &SeenCache {
        &self.seen
    }

    pub fn is_seen(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Messages selected by the most recent successful cycle.
    pub fn pending_batch(&self) -> &[MailMessage] {
        &self.pending_batch
    }

    /// Evict stale seen ids. Returns the number evicted.
    pub fn prune(&mut self, now: Instant) -> usize {
        self.seen.prune(now)
    }
}
