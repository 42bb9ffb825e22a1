//! Collaborator contracts consumed by the poller and the drafting crew.

use async_trait::async_trait;

use crate::error::MailError;
use crate::mail::types::{DraftRequest, EmailMessage, MailMessage, RecencyFilter};

/// Recent-mail search.
///
/// Transport and auth failures must come back as `Err`, never as an
/// empty list: the poller treats the two very differently.
#[async_trait]
pub trait MailSearch: Send + Sync {
    /// Return messages matching the filter, in provider order.
    async fn search(&self, filter: &RecencyFilter) -> Result<Vec<MailMessage>, MailError>;
}

/// Full-thread retrieval for drafting.
#[async_trait]
pub trait ThreadFetcher: Send + Sync {
    /// Return every message in the thread, oldest first.
    async fn fetch_thread(&self, thread_id: &str) -> Result<Vec<EmailMessage>, MailError>;
}

/// Draft storage. Drafts are never sent by this crate.
#[async_trait]
pub trait DraftStore: Send + Sync {
    /// Store a draft and return its identifier.
    async fn create_draft(&self, draft: &DraftRequest) -> Result<String, MailError>;
}
