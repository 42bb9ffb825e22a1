//! Mailbox access: message types, collaborator traits, and the IMAP client.

pub mod imap;
pub mod traits;
pub mod types;

pub use imap::{ImapConfig, ImapMailbox};
pub use traits::{DraftStore, MailSearch, ThreadFetcher};
pub use types::{DraftRequest, EmailMessage, MailMessage, RecencyFilter};
