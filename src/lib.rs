//! Autodraft: polls a mailbox, drafts replies for review, and manages
//! retrieval corpora.

pub mod config;
pub mod context;
pub mod corpus;
pub mod error;
pub mod llm;
pub mod mail;
pub mod pipeline;
pub mod poller;
pub mod tools;
