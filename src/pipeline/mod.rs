//! Drafting pipeline.
//!
//! A batch of new mail flows through:
//! 1. `RulesEngine::evaluate()`: fast pattern matching, no LLM
//! 2. Filter agent: picks the emails that need a reply
//! 3. Action agent: reads each full thread
//! 4. Writer agent: drafts the reply and stores it in the drafts folder
//!
//! **No send path exists.** Replies are only ever stored as drafts.

pub mod crew;
pub mod prompts;
pub mod rules;
pub mod types;

pub use crew::{EmailCrew, extract_json, parse_draft_input};
pub use rules::RulesEngine;
pub use types::{DispatchFailure, DispatchReport, Dispatcher, DraftOutcome, IgnoredEmail};
