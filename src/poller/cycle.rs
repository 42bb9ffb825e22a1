//! One poll cycle: search, filter, mark seen.

use std::collections::HashSet;
use std::time::Instant;

use tracing::debug;

use crate::error::MailError;
use crate::mail::{MailMessage, MailSearch, RecencyFilter};
use crate::poller::state::PollState;

/// Run one cycle against the mail search.
///
/// Admits a candidate only if its id is unseen, its thread has not been
/// admitted earlier in this cycle, and the operator address is not a
/// substring of its sender. Every candidate id is marked seen afterwards,
/// admitted or not.
///
/// On search failure the error is returned and `state` is left untouched.
pub async fn poll_cycle(
    state: &mut PollState,
    search: &dyn MailSearch,
    filter: &RecencyFilter,
) -> Result<Vec<MailMessage>, MailError> {
    let candidates = search.search(filter).await?;
    Ok(select_new(state, candidates, Instant::now()))
}

/// Filter a candidate set and advance the state. Pure apart from `state`.
pub fn select_new(
    state: &mut PollState,
    candidates: Vec<MailMessage>,
    now: Instant,
) -> Vec<MailMessage> {
    let mut threads: HashSet<&str> = HashSet::new();
    let mut batch = Vec::new();

    for message in &candidates {
        if state.seen.contains(&message.id) {
            continue;
        }
        if threads.contains(message.thread_id.as_str()) {
            debug!(id = %message.id, thread = %message.thread_id, "Thread already admitted this cycle");
            continue;
        }
        if message.sender.contains(state.self_address()) {
            debug!(id = %message.id, "Skipping self-sent message");
            continue;
        }
        threads.insert(message.thread_id.as_str());
        batch.push(message.clone());
    }

    for message in &candidates {
        state.seen.mark(&message.id, now);
    }

    state.pending_batch = batch.clone();
    batch
}

/// True iff the batch has anything to hand off.
pub fn has_new_work(batch: &[MailMessage]) -> bool {
    !batch.is_empty()
}
