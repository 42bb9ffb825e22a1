//! Mailbox poller. Fetches recent mail, drops what was already seen or
//! self-sent, and hands new threads to the drafting pipeline.
//!
//! One `PollLoop` per mailbox. Loops never share a `PollState`.

pub mod cycle;
pub mod runner;
pub mod state;

pub use cycle::{has_new_work, poll_cycle, select_new};
pub use runner::{CycleOutcome, LoopState, PollLoop, spawn_poller};
pub use state::{PollState, SeenCache};
