//! Poll loop: Polling → (Dispatching) → Idling → Polling, forever, until
//! cancelled.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::PollerConfig;
use crate::error::ConfigError;
use crate::mail::MailSearch;
use crate::pipeline::{DispatchReport, Dispatcher};
use crate::poller::cycle::{has_new_work, poll_cycle};
use crate::poller::state::PollState;

/// Where the loop is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Polling,
    Dispatching,
    Idling,
}

/// What one cycle did.
#[derive(Debug)]
pub enum CycleOutcome {
    /// Nothing new; the dispatcher was not called.
    Idle,
    /// The search failed; state was not advanced.
    SearchFailed,
    /// A batch was handed off. `report` is `None` when the dispatcher failed.
    Dispatched {
        count: usize,
        report: Option<DispatchReport>,
    },
}

/// Poll loop for one mailbox. Owns its state and collaborators.
pub struct PollLoop {
    config: PollerConfig,
    state: PollState,
    search: Arc<dyn MailSearch>,
    dispatcher: Arc<dyn Dispatcher>,
    loop_state: LoopState,
}

impl PollLoop {
    /// Refuses a config the loop cannot run safely, such as a blank
    /// operator address.
    pub fn new(
        config: PollerConfig,
        search: Arc<dyn MailSearch>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let state = PollState::new(config.self_address.clone(), config.seen_retention)?;
        Ok(Self {
            config,
            state,
            search,
            dispatcher,
            loop_state: LoopState::Polling,
        })
    }

    pub fn state(&self) -> &PollState {
        &self.state
    }

    pub fn loop_state(&self) -> LoopState {
        self.loop_state
    }

    /// Run one Polling → (Dispatching) → Idling step, without the delay.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.loop_state = LoopState::Polling;
        debug!("Checking mail");

        let batch = match poll_cycle(&mut self.state, self.search.as_ref(), &self.config.recency)
            .await
        {
            Ok(batch) => batch,
            Err(e) => {
                error!(error = %e, "Mail search failed, retrying next cycle");
                self.loop_state = LoopState::Idling;
                return CycleOutcome::SearchFailed;
            }
        };

        let evicted = self.state.prune(Instant::now());
        if evicted > 0 {
            debug!(evicted, remaining = self.state.seen().len(), "Pruned seen ids");
        }

        if !has_new_work(&batch) {
            debug!("No new emails");
            self.loop_state = LoopState::Idling;
            return CycleOutcome::Idle;
        }

        self.loop_state = LoopState::Dispatching;
        let count = batch.len();
        info!(count, "New emails found, dispatching");

        let report = match self.dispatcher.dispatch(&batch).await {
            Ok(report) => {
                if report.is_complete() {
                    info!(
                        examined = report.examined.len(),
                        action_required = report.action_required.len(),
                        drafts = report.drafts.len(),
                        "Dispatch complete"
                    );
                } else {
                    warn!(
                        examined = report.examined.len(),
                        action_required = report.action_required.len(),
                        drafts = report.drafts.len(),
                        failures = report.failures.len(),
                        "Dispatch partially complete"
                    );
                    for failure in &report.failures {
                        warn!(id = %failure.email_id, reason = %failure.reason, "Draft not produced");
                    }
                }
                Some(report)
            }
            Err(e) => {
                error!(error = %e, count, "Dispatch failed");
                None
            }
        };

        self.loop_state = LoopState::Idling;
        CycleOutcome::Dispatched { count, report }
    }

    /// Run until `shutdown` becomes true or its sender is dropped.
    ///
    /// The signal is checked at the top of each cycle and raced against the
    /// idle delay. An in-flight dispatch is not interrupted.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.poll_interval.as_secs(),
            filter = %self.config.recency.query(),
            "Mail poller started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.run_cycle().await;

            debug!(secs = self.config.poll_interval.as_secs(), "Waiting for next run");
            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                // Err means the sender is gone; either way the loop stops.
                _ = shutdown.wait_for(|stop| *stop) => break,
            }
        }

        info!("Mail poller shutting down");
    }
}

/// Spawn a poll loop on its own task.
///
/// Returns the task handle and the shutdown sender. Send `true` (or drop the
/// sender) to stop the loop.
pub fn spawn_poller(poll_loop: PollLoop) -> (JoinHandle<()>, watch::Sender<bool>) {
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(poll_loop.run(rx));
    (handle, tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::error::{MailError, PipelineError};
    use crate::mail::{MailMessage, RecencyFilter};
    use crate::pipeline::DispatchFailure;

    struct FixedSearch {
        messages: Vec<MailMessage>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl FixedSearch {
        fn new(messages: Vec<MailMessage>) -> Self {
            Self {
                messages,
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(Vec::new())
            }
        }
    }

    #[async_trait]
    impl MailSearch for FixedSearch {
        async fn search(&self, _filter: &RecencyFilter) -> Result<Vec<MailMessage>, MailError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(MailError::AuthFailed {
                    username: "me".into(),
                });
            }
            Ok(self.messages.clone())
        }
    }

    #[derive(Default)]
    struct RecordingDispatcher {
        batches: Mutex<Vec<Vec<String>>>,
        fail: bool,
        partial: bool,
    }

    #[async_trait]
    impl Dispatcher for RecordingDispatcher {
        async fn dispatch(&self, batch: &[MailMessage]) -> Result<DispatchReport, PipelineError> {
            self.batches
                .lock()
                .unwrap()
                .push(batch.iter().map(|m| m.id.clone()).collect());
            if self.fail {
                return Err(PipelineError::Filter("llm down".into()));
            }
            let mut report = DispatchReport {
                examined: batch.iter().map(|m| m.id.clone()).collect(),
                ..Default::default()
            };
            if self.partial {
                report.action_required = report.examined.clone();
                report.failures.push(DispatchFailure {
                    email_id: batch[0].id.clone(),
                    reason: "thread fetch failed".into(),
                });
            }
            Ok(report)
        }
    }

    fn config() -> PollerConfig {
        let mut config = PollerConfig::new("me@me.com").unwrap();
        config.poll_interval = Duration::from_secs(180);
        config
    }

    fn msg(id: &str, thread: &str, sender: &str) -> MailMessage {
        MailMessage::new(id, thread, "hi", sender)
    }

    #[tokio::test]
    async fn empty_batch_idles_without_dispatch() {
        let search = Arc::new(FixedSearch::new(vec![msg("3", "B", "me@me.com")]));
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let mut poll_loop = PollLoop::new(config(), search, dispatcher.clone()).unwrap();

        assert_eq!(poll_loop.loop_state(), LoopState::Polling);
        let outcome = poll_loop.run_cycle().await;

        assert!(matches!(outcome, CycleOutcome::Idle));
        assert_eq!(poll_loop.loop_state(), LoopState::Idling);
        assert!(dispatcher.batches.lock().unwrap().is_empty());
        assert!(poll_loop.state().is_seen("3"));
    }

    #[tokio::test]
    async fn new_mail_is_dispatched_once() {
        let search = Arc::new(FixedSearch::new(vec![
            msg("1", "A", "x@y.com"),
            msg("2", "A", "z@y.com"),
        ]));
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let mut poll_loop = PollLoop::new(config(), search, dispatcher.clone()).unwrap();

        let first = poll_loop.run_cycle().await;
        let second = poll_loop.run_cycle().await;

        assert!(matches!(first, CycleOutcome::Dispatched { count: 1, .. }));
        assert!(matches!(second, CycleOutcome::Idle));
        assert_eq!(*dispatcher.batches.lock().unwrap(), vec![vec!["1".to_string()]]);
    }

    #[tokio::test]
    async fn dispatcher_failure_still_idles_and_keeps_ids_seen() {
        let search = Arc::new(FixedSearch::new(vec![msg("1", "A", "x@y.com")]));
        let dispatcher = Arc::new(RecordingDispatcher {
            fail: true,
            ..Default::default()
        });
        let mut poll_loop = PollLoop::new(config(), search, dispatcher.clone()).unwrap();

        let outcome = poll_loop.run_cycle().await;
        assert!(matches!(outcome, CycleOutcome::Dispatched { report: None, .. }));
        assert_eq!(poll_loop.loop_state(), LoopState::Idling);
        assert!(poll_loop.state().is_seen("1"));

        // Not retried: the id is already seen.
        assert!(matches!(poll_loop.run_cycle().await, CycleOutcome::Idle));
    }

    #[tokio::test]
    async fn partial_report_is_returned_as_is() {
        let search = Arc::new(FixedSearch::new(vec![msg("1", "A", "x@y.com")]));
        let dispatcher = Arc::new(RecordingDispatcher {
            partial: true,
            ..Default::default()
        });
        let mut poll_loop = PollLoop::new(config(), search, dispatcher).unwrap();

        match poll_loop.run_cycle().await {
            CycleOutcome::Dispatched {
                report: Some(report),
                ..
            } => {
                assert!(!report.is_complete());
                assert_eq!(report.failures.len(), 1);
            }
            other => panic!("Expected dispatched report, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn search_failure_idles_without_touching_state() {
        let search = Arc::new(FixedSearch::failing());
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let mut poll_loop = PollLoop::new(config(), search, dispatcher.clone()).unwrap();

        let outcome = poll_loop.run_cycle().await;
        assert!(matches!(outcome, CycleOutcome::SearchFailed));
        assert_eq!(poll_loop.loop_state(), LoopState::Idling);
        assert!(poll_loop.state().seen().is_empty());
        assert!(dispatcher.batches.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn polls_again_after_interval() {
        let search = Arc::new(FixedSearch::new(Vec::new()));
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let poll_loop = PollLoop::new(config(), search.clone(), dispatcher).unwrap();

        let (handle, shutdown) = spawn_poller(poll_loop);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(search.calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(180)).await;
        assert_eq!(search.calls.load(Ordering::SeqCst), 2);

        shutdown.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_idle_wait() {
        let search = Arc::new(FixedSearch::new(Vec::new()));
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let poll_loop = PollLoop::new(config(), search.clone(), dispatcher).unwrap();

        let (handle, shutdown) = spawn_poller(poll_loop);
        tokio::time::sleep(Duration::from_secs(1)).await;

        let started = tokio::time::Instant::now();
        shutdown.send(true).unwrap();
        handle.await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(180));
        assert_eq!(search.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_sender_stops_loop() {
        let search = Arc::new(FixedSearch::new(Vec::new()));
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let poll_loop = PollLoop::new(config(), search, dispatcher).unwrap();

        let (handle, shutdown) = spawn_poller(poll_loop);
        tokio::time::sleep(Duration::from_secs(1)).await;
        drop(shutdown);

        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn false_on_shutdown_channel_keeps_idle_delay() {
        let search = Arc::new(FixedSearch::new(Vec::new()));
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let poll_loop = PollLoop::new(config(), search.clone(), dispatcher).unwrap();

        let (handle, shutdown) = spawn_poller(poll_loop);
        tokio::time::sleep(Duration::from_secs(1)).await;
        shutdown.send(false).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(search.calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(180)).await;
        assert_eq!(search.calls.load(Ordering::SeqCst), 2);

        shutdown.send(true).unwrap();
        handle.await.unwrap();
    }

    #[test]
    fn blank_self_address_refuses_to_start() {
        let search = Arc::new(FixedSearch::new(vec![msg("1", "A", "x@y.com")]));
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let mut config = config();
        config.self_address = "  ".to_string();

        let err = PollLoop::new(config, search, dispatcher).err();
        assert!(matches!(err, Some(ConfigError::InvalidValue { .. })));
    }

    #[tokio::test]
    async fn shutdown_before_start_skips_polling() {
        let search = Arc::new(FixedSearch::new(Vec::new()));
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let poll_loop = PollLoop::new(config(), search.clone(), dispatcher).unwrap();

        let (tx, rx) = watch::channel(true);
        poll_loop.run(rx).await;
        drop(tx);

        assert_eq!(search.calls.load(Ordering::SeqCst), 0);
    }
}
