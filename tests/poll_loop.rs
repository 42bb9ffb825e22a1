//! Poll loop behavior over scripted mail and a scripted drafting crew.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use autodraft::config::PollerConfig;
use autodraft::error::{LlmError, MailError, PipelineError};
use autodraft::llm::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider};
use autodraft::mail::{
    DraftRequest, DraftStore, EmailMessage, MailMessage, MailSearch, RecencyFilter, ThreadFetcher,
};
use autodraft::pipeline::{DispatchReport, Dispatcher, EmailCrew, RulesEngine};
use autodraft::poller::{CycleOutcome, LoopState, PollLoop, PollState, poll_cycle, select_new, spawn_poller};

const ME: &str = "me@me.com";

fn msg(id: &str, thread: &str, sender: &str) -> MailMessage {
    MailMessage::new(id, thread, "hello", sender)
}

fn config() -> PollerConfig {
    PollerConfig::new(ME).unwrap()
}

fn state() -> PollState {
    PollState::new(ME, Duration::from_secs(2 * 86_400)).unwrap()
}

/// Returns one scripted response per call, then empty results.
#[derive(Default)]
struct ScriptedSearch {
    responses: Mutex<VecDeque<Result<Vec<MailMessage>, MailError>>>,
    calls: AtomicUsize,
}

impl ScriptedSearch {
    fn new(responses: Vec<Result<Vec<MailMessage>, MailError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl MailSearch for ScriptedSearch {
    async fn search(&self, _filter: &RecencyFilter) -> Result<Vec<MailMessage>, MailError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses.lock().await.pop_front().unwrap_or(Ok(Vec::new()))
    }
}

#[derive(Default)]
struct RecordingDispatcher {
    batches: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn dispatch(&self, batch: &[MailMessage]) -> Result<DispatchReport, PipelineError> {
        self.batches
            .lock()
            .await
            .push(batch.iter().map(|m| m.id.clone()).collect());
        Ok(DispatchReport {
            examined: batch.iter().map(|m| m.id.clone()).collect(),
            ..Default::default()
        })
    }
}

fn transport_error() -> MailError {
    MailError::Connect {
        host: "imap.example.com".into(),
        port: 993,
        reason: "connection reset".into(),
    }
}

// ── Example scenarios ───────────────────────────────────────────────

#[tokio::test]
async fn same_thread_admits_first_and_marks_both_seen() {
    let mut state = state();
    let search = ScriptedSearch::new(vec![Ok(vec![
        msg("1", "A", "x@y.com"),
        msg("2", "A", "z@y.com"),
    ])]);

    let batch = poll_cycle(&mut state, &search, &RecencyFilter::days(1))
        .await
        .unwrap();

    assert_eq!(batch, vec![msg("1", "A", "x@y.com")]);
    assert!(state.is_seen("1"));
    assert!(state.is_seen("2"));
    assert_eq!(state.seen().len(), 2);
}

#[tokio::test]
async fn self_sent_message_is_seen_but_not_dispatched() {
    let search = Arc::new(ScriptedSearch::new(vec![Ok(vec![msg("3", "B", ME)])]));
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let mut poll_loop = PollLoop::new(config(), search, dispatcher.clone()).unwrap();

    let outcome = poll_loop.run_cycle().await;

    assert!(matches!(outcome, CycleOutcome::Idle));
    assert_eq!(poll_loop.loop_state(), LoopState::Idling);
    assert!(poll_loop.state().is_seen("3"));
    assert!(dispatcher.batches.lock().await.is_empty());
}

#[test]
fn already_seen_message_is_skipped() {
    let mut state = state();
    select_new(&mut state, vec![msg("1", "A", "x@y.com")], Instant::now());

    let batch = select_new(&mut state, vec![msg("1", "A", "x@y.com")], Instant::now());

    assert!(batch.is_empty());
    assert_eq!(state.seen().len(), 1);
}

#[tokio::test]
async fn search_failure_leaves_state_untouched_and_retries_next_cycle() {
    let search = Arc::new(ScriptedSearch::new(vec![
        Ok(vec![msg("1", "A", "x@y.com")]),
        Err(transport_error()),
        Ok(vec![msg("2", "B", "x@y.com")]),
    ]));
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let mut poll_loop = PollLoop::new(config(), search, dispatcher.clone()).unwrap();

    poll_loop.run_cycle().await;
    let before = poll_loop.state().seen().clone();

    let outcome = poll_loop.run_cycle().await;
    assert!(matches!(outcome, CycleOutcome::SearchFailed));
    assert_eq!(poll_loop.loop_state(), LoopState::Idling);
    assert_eq!(poll_loop.state().seen().len(), before.len());
    assert!(!poll_loop.state().is_seen("2"));

    let outcome = poll_loop.run_cycle().await;
    assert!(matches!(outcome, CycleOutcome::Dispatched { count: 1, .. }));
    assert_eq!(
        *dispatcher.batches.lock().await,
        vec![vec!["1".to_string()], vec!["2".to_string()]]
    );
}

// ── Properties over several cycles ──────────────────────────────────

#[tokio::test]
async fn no_id_is_dispatched_twice_across_cycles() {
    let overlapping = vec![
        Ok(vec![msg("1", "A", "x@y.com"), msg("2", "B", "x@y.com")]),
        Ok(vec![msg("3", "C", "x@y.com"), msg("2", "B", "x@y.com"), msg("1", "A", "x@y.com")]),
        Ok(vec![msg("4", "A", "x@y.com"), msg("3", "C", "x@y.com")]),
        Ok(vec![msg("5", "D", "boss <me@me.com>"), msg("6", "D", "x@y.com")]),
    ];
    let search = Arc::new(ScriptedSearch::new(overlapping));
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let mut poll_loop = PollLoop::new(config(), search, dispatcher.clone()).unwrap();

    for _ in 0..5 {
        poll_loop.run_cycle().await;
    }

    let batches = dispatcher.batches.lock().await;
    let mut all: Vec<&String> = batches.iter().flatten().collect();
    let total = all.len();
    all.sort();
    all.dedup();
    assert_eq!(all.len(), total);

    // Thread A reappears with a new id in a later cycle and is admitted then.
    assert_eq!(
        *batches,
        vec![
            vec!["1".to_string(), "2".to_string()],
            vec!["3".to_string()],
            vec!["4".to_string()],
            vec!["6".to_string()],
        ]
    );
}

#[tokio::test]
async fn self_sent_message_claims_its_thread_for_the_cycle() {
    // The self-sent message is skipped before its thread is recorded, so a
    // later message in the same thread is still admitted.
    let mut state = state();
    let batch = select_new(
        &mut state,
        vec![msg("5", "D", "Me <me@me.com>"), msg("6", "D", "x@y.com")],
        Instant::now(),
    );
    assert_eq!(batch, vec![msg("6", "D", "x@y.com")]);
    assert!(state.is_seen("5"));
}

#[tokio::test]
async fn blank_operator_address_never_reaches_a_cycle() {
    assert!(PollerConfig::new("").is_err());
    assert!(PollState::new("", Duration::from_secs(60)).is_err());

    let mut config = config();
    config.self_address.clear();
    let search = Arc::new(ScriptedSearch::new(vec![Ok(vec![msg("1", "A", "x@y.com")])]));
    let dispatcher = Arc::new(RecordingDispatcher::default());

    assert!(PollLoop::new(config, search.clone(), dispatcher).is_err());
    assert_eq!(search.calls.load(Ordering::SeqCst), 0);
}

// ── Cancellation ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn shutdown_during_idle_does_not_wait_out_the_delay() {
    let search = Arc::new(ScriptedSearch::default());
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let poll_loop = PollLoop::new(config(), search.clone(), dispatcher).unwrap();

    let (handle, shutdown) = spawn_poller(poll_loop);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(search.calls.load(Ordering::SeqCst), 1);

    let started = tokio::time::Instant::now();
    shutdown.send(true).unwrap();
    handle.await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(search.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn loop_polls_on_the_configured_interval() {
    let search = Arc::new(ScriptedSearch::default());
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let mut config = config();
    config.poll_interval = Duration::from_secs(60);
    let poll_loop = PollLoop::new(config, search.clone(), dispatcher).unwrap();

    let (handle, shutdown) = spawn_poller(poll_loop);
    tokio::time::sleep(Duration::from_secs(150)).await;
    assert_eq!(search.calls.load(Ordering::SeqCst), 3);

    shutdown.send(true).unwrap();
    handle.await.unwrap();
}

// ── End to end with the drafting crew ───────────────────────────────

struct StageLlm;

#[async_trait]
impl LlmProvider for StageLlm {
    fn model_name(&self) -> &str {
        "stage"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let system = request.system_prompt().unwrap_or_default();
        let content = if system.contains("Senior Email Analyst") {
            r#"{"checked_email_ids": ["10"], "action_required_email": ["10"]}"#
        } else if system.contains("Email Action Specialist") {
            r#"{"thread_id": "T", "summary": "Asks for the deck", "main_points": ["deck"],
                "user": "me", "recipient": "Carol", "communication_style": "friendly",
                "sender_email": "carol@ex.com"}"#
        } else {
            r#"Here you go: {"to": "carol@ex.com", "subject": "Re: Deck", "message": "Attached shortly."}"#
        };
        Ok(CompletionResponse {
            content: content.to_string(),
            input_tokens: 1,
            output_tokens: 1,
            finish_reason: FinishReason::Stop,
        })
    }
}

#[derive(Default)]
struct MemoryMailbox {
    threads: HashMap<String, Vec<EmailMessage>>,
    drafts: Mutex<Vec<DraftRequest>>,
}

#[async_trait]
impl ThreadFetcher for MemoryMailbox {
    async fn fetch_thread(&self, thread_id: &str) -> Result<Vec<EmailMessage>, MailError> {
        self.threads
            .get(thread_id)
            .cloned()
            .ok_or_else(|| MailError::ThreadNotFound {
                thread_id: thread_id.to_string(),
            })
    }
}

#[async_trait]
impl DraftStore for MemoryMailbox {
    async fn create_draft(&self, draft: &DraftRequest) -> Result<String, MailError> {
        let mut drafts = self.drafts.lock().await;
        drafts.push(draft.clone());
        Ok(format!("d{}", drafts.len()))
    }
}

#[tokio::test]
async fn new_mail_becomes_a_stored_draft() {
    let mut mailbox = MemoryMailbox::default();
    mailbox.threads.insert(
        "T".into(),
        vec![EmailMessage {
            from: "carol@ex.com".into(),
            to: vec![ME.into()],
            cc: vec![],
            subject: "Deck".into(),
            message_id: "<deck@ex.com>".into(),
            content: "Could you share the deck?".into(),
            timestamp: None,
            is_outgoing: false,
        }],
    );
    let mailbox = Arc::new(mailbox);

    let crew = EmailCrew::new(
        Arc::new(StageLlm),
        mailbox.clone(),
        mailbox.clone(),
        RulesEngine::default_rules(),
        ME,
    );
    let search = Arc::new(ScriptedSearch::new(vec![Ok(vec![
        msg("10", "T", "Carol <carol@ex.com>").with_subject("Deck"),
        msg("11", "U", "noreply@shop.example.com"),
    ])]));
    let mut poll_loop = PollLoop::new(config(), search, Arc::new(crew)).unwrap();

    let report = match poll_loop.run_cycle().await {
        CycleOutcome::Dispatched {
            count: 2,
            report: Some(report),
        } => report,
        other => panic!("Expected a dispatch report, got {other:?}"),
    };

    assert_eq!(report.ignored.len(), 1);
    assert_eq!(report.ignored[0].id, "11");
    assert_eq!(report.action_required, vec!["10"]);
    assert!(report.is_complete());

    let drafts = mailbox.drafts.lock().await;
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].to, "carol@ex.com");
    assert_eq!(drafts[0].subject, "Re: Deck");
    assert_eq!(drafts[0].in_reply_to.as_deref(), Some("<deck@ex.com>"));
}
