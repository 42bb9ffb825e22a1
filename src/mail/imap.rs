//! IMAP mailbox: recent-mail search, thread fetch and draft append over
//! TLS. All I/O is blocking and runs under `spawn_blocking`.
//!
//! One connection per operation, closed with LOGOUT.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mail_parser::{HeaderValue, MessageParser, MimeHeaders};
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ConfigError, MailError};
use crate::mail::traits::{DraftStore, MailSearch, ThreadFetcher};
use crate::mail::types::{
    DraftRequest, EmailMessage, MailMessage, RecencyFilter, extract_addresses, make_snippet,
    strip_html, strip_quoted_text,
};

/// Socket read timeout.
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on messages returned by one search (newest first).
const MAX_SEARCH_RESULTS: usize = 100;

/// Search only needs metadata and the start of the body for the snippet.
const SEARCH_FETCH_ITEMS: &str = "BODY.PEEK[HEADER.FIELDS (FROM SUBJECT MESSAGE-ID IN-REPLY-TO REFERENCES DATE)] BODY.PEEK[TEXT]<0.2048>";

/// Thread reconstruction needs recipients and the full body.
const FULL_FETCH_ITEMS: &str = "BODY.PEEK[]";

// ── Configuration ───────────────────────────────────────────────────

/// IMAP connection settings, built from environment variables.
#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    /// Mailbox searched for new mail.
    pub mailbox: String,
    /// Mailbox drafts are appended to.
    pub drafts_mailbox: String,
    /// Operator address used as draft sender and to mark outgoing thread entries.
    pub from_address: String,
}

impl ImapConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
        };

        let host = require("EMAIL_IMAP_HOST")?;
        let port = match lookup("EMAIL_IMAP_PORT") {
            None => 993,
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "EMAIL_IMAP_PORT".to_string(),
                message: format!("'{raw}' is not a port number"),
            })?,
        };
        let username = require("EMAIL_USERNAME")?;
        let password = SecretString::from(require("EMAIL_PASSWORD")?);
        let from_address = lookup("MY_EMAIL")
            .or_else(|| lookup("EMAIL_FROM_ADDRESS"))
            .unwrap_or_else(|| username.clone());

        Ok(Self {
            host,
            port,
            username,
            password,
            mailbox: lookup("EMAIL_MAILBOX").unwrap_or_else(|| "INBOX".to_string()),
            drafts_mailbox: lookup("EMAIL_DRAFTS_MAILBOX").unwrap_or_else(|| "Drafts".to_string()),
            from_address,
        })
    }
}

// ── Mailbox ─────────────────────────────────────────────────────────

/// IMAP-backed implementation of all three mail collaborators.
pub struct ImapMailbox {
    config: ImapConfig,
}

impl ImapMailbox {
    pub fn new(config: ImapConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ImapConfig {
        &self.config
    }

    async fn run_blocking<T, F>(&self, op: F) -> Result<T, MailError>
    where
        T: Send + 'static,
        F: FnOnce(&ImapConfig) -> Result<T, MailError> + Send + 'static,
    {
        let cfg = self.config.clone();
        tokio::task::spawn_blocking(move || op(&cfg))
            .await
            .map_err(|e| MailError::TaskAborted(e.to_string()))?
    }
}

#[async_trait]
impl MailSearch for ImapMailbox {
    async fn search(&self, filter: &RecencyFilter) -> Result<Vec<MailMessage>, MailError> {
        let criterion = filter.imap_criterion(Utc::now());
        self.run_blocking(move |cfg| search_recent(cfg, &criterion))
            .await
    }
}

#[async_trait]
impl ThreadFetcher for ImapMailbox {
    async fn fetch_thread(&self, thread_id: &str) -> Result<Vec<EmailMessage>, MailError> {
        let thread_id = thread_id.to_string();
        self.run_blocking(move |cfg| fetch_thread_blocking(cfg, &thread_id))
            .await
    }
}

#[async_trait]
impl DraftStore for ImapMailbox {
    async fn create_draft(&self, draft: &DraftRequest) -> Result<String, MailError> {
        let draft = draft.clone();
        self.run_blocking(move |cfg| append_draft(cfg, &draft)).await
    }
}

// ── Operations (blocking) ───────────────────────────────────────────

fn search_recent(config: &ImapConfig, criterion: &str) -> Result<Vec<MailMessage>, MailError> {
    let mut session = ImapSession::open(config)?;
    session.examine(&config.mailbox)?;

    let mut uids = session.uid_search(criterion)?;
    uids.sort_unstable_by(|a, b| b.cmp(a));
    uids.truncate(MAX_SEARCH_RESULTS);

    let fetched = session.uid_fetch(&uids, SEARCH_FETCH_ITEMS)?;
    session.logout();

    let mut by_uid: HashMap<u32, FetchedMessage> =
        fetched.into_iter().map(|f| (f.uid, f)).collect();

    let messages: Vec<MailMessage> = uids
        .iter()
        .filter_map(|uid| by_uid.remove(uid))
        .filter_map(|f| message_from_raw(f.uid, f.gm_thread_id, &f.raw))
        .collect();

    debug!(
        mailbox = %config.mailbox,
        criterion,
        count = messages.len(),
        "IMAP search complete"
    );
    Ok(messages)
}

fn fetch_thread_blocking(
    config: &ImapConfig,
    thread_id: &str,
) -> Result<Vec<EmailMessage>, MailError> {
    let mut session = ImapSession::open(config)?;
    session.examine(&config.mailbox)?;

    let criterion = if session.gmail && thread_id.bytes().all(|b| b.is_ascii_digit()) {
        format!("X-GM-THRID {thread_id}")
    } else {
        let root = format!("<{}>", thread_id.trim_matches(|c| c == '<' || c == '>'));
        format!(
            "OR HEADER Message-ID {} HEADER References {}",
            quote(&root),
            quote(&root)
        )
    };

    let uids = session.uid_search(&criterion)?;
    if uids.is_empty() {
        session.logout();
        return Err(MailError::ThreadNotFound {
            thread_id: thread_id.to_string(),
        });
    }

    let fetched = session.uid_fetch(&uids, FULL_FETCH_ITEMS)?;
    session.logout();

    let mut entries: Vec<EmailMessage> = fetched
        .iter()
        .filter_map(|f| thread_entry_from_raw(&f.raw, &config.from_address))
        .collect();
    entries.sort_by_key(|e| e.timestamp);
    Ok(entries)
}

fn append_draft(config: &ImapConfig, draft: &DraftRequest) -> Result<String, MailError> {
    let (message_id, bytes) = build_draft_message(&config.from_address, draft)?;

    let mut session = ImapSession::open(config)?;
    let appended_uid = session.append(&config.drafts_mailbox, "\\Draft", &bytes)?;
    session.logout();

    info!(
        to = %draft.to,
        mailbox = %config.drafts_mailbox,
        "Draft stored"
    );
    Ok(appended_uid.unwrap_or(message_id))
}

/// Render a draft as an RFC 5322 message. Returns (Message-ID, bytes).
pub fn build_draft_message(
    from_address: &str,
    draft: &DraftRequest,
) -> Result<(String, Vec<u8>), MailError> {
    let message_id = format!("<{}@autodraft.local>", Uuid::new_v4());

    let mut builder = lettre::Message::builder()
        .from(
            from_address
                .parse()
                .map_err(|e| MailError::DraftBuild(format!("invalid from address: {e}")))?,
        )
        .to(draft
            .to
            .parse()
            .map_err(|e| MailError::DraftBuild(format!("invalid to address: {e}")))?)
        .subject(draft.subject.clone())
        .message_id(Some(message_id.clone()));

    if let Some(ref parent) = draft.in_reply_to {
        let parent = format!("<{}>", parent.trim_matches(|c| c == '<' || c == '>'));
        builder = builder.in_reply_to(parent.clone()).references(parent);
    }

    let message = builder
        .body(draft.body.clone())
        .map_err(|e| MailError::DraftBuild(e.to_string()))?;

    Ok((message_id, message.formatted()))
}

// ── Message conversion ──────────────────────────────────────────────

/// Convert a raw RFC 822 message into search metadata. `raw` may be a
/// header block followed by a truncated body (see [`join_header_and_text`]).
pub fn message_from_raw(uid: u32, gm_thread_id: Option<String>, raw: &[u8]) -> Option<MailMessage> {
    let parsed = MessageParser::default().parse(raw)?;

    let id = parsed
        .message_id()
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("uid-{uid}"));
    let thread_id = gm_thread_id
        .or_else(|| derive_thread_id(&parsed))
        .unwrap_or_else(|| id.clone());

    Some(MailMessage {
        snippet: make_snippet(&extract_text(&parsed)),
        sender: format_sender(&parsed),
        subject: parsed.subject().map(|s| s.to_string()),
        received_at: parsed
            .date()
            .and_then(|d| DateTime::<Utc>::from_timestamp(d.to_timestamp(), 0)),
        id,
        thread_id,
    })
}

fn thread_entry_from_raw(raw: &[u8], self_address: &str) -> Option<EmailMessage> {
    let parsed = MessageParser::default().parse(raw)?;
    let from = extract_sender(&parsed);
    Some(EmailMessage {
        is_outgoing: from.eq_ignore_ascii_case(self_address),
        to: extract_addresses(parsed.to()),
        cc: extract_addresses(parsed.cc()),
        subject: parsed.subject().unwrap_or("(no subject)").to_string(),
        message_id: parsed.message_id().unwrap_or_default().to_string(),
        content: strip_quoted_text(&extract_text(&parsed)),
        timestamp: parsed
            .date()
            .and_then(|d| DateTime::<Utc>::from_timestamp(d.to_timestamp(), 0)),
        from,
    })
}

/// Thread root: first References id, else In-Reply-To, else own Message-ID.
fn derive_thread_id(parsed: &mail_parser::Message) -> Option<String> {
    first_header_id(parsed.references())
        .or_else(|| first_header_id(parsed.in_reply_to()))
        .or_else(|| parsed.message_id().map(|s| s.to_string()))
}

fn first_header_id(value: &HeaderValue<'_>) -> Option<String> {
    match value {
        HeaderValue::Text(t) => Some(t.to_string()),
        HeaderValue::TextList(list) => list.first().map(|t| t.to_string()),
        _ => None,
    }
}

/// Sender as `Name <addr>` when a display name is present, else the bare address.
fn format_sender(parsed: &mail_parser::Message) -> String {
    let Some(addr) = parsed.from().and_then(|a| a.first()) else {
        return "unknown".to_string();
    };
    match (addr.name(), addr.address()) {
        (Some(name), Some(address)) => format!("{name} <{address}>"),
        (None, Some(address)) => address.to_string(),
        (Some(name), None) => name.to_string(),
        (None, None) => "unknown".to_string(),
    }
}

/// Extract the sender address from a parsed email.
fn extract_sender(parsed: &mail_parser::Message) -> String {
    parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".into())
}

/// Extract readable text from a parsed email.
fn extract_text(parsed: &mail_parser::Message) -> String {
    if let Some(text) = parsed.body_text(0) {
        return text.to_string();
    }
    if let Some(html) = parsed.body_html(0) {
        return strip_html(html.as_ref());
    }
    for part in parsed.attachments() {
        if let Some(ct) = MimeHeaders::content_type(part)
            && ct.ctype() == "text"
            && let Ok(text) = std::str::from_utf8(part.contents())
        {
            return text.to_string();
        }
    }
    String::new()
}

// ── IMAP session ────────────────────────────────────────────────────

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// One untagged server response, with any literals it carried.
#[derive(Debug, Default)]
struct Untagged {
    text: String,
    literals: Vec<Literal>,
}

/// Literal payload and the fetch item that announced it, e.g. `BODY[TEXT]<0>`.
#[derive(Debug)]
struct Literal {
    item: String,
    bytes: Vec<u8>,
}

struct Response {
    untagged: Vec<Untagged>,
    status: String,
}

struct FetchedMessage {
    uid: u32,
    gm_thread_id: Option<String>,
    raw: Vec<u8>,
}

struct ImapSession<S: Read + Write> {
    stream: BufReader<S>,
    next_tag: u32,
    gmail: bool,
}

impl ImapSession<TlsStream> {
    /// Connect, log in, and read capabilities.
    fn open(config: &ImapConfig) -> Result<Self, MailError> {
        let mut session = Self::connect(config)?;

        let login = format!(
            "LOGIN {} {}",
            quote(&config.username),
            quote(config.password.expose_secret())
        );
        match session.command(&login) {
            Ok(_) => {}
            Err(MailError::Protocol { reason, .. }) => {
                debug!(reason = %reason, "IMAP login rejected");
                return Err(MailError::AuthFailed {
                    username: config.username.clone(),
                });
            }
            Err(e) => return Err(e),
        }

        let caps = session.command("CAPABILITY")?;
        session.gmail = caps
            .untagged
            .iter()
            .any(|u| u.text.contains("X-GM-EXT-1"));
        Ok(session)
    }

    fn connect(config: &ImapConfig) -> Result<Self, MailError> {
        let tcp = TcpStream::connect((config.host.as_str(), config.port)).map_err(|e| {
            MailError::Connect {
                host: config.host.clone(),
                port: config.port,
                reason: e.to_string(),
            }
        })?;
        tcp.set_read_timeout(Some(READ_TIMEOUT))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = rustls_pki_types::ServerName::try_from(config.host.clone())
            .map_err(|e| MailError::Tls(e.to_string()))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| MailError::Tls(e.to_string()))?;

        let mut session = Self::from_stream(rustls::StreamOwned::new(conn, tcp));

        let greeting = session.read_line()?;
        if !greeting.starts_with("* OK") && !greeting.starts_with("* PREAUTH") {
            return Err(MailError::Protocol {
                command: "greeting".to_string(),
                reason: greeting.trim().to_string(),
            });
        }
        Ok(session)
    }
}

impl<S: Read + Write> ImapSession<S> {
    fn from_stream(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
            next_tag: 1,
            gmail: false,
        }
    }

    fn tag(&mut self) -> String {
        let tag = format!("A{}", self.next_tag);
        self.next_tag += 1;
        tag
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), MailError> {
        let stream = self.stream.get_mut();
        stream.write_all(bytes)?;
        stream.flush()?;
        Ok(())
    }

    fn read_line(&mut self) -> Result<String, MailError> {
        let mut buf = Vec::new();
        let n = self.stream.read_until(b'\n', &mut buf)?;
        if n == 0 {
            return Err(MailError::Protocol {
                command: "read".to_string(),
                reason: "connection closed".to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn read_literal(&mut self, len: usize) -> Result<Vec<u8>, MailError> {
        let mut buf = vec![0u8; len];
        self.stream.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn command(&mut self, cmd: &str) -> Result<Response, MailError> {
        let tag = self.tag();
        self.write_all(format!("{tag} {cmd}\r\n").as_bytes())?;
        self.read_response(&tag, command_name(cmd))
    }

    fn read_response(&mut self, tag: &str, command: &str) -> Result<Response, MailError> {
        let tagged_prefix = format!("{tag} ");
        let mut untagged = Vec::new();

        loop {
            let line = self.read_line()?;

            if let Some(status) = line.strip_prefix(&tagged_prefix) {
                let status = status.trim().to_string();
                if status.starts_with("OK") {
                    return Ok(Response { untagged, status });
                }
                return Err(MailError::Protocol {
                    command: command.to_string(),
                    reason: status,
                });
            }

            let mut current = Untagged::default();
            let mut segment = line;
            loop {
                match split_literal(&segment) {
                    Some((prefix_end, len)) => {
                        let prefix = &segment[..prefix_end];
                        current.text.push_str(prefix);
                        let item = literal_item(prefix);
                        let bytes = self.read_literal(len)?;
                        current.literals.push(Literal { item, bytes });
                        segment = self.read_line()?;
                    }
                    None => {
                        current.text.push_str(segment.trim_end());
                        break;
                    }
                }
            }
            untagged.push(current);
        }
    }

    fn examine(&mut self, mailbox: &str) -> Result<(), MailError> {
        self.command(&format!("EXAMINE {}", quote(mailbox)))?;
        Ok(())
    }

    fn uid_search(&mut self, criterion: &str) -> Result<Vec<u32>, MailError> {
        let response = self.command(&format!("UID SEARCH {criterion}"))?;
        Ok(parse_search_response(&response.untagged))
    }

    fn uid_fetch(&mut self, uids: &[u32], items: &str) -> Result<Vec<FetchedMessage>, MailError> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        let response = self.command(&fetch_command(uids, items, self.gmail))?;

        Ok(response
            .untagged
            .into_iter()
            .filter_map(|u| {
                let (uid, gm_thread_id) = parse_fetch_attributes(&u.text)?;
                let raw = assemble_literals(u.literals)?;
                Some(FetchedMessage {
                    uid,
                    gm_thread_id,
                    raw,
                })
            })
            .collect())
    }

    /// APPEND a message. Returns the APPENDUID uid when the server reports one.
    fn append(
        &mut self,
        mailbox: &str,
        flags: &str,
        message: &[u8],
    ) -> Result<Option<String>, MailError> {
        let tag = self.tag();
        self.write_all(
            format!(
                "{tag} APPEND {} ({flags}) {{{}}}\r\n",
                quote(mailbox),
                message.len()
            )
            .as_bytes(),
        )?;

        let continuation = self.read_line()?;
        if !continuation.starts_with('+') {
            return Err(MailError::Protocol {
                command: "APPEND".to_string(),
                reason: continuation.trim().to_string(),
            });
        }

        self.write_all(message)?;
        self.write_all(b"\r\n")?;
        let response = self.read_response(&tag, "APPEND")?;
        Ok(parse_append_uid(&response.status))
    }

    fn logout(mut self) {
        if let Err(e) = self.command("LOGOUT") {
            warn!(error = %e, "IMAP logout failed");
        }
    }
}

// ── Protocol helpers (pure, public for testing) ─────────────────────

/// Quote a string as an IMAP quoted string.
pub fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// If the line ends with a literal marker `{n}`, return (marker start, n).
pub fn split_literal(line: &str) -> Option<(usize, usize)> {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    let body = trimmed.strip_suffix('}')?;
    let open = body.rfind('{')?;
    let len = body[open + 1..].parse().ok()?;
    Some((open, len))
}

/// Join a `HEADER.FIELDS` block and a (possibly truncated) `TEXT` part
/// into one parseable message.
pub fn join_header_and_text(header: &[u8], text: &[u8]) -> Vec<u8> {
    let mut raw = header.to_vec();
    if !(raw.ends_with(b"\r\n\r\n") || raw.ends_with(b"\n\n")) {
        if raw.ends_with(b"\n") {
            raw.extend_from_slice(b"\r\n");
        } else {
            raw.extend_from_slice(b"\r\n\r\n");
        }
    }
    raw.extend_from_slice(text);
    raw
}

fn fetch_command(uids: &[u32], items: &str, gmail: bool) -> String {
    let set = uids
        .iter()
        .map(|u| u.to_string())
        .collect::<Vec<_>>()
        .join(",");
    let thread = if gmail { " X-GM-THRID" } else { "" };
    format!("UID FETCH {set} (UID{thread} {items})")
}

/// The fetch item a literal belongs to, taken from the text before its marker.
fn literal_item(prefix: &str) -> String {
    prefix
        .rfind("BODY[")
        .map(|i| prefix[i..].trim().to_string())
        .unwrap_or_default()
}

/// Message bytes from a FETCH response: header plus text when both were
/// requested, else the single full-body literal.
fn assemble_literals(literals: Vec<Literal>) -> Option<Vec<u8>> {
    let header = literals.iter().find(|l| l.item.starts_with("BODY[HEADER"));
    let text = literals.iter().find(|l| l.item.starts_with("BODY[TEXT]"));
    match (header, text) {
        (Some(h), Some(t)) => Some(join_header_and_text(&h.bytes, &t.bytes)),
        (Some(h), None) => Some(join_header_and_text(&h.bytes, b"")),
        _ => literals.into_iter().next().map(|l| l.bytes),
    }
}

fn command_name(cmd: &str) -> &str {
    let mut words = cmd.split_whitespace();
    match words.next() {
        Some("UID") => words.next().unwrap_or("UID"),
        Some(word) => word,
        None => "",
    }
}

fn parse_search_response(untagged: &[Untagged]) -> Vec<u32> {
    untagged
        .iter()
        .filter_map(|u| u.text.strip_prefix("* SEARCH"))
        .flat_map(|rest| rest.split_whitespace().filter_map(|n| n.parse().ok()))
        .collect()
}

fn parse_fetch_attributes(text: &str) -> Option<(u32, Option<String>)> {
    static_regexes().0.captures(text).and_then(|caps| {
        let uid = caps[1].parse().ok()?;
        let thread = static_regexes()
            .1
            .captures(text)
            .map(|c| c[1].to_string());
        Some((uid, thread))
    })
}

fn parse_append_uid(status: &str) -> Option<String> {
    static_regexes()
        .2
        .captures(status)
        .map(|caps| caps[1].to_string())
}

fn static_regexes() -> &'static (Regex, Regex, Regex) {
    static REGEXES: std::sync::OnceLock<(Regex, Regex, Regex)> = std::sync::OnceLock::new();
    REGEXES.get_or_init(|| {
        (
            Regex::new(r"\bUID (\d+)").expect("valid regex"),
            Regex::new(r"\bX-GM-THRID (\d+)").expect("valid regex"),
            Regex::new(r"\[APPENDUID \d+ (\d+)\]").expect("valid regex"),
        )
    })
}
