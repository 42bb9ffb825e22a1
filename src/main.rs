//! CLI entry point for `autodraft`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use autodraft::config::PollerConfig;
use autodraft::context::ToolContext;
use autodraft::corpus::{CorpusService, CorpusSettings, VertexRagClient};
use autodraft::llm::{LlmConfig, create_provider};
use autodraft::mail::{ImapConfig, ImapMailbox};
use autodraft::pipeline::{EmailCrew, RulesEngine};
use autodraft::poller::{PollLoop, spawn_poller};
use autodraft::tools::ToolRegistry;
use autodraft::tools::builtin::{register_corpus_tools, register_draft_tool};

#[derive(Parser)]
#[command(name = "autodraft", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Directory for the daily log file
    #[arg(long, env = "AUTODRAFT_LOG_DIR", global = true)]
    log_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the mailbox and draft replies (default)
    Run,
    /// Call a corpus tool once and print its JSON result
    Tool {
        /// Tool name, e.g. list_corpora or rag_query
        name: String,
        /// JSON object of parameters
        #[arg(default_value = "{}")]
        params: String,
    },
    /// Store one draft from "to|subject|message"
    Draft { data: String },
    /// List the corpus tools and their parameter schemas
    Tools,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    setup_logging(level, cli.log_dir.as_deref());

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => cmd_run().await,
        Commands::Tool { name, params } => cmd_tool(&name, &params).await,
        Commands::Draft { data } => cmd_draft(&data).await,
        Commands::Tools => cmd_tools().await,
    }
}

/// Poll until Ctrl-C.
async fn cmd_run() -> anyhow::Result<()> {
    install_crypto_provider()?;

    let poller_config = PollerConfig::from_env()?;
    let imap_config = ImapConfig::from_env()?;
    let llm_config = LlmConfig::from_env()?;
    let llm = create_provider(&llm_config)?;

    eprintln!("autodraft v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Mailbox: {}@{}", imap_config.username, imap_config.host);
    eprintln!("   Model: {}", llm.model_name());
    eprintln!(
        "   Poll every {}s, window {}",
        poller_config.poll_interval.as_secs(),
        poller_config.recency.query()
    );
    eprintln!("   Drafts only, nothing is sent. Ctrl-C to stop.\n");

    let mailbox = Arc::new(ImapMailbox::new(imap_config));
    let crew = EmailCrew::new(
        llm,
        mailbox.clone(),
        mailbox.clone(),
        RulesEngine::default_rules(),
        poller_config.self_address.clone(),
    );

    let poll_loop = PollLoop::new(poller_config, mailbox, Arc::new(crew))?;
    let (handle, shutdown) = spawn_poller(poll_loop);

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    tracing::info!("Interrupt received, stopping poller");
    let _ = shutdown.send(true);
    handle.await.context("poller task panicked")?;
    Ok(())
}

async fn cmd_tool(name: &str, params: &str) -> anyhow::Result<()> {
    let params: serde_json::Value =
        serde_json::from_str(params).context("tool parameters must be a JSON object")?;

    let registry = corpus_registry()?;
    let ctx = ToolContext::new();
    let output = registry.execute(name, params, &ctx).await?;
    println!("{}", serde_json::to_string_pretty(&output.result)?);
    Ok(())
}

async fn cmd_draft(data: &str) -> anyhow::Result<()> {
    install_crypto_provider()?;

    let mailbox = Arc::new(ImapMailbox::new(ImapConfig::from_env()?));
    let registry = ToolRegistry::new();
    register_draft_tool(&registry, mailbox);

    let ctx = ToolContext::new();
    let output = registry
        .execute("create_draft", serde_json::json!({ "data": data }), &ctx)
        .await?;
    println!("{}", serde_json::to_string_pretty(&output.result)?);
    Ok(())
}

async fn cmd_tools() -> anyhow::Result<()> {
    let registry = corpus_registry()?;
    let mut defs = registry.tool_definitions().await;
    defs.sort_by(|a, b| a.name.cmp(&b.name));
    println!("{}", serde_json::to_string_pretty(&defs)?);
    Ok(())
}

fn corpus_registry() -> anyhow::Result<ToolRegistry> {
    let settings = CorpusSettings::from_env()?;
    let backend = VertexRagClient::from_env(settings.clone())?;
    let service = Arc::new(CorpusService::new(Arc::new(backend), settings));

    let registry = ToolRegistry::new();
    register_corpus_tools(&registry, service);
    Ok(registry)
}

/// Install the ring crypto provider before any TLS connection.
fn install_crypto_provider() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))
}

/// Stderr logging plus an optional daily log file.
fn setup_logging(level: &str, log_dir: Option<&std::path::Path>) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    if let Some(dir) = log_dir
        && std::fs::create_dir_all(dir).is_ok()
    {
        let file_appender = tracing_appender::rolling::daily(dir, "autodraft.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}
