//! Command-line interface for the trading-analysis stream reducer
//!
//! `agent-cli replay` streams a recorded pipeline run (one chunk per JSON
//! line) through the driver and prints every event as a JSON line.

use agent_core::{PipelineChunk, RunRequest, ScriptedPipeline};
use agent_utils::Config;
use agent_workflow::{
    DriverConfig, EventSink, ExcerptSummarizer, FsArtifactStore, RunOutcome, StreamDriver,
};
use anyhow::{Context, bail};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "agent-cli")]
#[command(about = "Drive trading-analysis runs from the command line", long_about = None)]
struct Cli {
    /// Emit logs as JSON on stderr
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a recorded chunk stream through the driver
    Replay(ReplayArgs),
}

#[derive(Args, Debug)]
struct ReplayArgs {
    /// File with one pipeline chunk (JSON object) per line
    chunks: PathBuf,

    /// Ticker symbol
    #[arg(long)]
    ticker: String,

    /// Analysis date, YYYY-MM-DD
    #[arg(long)]
    date: String,

    /// Comma-separated analysts: market, social, news, fundamentals
    #[arg(long, value_delimiter = ',', default_value = "market,social,news,fundamentals")]
    analysts: Vec<String>,

    /// Debate rounds
    #[arg(long, default_value_t = 1)]
    research_depth: u32,

    /// Where artifacts are written (overrides TRADING_RESULTS_DIR)
    #[arg(long)]
    results_dir: Option<PathBuf>,

    /// Pause before each chunk, in milliseconds
    #[arg(long, default_value_t = 0)]
    chunk_delay_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    agent_utils::init_tracing_with("info", cli.json_logs);

    let config = Config::from_env().context("Invalid environment configuration")?;
    info!(environment = %config.environment, "Starting agent-cli");

    match cli.command {
        Commands::Replay(args) => replay(args, &config).await,
    }
}

/// Parse a JSON-lines recording, skipping blank lines
async fn load_chunks(path: &Path) -> anyhow::Result<Vec<PipelineChunk>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let mut chunks = Vec::new();
    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let value: serde_json::Value = serde_json::from_str(line)
            .with_context(|| format!("Line {} is not valid JSON", index + 1))?;
        let chunk = PipelineChunk::from_value(value)
            .with_context(|| format!("Line {} is not a chunk", index + 1))?;
        chunks.push(chunk);
    }
    Ok(chunks)
}

async fn replay(args: ReplayArgs, config: &Config) -> anyhow::Result<()> {
    let chunks = load_chunks(&args.chunks).await?;
    info!(chunks = chunks.len(), file = %args.chunks.display(), "Loaded recording");

    let pipeline = ScriptedPipeline::from_chunks(chunks)
        .with_delay(Duration::from_millis(args.chunk_delay_ms));
    let results_dir = args
        .results_dir
        .unwrap_or_else(|| config.results_dir.clone());

    let driver = StreamDriver::builder()
        .pipeline(Arc::new(pipeline))
        .summarizer(Arc::new(ExcerptSummarizer::default()))
        .store(Arc::new(FsArtifactStore::new(&results_dir)))
        .config(DriverConfig::from_app_config(config))
        .build()?;

    let (sink, mut rx) = EventSink::channel(config.event_buffer);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            println!("{}", event.to_wire(Local::now()));
        }
    });

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling analysis");
            interrupt.cancel();
        }
    });

    let request = RunRequest::new(args.ticker, args.date)
        .with_analysts(args.analysts)
        .with_research_depth(args.research_depth);
    let outcome = driver.run(request, &sink, cancel).await;

    // closing the sink lets the printer drain and finish
    drop(sink);
    printer.await.context("Event printer failed")?;

    match outcome? {
        RunOutcome::Completed {
            run_id,
            decision,
            writes,
        } => {
            info!(
                %run_id,
                %decision,
                written = writes.written.len(),
                failed = writes.failed.len(),
                dir = %results_dir.display(),
                "Replay complete"
            );
            Ok(())
        }
        RunOutcome::Cancelled { run_id } => {
            info!(%run_id, "Replay cancelled");
            Ok(())
        }
        RunOutcome::Failed { run_id, message } => bail!("Analysis {run_id} failed: {message}"),
    }
}
