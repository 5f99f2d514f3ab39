//! CLI binary for deck2notes.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExplainConfig` and drives the real pipeline: `run` submits a deck and
//! polls status exactly like a web client would, `watch` runs the polling
//! directory watcher, and `inspect` shows what the extractor sees without
//! needing an API key.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use deck2notes::{Deck, ExplainConfig, Explainer, JobStatus};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "deck2notes",
    version,
    about = "Explain PowerPoint slide decks with LLMs",
    long_about = "Extracts per-slide text from a .pptx deck, generates an explanation for \
every slide via a chat-completions API, and assembles an ordered JSON notes document."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert one deck: submit, wait, print or save the notes document.
    Run {
        /// Path to the .pptx file.
        input: PathBuf,

        /// Write the notes JSON here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Watch the upload directory and process every deck that appears.
    Watch {
        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Show per-slide extracted text statistics (no API key needed).
    Inspect {
        /// Path to the .pptx file.
        input: PathBuf,

        /// Print the full extracted text of every slide.
        #[arg(long)]
        full: bool,
    },
}

#[derive(Args)]
struct PipelineArgs {
    /// Directory for uploaded decks.
    #[arg(long, default_value = "uploads")]
    upload_dir: PathBuf,

    /// Directory for published notes documents.
    #[arg(long, default_value = "outputs")]
    output_dir: PathBuf,

    /// Chat model identifier.
    #[arg(short, long, default_value = "gpt-4o-mini")]
    model: String,

    /// API key (falls back to OPENAI_API_KEY).
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Base URL of the chat-completions API.
    #[arg(long, default_value = "https://api.openai.com/v1")]
    api_base: String,

    /// Concurrent generation calls per deck.
    #[arg(short, long, default_value_t = 8)]
    concurrency: usize,

    /// Per-call timeout in seconds.
    #[arg(long, default_value_t = 60)]
    timeout: u64,

    /// Retries per generation call on transient failures.
    #[arg(long, default_value_t = 3)]
    retries: u32,

    /// Watcher scan interval in milliseconds.
    #[arg(long, default_value_t = 1000)]
    poll_interval: u64,
}

impl PipelineArgs {
    fn into_config(self) -> Result<ExplainConfig> {
        let mut builder = ExplainConfig::builder()
            .upload_dir(self.upload_dir)
            .output_dir(self.output_dir)
            .model(self.model)
            .api_base(self.api_base)
            .concurrency(self.concurrency)
            .api_timeout_secs(self.timeout)
            .max_retries(self.retries)
            .poll_interval_ms(self.poll_interval);
        if let Some(key) = self.api_key {
            builder = builder.api_key(key);
        }
        builder.build().context("invalid configuration")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    match Cli::parse().command {
        Command::Run {
            input,
            output,
            pipeline,
        } => run(input, output, pipeline.into_config()?).await,
        Command::Watch { pipeline } => watch(pipeline.into_config()?).await,
        Command::Inspect { input, full } => inspect(&input, full),
    }
}

async fn run(input: PathBuf, output: Option<PathBuf>, config: ExplainConfig) -> Result<()> {
    let bytes = std::fs::read(&input)
        .with_context(|| format!("cannot read '{}'", input.display()))?;
    let source_name = input
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "deck.pptx".to_string());

    let service = Explainer::new(config).await?;
    let id = service.submit(&bytes, &source_name).await?;
    eprintln!("submitted as job {id}");

    // Poll exactly like a remote client would.
    let report = loop {
        let report = service.status(&id).await?;
        match report.status {
            JobStatus::Done | JobStatus::Failed => break report,
            _ => tokio::time::sleep(Duration::from_millis(300)).await,
        }
    };

    match report.status {
        JobStatus::Done => {
            let notes = report
                .notes
                .context("done report is missing the notes document")?;
            let json = serde_json::to_string_pretty(&notes)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("cannot write '{}'", path.display()))?;
                    eprintln!("notes written to {}", path.display());
                }
                None => println!("{json}"),
            }
            Ok(())
        }
        _ => bail!(
            "job failed: {}",
            report
                .error_detail
                .unwrap_or_else(|| "no detail recorded".to_string())
        ),
    }
}

async fn watch(config: ExplainConfig) -> Result<()> {
    let service = Explainer::new(config).await?;
    service.watch().await?;
    Ok(())
}

fn inspect(input: &PathBuf, full: bool) -> Result<()> {
    let bytes = std::fs::read(input)
        .with_context(|| format!("cannot read '{}'", input.display()))?;
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let deck = Deck::parse(&bytes, &name)?;

    println!("{}: {} slides", name, deck.slide_count());
    for (index, text) in deck.slide_texts() {
        if full {
            println!("--- slide {index} ---");
            println!("{}", if text.is_empty() { "(no text)" } else { &text });
        } else {
            let preview: String = text.chars().take(60).collect();
            println!(
                "  slide {index:>3}: {:>5} chars  {}",
                text.len(),
                if text.is_empty() { "(no text)" } else { &preview }
            );
        }
    }
    Ok(())
}
