//! genconductor
//!
//! Runs one generation request against the configured providers and prints
//! the result.
//!
//! # Usage
//!
//! ```bash
//! # Mind map, streamed to the terminal
//! genconductor --principal u1 mindmap "Rust ownership"
//!
//! # Presentation from a source document, archived locally
//! genconductor --principal u1 ppt "Quarterly review" --source-url https://host/q3.pdf --archive
//!
//! # Presentation in one provider call
//! genconductor --principal u1 ppt "Release notes" --direct
//!
//! # Recognize a PDF as flattened text, wait for the whole result
//! genconductor --principal u1 --sync recognize https://host/scan.pdf --text
//!
//! # With verbose logging
//! RUST_LOG=debug genconductor --principal u1 mindmap "Tokio"
//! ```
//!
//! # Environment Variables
//!
//! - `GENCONDUCTOR_PRINCIPAL`: default principal
//! - `GENCONDUCTOR_CONFIG`: config file path
//! - `GENCONDUCTOR_<KEY>`: provider values such as `GENCONDUCTOR_CHAT_KEY`
//! - `RUST_LOG`: log level (trace, debug, info, warn, error)
//!
//! # Signals
//!
//! - SIGINT: cancels the live stream; the job is finalized with partial output

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::signal;
use tracing::{info, warn};

use genconductor::backend::{ChatCompletionClient, Doc2xClient, Doc2xRecognizer, DocmeeClient};
use genconductor::config::ConfigLookup;
use genconductor::{
    load_config_from_path, Artifact, AsyncTaskPoller, ConfigOverrides, ExecutionMode, FileStore,
    GenerationHandle, GenerationRequest, InMemoryJobStore, LocalFileStore, Orchestrator,
    PipelineEvent, ResultMode, SourceDocument, SystemClock, TokenBroker,
};

/// Run generation pipelines from the command line
#[derive(Debug, Parser)]
#[command(name = "genconductor", version, about)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, env = "GENCONDUCTOR_CONFIG")]
    config: Option<PathBuf>,

    /// Principal the job runs for
    #[arg(long, env = "GENCONDUCTOR_PRINCIPAL")]
    principal: String,

    /// Wait for the full result instead of streaming deltas
    #[arg(long)]
    sync: bool,

    /// Print the artifact as JSON
    #[arg(long)]
    json: bool,

    /// Override the chat model
    #[arg(long)]
    model: Option<String>,

    /// Override the recognition poll timeout
    #[arg(long, value_name = "SECS")]
    poll_timeout: Option<u64>,

    /// Directory for archived artifacts
    #[arg(long, default_value = "genconductor-archive")]
    archive_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate a mind map as markdown
    Mindmap {
        /// Subject of the mind map
        topic: String,

        /// Extra instructions appended to the prompt
        #[arg(long)]
        prompt: Option<String>,
    },

    /// Generate a slide deck
    Ppt(PptArgs),

    /// Recognize a PDF or image
    Recognize {
        /// Document URL
        url: String,

        /// Flatten markdown to plain text
        #[arg(long)]
        text: bool,
    },
}

#[derive(Debug, Args)]
struct PptArgs {
    /// Subject of the deck
    #[arg(default_value = "")]
    topic: String,

    /// Reference document URL
    #[arg(long, conflicts_with = "source_text")]
    source_url: Option<String>,

    /// Reference text
    #[arg(long)]
    source_text: Option<String>,

    /// Extra instructions for outline and content
    #[arg(long)]
    prompt: Option<String>,

    /// Skip resolving the download URL
    #[arg(long)]
    no_download: bool,

    /// Download the deck and keep a copy in the archive directory
    #[arg(long)]
    archive: bool,

    /// Generate outline, content and deck in one provider call
    #[arg(long)]
    direct: bool,
}

impl Cli {
    fn request(&self) -> GenerationRequest {
        let request = match &self.command {
            Command::Mindmap { topic, prompt } => {
                let request = GenerationRequest::mind_map(topic.clone());
                match prompt {
                    Some(p) => request.with_extra_prompt(p.clone()),
                    None => request,
                }
            }
            Command::Ppt(args) => {
                let mut request = GenerationRequest::presentation(args.topic.clone())
                    .with_resolve_download(!args.no_download)
                    .with_archive(args.archive)
                    .with_direct_generation(args.direct);
                if let Some(url) = &args.source_url {
                    request = request.with_source(SourceDocument::Url(url.clone()));
                } else if let Some(text) = &args.source_text {
                    request = request.with_source(SourceDocument::Inline(text.clone()));
                }
                if let Some(p) = &args.prompt {
                    request = request.with_extra_prompt(p.clone());
                }
                request
            }
            Command::Recognize { url, text } => {
                let mode = if *text {
                    ResultMode::Text
                } else {
                    ResultMode::Markdown
                };
                GenerationRequest::recognize(url.clone(), mode)
            }
        };

        let mode = if self.sync {
            ExecutionMode::Sync
        } else {
            ExecutionMode::Stream
        };
        request
            .with_principal(self.principal.clone())
            .with_mode(mode)
    }

    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(secs) = self.poll_timeout {
            overrides = overrides.with_poll_timeout_secs(secs);
        }
        if let Some(model) = &self.model {
            overrides = overrides.with_chat_model(model.clone());
        }
        overrides
    }
}

fn build_orchestrator(cli: &Cli) -> anyhow::Result<Orchestrator> {
    let mut config = load_config_from_path(cli.config.clone()).context("loading config")?;
    cli.overrides().apply(&mut config);
    info!(source = ?config.source(), path = ?config.config_file_path, "Configuration loaded");

    let pipeline = config.pipeline.clone();
    let chat_settings = config.chat.clone();
    let lookup: Arc<dyn ConfigLookup> = Arc::new(config);
    let clock = Arc::new(SystemClock);

    let chat = Arc::new(ChatCompletionClient::new(Arc::clone(&lookup))?);
    let docmee = Arc::new(
        DocmeeClient::new(Arc::clone(&lookup))?.with_request_timeout(pipeline.request_timeout),
    );
    let broker = Arc::new(TokenBroker::new(
        docmee.clone(),
        clock.clone(),
        pipeline.token_ttl,
    ));
    let files: Arc<dyn FileStore> = Arc::new(LocalFileStore::new(cli.archive_dir.clone()));
    let recognizer = Doc2xRecognizer::new(
        Doc2xClient::new(lookup)?.with_request_timeout(pipeline.request_timeout),
        AsyncTaskPoller::new(clock),
        (&pipeline).into(),
    )
    .with_file_store(files.clone());

    Ok(
        Orchestrator::new(chat, docmee, Arc::new(recognizer), broker)
            .with_job_store(Arc::new(InMemoryJobStore::new()))
            .with_file_store(files)
            .with_settings(pipeline, chat_settings),
    )
}

/// Print events until the run ends or the user interrupts
///
/// Returns whether any delta reached the terminal.
async fn follow(handle: &mut GenerationHandle) -> anyhow::Result<bool> {
    let mut stdout = std::io::stdout();
    let mut streamed = false;
    loop {
        tokio::select! {
            event = handle.events.recv() => match event {
                Some(PipelineEvent::StageStarted(stage)) => eprintln!("» {stage}"),
                Some(PipelineEvent::Delta(delta)) => {
                    streamed = true;
                    write!(stdout, "{}", delta.text)?;
                    stdout.flush()?;
                }
                Some(PipelineEvent::StageFinished(_)) => {
                    if streamed {
                        writeln!(stdout)?;
                    }
                }
                None => return Ok(streamed),
            },
            _ = signal::ctrl_c() => {
                warn!(job_id = %handle.job_id, "Interrupted, cancelling");
                handle.events.close();
                return Ok(streamed);
            }
        }
    }
}

fn print_summary(artifact: &Artifact, streamed: bool) {
    if !streamed {
        println!("{}", artifact.content());
    }
    if let Artifact::Presentation {
        ppt_id,
        template_id,
        file_url,
        archived_url,
        ..
    } = artifact
    {
        eprintln!("presentation {ppt_id} (template {template_id})");
        if let Some(url) = file_url {
            eprintln!("download: {url}");
        }
        if let Some(url) = archived_url {
            eprintln!("archived: {url}");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("genconductor_cli=info".parse()?)
                .add_directive("genconductor=info".parse()?),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let orchestrator = build_orchestrator(&cli)?;
    let request = cli.request();
    info!(kind = %request.kind(), principal = %request.principal(), "Submitting request");

    let mut handle = orchestrator.submit(request);
    let streamed = follow(&mut handle).await?;
    let job_id = handle.job_id.clone();

    match handle.result.await.context("pipeline task panicked")? {
        Ok(artifact) => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&artifact)?);
            } else {
                print_summary(&artifact, streamed);
            }
            info!(job_id = %job_id, "Job done");
            Ok(())
        }
        Err(failure) => {
            if !failure.partial_content.is_empty() {
                eprintln!("partial output kept: {} chars", failure.partial_content.len());
            }
            eprintln!("trace: {}", failure.trace);
            Err(failure.into())
        }
    }
}
