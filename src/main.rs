//! # rag-chat CLI (`ragchat`)
//!
//! ## Usage
//!
//! ```bash
//! ragchat [--config ./ragchat.toml] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragchat chunk <files>` | Extract and split files without embedding |
//! | `ragchat ask "<question>" --file <f>` | Index files and answer one question |
//! | `ragchat chat --file <f>` | Index files and start an interactive session |
//! | `ragchat models` | List the supported generation models |
//! | `ragchat serve` | Start the multi-session HTTP server |
//!
//! The access token is read from `--token`, `[settings].token`, or the
//! environment variable named by `[generation].token_env` (`HF_TOKEN`).

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rag_chat::chat::{ingest_paths, render_ingest, run_ask, run_repl};
use rag_chat::chunk::RecursiveSplitter;
use rag_chat::config::{self, Config};
use rag_chat::ingest::run_chunk;
use rag_chat::progress::ProgressMode;
use rag_chat::server;
use rag_chat::services::Services;
use rag_chat::session::Session;
use rag_chat::settings::{RagSettings, SettingsInput, SUPPORTED_MODELS};

/// Ask questions about your documents with retrieval-augmented generation.
#[derive(Parser)]
#[command(
    name = "ragchat",
    about = "Document question answering over PDF, text and Markdown files",
    version
)]
struct Cli {
    /// Path to a configuration file (TOML). Built-in defaults apply when
    /// omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Progress on stderr: off, human, or json. Defaults to human when
    /// stderr is a terminal.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract and split files, printing page and chunk counts.
    ///
    /// A dry run of ingestion: nothing is embedded and no token is needed.
    Chunk {
        /// Files or directories to read.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Maximum characters per chunk.
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Characters shared between neighbouring chunks.
        #[arg(long)]
        chunk_overlap: Option<usize>,

        /// Print every chunk.
        #[arg(long)]
        show: bool,
    },

    /// Index files and answer a single question.
    Ask {
        /// The question.
        question: String,

        /// Files or directories to index.
        #[arg(long = "file", required = true)]
        files: Vec<PathBuf>,

        #[command(flatten)]
        settings: SettingsArgs,
    },

    /// Index files and start an interactive session.
    ///
    /// Type questions at the prompt; `/help` lists the commands.
    Chat {
        /// Files or directories to index.
        #[arg(long = "file", required = true)]
        files: Vec<PathBuf>,

        #[command(flatten)]
        settings: SettingsArgs,
    },

    /// List the supported generation models.
    Models,

    /// Start the HTTP server.
    Serve {
        /// Override `[server].bind`.
        #[arg(long)]
        bind: Option<String>,

        #[command(flatten)]
        settings: SettingsArgs,
    },
}

/// Session settings that override the configuration file.
#[derive(Args)]
struct SettingsArgs {
    /// Access token for the hosted model.
    #[arg(long)]
    token: Option<String>,

    /// Generation model.
    #[arg(long)]
    model: Option<String>,

    /// Maximum characters per chunk (200-2000).
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Characters shared between neighbouring chunks (0-200).
    #[arg(long)]
    chunk_overlap: Option<usize>,

    /// Chunks retrieved per question (1-5).
    #[arg(short, long)]
    k: Option<usize>,

    /// Sampling temperature (0.0-1.0).
    #[arg(long)]
    temperature: Option<f32>,

    /// Maximum new tokens to generate (128-1024).
    #[arg(long)]
    max_tokens: Option<u32>,
}

impl From<SettingsArgs> for SettingsInput {
    fn from(a: SettingsArgs) -> Self {
        SettingsInput {
            token: a.token,
            model: a.model,
            chunk_size: a.chunk_size,
            chunk_overlap: a.chunk_overlap,
            k: a.k,
            temperature: a.temperature,
            max_tokens: a.max_tokens,
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rag_chat=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn session_settings(cfg: &Config, overrides: SettingsInput) -> Result<RagSettings> {
    let settings = cfg
        .session_settings()?
        .with_overrides(overrides)
        .context("Invalid settings")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => Config::default(),
    };
    let progress = cli
        .progress
        .unwrap_or_else(ProgressMode::default_for_tty)
        .reporter();

    match cli.command {
        Commands::Chunk {
            files,
            chunk_size,
            chunk_overlap,
            show,
        } => {
            let settings = session_settings(
                &cfg,
                SettingsInput {
                    chunk_size,
                    chunk_overlap,
                    ..Default::default()
                },
            )?;
            let splitter =
                RecursiveSplitter::new(settings.chunk_size(), settings.chunk_overlap())?;
            run_chunk(&files, &splitter, show)?;
        }
        Commands::Ask {
            question,
            files,
            settings,
        } => {
            let settings = session_settings(&cfg, settings.into())?;
            let services = Services::from_config(&cfg, settings.token().map(str::to_string))?;
            let mut stdout = std::io::stdout();
            run_ask(
                Session::new(settings),
                &services,
                &files,
                &question,
                progress.as_ref(),
                &mut stdout,
            )
            .await?;
        }
        Commands::Chat { files, settings } => {
            let settings = session_settings(&cfg, settings.into())?;
            let services = Services::from_config(&cfg, settings.token().map(str::to_string))?;
            let mut session = Session::new(settings);
            let report = ingest_paths(&mut session, &services, &files, progress.as_ref()).await?;
            println!("{}", render_ingest(&report));
            println!("Type a question, or /help for commands.");

            let interactive = atty::is(atty::Stream::Stdin);
            let mut input = std::io::stdin().lock();
            let mut stdout = std::io::stdout();
            run_repl(
                &mut session,
                &services,
                &mut input,
                &mut stdout,
                progress.as_ref(),
                interactive,
            )
            .await?;
        }
        Commands::Models => {
            for (i, model) in SUPPORTED_MODELS.iter().enumerate() {
                let marker = if i == 0 { " (default)" } else { "" };
                println!("{}{}", model, marker);
            }
        }
        Commands::Serve { bind, settings } => {
            let defaults = session_settings(&cfg, settings.into())?;
            let mut cfg = cfg;
            if let Some(bind) = bind {
                cfg.server.bind = bind;
            }
            server::run_server(&cfg, defaults).await?;
        }
    }

    Ok(())
}
