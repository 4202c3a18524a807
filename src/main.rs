//! # doc-intake CLI (`intake`)
//!
//! Drives the ingestion pipeline over files on disk.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `intake ingest <PATHS>...` | Process files and print the corpus listing |
//! | `intake ask <PROMPT> <PATHS>...` | Process files, then answer a prompt |
//! | `intake preview <FILE>` | Process one file and print its preview |
//! | `intake completions <SHELL>` | Print shell completions |
//!
//! Per-file failures are reported in the listing and never change the exit
//! status; unreadable inputs and bad configuration do.

use anyhow::{bail, Result};
use chrono::Utc;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use doc_intake::config::{load_config, Config};
use doc_intake::models::{MediaKind, Outcome, SubmitReport};
use doc_intake::preview::PreviewPayload;
use doc_intake::progress::{IngestProgressEvent, IngestProgressReporter, ProgressMode};
use doc_intake::session::Session;
use doc_intake::sources::collect_inputs;
use doc_intake::stats::{format_bytes, render_listing, render_summary};

/// doc-intake: turn PDFs, Office documents, audio, and video into text.
#[derive(Parser)]
#[command(
    name = "intake",
    about = "Multi-format document ingestion: dedup, extraction, transcription, preview",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Built-in defaults when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Progress on stderr. Defaults to human when stderr is a terminal, off otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Process files and directories, then print the per-format listing.
    ///
    /// Directories are walked recursively; explicit files are always submitted.
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Glob filter for directory walks (repeatable). Defaults to all supported formats.
        #[arg(long)]
        include: Vec<String>,

        /// Print records as JSON instead of the listing.
        #[arg(long)]
        json: bool,
    },

    /// Process files, then answer a prompt over the corpus.
    Ask {
        prompt: String,

        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[arg(long)]
        include: Vec<String>,
    },

    /// Process one file and print its preview.
    Preview {
        file: PathBuf,

        /// Print a base64 `data:` URL for document and media previews.
        #[arg(long)]
        data_url: bool,
    },

    /// Generate shell completions.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "intake", &mut std::io::stdout());
        return Ok(());
    }

    init_tracing();

    let cfg = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    let progress = cli
        .progress
        .map(ProgressMode::from)
        .unwrap_or_else(ProgressMode::default_for_tty)
        .reporter();
    let session = Session::from_config(&cfg)?;

    match cli.command {
        Commands::Ingest {
            paths,
            include,
            json,
        } => {
            let reports = ingest_paths(&session, &paths, &include, progress.as_ref()).await?;
            let records = session.registry().records();
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                for report in &reports {
                    print_report(report);
                }
                println!();
                print!("{}", render_listing(&records, Utc::now()));
                print!("{}", render_summary(&session.registry().summary()));
            }
        }
        Commands::Ask {
            prompt,
            paths,
            include,
        } => {
            ingest_paths(&session, &paths, &include, progress.as_ref()).await?;
            println!("{}", session.answer(&prompt));
        }
        Commands::Preview { file, data_url } => {
            let reports = ingest_paths(&session, &[file], &[], progress.as_ref()).await?;
            let Some(report) = reports.first() else {
                bail!("Nothing to preview");
            };
            let payload = session.preview(&report.filename)?;
            print_preview(&report.filename, &payload, data_url);
        }
        Commands::Completions { .. } => unreachable!("handled before config loading"),
    }

    Ok(())
}

/// Submit every collected input in order, reporting progress as we go.
async fn ingest_paths(
    session: &Session,
    paths: &[PathBuf],
    include: &[String],
    progress: &dyn IngestProgressReporter,
) -> Result<Vec<SubmitReport>> {
    for path in paths {
        progress.report(IngestProgressEvent::Discovering {
            path: path.display().to_string(),
        });
    }
    let inputs = collect_inputs(paths, include)?;
    let files = inputs
        .iter()
        .map(|input| Ok((input.filename.clone(), input.read()?)))
        .collect::<Result<Vec<_>>>()?;
    Ok(session.submit_batch(files, progress).await)
}

fn print_report(report: &SubmitReport) {
    match (report.outcome, report.status) {
        (Outcome::DuplicateSkipped, _) => println!("skipped    {} (duplicate)", report.filename),
        (Outcome::Accepted, Some(status)) => println!("{:<10} {}", status, report.filename),
        (Outcome::Accepted, None) => println!("accepted   {}", report.filename),
    }
}

fn print_preview(filename: &str, payload: &PreviewPayload, data_url: bool) {
    if data_url {
        if let Some(url) = payload.data_url() {
            println!("{}", url);
            return;
        }
    }
    match payload {
        PreviewPayload::Text { excerpt, .. } => println!("{}", excerpt),
        PreviewPayload::Document { mime, bytes } => println!(
            "document  {}  {}  {}",
            display_name(filename),
            mime,
            format_bytes(bytes.len() as u64)
        ),
        PreviewPayload::Media { kind, mime, bytes } => {
            let kind = match kind {
                MediaKind::Audio => "audio",
                MediaKind::Video => "video",
            };
            println!(
                "{}  {}  {}  {}",
                kind,
                display_name(filename),
                mime,
                format_bytes(bytes.len() as u64)
            )
        }
    }
}

fn display_name(filename: &str) -> &str {
    Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename)
}
