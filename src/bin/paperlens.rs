//! CLI binary for paperlens.
//!
//! A thin shim over the library crate: `serve` runs the HTTP API, `analyze`
//! runs one paper through the same task machinery and writes the artifacts,
//! `inspect` prints PDF metadata without touching a model provider.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use paperlens::server::{self, AppState};
use paperlens::{
    AppConfig, MemoryTaskStore, NoteRenderer, PdfExtractor, PdfiumExtractor, ProviderKind,
    TaskCoordinator, TaskOptions, TaskStatus,
};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the HTTP API on port 8000
  paperlens serve

  # Analyse one paper into ./outputs, English content, no translation
  paperlens analyze attention.pdf --lang en --no-translate

  # Skip the note image
  paperlens analyze paper.pdf --no-image

  # Inspect PDF metadata (no API key needed)
  paperlens inspect paper.pdf

ENVIRONMENT VARIABLES:
  PAPERLENS_PROVIDER      openai (default) or dashscope
  OPENAI_API_KEY          OpenAI-compatible API key
  OPENAI_BASE_URL         OpenAI-compatible endpoint
  DASHSCOPE_API_KEY       DashScope API key
  PAPERLENS_TEXT_MODEL    Override the text model
  PAPERLENS_VISION_MODEL  Override the vision model
  PAPERLENS_MAX_PAGES     Page ceiling for uploads (default 100)
  PAPERLENS_NOTE_TEMPLATE HTML template for the note image
  PDFIUM_LIB_PATH         Directory or file of an existing libpdfium

  A .env file in the working directory is loaded first.
"#;

/// Analyse research papers with multimodal LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "paperlens",
    version,
    about = "Analyse research-paper PDFs with multimodal LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Model provider: openai or dashscope.
    #[arg(long, global = true)]
    provider: Option<ProviderKind>,

    /// Text model override.
    #[arg(long, global = true)]
    text_model: Option<String>,

    /// Vision model override.
    #[arg(long, global = true)]
    vision_model: Option<String>,

    /// Directory for generated artifacts.
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PAPERLENS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PAPERLENS_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API.
    Serve {
        #[arg(long, env = "PAPERLENS_HOST", default_value = "0.0.0.0")]
        host: String,

        #[arg(long, env = "PAPERLENS_PORT", default_value_t = 8000)]
        port: u16,
    },

    /// Analyse one PDF and write the article, note and note image.
    Analyze {
        /// Local PDF file.
        input: PathBuf,

        /// Content language: zh or en.
        #[arg(long, default_value = "zh")]
        lang: String,

        /// Keep key facts in the source language.
        #[arg(long)]
        no_translate: bool,

        #[arg(long)]
        no_article: bool,

        #[arg(long)]
        no_note: bool,

        #[arg(long)]
        no_image: bool,

        /// Disable progress bar.
        #[arg(long, env = "PAPERLENS_NO_PROGRESS")]
        no_progress: bool,
    },

    /// Print PDF metadata only.
    Inspect {
        input: PathBuf,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let mut config = AppConfig::from_env().context("Invalid configuration")?;
    if let Some(p) = cli.provider {
        config.provider = p;
    }
    if let Some(m) = cli.text_model {
        config.text_model = Some(m);
    }
    if let Some(m) = cli.vision_model {
        config.vision_model = Some(m);
    }
    if let Some(d) = cli.output_dir {
        config.output_dir = d;
    }

    match cli.command {
        Command::Serve { host, port } => {
            let addr: SocketAddr = format!("{host}:{port}")
                .parse()
                .with_context(|| format!("Invalid listen address {host}:{port}"))?;
            let state = AppState::from_config(config)?;
            server::serve(state, addr).await?;
        }
        Command::Inspect { input, json } => {
            let meta = PdfiumExtractor::new(config.max_image_dim)
                .metadata(&input)
                .await;
            if json {
                println!("{}", serde_json::to_string_pretty(&meta)?);
            } else {
                let row = |k: &str, v: &str| {
                    if !v.is_empty() {
                        println!("{:<10} {}", dim(k), v);
                    }
                };
                row("title", &meta.title);
                row("author", &meta.author);
                row("subject", &meta.subject);
                row("creator", &meta.creator);
                row("producer", &meta.producer);
                row("created", &meta.creation_date);
                row("modified", &meta.modification_date);
                println!("{:<10} {}", dim("pages"), meta.page_count);
                if let Some(e) = &meta.error {
                    println!("{:<10} {}", dim("error"), red(e));
                }
            }
        }
        Command::Analyze {
            input,
            lang,
            no_translate,
            no_article,
            no_note,
            no_image,
            no_progress,
        } => {
            anyhow::ensure!(input.exists(), "File not found: {}", input.display());
            config.ensure_dirs().await?;

            let options = TaskOptions {
                translate: !no_translate,
                target_lang: lang,
                generate_article: !no_article,
                generate_note: !no_note,
                generate_image: !no_image,
            };
            let show_progress = !cli.quiet && !no_progress;
            analyze(config, input, options, show_progress).await?;
        }
    }

    Ok(())
}

async fn analyze(
    config: AppConfig,
    input: PathBuf,
    options: TaskOptions,
    show_progress: bool,
) -> Result<()> {
    let gateway = paperlens::build_gateway(&config)?;
    let extractor = Arc::new(PdfiumExtractor::new(config.max_image_dim));
    let renderer = NoteRenderer::from_config(&config);
    let coordinator = Arc::new(TaskCoordinator::new(
        Arc::new(config),
        Arc::new(MemoryTaskStore::new()),
        extractor,
        gateway,
        renderer,
    ));

    let task_id = coordinator.create();
    coordinator
        .start(&task_id, input.clone(), options)
        .context("Failed to start analysis")?;

    let bar = if show_progress {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}%  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Analysing");
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    } else {
        ProgressBar::hidden()
    };

    let task = loop {
        let task = coordinator.status(&task_id)?;
        bar.set_position(task.progress as u64);
        bar.set_message(task.message.clone());
        if task.status.is_terminal() {
            break task;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    };
    bar.finish_and_clear();

    if task.status == TaskStatus::Failed {
        anyhow::bail!("{}: {}", input.display(), task.message);
    }

    let result = coordinator.result(&task_id)?;
    eprintln!(
        "{} {} ({} pages)",
        green("✔"),
        bold(if result.analysis.key_info.title.is_empty() {
            &result.analysis.metadata.title
        } else {
            &result.analysis.key_info.title
        }),
        result.analysis.num_pages
    );
    let analysis_path = coordinator
        .config()
        .artifact_path(&task_id, paperlens::Artifact::Analysis);
    for (label, path) in [
        ("analysis", Some(&analysis_path)),
        ("article", result.article_path.as_ref()),
        ("note", result.note_path.as_ref()),
        ("image", result.image_path.as_ref()),
    ] {
        if let Some(path) = path {
            eprintln!("  {:<9} {}", dim(label), path.display());
        }
    }
    Ok(())
}
