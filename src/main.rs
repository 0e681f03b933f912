//! # parsedoc CLI
//!
//! Runs the extraction pipeline on local files or serves it over HTTP.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `parsedoc parse <FILE>` | Extract text from a file |
//! | `parsedoc classify <FILE>` | Print the detected document kind |
//! | `parsedoc serve` | Start the HTTP server |
//! | `parsedoc completions <SHELL>` | Print shell completions |
//!
//! ## Examples
//!
//! ```bash
//! # Extract a resume, printing the HTTP-shaped JSON body
//! parsedoc parse ./cv.pdf --json
//!
//! # Treat an extensionless upload as a PDF
//! parsedoc parse ./upload --mime application/pdf
//!
//! # Serve POST /api/parse-doc
//! parsedoc serve --config ./config/parsedoc.toml
//! ```

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use parsedoc::classify::{classify, guess_mime};
use parsedoc::config::{self, Config};
use parsedoc::extract::Extractor;
use parsedoc::models::{ExtractionResult, SourceDocument};
use parsedoc::server;

/// Document text extraction: TXT, RTF, DOCX, PDF text layers, and OCR for
/// scanned PDFs and images.
#[derive(Parser)]
#[command(name = "parsedoc", version)]
struct Cli {
    /// Path to configuration file (TOML). Defaults apply when it is missing.
    #[arg(long, global = true, default_value = "./config/parsedoc.toml")]
    config: PathBuf,

    /// Debug logging, and print every extraction attempt.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract text from a file.
    ///
    /// Exits non-zero, printing a hint to stderr, when no text could be
    /// extracted.
    Parse {
        file: PathBuf,

        /// Declared MIME type. Guessed from the extension when omitted.
        #[arg(long)]
        mime: Option<String>,

        /// Print the same JSON body the HTTP endpoint returns.
        #[arg(long)]
        json: bool,
    },

    /// Print the document kind a file would be handled as.
    Classify {
        file: PathBuf,

        #[arg(long)]
        mime: Option<String>,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Print shell completions.
    Completions {
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "parsedoc", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = if cli.config.exists() {
        config::load_config(&cli.config)?
    } else {
        tracing::debug!(path = %cli.config.display(), "config file not found, using defaults");
        Config::minimal()
    };

    match cli.command {
        Commands::Parse { file, mime, json } => {
            run_parse(&cfg, &file, mime, json, cli.verbose).await?;
        }
        Commands::Classify { file, mime } => {
            let name = file_name(&file);
            let mime = mime.unwrap_or_else(|| guess_mime(&name).to_string());
            println!("{}", classify(&name, &mime));
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "parsedoc=debug,tower_http=debug"
    } else {
        "parsedoc=info,tower_http=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

async fn run_parse(
    cfg: &Config,
    file: &Path,
    mime: Option<String>,
    json: bool,
    verbose: bool,
) -> anyhow::Result<()> {
    let bytes = std::fs::read(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let name = file_name(file);
    let mime = mime.unwrap_or_else(|| guess_mime(&name).to_string());

    let extractor = Extractor::from_config(cfg);
    let result = extractor
        .extract(&SourceDocument::new(name, mime, bytes))
        .await;

    if verbose {
        print_attempts(&result);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&json_body(&result))?);
    } else if result.is_success() {
        println!("{}", result.text);
    }

    if !result.is_success() {
        if let Some(hint) = &result.hint {
            eprintln!("{}", hint);
        }
        anyhow::bail!("no text could be extracted from {}", file.display());
    }
    Ok(())
}

fn print_attempts(result: &ExtractionResult) {
    eprintln!("kind: {}", result.meta.kind);
    for (i, attempt) in result.attempts.iter().enumerate() {
        eprintln!(
            "  {}. {:<10} {:>7} chars{}",
            i + 1,
            attempt.strategy.as_str(),
            attempt.result_text.chars().count(),
            if attempt.used_ocr { "  (ocr)" } else { "" }
        );
    }
}

/// The body `POST /api/parse-doc` would return.
fn json_body(result: &ExtractionResult) -> serde_json::Value {
    if result.is_success() {
        serde_json::json!({
            "text": result.text,
            "meta": {
                "filename": result.meta.filename,
                "mime": result.meta.mime_type,
                "length": result.meta.length,
                "ocr": result.meta.used_ocr,
            }
        })
    } else {
        serde_json::json!({
            "error": "Failed to parse document",
            "hint": result.hint,
        })
    }
}
