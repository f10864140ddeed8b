//! pdf-resilience - Entry point
//!
//! Parses PDFs and scans directories for them, printing JSON to stdout.

use clap::{Parser, Subcommand};
use pdf_resilience::{Config, ProcessingService};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Fault-tolerant PDF parsing and bounded PDF discovery
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// JSON configuration file; flags below override its values
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a PDF and report errors, warnings and recoveries
    Parse {
        /// Path to the PDF file
        file: PathBuf,

        /// Treat any unrecovered page error as fatal
        #[arg(long)]
        strict: bool,

        /// Parse timeout in milliseconds (0 disables it)
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Count corrupted pages instead of skipping them
        #[arg(long)]
        keep_corrupted_pages: bool,

        /// Print only the human-readable error summary
        #[arg(long)]
        summary: bool,
    },

    /// List PDF files under a directory
    Scan {
        /// Directory to scan
        dir: PathBuf,

        /// Maximum directory depth, root being 0
        #[arg(long)]
        max_depth: Option<usize>,

        /// Maximum number of files returned
        #[arg(long)]
        max_files: Option<usize>,

        /// Time budget in milliseconds
        #[arg(long)]
        max_elapsed_ms: Option<u64>,

        /// Filename glob, e.g. "report*.pdf"
        #[arg(long)]
        pattern: Option<String>,

        /// Include hidden files and directories
        #[arg(long)]
        include_hidden: bool,

        /// Follow symbolic links
        #[arg(long)]
        follow_symlinks: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pdf_resilience=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => Config::from_json_file(path)?,
        None => Config::default(),
    };

    match cli.command {
        Command::Parse {
            file,
            strict,
            timeout_ms,
            keep_corrupted_pages,
            summary,
        } => {
            config.parse.strict_mode |= strict;
            if let Some(timeout_ms) = timeout_ms {
                config.parse.timeout_ms = timeout_ms;
            }
            if keep_corrupted_pages {
                config.parse.skip_corrupted_pages = false;
            }

            let service = ProcessingService::new(config)?;
            let result = service.parse_file(&file).await?;
            if summary {
                println!("{}", result.error_summary());
            } else {
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
            if !result.success {
                std::process::exit(1);
            }
        }
        Command::Scan {
            dir,
            max_depth,
            max_files,
            max_elapsed_ms,
            pattern,
            include_hidden,
            follow_symlinks,
        } => {
            let scan = &mut config.scan;
            scan.max_depth = max_depth.or(scan.max_depth);
            scan.max_files = max_files.or(scan.max_files);
            scan.max_elapsed_ms = max_elapsed_ms.or(scan.max_elapsed_ms);
            scan.pattern = pattern.or(scan.pattern.take());
            scan.skip_hidden &= !include_hidden;
            scan.follow_symlinks |= follow_symlinks;

            let service = ProcessingService::new(config)?;
            let cancel = CancellationToken::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("interrupted, returning partial results");
                    ctrl_c.cancel();
                }
            });

            let result = service.list_files(&dir, cancel).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}
