//! # driftcheck CLI (`drift`)
//!
//! The `drift` binary is the command-line interface to the continuity
//! engine: store initialization, corpus indexing, continuity checks,
//! similar-passage lookup, stats, and clearing.
//!
//! ## Usage
//!
//! ```bash
//! drift --config ./driftcheck.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `drift init` | Create the data directory and local store schema |
//! | `drift index <dir>` | Index every matching document under a directory |
//! | `drift check [file]` | Check a new passage (file or stdin) for continuity |
//! | `drift similar [file]` | List indexed passages similar to the input |
//! | `drift stats` | Show store backend and entry counts |
//! | `drift clear` | Delete all indexed paragraphs |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;

use driftcheck::config::load_config;
use driftcheck::engine::ContinuityEngine;
use driftcheck::models::ReportStatus;

/// driftcheck — a continuity engine for long-form writing.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `driftcheck.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "drift",
    about = "driftcheck — detect semantic drift and contradiction against your own corpus",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./driftcheck.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and local store.
    ///
    /// Idempotent — running it multiple times is safe. The remote backend
    /// needs no initialization; its index is created on first connect.
    Init,

    /// Index every matching document under a directory.
    ///
    /// Extracts paragraphs, computes embeddings, and upserts them into the
    /// configured store. Per-file failures are reported but never abort
    /// the pass. A missing directory is created and reported as waiting
    /// for content.
    Index {
        /// Directory containing draft documents (raw text / markdown).
        dir: PathBuf,
    },

    /// Check a new passage against the indexed corpus.
    ///
    /// Reads the passage from a file, or from stdin when no file is given.
    /// Prints a compact summary by default.
    Check {
        /// File containing the new passage. Omit to read stdin.
        file: Option<PathBuf>,

        /// Print the full consistency report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List indexed passages similar to the input.
    Similar {
        /// File containing the passage. Omit to read stdin.
        file: Option<PathBuf>,

        /// Maximum number of results.
        #[arg(long, default_value_t = 5)]
        limit: usize,

        /// Minimum similarity (0–1). Defaults to the configured threshold.
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Show store backend and entry counts.
    Stats,

    /// Delete all indexed paragraphs.
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("driftcheck=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    let engine = ContinuityEngine::from_config(config).await?;

    match cli.command {
        Commands::Init => {
            let stats = engine.stats().await?;
            println!("init");
            println!("  backend: {}", stats.backend);
            if let Some(path) = &stats.storage_path {
                println!("  storage: {}", path);
            }
            println!("ok");
        }

        Commands::Index { dir } => {
            let report = engine.index_corpus(&dir).await?;
            println!("index {}", dir.display());
            if report.waiting_for_content {
                println!("  no documents found — waiting for content");
                return Ok(());
            }
            println!("  files indexed: {}", report.total_files);
            println!("  paragraphs: {}", report.total_paragraphs);
            println!("  words: {}", report.total_words);
            for file in &report.files {
                match &file.error {
                    Some(error) => println!("  {} — skipped: {}", file.filename, error),
                    None => println!(
                        "  {} — {} paragraphs, {} words",
                        file.filename, file.paragraphs, file.words
                    ),
                }
            }
            println!("{}", if report.success { "ok" } else { "nothing indexed" });
        }

        Commands::Check { file, json } => {
            let text = read_input(file.as_deref())?;
            if json {
                let report = engine.check_continuity(&text).await;
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                let summary = engine.check_continuity_for_ui(&text).await;
                print_summary(&summary);
            }
        }

        Commands::Similar {
            file,
            limit,
            threshold,
        } => {
            let text = read_input(file.as_deref())?;
            let sections = engine.find_similar(&text, limit, threshold).await?;
            if sections.is_empty() {
                println!("No similar passages.");
                return Ok(());
            }
            for (i, section) in sections.iter().enumerate() {
                println!(
                    "{}. [{:.3}] {} (paragraph {})",
                    i + 1,
                    section.similarity,
                    section.source_file,
                    section.paragraph_index
                );
                println!("    \"{}\"", snippet(&section.text));
            }
        }

        Commands::Stats => {
            let stats = engine.stats().await?;
            println!("backend: {}", stats.backend);
            println!("entries: {}", stats.total_entries);
            println!("metric: {}", stats.metric);
            if let Some(path) = &stats.storage_path {
                println!("storage: {}", path);
            }
            if let Some(index) = &stats.index {
                println!("index: {}", index);
            }
            if let Some(dims) = stats.dims {
                println!("dims: {}", dims);
            }
        }

        Commands::Clear => {
            engine.clear().await?;
            println!("cleared");
        }
    }

    Ok(())
}

fn read_input(file: Option<&std::path::Path>) -> Result<String> {
    match file {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

fn print_summary(summary: &driftcheck::report::UiSummary) {
    match summary.status {
        ReportStatus::Error => {
            if let Some(error) = &summary.error {
                println!("error: {}", error.message);
            } else {
                println!("error");
            }
            return;
        }
        ReportStatus::Consistent => println!("consistent"),
        ReportStatus::IssuesFound => println!("issues found"),
        ReportStatus::CriticalIssues => println!("critical issues"),
    }

    println!("  score: {} ({})", summary.score, summary.score_label);
    if let Some(avg) = summary.avg_similarity_percent {
        println!("  avg similarity: {:.1}%", avg);
    }
    if !summary.summary.is_empty() {
        println!("  {}", summary.summary);
    }

    for issue in summary
        .issues
        .high
        .iter()
        .chain(&summary.issues.medium)
        .chain(&summary.issues.low)
    {
        println!(
            "  [{}] {}: {}",
            severity_tag(issue),
            issue_kind_tag(issue),
            issue.recommendation
        );
    }

    if let Some(warning) = &summary.low_consistency_warning {
        println!("  warning: {}", warning.message);
    }
}

fn severity_tag(issue: &driftcheck::models::Issue) -> &'static str {
    match issue.severity {
        driftcheck::models::Severity::High => "high",
        driftcheck::models::Severity::Medium => "medium",
        driftcheck::models::Severity::Low => "low",
    }
}

fn issue_kind_tag(issue: &driftcheck::models::Issue) -> &'static str {
    match issue.kind {
        driftcheck::models::IssueKind::Contradiction => "contradiction",
        driftcheck::models::IssueKind::TerminologyShift => "terminology shift",
        driftcheck::models::IssueKind::Inconsistency => "inconsistency",
    }
}

fn snippet(text: &str) -> String {
    let flat = text.replace('\n', " ");
    let mut out: String = flat.chars().take(120).collect();
    if flat.chars().count() > 120 {
        out.push('…');
    }
    out
}
