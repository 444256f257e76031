//! Command-line interface for stegotriage.

use clap::{ArgAction, Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::{self, Config};
use crate::orchestrator::{AnalyzeOptions, Orchestrator, ProgressEvent};
use crate::report::{self, AnalysisReport};
use crate::tools::{Availability, ToolRegistry};

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_USAGE: i32 = 1;
pub const EXIT_TARGET_UNREADABLE: i32 = 2;
pub const EXIT_CANCELED: i32 = 3;

/// Steganography and forensics triage.
///
/// Runs the external analyzers available on this machine (zsteg, steghide,
/// outguess, exiftool, binwalk, foremost, strings, plus any configured ones)
/// against a file and merges their output into one report with a verdict.
#[derive(Parser)]
#[command(name = "stegotriage")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv); logs go to stderr
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze a file and print the report
    Analyze(AnalyzeArgs),
    /// Show which analyzers are available
    Tools(ToolsArgs),
}

/// Arguments for the analyze command.
#[derive(Parser)]
pub struct AnalyzeArgs {
    /// File to analyze
    pub path: PathBuf,

    /// Password passed to tools that accept one (steghide)
    #[arg(short, long)]
    pub password: Option<String>,

    /// Also write the JSON report to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Stream progress events and the report as JSON lines on stdout
    #[arg(long)]
    pub gui: bool,

    /// Output format: pretty or json
    #[arg(short, long, default_value = "pretty")]
    pub format: String,

    /// Path to configuration YAML file (default: auto-discover)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Run only these tools (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<String>,

    /// Per-tool timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Give up on the whole analysis after this many seconds
    #[arg(long)]
    pub deadline: Option<u64>,

    /// Number of tools to run at once
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Keep extracted artifacts under this directory
    #[arg(long)]
    pub artifacts_dir: Option<PathBuf>,

    /// Directory to search for tool binaries before PATH (repeatable)
    #[arg(long)]
    pub search_path: Vec<PathBuf>,
}

/// Arguments for the tools command.
#[derive(Parser)]
pub struct ToolsArgs {
    /// Path to configuration YAML file (default: auto-discover)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory to search for tool binaries before PATH (repeatable)
    #[arg(long)]
    pub search_path: Vec<PathBuf>,

    /// Output format: pretty or json
    #[arg(short, long, default_value = "pretty")]
    pub format: String,
}

/// Load and validate configuration, with command-line search paths first.
fn load_config(explicit: Option<&Path>, search_path: &[PathBuf]) -> anyhow::Result<Config> {
    let cwd = std::env::current_dir()?;
    let (mut config, source) = Config::load(explicit, &cwd)?;
    if let Some(source) = source {
        tracing::info!(path = %source.display(), "loaded configuration");
    }
    if !search_path.is_empty() {
        let mut dirs = search_path.to_vec();
        dirs.append(&mut config.search_path);
        config.search_path = dirs;
    }
    Ok(config)
}

fn validate_format(format: &str) -> bool {
    if format != "pretty" && format != "json" {
        eprintln!(
            "Error: invalid format {:?}, must be 'pretty' or 'json'",
            format
        );
        return false;
    }
    true
}

fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

/// Resolves when the user presses Ctrl-C.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        // no signal handling available: never cancel
        std::future::pending::<()>().await;
    }
}

/// A line of the `--gui` stream.
#[derive(Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
enum GuiLine<'a> {
    Report { report: &'a AnalysisReport },
    Error {
        message: String,
        #[serde(rename = "exitCode")]
        exit_code: i32,
    },
}

fn print_json_line<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{}", line),
        Err(e) => eprintln!("Error: cannot serialize event: {}", e),
    }
}

/// Consume progress events: JSON lines for `--gui`, a progress bar for pretty output.
async fn drain_progress(mut rx: mpsc::UnboundedReceiver<ProgressEvent>, gui: bool) {
    let mut bar: Option<ProgressBar> = None;
    while let Some(event) = rx.recv().await {
        if gui {
            print_json_line(&event);
            continue;
        }
        match event {
            ProgressEvent::Planned { tools, .. } => {
                let pb = ProgressBar::new(tools.len() as u64);
                pb.set_style(
                    ProgressStyle::default_bar()
                        .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_bar()),
                );
                pb.set_message(tools.join(", "));
                pb.enable_steady_tick(Duration::from_millis(100));
                bar = Some(pb);
            }
            ProgressEvent::ToolFinished { tool, status, .. } => {
                if let Some(pb) = &bar {
                    pb.inc(1);
                    pb.set_message(format!("{} {}", tool, status));
                }
            }
        }
    }
    if let Some(pb) = bar {
        pb.finish_and_clear();
    }
}

/// Run the analyze command.
pub fn run_analyze(args: &AnalyzeArgs) -> anyhow::Result<i32> {
    // Validate format
    if !validate_format(&args.format) {
        return Ok(EXIT_USAGE);
    }

    // Load configuration and apply command-line overrides
    let mut config = match load_config(args.config.as_deref(), &args.search_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_USAGE);
        }
    };
    if args.timeout.is_some() {
        config.timeout_secs = args.timeout;
    }
    if args.jobs.is_some() {
        config.concurrency = args.jobs;
    }
    if args.artifacts_dir.is_some() {
        config.artifacts_dir = args.artifacts_dir.clone();
    }
    if let Err(e) = config::validate(&config) {
        eprintln!("Error: {}", e);
        return Ok(EXIT_USAGE);
    }
    if args.deadline == Some(0) {
        eprintln!("Error: --deadline must be at least 1 second");
        return Ok(EXIT_USAGE);
    }

    let registry = match config.registry() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_USAGE);
        }
    };
    let orchestrator = Orchestrator::with_settings(registry, Arc::new(config.invoker()), config.settings());

    let mut options = AnalyzeOptions::default();
    if let Some(password) = &args.password {
        options = options.password(password.clone());
    }
    if !args.only.is_empty() {
        options = options.only_tools(args.only.iter().map(|s| s.trim().to_string()));
    }
    if let Some(secs) = args.deadline {
        options = options.deadline(Duration::from_secs(secs));
    }

    let show_progress = args.gui || args.format == "pretty";
    let (tx, rx) = mpsc::unbounded_channel();
    if show_progress {
        options = options.progress(tx);
    } else {
        drop(tx);
    }

    let rt = runtime()?;
    let result = rt.block_on(async {
        let consumer = tokio::spawn(drain_progress(rx, args.gui));
        let result = orchestrator
            .analyze_until(&args.path, options, interrupted())
            .await;
        // the sender went away with the options, so the consumer finishes
        let _ = consumer.await;
        result
    });

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            if args.gui {
                print_json_line(&GuiLine::Error {
                    message: e.to_string(),
                    exit_code: e.exit_code(),
                });
            }
            eprintln!("Error: {}", e);
            return Ok(e.exit_code());
        }
    };

    if let Some(output) = &args.output {
        report::save_json(&report, output)?;
    }

    // Output results
    if args.gui {
        print_json_line(&GuiLine::Report { report: &report });
    } else {
        match args.format.as_str() {
            "json" => report::write_json(&report)?,
            _ => report::write_pretty(&report),
        }
    }

    Ok(EXIT_SUCCESS)
}

/// One row of the `tools` listing.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolRow {
    name: String,
    available: bool,
    detail: String,
    file_kinds: Vec<String>,
}

fn tool_rows(registry: &ToolRegistry) -> Vec<ToolRow> {
    registry
        .tools()
        .iter()
        .map(|t| {
            let availability = registry.availability(&t.name).ok().flatten();
            ToolRow {
                name: t.name.clone(),
                available: availability.as_ref().map(Availability::is_available).unwrap_or(false),
                detail: availability
                    .map(|a| a.describe())
                    .unwrap_or_else(|| "not probed".to_string()),
                file_kinds: t.file_kinds.iter().map(|k| k.to_string()).collect(),
            }
        })
        .collect()
}

/// Run the tools command.
pub fn run_tools(args: &ToolsArgs) -> anyhow::Result<i32> {
    if !validate_format(&args.format) {
        return Ok(EXIT_USAGE);
    }

    let config = match load_config(args.config.as_deref(), &args.search_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_USAGE);
        }
    };
    let registry = match config.registry() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_USAGE);
        }
    };

    let invoker = config.invoker();
    runtime()?.block_on(registry.ensure_probed(&invoker));
    let rows = tool_rows(&registry);

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(EXIT_SUCCESS);
    }

    println!();
    println!("  {}", "Analyzers:".bold());
    for row in &rows {
        print!("    {:<12}", row.name);
        if row.available {
            print!("{}", "✓ ".green());
        } else {
            print!("{}", "✗ ".red());
        }
        print!("{}", row.detail.dimmed());
        if !row.file_kinds.is_empty() {
            print!("{}", format!("  [{}]", row.file_kinds.join(", ")).dimmed());
        }
        println!();
    }
    println!();

    let available = rows.iter().filter(|r| r.available).count();
    println!("  {}/{} analyzers available", available, rows.len());
    println!();

    Ok(EXIT_SUCCESS)
}
