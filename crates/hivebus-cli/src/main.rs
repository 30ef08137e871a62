//! hivebus: command-line access to topic files and run history.
//!
//! This CLI provides:
//! - Watching a topic directory and printing change notifications
//! - Publishing and reading topic documents
//! - Recording and querying the run history

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hivebus::{Config, HistoryStore, TopicDir, TopicWatcher};
use serde::Serialize;

mod records;

use records::RunRecord;

/// Exit codes for the CLI
///
/// - 0: Success
/// - 1: Not found (valid query, no results)
/// - 2: Error (invalid input, unreadable file, etc.)
mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const NOT_FOUND: u8 = 1;
    pub const ERROR: u8 = 2;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
    Text,
}

/// File-backed topic notifications and run history
#[derive(Parser)]
#[command(name = "hivebus")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project root holding `.hivebus.toml` (defaults to current directory)
    #[arg(short, long, global = true, default_value = ".")]
    root: PathBuf,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,

    /// Suppress progress output
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a line for every topic change until interrupted
    Watch {
        /// Topic pattern: "*", "prefix.*", or an exact topic name
        #[arg(default_value = "*")]
        pattern: String,

        /// Exit after this many notifications
        #[arg(short, long)]
        count: Option<usize>,
    },

    /// Atomically replace a topic's JSON document
    Publish {
        /// Topic name, e.g. "agents/test" or "hive.session.created"
        topic: String,

        /// JSON document to store
        json: String,
    },

    /// Print a topic's current JSON document
    Read {
        /// Topic name
        topic: String,
    },

    /// List topics present in the topic directory
    Topics,

    /// Query or modify the run history
    History {
        #[command(subcommand)]
        command: HistoryCommand,
    },
}

#[derive(Subcommand)]
enum HistoryCommand {
    /// List runs, newest first
    List,

    /// Show one run by id
    Get {
        /// Run identifier
        id: String,
    },

    /// Show the most recent failed run
    LastFailed,

    /// Record a run as the newest entry
    Record {
        /// Run identifier
        id: String,

        /// Mark the run as failed
        #[arg(long)]
        failed: bool,

        /// Short description of the run
        #[arg(long)]
        summary: Option<String>,
    },

    /// Remove all runs
    Clear,
}

fn main() -> ExitCode {
    // Initialize logging on stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    let format = cli.format;

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            if format == OutputFormat::Json {
                let error_json = serde_json::json!({
                    "error": "CommandFailed",
                    "message": format!("{:#}", e),
                });
                eprintln!("{}", error_json);
            } else {
                eprintln!("Error: {:#}", e);
            }
            ExitCode::from(exit_codes::ERROR)
        }
    }
}

fn run(cli: Cli) -> Result<u8> {
    let root = cli
        .root
        .canonicalize()
        .with_context(|| format!("Failed to resolve root directory {}", cli.root.display()))?;
    let config = Config::load(&root);
    let ctx = Workspace {
        root: &root,
        config: &config,
        format: cli.format,
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Watch { pattern, count } => cmd_watch(&ctx, &pattern, count),
        Commands::Publish { topic, json } => cmd_publish(&ctx, &topic, &json),
        Commands::Read { topic } => cmd_read(&ctx, &topic),
        Commands::Topics => cmd_topics(&ctx),
        Commands::History { command } => cmd_history(&ctx, command),
    }
}

/// Settings shared by every command
struct Workspace<'a> {
    root: &'a Path,
    config: &'a Config,
    format: OutputFormat,
    quiet: bool,
}

impl Workspace<'_> {
    fn topic_dir(&self) -> TopicDir {
        TopicDir::new(self.config.topics_path(self.root))
    }

    fn history(&self) -> HistoryStore<RunRecord> {
        HistoryStore::new(self.config.history_path(self.root))
    }

    /// Print a value in the selected format. `text` renders the Text format.
    fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce() -> String) -> Result<()> {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string(value)?),
            OutputFormat::Pretty => println!("{}", serde_json::to_string_pretty(value)?),
            OutputFormat::Text => println!("{}", text()),
        }
        Ok(())
    }
}

/// Watch the topic directory and print notifications
fn cmd_watch(ctx: &Workspace<'_>, pattern: &str, count: Option<usize>) -> Result<u8> {
    let topics_path = ctx.config.topics_path(ctx.root);
    let watcher = Arc::new(
        TopicWatcher::with_options(&topics_path, ctx.config.watcher_options())
            .context("Failed to start topic watcher")?,
    );
    let subscription = watcher.watch(pattern).context("Failed to subscribe")?;

    let on_interrupt = watcher.clone();
    ctrlc::set_handler(move || on_interrupt.close())
        .context("Failed to install Ctrl+C handler")?;

    if !ctx.quiet {
        eprintln!(
            "Watching {} for {:?}... (Ctrl+C to stop)",
            topics_path.display(),
            pattern
        );
    }

    let mut seen = 0;
    let mut stdout = std::io::stdout();
    for event in subscription.iter() {
        match ctx.format {
            OutputFormat::Text => {
                writeln!(stdout, "{} {}", event.timestamp.to_rfc3339(), event.topic)?
            }
            _ => writeln!(stdout, "{}", serde_json::to_string(&event)?)?,
        }
        stdout.flush()?;

        seen += 1;
        if count.is_some_and(|n| seen >= n) {
            break;
        }
    }

    watcher.close();
    Ok(exit_codes::SUCCESS)
}

/// Publish a topic document
fn cmd_publish(ctx: &Workspace<'_>, topic: &str, json: &str) -> Result<u8> {
    let value: serde_json::Value =
        serde_json::from_str(json).context("Topic document is not valid JSON")?;

    let dir = TopicDir::create(ctx.config.topics_path(ctx.root))?;
    dir.publish(topic, &value)
        .with_context(|| format!("Failed to publish topic {}", topic))?;

    if !ctx.quiet {
        eprintln!("Published {} to {}", topic, dir.path_for(topic).display());
    }
    Ok(exit_codes::SUCCESS)
}

/// Print a topic document
fn cmd_read(ctx: &Workspace<'_>, topic: &str) -> Result<u8> {
    let dir = ctx.topic_dir();
    match dir.read::<serde_json::Value>(topic)? {
        Some(value) => {
            ctx.emit(&value, || value.to_string())?;
            Ok(exit_codes::SUCCESS)
        }
        None => {
            if !ctx.quiet {
                eprintln!("Topic not found: {}", topic);
            }
            Ok(exit_codes::NOT_FOUND)
        }
    }
}

/// List topics
fn cmd_topics(ctx: &Workspace<'_>) -> Result<u8> {
    let topics = ctx.topic_dir().topics()?;
    ctx.emit(&topics, || topics.join("\n"))?;
    Ok(exit_codes::SUCCESS)
}

fn cmd_history(ctx: &Workspace<'_>, command: HistoryCommand) -> Result<u8> {
    let history = ctx.history();

    match command {
        HistoryCommand::List => {
            let runs = history.list().context("Failed to read run history")?;
            ctx.emit(&runs, || {
                runs.iter().map(format_run).collect::<Vec<_>>().join("\n")
            })?;
            Ok(exit_codes::SUCCESS)
        }
        HistoryCommand::Get { id } => {
            let run = history.get(&id).context("Failed to read run history")?;
            emit_run(ctx, run, &format!("Run not found: {}", id))
        }
        HistoryCommand::LastFailed => {
            let run = history.last_failed().context("Failed to read run history")?;
            emit_run(ctx, run, "No failed runs")
        }
        HistoryCommand::Record {
            id,
            failed,
            summary,
        } => {
            let record = RunRecord::new(id, summary, failed);
            history
                .save(record.clone(), ctx.config.history_max_entries)
                .context("Failed to save run history")?;
            ctx.emit(&record, || format_run(&record))?;
            Ok(exit_codes::SUCCESS)
        }
        HistoryCommand::Clear => {
            history.clear().context("Failed to clear run history")?;
            if !ctx.quiet {
                eprintln!("Cleared {}", history.path().display());
            }
            Ok(exit_codes::SUCCESS)
        }
    }
}

fn emit_run(ctx: &Workspace<'_>, run: Option<RunRecord>, missing: &str) -> Result<u8> {
    match run {
        Some(run) => {
            ctx.emit(&run, || format_run(&run))?;
            Ok(exit_codes::SUCCESS)
        }
        None => {
            if !ctx.quiet {
                eprintln!("{}", missing);
            }
            Ok(exit_codes::NOT_FOUND)
        }
    }
}

fn format_run(run: &RunRecord) -> String {
    let status = if run.failed { "FAILED" } else { "ok" };
    match &run.summary {
        Some(summary) => format!(
            "{} {} {} {}",
            run.recorded_at.to_rfc3339(),
            status,
            run.id,
            summary
        ),
        None => format!("{} {} {}", run.recorded_at.to_rfc3339(), status, run.id),
    }
}
