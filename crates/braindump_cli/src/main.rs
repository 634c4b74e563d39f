//! BrainDump command-line entry point.
//!
//! # Responsibility
//! - Map subcommands onto `PlannerService` operations.
//! - Resolve the config file and start file logging before any work.
//!
//! # Invariants
//! - The CLI holds no business rules; every mutation goes through the core
//!   service.

use anyhow::{bail, Context, Result};
use braindump_core::{
    core_version, init_from_config, Bucket, DisplayStyle, Document, PlannerConfig,
    PlannerService, SummaryRange, Task,
};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "braindump.toml";

#[derive(Parser)]
#[command(name = "braindump")]
#[command(about = "Turn free-form brain dumps into a small daily plan", long_about = None)]
struct Cli {
    /// Config file; relative storage paths resolve against its directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the current document
    Show,
    /// Capture a dump and reconcile; reads stdin when no text is given
    Dump { text: Option<String> },
    /// Complete one task by id or title
    Complete {
        task: String,
        #[arg(long)]
        note: Option<String>,
    },
    /// Complete every Today task
    CompleteAll {
        #[arg(long)]
        include_can_skip: bool,
    },
    /// Drop every active task and the raw capture
    Clear,
    /// Set the display style (snarky, neutral, warm)
    Style { style: String },
    /// Print the done summary of a week or date range
    Summary(SummaryArgs),
    /// Manage document snapshots
    Snapshots {
        #[command(subcommand)]
        action: Option<SnapshotCommands>,
    },
    /// Print the core version
    Version,
}

#[derive(Args)]
struct SummaryArgs {
    /// Any date inside the wanted ISO week; defaults to today
    #[arg(long, conflicts_with_all = ["from", "to"])]
    week: Option<NaiveDate>,
    #[arg(long, requires = "to")]
    from: Option<NaiveDate>,
    #[arg(long, requires = "from")]
    to: Option<NaiveDate>,
}

#[derive(Subcommand)]
enum SnapshotCommands {
    /// List stored versions
    List,
    /// Store the current document
    Save,
    /// Replace the current document with a stored version
    Restore { version: u64 },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Version = cli.command {
        println!("braindump {}", core_version());
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    let service = PlannerService::open_from_config(&config)
        .context("failed to open the planner document")?;

    match cli.command {
        Commands::Show => print_document(&service.document()),
        Commands::Dump { text } => {
            let text = match text {
                Some(text) => text,
                None => {
                    let mut buffer = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buffer)
                        .context("failed to read dump from stdin")?;
                    buffer
                }
            };
            print_document(&service.submit_dump(&text)?);
        }
        Commands::Complete { task, note } => {
            let id = service.find_task(&task)?;
            print_document(&service.complete_task(id, note.as_deref())?);
        }
        Commands::CompleteAll { include_can_skip } => {
            print_document(&service.complete_all(include_can_skip)?);
        }
        Commands::Clear => print_document(&service.clear_all()?),
        Commands::Style { style } => {
            let Some(style) = DisplayStyle::parse(&style) else {
                bail!("unknown style `{style}`; expected snarky, neutral or warm");
            };
            service.set_display_style(style)?;
            println!("style set to {}", style.as_str());
        }
        Commands::Summary(args) => {
            let range = match (args.from, args.to) {
                (Some(from), Some(to)) => SummaryRange::new(from, to),
                _ => SummaryRange::iso_week_of(
                    args.week.unwrap_or_else(|| Utc::now().date_naive()),
                ),
            };
            print!("{}", service.get_summary(range)?.render_markdown());
        }
        Commands::Snapshots { action } => match action.unwrap_or(SnapshotCommands::List) {
            SnapshotCommands::List => {
                let snapshots = service.snapshots()?;
                if snapshots.is_empty() {
                    println!("No snapshots yet");
                }
                for meta in snapshots {
                    println!(
                        "{:>5}  {}  {}",
                        meta.version,
                        meta.created_at.format("%Y-%m-%d %H:%M:%S"),
                        meta.trigger
                    );
                }
            }
            SnapshotCommands::Save => {
                let meta = service.save_snapshot()?;
                println!("saved snapshot {}", meta.version);
            }
            SnapshotCommands::Restore { version } => {
                print_document(&service.restore_snapshot(version)?);
            }
        },
        Commands::Version => {}
    }

    Ok(())
}

/// Explicit `--config` must exist; the default file is optional.
fn load_config(path: Option<&Path>) -> Result<PlannerConfig> {
    let cwd = std::env::current_dir().context("failed to resolve current directory")?;
    let (path, required) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (cwd.join(DEFAULT_CONFIG_FILE), false),
    };

    let config = if required || path.exists() {
        PlannerConfig::load(&path)?
    } else {
        PlannerConfig::default()
    };
    let base_dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => cwd.join(parent),
        _ => cwd,
    };
    let config = config.rooted_at(&base_dir);

    if let Err(err) = init_from_config(&config.logging, &base_dir) {
        eprintln!("warning: file logging disabled: {err}");
    }
    Ok(config)
}

fn print_document(document: &Document) {
    if !document.raw().is_empty() {
        println!("{}\n", document.raw());
    }

    println!("Today ({}):", document.count(Bucket::Today));
    for (index, task) in document.bucket(Bucket::Today).enumerate() {
        println!("  {}. {} → {}", index + 1, task.title, task.first_step);
    }
    print_list(document, Bucket::CanSkip, "Can skip");
    print_list(document, Bucket::ExtraEnergy, "Extra energy");
    print_list(document, Bucket::Done, "Done");
}

fn print_list(document: &Document, bucket: Bucket, label: &str) {
    let tasks: Vec<&Task> = document.bucket(bucket).collect();
    if tasks.is_empty() {
        return;
    }
    println!("{label} ({}):", tasks.len());
    for task in tasks {
        match (&task.skip_reason, task.completed_at) {
            (_, Some(at)) => println!("  - {} ({})", task.title, at.format("%Y-%m-%d")),
            (Some(reason), None) if bucket == Bucket::CanSkip => {
                println!("  - {} — {reason}", task.title)
            }
            _ => println!("  - {}", task.title),
        }
    }
}
