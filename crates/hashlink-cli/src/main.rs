//! # hashlink CLI
//!
//! Replaces duplicate files in a directory tree with hardlinks into a
//! content-addressed store.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use console::Term;

use hashlink_config::logging::init_logging;
use hashlink_config::path::{ensure_same_volume, resolve_store_root, resolve_tree_root};
use hashlink_config::{
    log_cli_debug, log_cli_info, log_shrink_info, log_shrink_warn, Config, VerifySetting,
    Verbosity, MIN_MAX_LINKS,
};
use hashlink_store::{get_strategy, LinkStore, OperationMonitor, StoreInventory, VerifyMode};

mod progress;
mod report;
mod walker;

/// hashlink - hardlink deduplication through a content-addressed store
#[derive(Parser)]
#[command(name = "hashlink")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deduplicate a directory tree into the store
    Shrink(ShrinkArgs),

    /// Show what a store holds
    Stats {
        /// Store root directory
        #[arg(long, value_name = "DIR")]
        store: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Finish a transition an interrupted run left behind
    Recover {
        /// Store root directory
        #[arg(long, value_name = "DIR")]
        store: PathBuf,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Args, Debug)]
struct ShrinkArgs {
    /// Tree to deduplicate
    #[arg(value_name = "DIR")]
    directory: PathBuf,

    /// Store root (default: <DIR>/../hash)
    #[arg(long, value_name = "DIR")]
    store: Option<PathBuf>,

    /// Report what would happen without touching the disk
    #[arg(long)]
    dry_run: bool,

    /// How a slot hit is confirmed
    #[arg(long, value_enum)]
    verify: Option<VerifyArg>,

    /// Stop linking to one block after this many names
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(MIN_MAX_LINKS..))]
    max_links: Option<u64>,

    /// More output (repeatable)
    #[arg(short, long, action = ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Less output (repeatable); at the quietest level a live progress block is shown
    #[arg(short, long, action = ArgAction::Count)]
    quiet: u8,

    /// Print the final statistics as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum VerifyArg {
    /// Equal sizes are trusted
    Size,
    /// Equal sizes are confirmed byte by byte
    Content,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file locations
    Path,
}

fn verify_mode(setting: VerifySetting) -> VerifyMode {
    match setting {
        VerifySetting::Size => VerifyMode::Size,
        VerifySetting::Content => VerifyMode::Content,
    }
}

impl From<VerifyArg> for VerifySetting {
    fn from(arg: VerifyArg) -> Self {
        match arg {
            VerifyArg::Size => VerifySetting::Size,
            VerifyArg::Content => VerifySetting::Content,
        }
    }
}

fn main() -> ExitCode {
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = Config::load().context("Failed to load configuration")?;

    let verbosity = match &cli.command {
        Commands::Shrink(args) => config
            .logging
            .verbosity
            .shift(i32::from(args.verbose) - i32::from(args.quiet)),
        _ => config.logging.verbosity,
    };
    init_logging(verbosity);

    match cli.command {
        Commands::Shrink(args) => cmd_shrink(&config, verbosity, args),
        Commands::Stats { store, json } => cmd_stats(store, json),
        Commands::Recover { store } => cmd_recover(store),
        Commands::Config { command } => cmd_config(&config, command),
    }
}

fn cmd_shrink(config: &Config, verbosity: Verbosity, args: ShrinkArgs) -> Result<ExitCode> {
    let tree_root = resolve_tree_root(&args.directory)?;
    let configured = args.store.as_deref().or(config.store.root.as_deref());
    let store_root = resolve_store_root(&tree_root, configured)?;
    ensure_same_volume(&tree_root, &store_root)?;

    let dry_run = args.dry_run || config.shrink.dry_run;
    let verify = verify_mode(args.verify.map(Into::into).unwrap_or(config.shrink.verify));
    let max_links = args.max_links.or(config.shrink.max_links);

    log_cli_info!(
        "Shrinking tree",
        tree = tracing::field::display(tree_root.display()),
        store = tracing::field::display(store_root.display()),
        dry_run = dry_run
    );

    let mut monitor = OperationMonitor::new(dry_run, get_strategy(max_links));
    if verbosity.shows_progress() && !args.json && Term::stderr().is_term() {
        monitor = monitor.with_progress(
            Box::new(progress::ConsoleProgress::new(Term::stderr())),
            Duration::from_millis(config.progress.interval_ms),
        );
    }

    let mut store = LinkStore::with_monitor(&store_root, verify, monitor)
        .with_context(|| format!("Failed to open store: {}", store_root.display()))?;
    walker::walk(&tree_root, &store_root, &mut store);

    let elapsed = store.monitor().elapsed();
    let stats = store.finish();
    let elapsed_ms = elapsed.as_millis() as u64;
    log_shrink_info!(
        "Pass finished",
        processed_files = stats.processed_files,
        linked_files = stats.linked_files,
        elapsed_ms = elapsed_ms
    );
    if stats.has_failures() {
        log_shrink_warn!(
            "Pass finished with failures",
            collisions = stats.collisions,
            errors = stats.errors
        );
    }
    let summary = report::RunSummary {
        tree: tree_root,
        store: store_root,
        dry_run,
        elapsed_ms,
        stats,
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        report::print_summary(&summary);
    }

    Ok(if summary.stats.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn cmd_stats(store: PathBuf, json: bool) -> Result<ExitCode> {
    let inventory = StoreInventory::scan(&store)
        .with_context(|| format!("Failed to scan store: {}", store.display()))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&inventory)?);
    } else {
        report::print_inventory(&store, &inventory);
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_recover(store: PathBuf) -> Result<ExitCode> {
    let Some(entry) = LinkStore::pending(&store)? else {
        println!("Nothing to recover in {}", store.display());
        return Ok(ExitCode::SUCCESS);
    };
    log_cli_debug!(
        "Pending transition",
        source = tracing::field::display(entry.source.display())
    );

    // Opening a store replays its journal.
    let opened = LinkStore::open(&store, Default::default())
        .with_context(|| format!("Failed to recover store: {}", store.display()))?;
    let stats = opened.finish();
    println!("Recovered {}", entry.source.display());
    if stats.linked_files == 0 && stats.copied_files == 0 {
        println!("  (source was already in place)");
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_config(config: &Config, command: ConfigCommands) -> Result<ExitCode> {
    match command {
        ConfigCommands::Show => {
            print!("{}", config.to_toml()?);
        }
        ConfigCommands::Path => {
            match Config::global_config_path() {
                Some(p) => println!("global:  {}", p.display()),
                None => println!("global:  (no home directory)"),
            }
            println!("project: {}", Config::project_config_path().display());
        }
    }
    Ok(ExitCode::SUCCESS)
}
