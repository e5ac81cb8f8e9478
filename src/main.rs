//! # Loss Ledger CLI (`ledger`)
//!
//! The `ledger` binary turns a saved loss report snapshot into a dated
//! record store. It extracts records, reconciles them with the existing
//! store, and resolves missing event dates with incremental saves.
//!
//! ## Usage
//!
//! ```bash
//! ledger --config ./config/ledger.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ledger extract` | Parse the report snapshot and merge it into the store |
//! | `ledger resolve` | Resolve missing dates for stored records |
//! | `ledger run` | Extract, merge, and resolve in one pass |
//! | `ledger stats` | Summarize date coverage per link type and year |
//! | `ledger validate` | Report stored dates that fail validation |
//!
//! ## Examples
//!
//! ```bash
//! # See what the current snapshot would add
//! ledger extract --dry-run
//!
//! # Resolve at most 50 records
//! ledger resolve --limit 50
//!
//! # Give previously exhausted records another try
//! ledger resolve --retry-exhausted
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use loss_ledger::progress::ProgressMode;
use loss_ledger::{config, pipeline, stats, validate};

/// Loss Ledger: extract loss records from a report snapshot and resolve
/// their event dates.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Every key has a default.
#[derive(Parser)]
#[command(
    name = "ledger",
    about = "Loss Ledger: extract loss records and resolve their event dates",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ledger.toml")]
    config: PathBuf,

    /// Progress output on stderr. Defaults to human on a TTY, otherwise off.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Human,
    Json,
    Off,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
            ProgressArg::Off => ProgressMode::Off,
        }
    }
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Parse the report snapshot and merge new records into the store.
    ///
    /// Existing dates and manual locks are carried forward; records that
    /// disappeared from the report are kept.
    Extract {
        /// Show counts without writing the store.
        #[arg(long)]
        dry_run: bool,
    },

    /// Resolve missing dates for stored records.
    ///
    /// Tries the filename, platform ID, and image text resolvers in order,
    /// saving the store after every batch.
    Resolve {
        /// Retry only records previously marked as exhausted.
        #[arg(long)]
        retry_exhausted: bool,

        /// Attempt at most this many records.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Extract, merge, and resolve in one pass.
    Run {
        /// Retry only records previously marked as exhausted.
        #[arg(long)]
        retry_exhausted: bool,

        /// Attempt at most this many records.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show store statistics.
    Stats,

    /// Report stored dates that fail format, day, month, or year checks.
    ///
    /// Exits with status 1 if any are found.
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    let mode = cli
        .progress
        .map(ProgressMode::from)
        .unwrap_or_else(ProgressMode::default_for_tty);
    let progress = mode.reporter();

    match cli.command {
        Commands::Extract { dry_run } => {
            pipeline::run_extract(&cfg, dry_run, progress.as_ref()).await?;
        }
        Commands::Resolve {
            retry_exhausted,
            limit,
        } => {
            pipeline::run_resolve(&cfg, retry_exhausted, limit, progress.as_ref()).await?;
        }
        Commands::Run {
            retry_exhausted,
            limit,
        } => {
            pipeline::run_pipeline(&cfg, retry_exhausted, limit, progress.as_ref()).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg)?;
        }
        Commands::Validate => {
            if !validate::run_validate(&cfg)? {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
