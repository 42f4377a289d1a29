//! # cachet-cli
//!
//! Restore and save build caches from CI jobs.
//!
//! This is the entry point of the `cachet` binary. It parses the command
//! line, sets up logging and dispatches to the command handlers. Cache
//! misses and failed saves never fail the process; only invalid input and
//! broken configuration do.

use std::process::ExitCode;

use anyhow::Context;
use cachet_core::error::CacheError;
use clap::{Args, Parser, Subcommand};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::CommandContext;
use output::errors::ErrorFormatter;

/// Restore and save build caches against a remote cache service
#[derive(Parser, Debug)]
#[command(name = "cachet", version, about = "Remote build cache client")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Restore a cache entry into the workspace
    Restore(RestoreArgs),
    /// Archive paths and save them under a key
    Save(SaveArgs),
    /// Show version information
    Version,
}

#[derive(Args, Debug, Clone)]
pub struct RestoreArgs {
    /// Path or glob pattern to restore (repeatable)
    #[arg(long = "path", required = true)]
    pub paths: Vec<String>,

    /// Primary key to look up
    #[arg(long)]
    pub key: String,

    /// Fallback key prefix, tried in order after the primary key
    #[arg(long = "restore-key")]
    pub restore_keys: Vec<String>,

    /// Only check whether an entry exists
    #[arg(long)]
    pub lookup_only: bool,

    /// Match entries saved on other operating systems
    #[arg(long)]
    pub cross_os: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SaveArgs {
    /// Path or glob pattern to save (repeatable)
    #[arg(long = "path", required = true)]
    pub paths: Vec<String>,

    /// Key to save under
    #[arg(long)]
    pub key: String,

    /// Allow restoring the entry on other operating systems
    #[arg(long)]
    pub cross_os: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose);
    setup_panic_handler();

    debug!("Starting cachet v{}", env!("CARGO_PKG_VERSION"));

    match run_cli(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let formatter = ErrorFormatter::new();
            match e.downcast_ref::<CacheError>() {
                Some(cache_error) => eprint!("{}", formatter.format_error(cache_error)),
                None => eprintln!("{}", formatter.format_simple(&format!("{e:#}"))),
            }
            ExitCode::FAILURE
        },
    }
}

fn run_cli(cli: Cli) -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;

    rt.block_on(async {
        let ctx = CommandContext::new().await?;
        commands::dispatch_command(cli.command, &ctx).await?;
        Ok(())
    })
}

fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "cachet={level},cachet_cli={level},cachet_client={level},cachet_archive={level},cachet_config={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        error!("cachet encountered an unexpected error: {}", panic_info);
        eprintln!("cachet crashed! This is a bug.");
        eprintln!("Error: {}", panic_info);
    }));
}
