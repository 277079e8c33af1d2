//! beans - maintenance for the beans issue store
//!
//! Flags stale closed issues and prunes expired tombstones in .beans/

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "beans")]
#[command(about = "Maintenance for the beans issue store")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// More log output (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the resolved data directory and backend
    Info {
        /// Repository root
        #[arg(long, env = "BEANS_REPO", default_value = ".")]
        path: PathBuf,
    },

    /// Check for stale closed issues and expired tombstones
    Doctor {
        #[command(flatten)]
        args: DoctorArgs,

        #[command(subcommand)]
        check: Option<DoctorCheck>,
    },

    /// Show or reset configuration
    Config {
        /// Repository root
        #[arg(long, env = "BEANS_REPO", default_value = ".")]
        path: PathBuf,

        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Args)]
pub struct DoctorArgs {
    /// Repository root
    #[arg(long, env = "BEANS_REPO", default_value = ".")]
    pub path: PathBuf,

    /// Apply fixes (default is a dry run)
    #[arg(long)]
    pub fix: bool,

    /// Days after closing before an issue counts as stale
    #[arg(long)]
    pub stale_days: Option<u32>,

    /// Days a tombstone is kept before pruning
    #[arg(long)]
    pub tombstone_ttl_days: Option<u32>,

    /// Label attached to stale closed issues
    #[arg(long)]
    pub label: Option<String>,
}

#[derive(Subcommand, Clone, Copy)]
pub enum DoctorCheck {
    /// Only flag stale closed issues
    StaleClosed,
    /// Only prune expired tombstones
    Tombstones,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Write a commented default config.toml
    Reset,
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info,beans_core=debug",
        _ => "debug,beans_core=trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Info { path } => commands::info(&path, cli.json),
        Commands::Doctor { args, check } => commands::doctor(&args, check, cli.json),
        Commands::Config { path, command } => match command {
            Some(ConfigCommands::Show) | None => commands::config_show(&path, cli.json),
            Some(ConfigCommands::Reset) => commands::config_reset(&path),
        },
    }
}
