//! rolesync: reconcile app-role assignments between two applications.
//!
//! # Usage
//!
//! ```text
//! rolesync add    <origin> <target> [--dry-run] [--json] [--target-role ID]
//! rolesync remove <origin> <target> [--dry-run] [--json]
//! rolesync sync   <origin> <target> [--dry-run] [--json] [--target-role ID]
//! rolesync diff   <origin> <target> [--json] [--target-role ID]
//! rolesync init [--tenant-id ID] [--client-id ID] [--graph-endpoint URL]
//! rolesync app list
//! rolesync app add <alias> <object-id>
//! rolesync app remove <alias>
//! ```
//!
//! Exit status: `0` success, `2` some entries failed, `1` nothing could be
//! done, `130` interrupted.

mod commands;

use std::process::ExitCode;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;

use commands::{
    app::AppCommand,
    diff::DiffArgs,
    init::InitArgs,
    reconcile::{ReconcileArgs, RemoveArgs},
};
use rolesync_core::Command;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "rolesync",
    version,
    about = "Keep app-role assignments of a target application in line with an origin",
    long_about = None,
)]
struct Cli {
    /// Log more to stderr (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Grant target access to origin principals it is missing.
    Add(ReconcileArgs),

    /// Revoke target access from principals the origin does not have.
    Remove(RemoveArgs),

    /// Add and remove until the target matches the origin.
    Sync(ReconcileArgs),

    /// Show what `sync` would change without changing anything.
    Diff(DiffArgs),

    /// Write ~/.rolesync/config.yaml.
    Init(InitArgs),

    /// Manage application aliases.
    App {
        #[command(subcommand)]
        command: AppCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match dispatch(cli.command) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn dispatch(command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Add(args) => args.run(Command::Add),
        Commands::Remove(args) => args.run(),
        Commands::Sync(args) => args.run(Command::Sync),
        Commands::Diff(args) => args.run(),
        Commands::Init(args) => args.run().map(|()| ExitCode::SUCCESS),
        Commands::App { command } => commands::app::run(command).map(|()| ExitCode::SUCCESS),
    }
}

/// Logs go to stderr; stdout carries only the report.
fn init_tracing(verbose: u8) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
