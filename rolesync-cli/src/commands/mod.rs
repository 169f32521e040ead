//! Subcommands and the plumbing they share.

pub mod app;
pub mod diff;
pub mod init;
pub mod reconcile;

use std::future::Future;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use rolesync_core::{config, ApplicationId, Settings};
use rolesync_graph::GraphDirectory;
use rolesync_sync::{cancel_pair, CancelSignal};

/// Exit status for an operator interrupt.
pub const EXIT_INTERRUPTED: u8 = 130;
/// Exit status when some plan entries failed.
pub const EXIT_PARTIAL: u8 = 2;

/// The two applications a command works on.
#[derive(Args, Debug)]
pub struct Endpoints {
    /// Origin application: alias from the config or service principal object id.
    pub origin: String,

    /// Target application: alias from the config or service principal object id.
    pub target: String,
}

impl Endpoints {
    pub fn resolve(&self, settings: &Settings) -> (ApplicationId, ApplicationId) {
        (
            settings.resolve_application(&self.origin),
            settings.resolve_application(&self.target),
        )
    }
}

/// Config file overlaid with `ROLESYNC_*` variables, validated.
pub(crate) fn load_settings() -> Result<Settings> {
    let settings = config::load()
        .context("failed to load ~/.rolesync/config.yaml")?
        .with_env(|key| std::env::var(key).ok());
    settings.validate().context("invalid configuration")?;
    Ok(settings)
}

pub(crate) fn connect(settings: &Settings) -> Result<GraphDirectory> {
    rolesync_graph::connect(settings, |key| std::env::var(key).ok())
        .context("failed to set up the Microsoft Graph client")
}

/// Drive `job` to completion on a fresh runtime, with Ctrl-C wired to its
/// cancel signal.
pub(crate) fn block_on_cancellable<F, Fut, T>(job: F) -> Result<T>
where
    F: FnOnce(CancelSignal) -> Fut,
    Fut: Future<Output = T>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;

    Ok(runtime.block_on(async move {
        let (handle, signal) = cancel_pair();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            tracing::warn!("interrupt received, stopping; press Ctrl-C again to quit now");
            handle.cancel();
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("{} interrupted again, exiting", "⚠".yellow());
                std::process::exit(i32::from(EXIT_INTERRUPTED));
            }
        });
        job(signal).await
    }))
}

/// Human notice for a run cancelled before any change was made.
pub(crate) fn report_interrupted() {
    eprintln!("{} interrupted before any change was made", "⚠".yellow());
}

pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to serialize JSON output")?
    );
    Ok(())
}
