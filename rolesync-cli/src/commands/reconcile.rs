//! `rolesync add|remove|sync`: reconcile the target toward the origin.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde_json::json;
use tabled::{settings::Style, Table, Tabled};

use rolesync_core::{Command, RoleId};
use rolesync_sync::{run, EntryOutcome, RunError, RunReport, RunRequest, RunStatus};

use super::{
    block_on_cancellable, connect, load_settings, print_json, report_interrupted, Endpoints,
    EXIT_INTERRUPTED, EXIT_PARTIAL,
};

/// Arguments for `rolesync add` and `rolesync sync`.
#[derive(Args, Debug)]
pub struct ReconcileArgs {
    #[command(flatten)]
    pub apps: Endpoints,

    /// Report what would change without changing anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,

    /// App-role id new target assignments receive. Resolved from the target
    /// application when omitted.
    #[arg(long, value_name = "ROLE_ID")]
    pub target_role: Option<String>,
}

/// Arguments for `rolesync remove`.
#[derive(Args, Debug)]
pub struct RemoveArgs {
    #[command(flatten)]
    pub apps: Endpoints,

    /// Report what would change without changing anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl ReconcileArgs {
    pub fn run(self, command: Command) -> Result<ExitCode> {
        reconcile(command, &self.apps, self.dry_run, self.json, self.target_role)
    }
}

impl RemoveArgs {
    pub fn run(self) -> Result<ExitCode> {
        reconcile(Command::Remove, &self.apps, self.dry_run, self.json, None)
    }
}

fn reconcile(
    command: Command,
    apps: &Endpoints,
    dry_run: bool,
    json: bool,
    target_role: Option<String>,
) -> Result<ExitCode> {
    let settings = load_settings()?;
    let (origin, target) = apps.resolve(&settings);
    let request = RunRequest {
        command,
        origin,
        target,
        dry_run,
        target_role: target_role.map(RoleId::from),
    };
    let dir = connect(&settings)?;

    let outcome = block_on_cancellable(|cancel| async move {
        run(&dir, &request, &cancel).await
    })?;

    match outcome {
        Ok(report) => {
            if json {
                print_json(&report)?;
            } else {
                print_report(&report);
            }
            Ok(exit_code(report.status()))
        }
        Err(err) if json => {
            print_json(&error_json(&err))?;
            Ok(match err {
                RunError::Cancelled => ExitCode::from(EXIT_INTERRUPTED),
                _ => ExitCode::FAILURE,
            })
        }
        Err(RunError::Cancelled) => {
            report_interrupted();
            Ok(ExitCode::from(EXIT_INTERRUPTED))
        }
        Err(err @ RunError::Fetch(_)) => Err(anyhow::Error::new(err).context(format!(
            "{command} aborted; no changes were made, re-run once the cause is fixed"
        ))),
        Err(err) => Err(anyhow::Error::new(err).context(format!("{command} aborted"))),
    }
}

pub(crate) fn exit_code(status: RunStatus) -> ExitCode {
    ExitCode::from(exit_status(status))
}

fn exit_status(status: RunStatus) -> u8 {
    match status {
        RunStatus::Success => 0,
        RunStatus::Partial => EXIT_PARTIAL,
        RunStatus::Interrupted => EXIT_INTERRUPTED,
    }
}

pub(crate) fn error_json(err: &RunError) -> serde_json::Value {
    match err {
        RunError::Fetch(fetch) => json!({
            "error": {
                "kind": fetch.kind,
                "application": fetch.application,
                "message": fetch.source.to_string(),
            }
        }),
        RunError::RoleResolution(resolution) => json!({
            "error": { "kind": "role_resolution", "message": resolution.to_string() }
        }),
        RunError::Cancelled => json!({
            "error": { "kind": "cancelled", "message": err.to_string() }
        }),
    }
}

// ---------------------------------------------------------------------------
// Human output
// ---------------------------------------------------------------------------

#[derive(Tabled)]
struct EntryRow {
    #[tabled(rename = "principal")]
    principal: String,
    #[tabled(rename = "type")]
    kind: String,
    #[tabled(rename = "operation")]
    operation: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "detail")]
    detail: String,
}

impl From<&EntryOutcome> for EntryRow {
    fn from(entry: &EntryOutcome) -> Self {
        Self {
            principal: entry.principal.id.to_string(),
            kind: entry.principal.kind.to_string(),
            operation: entry.operation.to_string(),
            status: entry.status.to_string(),
            detail: entry.detail.clone().unwrap_or_default(),
        }
    }
}

fn print_report(report: &RunReport) {
    let prefix = if report.dry_run { "[dry-run] " } else { "" };
    let result = &report.result;

    println!(
        "{prefix}{} {} → {}",
        report.command,
        report.origin,
        report.target
    );
    println!(
        "{prefix}planned: {} to add, {} to remove",
        result.planned_adds, result.planned_removes
    );
    if let Some(role) = &report.target_role {
        println!("{prefix}target role: {role}");
    }

    if result.entries.is_empty() {
        println!("{prefix}{} nothing to do", "✓".green());
        return;
    }

    let rows: Vec<EntryRow> = result.entries.iter().map(EntryRow::from).collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    let elapsed = (report.finished_at - report.started_at).num_milliseconds();
    let counts = format!(
        "{} added, {} removed, {} skipped, {} failed, {} unattempted",
        result.added, result.removed, result.skipped, result.failed, result.unattempted
    );
    match report.status() {
        RunStatus::Success => println!("{prefix}{} {counts} ({elapsed} ms)", "✓".green()),
        RunStatus::Partial => println!("{prefix}{} {counts} ({elapsed} ms)", "✗".red()),
        RunStatus::Interrupted => println!("{prefix}{} {counts} ({elapsed} ms)", "⚠".yellow()),
    }

    if let Some(fatal) = &result.fatal {
        println!("{prefix}{} {fatal}", "✗".red());
    }
    for failure in &result.failures {
        println!("{prefix}  {} {failure}", "✗".red());
    }
    if result.cancelled {
        println!("{prefix}interrupted; re-run to finish the remaining entries");
    }
}
