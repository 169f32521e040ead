//! `rolesync diff <origin> <target>`: show the reconciliation plan.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use rolesync_core::{Command, RoleId};
use rolesync_sync::{plan, PlanReport, RunError, RunRequest};

use super::reconcile::error_json;
use super::{
    block_on_cancellable, connect, load_settings, print_json, report_interrupted, Endpoints,
    EXIT_INTERRUPTED,
};

/// Arguments for `rolesync diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    #[command(flatten)]
    pub apps: Endpoints,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,

    /// App-role id additions would grant on the target.
    #[arg(long, value_name = "ROLE_ID")]
    pub target_role: Option<String>,
}

#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "")]
    change: String,
    #[tabled(rename = "principal")]
    principal: String,
    #[tabled(rename = "type")]
    kind: String,
    #[tabled(rename = "role / assignment")]
    reference: String,
}

impl DiffArgs {
    pub fn run(self) -> Result<ExitCode> {
        let settings = load_settings()?;
        let (origin, target) = self.apps.resolve(&settings);
        let request = RunRequest {
            command: Command::Sync,
            origin,
            target,
            dry_run: true,
            target_role: self.target_role.map(RoleId::from),
        };
        let dir = connect(&settings)?;

        let outcome = block_on_cancellable(|cancel| async move {
            plan(&dir, &request, &cancel).await
        })?;

        match outcome {
            Ok(report) if self.json => {
                print_json(&report)?;
                Ok(ExitCode::SUCCESS)
            }
            Ok(report) => {
                print_plan(&report);
                Ok(ExitCode::SUCCESS)
            }
            Err(RunError::Cancelled) => {
                if self.json {
                    print_json(&error_json(&RunError::Cancelled))?;
                } else {
                    report_interrupted();
                }
                Ok(ExitCode::from(EXIT_INTERRUPTED))
            }
            Err(err) if self.json => {
                print_json(&error_json(&err))?;
                Ok(ExitCode::FAILURE)
            }
            Err(err) => Err(anyhow::Error::new(err).context("diff failed")),
        }
    }
}

fn print_plan(report: &PlanReport) {
    println!(
        "{} ({} assignments) → {} ({} assignments)",
        report.origin, report.origin_assignments, report.target, report.target_assignments
    );

    if report.plan.is_empty() {
        println!("{} target is in sync", "✓".green());
        return;
    }

    let additions = report.plan.to_add().iter().map(|e| PlanRow {
        change: "+".to_string(),
        principal: e.principal.id.to_string(),
        kind: e.principal.kind.to_string(),
        reference: e.role_id.to_string(),
    });
    let removals = report.plan.to_remove().iter().map(|e| PlanRow {
        change: "-".to_string(),
        principal: e.principal.id.to_string(),
        kind: e.principal.kind.to_string(),
        reference: e.assignment_id.to_string(),
    });
    let mut table = Table::new(additions.chain(removals).collect::<Vec<_>>());
    table.with(Style::rounded());
    println!("{table}");
    println!(
        "{} to add, {} to remove. Run 'rolesync sync {} {}' to apply.",
        report.plan.to_add().len(),
        report.plan.to_remove().len(),
        report.origin,
        report.target
    );
}
