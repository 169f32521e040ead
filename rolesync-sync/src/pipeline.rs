//! Command orchestration shared by `add`, `remove`, `sync` and `diff`.
//!
//! fetch origin + target (concurrently) → resolve target role → diff →
//! select sub-plan → apply. Nothing is persisted between runs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use rolesync_core::{
    diff, ApplicationId, AssignmentSet, Command, DirectoryApi, ReconciliationPlan, RoleId,
};

use crate::applier::{apply, ApplyMode, ApplyResult};
use crate::cancel::CancelSignal;
use crate::error::RunError;
use crate::fetcher::fetch;
use crate::roles::resolve_target_role;

/// What to reconcile, and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub command: Command,
    pub origin: ApplicationId,
    pub target: ApplicationId,
    pub dry_run: bool,
    /// Role for additions; resolved from the target when absent.
    pub target_role: Option<RoleId>,
}

/// The sub-plan a command would apply, before any mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanReport {
    pub command: Command,
    pub origin: ApplicationId,
    pub target: ApplicationId,
    pub origin_assignments: usize,
    pub target_assignments: usize,
    /// `None` when the plan has no additions and no role was needed.
    pub target_role: Option<RoleId>,
    pub plan: ReconciliationPlan,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub command: Command,
    pub origin: ApplicationId,
    pub target: ApplicationId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_role: Option<RoleId>,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub result: ApplyResult,
}

/// How a completed run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    /// Some entries failed or were left unattempted.
    Partial,
    Interrupted,
}

impl RunReport {
    pub fn status(&self) -> RunStatus {
        if self.result.cancelled {
            RunStatus::Interrupted
        } else if self.result.is_complete() {
            RunStatus::Success
        } else {
            RunStatus::Partial
        }
    }
}

/// Compute the plan `request.command` would apply.
pub async fn plan<D>(
    dir: &D,
    request: &RunRequest,
    cancel: &CancelSignal,
) -> Result<PlanReport, RunError>
where
    D: DirectoryApi + ?Sized,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RunError::Cancelled),
        report = prepare(dir, request) => report,
    }
}

/// Reconcile `request.target` toward `request.origin`.
///
/// Fails without mutating anything if either side cannot be fetched, the
/// target role cannot be resolved, or the run is cancelled before the plan
/// is applied.
pub async fn run<D>(
    dir: &D,
    request: &RunRequest,
    cancel: &CancelSignal,
) -> Result<RunReport, RunError>
where
    D: DirectoryApi + ?Sized,
{
    let started_at = Utc::now();
    let prepared = plan(dir, request, cancel).await?;

    let mode = ApplyMode::from_dry_run(request.dry_run);
    info!(
        command = %request.command,
        adds = prepared.plan.to_add().len(),
        removes = prepared.plan.to_remove().len(),
        dry_run = request.dry_run,
        "applying plan"
    );
    let result = apply(dir, &prepared.plan, &request.target, mode, cancel).await;

    Ok(RunReport {
        command: request.command,
        origin: prepared.origin,
        target: prepared.target,
        target_role: prepared.target_role,
        dry_run: request.dry_run,
        started_at,
        finished_at: Utc::now(),
        result,
    })
}

async fn prepare<D>(dir: &D, request: &RunRequest) -> Result<PlanReport, RunError>
where
    D: DirectoryApi + ?Sized,
{
    let (origin, target) = tokio::try_join!(
        fetch(dir, &request.origin),
        fetch(dir, &request.target)
    )?;

    let target_role = if needs_role(request.command, &origin, &target) {
        Some(
            resolve_target_role(dir, &request.target, &target, request.target_role.as_ref())
                .await?,
        )
    } else {
        None
    };

    // Without additions the role is never read; any value yields the same plan.
    let role = target_role.clone().unwrap_or_else(RoleId::default_access);
    let plan = diff(&origin, &target, &role).select(request.command);

    Ok(PlanReport {
        command: request.command,
        origin: request.origin.clone(),
        target: request.target.clone(),
        origin_assignments: origin.len(),
        target_assignments: target.len(),
        target_role,
        plan,
    })
}

fn needs_role(command: Command, origin: &AssignmentSet, target: &AssignmentSet) -> bool {
    command.includes_additions() && rolesync_core::diff::has_additions(origin, target)
}
