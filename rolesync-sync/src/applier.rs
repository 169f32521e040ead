//! Mutation applier: walk a plan in order and account every entry.
//!
//! Dry-run and live runs share this traversal; the mode only decides whether
//! an entry is sent to the directory or simulated.

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use rolesync_core::{
    AddEntry, ApplicationId, ApplyErrorKind, CreateOutcome, DeleteOutcome, DirectoryApi,
    DirectoryError, FatalRunError, PrincipalKey, ReconciliationPlan, RemoveEntry,
};

use crate::cancel::CancelSignal;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Add,
    Remove,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Add => write!(f, "add"),
            Operation::Remove => write!(f, "remove"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    Live,
    /// Simulate every entry; no request reaches the directory.
    DryRun,
}

impl ApplyMode {
    pub fn from_dry_run(dry_run: bool) -> Self {
        if dry_run {
            ApplyMode::DryRun
        } else {
            ApplyMode::Live
        }
    }

    pub fn is_dry_run(self) -> bool {
        self == ApplyMode::DryRun
    }
}

/// Final state of one plan entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Added,
    Removed,
    WouldAdd,
    WouldRemove,
    /// Already in the desired state.
    Skipped,
    Failed,
    Unattempted,
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EntryStatus::Added => "added",
            EntryStatus::Removed => "removed",
            EntryStatus::WouldAdd => "would add",
            EntryStatus::WouldRemove => "would remove",
            EntryStatus::Skipped => "skipped",
            EntryStatus::Failed => "failed",
            EntryStatus::Unattempted => "unattempted",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryOutcome {
    pub principal: PrincipalKey,
    pub operation: Operation,
    pub status: EntryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// A plan entry that did not reach its desired state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{operation} {principal} failed ({kind}): {reason}")]
pub struct ApplyError {
    pub principal: PrincipalKey,
    pub operation: Operation,
    pub kind: ApplyErrorKind,
    pub reason: String,
}

/// What happened to a single entry, before accounting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Simulated,
    /// Already assigned, or already gone.
    Skipped(String),
    Failed { kind: ApplyErrorKind, reason: String },
    /// Left alone after the operator cancelled the run.
    Unattempted(String),
}

// ---------------------------------------------------------------------------
// ApplyResult
// ---------------------------------------------------------------------------

/// Accumulated accounting of a plan application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyResult {
    pub dry_run: bool,
    pub planned_adds: usize,
    pub planned_removes: usize,
    pub added: usize,
    pub removed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub unattempted: usize,
    pub cancelled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal: Option<FatalRunError>,
    pub failures: Vec<ApplyError>,
    pub entries: Vec<EntryOutcome>,
}

impl ApplyResult {
    pub fn new(plan: &ReconciliationPlan, mode: ApplyMode) -> Self {
        Self {
            dry_run: mode.is_dry_run(),
            planned_adds: plan.to_add().len(),
            planned_removes: plan.to_remove().len(),
            ..Self::default()
        }
    }

    /// Account one entry. Entries must be recorded in plan order.
    pub fn record(&mut self, principal: &PrincipalKey, operation: Operation, outcome: Outcome) {
        let (status, detail) = match outcome {
            Outcome::Applied | Outcome::Simulated => {
                match operation {
                    Operation::Add => self.added += 1,
                    Operation::Remove => self.removed += 1,
                }
                let status = match (operation, self.dry_run) {
                    (Operation::Add, false) => EntryStatus::Added,
                    (Operation::Add, true) => EntryStatus::WouldAdd,
                    (Operation::Remove, false) => EntryStatus::Removed,
                    (Operation::Remove, true) => EntryStatus::WouldRemove,
                };
                (status, None)
            }
            Outcome::Skipped(reason) => {
                self.skipped += 1;
                (EntryStatus::Skipped, Some(reason))
            }
            Outcome::Failed { kind, reason } => {
                self.failed += 1;
                let status = if kind == ApplyErrorKind::Unattempted {
                    self.unattempted += 1;
                    EntryStatus::Unattempted
                } else {
                    EntryStatus::Failed
                };
                self.failures.push(ApplyError {
                    principal: principal.clone(),
                    operation,
                    kind,
                    reason: reason.clone(),
                });
                (status, Some(reason))
            }
            Outcome::Unattempted(reason) => {
                self.unattempted += 1;
                (EntryStatus::Unattempted, Some(reason))
            }
        };

        self.entries.push(EntryOutcome {
            principal: principal.clone(),
            operation,
            status,
            detail,
        });
    }

    /// Every entry reached its desired state.
    pub fn is_complete(&self) -> bool {
        self.failed == 0 && self.unattempted == 0 && !self.cancelled
    }

    pub fn planned(&self) -> usize {
        self.planned_adds + self.planned_removes
    }
}

// ---------------------------------------------------------------------------
// apply
// ---------------------------------------------------------------------------

enum Step<'a> {
    Add(&'a AddEntry),
    Remove(&'a RemoveEntry),
}

impl Step<'_> {
    fn principal(&self) -> &PrincipalKey {
        match self {
            Step::Add(entry) => &entry.principal,
            Step::Remove(entry) => &entry.principal,
        }
    }

    fn operation(&self) -> Operation {
        match self {
            Step::Add(_) => Operation::Add,
            Step::Remove(_) => Operation::Remove,
        }
    }
}

/// Apply `plan` to `target` sequentially, additions first.
///
/// A failed entry never stops the batch. The target application vanishing
/// does: the rest of the plan is recorded as failed and unattempted.
/// Cancellation is observed between entries and abandons a mutation still
/// waiting on the directory, including one sleeping between retries.
pub async fn apply<D>(
    dir: &D,
    plan: &ReconciliationPlan,
    target: &ApplicationId,
    mode: ApplyMode,
    cancel: &CancelSignal,
) -> ApplyResult
where
    D: DirectoryApi + ?Sized,
{
    let mut result = ApplyResult::new(plan, mode);
    let steps = plan
        .to_add()
        .iter()
        .map(Step::Add)
        .chain(plan.to_remove().iter().map(Step::Remove));

    for step in steps {
        let principal = step.principal();
        let operation = step.operation();

        if let Some(fatal) = &result.fatal {
            let reason = format!("not attempted: {fatal}");
            result.record(
                principal,
                operation,
                Outcome::Failed {
                    kind: ApplyErrorKind::Unattempted,
                    reason,
                },
            );
            continue;
        }

        if result.cancelled || cancel.is_cancelled() {
            result.cancelled = true;
            result.record(
                principal,
                operation,
                Outcome::Unattempted("run interrupted".to_string()),
            );
            continue;
        }

        let outcome = if mode.is_dry_run() {
            info!("[dry-run] would {operation} {principal}");
            Outcome::Simulated
        } else {
            let attempt = tokio::select! {
                biased;
                attempt = execute(dir, target, &step) => attempt,
                _ = cancel.cancelled() => {
                    warn!(%principal, %operation, "interrupted while waiting on the directory");
                    result.cancelled = true;
                    result.record(
                        principal,
                        operation,
                        Outcome::Unattempted(
                            "run interrupted while the request was pending; re-run to confirm"
                                .to_string(),
                        ),
                    );
                    continue;
                }
            };
            match attempt {
                Ok(outcome) => outcome,
                Err(fatal) => {
                    warn!(%target, "{fatal}; abandoning the remaining entries");
                    let reason = fatal.to_string();
                    result.fatal = Some(fatal);
                    Outcome::Failed {
                        kind: ApplyErrorKind::Unknown,
                        reason,
                    }
                }
            }
        };
        result.record(principal, operation, outcome);
    }

    result
}

async fn execute<D>(
    dir: &D,
    target: &ApplicationId,
    step: &Step<'_>,
) -> Result<Outcome, FatalRunError>
where
    D: DirectoryApi + ?Sized,
{
    let principal = step.principal();
    let operation = step.operation();
    let response = match step {
        Step::Add(entry) => dir
            .create_assignment(target, &entry.principal, &entry.role_id)
            .await
            .map(|created| match created {
                CreateOutcome::Created(id) => {
                    info!(%principal, assignment = %id, "added");
                    Outcome::Applied
                }
                CreateOutcome::AlreadyExists => {
                    debug!(%principal, "already assigned");
                    Outcome::Skipped("already assigned".to_string())
                }
            }),
        Step::Remove(entry) => dir
            .delete_assignment(target, &entry.assignment_id)
            .await
            .map(|deleted| match deleted {
                DeleteOutcome::Deleted => {
                    info!(%principal, assignment = %entry.assignment_id, "removed");
                    Outcome::Applied
                }
                DeleteOutcome::AlreadyGone => {
                    debug!(%principal, "already removed");
                    Outcome::Skipped("already removed".to_string())
                }
            }),
    };

    match response {
        Ok(outcome) => Ok(outcome),
        Err(DirectoryError::ApplicationGone { application }) => Err(FatalRunError {
            application,
            reason: "the directory no longer resolves it".to_string(),
        }),
        Err(err) => {
            let kind = ApplyErrorKind::from(&err);
            warn!(%principal, %operation, %kind, "{err}");
            Ok(Outcome::Failed {
                kind,
                reason: err.to_string(),
            })
        }
    }
}
