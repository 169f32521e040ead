//! # rolesync-sync
//!
//! Reconciliation engine: fetch both applications, diff, apply.
//!
//! Call [`run`] to reconcile a target application toward an origin, or
//! [`plan`] to preview the change without applying it.

pub mod applier;
pub mod cancel;
pub mod error;
pub mod fetcher;
pub mod pipeline;
pub mod roles;

pub use applier::{
    apply, ApplyError, ApplyMode, ApplyResult, EntryOutcome, EntryStatus, Operation, Outcome,
};
pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use error::RunError;
pub use fetcher::fetch;
pub use pipeline::{plan, run, PlanReport, RunReport, RunRequest, RunStatus};
pub use roles::resolve_target_role;
