//! rolesync core library: domain types, diff engine, directory contract,
//! configuration and errors.
//!
//! - [`types`]: identifiers, assignment sets, reconciliation plans
//! - [`diff`]: the pure reconciliation diff
//! - [`directory`]: [`DirectoryApi`], the remote operations the engine consumes
//! - [`config`]: `~/.rolesync/config.yaml` load / save
//! - `memory`: in-memory [`DirectoryApi`] for tests (`testing` feature)
//! - [`error`]: error taxonomy

pub mod config;
pub mod diff;
pub mod directory;
pub mod error;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod types;

pub use config::Settings;
pub use diff::diff;
pub use directory::{
    AssignmentPage, AssignmentRecord, CreateOutcome, DeleteOutcome, DirectoryApi, PageToken,
};
pub use error::{
    ApplyErrorKind, ConfigError, DirectoryError, FatalRunError, FetchError, FetchErrorKind,
    RoleResolutionError,
};
pub use types::{
    AddEntry, AppRole, ApplicationId, AssignmentId, AssignmentSet, Command, PrincipalAssignment,
    PrincipalId, PrincipalKey, PrincipalType, ReconciliationPlan, RemoveEntry, RoleId,
    DEFAULT_ACCESS_ROLE,
};
