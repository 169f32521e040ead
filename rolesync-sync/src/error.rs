//! Error types for rolesync-sync.

use thiserror::Error;

use rolesync_core::{FetchError, RoleResolutionError};

/// Reasons a run stops before its plan is applied.
///
/// Failures of individual plan entries are not run errors; they are
/// accounted in [`crate::ApplyResult`].
#[derive(Debug, Error)]
pub enum RunError {
    /// One side could not be read completely. No mutation was issued.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    RoleResolution(#[from] RoleResolutionError),

    /// The operator interrupted the run before any mutation.
    #[error("interrupted before any change was made")]
    Cancelled,
}
