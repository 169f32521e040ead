//! The directory operations the reconciliation engine consumes.
//!
//! Implementations own transport concerns (authentication, retries,
//! throttling). They must be safe to share between concurrent fetches.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DirectoryError;
use crate::types::{AppRole, ApplicationId, AssignmentId, PrincipalKey, RoleId};

/// Continuation token returned by a paged listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageToken(pub String);

/// A raw assignment record as the directory reports it.
///
/// `principal_type` is kept verbatim; the fetcher decides which types the
/// engine models.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub assignment_id: String,
    pub principal_id: String,
    pub principal_type: String,
    pub role_id: String,
}

/// One page of assignment records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignmentPage {
    pub records: Vec<AssignmentRecord>,
    pub next_page: Option<PageToken>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(AssignmentId),
    /// The principal already holds the role on the application.
    AlreadyExists,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The assignment was already removed.
    AlreadyGone,
}

#[async_trait]
pub trait DirectoryApi: Send + Sync {
    /// List one page of role assignments granted on `application`.
    async fn list_assignments(
        &self,
        application: &ApplicationId,
        page: Option<&PageToken>,
    ) -> Result<AssignmentPage, DirectoryError>;

    /// Assign `principal` the role `role` on `application`.
    async fn create_assignment(
        &self,
        application: &ApplicationId,
        principal: &PrincipalKey,
        role: &RoleId,
    ) -> Result<CreateOutcome, DirectoryError>;

    /// Delete the assignment `assignment` from `application`.
    async fn delete_assignment(
        &self,
        application: &ApplicationId,
        assignment: &AssignmentId,
    ) -> Result<DeleteOutcome, DirectoryError>;

    /// App roles declared by `application`.
    async fn list_app_roles(
        &self,
        application: &ApplicationId,
    ) -> Result<Vec<AppRole>, DirectoryError>;
}
