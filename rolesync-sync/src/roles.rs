//! Which role new assignments receive on the target application.
//!
//! One role per application: an explicit choice wins, then the role every
//! existing target assignment shares, then the target's only enabled app
//! role. Anything with more than one candidate is refused, and so is an
//! application whose declared roles are all disabled.

use std::collections::BTreeSet;

use tracing::{debug, info};

use rolesync_core::{
    ApplicationId, AssignmentSet, DirectoryApi, RoleId, RoleResolutionError,
};

/// Resolve the role granted by additions on `target_application`.
pub async fn resolve_target_role<D>(
    dir: &D,
    target_application: &ApplicationId,
    target: &AssignmentSet,
    explicit: Option<&RoleId>,
) -> Result<RoleId, RoleResolutionError>
where
    D: DirectoryApi + ?Sized,
{
    if let Some(role) = explicit {
        debug!(role = %role, "using explicit target role");
        return Ok(role.clone());
    }

    let in_use: BTreeSet<&RoleId> = target.iter().map(|a| &a.role_id).collect();
    if in_use.len() > 1 {
        return Err(RoleResolutionError::Ambiguous {
            application: target_application.clone(),
            count: in_use.len(),
        });
    }
    if let Some(role) = in_use.into_iter().next() {
        debug!(role = %role, "target assignments share one role");
        return Ok(role.clone());
    }

    let roles = dir
        .list_app_roles(target_application)
        .await
        .map_err(|source| RoleResolutionError::Lookup {
            application: target_application.clone(),
            source,
        })?;
    if roles.is_empty() {
        info!(application = %target_application, "no app roles declared, using default access");
        return Ok(RoleId::default_access());
    }

    let declared = roles.len();
    let enabled: Vec<_> = roles.into_iter().filter(|r| r.enabled).collect();
    match enabled.as_slice() {
        [] => Err(RoleResolutionError::NoEnabledRole {
            application: target_application.clone(),
            declared,
        }),
        [only] => {
            info!(application = %target_application, role = %only.id, "using the only declared app role");
            Ok(only.id.clone())
        }
        several => Err(RoleResolutionError::Ambiguous {
            application: target_application.clone(),
            count: several.len(),
        }),
    }
}
