//! Reconciliation diff between an origin and a target assignment set.
//!
//! Membership is decided on [`PrincipalKey`] alone. Role ids differ between
//! applications by construction, so a principal present on both sides is
//! never drift, whatever roles it holds.

use crate::types::{
    AddEntry, AssignmentSet, PrincipalKey, ReconciliationPlan, RemoveEntry, RoleId,
};

/// Compute the plan that converges `target` toward `origin`.
///
/// Additions are paired with `target_role`, the role new assignments receive
/// on the target application. Pure: no I/O, same output for the same input.
pub fn diff(
    origin: &AssignmentSet,
    target: &AssignmentSet,
    target_role: &RoleId,
) -> ReconciliationPlan {
    let to_add = missing_from(origin, target)
        .map(|principal| AddEntry {
            principal,
            role_id: target_role.clone(),
        })
        .collect();

    let to_remove = target
        .iter()
        .filter(|assignment| !origin.contains(&assignment.key()))
        .map(|assignment| RemoveEntry {
            principal: assignment.key(),
            assignment_id: assignment.assignment_id.clone(),
        })
        .collect();

    ReconciliationPlan::new(to_add, to_remove)
}

/// Whether `diff(origin, target, _)` would contain any addition.
pub fn has_additions(origin: &AssignmentSet, target: &AssignmentSet) -> bool {
    missing_from(origin, target).next().is_some()
}

fn missing_from<'a>(
    origin: &'a AssignmentSet,
    target: &'a AssignmentSet,
) -> impl Iterator<Item = PrincipalKey> + 'a {
    origin.keys().filter(move |key| !target.contains(key))
}
