//! Assignment fetcher: drain every page of an application's assignments
//! into one [`AssignmentSet`].

use tracing::{debug, info, warn};

use rolesync_core::{
    ApplicationId, AssignmentId, AssignmentRecord, AssignmentSet, DirectoryApi, DirectoryError,
    FetchError, PrincipalAssignment, PrincipalId, PrincipalType, RoleId,
};

/// Fetch all assignments of `application`.
///
/// The first failed page aborts the fetch; a partial set is never returned.
/// Records for principal types the engine does not model are skipped.
pub async fn fetch<D>(dir: &D, application: &ApplicationId) -> Result<AssignmentSet, FetchError>
where
    D: DirectoryApi + ?Sized,
{
    if application.as_str().trim().is_empty() {
        return Err(FetchError::new(
            application.clone(),
            DirectoryError::NotFound {
                message: "application id is empty".to_string(),
            },
        ));
    }

    let mut set = AssignmentSet::new();
    let mut token = None;
    let mut pages = 0usize;

    loop {
        let page = dir
            .list_assignments(application, token.as_ref())
            .await
            .map_err(|e| FetchError::new(application.clone(), e))?;
        pages += 1;
        debug!(%application, page = pages, records = page.records.len(), "fetched page");

        for record in page.records {
            if let Some(assignment) = to_assignment(application, record) {
                if let Some(previous) = set.insert(assignment) {
                    debug!(
                        %application,
                        principal = %previous.principal_id,
                        "duplicate record, keeping the later one"
                    );
                }
            }
        }

        match page.next_page {
            Some(next) => token = Some(next),
            None => break,
        }
    }

    info!(%application, assignments = set.len(), pages, "fetch complete");
    Ok(set)
}

fn to_assignment(
    application: &ApplicationId,
    record: AssignmentRecord,
) -> Option<PrincipalAssignment> {
    match record.principal_type.parse::<PrincipalType>() {
        Ok(principal_type) => Some(PrincipalAssignment {
            principal_id: PrincipalId(record.principal_id),
            principal_type,
            role_id: RoleId(record.role_id),
            assignment_id: AssignmentId(record.assignment_id),
        }),
        Err(_) => {
            warn!(
                %application,
                principal = %record.principal_id,
                principal_type = %record.principal_type,
                "skipping assignment of unsupported principal type"
            );
            None
        }
    }
}
