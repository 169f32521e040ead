//! [`DirectoryApi`] over the Microsoft Graph `appRoleAssignedTo` endpoints.

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use rolesync_core::{
    AppRole, ApplicationId, AssignmentId, AssignmentPage, AssignmentRecord, CreateOutcome,
    DeleteOutcome, DirectoryApi, DirectoryError, PageToken, PrincipalKey, RoleId,
};

use crate::client::{GraphClient, GraphResponse};

const ASSIGNED_TO: &str = "appRoleAssignedTo";

/// Paged `OData` collection.
#[derive(Debug, Deserialize)]
struct ODataResponse<T> {
    value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphAssignment {
    id: String,
    principal_id: String,
    #[serde(default)]
    principal_type: Option<String>,
    app_role_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewAssignment<'a> {
    principal_id: &'a str,
    resource_id: &'a str,
    app_role_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreatedAssignment {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServicePrincipalRoles {
    #[serde(default)]
    app_roles: Vec<GraphAppRole>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphAppRole {
    id: String,
    display_name: Option<String>,
    value: Option<String>,
    #[serde(default = "enabled_by_default")]
    is_enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

/// Role assignments of service principals, read and written through Graph.
#[derive(Debug)]
pub struct GraphDirectory {
    client: GraphClient,
}

impl GraphDirectory {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }

    fn assignments_url(&self, application: &ApplicationId) -> Url {
        let mut url = self
            .client
            .url(&["servicePrincipals", application.as_str(), ASSIGNED_TO]);
        url.set_query(Some(&format!("$top={}", self.client.page_size())));
        url
    }
}

#[async_trait]
impl DirectoryApi for GraphDirectory {
    #[instrument(skip(self, page), fields(application = %application))]
    async fn list_assignments(
        &self,
        application: &ApplicationId,
        page: Option<&PageToken>,
    ) -> Result<AssignmentPage, DirectoryError> {
        let url = match page {
            Some(token) => Url::parse(&token.0).map_err(|e| DirectoryError::Unexpected {
                status: 0,
                message: format!("invalid continuation link '{}': {e}", token.0),
            })?,
            None => self.assignments_url(application),
        };

        let response = self.client.send(Method::GET, url, None).await?;
        if response.status != StatusCode::OK {
            return Err(classify(&response));
        }

        let body: ODataResponse<GraphAssignment> = parse(&response)?;
        debug!(
            records = body.value.len(),
            more = body.next_link.is_some(),
            "assignment page"
        );
        Ok(AssignmentPage {
            records: body
                .value
                .into_iter()
                .map(|a| AssignmentRecord {
                    assignment_id: a.id,
                    principal_id: a.principal_id,
                    principal_type: a.principal_type.unwrap_or_default(),
                    role_id: a.app_role_id,
                })
                .collect(),
            next_page: body.next_link.map(PageToken),
        })
    }

    #[instrument(skip(self), fields(application = %application, principal = %principal))]
    async fn create_assignment(
        &self,
        application: &ApplicationId,
        principal: &PrincipalKey,
        role: &RoleId,
    ) -> Result<CreateOutcome, DirectoryError> {
        let url = self
            .client
            .url(&["servicePrincipals", application.as_str(), ASSIGNED_TO]);
        let body = serde_json::to_value(NewAssignment {
            principal_id: principal.id.as_str(),
            resource_id: application.as_str(),
            app_role_id: role.as_str(),
        })
        .map_err(|e| DirectoryError::Unexpected {
            status: 0,
            message: format!("failed to encode assignment: {e}"),
        })?;

        let response = self.client.send(Method::POST, url, Some(&body)).await?;
        match response.status {
            StatusCode::OK | StatusCode::CREATED => {
                let created: CreatedAssignment = parse(&response)?;
                Ok(CreateOutcome::Created(AssignmentId(created.id)))
            }
            StatusCode::CONFLICT => Ok(CreateOutcome::AlreadyExists),
            StatusCode::BAD_REQUEST if mentions_already_exists(&response) => {
                Ok(CreateOutcome::AlreadyExists)
            }
            StatusCode::NOT_FOUND if names_application(&response, application) => {
                Err(DirectoryError::ApplicationGone {
                    application: application.clone(),
                })
            }
            _ => Err(classify(&response)),
        }
    }

    #[instrument(skip(self), fields(application = %application, assignment = %assignment))]
    async fn delete_assignment(
        &self,
        application: &ApplicationId,
        assignment: &AssignmentId,
    ) -> Result<DeleteOutcome, DirectoryError> {
        let url = self.client.url(&[
            "servicePrincipals",
            application.as_str(),
            ASSIGNED_TO,
            assignment.as_str(),
        ]);

        let response = self.client.send(Method::DELETE, url, None).await?;
        match response.status {
            StatusCode::NO_CONTENT | StatusCode::OK => Ok(DeleteOutcome::Deleted),
            StatusCode::NOT_FOUND if names_application(&response, application) => {
                Err(DirectoryError::ApplicationGone {
                    application: application.clone(),
                })
            }
            StatusCode::NOT_FOUND => Ok(DeleteOutcome::AlreadyGone),
            _ => Err(classify(&response)),
        }
    }

    #[instrument(skip(self), fields(application = %application))]
    async fn list_app_roles(
        &self,
        application: &ApplicationId,
    ) -> Result<Vec<AppRole>, DirectoryError> {
        let mut url = self
            .client
            .url(&["servicePrincipals", application.as_str()]);
        url.set_query(Some("$select=appRoles"));

        let response = self.client.send(Method::GET, url, None).await?;
        if response.status != StatusCode::OK {
            return Err(classify(&response));
        }

        let body: ServicePrincipalRoles = parse(&response)?;
        Ok(body
            .app_roles
            .into_iter()
            .map(|r| AppRole {
                id: RoleId(r.id),
                display_name: r.display_name,
                value: r.value,
                enabled: r.is_enabled,
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Response classification
// ---------------------------------------------------------------------------

/// Map a non-success response to a [`DirectoryError`].
fn classify(response: &GraphResponse) -> DirectoryError {
    let message = response.error_message();
    match response.status {
        StatusCode::UNAUTHORIZED => DirectoryError::Unauthorized { message },
        StatusCode::FORBIDDEN => DirectoryError::Forbidden { message },
        StatusCode::NOT_FOUND => DirectoryError::NotFound { message },
        status if status.is_server_error() => DirectoryError::Transient { message },
        status => DirectoryError::Unexpected {
            status: status.as_u16(),
            message,
        },
    }
}

fn parse<T: serde::de::DeserializeOwned>(response: &GraphResponse) -> Result<T, DirectoryError> {
    serde_json::from_str(&response.body).map_err(|e| DirectoryError::Unexpected {
        status: response.status.as_u16(),
        message: format!("unreadable response body: {e}"),
    })
}

fn mentions_already_exists(response: &GraphResponse) -> bool {
    response
        .error_message()
        .to_ascii_lowercase()
        .contains("already exists")
}

/// Graph reports a missing service principal by naming its id in the 404.
fn names_application(response: &GraphResponse, application: &ApplicationId) -> bool {
    response.error_message().contains(application.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> GraphResponse {
        GraphResponse {
            status: StatusCode::from_u16(status).unwrap(),
            body: body.to_string(),
        }
    }

    #[test]
    fn classify_maps_auth_statuses() {
        assert!(matches!(
            classify(&response(401, "")),
            DirectoryError::Unauthorized { .. }
        ));
        assert!(matches!(
            classify(&response(403, "")),
            DirectoryError::Forbidden { .. }
        ));
        assert!(matches!(
            classify(&response(500, "")),
            DirectoryError::Transient { .. }
        ));
        assert_eq!(
            classify(&response(418, "teapot")),
            DirectoryError::Unexpected {
                status: 418,
                message: "teapot".into()
            }
        );
    }

    #[test]
    fn already_exists_detection_is_case_insensitive() {
        let r = response(
            400,
            r#"{"error":{"code":"Request_BadRequest","message":"Permission being assigned Already Exists on the object"}}"#,
        );
        assert!(mentions_already_exists(&r));
        assert!(!mentions_already_exists(&response(400, "bad principal id")));
    }

    #[test]
    fn missing_is_enabled_defaults_to_enabled() {
        let roles: ServicePrincipalRoles =
            serde_json::from_str(r#"{"appRoles":[{"id":"r1","displayName":"Reader"}]}"#).unwrap();
        assert!(roles.app_roles[0].is_enabled);
    }
}
