//! Error types for rolesync-graph.

use thiserror::Error;

/// Errors raised while building a Graph transport.
///
/// Failures of individual directory calls are reported as
/// [`rolesync_core::DirectoryError`] instead.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid Graph endpoint '{url}'")]
    InvalidEndpoint { url: String },

    /// Neither an access token nor client credentials were supplied.
    #[error(
        "no credentials: set ROLESYNC_ACCESS_TOKEN, or tenant_id + client_id with ROLESYNC_CLIENT_SECRET"
    )]
    MissingCredentials,
}
