//! Microsoft Graph transport for rolesync.
//!
//! - [`auth`]: bearer tokens (pre-issued or client-credentials)
//! - [`client`]: HTTP with retries on throttling and transient failures
//! - [`directory`]: [`rolesync_core::DirectoryApi`] over `appRoleAssignedTo`

pub mod auth;
pub mod client;
pub mod directory;
pub mod error;

pub use auth::TokenSource;
pub use client::{GraphClient, GraphConfig};
pub use directory::GraphDirectory;
pub use error::GraphError;

use rolesync_core::Settings;

/// Build a [`GraphDirectory`] from settings and credential variables.
///
/// `lookup` is usually `|k| std::env::var(k).ok()`.
pub fn connect(
    settings: &Settings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<GraphDirectory, GraphError> {
    let config = GraphConfig::from_settings(settings);
    let http = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()?;
    let tokens = TokenSource::from_env(settings, lookup, http.clone())?;
    let client = GraphClient::with_http(&config, tokens, http)?;
    Ok(GraphDirectory::new(client))
}
