//! Bearer credentials for Microsoft Graph.
//!
//! The engine treats the token as opaque. Two sources are supported: a
//! pre-issued token, or the OAuth2 client-credentials grant with a cached
//! token refreshed shortly before expiry.

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use rolesync_core::{DirectoryError, Settings};

use crate::error::GraphError;

pub const ENV_ACCESS_TOKEN: &str = "ROLESYNC_ACCESS_TOKEN";
pub const ENV_CLIENT_SECRET: &str = "ROLESYNC_CLIENT_SECRET";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug)]
struct CachedToken {
    access_token: SecretString,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_expired(&self, grace_period: Duration) -> bool {
        Utc::now() + grace_period >= self.expires_at
    }
}

/// Client-credentials grant against `{login}/{tenant}/oauth2/v2.0/token`.
#[derive(Debug)]
pub struct ClientCredentials {
    token_url: String,
    client_id: String,
    client_secret: SecretString,
    scope: String,
    http: reqwest::Client,
    cached: RwLock<Option<CachedToken>>,
    grace_period: Duration,
}

impl ClientCredentials {
    pub fn new(
        login_endpoint: &str,
        tenant_id: &str,
        client_id: impl Into<String>,
        client_secret: SecretString,
        graph_endpoint: &str,
        http: reqwest::Client,
    ) -> Self {
        Self {
            token_url: format!(
                "{}/{}/oauth2/v2.0/token",
                login_endpoint.trim_end_matches('/'),
                tenant_id
            ),
            client_id: client_id.into(),
            client_secret,
            scope: format!("{}/.default", graph_endpoint.trim_end_matches('/')),
            http,
            cached: RwLock::new(None),
            grace_period: Duration::minutes(5),
        }
    }

    async fn token(&self) -> Result<String, DirectoryError> {
        {
            let cache = self.cached.read().await;
            if let Some(token) = cache.as_ref() {
                if !token.is_expired(self.grace_period) {
                    return Ok(token.access_token.expose_secret().clone());
                }
            }
        }

        let fresh = self.acquire().await?;
        let value = fresh.access_token.expose_secret().clone();
        *self.cached.write().await = Some(fresh);
        Ok(value)
    }

    #[instrument(skip(self), fields(client_id = %self.client_id))]
    async fn acquire(&self) -> Result<CachedToken, DirectoryError> {
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret().as_str()),
            ("scope", self.scope.as_str()),
        ];

        let response = self
            .http
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| DirectoryError::Transient {
                message: format!("token request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DirectoryError::Unauthorized {
                message: format!("token request rejected ({status}): {body}"),
            });
        }

        let token: TokenResponse =
            response
                .json()
                .await
                .map_err(|e| DirectoryError::Unauthorized {
                    message: format!("unreadable token response: {e}"),
                })?;
        let expires_at = Utc::now() + Duration::seconds(token.expires_in);
        debug!(%expires_at, "acquired access token");

        Ok(CachedToken {
            access_token: SecretString::new(token.access_token),
            expires_at,
        })
    }

    async fn invalidate(&self) {
        *self.cached.write().await = None;
    }
}

/// Where bearer tokens come from.
#[derive(Debug)]
pub enum TokenSource {
    /// A token issued out-of-band; never refreshed.
    Static(SecretString),
    ClientCredentials(ClientCredentials),
}

impl TokenSource {
    /// Pick a source from the environment and settings.
    ///
    /// `ROLESYNC_ACCESS_TOKEN` wins; otherwise tenant id, client id and
    /// `ROLESYNC_CLIENT_SECRET` must all be present.
    pub fn from_env(
        settings: &Settings,
        lookup: impl Fn(&str) -> Option<String>,
        http: reqwest::Client,
    ) -> Result<Self, GraphError> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = non_empty(ENV_ACCESS_TOKEN) {
            return Ok(Self::Static(SecretString::new(token)));
        }

        match (
            settings.tenant_id.as_deref(),
            settings.client_id.as_deref(),
            non_empty(ENV_CLIENT_SECRET),
        ) {
            (Some(tenant), Some(client), Some(secret)) => {
                Ok(Self::ClientCredentials(ClientCredentials::new(
                    &settings.login_endpoint,
                    tenant,
                    client,
                    SecretString::new(secret),
                    &settings.graph_endpoint,
                    http,
                )))
            }
            _ => Err(GraphError::MissingCredentials),
        }
    }

    /// A bearer token valid for at least the grace period.
    pub async fn bearer(&self) -> Result<String, DirectoryError> {
        match self {
            TokenSource::Static(token) => Ok(token.expose_secret().clone()),
            TokenSource::ClientCredentials(grant) => grant.token().await,
        }
    }

    /// Drop any cached token. Returns whether a fresh one can be acquired.
    pub async fn invalidate(&self) -> bool {
        match self {
            TokenSource::Static(_) => false,
            TokenSource::ClientCredentials(grant) => {
                grant.invalidate().await;
                true
            }
        }
    }
}
