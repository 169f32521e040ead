//! Microsoft Graph HTTP client with bearer injection and retries.
//!
//! Retries are the transport's concern: `429` honors `Retry-After`,
//! `502`/`503`/`504` and connection failures back off exponentially. Once
//! `max_retries` is spent the failure is surfaced as
//! [`DirectoryError::Throttled`] or [`DirectoryError::Transient`].

use std::time::Duration;

use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use rolesync_core::{DirectoryError, Settings};

use crate::auth::TokenSource;
use crate::error::GraphError;

/// Upper bound on a server-requested `Retry-After` wait.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(120);

/// `OData` error response from Microsoft Graph.
#[derive(Debug, Deserialize)]
pub struct ODataError {
    pub error: ODataErrorBody,
}

/// `OData` error body.
#[derive(Debug, Deserialize)]
pub struct ODataErrorBody {
    pub code: String,
    pub message: String,
}

/// Transport settings derived from [`Settings`].
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub graph_endpoint: String,
    pub api_version: String,
    pub page_size: u32,
    pub max_retries: u32,
    pub request_timeout: Duration,
    /// First backoff step for transient failures; doubles per retry.
    pub retry_base_delay: Duration,
}

impl GraphConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            graph_endpoint: settings.graph_endpoint.clone(),
            api_version: settings.api_version.clone(),
            page_size: settings.page_size,
            max_retries: settings.max_retries,
            request_timeout: Duration::from_secs(settings.request_timeout_secs),
            retry_base_delay: Duration::from_secs(1),
        }
    }
}

/// Status and body of a completed (non-retried) response.
#[derive(Debug)]
pub struct GraphResponse {
    pub status: StatusCode,
    pub body: String,
}

impl GraphResponse {
    /// Graph's `{error: {code, message}}` body, when present.
    pub fn odata_error(&self) -> Option<ODataErrorBody> {
        serde_json::from_str::<ODataError>(&self.body)
            .ok()
            .map(|e| e.error)
    }

    /// `code: message` from the error body, or the raw body.
    pub fn error_message(&self) -> String {
        match self.odata_error() {
            Some(err) => format!("{}: {}", err.code, err.message),
            None if self.body.is_empty() => self.status.to_string(),
            None => self.body.clone(),
        }
    }
}

/// Microsoft Graph API client.
#[derive(Debug)]
pub struct GraphClient {
    http: reqwest::Client,
    tokens: TokenSource,
    base_url: Url,
    page_size: u32,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl GraphClient {
    /// Creates a client with its own HTTP connection pool.
    pub fn new(config: &GraphConfig, tokens: TokenSource) -> Result<Self, GraphError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Self::with_http(config, tokens, http)
    }

    pub fn with_http(
        config: &GraphConfig,
        tokens: TokenSource,
        http: reqwest::Client,
    ) -> Result<Self, GraphError> {
        let raw = format!(
            "{}/{}",
            config.graph_endpoint.trim_end_matches('/'),
            config.api_version.trim_matches('/')
        );
        let base_url = Url::parse(&raw).map_err(|_| GraphError::InvalidEndpoint { url: raw.clone() })?;
        if base_url.cannot_be_a_base() {
            return Err(GraphError::InvalidEndpoint { url: raw });
        }

        Ok(Self {
            http,
            tokens,
            base_url,
            page_size: config.page_size,
            max_retries: config.max_retries,
            retry_base_delay: config.retry_base_delay,
        })
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Base URL extended with percent-encoded path `segments`.
    pub fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Send a request, retrying throttled and transient failures.
    ///
    /// Any other status is returned to the caller for classification.
    #[instrument(skip(self, body), fields(method = %method, url = %url))]
    pub async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
    ) -> Result<GraphResponse, DirectoryError> {
        let mut attempt = 0u32;
        let mut delay = self.retry_base_delay;
        let mut refreshed_token = false;

        loop {
            attempt += 1;
            let token = self.tokens.bearer().await?;
            let mut request = self
                .http
                .request(method.clone(), url.clone())
                .bearer_auth(token);
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(err) if is_retryable_transport(&err) && attempt <= self.max_retries => {
                    warn!(error = %err, attempt, "transport error, retrying after {delay:?}");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    continue;
                }
                Err(err) => {
                    return Err(DirectoryError::Transient {
                        message: format!("request failed after {attempt} attempts: {err}"),
                    })
                }
            };

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                if attempt > self.max_retries {
                    return Err(DirectoryError::Throttled { attempts: attempt });
                }
                let wait = retry_after(response.headers()).unwrap_or(delay);
                warn!(attempt, "throttled, retrying after {wait:?}");
                tokio::time::sleep(wait).await;
                delay *= 2;
                continue;
            }

            if matches!(
                status,
                StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
            ) {
                if attempt > self.max_retries {
                    let body = response.text().await.unwrap_or_default();
                    return Err(DirectoryError::Transient {
                        message: format!("{status} after {attempt} attempts: {body}"),
                    });
                }
                warn!(%status, attempt, "transient error, retrying after {delay:?}");
                tokio::time::sleep(delay).await;
                delay *= 2;
                continue;
            }

            if status == StatusCode::UNAUTHORIZED && !refreshed_token && self.tokens.invalidate().await {
                debug!("401 with cached token, refreshing once");
                refreshed_token = true;
                continue;
            }

            let body = response.text().await.map_err(|e| DirectoryError::Transient {
                message: format!("failed to read response body: {e}"),
            })?;
            debug!(%status, "response received");
            return Ok(GraphResponse { status, body });
        }
    }
}

fn is_retryable_transport(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout()
}

fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| Duration::from_secs(secs).min(MAX_RETRY_AFTER))
}
