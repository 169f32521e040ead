//! Error types for rolesync-core.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::types::ApplicationId;

/// Errors from loading or saving the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (permission denied, read-only filesystem, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`, so we cannot locate `~/.rolesync/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// A setting failed validation.
    #[error("invalid setting '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Failure reported by a directory transport.
///
/// "Already exists" and "already gone" are not errors; they are reported as
/// [`crate::directory::CreateOutcome::AlreadyExists`] and
/// [`crate::directory::DeleteOutcome::AlreadyGone`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("forbidden: {message}")]
    Forbidden { message: String },

    #[error("not found: {message}")]
    NotFound { message: String },

    /// The application object itself no longer resolves.
    #[error("application {application} no longer exists")]
    ApplicationGone { application: ApplicationId },

    #[error("throttled by the directory after {attempts} attempts")]
    Throttled { attempts: u32 },

    #[error("transient failure: {message}")]
    Transient { message: String },

    #[error("unexpected directory response ({status}): {message}")]
    Unexpected { status: u16, message: String },
}

// ---------------------------------------------------------------------------
// Fetch errors
// ---------------------------------------------------------------------------

/// Why an assignment fetch failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    Unauthorized,
    NotFound,
    Transient,
    Unknown,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchErrorKind::Unauthorized => write!(f, "unauthorized"),
            FetchErrorKind::NotFound => write!(f, "not found"),
            FetchErrorKind::Transient => write!(f, "transient"),
            FetchErrorKind::Unknown => write!(f, "unknown"),
        }
    }
}

impl From<&DirectoryError> for FetchErrorKind {
    fn from(err: &DirectoryError) -> Self {
        match err {
            DirectoryError::Unauthorized { .. } | DirectoryError::Forbidden { .. } => {
                FetchErrorKind::Unauthorized
            }
            DirectoryError::NotFound { .. } | DirectoryError::ApplicationGone { .. } => {
                FetchErrorKind::NotFound
            }
            DirectoryError::Throttled { .. } | DirectoryError::Transient { .. } => {
                FetchErrorKind::Transient
            }
            DirectoryError::Unexpected { .. } => FetchErrorKind::Unknown,
        }
    }
}

/// The assignments of `application` could not be read completely.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to fetch assignments of {application} ({kind})")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub application: ApplicationId,
    #[source]
    pub source: DirectoryError,
}

impl FetchError {
    pub fn new(application: ApplicationId, source: DirectoryError) -> Self {
        Self {
            kind: FetchErrorKind::from(&source),
            application,
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Apply errors
// ---------------------------------------------------------------------------

/// Why a single plan entry did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyErrorKind {
    /// Already assigned / already gone. Counted as a skip, not a failure.
    Conflict,
    Transient,
    Forbidden,
    Unknown,
    /// Not attempted because the run hit a fatal condition first.
    Unattempted,
}

impl fmt::Display for ApplyErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplyErrorKind::Conflict => write!(f, "conflict"),
            ApplyErrorKind::Transient => write!(f, "transient"),
            ApplyErrorKind::Forbidden => write!(f, "forbidden"),
            ApplyErrorKind::Unknown => write!(f, "unknown"),
            ApplyErrorKind::Unattempted => write!(f, "unattempted"),
        }
    }
}

impl From<&DirectoryError> for ApplyErrorKind {
    fn from(err: &DirectoryError) -> Self {
        match err {
            DirectoryError::Unauthorized { .. } | DirectoryError::Forbidden { .. } => {
                ApplyErrorKind::Forbidden
            }
            DirectoryError::Throttled { .. } | DirectoryError::Transient { .. } => {
                ApplyErrorKind::Transient
            }
            DirectoryError::NotFound { .. }
            | DirectoryError::ApplicationGone { .. }
            | DirectoryError::Unexpected { .. } => ApplyErrorKind::Unknown,
        }
    }
}

/// The target application became unreachable mid-batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("target application {application} became unreachable: {reason}")]
pub struct FatalRunError {
    pub application: ApplicationId,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Role resolution
// ---------------------------------------------------------------------------

/// The target role for new assignments could not be determined.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoleResolutionError {
    #[error(
        "target application {application} uses {count} distinct roles; pass --target-role to pick one"
    )]
    Ambiguous {
        application: ApplicationId,
        count: usize,
    },

    #[error(
        "target application {application} declares {declared} app roles but none is enabled; pass --target-role to pick one"
    )]
    NoEnabledRole {
        application: ApplicationId,
        declared: usize,
    },

    #[error("could not read app roles of {application}")]
    Lookup {
        application: ApplicationId,
        #[source]
        source: DirectoryError,
    },
}
