//! rolesync configuration file.
//!
//! # Storage layout
//!
//! ```text
//! ~/.rolesync/            (mode 0700)
//!   config.yaml           (mode 0600)
//! ```
//!
//! # API pattern
//!
//! Every function touching the filesystem has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Tests must NEVER call the no-arg wrappers; always use `_at`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::ApplicationId;

pub const DEFAULT_GRAPH_ENDPOINT: &str = "https://graph.microsoft.com";
pub const DEFAULT_LOGIN_ENDPOINT: &str = "https://login.microsoftonline.com";
pub const DEFAULT_API_VERSION: &str = "v1.0";
pub const DEFAULT_PAGE_SIZE: u32 = 100;
/// Largest `$top` the directory accepts for assignment listings.
pub const MAX_PAGE_SIZE: u32 = 999;

pub const ENV_TENANT_ID: &str = "ROLESYNC_TENANT_ID";
pub const ENV_CLIENT_ID: &str = "ROLESYNC_CLIENT_ID";
pub const ENV_GRAPH_ENDPOINT: &str = "ROLESYNC_GRAPH_ENDPOINT";

/// Contents of `config.yaml`. Every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub graph_endpoint: String,
    pub login_endpoint: String,
    pub api_version: String,
    pub page_size: u32,
    /// Transport retries for throttled or transient responses.
    pub max_retries: u32,
    pub request_timeout_secs: u64,
    /// Application aliases: name → service principal object id.
    pub apps: BTreeMap<String, ApplicationId>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tenant_id: None,
            client_id: None,
            graph_endpoint: DEFAULT_GRAPH_ENDPOINT.to_string(),
            login_endpoint: DEFAULT_LOGIN_ENDPOINT.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            max_retries: 5,
            request_timeout_secs: 30,
            apps: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Overlay `ROLESYNC_*` variables on top of the file values.
    ///
    /// `lookup` is usually `|k| std::env::var(k).ok()`.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(tenant) = non_empty(ENV_TENANT_ID) {
            self.tenant_id = Some(tenant);
        }
        if let Some(client) = non_empty(ENV_CLIENT_ID) {
            self.client_id = Some(client);
        }
        if let Some(endpoint) = non_empty(ENV_GRAPH_ENDPOINT) {
            self.graph_endpoint = endpoint;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("graph_endpoint", &self.graph_endpoint),
            ("login_endpoint", &self.login_endpoint),
        ] {
            if !(value.starts_with("https://") || value.starts_with("http://")) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("'{value}' is not an http(s) URL"),
                });
            }
        }
        if self.api_version.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "api_version",
                reason: "must not be empty".to_string(),
            });
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::Invalid {
                field: "page_size",
                reason: format!("{} is outside 1..={MAX_PAGE_SIZE}", self.page_size),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "request_timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Resolve an alias from `apps`, or treat the input as a raw object id.
    pub fn resolve_application(&self, name_or_id: &str) -> ApplicationId {
        self.apps
            .get(name_or_id)
            .cloned()
            .unwrap_or_else(|| ApplicationId::from(name_or_id.trim()))
    }
}

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.rolesync/`. Pure, no I/O.
pub fn config_dir_at(home: &Path) -> PathBuf {
    home.join(".rolesync")
}

/// `<home>/.rolesync/config.yaml`. Pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    config_dir_at(home).join("config.yaml")
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load `<home>/.rolesync/config.yaml`.
///
/// A missing file yields [`Settings::default`]; malformed YAML returns
/// `ConfigError::Parse` with the path.
pub fn load_at(home: &Path) -> Result<Settings, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Ok(Settings::default());
    }
    let contents = std::fs::read_to_string(&path)?;
    if contents.trim().is_empty() {
        return Ok(Settings::default());
    }
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Settings, ConfigError> {
    load_at(&home()?)
}

// ---------------------------------------------------------------------------
// 3. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save settings to `<home>/.rolesync/config.yaml`.
///
/// Write flow: serialize → `config.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, settings: &Settings) -> Result<PathBuf, ConfigError> {
    let dir = config_dir_at(home);
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        set_dir_permissions(&dir)?;
    }
    let path = config_path_at(home);
    let tmp_path = path.with_file_name("config.yaml.tmp");

    let yaml = serde_yaml::to_string(settings)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    if let Err(e) = std::fs::rename(&tmp_path, &path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    Ok(path)
}

/// `save_at` convenience wrapper.
pub fn save(settings: &Settings) -> Result<PathBuf, ConfigError> {
    save_at(&home()?, settings)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_home() -> TempDir {
        TempDir::new().expect("tempdir")
    }

    #[test]
    fn config_path_is_correct() {
        let home = make_home();
        assert!(config_path_at(home.path()).ends_with(".rolesync/config.yaml"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let home = make_home();
        let settings = load_at(home.path()).expect("load");
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.graph_endpoint, DEFAULT_GRAPH_ENDPOINT);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let home = make_home();
        let mut settings = Settings {
            tenant_id: Some("contoso".into()),
            ..Settings::default()
        };
        settings
            .apps
            .insert("portal".into(), ApplicationId::from("sp-portal"));
        save_at(home.path(), &settings).expect("save");

        let loaded = load_at(home.path()).expect("load");
        assert_eq!(loaded, settings);
    }

    #[test]
    fn save_creates_private_files() {
        let home = make_home();
        let path = save_at(home.path(), &Settings::default()).expect("save");
        assert!(!path.with_file_name("config.yaml.tmp").exists());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600);
            let dir_mode = std::fs::metadata(config_dir_at(home.path()))
                .unwrap()
                .permissions()
                .mode()
                & 0o777;
            assert_eq!(dir_mode, 0o700);
        }
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let home = make_home();
        std::fs::create_dir_all(config_dir_at(home.path())).unwrap();
        std::fs::write(config_path_at(home.path()), "page_size: 250\n").unwrap();

        let settings = load_at(home.path()).expect("load");
        assert_eq!(settings.page_size, 250);
        assert_eq!(settings.api_version, DEFAULT_API_VERSION);
    }

    #[test]
    fn env_overrides_file_values() {
        let settings = Settings {
            tenant_id: Some("from-file".into()),
            ..Settings::default()
        }
        .with_env(|key| match key {
            ENV_TENANT_ID => Some("from-env".into()),
            ENV_GRAPH_ENDPOINT => Some("http://127.0.0.1:9000".into()),
            ENV_CLIENT_ID => Some("   ".into()),
            _ => None,
        });
        assert_eq!(settings.tenant_id.as_deref(), Some("from-env"));
        assert_eq!(settings.graph_endpoint, "http://127.0.0.1:9000");
        assert!(settings.client_id.is_none(), "blank env must not override");
    }

    #[test]
    fn resolve_application_prefers_alias() {
        let mut settings = Settings::default();
        settings
            .apps
            .insert("legacy".into(), ApplicationId::from("sp-legacy"));
        assert_eq!(
            settings.resolve_application("legacy"),
            ApplicationId::from("sp-legacy")
        );
        assert_eq!(
            settings.resolve_application("0f1e-raw-id"),
            ApplicationId::from("0f1e-raw-id")
        );
    }
}
