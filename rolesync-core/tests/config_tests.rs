//! Config file error-message, atomic-write-safety and alias integration tests.
//! Storage: ~/.rolesync/config.yaml

use assert_fs::prelude::*;
use predicates::prelude::predicate;
use rolesync_core::{
    config::{self, Settings},
    ApplicationId, ConfigError,
};
use std::fs;

fn write_config(home: &assert_fs::TempDir, contents: &[u8]) {
    let dir = config::config_dir_at(home.path());
    fs::create_dir_all(&dir).expect("mkdir");
    fs::write(config::config_path_at(home.path()), contents).expect("write");
}

// ---------------------------------------------------------------------------
// 1. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn load_corrupt_yaml_returns_parse_error_with_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_config(&home, b": : corrupt : yaml : !!!\n  - broken: [unclosed");

    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    let msg = err.to_string();
    assert!(msg.contains("config.yaml"), "must contain file path, got: {msg}");
}

#[test]
fn load_wrong_type_yaml_returns_parse_error() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_config(&home, b"- this is a list, not a mapping\n");

    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
}

#[test]
fn empty_file_is_treated_as_defaults() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_config(&home, b"\n");
    assert_eq!(config::load_at(home.path()).expect("load"), Settings::default());
}

// ---------------------------------------------------------------------------
// 2. Atomic write safety
// ---------------------------------------------------------------------------

#[test]
fn save_writes_config_and_no_tmp() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    config::save_at(home.path(), &Settings::default()).expect("save");

    home.child(".rolesync/config.yaml")
        .assert(predicate::path::exists());
    home.child(".rolesync/config.yaml.tmp")
        .assert(predicate::path::missing());
}

#[test]
fn orphan_tmp_does_not_affect_saved_config() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let settings = Settings {
        tenant_id: Some("contoso".into()),
        ..Settings::default()
    };
    config::save_at(home.path(), &settings).expect("save");

    // Simulate crash: .tmp written but process died before rename
    let tmp = config::config_path_at(home.path()).with_file_name("config.yaml.tmp");
    fs::write(&tmp, b"CRASH - INCOMPLETE WRITE").expect("write crash tmp");

    let loaded = config::load_at(home.path()).expect("load");
    assert_eq!(loaded.tenant_id.as_deref(), Some("contoso"));
}

// ---------------------------------------------------------------------------
// 3. Validation and aliases
// ---------------------------------------------------------------------------

#[test]
fn page_size_above_directory_limit_is_rejected() {
    let settings = Settings {
        page_size: 5000,
        ..Settings::default()
    };
    let err = settings.validate().unwrap_err();
    assert!(err.to_string().contains("page_size"), "got: {err}");
}

#[test]
fn non_http_endpoint_is_rejected() {
    let settings = Settings {
        graph_endpoint: "graph.microsoft.com".into(),
        ..Settings::default()
    };
    assert!(matches!(
        settings.validate(),
        Err(ConfigError::Invalid {
            field: "graph_endpoint",
            ..
        })
    ));
}

#[test]
fn defaults_are_valid() {
    Settings::default().validate().expect("defaults validate");
}

#[test]
fn aliases_survive_a_roundtrip_and_resolve() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let mut settings = Settings::default();
    settings
        .apps
        .insert("hr-portal".into(), ApplicationId::from("4d1c-origin"));
    settings
        .apps
        .insert("hr-portal-eu".into(), ApplicationId::from("93ab-target"));
    config::save_at(home.path(), &settings).expect("save");

    let loaded = config::load_at(home.path()).expect("load");
    assert_eq!(
        loaded.resolve_application("hr-portal-eu"),
        ApplicationId::from("93ab-target")
    );
    let yaml = fs::read_to_string(config::config_path_at(home.path())).expect("read");
    assert!(yaml.contains("hr-portal: 4d1c-origin"), "yaml: {yaml}");
}
