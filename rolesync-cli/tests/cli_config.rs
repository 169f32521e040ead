use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;
use tempfile::TempDir;

fn rolesync_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("rolesync"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env_remove("ROLESYNC_GRAPH_ENDPOINT")
        .env_remove("ROLESYNC_TENANT_ID")
        .env_remove("ROLESYNC_CLIENT_ID");
    cmd
}

fn config_yaml(home: &Path) -> String {
    fs::read_to_string(home.join(".rolesync").join("config.yaml")).expect("config written")
}

#[test]
fn init_writes_config_with_credentials_ids() {
    let home = TempDir::new().expect("home");

    rolesync_cmd(home.path())
        .args(["init", "--tenant-id", "contoso", "--client-id", "app-123"])
        .assert()
        .success()
        .stdout(contains("config.yaml"))
        .stdout(contains("ROLESYNC_CLIENT_SECRET"));

    let yaml = config_yaml(home.path());
    assert!(yaml.contains("tenant_id: contoso"), "got:\n{yaml}");
    assert!(yaml.contains("client_id: app-123"), "got:\n{yaml}");
    assert!(yaml.contains("page_size: 100"), "got:\n{yaml}");
}

#[test]
fn init_rejects_invalid_page_size_and_writes_nothing() {
    let home = TempDir::new().expect("home");

    rolesync_cmd(home.path())
        .args(["init", "--page-size", "5000"])
        .assert()
        .failure()
        .stderr(contains("page_size"));

    assert!(!home.path().join(".rolesync").join("config.yaml").exists());
}

#[test]
fn init_keeps_existing_aliases() {
    let home = TempDir::new().expect("home");

    rolesync_cmd(home.path())
        .args(["app", "add", "portal", "sp-portal"])
        .assert()
        .success();
    rolesync_cmd(home.path())
        .args(["init", "--tenant-id", "contoso"])
        .assert()
        .success();

    let yaml = config_yaml(home.path());
    assert!(yaml.contains("portal: sp-portal"), "got:\n{yaml}");
}

#[test]
fn app_add_list_and_remove() {
    let home = TempDir::new().expect("home");

    rolesync_cmd(home.path())
        .args(["app", "list"])
        .assert()
        .success()
        .stdout(contains("No application aliases configured."));

    rolesync_cmd(home.path())
        .args(["app", "add", "legacy", "0f1e-legacy"])
        .assert()
        .success()
        .stdout(contains("Added 'legacy'"));
    rolesync_cmd(home.path())
        .args(["app", "add", "legacy", "0f1e-renamed"])
        .assert()
        .success()
        .stdout(contains("Updated 'legacy'"));

    rolesync_cmd(home.path())
        .args(["app", "list"])
        .assert()
        .success()
        .stdout(contains("legacy").and(contains("0f1e-renamed")));

    rolesync_cmd(home.path())
        .args(["app", "remove", "legacy"])
        .assert()
        .success();
    rolesync_cmd(home.path())
        .args(["app", "remove", "legacy"])
        .assert()
        .failure()
        .stderr(contains("no alias named 'legacy'"));
}

#[test]
fn corrupt_config_is_reported() {
    let home = TempDir::new().expect("home");
    let dir = home.path().join(".rolesync");
    fs::create_dir_all(&dir).expect("mkdir");
    fs::write(dir.join("config.yaml"), "page_size: [not, a, number]\n").expect("write");

    rolesync_cmd(home.path())
        .args(["app", "list"])
        .assert()
        .code(1)
        .stderr(contains("failed to parse config"));
}
