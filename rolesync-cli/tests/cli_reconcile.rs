//! `rolesync add|remove|sync|diff` against a mocked Microsoft Graph.

use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ORIGIN: &str = "sp-origin";
const TARGET: &str = "sp-target";

fn rolesync_cmd(home: &Path, server: &MockServer) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("rolesync"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env("ROLESYNC_GRAPH_ENDPOINT", server.uri())
        .env("ROLESYNC_ACCESS_TOKEN", "test-token")
        .env_remove("ROLESYNC_CLIENT_SECRET")
        .env_remove("ROLESYNC_TENANT_ID")
        .env_remove("ROLESYNC_CLIENT_ID")
        .env_remove("RUST_LOG");
    cmd
}

fn assigned_to(app: &str) -> String {
    format!("/v1.0/servicePrincipals/{app}/appRoleAssignedTo")
}

fn record(id: &str, principal: &str, kind: &str, role: &str) -> Value {
    json!({
        "id": id,
        "principalId": principal,
        "principalType": kind,
        "appRoleId": role,
    })
}

/// origin = {alice:User, teamX:Group}, target = {teamX:Group, bob:User}
async fn mount_listings(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(assigned_to(ORIGIN)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                record("o-alice", "alice", "User", "role-o"),
                record("o-team", "teamX", "Group", "role-o"),
            ]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(assigned_to(TARGET)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                record("t-team", "teamX", "Group", "role-t"),
                record("t-bob", "bob", "User", "role-t"),
            ]
        })))
        .mount(server)
        .await;
}

async fn expect_no_mutations(server: &MockServer) {
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(server)
        .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn dry_run_sync_reports_plan_and_mutates_nothing() {
    let server = MockServer::start().await;
    mount_listings(&server).await;
    expect_no_mutations(&server).await;
    let home = TempDir::new().expect("home");

    rolesync_cmd(home.path(), &server)
        .args(["sync", ORIGIN, TARGET, "--dry-run"])
        .assert()
        .success()
        .stdout(contains("[dry-run] planned: 1 to add, 1 to remove"))
        .stdout(contains("would add"))
        .stdout(contains("would remove"));
}

#[tokio::test(flavor = "multi_thread")]
async fn dry_run_json_is_labelled() {
    let server = MockServer::start().await;
    mount_listings(&server).await;
    expect_no_mutations(&server).await;
    let home = TempDir::new().expect("home");

    let output = rolesync_cmd(home.path(), &server)
        .args(["sync", ORIGIN, TARGET, "--dry-run", "--json"])
        .output()
        .expect("run");
    assert!(output.status.success());

    let report: Value = serde_json::from_slice(&output.stdout).expect("json stdout");
    assert_eq!(report["dry_run"], true);
    assert_eq!(report["command"], "sync");
    assert_eq!(report["target_role"], "role-t");
    assert_eq!(report["result"]["added"], 1);
    assert_eq!(report["result"]["removed"], 1);
    assert_eq!(report["result"]["entries"][0]["principal"]["id"], "alice");
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_creates_and_deletes() {
    let server = MockServer::start().await;
    mount_listings(&server).await;
    Mock::given(method("POST"))
        .and(path(assigned_to(TARGET)))
        .respond_with(ResponseTemplate::new(201).set_body_json(record(
            "t-alice", "alice", "User", "role-t",
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("{}/t-bob", assigned_to(TARGET))))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    let home = TempDir::new().expect("home");

    rolesync_cmd(home.path(), &server)
        .args(["sync", ORIGIN, TARGET])
        .assert()
        .success()
        .stdout(contains("1 added, 1 removed, 0 skipped, 0 failed"));
}

#[tokio::test(flavor = "multi_thread")]
async fn add_only_creates() {
    let server = MockServer::start().await;
    mount_listings(&server).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201).set_body_json(record(
            "t-alice", "alice", "User", "role-t",
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;
    let home = TempDir::new().expect("home");

    rolesync_cmd(home.path(), &server)
        .args(["add", ORIGIN, TARGET])
        .assert()
        .success();
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_entry_exits_with_partial_status() {
    let server = MockServer::start().await;
    mount_listings(&server).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": { "code": "Authorization_RequestDenied", "message": "Insufficient privileges" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    let home = TempDir::new().expect("home");

    rolesync_cmd(home.path(), &server)
        .args(["sync", ORIGIN, TARGET])
        .assert()
        .code(2)
        .stdout(contains("1 failed"))
        .stdout(contains("alice"));
}

#[tokio::test(flavor = "multi_thread")]
async fn unauthorized_target_fails_before_any_mutation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(assigned_to(ORIGIN)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": [] })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(assigned_to(TARGET)))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": { "code": "Authorization_RequestDenied", "message": "Insufficient privileges" }
        })))
        .mount(&server)
        .await;
    expect_no_mutations(&server).await;
    let home = TempDir::new().expect("home");

    rolesync_cmd(home.path(), &server)
        .args(["sync", ORIGIN, TARGET])
        .assert()
        .code(1)
        .stderr(contains("no changes were made"))
        .stderr(contains(TARGET));

    let output = rolesync_cmd(home.path(), &server)
        .args(["sync", ORIGIN, TARGET, "--json"])
        .output()
        .expect("run");
    assert_eq!(output.status.code(), Some(1));
    let doc: Value = serde_json::from_slice(&output.stdout).expect("json stdout");
    assert_eq!(doc["error"]["kind"], "unauthorized");
    assert_eq!(doc["error"]["application"], TARGET);
}

#[tokio::test(flavor = "multi_thread")]
async fn diff_prints_plan_without_mutating() {
    let server = MockServer::start().await;
    mount_listings(&server).await;
    expect_no_mutations(&server).await;
    let home = TempDir::new().expect("home");

    let output = rolesync_cmd(home.path(), &server)
        .args(["diff", ORIGIN, TARGET, "--json"])
        .output()
        .expect("run");
    assert!(output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout).expect("json stdout");
    assert_eq!(report["plan"]["to_add"][0]["principal"]["id"], "alice");
    assert_eq!(report["plan"]["to_add"][0]["role_id"], "role-t");
    assert_eq!(report["plan"]["to_remove"][0]["assignment_id"], "t-bob");
    assert_eq!(report["origin_assignments"], 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn aliases_resolve_to_object_ids() {
    let server = MockServer::start().await;
    mount_listings(&server).await;
    expect_no_mutations(&server).await;
    let home = TempDir::new().expect("home");

    for (alias, id) in [("portal", ORIGIN), ("crm", TARGET)] {
        rolesync_cmd(home.path(), &server)
            .args(["app", "add", alias, id])
            .assert()
            .success();
    }

    rolesync_cmd(home.path(), &server)
        .args(["diff", "portal", "crm"])
        .assert()
        .success()
        .stdout(contains(ORIGIN))
        .stdout(contains(TARGET));
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_credentials_is_a_configuration_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(".*"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let home = TempDir::new().expect("home");

    rolesync_cmd(home.path(), &server)
        .env_remove("ROLESYNC_ACCESS_TOKEN")
        .args(["sync", ORIGIN, TARGET])
        .assert()
        .code(1)
        .stderr(contains("ROLESYNC_ACCESS_TOKEN"));
}
