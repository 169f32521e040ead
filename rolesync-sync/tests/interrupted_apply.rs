//! Interrupting an apply whose mutation is stuck in Graph throttling.

use std::time::{Duration, Instant};

use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use rolesync_core::{
    AddEntry, ApplicationId, AssignmentId, PrincipalKey, ReconciliationPlan, RemoveEntry, RoleId,
};
use rolesync_graph::{GraphClient, GraphConfig, GraphDirectory, TokenSource};
use rolesync_sync::{apply, cancel_pair, ApplyMode, EntryStatus};

fn directory(server: &MockServer) -> GraphDirectory {
    let config = GraphConfig {
        graph_endpoint: server.uri(),
        api_version: "v1.0".into(),
        page_size: 100,
        max_retries: 3,
        request_timeout: Duration::from_secs(5),
        retry_base_delay: Duration::from_millis(5),
    };
    let tokens = TokenSource::Static(SecretString::new("token".into()));
    GraphDirectory::new(GraphClient::new(&config, tokens).expect("client"))
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_during_retry_after_wait_stops_the_batch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "2")
                .set_body_json(json!({
                    "error": { "code": "TooManyRequests", "message": "slow down" }
                })),
        )
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let plan = ReconciliationPlan::new(
        vec![AddEntry {
            principal: PrincipalKey::user("alice"),
            role_id: RoleId::from("role-t"),
        }],
        vec![RemoveEntry {
            principal: PrincipalKey::user("bob"),
            assignment_id: AssignmentId::from("t-bob"),
        }],
    );
    let (handle, signal) = cancel_pair();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.cancel();
    });

    let dir = directory(&server);
    let started = Instant::now();
    let result = apply(
        &dir,
        &plan,
        &ApplicationId::from("sp-target"),
        ApplyMode::Live,
        &signal,
    )
    .await;

    assert!(
        started.elapsed() < Duration::from_millis(1500),
        "cancel not observed, took {:?}",
        started.elapsed()
    );
    assert!(result.cancelled);
    assert_eq!(result.failed, 0);
    assert_eq!(result.unattempted, 2);
    let statuses: Vec<_> = result.entries.iter().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        vec![EntryStatus::Unattempted, EntryStatus::Unattempted]
    );
}
