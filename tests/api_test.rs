//! End-to-end tests of the coordinator API over a real socket

use presence_gateway::domain::wire::{AckStatus, EnrollRequest, RenameRequest, ScanRequest};
use presence_gateway::domain::{IdentityId, Mode, ScanAction, ScanStatus, Timestamp};
use presence_gateway::infra::Metrics;
use presence_gateway::io::{serve, ClientError, CoordinatorApi, HttpCoordinatorClient};
use presence_gateway::services::{Ledger, SessionCoordinator};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

struct TestServer {
    base_url: String,
    client: HttpCoordinatorClient,
    shutdown: watch::Sender<bool>,
}

impl TestServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let ledger = Ledger::open_in_memory().unwrap();
        let coordinator = Arc::new(SessionCoordinator::new(ledger, 1, Arc::new(Metrics::new())));
        let (shutdown, shutdown_rx) = watch::channel(false);
        tokio::spawn(serve(listener, coordinator, shutdown_rx));

        let timeout = Duration::from_secs(5);
        let client = HttpCoordinatorClient::new(&base_url, timeout, timeout).unwrap();
        Self { base_url, client, shutdown }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

fn ts(value: &str) -> Timestamp {
    Timestamp::parse(value).unwrap()
}

fn ada() -> IdentityId {
    IdentityId::new("584190023411")
}

#[tokio::test]
async fn test_mode_round_trip() {
    let server = TestServer::start().await;

    assert_eq!(server.client.fetch_mode().await.unwrap(), Mode::Idle);

    let reply = server.client.set_mode("attendance").await.unwrap();
    assert_eq!(reply.status, AckStatus::Success);
    assert_eq!(reply.mode, Some(Mode::Attendance));
    assert_eq!(server.client.fetch_mode().await.unwrap(), Mode::Attendance);
}

#[tokio::test]
async fn test_invalid_mode_is_rejected_with_400() {
    let server = TestServer::start().await;

    match server.client.set_mode("party").await {
        Err(ClientError::Status { status, body }) => {
            assert_eq!(status, 400);
            assert!(body.contains("error"));
        }
        other => panic!("expected 400, got {:?}", other),
    }
    assert_eq!(server.client.fetch_mode().await.unwrap(), Mode::Idle);
}

#[tokio::test]
async fn test_attendance_day() {
    let server = TestServer::start().await;
    let client = &server.client;

    let ack = client
        .enroll(&EnrollRequest { identity_id: ada(), name: "Ada Lovelace".to_string() })
        .await
        .unwrap();
    assert_eq!(ack.status, AckStatus::Success);
    assert_eq!(ack.message, "Successfully enrolled Ada Lovelace");

    client.set_mode("attendance").await.unwrap();

    let reply = client
        .scan(&ScanRequest::new(ada()).at(ts("2024-01-01 09:00:00")))
        .await
        .unwrap();
    assert_eq!(reply.status, ScanStatus::Checkin);
    assert_eq!(reply.message, "Welcome, Ada Lovelace!");

    let reply = client
        .scan(&ScanRequest::new(ada()).at(ts("2024-01-01 09:00:30")))
        .await
        .unwrap();
    assert_eq!(reply.status, ScanStatus::Warning);
    assert_eq!(reply.remaining_seconds, Some(30));

    let reply = client
        .scan(&ScanRequest::new(ada()).at(ts("2024-01-01 17:30:00")))
        .await
        .unwrap();
    assert_eq!(reply.status, ScanStatus::Checkout);
    assert_eq!(reply.duration.as_deref(), Some("8:30:00"));

    let history = client.history().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].name, "Ada Lovelace");
    assert_eq!(history[0].check_in, ts("2024-01-01 09:00:00"));
    assert_eq!(history[0].check_out, Some(ts("2024-01-01 17:30:00")));

    let users = client.users().await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].active_checkin, None);
}

#[tokio::test]
async fn test_unknown_token_and_forced_actions() {
    let server = TestServer::start().await;
    let client = &server.client;
    client.set_mode("attendance").await.unwrap();

    let reply = client.scan(&ScanRequest::new(IdentityId::new("999"))).await.unwrap();
    assert_eq!(reply.status, ScanStatus::Unknown);
    assert_eq!(reply.message, "Unknown Card");

    client
        .enroll(&EnrollRequest { identity_id: ada(), name: "Ada".to_string() })
        .await
        .unwrap();

    let reply = client
        .scan(&ScanRequest::new(ada()).with_action(ScanAction::Checkout))
        .await
        .unwrap();
    assert_eq!(reply.status, ScanStatus::Error);

    let reply = client
        .scan(
            &ScanRequest::new(ada())
                .at(ts("2024-01-01 09:00:00"))
                .with_action(ScanAction::Checkin),
        )
        .await
        .unwrap();
    assert_eq!(reply.status, ScanStatus::Success);

    let users = client.users().await.unwrap();
    assert_eq!(users[0].active_checkin, Some(ts("2024-01-01 09:00:00")));
}

#[tokio::test]
async fn test_enroll_mode_registers_placeholder_and_rename() {
    let server = TestServer::start().await;
    let client = &server.client;
    client.set_mode("enroll").await.unwrap();

    let reply = client.scan(&ScanRequest::new(ada())).await.unwrap();
    assert_eq!(reply.status, ScanStatus::Enrolled);
    assert_eq!(reply.name.as_deref(), Some("Unknown Card 3411"));

    let reply = client.scan(&ScanRequest::new(ada())).await.unwrap();
    assert_eq!(reply.status, ScanStatus::Error);
    assert_eq!(reply.message, "Card already registered!");

    let ack = client
        .rename(&RenameRequest { identity_id: ada(), name: "Ada King".to_string() })
        .await
        .unwrap();
    assert_eq!(ack.status, AckStatus::Success);

    let users = client.users().await.unwrap();
    assert_eq!(users[0].name, "Ada King");
}

#[tokio::test]
async fn test_duplicate_enroll_is_an_error_reply() {
    let server = TestServer::start().await;
    let req = EnrollRequest { identity_id: ada(), name: "Ada".to_string() };

    server.client.enroll(&req).await.unwrap();
    let ack = server.client.enroll(&req).await.unwrap();
    assert_eq!(ack.status, AckStatus::Error);
    assert_eq!(ack.message, "Card already registered!");
}

#[tokio::test]
async fn test_malformed_body_is_400() {
    let server = TestServer::start().await;

    let response = reqwest::Client::new()
        .post(format!("{}/api/scan", server.base_url))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn test_unprefixed_routes_health_metrics_and_404() {
    let server = TestServer::start().await;
    let http = reqwest::Client::new();

    let response = http.get(format!("{}/health", server.base_url)).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().await.unwrap(), "ok");

    let response = http.get(format!("{}/mode", server.base_url)).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert!(response.text().await.unwrap().contains("idle"));

    server.client.scan(&ScanRequest::new(ada())).await.unwrap();
    let response = http.get(format!("{}/metrics", server.base_url)).send().await.unwrap();
    let body = response.text().await.unwrap();
    assert!(body.contains("presence_scans_total 1"));

    let response = http.get(format!("{}/api/nope", server.base_url)).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn test_blank_scan_timestamp_uses_coordinator_clock() {
    let server = TestServer::start().await;
    server
        .client
        .enroll(&EnrollRequest { identity_id: ada(), name: "Ada".to_string() })
        .await
        .unwrap();
    server.client.set_mode("attendance").await.unwrap();

    let response = reqwest::Client::new()
        .post(format!("{}/api/scan", server.base_url))
        .header("content-type", "application/json")
        .body(r#"{"card_id":"584190023411","timestamp":""}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert!(response.text().await.unwrap().contains("checkin"));

    let users = server.client.users().await.unwrap();
    assert!(users[0].active_checkin.is_some());
}
