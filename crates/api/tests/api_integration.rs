//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use api::config::Config;
use api::state::AppState;
use api::ws::Outbound;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::ConnectionId;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::mpsc;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

const BASE_URL: &str = "http://localhost:3000";

const VALID_PAYLOAD: &str = r#"{
    "customerName": "alice",
    "invoiceNumber": "INV-1",
    "totalValue": 120.5,
    "productId": "p-1",
    "quantity": 4
}"#;

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> (axum::Router, Arc<AppState>) {
    let state = api::create_default_state(&Config::default());
    let app = api::create_app(state.clone(), get_metrics_handle());
    (app, state)
}

/// Registers a connection the way the socket handler does and returns the
/// receiving end of its writer channel.
fn connect(state: &AppState) -> (ConnectionId, mpsc::UnboundedReceiver<Outbound>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (state.connections.add_connection(tx), rx)
}

async fn next_frame(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> serde_json::Value {
    let outbound = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("no frame received in time")
        .expect("connection channel closed");
    match outbound {
        Outbound::Text(text) => serde_json::from_str(&text).unwrap(),
        Outbound::Close => panic!("unexpected close"),
    }
}

async fn put(app: &axum::Router, uri: &str, body: &str) -> StatusCode {
    app.clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(uri)
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
        .status()
}

fn upload_path(url: &str) -> &str {
    url.strip_prefix(BASE_URL).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = setup();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint_reports_issued_slots() {
    let (app, state) = setup();
    let (conn, mut rx) = connect(&state);

    state
        .coordinator
        .handle_text(&conn, r#"{"action":"getImportUrl"}"#, None)
        .await;
    next_frame(&mut rx).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("import_slots_issued_total"));
}

#[tokio::test]
async fn test_upload_rejects_unknown_bucket() {
    let (app, state) = setup();
    let credential = state.stage.signed_upload_url("abc", 300).await.unwrap();

    let status = put(
        &app,
        &format!("/stage/other/abc?token={}", credential.token),
        "{}",
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_credential_rules() {
    let (app, state) = setup();

    let bad = put(&app, "/stage/invoices/abc?token=forged", "{}").await;
    assert_eq!(bad, StatusCode::FORBIDDEN);

    let credential = state.stage.signed_upload_url("abc", 300).await.unwrap();
    let path = upload_path(&credential.url).to_string();
    assert_eq!(put(&app, &path, "{}").await, StatusCode::OK);

    // Single use.
    assert_eq!(put(&app, &path, "{}").await, StatusCode::FORBIDDEN);

    // Write once, even with a new credential.
    let again = state.stage.signed_upload_url("abc", 300).await.unwrap();
    assert_eq!(
        put(&app, upload_path(&again.url), "{}").await,
        StatusCode::CONFLICT
    );
}

#[tokio::test]
async fn test_upload_without_token_is_rejected() {
    let (app, _) = setup();
    let status = put(&app, "/stage/invoices/abc", "{}").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_import_over_push_channel() {
    let (app, state) = setup();
    let listeners = state.coordinator.spawn_listeners();
    let (conn, mut rx) = connect(&state);

    state
        .coordinator
        .handle_text(&conn, r#"{"action":"getImportUrl"}"#, Some("req-1"))
        .await;
    let slot = next_frame(&mut rx).await;
    assert_eq!(slot["expires"], 300);
    let transaction_id = slot["transactionId"].as_str().unwrap().to_string();
    let url = slot["url"].as_str().unwrap();
    assert!(url.starts_with(&format!("{BASE_URL}/stage/invoices/{transaction_id}?token=")));

    assert_eq!(put(&app, upload_path(url), VALID_PAYLOAD).await, StatusCode::OK);

    let received = next_frame(&mut rx).await;
    assert_eq!(received["transactionId"], transaction_id.as_str());
    assert_eq!(received["status"], "RECEIVED");
    let processed = next_frame(&mut rx).await;
    assert_eq!(processed["status"], "PROCESSED");

    for listener in listeners {
        listener.abort();
    }
}

#[tokio::test]
async fn test_cancel_over_push_channel() {
    let (app, state) = setup();
    let (conn, mut rx) = connect(&state);

    state
        .coordinator
        .handle_text(&conn, r#"{"action":"getImportUrl"}"#, None)
        .await;
    let slot = next_frame(&mut rx).await;
    let transaction_id = slot["transactionId"].as_str().unwrap();

    state
        .coordinator
        .handle_text(
            &conn,
            &format!(r#"{{"action":"cancelImport","transactionId":"{transaction_id}"}}"#),
            None,
        )
        .await;
    let canceled = next_frame(&mut rx).await;
    assert_eq!(canceled["status"], "CANCELED");

    // Cancel again: the requester learns the current status.
    state
        .coordinator
        .handle_text(
            &conn,
            &format!(r#"{{"action":"cancelImport","transactionId":"{transaction_id}"}}"#),
            None,
        )
        .await;
    assert_eq!(next_frame(&mut rx).await["status"], "CANCELED");

    // The upload URL is dead once the import is canceled.
    let url = slot["url"].as_str().unwrap();
    assert_eq!(
        put(&app, upload_path(url), VALID_PAYLOAD).await,
        StatusCode::FORBIDDEN
    );
}

#[tokio::test]
async fn test_cancel_unknown_transaction() {
    let (_, state) = setup();
    let (conn, mut rx) = connect(&state);

    state
        .coordinator
        .handle_text(
            &conn,
            r#"{"action":"cancelImport","transactionId":"missing"}"#,
            None,
        )
        .await;
    let frame = next_frame(&mut rx).await;
    assert_eq!(frame["transactionId"], "missing");
    assert_eq!(frame["status"], "NOT_FOUND");
}

#[tokio::test]
async fn test_timeout_closes_connection() {
    let config = Config {
        transaction_ttl_secs: 0,
        ..Config::default()
    };
    let state = api::create_default_state(&config);
    let listeners = state.coordinator.spawn_listeners();
    let (conn, mut rx) = connect(&state);

    state
        .coordinator
        .handle_text(&conn, r#"{"action":"getImportUrl"}"#, None)
        .await;
    next_frame(&mut rx).await;

    importer::ExpirySweeper::new(
        state.coordinator.context().transactions.clone(),
        Duration::from_secs(5),
    )
    .sweep_once()
    .await
    .unwrap();

    assert_eq!(next_frame(&mut rx).await["status"], "TIMEOUT");
    let close = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap();
    assert_eq!(close, Some(Outbound::Close));
    assert!(!state.connections.is_live(&conn));

    for listener in listeners {
        listener.abort();
    }
}
