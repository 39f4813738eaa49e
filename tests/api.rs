//! HTTP adapter tests, driven through the router with `oneshot`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use machinewatch::api::{self, state::AppState};
use machinewatch::config::Config;
use machinewatch::pipeline::Pipeline;

fn app() -> (Router, Arc<Pipeline>) {
    let pipeline = Arc::new(Pipeline::start(&Config::default()));
    (api::router(AppState::new(pipeline.clone())), pipeline)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(b) => builder
            .header("content-type", "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn create_oven(app: &Router) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/machines",
        Some(json!({
            "name": "Oven 1",
            "type": "Industrial Oven",
            "location": "Line 3",
            "serial_number": "SN-2001-A",
            "thresholds": { "temperature_critical": 85.0, "vibration_max": 20.0 }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["data"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_reports_pipeline() {
    let (app, _) = app();
    let (status, body) = send(&app, Method::GET, "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["pipeline"]["scorer"], "threshold");
    assert!(body["meta"]["timestamp"].is_string());
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let (app, _) = app();
    let (status, _) = send(&app, Method::GET, "/api/v1/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_machine_registration_and_lookup() {
    let (app, _) = app();
    let id = create_oven(&app).await;

    let (status, body) = send(&app, Method::GET, &format!("/api/v1/machines/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["type"], "Industrial Oven");
    assert_eq!(body["data"]["thresholds"]["vibration_max"], 20.0);

    let (status, body) = send(&app, Method::GET, "/api/v1/machines?limit=10", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["meta"]["limit"], 10);
    assert_eq!(body["meta"]["total"], 1);

    // same serial again
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/machines",
        Some(json!({ "name": "Oven 2", "serial_number": "SN-2001-A" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "DUPLICATE_SERIAL");

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/v1/machines/00000000-0000-0000-0000-000000000000",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "UNKNOWN_MACHINE");
}

#[tokio::test]
async fn test_empty_machine_name_rejected() {
    let (app, _) = app();
    let (status, body) = send(&app, Method::POST, "/api/v1/machines", Some(json!({ "name": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_ingest_then_read_back_and_alert() {
    let (app, pipeline) = app();
    let id = create_oven(&app).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/readings",
        Some(json!({
            "machine_id": id,
            "temperature": 90.0,
            "vibration": 25.0,
            "pressure": 3.0,
            "current": 10.0
        })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["data"]["sequence"], 0);
    assert_eq!(body["data"]["evaluation"], "queued");

    let (status, body) = send(&app, Method::GET, &format!("/api/v1/machines/{id}/readings"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["temperature"], 90.0);
    assert_eq!(body["meta"]["count"], 1);

    pipeline.wait_idle().await;

    let (_, body) = send(&app, Method::GET, &format!("/api/v1/machines/{id}/alerts"), None).await;
    let alerts = body["data"].as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["severity"], "Critical");
    assert_eq!(alerts[0]["type"], "threshold_exceeded");

    let (_, body) = send(
        &app,
        Method::GET,
        &format!("/api/v1/machines/{id}/predictions?anomalous=true"),
        None,
    )
    .await;
    assert_eq!(body["data"][0]["anomaly_score"], 0.7);
    assert_eq!(body["data"][0]["label"], "Anomaly");
}

#[tokio::test]
async fn test_invalid_and_unknown_readings() {
    let (app, _) = app();
    let id = create_oven(&app).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/readings",
        Some(json!({
            "machine_id": id,
            "temperature": -300.0,
            "vibration": 1.0,
            "pressure": 1.0,
            "current": 1.0
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "INVALID_READING");

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/readings",
        Some(json!({
            "machine_id": "00000000-0000-0000-0000-000000000000",
            "temperature": 20.0,
            "vibration": 1.0,
            "pressure": 1.0,
            "current": 1.0
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_batch_reports_per_item() {
    let (app, _) = app();
    let id = create_oven(&app).await;
    let reading = |machine_id: &str, temperature: f64| {
        json!({
            "machine_id": machine_id,
            "temperature": temperature,
            "vibration": 1.0,
            "pressure": 1.0,
            "current": 1.0
        })
    };

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/readings/batch",
        Some(json!([
            reading(&id, 40.0),
            reading("00000000-0000-0000-0000-000000000000", 40.0),
            reading(&id, 41.0),
        ])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["accepted"], 2);
    assert_eq!(body["meta"]["rejected"], 1);
    assert_eq!(body["data"][1]["status"], "rejected");
    assert_eq!(body["data"][1]["code"], "UNKNOWN_MACHINE");
    assert_eq!(body["data"][2]["ack"]["sequence"], 1);

    let (status, body) = send(&app, Method::POST, "/api/v1/readings/batch", Some(json!([]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));
    assert_eq!(body["meta"]["accepted"], 0);
    assert_eq!(body["meta"]["rejected"], 0);
}

#[tokio::test]
async fn test_manual_alert_resolve_and_fleet_views() {
    let (app, _) = app();
    let id = create_oven(&app).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/alerts",
        Some(json!({
            "machine_id": id,
            "type": "sensor_failure",
            "severity": "Emergency",
            "message": "pressure transducer offline"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let alert_id = body["data"]["id"].as_str().unwrap().to_string();

    let (_, body) = send(&app, Method::GET, "/api/v1/fleet/most-at-risk", None).await;
    assert_eq!(body["data"]["machine_id"], id.as_str());
    assert_eq!(body["data"]["risk_score"], 3);

    let (_, body) = send(&app, Method::GET, "/api/v1/fleet/summary", None).await;
    assert_eq!(body["data"]["unresolved_emergency"], 1);

    let resolve_uri = format!("/api/v1/alerts/{alert_id}/resolve");
    let (status, body) = send(&app, Method::POST, &resolve_uri, Some(json!({ "resolved_by": "ops" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_resolved"], true);
    assert_eq!(body["data"]["resolved_by"], "ops");

    let (status, body) = send(&app, Method::POST, &resolve_uri, Some(json!({}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "ALREADY_RESOLVED");

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/alerts/00000000-0000-0000-0000-000000000000/resolve",
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(&app, Method::GET, "/api/v1/fleet/most-at-risk", None).await;
    assert!(body["data"].is_null());

    let (_, body) = send(&app, Method::GET, "/api/v1/alerts?resolved=true", None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

async fn raise_manual_alert(app: &Router, machine_id: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/alerts",
        Some(json!({
            "machine_id": machine_id,
            "type": "predictive_warning",
            "severity": "Warning",
            "message": "bearing service overdue"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["data"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_resolve_without_body() {
    let (app, _) = app();
    let id = create_oven(&app).await;

    let alert_id = raise_manual_alert(&app, &id).await;
    let (status, body) = send(&app, Method::POST, &format!("/api/v1/alerts/{alert_id}/resolve"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_resolved"], true);
    assert!(body["data"]["resolved_by"].is_null());

    let alert_id = raise_manual_alert(&app, &id).await;
    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/v1/alerts/{alert_id}/resolve?resolved_by=night-shift"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["resolved_by"], "night-shift");
}

#[tokio::test]
async fn test_resolve_with_malformed_body_is_400() {
    let (app, _) = app();
    let id = create_oven(&app).await;
    let alert_id = raise_manual_alert(&app, &id).await;

    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("/api/v1/alerts/{alert_id}/resolve"))
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // still unresolved
    let (_, body) = send(&app, Method::GET, "/api/v1/alerts?resolved=false", None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_machine_list_total_counts_whole_registry() {
    let (app, _) = app();
    create_oven(&app).await;
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/machines",
        Some(json!({ "name": "Press 1", "type": "Hydraulic Press", "serial_number": "SN-3001-B" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&app, Method::GET, "/api/v1/machines?limit=1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["meta"]["count"], 1);
    assert_eq!(body["meta"]["total"], 2);

    let (_, body) = send(&app, Method::GET, "/api/v1/machines?offset=5", None).await;
    assert_eq!(body["meta"]["count"], 0);
    assert_eq!(body["meta"]["total"], 2);
}

#[tokio::test]
async fn test_threshold_update_over_http() {
    let (app, _) = app();
    let id = create_oven(&app).await;

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/api/v1/machines/{id}/thresholds"),
        Some(json!({ "temperature_critical": 70.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["thresholds"]["temperature_critical"], 70.0);
    assert!(body["data"]["thresholds"]["vibration_max"].is_null());
}

#[tokio::test]
async fn test_ingest_after_shutdown_is_503() {
    let (app, pipeline) = app();
    let id = create_oven(&app).await;
    pipeline.shutdown().await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/readings",
        Some(json!({
            "machine_id": id,
            "temperature": 20.0,
            "vibration": 1.0,
            "pressure": 1.0,
            "current": 1.0
        })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "PIPELINE_CLOSED");
}
