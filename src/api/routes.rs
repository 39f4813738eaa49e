//! API route definitions.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::error::{classify_ingest_error, ApiError, ApiResult};
use super::state::AppState;
use crate::detect::ledger::NewAlert;
use crate::query::{self, AlertQuery, PredictionQuery, ReadingQuery};
use crate::telemetry::{NewMachine, NewReading, Thresholds};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/machines", post(register_machine).get(list_machines))
        .route("/machines/{id}", get(get_machine))
        .route("/machines/{id}/thresholds", put(update_thresholds))
        .route("/machines/{id}/readings", get(machine_readings))
        .route("/machines/{id}/predictions", get(machine_predictions))
        .route("/machines/{id}/alerts", get(machine_alerts))
        .route("/readings", post(ingest_reading))
        .route("/readings/batch", post(ingest_batch))
        .route("/alerts", get(list_alerts).post(raise_alert))
        .route("/alerts/{id}/resolve", post(resolve_alert))
        .route("/fleet/summary", get(fleet_summary))
        .route("/fleet/most-at-risk", get(most_at_risk))
}

/// `{ "data": ..., "meta": ... }` response envelope.
#[derive(Debug, Serialize)]
struct Envelope<T: Serialize> {
    data: T,
    meta: Value,
}

fn envelope<T: Serialize>(data: T, mut meta: Value) -> Json<Envelope<T>> {
    if let Value::Object(map) = &mut meta {
        map.insert("timestamp".into(), json!(chrono::Utc::now().to_rfc3339()));
        map.insert("version".into(), json!(env!("CARGO_PKG_VERSION")));
    }
    Json(Envelope { data, meta })
}

#[derive(Debug, Deserialize)]
struct PaginationParams {
    limit: Option<usize>,
    offset: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct MachineAlertParams {
    resolved: Option<bool>,
    limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ResolveRequest {
    #[serde(default)]
    resolved_by: Option<String>,
}

// -- health -----------------------------------------------------------------

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.pipeline.stats();
    envelope(
        json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "pipeline": stats,
        }),
        json!({}),
    )
}

// -- machines ---------------------------------------------------------------

/// POST /machines
async fn register_machine(
    State(state): State<AppState>,
    Json(input): Json<NewMachine>,
) -> ApiResult<impl IntoResponse> {
    if input.name.trim().is_empty() {
        return Err(ApiError::BadRequest("machine name must not be empty".into()));
    }
    if let Some((key, value)) = input.thresholds.iter().find(|(_, v)| !v.is_finite()) {
        return Err(ApiError::BadRequest(format!("threshold {key} is not finite: {value}")));
    }
    let machine = state.pipeline.register_machine(input).await?;
    Ok((StatusCode::CREATED, envelope(machine, json!({}))))
}

/// GET /machines
async fn list_machines(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let limit = query::clamp_limit(params.limit);
    let offset = params.offset.unwrap_or(0);
    let machines = state.pipeline.list_machines(offset, limit).await;
    let count = machines.len();
    let total = state.pipeline.machine_count().await;
    envelope(
        machines,
        json!({ "count": count, "total": total, "limit": limit, "offset": offset }),
    )
}

/// GET /machines/{id}
async fn get_machine(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<impl IntoResponse> {
    let machine = state.pipeline.get_machine(id).await?;
    Ok(envelope(machine, json!({})))
}

/// PUT /machines/{id}/thresholds
async fn update_thresholds(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(thresholds): Json<Thresholds>,
) -> ApiResult<impl IntoResponse> {
    if let Some((key, value)) = thresholds.iter().find(|(_, v)| !v.is_finite()) {
        return Err(ApiError::BadRequest(format!("threshold {key} is not finite: {value}")));
    }
    let machine = state.pipeline.update_thresholds(id, thresholds).await?;
    Ok(envelope(machine, json!({})))
}

/// GET /machines/{id}/readings?start=&end=&limit=&offset=
async fn machine_readings(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<ReadingQuery>,
) -> ApiResult<impl IntoResponse> {
    let readings = state.pipeline.query_readings(id, &q).await?;
    let count = readings.len();
    Ok(envelope(
        readings,
        json!({ "count": count, "limit": q.limit(), "offset": q.offset() }),
    ))
}

/// GET /machines/{id}/predictions?anomalous=&limit=
async fn machine_predictions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<PredictionQuery>,
) -> ApiResult<impl IntoResponse> {
    let predictions = state.pipeline.query_predictions(id, &q).await?;
    let count = predictions.len();
    Ok(envelope(predictions, json!({ "count": count })))
}

/// GET /machines/{id}/alerts?resolved=&limit=
async fn machine_alerts(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<MachineAlertParams>,
) -> ApiResult<impl IntoResponse> {
    let alerts = state
        .pipeline
        .query_alerts(&AlertQuery {
            machine_id: Some(id),
            resolved: params.resolved,
            limit: params.limit,
        })
        .await?;
    let count = alerts.len();
    Ok(envelope(alerts, json!({ "count": count })))
}

// -- readings ---------------------------------------------------------------

/// POST /readings
async fn ingest_reading(
    State(state): State<AppState>,
    Json(input): Json<NewReading>,
) -> ApiResult<impl IntoResponse> {
    let ack = state.pipeline.ingest(input).await?;
    Ok((StatusCode::ACCEPTED, envelope(ack, json!({}))))
}

/// POST /readings/batch
///
/// Always 200; each item carries its own outcome in input order. An empty
/// batch yields an empty `data` array.
async fn ingest_batch(
    State(state): State<AppState>,
    Json(batch): Json<Vec<NewReading>>,
) -> ApiResult<impl IntoResponse> {
    let results = state.pipeline.ingest_batch(batch).await;

    let mut accepted = 0usize;
    let items: Vec<Value> = results
        .into_iter()
        .enumerate()
        .map(|(index, result)| match result {
            Ok(ack) => {
                accepted += 1;
                json!({ "index": index, "status": "accepted", "ack": ack })
            }
            Err(e) => {
                let (_, code) = classify_ingest_error(&e);
                json!({ "index": index, "status": "rejected", "code": code, "error": e.to_string() })
            }
        })
        .collect();
    let rejected = items.len() - accepted;

    Ok(envelope(items, json!({ "accepted": accepted, "rejected": rejected })))
}

// -- alerts -----------------------------------------------------------------

/// GET /alerts?machine_id=&resolved=&limit=
async fn list_alerts(
    State(state): State<AppState>,
    Query(q): Query<AlertQuery>,
) -> ApiResult<impl IntoResponse> {
    let alerts = state.pipeline.query_alerts(&q).await?;
    let count = alerts.len();
    Ok(envelope(alerts, json!({ "count": count })))
}

/// POST /alerts
async fn raise_alert(State(state): State<AppState>, Json(input): Json<NewAlert>) -> ApiResult<impl IntoResponse> {
    if input.message.trim().is_empty() {
        return Err(ApiError::BadRequest("alert message must not be empty".into()));
    }
    let alert = state.pipeline.raise_alert(input).await?;
    Ok((StatusCode::CREATED, envelope(alert, json!({}))))
}

/// POST /alerts/{id}/resolve?resolved_by=
///
/// The body is optional. When present it must be a JSON object; its
/// `resolved_by` wins over the query parameter.
async fn resolve_alert(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<ResolveRequest>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let resolved_by = if body.iter().all(u8::is_ascii_whitespace) {
        params.resolved_by
    } else {
        let input: ResolveRequest = serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("invalid resolve body: {e}")))?;
        input.resolved_by.or(params.resolved_by)
    };
    let alert = state.pipeline.resolve_alert(id, resolved_by).await?;
    Ok(envelope(alert, json!({})))
}

// -- fleet ------------------------------------------------------------------

/// GET /fleet/summary
async fn fleet_summary(State(state): State<AppState>) -> impl IntoResponse {
    envelope(state.pipeline.fleet_summary().await, json!({}))
}

/// GET /fleet/most-at-risk
///
/// `data` is null when no machine has an unresolved alert.
async fn most_at_risk(State(state): State<AppState>) -> impl IntoResponse {
    envelope(state.pipeline.most_at_risk().await, json!({}))
}
