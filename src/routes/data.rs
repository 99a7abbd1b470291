//! Telemetry ingestion and live status.
//!
//! - `POST /api/data` – validate a JSON reading and run it through the engine
//! - `POST /api/serial?device_id=` – same, for a raw serial bridge line
//! - `GET /api/latest` – latest reading plus device and alert status

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::{ApiError, AppState};
use crate::engine::{Actuation, SystemStatus};
use crate::ingest;
use crate::models::{AlertKind, Reading};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/api/data", post(receive))
        .route("/api/serial", post(receive_serial))
        .route("/api/latest", get(latest))
}

/// Automation outcome as reported back to the device.
#[derive(Debug, Serialize)]
struct AutomationSummary {
    // ---
    ac_activated: bool,
    ventilation_activated: bool,
    alert_sent: bool,
    is_anomaly: bool,
    anomaly_type: Option<String>,
    alerts_sent: Vec<AlertKind>,
    suppressed: Vec<AlertKind>,
    actuations: Vec<Actuation>,
}

#[derive(Debug, Serialize)]
struct IngestResponse {
    status: &'static str,
    reading_id: Uuid,
    automation: AutomationSummary,
}

#[derive(Debug, Deserialize)]
pub struct SerialQuery {
    device_id: Option<String>,
}

async fn receive(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<IngestResponse>, ApiError> {
    // ---
    let now = Utc::now();
    let reading = ingest::parse_json(&body, now)?;
    debug!("POST /api/data - reading {} from {}", reading.id, reading.device_id);

    process(&state, reading, now).await
}

async fn receive_serial(
    Query(params): Query<SerialQuery>,
    State(state): State<AppState>,
    body: String,
) -> Result<Json<IngestResponse>, ApiError> {
    // ---
    let now = Utc::now();
    let device_id = params
        .device_id
        .as_deref()
        .unwrap_or(ingest::DEFAULT_DEVICE_ID);
    let reading = ingest::parse_serial_line(&body, device_id, now)?;
    debug!("POST /api/serial - '{}' from {}", body.trim(), device_id);

    process(&state, reading, now).await
}

async fn process(
    state: &AppState,
    reading: Reading,
    now: DateTime<Utc>,
) -> Result<Json<IngestResponse>, ApiError> {
    // ---
    let result = state.engine.process(reading, now).await?;
    let flags = &result.reading.flags;

    let automation = AutomationSummary {
        ac_activated: flags.ac_activated,
        ventilation_activated: flags.ventilation_activated,
        alert_sent: flags.alert_sent,
        is_anomaly: flags.is_anomaly,
        anomaly_type: flags.anomaly_type.map(|t| t.to_string()),
        alerts_sent: result.alert_kinds(),
        suppressed: result.suppressed.clone(),
        actuations: result.actuations.clone(),
    };

    info!(
        "Reading {} processed, {} alert(s)",
        result.reading.id,
        automation.alerts_sent.len()
    );

    Ok(Json(IngestResponse {
        status: "success",
        reading_id: result.reading.id,
        automation,
    }))
}

async fn latest(State(state): State<AppState>) -> Result<Json<SystemStatus>, ApiError> {
    // ---
    Ok(Json(state.engine.status(Utc::now()).await?))
}
