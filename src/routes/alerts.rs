//! Alert history and acknowledgement.
//!
//! - `GET /api/alerts?limit=` – most recent alert events with deliveries
//! - `POST /api/alerts/{id}/ack` – mark an alert resolved

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::{ApiError, AppState};
use crate::engine::AlertRecord;
use crate::models::AlertEvent;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/api/alerts", get(history))
        .route("/api/alerts/{id}/ack", post(acknowledge))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    limit: Option<usize>,
}

async fn history(
    Query(params): Query<HistoryQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<AlertRecord>>, ApiError> {
    // ---
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    Ok(Json(state.engine.alert_history(limit).await?))
}

async fn acknowledge(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<AlertEvent>, ApiError> {
    // ---
    Ok(Json(state.engine.acknowledge(id, Utc::now()).await?))
}
