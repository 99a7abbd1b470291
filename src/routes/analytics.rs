//! `GET /api/insights` – statistical insights and recommendations over a
//! trailing window of readings.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ApiError, AppState};
use crate::insights::{InsightsSnapshot, Recommendation};

/// Longest look-back a request may ask for (30 days).
const MAX_WINDOW_HOURS: u32 = 24 * 30;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/insights", get(handler))
}

/// Query parameters for the insights window.
#[derive(Debug, Deserialize)]
pub struct InsightsQuery {
    hours: Option<u32>,
    device_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct InsightsResponse {
    insights: InsightsSnapshot,
    recommendations: Vec<Recommendation>,
}

async fn handler(
    Query(params): Query<InsightsQuery>,
    State(state): State<AppState>,
) -> Result<Json<InsightsResponse>, ApiError> {
    // ---
    let hours = params
        .hours
        .unwrap_or(state.insights_window_hours)
        .clamp(1, MAX_WINDOW_HOURS);
    let to = Utc::now();
    let from = to - Duration::hours(i64::from(hours));

    info!("GET /api/insights - last {}h, device {:?}", hours, params.device_id);

    let (insights, recommendations) = state
        .engine
        .insights(params.device_id.as_deref(), from, to)
        .await?;

    Ok(Json(InsightsResponse {
        insights,
        recommendations,
    }))
}
