//! HTTP boundary (EMBP gateway).
//!
//! Each sibling module exports a subrouter; this gateway merges them and
//! owns the mapping from [`EngineError`] to HTTP responses, so handlers only
//! ever return `Result<_, ApiError>`.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::json;
use tracing::error;

use crate::{Engine, EngineError};

mod alerts;
mod analytics;
mod data;
mod health;

// ---

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    // ---
    pub engine: Arc<Engine>,
    /// Look-back used when an insights request does not name one.
    pub insights_window_hours: u32,
}

pub fn router(state: AppState) -> Router {
    // ---
    Router::new()
        .merge(data::router())
        .merge(analytics::router())
        .merge(alerts::router())
        .merge(health::router())
        .with_state(state)
}

// ---

pub(crate) struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // ---
        let (status, message) = match &self.0 {
            EngineError::InvalidReading(_) => (StatusCode::BAD_REQUEST, self.0.to_string()),
            EngineError::NoData => (StatusCode::NOT_FOUND, "No data available".to_string()),
            EngineError::NotFound(_) => (StatusCode::NOT_FOUND, self.0.to_string()),
            EngineError::ConfigConflict => (StatusCode::CONFLICT, self.0.to_string()),
            EngineError::Decode(detail) => {
                error!("Corrupt stored value: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal storage error".to_string(),
                )
            }
            EngineError::Database(e) => {
                error!("Store failure: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal storage error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn status_of(err: EngineError) -> StatusCode {
        ApiError(err).into_response().status()
    }

    #[test]
    fn test_error_status_mapping() {
        // ---
        assert_eq!(status_of(EngineError::InvalidReading("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(EngineError::NoData), StatusCode::NOT_FOUND);
        assert_eq!(status_of(EngineError::NotFound("alert".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_of(EngineError::ConfigConflict), StatusCode::CONFLICT);
        assert_eq!(
            status_of(EngineError::Database(sqlx::Error::PoolTimedOut)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_corrupt_stored_enum_is_server_error() {
        // ---
        let err = match "SIREN".parse::<crate::models::AlertKind>() {
            Err(e) => e,
            Ok(kind) => panic!("unexpected kind {}", kind),
        };
        assert_eq!(status_of(err), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
