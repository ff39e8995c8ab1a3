//! HTTP gateway
//!
//! Thin transport layer: parses query-string parameters into typed events
//! and queries, hands them to the `Aggregator`, and maps its results and
//! errors onto HTTP responses.

pub mod analytics;

use crate::aggregator::Aggregator;
use crate::error::AnalyticsError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
}

impl AppState {
    pub fn new(aggregator: Arc<Aggregator>) -> Self {
        Self { aggregator }
    }
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
    /// A storage tier did not answer; no partial body is sent
    StoreUnavailable(String),
}

impl From<AnalyticsError> for ApiError {
    fn from(err: AnalyticsError) -> Self {
        match err {
            AnalyticsError::InvalidTimestamp(_) | AnalyticsError::InvalidEvent(_) => {
                ApiError::BadRequest(err.to_string())
            }
            AnalyticsError::HotStoreUnavailable(_) | AnalyticsError::ColdStoreUnavailable(_) => {
                ApiError::StoreUnavailable(err.to_string())
            }
            AnalyticsError::Internal(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => {
                log::debug!("Rejected request: {}", msg);
                (StatusCode::BAD_REQUEST, msg).into_response()
            }
            ApiError::Internal(msg) => {
                log::error!("❌ Internal error: {}", msg);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
            ApiError::StoreUnavailable(msg) => {
                log::warn!("⚠️  Store unavailable: {}", msg);
                StatusCode::GATEWAY_TIMEOUT.into_response()
            }
        }
    }
}

/// GET /health
async fn health() -> &'static str {
    "ok"
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/analytics",
            get(analytics::query_analytics).post(analytics::ingest_event),
        )
        .route("/health", get(health))
        .with_state(state)
}
