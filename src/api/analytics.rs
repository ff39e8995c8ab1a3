//! /analytics endpoints

use super::{ApiError, AppState};
use crate::bucket::parse_timestamp;
use crate::types::Event;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

/// Query string of `POST /analytics`
///
/// Kept as raw strings so malformed numbers map to our own 400 responses
/// instead of the extractor's rejection.
#[derive(Debug, Deserialize)]
pub struct IngestParams {
    pub timestamp: Option<String>,
    pub user: Option<String>,
    pub click: Option<String>,
    pub impression: Option<String>,
}

/// Query string of `GET /analytics`
#[derive(Debug, Deserialize)]
pub struct QueryParams {
    pub timestamp: Option<String>,
    /// `json` for a JSON body, anything else for the plain-text lines
    pub format: Option<String>,
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, ApiError> {
    value
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest(format!("missing parameter: {}", name)))
}

fn parse_count(value: &Option<String>, name: &str) -> Result<i64, ApiError> {
    required(value, name)?
        .trim()
        .parse::<i64>()
        .map_err(|e| ApiError::BadRequest(format!("invalid {}: {}", name, e)))
}

/// POST /analytics?timestamp={secs}&user={user}&click={n}&impression={n}
///
/// Responds 201 once the event is validated and its durable write is
/// scheduled; durable completion is only visible to the monitor.
pub async fn ingest_event(
    State(state): State<AppState>,
    Query(params): Query<IngestParams>,
) -> Result<StatusCode, ApiError> {
    let timestamp = parse_timestamp(required(&params.timestamp, "timestamp")?)?;
    let user = required(&params.user, "user")?.to_string();
    let clicks = parse_count(&params.click, "click")?;
    let impressions = parse_count(&params.impression, "impression")?;

    let receipt = state
        .aggregator
        .ingest(Event::new(timestamp, user, clicks, impressions))
        .await?;

    log::debug!("📥 Accepted event for bucket {} (live: {})", receipt.bucket, receipt.live);
    Ok(StatusCode::CREATED)
}

/// GET /analytics?timestamp={secs}[&format=json]
pub async fn query_analytics(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
) -> Result<Response, ApiError> {
    let timestamp = parse_timestamp(required(&params.timestamp, "timestamp")?)?;
    let result = state.aggregator.query(timestamp).await?;

    let response = match params.format.as_deref() {
        Some("json") => Json(result).into_response(),
        _ => (StatusCode::OK, result.to_csv_lines()).into_response(),
    };
    Ok(response)
}
