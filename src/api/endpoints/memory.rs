//! Session memory endpoints.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::{header_session_id, ApiContext};
use crate::models::Turn;

const DEFAULT_READ_LIMIT: usize = 20;
const MAX_READ_LIMIT: usize = 200;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadQuery {
    #[serde(default, alias = "session_id")]
    pub session_id: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadResponse {
    pub session_id: String,
    pub turns: Vec<Turn>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearBody {
    #[serde(default, alias = "session_id")]
    pub session_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearResponse {
    pub session_id: String,
    pub cleared: usize,
}

/// `GET /api/memory/read?sessionId=&limit=`: recent turns, oldest first.
pub async fn read(
    State(ctx): State<ApiContext>,
    headers: HeaderMap,
    Query(query): Query<ReadQuery>,
) -> Result<Json<ReadResponse>, ApiError> {
    let session_id = require_session(query.session_id, &headers)?;
    let limit = query.limit.unwrap_or(DEFAULT_READ_LIMIT).clamp(1, MAX_READ_LIMIT);
    let turns = ctx.core.sessions().read_recent_turns(&session_id, limit)?;
    Ok(Json(ReadResponse { session_id, turns }))
}

/// `POST /api/memory/clear`: drop history and every volatile per-session state.
pub async fn clear(
    State(ctx): State<ApiContext>,
    headers: HeaderMap,
    Json(body): Json<ClearBody>,
) -> Result<Json<ClearResponse>, ApiError> {
    let session_id = require_session(body.session_id, &headers)?;
    let cleared = ctx.core.clear_session(&session_id)?;
    tracing::info!(session_id = %session_id, cleared, "Session memory cleared");
    Ok(Json(ClearResponse { session_id, cleared }))
}

fn require_session(explicit: Option<String>, headers: &HeaderMap) -> Result<String, ApiError> {
    explicit
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| header_session_id(headers))
        .ok_or_else(|| ApiError::BadRequest("sessionId が必要です。".into()))
}
