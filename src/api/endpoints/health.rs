//! Probe endpoints. Mounted without rate limiting or the safe-mode gate.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::config::{APP_NAME, APP_VERSION};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub safe_mode: bool,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub corpus: bool,
    pub store: &'static str,
    pub llm: bool,
}

#[derive(Serialize)]
pub struct VersionResponse {
    pub name: &'static str,
    pub version: &'static str,
}

/// `GET /api/health`: liveness. Always 200; safe mode shows in the body.
pub async fn check(State(ctx): State<ApiContext>) -> Json<HealthResponse> {
    let safe_mode = ctx.core.safe_mode().is_active();
    Json(HealthResponse {
        status: if safe_mode { "degraded" } else { "ok" },
        safe_mode,
        version: APP_VERSION,
    })
}

/// `GET /api/readiness`: 503 while in safe mode or when the store is unreachable.
pub async fn readiness(State(ctx): State<ApiContext>) -> Result<Json<ReadinessResponse>, ApiError> {
    let safe_mode = ctx.core.safe_mode();
    if safe_mode.is_active() {
        let reason = safe_mode.reason().unwrap_or_default();
        return Err(ApiError::NotReady(format!("safe mode: {reason}")));
    }
    let sessions = ctx.core.sessions();
    sessions
        .session_count()
        .map_err(|e| ApiError::NotReady(format!("store unavailable: {e}")))?;

    Ok(Json(ReadinessResponse {
        corpus: ctx.core.retriever().is_available(),
        store: sessions.backend(),
        llm: ctx.core.llm_enabled(),
    }))
}

/// `GET /api/version`
pub async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        name: APP_NAME,
        version: APP_VERSION,
    })
}
