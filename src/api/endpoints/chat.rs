//! `POST /api/chat`: one conversation turn through the orchestrator.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::types::{get_session_id, ApiContext};
use crate::pipeline::orchestrator::{ChatOutcome, ChatRequest};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBody {
    #[serde(default)]
    pub message: String,
    #[serde(default, alias = "session_id")]
    pub session_id: Option<String>,
}

/// `POST /api/chat`: route the message and return the composed reply.
///
/// The session id comes from the body, then the `X-Session-Id` header.
/// Without either a fresh one is issued and echoed back as `threadId`.
pub async fn send(
    State(ctx): State<ApiContext>,
    headers: HeaderMap,
    Json(body): Json<ChatBody>,
) -> Result<Json<ChatOutcome>, ApiError> {
    let session_id = get_session_id(body.session_id.as_deref(), &headers);
    let outcome = ctx
        .core
        .orchestrator()
        .handle(ChatRequest {
            message: body.message,
            session_id,
        })
        .await?;
    Ok(Json(outcome))
}
