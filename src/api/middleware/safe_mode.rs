//! Safe-mode gate. Once engaged, every request is answered with 503
//! until restart.

use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::context;
use crate::api::error::ApiError;

pub async fn gate(req: Request<axum::body::Body>, next: Next) -> Response {
    let ctx = match context(&req) {
        Ok(ctx) => ctx,
        Err(err) => return err.into_response(),
    };
    if ctx.core.safe_mode().is_active() {
        return ApiError::SafeMode.into_response();
    }

    let response = next.run(req).await;
    if response.status().is_server_error() {
        ctx.core.safe_mode().record_error();
    }
    response
}
