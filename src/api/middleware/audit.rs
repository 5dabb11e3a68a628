//! Audit logging middleware: every request with client, method, path,
//! session and response status.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, OriginalUri};
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::api::types::{header_session_id, ApiContext};
use crate::core_state::AccessSource;

pub async fn log_access(req: Request<axum::body::Body>, next: Next) -> Response {
    let method = req.method().to_string();
    // Nested routers see the path with `/api` stripped.
    let path = req
        .extensions()
        .get::<OriginalUri>()
        .map_or_else(|| req.uri().path().to_string(), |OriginalUri(uri)| uri.path().to_string());
    let session_id = header_session_id(req.headers());
    let ctx = req.extensions().get::<ApiContext>().cloned();
    let client = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let response = next.run(req).await;

    if let Some(ctx) = ctx {
        let status = response.status().as_u16();
        ctx.core.log_access(
            AccessSource::Api { client },
            &format!("{method} {path}"),
            &format!("status:{status}"),
            session_id.as_deref(),
        );
    }

    response
}
