//! HTTP router.
//!
//! Returns a composable `Router` with every route nested under `/api/`.
//!
//! Middleware stack (outermost → innermost):
//! 1. CORS → 2. Safe-mode gate → 3. Rate limiter → 4. Audit logger
//!
//! Probe routes skip the gate and the rate limiter.

use std::sync::Arc;

use axum::http::{header, HeaderValue};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Build the API router over a shared core.
///
/// Middleware uses `Extension<ApiContext>` (injected as the outermost layer).
/// Endpoint handlers use `State<ApiContext>` (provided via `with_state`).
pub fn api_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

pub(crate) fn build_router(ctx: ApiContext) -> Router {
    let cors = cors_layer(&ctx.core.config.cors_origins);

    // Layers wrap from the bottom up: the Extension must be outermost so
    // every from_fn middleware can pull the ApiContext out of the request.
    let main = Router::new()
        .route("/chat", post(endpoints::chat::send))
        .route("/kanagi/reason", post(endpoints::kanagi::reason))
        .route("/judge", post(endpoints::kanagi::judge))
        .route("/memory/read", get(endpoints::memory::read))
        .route("/memory/clear", post(endpoints::memory::clear))
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        .layer(axum::middleware::from_fn(middleware::rate::limit))
        .layer(axum::middleware::from_fn(middleware::safe_mode::gate))
        .layer(axum::Extension(ctx.clone()));

    let probes = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/readiness", get(endpoints::health::readiness))
        .route("/version", get(endpoints::health::version))
        .with_state(ctx);

    Router::new()
        .nest("/api", main.merge(probes))
        .fallback(endpoints::not_found)
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(cors)
}

/// Any origin when none are configured, otherwise exactly the listed ones.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring malformed CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}
