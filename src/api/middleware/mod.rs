//! API middleware stack.
//!
//! Execution order (outermost → innermost):
//! 1. Safe-mode gate: reject everything once safe mode is engaged, and
//!    count server errors toward engaging it
//! 2. Rate limiter: fixed window per session or peer address
//! 3. Audit logger

pub mod audit;
pub mod rate;
pub mod safe_mode;

use axum::http::Request;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;

/// The `ApiContext` injected as the outermost `Extension`.
pub(crate) fn context<B>(req: &Request<B>) -> Result<ApiContext, ApiError> {
    req.extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))
}
