//! API endpoint handlers, one module per route group.

pub mod chat;
pub mod health;
pub mod kanagi;
pub mod memory;

use axum::http::Uri;

use crate::api::error::ApiError;

/// Fallback for every unmatched path.
pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("{} は存在しません。", uri.path()))
}
