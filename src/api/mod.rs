//! HTTP API.
//!
//! Routes are nested under `/api/` and protected by a middleware stack:
//! CORS → Safe-mode gate → Rate limit → Audit → Handler. Probe routes
//! (`/health`, `/readiness`, `/version`) skip the gate and the limiter.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use router::api_router;
pub use server::{start_server_on, ApiServer, ServerError};
pub use types::ApiContext;
