//! HTTP server lifecycle: bind, serve the API router in a background task,
//! stop on a oneshot signal.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::api::router::api_router;
use crate::core_state::CoreState;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("Failed to read bound address: {0}")]
    LocalAddr(std::io::Error),

    #[error("Server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Handle to a running API server.
pub struct ApiServer {
    pub addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ApiServer {
    /// Signal a graceful shutdown. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!("API server shutdown signal sent");
        }
    }

    /// Wait for the server task to finish draining.
    pub async fn wait(&mut self) -> Result<(), ServerError> {
        if let Some(task) = self.task.take() {
            task.await?;
        }
        Ok(())
    }
}

/// Bind `addr` (port 0 picks an ephemeral port) and serve the full API
/// router in a background tokio task.
///
/// The audit buffer is flushed once the server has stopped.
pub async fn start_server_on(core: Arc<CoreState>, addr: SocketAddr) -> Result<ApiServer, ServerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    let addr = listener.local_addr().map_err(ServerError::LocalAddr)?;

    let app = api_router(core.clone());
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
            tracing::info!("API server received shutdown signal");
        };

        tracing::info!(%addr, "API server started");

        if let Err(e) = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown_signal)
            .await
        {
            tracing::error!("API server error: {e}");
        }

        if let Err(e) = core.flush_and_prune_audit() {
            tracing::warn!(error = %e, "Audit flush on shutdown failed");
        }
        tracing::info!("API server stopped");
    });

    Ok(ApiServer {
        addr,
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
    })
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    fn test_core(dir: &std::path::Path) -> Arc<CoreState> {
        let config = ServerConfig {
            corpus_dir: dir.to_path_buf(),
            ..ServerConfig::default()
        };
        Arc::new(CoreState::in_memory(config, None))
    }

    fn localhost() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 0))
    }

    #[tokio::test]
    async fn start_and_stop_server() {
        let tmp = tempfile::tempdir().unwrap();
        let mut server = start_server_on(test_core(tmp.path()), localhost())
            .await
            .expect("server should start");
        assert!(server.addr.port() > 0);

        let url = format!("http://{}/api/health", server.addr);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);

        server.shutdown();
        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn chat_over_http_uses_peer_address() {
        let tmp = tempfile::tempdir().unwrap();
        let core = test_core(tmp.path());
        let mut server = start_server_on(core.clone(), localhost()).await.unwrap();

        let resp = reqwest::Client::new()
            .post(format!("http://{}/api/chat", server.addr))
            .json(&serde_json::json!({"message": "こんにちは", "sessionId": "http-1"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let json: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(json["threadId"], "http-1");

        let entries = core.audit_entries();
        let api_entry = entries
            .iter()
            .find(|e| e.action == "POST /api/chat")
            .expect("chat request audited");
        assert_eq!(api_entry.source.to_string(), "api:127.0.0.1");

        server.shutdown();
        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let tmp = tempfile::tempdir().unwrap();
        let mut server = start_server_on(test_core(tmp.path()), localhost()).await.unwrap();

        let resp = reqwest::get(format!("http://{}/nonexistent", server.addr)).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);

        server.shutdown();
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let mut server = start_server_on(test_core(tmp.path()), localhost()).await.unwrap();
        server.shutdown();
        server.shutdown();
        server.wait().await.unwrap();
        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let mut first = start_server_on(test_core(tmp.path()), localhost()).await.unwrap();
        let err = start_server_on(test_core(tmp.path()), first.addr).await.err().unwrap();
        assert!(matches!(err, ServerError::Bind { .. }));
        first.shutdown();
    }
}
