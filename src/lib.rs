pub mod api;
pub mod config;
pub mod core_state;
pub mod db;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod safe_mode;
pub mod store;

use std::sync::Arc;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::api::ServerError;
use crate::config::{ConfigError, ServerConfig};
use crate::core_state::{CoreError, CoreState};

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    #[error("Signal handler error: {0}")]
    Signal(#[from] std::io::Error),
}

/// Install the global tracing subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}

/// Read the environment, build the core, serve until Ctrl-C.
pub async fn run() -> Result<(), StartupError> {
    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = ServerConfig::from_env()?;
    let bind = config.bind;
    let core = Arc::new(CoreState::from_config(config)?);
    if core.safe_mode().is_active() {
        tracing::warn!("Serving in safe mode, only probes will answer");
    }

    let mut server = api::start_server_on(core, bind).await?;
    tracing::info!(addr = %server.addr, "Listening");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Ctrl-C received, shutting down");
    server.shutdown();
    server.wait().await?;
    Ok(())
}
