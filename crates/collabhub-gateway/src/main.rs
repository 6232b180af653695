//! collabhub gateway
//!
//! - WebSocket endpoint: GET /ws (configurable), global broadcast
//! - Ops: /healthz, /readyz, /metrics
//! - Config: $COLLABHUB_CONFIG (default `collabhub.yaml`), $PORT overrides the listen port
//! - Graceful shutdown on Ctrl+C / SIGTERM: /readyz flips to 503 and every
//!   open socket gets a close frame

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use collabhub_core::error::{CollabError, Result};
use collabhub_gateway::{app_state::AppState, config, router};

const DEFAULT_CONFIG_PATH: &str = "collabhub.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut cfg = load_config()?;
    if let Ok(port) = std::env::var("PORT") {
        cfg.gateway.override_port(&port)?;
    }

    let listen: SocketAddr = cfg
        .gateway
        .listen
        .parse()
        .map_err(|e| CollabError::BadRequest(format!("gateway.listen must be a valid SocketAddr: {e}")))?;
    let ws_path = cfg.gateway.ws_path.clone();
    let drain_limit = Duration::from_millis(cfg.gateway.write_timeout_ms);

    let state = AppState::new(cfg);
    let app = router::build_router(state.clone());

    tracing::info!(%listen, %ws_path, "collabhub-gateway starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| CollabError::Internal(format!("failed to bind {listen}: {e}")))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await
        .map_err(|e| CollabError::Internal(format!("server failed: {e}")))?;

    if !state.wait_drained(drain_limit).await {
        tracing::warn!(active = state.registry().len(), "sessions still open at exit");
    }

    tracing::info!("collabhub-gateway stopped");
    Ok(())
}

fn load_config() -> Result<config::GatewayConfig> {
    match std::env::var("COLLABHUB_CONFIG") {
        Ok(path) => config::load_from_file(&path),
        Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            config::load_from_file(DEFAULT_CONFIG_PATH)
        }
        Err(_) => {
            tracing::info!("no config file, using defaults");
            Ok(config::GatewayConfig::default())
        }
    }
}

async fn shutdown_signal(state: AppState) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    let closing = state.close_all();
    tracing::info!(closing, "signal received, draining");
}
