use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use driver_matches::api;
use driver_matches::config::Config;
use driver_matches::engine::run_persister;
use driver_matches::error::AppError;
use driver_matches::gateway::MatchGateway;
use driver_matches::gateway::http::{HttpGatewayConfig, HttpMatchGateway};
use driver_matches::state::{AppState, StateSettings};
use driver_matches::storage::{MatchStore, SqliteMatchStore};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let store: Arc<dyn MatchStore> = Arc::new(SqliteMatchStore::open(&config.database_path)?);
    let gateway: Arc<dyn MatchGateway> = Arc::new(HttpMatchGateway::new(HttpGatewayConfig {
        base_url: config.api_base_url.clone(),
        session_token: config.session_token.clone(),
        timeout: config.request_timeout,
        offline: config.offline_mode,
    })?);

    let (app_state, store_rx) = AppState::new(
        gateway,
        store.clone(),
        StateSettings {
            driver_id: config.driver_id.clone(),
            location_fresh_window: config.location_fresh_window,
            location_timeout: config.location_timeout,
            event_buffer_size: config.event_buffer_size,
        },
    );
    let shared_state = Arc::new(app_state);

    tokio::spawn(run_persister(store, store_rx, shared_state.metrics.clone()));

    if let Err(err) = shared_state.coordinator.load_saved().await {
        warn!(error = %err, "failed to load saved matches; starting empty");
    }

    let coordinator = shared_state.coordinator.clone();
    tokio::spawn(async move {
        // failures are logged by the coordinator
        let _ = coordinator.refresh_live().await;
        let _ = coordinator.refresh_available().await;
    });

    let app = api::rest::router(shared_state.clone());

    let bind_addr = format!("127.0.0.1:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    info!(http_port = config.http_port, database = %config.database_path, "bridge started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
