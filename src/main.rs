use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use delivery_core::api;
use delivery_core::config::Config;
use delivery_core::dispatch::{self, Dispatcher};
use delivery_core::error::AppError;
use delivery_core::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let (app_state, event_rx) = AppState::in_memory(config.dispatch_queue_size);
    let shared_state = Arc::new(app_state);

    let dispatcher = Dispatcher::new(
        shared_state.subscriptions.clone(),
        &config,
        shared_state.metrics.clone(),
    );
    tokio::spawn(dispatch::run_dispatcher(dispatcher, event_rx));

    let app = api::rest::router(shared_state.clone());

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

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
