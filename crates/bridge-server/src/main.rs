//! Call-audio bridge server binary
//!
//! Runs the bridge core behind an HTTP/WebSocket surface: a control API for
//! starting, stopping, and inspecting bridges, a call-event webhook feeding
//! the dispatcher, and a binary streaming surface for remote audio.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use callbridge_bridge_core::{BridgeController, CallEventDispatcher, DeviceProvider};
use callbridge_server::{api, devices, ServerConfig};

/// Interval between retention sweeps of retired sessions
const SWEEP_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(listen = %config.listen, endpoint = %config.endpoint, "starting call bridge server");

    #[cfg(feature = "device-cpal")]
    let provider: Arc<dyn DeviceProvider> = devices::HostDeviceProvider::new(
        config.input_device.clone(),
        config.output_device.clone(),
    );
    #[cfg(not(feature = "device-cpal"))]
    let provider: Arc<dyn DeviceProvider> = devices::UnavailableDeviceProvider::new();

    let controller = BridgeController::new(
        config.bridge_config(),
        config.connection_params(),
        provider.clone(),
    );

    let (events_tx, dispatcher) = CallEventDispatcher::new(controller.clone(), config.event_queue);
    tokio::spawn(dispatcher.run());

    // retention sweep so terminal states disappear even without lookups
    let registry = controller.registry().clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let swept = registry.sweep();
            if swept > 0 {
                tracing::debug!(swept, "swept retired sessions");
            }
        }
    });

    let state = api::AppState {
        controller,
        provider,
        params: config.connection_params(),
        events_tx,
        heartbeat: config.heartbeat(),
    };
    let app = api::router(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;
    info!("call bridge server ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("call bridge server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    info!("shutdown signal received");
}
