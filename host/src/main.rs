//! ==============================================================================
//! main.rs - grain moisture host entry point
//! ==============================================================================
//!
//! purpose:
//!     the box on the farm network. the esp32 probe reports raw capacitive
//!     readings here, and the dashboard on a phone or laptop drives
//!     measurements through the same http server.
//!
//! responsibilities:
//!     - load configuration (config/host.toml, defaults if missing)
//!     - set up tracing
//!     - build the reading store, advisor, weather client and acquisition controller
//!     - optionally mirror the firmware's firestore document into the store
//!     - serve the api until ctrl-c
//!
//! architecture:
//!
//!     ┌──────────────┐   POST /api/sensor    ┌─────────────────────────────┐
//!     │  esp32 probe │ ────────────────────► │           host              │
//!     └──────┬───────┘                       │  ┌────────┐   ┌──────────┐  │
//!            │ firestore doc                 │  │ store  │◄──│ firestore│  │
//!            └──────────────────────────────►│  └───┬────┘   │  mirror  │  │
//!                                            │      │        └──────────┘  │
//!     ┌──────────────┐   /api/measurement    │  ┌───▼─────────┐            │
//!     │  dashboard   │ ◄───────────────────► │  │ acquisition │──► ollama  │
//!     └──────────────┘                       │  └─────────────┘            │
//!                                            └─────────────────────────────┘
//!
//! ==============================================================================

use anyhow::{Context, Result};
use grainscan_host::acquisition::{AcquisitionController, AcquisitionSettings};
use grainscan_host::advisor::OllamaAdvisor;
use grainscan_host::config::HostConfig;
use grainscan_host::firestore::FirestoreMirror;
use grainscan_host::store::ReadingStore;
use grainscan_host::weather::WeatherClient;
use grainscan_host::{create_router, AppState};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // step 1: load configuration
    let (config, source) = HostConfig::load_or_default();

    // step 2: logging (RUST_LOG wins over the config file)
    let level = &config.logging.level;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("grainscan_host={0},tower_http={0}", level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("===========================================================");
    tracing::info!("  Grain Moisture Host");
    tracing::info!("===========================================================");
    source.log();
    config.log_summary();

    // step 3: shared services
    let store = Arc::new(ReadingStore::new());
    let advisor = Arc::new(OllamaAdvisor::new(&config.advisor)?);
    let weather = Arc::new(WeatherClient::new(&config.weather)?);
    let acquisition = AcquisitionController::new(
        AcquisitionSettings::from_config(&config),
        store.clone(),
        advisor.clone(),
    )?;

    // step 4: background mirror
    let shutdown = CancellationToken::new();
    let mirror = if config.firestore.enabled {
        let mirror = FirestoreMirror::new(&config.firestore, &config.device.id, store.clone())?;
        Some(tokio::spawn(mirror.run(shutdown.clone())))
    } else {
        None
    };

    // step 5: http server
    let state = AppState {
        store,
        acquisition: acquisition.clone(),
        advisor,
        weather,
        default_device: config.device.id.clone(),
        show_sensor_data: config.logging.show_sensor_data,
    };
    let app = create_router(state);

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("[STARTUP] ✓ API live at http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server error")?;

    // step 6: wind down background work
    tracing::info!("[SHUTDOWN] Stopping background tasks");
    acquisition.cancel().await;
    shutdown.cancel();
    if let Some(handle) = mirror {
        let _ = handle.await;
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("[SHUTDOWN] Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}
