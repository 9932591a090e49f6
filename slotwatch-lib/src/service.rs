//! Wires the store, scanner and API together for the `slotwatch` binary.

use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::alert::{AlertScanner, AlertStore, JsonlAlertStore, MemoryAlertStore, StaticAdmins};
use crate::api::{self, ApiState};
use crate::config::{Config, HistoryBackend};
use crate::error::{Result, SlotwatchError};
use crate::ingest::IngestFilter;
use crate::slots::SlotStore;
use crate::telemetry::init_metrics;

/// Build the history store selected by the configuration.
pub async fn build_history(config: &Config) -> Result<Arc<dyn AlertStore>> {
    match config.history.backend {
        HistoryBackend::Memory => Ok(Arc::new(MemoryAlertStore::new(config.history.max_records))),
        HistoryBackend::Jsonl => {
            let path = config.history.path.as_ref().ok_or_else(|| {
                SlotwatchError::Config("history.path is required when backend = \"jsonl\"".into())
            })?;
            Ok(Arc::new(JsonlAlertStore::open(path).await?))
        }
    }
}

/// Run until SIGTERM or SIGINT.
pub async fn run(config: Arc<Config>) -> Result<()> {
    let (metrics, registry) = if config.telemetry.metrics_enabled {
        let (metrics, registry) = init_metrics()
            .map_err(|e| SlotwatchError::Config(format!("Failed to initialize metrics: {e}")))?;
        (Some(metrics), Some(registry))
    } else {
        (None, None)
    };

    let slots = Arc::new(SlotStore::new(&config.slots));
    let history = build_history(&config).await?;
    let shutdown = CancellationToken::new();

    info!(
        global_capacity = config.slots.global_capacity,
        per_user_capacity = config.slots.per_user_capacity,
        similarity_threshold = config.slots.similarity_threshold,
        history = ?config.history.backend,
        "Slot store ready"
    );

    let scanner = if config.alert.enabled {
        let admins = Arc::new(StaticAdmins::new(config.admins.iter().copied()));
        let scanner = AlertScanner::new(slots.clone(), history.clone(), admins, config.alert.clone())
            .with_metrics(metrics.clone());
        Some(scanner.spawn(shutdown.child_token()))
    } else {
        info!("High activity scanner disabled");
        None
    };

    let state = ApiState::new(slots, history, IngestFilter::from_config(&config.ingest))
        .with_limits(config.api.clone())
        .with_metrics(metrics, registry);
    let listener = TcpListener::bind(config.listen).await?;
    let server = tokio::spawn(api::serve(listener, state, shutdown.child_token()));

    wait_for_signal().await?;
    shutdown.cancel();

    if let Some(handle) = scanner {
        if let Err(e) = handle.await {
            warn!(error = %e, "High activity scanner task ended abnormally");
        }
    }

    match server.await {
        Ok(result) => result?,
        Err(e) => warn!(error = %e, "Management API task ended abnormally"),
    }

    info!("slotwatch stopped");
    Ok(())
}

async fn wait_for_signal() -> Result<()> {
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate()).map_err(|e| {
        SlotwatchError::Io(std::io::Error::other(format!("Failed to setup SIGTERM handler: {e}")))
    })?;
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt()).map_err(|e| {
        SlotwatchError::Io(std::io::Error::other(format!("Failed to setup SIGINT handler: {e}")))
    })?;

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
        _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
    }
    Ok(())
}
