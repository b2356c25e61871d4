//! Daemon assembly: store, runtime, controller, and API server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use convoy_api::ApiState;
use convoy_controller::{
    Controller, ConvoyConfig, Reconciler, RuntimeConfig, RuntimeMode, StoreBackend, StoreConfig,
    TickOutcome,
};
use convoy_runtime::{AgentClient, PodRuntime, SimulatedRuntime};
use convoy_state::{Clock, StateStore, SystemClock};

/// Open the configured snapshot store, creating its directory if needed.
pub fn open_store(config: &StoreConfig) -> anyhow::Result<StateStore> {
    if let Some(dir) = config.path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let store = match config.backend {
        StoreBackend::Redb => StateStore::open(&config.path)?,
        StoreBackend::Json => StateStore::open_json(&config.path),
    };
    info!(backend = ?config.backend, path = ?config.path, "state store opened");
    Ok(store)
}

pub fn build_runtime(
    config: &RuntimeConfig,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<Arc<dyn PodRuntime>> {
    let runtime: Arc<dyn PodRuntime> = match config.mode {
        RuntimeMode::Simulated => {
            info!("simulated pod runtime initialized");
            Arc::new(SimulatedRuntime::new(clock))
        }
        RuntimeMode::Agent => {
            let client = AgentClient::new(
                config.agent_url.clone(),
                config.api_key.clone(),
                Duration::from_millis(config.timeout_ms),
            )?;
            info!(url = %client.base_url(), "agent pod runtime initialized");
            Arc::new(client)
        }
    };
    Ok(runtime)
}

struct Assembly {
    store: StateStore,
    runtime: Arc<dyn PodRuntime>,
    clock: Arc<dyn Clock>,
    controller: Controller,
}

fn assemble(config: &ConvoyConfig) -> anyhow::Result<Assembly> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = open_store(&config.store)?;
    let runtime = build_runtime(&config.runtime, Arc::clone(&clock))?;

    if !config.notifier.is_enabled() {
        warn!("no webhook configured, alerts will only be logged as events");
    }
    let reconciler = Reconciler::new(
        store.clone(),
        Arc::clone(&runtime),
        Arc::clone(&clock),
        config.alerts,
        config.notifier.clone(),
    );

    Ok(Assembly {
        store,
        runtime,
        clock,
        controller: Controller::new(reconciler),
    })
}

/// Run the controller loop and the API server until Ctrl-C.
pub async fn run(config: ConvoyConfig) -> anyhow::Result<()> {
    info!("Convoy daemon starting");
    let Assembly {
        store,
        runtime,
        clock,
        controller,
    } = assemble(&config)?;

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Controller loop ────────────────────────────────────────

    let tick = Duration::from_millis(config.controller.tick_ms.max(1));
    let controller_handle = tokio::spawn(async move {
        controller.run(tick, shutdown_rx).await;
    });

    // ── API server ─────────────────────────────────────────────

    let router = convoy_api::build_router(ApiState {
        store,
        runtime,
        clock,
        api_key: config.api.api_key.clone(),
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], config.api.port));
    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for Ctrl-C, shutting down");
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    let _ = controller_handle.await;
    info!("Convoy daemon stopped");
    Ok(())
}

/// One pass, reported on stdout.
pub async fn reconcile_once(config: ConvoyConfig) -> anyhow::Result<()> {
    let assembly = assemble(&config)?;
    match assembly.controller.try_tick().await {
        TickOutcome::Completed(summary) => {
            println!(
                "services={} spawned={} killed={} restarted={} scaled={} notifications={} version={}",
                summary.services,
                summary.spawned,
                summary.killed,
                summary.restarted,
                summary.scaled,
                summary.notifications,
                summary.version
            );
            Ok(())
        }
        TickOutcome::Skipped => Ok(()),
        TickOutcome::Failed(reason) => Err(anyhow::anyhow!("reconcile pass failed: {reason}")),
    }
}
