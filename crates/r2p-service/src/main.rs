//! R2P Service
//!
//! Readiness roster bot backend for a Discord community.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize Prometheus metrics recorder
//! 3. Create the Discord client, load the catalogue, open the announcement store
//! 4. Spawn the role worker and the announcement worker
//! 5. Spawn the roster actor and reset the roster (publishes an empty announcement)
//! 6. Start the HTTP server (ingestion API, health, metrics)
//! 7. Wait for shutdown signal

#![warn(clippy::pedantic)]
#![allow(clippy::too_many_lines)] // main.rs orchestrates startup, naturally longer

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use r2p_service::announcement::{AnnouncementPublisher, FileAnnouncementStore};
use r2p_service::catalogue::{Catalogue, JsonCatalogue};
use r2p_service::config::Config;
use r2p_service::interest::CommonInterestResolver;
use r2p_service::observability::metrics::init_metrics_recorder;
use r2p_service::observability::{health_router, Readiness};
use r2p_service::roster::{run_role_worker, RosterActor};
use r2p_service::routes::{build_routes, AppState};
use r2p_service::services::{DiscordClient, Presence, PresenceCache, Transport};
use r2p_service::types::ChannelId;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Time given to workers to finish in-flight calls on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "r2p_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting R2P service");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        guild_id = config.guild_id,
        ready_channel_id = config.ready_channel_id,
        http_bind_address = %config.http_bind_address,
        catalogue_path = %config.catalogue_path.display(),
        announcement_path = %config.announcement_path.display(),
        "Configuration loaded successfully"
    );

    // Initialize Prometheus metrics recorder
    // This must happen before any metrics are recorded
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;
    info!("Prometheus metrics recorder initialized");

    // Collaborators
    let discord: Arc<dyn Transport> = Arc::new(
        DiscordClient::new(
            config.discord_api_url.clone(),
            config.discord_token.clone(),
            config.guild_id,
            config.ready_role_id,
        )
        .map_err(|e| {
            error!(error = %e, "Failed to create Discord client");
            e
        })?,
    );

    let catalogue = Arc::new(
        JsonCatalogue::load(config.catalogue_path.clone())
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to load catalogue");
                e
            })?,
    );

    let store = Arc::new(FileAnnouncementStore::new(config.announcement_path.clone()));
    let presence = Arc::new(PresenceCache::new());

    let shutdown_token = CancellationToken::new();

    // Workers fed by the roster actor
    let (role_tx, role_rx) = mpsc::unbounded_channel();
    let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();

    let role_task = tokio::spawn(run_role_worker(
        Arc::clone(&discord),
        role_rx,
        shutdown_token.child_token(),
    ));

    let publisher = AnnouncementPublisher::new(
        discord,
        store,
        CommonInterestResolver::new(Arc::clone(&catalogue) as Arc<dyn Catalogue>),
        ChannelId(config.ready_channel_id),
    );
    let publisher_task = tokio::spawn(publisher.run(snapshot_rx, shutdown_token.child_token()));

    // Roster actor
    let (roster, roster_task) = RosterActor::spawn(
        config.roster_settings(),
        Arc::clone(&presence) as Arc<dyn Presence>,
        snapshot_tx,
        role_tx,
        shutdown_token.child_token(),
    );

    // Timers are not persisted: start from an empty roster
    roster.process_started().await.map_err(|e| {
        error!(error = %e, "Failed to reset roster");
        e
    })?;
    info!("Roster reset");
    let readiness = Arc::new(Readiness::new(roster.clone()));

    let state = Arc::new(AppState {
        roster: roster.clone(),
        presence,
        catalogue,
    });

    // Add /metrics endpoint served by Prometheus exporter
    let metrics_router = Router::new().route(
        "/metrics",
        axum::routing::get(move || {
            let handle = prometheus_handle.clone();
            async move { handle.render() }
        }),
    );

    let app = build_routes(state)
        .merge(health_router(Arc::clone(&readiness)))
        .merge(metrics_router);

    let http_addr: SocketAddr = config.http_bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.http_bind_address, "Invalid HTTP bind address");
        format!("Invalid HTTP bind address: {e}")
    })?;

    // Bind listener BEFORE spawning to fail fast on bind errors
    let listener = tokio::net::TcpListener::bind(http_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %http_addr, "Failed to bind HTTP server");
            format!("Failed to bind HTTP server to {http_addr}: {e}")
        })?;
    info!(addr = %http_addr, "HTTP server bound successfully");

    let http_shutdown_token = shutdown_token.child_token();
    let http_task = tokio::spawn(async move {
        info!(addr = %http_addr, "HTTP server starting");
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            http_shutdown_token.cancelled().await;
            info!("HTTP server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "HTTP server failed");
        }
    });

    readiness.mark_serving();
    info!("R2P service running - press Ctrl+C to shutdown");
    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");
    readiness.mark_draining();

    // Stops the HTTP server, the roster actor (and its timers) and both workers
    shutdown_token.cancel();

    let joined = tokio::time::timeout(SHUTDOWN_GRACE, async {
        let _ = roster_task.await;
        let _ = http_task.await;
        let _ = publisher_task.await;
        let _ = role_task.await;
    })
    .await;
    if joined.is_err() {
        warn!(
            grace_secs = SHUTDOWN_GRACE.as_secs(),
            "Tasks did not stop within the shutdown grace"
        );
    }

    info!("R2P service shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. This is acceptable because
/// without signal handlers, we cannot gracefully shut down the service.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
