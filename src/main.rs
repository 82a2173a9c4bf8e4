//! Sealbid Backend Service
//!
//! Main entry point for the sealed-bid betting backend.
//! This service runs:
//! - the room registry and fund ledger
//! - the settlement watcher that decrypts and settles expired rooms
//! - the audit trail writer fed from room events

use anyhow::Context;
use sealbid_backend::clock::SystemClock;
use sealbid_backend::config::CustodyBackend;
use sealbid_backend::services::AuditTrailService;
use sealbid_backend::{custody_from_config, AppConfig, AppState};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables first
    dotenv::dotenv().ok();

    // Load configuration
    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        anyhow::anyhow!(e)
    })?;

    // Initialize tracing/logging with config
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("sealbid_backend={},reqwest=warn", config.log_level).into());
    if config.json_logs() {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║           Sealbid Backend Service Starting               ║");
    info!("╚══════════════════════════════════════════════════════════╝");
    info!("Environment: {}", config.environment);
    info!("Log level: {}", config.log_level);
    info!("Operator account: {}", config.operator_account);
    match &config.custody.backend {
        CustodyBackend::Memory => info!("Key custody: in-memory"),
        CustodyBackend::Vault { url, mount, .. } => info!("Key custody: Vault at {} (mount {})", url, mount),
    }

    // =========================================================================
    // CORE SERVICES INITIALIZATION
    // =========================================================================
    info!("Initializing core services...");

    let custody = custody_from_config(&config.custody);
    let state = AppState::new(config.clone(), custody, Arc::new(SystemClock));
    info!("✓ Ledger, strategy store and room registry initialized");

    state
        .registry
        .ensure_strategy_key()
        .await
        .context("Failed to provision the strategy sealing key")?;
    info!("✓ Strategy sealing key available");

    let audit_trail = Arc::new(
        AuditTrailService::new(&config.audit_log_dir).context("Audit trail initialization failed")?,
    );
    info!("✓ Audit trail service initialized");

    // =========================================================================
    // BACKGROUND TASKS
    // =========================================================================
    info!("Starting background tasks...");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let watcher = state.settlement_watcher();
    let mut watcher_handle = tokio::spawn(watcher.start(shutdown_rx));
    info!(
        "✓ Settlement watcher started ({}ms interval)",
        config.watcher.poll_interval_ms
    );

    let audit_handle = tokio::spawn(audit_trail.run(state.events.subscribe()));
    info!("✓ Audit trail forwarder started");

    info!("Sealbid backend ready. Press Ctrl+C to shutdown gracefully");

    // =========================================================================
    // SHUTDOWN HANDLING
    // =========================================================================
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, shutting down gracefully...");
        }
        _ = &mut watcher_handle => {
            error!("Settlement watcher exited unexpectedly");
        }
    }

    // The watcher finishes its current tick before it stops
    let _ = shutdown_tx.send(true);
    if !watcher_handle.is_finished() {
        if let Err(e) = watcher_handle.await {
            error!("Settlement watcher failed during shutdown: {}", e);
        }
    }
    audit_handle.abort();

    info!("Sealbid backend service shutdown complete");
    Ok(())
}
