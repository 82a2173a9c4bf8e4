//! Sealbid Backend Library
//!
//! Sealed-bid betting rooms: wagers are committed as ciphertexts under a
//! per-room key, stay opaque until the room closes, and are then decrypted
//! and settled against a fund ledger by the settlement watcher.

pub mod clock;
pub mod config;
pub mod crypto;
pub mod custody;
pub mod error;
pub mod models;
pub mod repositories;
pub mod services;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{AppError, AppResult};

use clock::Clock;
use config::{CustodyBackend, CustodyConfig};
use custody::{InMemoryKeyCustody, KeyCustody, VaultKeyCustody};
use models::AccountId;
use repositories::{FundLedger, StrategyRepository};
use services::{EventBus, RoomRegistry, SettlementWatcher};
use std::sync::Arc;

/// Application state containing all repositories and services
pub struct AppState {
    pub ledger: Arc<FundLedger>,
    pub strategies: Arc<StrategyRepository>,
    pub registry: Arc<RoomRegistry>,
    pub custody: Arc<dyn KeyCustody>,
    pub events: EventBus,
    pub config: AppConfig,
}

impl AppState {
    /// Wire the ledger, strategy store and room registry around one custody
    /// backend and one clock
    pub fn new(config: AppConfig, custody: Arc<dyn KeyCustody>, clock: Arc<dyn Clock>) -> Self {
        let ledger = Arc::new(FundLedger::new(clock.clone()));
        let strategies = Arc::new(StrategyRepository::new(clock.clone()));
        let events = EventBus::new();

        let registry = RoomRegistry::new(
            ledger.clone(),
            strategies.clone(),
            custody.clone(),
            clock,
            AccountId::new(config.operator_account.clone()),
        )
        .with_key_bits(config.custody.key_bits)
        .with_custody_timeout(config.custody.timeout())
        .with_event_bus(events.clone());

        Self {
            ledger,
            strategies,
            registry: Arc::new(registry),
            custody,
            events,
            config,
        }
    }

    /// A watcher acting as the configured operator
    pub fn settlement_watcher(&self) -> SettlementWatcher {
        SettlementWatcher::new(
            self.registry.clone(),
            self.custody.clone(),
            self.registry.operator().clone(),
        )
        .with_poll_interval(self.config.watcher.poll_interval())
        .with_custody_timeout(self.config.custody.timeout())
    }
}

/// Build the custody backend named by the configuration
pub fn custody_from_config(config: &CustodyConfig) -> Arc<dyn KeyCustody> {
    match &config.backend {
        CustodyBackend::Memory => Arc::new(InMemoryKeyCustody::new()),
        CustodyBackend::Vault { url, token, mount } => {
            Arc::new(VaultKeyCustody::new(url.clone(), token.clone(), mount.clone()))
        }
    }
}
