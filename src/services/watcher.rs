//! Settlement watcher: drives expired rooms through close → decode → settle.
//!
//! Each tick walks the rooms whose window has passed, opens every sealed
//! wager with the private key from custody and hands the plaintexts to the
//! registry. A room that cannot be finished is left as it is and picked up
//! again on the next tick. Shutdown is only observed between ticks.

use crate::crypto::{open_wager, RoomKeyPair};
use crate::custody::{get_with_timeout, CustodyKey, KeyCustody};
use crate::error::{AppError, AppResult};
use crate::models::{AccountId, Room, RoomId, SealingKey, WagerVector};
use crate::services::room_service::{RoomRegistry, DEFAULT_CUSTODY_TIMEOUT};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time;
use tracing::{debug, error, info, warn};

/// Consecutive failures after which every retry is logged as an error
pub const ESCALATE_AFTER_FAILURES: u32 = 5;

/// What one tick did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub settled: Vec<RoomId>,
    /// Rooms left for the next tick
    pub retried: Vec<RoomId>,
}

pub struct SettlementWatcher {
    registry: Arc<RoomRegistry>,
    custody: Arc<dyn KeyCustody>,
    operator: AccountId,
    poll_interval: Duration,
    custody_timeout: Duration,
    failures: Mutex<HashMap<RoomId, u32>>,
}

impl SettlementWatcher {
    pub fn new(registry: Arc<RoomRegistry>, custody: Arc<dyn KeyCustody>, operator: AccountId) -> Self {
        Self {
            registry,
            custody,
            operator,
            poll_interval: Duration::from_secs(1),
            custody_timeout: DEFAULT_CUSTODY_TIMEOUT,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Set poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_custody_timeout(mut self, timeout: Duration) -> Self {
        self.custody_timeout = timeout;
        self
    }

    /// Run until `shutdown` flips to true or its sender is dropped
    pub async fn start(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.poll_interval);
        info!("Settlement watcher started, polling every {:?}", self.poll_interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.changed() => {}
            }
            if *shutdown.borrow() || shutdown.has_changed().is_err() {
                break;
            }

            let report = self.run_tick().await;
            if !report.settled.is_empty() || !report.retried.is_empty() {
                debug!(
                    "Watcher tick: {} settled, {} to retry",
                    report.settled.len(),
                    report.retried.len()
                );
            }
        }

        info!("Settlement watcher stopped");
    }

    /// One pass over every room that is due
    pub async fn run_tick(&self) -> TickReport {
        let mut report = TickReport::default();
        let now = self.registry.now();

        for room_id in self.registry.rooms_pending_settlement(now).await {
            match self.settle_room(room_id).await {
                Ok(()) => {
                    self.failures.lock().await.remove(&room_id);
                    report.settled.push(room_id);
                }
                Err(AppError::AlreadySettled(_)) => {
                    // another watcher got there first
                    self.failures.lock().await.remove(&room_id);
                    debug!("Room {} was settled elsewhere", room_id);
                }
                Err(e) => {
                    let attempts = {
                        let mut failures = self.failures.lock().await;
                        let count = failures.entry(room_id).or_insert(0);
                        *count += 1;
                        *count
                    };
                    if e.is_fatal() || attempts >= ESCALATE_AFTER_FAILURES {
                        error!("Room {} still unsettled after {} attempts: {}", room_id, attempts, e);
                    } else {
                        warn!("Room {} skipped, will retry: {}", room_id, e);
                    }
                    report.retried.push(room_id);
                }
            }
        }

        report
    }

    /// Consecutive failed attempts for a room
    pub async fn failure_count(&self, room_id: RoomId) -> u32 {
        self.failures.lock().await.get(&room_id).copied().unwrap_or(0)
    }

    async fn settle_room(&self, room_id: RoomId) -> AppResult<()> {
        let room = self.registry.get_room(room_id).await?;
        if room.is_settled() {
            return Err(AppError::AlreadySettled(room_id));
        }

        // a room already decoded before a restart only needs the payout
        if room.decoded_outcome.is_none() {
            let plaintexts = self.open_bets(&room).await?;
            if room.is_open() {
                match self.registry.close_for_decoding(room_id).await {
                    Ok(()) | Err(AppError::AlreadyClosed(_)) => {}
                    Err(e) => return Err(e),
                }
            }
            self.registry
                .decode_bet_datas(room_id, plaintexts, &self.operator)
                .await?;
        } else {
            info!("Resuming settlement of room {}", room_id);
        }

        self.registry.settlement(room_id, &self.operator).await?;
        Ok(())
    }

    async fn key_pair(&self, slot: CustodyKey) -> AppResult<RoomKeyPair> {
        let material = get_with_timeout(self.custody.as_ref(), &slot, self.custody_timeout).await?;
        RoomKeyPair::from_material(&material)
    }

    /// Decrypt every bet in order, fetching only the keys that are needed
    async fn open_bets(&self, room: &Room) -> AppResult<Vec<WagerVector>> {
        let sealed_for_room = room.bets.iter().any(|b| b.sealing == SealingKey::Room);
        let from_strategy = room.bets.iter().any(|b| b.sealing != SealingKey::Room);

        let room_keys = if sealed_for_room {
            Some(self.key_pair(CustodyKey::Room(room.id)).await?)
        } else {
            None
        };
        let strategy_keys = if from_strategy {
            Some(self.key_pair(CustodyKey::Strategies).await?)
        } else {
            None
        };

        room.bets
            .iter()
            .map(|bet| {
                let keys = match bet.sealing {
                    SealingKey::Room => room_keys.as_ref(),
                    SealingKey::Strategy { .. } => strategy_keys.as_ref(),
                };
                let keys = keys.ok_or_else(|| {
                    AppError::Decryption(format!("No key loaded for bet of {}", bet.bettor))
                })?;
                open_wager(keys.private_key(), &bet.ciphertext).map_err(|e| match e {
                    AppError::Decryption(reason) => AppError::Decryption(format!(
                        "Bet of {} in room {}: {}",
                        bet.bettor, room.id, reason
                    )),
                    other => other,
                })
            })
            .collect()
    }
}
