//! Room registry: lifecycle of sealed-bid rooms.
//!
//! Every transition takes the room's mutex and holds it until the new state
//! is written, so for one room `place_bet`, `close_for_decoding`,
//! `decode_bet_datas` and `settlement` are linearized. Ledger books are only
//! ever locked after a room, never the other way round.

use crate::clock::Clock;
use crate::crypto::{RoomKeyPair, MAX_CIPHERTEXT_LEN};
use crate::custody::{get_with_timeout, put_with_timeout, CustodyKey, KeyCustody};
use crate::error::{option_to_result, AppError, AppResult, CustodyError};
use crate::models::{
    AccountId, BetEntry, Room, RoomEvent, RoomId, RoomParams, RoomStatus, SealingKey,
    SettlementSummary, WagerVector,
};
use crate::repositories::{FundLedger, RoomRepository, StrategyRepository};
use crate::services::events::EventBus;
use crate::services::outcome::{plan_settlement, MajorityMatchRule, OutcomeRule};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_KEY_BITS: usize = 2048;
pub const DEFAULT_CUSTODY_TIMEOUT: Duration = Duration::from_millis(2000);

/// Service for managing rooms and the bets placed in them
pub struct RoomRegistry {
    rooms: RoomRepository,
    ledger: Arc<FundLedger>,
    strategies: Arc<StrategyRepository>,
    custody: Arc<dyn KeyCustody>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    rule: Arc<dyn OutcomeRule>,
    operator: AccountId,
    key_bits: usize,
    custody_timeout: Duration,
}

impl RoomRegistry {
    pub fn new(
        ledger: Arc<FundLedger>,
        strategies: Arc<StrategyRepository>,
        custody: Arc<dyn KeyCustody>,
        clock: Arc<dyn Clock>,
        operator: AccountId,
    ) -> Self {
        Self {
            rooms: RoomRepository::new(),
            ledger,
            strategies,
            custody,
            clock,
            events: EventBus::new(),
            rule: Arc::new(MajorityMatchRule),
            operator,
            key_bits: DEFAULT_KEY_BITS,
            custody_timeout: DEFAULT_CUSTODY_TIMEOUT,
        }
    }

    /// Set the RSA modulus size for new room keys
    pub fn with_key_bits(mut self, bits: usize) -> Self {
        self.key_bits = bits;
        self
    }

    /// Set the timeout applied to every custody call
    pub fn with_custody_timeout(mut self, timeout: Duration) -> Self {
        self.custody_timeout = timeout;
        self
    }

    /// Replace the rule that picks winners at settlement
    pub fn with_outcome_rule(mut self, rule: Arc<dyn OutcomeRule>) -> Self {
        self.rule = rule;
        self
    }

    /// Publish transitions on an existing bus
    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn ledger(&self) -> &Arc<FundLedger> {
        &self.ledger
    }

    pub fn strategies(&self) -> &Arc<StrategyRepository> {
        &self.strategies
    }

    pub fn operator(&self) -> &AccountId {
        &self.operator
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    fn authorize(&self, caller: &AccountId, action: &str) -> AppResult<()> {
        if caller != &self.operator {
            warn!("Rejected {} by non-operator {}", action, caller);
            return Err(AppError::Unauthorized(format!(
                "{} may only be performed by the operator",
                action
            )));
        }
        Ok(())
    }

    async fn generate_key_pair(&self) -> AppResult<RoomKeyPair> {
        let bits = self.key_bits;
        tokio::task::spawn_blocking(move || RoomKeyPair::generate(bits))
            .await
            .map_err(|e| AppError::Message(format!("Key generation task failed: {}", e)))?
    }

    async fn register_key_pair(&self, slot: CustodyKey) -> AppResult<RoomKeyPair> {
        let keys = self.generate_key_pair().await?;
        put_with_timeout(self.custody.as_ref(), &slot, keys.to_material()?, self.custody_timeout).await?;
        debug!("Registered {}-bit key pair under {}", self.key_bits, slot);
        Ok(keys)
    }

    // =========================================================================
    // Strategy sealing key
    // =========================================================================

    /// Make sure the shared strategy key pair exists in custody
    pub async fn ensure_strategy_key(&self) -> AppResult<()> {
        match get_with_timeout(self.custody.as_ref(), &CustodyKey::Strategies, self.custody_timeout).await {
            Ok(_) => Ok(()),
            Err(CustodyError::NotFound(_)) => {
                self.register_key_pair(CustodyKey::Strategies).await?;
                info!("Generated strategy sealing key");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// PEM public key that custom strategies are sealed under
    pub async fn strategy_public_key(&self) -> AppResult<String> {
        let material =
            get_with_timeout(self.custody.as_ref(), &CustodyKey::Strategies, self.custody_timeout).await?;
        Ok(material.public_key)
    }

    // =========================================================================
    // Room lifecycle
    // =========================================================================

    /// Create an open room with a fresh key pair registered in custody
    pub async fn create_room(&self, params: RoomParams, creator: &AccountId) -> AppResult<RoomId> {
        params.validate()?;

        let id = self.rooms.allocate_id();
        self.register_key_pair(CustodyKey::Room(id)).await?;

        let room = Room::new(id, params, creator.clone(), self.clock.now());
        let end_time = room.end_time;
        self.rooms.insert(room).await;

        info!("Created room {} for {}, betting until {}", id, creator, end_time);
        self.events.emit(RoomEvent::RoomCreated {
            room_id: id,
            creator: creator.clone(),
            end_time,
        });
        Ok(id)
    }

    /// Create a room and place the creator's bet from one of their stored
    /// strategies. Either both happen or neither does.
    pub async fn create_room_from_strategy(
        &self,
        params: RoomParams,
        creator: &AccountId,
        strategy_index: u64,
    ) -> AppResult<RoomId> {
        params.validate()?;
        let ciphertext = self.strategies.get_custom_strategy(creator, strategy_index).await?;
        check_ciphertext(&ciphertext)?;

        let now = self.clock.now();
        if now < params.start_time || now > params.end_time {
            return Err(AppError::Validation(format!(
                "Creator bet at {} falls outside window [{}, {}]",
                now, params.start_time, params.end_time
            )));
        }
        let available = self.ledger.get_user_token_balance(creator, &params.asset).await;
        if available < params.stake_price {
            return Err(AppError::InsufficientFunds {
                available,
                required: params.stake_price,
            });
        }

        let id = self.rooms.allocate_id();
        self.register_key_pair(CustodyKey::Room(id)).await?;

        let mut room = Room::new(id, params, creator.clone(), now);
        self.ledger.lock(creator, &room.asset, room.stake_price).await?;
        room.bets.push(BetEntry {
            bettor: creator.clone(),
            ciphertext: ciphertext.clone(),
            submitted_at: now,
            sealing: SealingKey::Strategy {
                owner: creator.clone(),
                index: strategy_index,
            },
        });
        let end_time = room.end_time;
        self.rooms.insert(room).await;

        info!(
            "Created room {} for {} with strategy {} as opening bet",
            id, creator, strategy_index
        );
        self.events.emit(RoomEvent::RoomCreated {
            room_id: id,
            creator: creator.clone(),
            end_time,
        });
        self.events.emit(RoomEvent::BetPlaced {
            room_id: id,
            bettor: creator.clone(),
            ciphertext_digest: digest(&ciphertext),
        });
        Ok(id)
    }

    /// PEM public key bettors seal their wagers under
    pub async fn room_public_key(&self, room_id: RoomId) -> AppResult<String> {
        self.rooms.handle(room_id).await?;
        let material =
            get_with_timeout(self.custody.as_ref(), &CustodyKey::Room(room_id), self.custody_timeout).await?;
        Ok(material.public_key)
    }

    /// Place a sealed wager, locking one stake of the room's asset.
    /// The bet is stamped with the registry clock.
    pub async fn place_bet(&self, room_id: RoomId, bettor: &AccountId, ciphertext: Vec<u8>) -> AppResult<()> {
        self.insert_bet(room_id, bettor, ciphertext, SealingKey::Room).await
    }

    /// Place a bet whose ciphertext is one of the bettor's stored strategies
    pub async fn place_bet_from_strategy(
        &self,
        room_id: RoomId,
        bettor: &AccountId,
        strategy_index: u64,
    ) -> AppResult<()> {
        let ciphertext = self.strategies.get_custom_strategy(bettor, strategy_index).await?;
        let sealing = SealingKey::Strategy {
            owner: bettor.clone(),
            index: strategy_index,
        };
        self.insert_bet(room_id, bettor, ciphertext, sealing).await
    }

    async fn insert_bet(
        &self,
        room_id: RoomId,
        bettor: &AccountId,
        ciphertext: Vec<u8>,
        sealing: SealingKey,
    ) -> AppResult<()> {
        check_ciphertext(&ciphertext)?;

        let handle = self.rooms.handle(room_id).await?;
        let mut room = handle.lock().await;

        if !room.is_open() {
            return Err(AppError::AlreadyClosed(room_id));
        }
        let now = self.clock.now();
        if !room.accepts_bets_at(now) {
            return Err(AppError::Validation(format!(
                "Bet at {} falls outside window [{}, {}] of room {}",
                now, room.start_time, room.end_time, room_id
            )));
        }
        if room.has_bettor(bettor) {
            return Err(AppError::DuplicateBettor {
                room_id,
                bettor: bettor.to_string(),
            });
        }
        if !room.has_room_for_bet() {
            return Err(AppError::Validation(format!(
                "Room {} pool cannot take another stake of {}",
                room_id, room.stake_price
            )));
        }

        self.ledger.lock(bettor, &room.asset, room.stake_price).await?;

        let ciphertext_digest = digest(&ciphertext);
        room.bets.push(BetEntry {
            bettor: bettor.clone(),
            ciphertext,
            submitted_at: now,
            sealing,
        });
        info!("Bet {} placed in room {} by {}", room.bets.len(), room_id, bettor);
        drop(room);

        self.events.emit(RoomEvent::BetPlaced {
            room_id,
            bettor: bettor.clone(),
            ciphertext_digest,
        });
        Ok(())
    }

    /// Open → AwaitingSettlement, once the betting window has passed
    pub async fn close_for_decoding(&self, room_id: RoomId) -> AppResult<()> {
        let handle = self.rooms.handle(room_id).await?;
        let mut room = handle.lock().await;

        if !room.is_open() {
            return Err(AppError::AlreadyClosed(room_id));
        }
        if !room.is_expired(self.clock.now()) {
            return Err(AppError::BettingStillOpen {
                room_id,
                end_time: room.end_time,
            });
        }

        room.status = RoomStatus::AwaitingSettlement;
        info!("Room {} closed with {} bets", room_id, room.bets.len());
        drop(room);

        self.events.emit(RoomEvent::RoomClosed { room_id });
        Ok(())
    }

    /// Record the operator's decrypted wagers, positionally matched to the bets.
    ///
    /// The plaintexts are trusted as submitted. Re-submitting the exact
    /// outcome already recorded is accepted so a restarted watcher can
    /// repeat the step.
    pub async fn decode_bet_datas(
        &self,
        room_id: RoomId,
        plaintexts: Vec<WagerVector>,
        operator: &AccountId,
    ) -> AppResult<()> {
        self.authorize(operator, "decode_bet_datas")?;

        let handle = self.rooms.handle(room_id).await?;
        let mut room = handle.lock().await;

        match room.status {
            RoomStatus::Open => {
                return Err(AppError::InvalidState(format!(
                    "Room {} must be closed before decoding",
                    room_id
                )))
            }
            RoomStatus::Settled => return Err(AppError::AlreadySettled(room_id)),
            RoomStatus::AwaitingSettlement => {}
        }
        if plaintexts.len() != room.bets.len() {
            return Err(AppError::Validation(format!(
                "Room {} has {} bets but {} plaintexts were submitted",
                room_id,
                room.bets.len(),
                plaintexts.len()
            )));
        }
        if let Some(recorded) = &room.decoded_outcome {
            if recorded == &plaintexts {
                debug!("Room {} outcome already recorded", room_id);
                return Ok(());
            }
            return Err(AppError::InvalidState(format!(
                "Room {} already has a different decoded outcome",
                room_id
            )));
        }

        let bet_count = plaintexts.len();
        room.decoded_outcome = Some(plaintexts);
        info!("Decoded {} wagers for room {}", bet_count, room_id);
        drop(room);

        self.events.emit(RoomEvent::OutcomeDecoded { room_id, bet_count });
        Ok(())
    }

    /// Pay out a decoded room. The status check and the ledger batch happen
    /// under the room lock, so a second call always sees `Settled`.
    pub async fn settlement(&self, room_id: RoomId, operator: &AccountId) -> AppResult<SettlementSummary> {
        self.authorize(operator, "settlement")?;

        let handle = self.rooms.handle(room_id).await?;
        let mut room = handle.lock().await;

        if room.is_settled() {
            return Err(AppError::AlreadySettled(room_id));
        }
        let outcome = match (&room.status, &room.decoded_outcome) {
            (RoomStatus::AwaitingSettlement, Some(outcome)) => outcome,
            _ => return Err(AppError::NotReady(room_id)),
        };

        let winners = self.rule.winners(outcome);
        let bettors: Vec<AccountId> = room.bets.iter().map(|b| b.bettor.clone()).collect();
        let plan = plan_settlement(room_id, &bettors, room.stake_price, &winners, self.clock.now())?;

        self.ledger.settle_batch(&room.asset, &plan.legs).await?;

        room.status = RoomStatus::Settled;
        room.settlement = Some(plan.summary.clone());
        let end_time = room.end_time;
        drop(room);
        self.rooms.mark_settled(room_id, end_time).await;

        if plan.summary.refunded {
            info!("Room {} settled with no winners, {} refunded", room_id, plan.summary.pool);
        } else {
            info!(
                "Room {} settled: {} winners share pool of {}",
                room_id,
                plan.summary.winners.len(),
                plan.summary.pool
            );
        }
        self.events.emit(RoomEvent::RoomSettled {
            room_id,
            outcome: plan.summary.clone(),
        });
        Ok(plan.summary)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get_room(&self, room_id: RoomId) -> AppResult<Room> {
        option_to_result(
            self.rooms.find_by_id(room_id).await,
            &format!("Room {} not found", room_id),
        )
    }

    pub async fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.ids().await
    }

    /// Stored ciphertexts in bet order
    pub async fn bet_ciphertexts(&self, room_id: RoomId) -> AppResult<Vec<Vec<u8>>> {
        let room = self.get_room(room_id).await?;
        Ok(room.bets.into_iter().map(|b| b.ciphertext).collect())
    }

    /// Open rooms past their window plus rooms stuck awaiting settlement
    pub async fn rooms_pending_settlement(&self, now: i64) -> impl Iterator<Item = RoomId> + Clone {
        self.rooms.pending_settlement(now).await
    }
}

fn check_ciphertext(ciphertext: &[u8]) -> AppResult<()> {
    if ciphertext.is_empty() {
        return Err(AppError::Validation("Ciphertext must not be empty".into()));
    }
    if ciphertext.len() > MAX_CIPHERTEXT_LEN {
        return Err(AppError::PayloadTooLarge {
            size: ciphertext.len(),
            limit: MAX_CIPHERTEXT_LEN,
        });
    }
    Ok(())
}

fn digest(ciphertext: &[u8]) -> String {
    hex::encode(Sha256::digest(ciphertext))
}
