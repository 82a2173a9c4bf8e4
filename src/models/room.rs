use crate::error::{AppError, AppResult};
use crate::models::{AccountId, AssetId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A decrypted wager: one small integer per betting slot
pub type WagerVector = Vec<u8>;

/// Room identifier, assigned monotonically from 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub u64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Room status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Open,
    AwaitingSettlement,
    Settled,
}

impl RoomStatus {
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "open" => Ok(RoomStatus::Open),
            "awaiting_settlement" => Ok(RoomStatus::AwaitingSettlement),
            "settled" => Ok(RoomStatus::Settled),
            _ => Err(format!("Invalid room status: {}", s)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Open => "open",
            RoomStatus::AwaitingSettlement => "awaiting_settlement",
            RoomStatus::Settled => "settled",
        }
    }
}

/// Parameters supplied when a room is created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomParams {
    pub asset: AssetId,
    pub stake_price: u64,
    pub start_time: i64,
    pub end_time: i64,
}

impl RoomParams {
    pub fn validate(&self) -> AppResult<()> {
        if self.start_time >= self.end_time {
            return Err(AppError::InvalidWindow {
                start: self.start_time,
                end: self.end_time,
            });
        }
        if self.stake_price == 0 {
            return Err(AppError::Validation("Stake price must be greater than zero".into()));
        }
        Ok(())
    }
}

/// Which private key opens a bet's ciphertext
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SealingKey {
    /// Sealed under the room's own key pair
    Room,
    /// Taken verbatim from a stored strategy, sealed under the strategy key
    Strategy { owner: AccountId, index: u64 },
}

/// One encrypted wager placed into a room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetEntry {
    pub bettor: AccountId,
    pub ciphertext: Vec<u8>,
    pub submitted_at: i64,
    pub sealing: SealingKey,
}

/// What settlement did with the room's locked pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementSummary {
    pub winners: Vec<AccountId>,
    /// Pool share credited to each winner on top of their released stake
    pub payouts: Vec<(AccountId, u64)>,
    /// Sum of all stakes locked in the room
    pub pool: u64,
    /// True when nobody won and every stake went back to its owner
    pub refunded: bool,
    pub settled_at: i64,
}

/// A time-boxed sealed-bid betting room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub asset: AssetId,
    pub stake_price: u64,
    pub start_time: i64,
    pub end_time: i64,
    pub creator: AccountId,
    pub status: RoomStatus,
    pub bets: Vec<BetEntry>,
    pub decoded_outcome: Option<Vec<WagerVector>>,
    pub settlement: Option<SettlementSummary>,
    pub created_at: i64,
}

impl Room {
    pub fn new(id: RoomId, params: RoomParams, creator: AccountId, created_at: i64) -> Self {
        Self {
            id,
            asset: params.asset,
            stake_price: params.stake_price,
            start_time: params.start_time,
            end_time: params.end_time,
            creator,
            status: RoomStatus::Open,
            bets: Vec::new(),
            decoded_outcome: None,
            settlement: None,
            created_at,
        }
    }

    /// Inclusive window check
    pub fn accepts_bets_at(&self, timestamp: i64) -> bool {
        self.start_time <= timestamp && timestamp <= self.end_time
    }

    /// Betting window has passed
    pub fn is_expired(&self, now: i64) -> bool {
        now > self.end_time
    }

    pub fn has_bettor(&self, bettor: &AccountId) -> bool {
        self.bets.iter().any(|b| &b.bettor == bettor)
    }

    /// Stake held for this room while it is not settled
    pub fn total_locked(&self) -> u64 {
        self.stake_price.saturating_mul(self.bets.len() as u64)
    }

    /// Whether the pool still fits in a `u64` with one more stake in it
    pub fn has_room_for_bet(&self) -> bool {
        self.stake_price
            .checked_mul(self.bets.len() as u64 + 1)
            .is_some()
    }

    pub fn is_open(&self) -> bool {
        self.status == RoomStatus::Open
    }

    pub fn is_settled(&self) -> bool {
        self.status == RoomStatus::Settled
    }
}
