//! Balance and flow record models for the fund ledger

use crate::models::AssetId;
use serde::{Deserialize, Serialize};

/// Free and locked standing of one account in one asset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub free: u64,
    pub locked: u64,
}

impl AccountBalance {
    pub fn total(&self) -> u64 {
        self.free + self.locked
    }
}

/// Kinds of balance-affecting ledger entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    Deposit,
    Withdraw,
    /// Stake moved from free to locked when a bet is placed
    Lock,
    /// Stake moved from locked back to free at settlement
    Release,
    /// Stake consumed into the room pool at settlement
    Forfeit,
    /// Pool share credited to a winner
    Payout,
}

impl FlowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdraw => "withdraw",
            Self::Lock => "lock",
            Self::Release => "release",
            Self::Forfeit => "forfeit",
            Self::Payout => "payout",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "deposit" => Some(Self::Deposit),
            "withdraw" => Some(Self::Withdraw),
            "lock" => Some(Self::Lock),
            "release" => Some(Self::Release),
            "forfeit" => Some(Self::Forfeit),
            "payout" => Some(Self::Payout),
            _ => None,
        }
    }

    /// Signed effect on the free counter
    pub fn free_delta(&self, amount: u64) -> i128 {
        let amount = amount as i128;
        match self {
            Self::Deposit | Self::Release | Self::Payout => amount,
            Self::Withdraw | Self::Lock => -amount,
            Self::Forfeit => 0,
        }
    }

    /// Signed effect on the locked counter
    pub fn locked_delta(&self, amount: u64) -> i128 {
        let amount = amount as i128;
        match self {
            Self::Lock => amount,
            Self::Release | Self::Forfeit => -amount,
            Self::Deposit | Self::Withdraw | Self::Payout => 0,
        }
    }
}

/// Immutable ledger entry documenting one balance change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRecord {
    pub kind: FlowKind,
    pub asset: AssetId,
    pub amount: u64,
    /// Free balance of (account, asset) right after this entry
    pub resulting_balance: u64,
    /// Locked balance of (account, asset) right after this entry
    pub resulting_locked: u64,
    pub timestamp: i64,
}
