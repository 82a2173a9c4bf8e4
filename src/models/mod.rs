//! Domain models for the sealed-bid venue.
//!
//! Rooms and their bets, reusable strategies, ledger balances and flow
//! records, and the events emitted on room transitions.

pub mod account;
pub mod balance;
pub mod event;
pub mod room;
pub mod strategy;

// Re-export all models for convenient access
pub use account::{AccountId, AssetId};
pub use balance::{AccountBalance, FlowKind, FlowRecord};
pub use event::RoomEvent;
pub use room::{
    BetEntry, Room, RoomId, RoomParams, RoomStatus, SealingKey, SettlementSummary, WagerVector,
};
pub use strategy::CustomStrategy;
