use crate::models::{AccountId, RoomId, SettlementSummary};
use serde::{Deserialize, Serialize};

/// One event per committed room transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomEvent {
    RoomCreated {
        room_id: RoomId,
        creator: AccountId,
        end_time: i64,
    },
    BetPlaced {
        room_id: RoomId,
        bettor: AccountId,
        /// SHA-256 of the ciphertext, hex encoded
        ciphertext_digest: String,
    },
    RoomClosed {
        room_id: RoomId,
    },
    OutcomeDecoded {
        room_id: RoomId,
        bet_count: usize,
    },
    RoomSettled {
        room_id: RoomId,
        outcome: SettlementSummary,
    },
}

impl RoomEvent {
    pub fn room_id(&self) -> RoomId {
        match self {
            RoomEvent::RoomCreated { room_id, .. }
            | RoomEvent::BetPlaced { room_id, .. }
            | RoomEvent::RoomClosed { room_id }
            | RoomEvent::OutcomeDecoded { room_id, .. }
            | RoomEvent::RoomSettled { room_id, .. } => *room_id,
        }
    }

    /// Name used in audit log entries
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomEvent::RoomCreated { .. } => "room_created",
            RoomEvent::BetPlaced { .. } => "bet_placed",
            RoomEvent::RoomClosed { .. } => "room_closed",
            RoomEvent::OutcomeDecoded { .. } => "outcome_decoded",
            RoomEvent::RoomSettled { .. } => "room_settled",
        }
    }
}
