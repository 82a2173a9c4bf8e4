use crate::models::AccountId;
use serde::{Deserialize, Serialize};

/// Reusable sealed wager template, independent of any room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomStrategy {
    pub owner: AccountId,
    /// Sequence number unique per owner, starting at 0
    pub index: u64,
    pub ciphertext: Vec<u8>,
    pub stored_at: i64,
}
