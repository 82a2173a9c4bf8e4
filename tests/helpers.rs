#![allow(dead_code)]

use sealbid_backend::clock::ManualClock;
use sealbid_backend::config::AppConfig;
use sealbid_backend::crypto::{parse_public_key, seal_wager};
use sealbid_backend::custody::InMemoryKeyCustody;
use sealbid_backend::models::*;
use sealbid_backend::services::SettlementWatcher;
use sealbid_backend::AppState;
use std::sync::Arc;

/// Small keys keep RSA generation fast in tests
pub const TEST_KEY_BITS: usize = 1024;

pub const START: i64 = 1_000;
pub const END: i64 = 2_000;

/// Fully wired venue with in-memory custody and a hand-driven clock
pub struct TestVenue {
    pub state: AppState,
    pub clock: Arc<ManualClock>,
    pub custody: Arc<InMemoryKeyCustody>,
    pub operator: AccountId,
}

impl TestVenue {
    pub async fn new() -> Self {
        let mut config = AppConfig::default();
        config.custody.key_bits = TEST_KEY_BITS;
        config.watcher.poll_interval_ms = 10;

        let clock = Arc::new(ManualClock::new(START));
        let custody = Arc::new(InMemoryKeyCustody::new());
        let state = AppState::new(config, custody.clone(), clock.clone());
        state
            .registry
            .ensure_strategy_key()
            .await
            .expect("Failed to create strategy key");

        let operator = state.registry.operator().clone();
        Self {
            state,
            clock,
            custody,
            operator,
        }
    }

    pub fn watcher(&self) -> SettlementWatcher {
        self.state.settlement_watcher()
    }

    /// Account holding `amount` of the test asset
    pub async fn funded_account(&self, name: &str, amount: u64) -> AccountId {
        let account = AccountId::new(name);
        self.state
            .ledger
            .deposit(&account, &usdc(), amount)
            .await
            .expect("Failed to deposit");
        account
    }

    pub async fn open_room(&self, stake_price: u64) -> RoomId {
        self.state
            .registry
            .create_room(room_params(stake_price), &AccountId::new("creator"))
            .await
            .expect("Failed to create room")
    }

    /// Seal `wager` under the room's public key and place it
    pub async fn bet(&self, room_id: RoomId, bettor: &AccountId, wager: &[u8]) {
        let sealed = self.seal_for_room(room_id, wager).await;
        self.state
            .registry
            .place_bet(room_id, bettor, sealed)
            .await
            .expect("Failed to place bet");
    }

    pub async fn seal_for_room(&self, room_id: RoomId, wager: &[u8]) -> Vec<u8> {
        let pem = self
            .state
            .registry
            .room_public_key(room_id)
            .await
            .expect("Room key missing");
        let key = parse_public_key(&pem).expect("Invalid room key");
        seal_wager(&key, wager).expect("Failed to seal wager")
    }

    pub async fn seal_strategy(&self, wager: &[u8]) -> Vec<u8> {
        let pem = self
            .state
            .registry
            .strategy_public_key()
            .await
            .expect("Strategy key missing");
        let key = parse_public_key(&pem).expect("Invalid strategy key");
        seal_wager(&key, wager).expect("Failed to seal strategy")
    }

    /// Move the clock past the betting window
    pub fn expire(&self) {
        self.clock.set(END + 1);
    }

    pub async fn free(&self, account: &AccountId) -> u64 {
        self.state.ledger.get_user_token_balance(account, &usdc()).await
    }

    pub async fn locked(&self, account: &AccountId) -> u64 {
        self.state.ledger.get_locked_balance(account, &usdc()).await
    }
}

pub fn usdc() -> AssetId {
    AssetId::new("USDC")
}

pub fn room_params(stake_price: u64) -> RoomParams {
    RoomParams {
        asset: usdc(),
        stake_price,
        start_time: START,
        end_time: END,
    }
}

/// Sum of amounts of one flow kind across several accounts
pub async fn flow_total(venue: &TestVenue, accounts: &[AccountId], kind: FlowKind) -> u64 {
    let mut total = 0;
    for account in accounts {
        total += venue
            .state
            .ledger
            .get_user_token_fund_flow_records(account)
            .await
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| r.amount)
            .sum::<u64>();
    }
    total
}
