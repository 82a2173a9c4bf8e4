pub mod fund_ledger;
pub mod room_repository;
pub mod strategy_repository;

// Re-export all repositories for convenient access
pub use fund_ledger::{replay_balances, FundLedger, SettlementLeg};
pub use room_repository::RoomRepository;
pub use strategy_repository::StrategyRepository;
