pub mod audit;
pub mod events;
pub mod outcome;
pub mod room_service;
pub mod watcher;

pub use audit::AuditTrailService;
pub use events::EventBus;
pub use outcome::{plan_settlement, MajorityMatchRule, OutcomeRule, RefundAllRule, SettlementPlan};
pub use room_service::RoomRegistry;
pub use watcher::{SettlementWatcher, TickReport};
