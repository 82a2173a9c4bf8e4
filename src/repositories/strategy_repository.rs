//! Repository for custom strategies (reusable sealed wagers)

use crate::clock::Clock;
use crate::crypto::MAX_CIPHERTEXT_LEN;
use crate::error::{AppError, AppResult};
use crate::models::{AccountId, CustomStrategy};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Append-only store indexed by owner and per-owner sequence number
pub struct StrategyRepository {
    strategies: RwLock<HashMap<AccountId, Vec<CustomStrategy>>>,
    clock: Arc<dyn Clock>,
}

impl StrategyRepository {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            strategies: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Store a sealed strategy and return its index for `owner` (0, 1, 2, ...)
    pub async fn store_custom_strategy(&self, owner: &AccountId, ciphertext: Vec<u8>) -> AppResult<u64> {
        if ciphertext.is_empty() {
            return Err(AppError::Validation("Strategy ciphertext must not be empty".into()));
        }
        if ciphertext.len() > MAX_CIPHERTEXT_LEN {
            return Err(AppError::PayloadTooLarge {
                size: ciphertext.len(),
                limit: MAX_CIPHERTEXT_LEN,
            });
        }

        let mut strategies = self.strategies.write().await;
        let owned = strategies.entry(owner.clone()).or_default();
        let index = owned.len() as u64;
        owned.push(CustomStrategy {
            owner: owner.clone(),
            index,
            ciphertext,
            stored_at: self.clock.now(),
        });

        info!("Stored custom strategy {} for {}", index, owner);
        Ok(index)
    }

    /// Exact ciphertext bytes stored at `index`
    pub async fn get_custom_strategy(&self, owner: &AccountId, index: u64) -> AppResult<Vec<u8>> {
        self.find(owner, index)
            .await
            .map(|strategy| strategy.ciphertext)
            .ok_or_else(|| AppError::NotFound(format!("Strategy {} of {}", index, owner)))
    }

    pub async fn find(&self, owner: &AccountId, index: u64) -> Option<CustomStrategy> {
        let strategies = self.strategies.read().await;
        strategies
            .get(owner)
            .and_then(|owned| owned.get(index as usize))
            .cloned()
    }

    pub async fn count_by_owner(&self, owner: &AccountId) -> u64 {
        self.strategies
            .read()
            .await
            .get(owner)
            .map(|owned| owned.len() as u64)
            .unwrap_or(0)
    }
}
