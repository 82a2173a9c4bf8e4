use crate::custody::{CustodyKey, KeyCustody, KeyMaterial};
use crate::error::CustodyError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// Process-local custody, used in development and tests
#[derive(Default)]
pub struct InMemoryKeyCustody {
    slots: RwLock<HashMap<CustodyKey, KeyMaterial>>,
    unavailable: AtomicBool,
}

impl InMemoryKeyCustody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails with `Unavailable` until cleared
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    fn check_available(&self) -> Result<(), CustodyError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CustodyError::Unavailable("in-memory custody switched off".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyCustody for InMemoryKeyCustody {
    async fn put(&self, key: &CustodyKey, material: KeyMaterial) -> Result<(), CustodyError> {
        self.check_available()?;
        self.slots.write().await.insert(*key, material);
        Ok(())
    }

    async fn get(&self, key: &CustodyKey) -> Result<KeyMaterial, CustodyError> {
        self.check_available()?;
        self.slots
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| CustodyError::NotFound(key.path()))
    }
}
