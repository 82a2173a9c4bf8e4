//! Secret custody for room key pairs.
//!
//! Custody is an external collaborator: this crate only needs `put` and `get`
//! by slot name. Confidentiality of the stored private halves before a room's
//! end time is assumed, not enforced here.

pub mod memory;
pub mod vault;

pub use memory::InMemoryKeyCustody;
pub use vault::VaultKeyCustody;

use crate::error::CustodyError;
use crate::models::RoomId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// PEM encoded key pair as stored in custody
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMaterial {
    #[serde(rename = "publicKey")]
    pub public_key: String,
    #[serde(rename = "privateKey")]
    pub private_key: String,
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Named custody slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CustodyKey {
    Room(RoomId),
    /// Shared key pair that stored strategies are sealed under
    Strategies,
}

impl CustodyKey {
    pub fn path(&self) -> String {
        match self {
            CustodyKey::Room(id) => format!("room-{}", id),
            CustodyKey::Strategies => "strategies".to_string(),
        }
    }
}

impl fmt::Display for CustodyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Key-value store for key material
#[async_trait]
pub trait KeyCustody: Send + Sync {
    async fn put(&self, key: &CustodyKey, material: KeyMaterial) -> Result<(), CustodyError>;

    async fn get(&self, key: &CustodyKey) -> Result<KeyMaterial, CustodyError>;
}

/// `get` bounded by a caller-supplied timeout
pub async fn get_with_timeout(
    custody: &dyn KeyCustody,
    key: &CustodyKey,
    timeout: Duration,
) -> Result<KeyMaterial, CustodyError> {
    match tokio::time::timeout(timeout, custody.get(key)).await {
        Ok(result) => result,
        Err(_) => Err(CustodyError::Timeout(timeout.as_millis() as u64)),
    }
}

/// `put` bounded by a caller-supplied timeout
pub async fn put_with_timeout(
    custody: &dyn KeyCustody,
    key: &CustodyKey,
    material: KeyMaterial,
    timeout: Duration,
) -> Result<(), CustodyError> {
    match tokio::time::timeout(timeout, custody.put(key, material)).await {
        Ok(result) => result,
        Err(_) => Err(CustodyError::Timeout(timeout.as_millis() as u64)),
    }
}
