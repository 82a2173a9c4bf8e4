//! HashiCorp Vault (KV v2) custody backend.

use crate::custody::{CustodyKey, KeyCustody, KeyMaterial};
use crate::error::CustodyError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

/// Stores room keys under `{url}/v1/{mount}/data/{slot}`
pub struct VaultKeyCustody {
    client: Client,
    base_url: String,
    mount: String,
    token: String,
}

#[derive(Deserialize)]
struct KvReadResponse {
    data: KvReadData,
}

#[derive(Deserialize)]
struct KvReadData {
    data: KeyMaterial,
}

impl VaultKeyCustody {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, mount: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            mount: mount.into(),
            token: token.into(),
        }
    }

    fn secret_url(&self, key: &CustodyKey) -> String {
        format!("{}/v1/{}/data/{}", self.base_url, self.mount, key.path())
    }
}

#[async_trait]
impl KeyCustody for VaultKeyCustody {
    async fn put(&self, key: &CustodyKey, material: KeyMaterial) -> Result<(), CustodyError> {
        let response = self
            .client
            .post(self.secret_url(key))
            .header("X-Vault-Token", &self.token)
            .json(&serde_json::json!({ "data": material }))
            .send()
            .await
            .map_err(|e| CustodyError::Unavailable(format!("Vault request failed: {}", e)))?;

        if !response.status().is_success() {
            warn!("Vault rejected write of {}: {}", key, response.status());
            return Err(CustodyError::Unavailable(format!(
                "Failed to store {} in Vault: {}",
                key,
                response.status()
            )));
        }

        debug!("Stored key material for {} in Vault", key);
        Ok(())
    }

    async fn get(&self, key: &CustodyKey) -> Result<KeyMaterial, CustodyError> {
        let response = self
            .client
            .get(self.secret_url(key))
            .header("X-Vault-Token", &self.token)
            .send()
            .await
            .map_err(|e| CustodyError::Unavailable(format!("Vault request failed: {}", e)))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(CustodyError::NotFound(key.path())),
            status if status.is_success() => {
                let body: KvReadResponse = response
                    .json()
                    .await
                    .map_err(|e| CustodyError::Malformed(format!("{}: {}", key, e)))?;
                Ok(body.data.data)
            }
            status => Err(CustodyError::Unavailable(format!(
                "Failed to read {} from Vault: {}",
                key, status
            ))),
        }
    }
}
