//! Per-room asymmetric encryption.
//!
//! RSA-OAEP over SHA-256. Public keys are exchanged as SPKI PEM and private
//! keys as PKCS#8 PEM, which is also the shape they take in key custody.

use crate::crypto::codec::{decode_wager, encode_wager};
use crate::custody::KeyMaterial;
use crate::error::{AppError, AppResult};
use crate::models::WagerVector;
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

/// OAEP padding cost for a 32-byte digest: 2 * hLen + 2
pub const OAEP_OVERHEAD: usize = 2 * 32 + 2;

/// Largest ciphertext a room accepts (4096-bit modulus)
pub const MAX_CIPHERTEXT_LEN: usize = 512;

/// Key pair guarding one room (or the shared strategy slot)
#[derive(Clone)]
pub struct RoomKeyPair {
    public: RsaPublicKey,
    private: RsaPrivateKey,
}

impl RoomKeyPair {
    /// Generate a fresh key pair with a modulus of `bits`
    pub fn generate(bits: usize) -> AppResult<Self> {
        let private = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| AppError::Message(format!("Key generation failed: {}", e)))?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { public, private })
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private
    }

    pub fn public_key_pem(&self) -> AppResult<String> {
        self.public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| AppError::Message(format!("Public key encoding failed: {}", e)))
    }

    pub fn private_key_pem(&self) -> AppResult<String> {
        let pem = self
            .private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| AppError::Message(format!("Private key encoding failed: {}", e)))?;
        Ok(pem.as_str().to_owned())
    }

    /// Both halves as stored in custody
    pub fn to_material(&self) -> AppResult<KeyMaterial> {
        Ok(KeyMaterial {
            public_key: self.public_key_pem()?,
            private_key: self.private_key_pem()?,
        })
    }

    pub fn from_material(material: &KeyMaterial) -> AppResult<Self> {
        let private = parse_private_key(&material.private_key)?;
        let public = parse_public_key(&material.public_key)?;
        if RsaPublicKey::from(&private) != public {
            return Err(AppError::Decryption(
                "Stored public key does not match private key".into(),
            ));
        }
        Ok(Self { public, private })
    }
}

impl std::fmt::Debug for RoomKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomKeyPair")
            .field("bits", &(self.public.size() * 8))
            .finish_non_exhaustive()
    }
}

pub fn parse_public_key(pem: &str) -> AppResult<RsaPublicKey> {
    RsaPublicKey::from_public_key_pem(pem)
        .map_err(|e| AppError::Validation(format!("Invalid public key: {}", e)))
}

pub fn parse_private_key(pem: &str) -> AppResult<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .map_err(|e| AppError::Decryption(format!("Invalid private key: {}", e)))
}

/// Maximum plaintext the key can carry under OAEP-SHA256
pub fn max_plaintext_len(key: &RsaPublicKey) -> usize {
    key.size().saturating_sub(OAEP_OVERHEAD)
}

pub fn encrypt(key: &RsaPublicKey, plaintext: &[u8]) -> AppResult<Vec<u8>> {
    let limit = max_plaintext_len(key);
    if plaintext.len() > limit {
        return Err(AppError::PayloadTooLarge {
            size: plaintext.len(),
            limit,
        });
    }

    key.encrypt(&mut OsRng, Oaep::new::<Sha256>(), plaintext)
        .map_err(|e| AppError::Message(format!("Encryption failed: {}", e)))
}

/// Fails with `Decryption` for foreign or malformed ciphertexts
pub fn decrypt(key: &RsaPrivateKey, ciphertext: &[u8]) -> AppResult<Vec<u8>> {
    key.decrypt(Oaep::new::<Sha256>(), ciphertext)
        .map_err(|e| AppError::Decryption(e.to_string()))
}

/// Encode and encrypt a wager for a room
pub fn seal_wager(key: &RsaPublicKey, wager: &[u8]) -> AppResult<Vec<u8>> {
    let plaintext = encode_wager(wager, max_plaintext_len(key))?;
    encrypt(key, &plaintext)
}

/// Decrypt and decode a sealed wager
pub fn open_wager(key: &RsaPrivateKey, ciphertext: &[u8]) -> AppResult<WagerVector> {
    let plaintext = decrypt(key, ciphertext)?;
    decode_wager(&plaintext)
}
