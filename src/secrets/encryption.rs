//! Credential encryption using AES-256-GCM
//!
//! Sealed blobs are laid out as `nonce (12 bytes) || ciphertext || tag (16 bytes)`
//! with a fresh random nonce per encryption.
//!
//! ## Configuration
//!
//! The key is loaded from `BACKPLANE_CREDENTIAL_KEY` (base64-encoded 32-byte key).
//! `BACKPLANE_CREDENTIAL_KEY_VERSION` labels the key in logs so rotations can be
//! traced when records stop decrypting.

use crate::errors::{BackplaneError, Result};
use base64::Engine;
use ring::aead::{self, Aad, BoundKey, Nonce, NonceSequence, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, instrument};
use zeroize::Zeroizing;

/// Size of AES-256-GCM nonce in bytes
pub(crate) const NONCE_SIZE: usize = 12;

/// Size of AES-256-GCM tag in bytes
pub(crate) const TAG_SIZE: usize = 16;

const KEY_SIZE: usize = 32;

/// Key material for the credential cipher
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialKeyConfig {
    /// Base64-encoded 32-byte master key
    pub master_key_base64: String,
    /// Key version for rotation tracking
    pub key_version: String,
}

impl std::fmt::Debug for CredentialKeyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialKeyConfig")
            .field("master_key_base64", &"[REDACTED]")
            .field("key_version", &self.key_version)
            .finish()
    }
}

impl CredentialKeyConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let master_key_base64 = std::env::var("BACKPLANE_CREDENTIAL_KEY").map_err(|_| {
            BackplaneError::config(
                "BACKPLANE_CREDENTIAL_KEY environment variable not set. \
                 Generate a key with: openssl rand -base64 32",
            )
        })?;

        let key_version = std::env::var("BACKPLANE_CREDENTIAL_KEY_VERSION")
            .unwrap_or_else(|_| "default".to_string());

        Ok(Self { master_key_base64, key_version })
    }

    /// Build a configuration from raw key bytes
    pub fn from_key_bytes(key: &[u8], key_version: impl Into<String>) -> Self {
        Self {
            master_key_base64: base64::engine::general_purpose::STANDARD.encode(key),
            key_version: key_version.into(),
        }
    }

    /// Deterministic key for tests. Never use outside tests.
    #[cfg(test)]
    pub fn for_testing() -> Self {
        Self::from_key_bytes(&[0x42u8; KEY_SIZE], "test")
    }
}

/// Single-use nonce sequence for AES-GCM
struct SingleNonce {
    nonce: Option<[u8; NONCE_SIZE]>,
}

impl SingleNonce {
    fn new(nonce_bytes: [u8; NONCE_SIZE]) -> Self {
        Self { nonce: Some(nonce_bytes) }
    }
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.nonce.take().map(Nonce::assume_unique_for_key).ok_or(ring::error::Unspecified)
    }
}

/// Symmetric cipher over raw bytes
#[derive(Clone)]
pub struct CredentialCipher {
    key_bytes: Arc<Zeroizing<[u8; KEY_SIZE]>>,
    key_version: String,
    rng: Arc<SystemRandom>,
}

impl CredentialCipher {
    /// Create a cipher from configuration
    pub fn new(config: &CredentialKeyConfig) -> Result<Self> {
        let key_bytes = Zeroizing::new(
            base64::engine::general_purpose::STANDARD.decode(&config.master_key_base64).map_err(
                |e| {
                    BackplaneError::config(format!(
                        "Invalid base64 in BACKPLANE_CREDENTIAL_KEY: {}",
                        e
                    ))
                },
            )?,
        );

        if key_bytes.len() != KEY_SIZE {
            return Err(BackplaneError::config(format!(
                "BACKPLANE_CREDENTIAL_KEY must be 32 bytes (256 bits), got {} bytes",
                key_bytes.len()
            )));
        }

        let mut key_array = Zeroizing::new([0u8; KEY_SIZE]);
        key_array.copy_from_slice(&key_bytes);

        debug!(key_version = %config.key_version, "Credential cipher initialized");

        Ok(Self {
            key_bytes: Arc::new(key_array),
            key_version: config.key_version.clone(),
            rng: Arc::new(SystemRandom::new()),
        })
    }

    /// Get the current key version
    pub fn key_version(&self) -> &str {
        &self.key_version
    }

    fn unbound_key(&self) -> Result<UnboundKey> {
        UnboundKey::new(&AES_256_GCM, &self.key_bytes[..]).map_err(|_| {
            error!("Failed to create credential key");
            BackplaneError::internal("Failed to create credential key")
        })
    }

    /// Seal plaintext, returning `nonce || ciphertext || tag`
    #[instrument(skip(self, plaintext), fields(plaintext_len = plaintext.len()))]
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        self.rng.fill(&mut nonce_bytes).map_err(|_| {
            error!("Failed to generate random nonce");
            BackplaneError::internal("Failed to generate random nonce for encryption")
        })?;

        let mut sealing_key = aead::SealingKey::new(self.unbound_key()?, SingleNonce::new(nonce_bytes));

        let mut in_out = plaintext.to_vec();
        in_out.reserve(TAG_SIZE);
        sealing_key.seal_in_place_append_tag(Aad::empty(), &mut in_out).map_err(|_| {
            error!("Encryption failed");
            BackplaneError::internal("Failed to encrypt credential payload")
        })?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + in_out.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&in_out);
        Ok(sealed)
    }

    /// Open a blob produced by [`seal`](Self::seal)
    #[instrument(skip(self, sealed), fields(sealed_len = sealed.len(), key_version = %self.key_version))]
    pub fn open(&self, sealed: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(BackplaneError::decryption(format!(
                "Ciphertext too short: expected at least {} bytes, got {}",
                NONCE_SIZE + TAG_SIZE,
                sealed.len()
            )));
        }

        let (nonce_part, ciphertext) = sealed.split_at(NONCE_SIZE);
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        nonce_bytes.copy_from_slice(nonce_part);

        let mut opening_key = aead::OpeningKey::new(self.unbound_key()?, SingleNonce::new(nonce_bytes));

        let mut buffer = Zeroizing::new(ciphertext.to_vec());
        let plaintext_len = opening_key
            .open_in_place(Aad::empty(), &mut buffer)
            .map_err(|_| {
                error!("Decryption failed - possible tampering or wrong key");
                BackplaneError::decryption(
                    "Authentication failed: credential key is wrong or has been rotated",
                )
            })?
            .len();
        buffer.truncate(plaintext_len);

        Ok(buffer)
    }
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCipher")
            .field("key_version", &self.key_version)
            .field("key_bytes", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cipher() -> CredentialCipher {
        CredentialCipher::new(&CredentialKeyConfig::for_testing()).unwrap()
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let cipher = test_cipher();
        let sealed = cipher.seal(b"api-key-k1").unwrap();

        assert_eq!(sealed.len(), NONCE_SIZE + b"api-key-k1".len() + TAG_SIZE);
        assert_eq!(&cipher.open(&sealed).unwrap()[..], b"api-key-k1");
    }

    #[test]
    fn test_fresh_nonce_per_seal() {
        let cipher = test_cipher();
        let first = cipher.seal(b"same").unwrap();
        let second = cipher.seal(b"same").unwrap();

        assert_ne!(first[..NONCE_SIZE], second[..NONCE_SIZE]);
        assert_ne!(first, second);
    }

    #[test]
    fn test_tampered_blob_is_decryption_error() {
        let cipher = test_cipher();
        let mut sealed = cipher.seal(b"sensitive").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;

        assert!(matches!(cipher.open(&sealed), Err(BackplaneError::Decryption { .. })));
    }

    #[test]
    fn test_rotated_key_is_decryption_error() {
        let sealed = test_cipher().seal(b"sensitive").unwrap();
        let rotated =
            CredentialCipher::new(&CredentialKeyConfig::from_key_bytes(&[0x07u8; 32], "v2"))
                .unwrap();

        assert!(matches!(rotated.open(&sealed), Err(BackplaneError::Decryption { .. })));
    }

    #[test]
    fn test_short_blob_is_decryption_error() {
        let cipher = test_cipher();
        assert!(matches!(cipher.open(&[0u8; 10]), Err(BackplaneError::Decryption { .. })));
    }

    #[test]
    fn test_invalid_key_length() {
        let config = CredentialKeyConfig::from_key_bytes(&[0u8; 16], "short");
        assert!(matches!(CredentialCipher::new(&config), Err(BackplaneError::Config { .. })));
    }

    #[test]
    fn test_debug_redacts_key() {
        let cipher = test_cipher();
        let debug = format!("{:?}", cipher);
        assert!(debug.contains("REDACTED"));
        assert!(debug.contains("test"));

        let config_debug = format!("{:?}", CredentialKeyConfig::for_testing());
        assert!(!config_debug.contains(&CredentialKeyConfig::for_testing().master_key_base64));
    }
}
