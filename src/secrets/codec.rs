//! Credential envelope codec
//!
//! Turns a structured credential payload into the opaque string stored on a
//! connection record and back. Errors keep "the key is wrong" (`Decryption`)
//! apart from "the content is garbage" (`MalformedPayload`).

use super::encryption::{CredentialCipher, CredentialKeyConfig};
use crate::errors::{BackplaneError, Result};
use base64::Engine;
use serde_json::Value;
use tracing::instrument;
use zeroize::Zeroizing;

/// Encrypts and decrypts credential envelopes
#[derive(Debug, Clone)]
pub struct CredentialCodec {
    cipher: CredentialCipher,
}

impl CredentialCodec {
    /// Create a codec from key configuration
    pub fn new(config: &CredentialKeyConfig) -> Result<Self> {
        Ok(Self { cipher: CredentialCipher::new(config)? })
    }

    /// Create a codec with the key from the environment
    pub fn from_env() -> Result<Self> {
        Self::new(&CredentialKeyConfig::from_env()?)
    }

    /// Version label of the key in use
    pub fn key_version(&self) -> &str {
        self.cipher.key_version()
    }

    /// Serialize `payload` to JSON, seal it, and return base64 text
    #[instrument(skip_all)]
    pub fn encrypt(&self, payload: &Value) -> Result<String> {
        let plaintext = Zeroizing::new(serde_json::to_vec(payload).map_err(|e| {
            BackplaneError::Serialization {
                source: e,
                context: "Failed to serialize credential payload".to_string(),
            }
        })?);
        let sealed = self.cipher.seal(&plaintext)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(sealed))
    }

    /// Open ciphertext produced by [`encrypt`](Self::encrypt).
    ///
    /// The payload must be a JSON object; anything else is `MalformedPayload`.
    #[instrument(skip_all)]
    pub fn decrypt(&self, ciphertext: &str) -> Result<Value> {
        let sealed = base64::engine::general_purpose::STANDARD
            .decode(ciphertext.trim())
            .map_err(|e| BackplaneError::decryption(format!("Ciphertext is not valid base64: {}", e)))?;

        let plaintext = self.cipher.open(&sealed)?;

        let text = std::str::from_utf8(&plaintext)
            .map_err(|e| BackplaneError::malformed(format!("Decrypted payload is not UTF-8: {}", e)))?;

        let payload: Value = serde_json::from_str(text)
            .map_err(|e| BackplaneError::malformed(format!("Decrypted payload is not JSON: {}", e)))?;

        if !payload.is_object() {
            return Err(BackplaneError::malformed(format!(
                "Decrypted payload must be a JSON object, got {}",
                json_kind(&payload)
            )));
        }

        Ok(payload)
    }

    /// Seal arbitrary bytes; used to build payloads the JSON path would reject
    #[cfg(test)]
    pub(crate) fn encrypt_raw(&self, plaintext: &[u8]) -> Result<String> {
        Ok(base64::engine::general_purpose::STANDARD.encode(self.cipher.seal(plaintext)?))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn codec() -> CredentialCodec {
        CredentialCodec::new(&CredentialKeyConfig::for_testing()).unwrap()
    }

    #[test]
    fn test_http_envelope_roundtrip() {
        let codec = codec();
        let payload = json!({
            "base_url": "https://api.example.test",
            "api_key": "k1",
            "headers": {"X-Client": "screener"},
            "timeout": 5
        });

        let ciphertext = codec.encrypt(&payload).unwrap();
        assert!(!ciphertext.contains("k1"));
        assert_eq!(codec.decrypt(&ciphertext).unwrap(), payload);
    }

    #[test]
    fn test_encryptions_differ() {
        let codec = codec();
        let payload = json!({"path": "data/auth.db"});
        assert_ne!(codec.encrypt(&payload).unwrap(), codec.encrypt(&payload).unwrap());
    }

    #[test]
    fn test_wrong_key_is_decryption_error() {
        let ciphertext = codec().encrypt(&json!({"path": "a.db"})).unwrap();
        let other = CredentialCodec::new(&CredentialKeyConfig::from_key_bytes(&[9u8; 32], "v2")).unwrap();

        assert!(matches!(other.decrypt(&ciphertext), Err(BackplaneError::Decryption { .. })));
    }

    #[test]
    fn test_not_base64_is_decryption_error() {
        assert!(matches!(codec().decrypt("%%%not-base64%%%"), Err(BackplaneError::Decryption { .. })));
    }

    #[test]
    fn test_non_json_plaintext_is_malformed() {
        let codec = codec();
        let ciphertext = codec.encrypt_raw(b"host=db;user=admin").unwrap();

        assert!(matches!(codec.decrypt(&ciphertext), Err(BackplaneError::MalformedPayload { .. })));
    }

    #[test]
    fn test_non_utf8_plaintext_is_malformed() {
        let codec = codec();
        let ciphertext = codec.encrypt_raw(&[0xFF, 0xFE, 0x00]).unwrap();

        assert!(matches!(codec.decrypt(&ciphertext), Err(BackplaneError::MalformedPayload { .. })));
    }

    #[test]
    fn test_non_object_json_is_malformed() {
        let codec = codec();
        let ciphertext = codec.encrypt(&json!(["data/auth.db"])).unwrap();

        let err = codec.decrypt(&ciphertext).unwrap_err();
        assert!(matches!(err, BackplaneError::MalformedPayload { .. }));
        assert!(err.to_string().contains("an array"));
    }

    proptest! {
        #[test]
        fn prop_decrypt_inverts_encrypt(
            host in "[a-z][a-z0-9.-]{0,30}",
            port in 1u16..,
            user in "\\PC{0,24}",
            password in "\\PC{0,48}",
        ) {
            let codec = codec();
            let payload = json!({
                "host": host,
                "port": port,
                "database": "analytics",
                "username": user,
                "password": password,
            });

            let ciphertext = codec.encrypt(&payload).unwrap();
            prop_assert_eq!(codec.decrypt(&ciphertext).unwrap(), payload);
        }
    }
}
