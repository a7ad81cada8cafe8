//! # Credential Secrets
//!
//! Connection records carry their credentials as ciphertext. This module
//! seals/opens those envelopes and parses the decrypted payload into a typed
//! structure per provider.

pub mod codec;
pub mod credentials;
pub mod encryption;

pub use codec::CredentialCodec;
pub use credentials::{validate_envelope, HttpApiCredentials, NetworkedRelationalCredentials, StorePaths};
pub use encryption::{CredentialCipher, CredentialKeyConfig};
