//! Field-level AES-256-GCM envelope cipher.
//!
//! Free-text snapshot fields are encrypted one at a time before they
//! reach storage, so a bad key or a corrupted column affects exactly
//! one field. Envelopes are self-describing strings:
//!
//! ```text
//! enc:v1:<nonce hex>:<ciphertext hex>
//! ```

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::Rng;

use crate::hashing::{hex_decode, hex_encode};

/// Prefix identifying an encrypted envelope (and its format version).
pub const ENVELOPE_PREFIX: &str = "enc:v1:";

/// AES-256 key length in bytes.
const KEY_LEN: usize = 32;

/// AES-GCM standard nonce length in bytes.
const NONCE_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Encryption key must be {KEY_LEN} bytes of hex")]
    InvalidKey,

    #[error("Malformed envelope")]
    MalformedEnvelope,

    #[error("Decryption failed")]
    DecryptFailed,

    #[error("Encryption failed")]
    EncryptFailed,
}

/// Encrypts and decrypts individual free-text fields.
///
/// Cheap to clone behind an `Arc`; holds only the expanded key schedule.
pub struct FieldCipher {
    cipher: Aes256Gcm,
}

impl FieldCipher {
    /// Build a cipher from a 64-character hex key string.
    pub fn from_hex_key(hex_key: &str) -> Result<Self, CryptoError> {
        let key_bytes = hex_decode(hex_key.trim()).ok_or(CryptoError::InvalidKey)?;
        if key_bytes.len() != KEY_LEN {
            return Err(CryptoError::InvalidKey);
        }
        let cipher = Aes256Gcm::new_from_slice(&key_bytes).map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self { cipher })
    }

    /// Encrypt a single field into an envelope string.
    ///
    /// A fresh random nonce is generated per call, so encrypting the
    /// same plaintext twice yields different envelopes.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let nonce_bytes: [u8; NONCE_LEN] = rand::rng().random();
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::EncryptFailed)?;
        Ok(format!(
            "{ENVELOPE_PREFIX}{}:{}",
            hex_encode(&nonce_bytes),
            hex_encode(&ciphertext)
        ))
    }

    /// Decrypt an envelope string back into the field plaintext.
    pub fn decrypt(&self, envelope: &str) -> Result<String, CryptoError> {
        let rest = envelope
            .strip_prefix(ENVELOPE_PREFIX)
            .ok_or(CryptoError::MalformedEnvelope)?;
        let (nonce_hex, ct_hex) = rest
            .split_once(':')
            .ok_or(CryptoError::MalformedEnvelope)?;

        let nonce_bytes = hex_decode(nonce_hex).ok_or(CryptoError::MalformedEnvelope)?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(CryptoError::MalformedEnvelope);
        }
        let ciphertext = hex_decode(ct_hex).ok_or(CryptoError::MalformedEnvelope)?;

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|_| CryptoError::DecryptFailed)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptFailed)
    }

    /// Decrypt a field, degrading to the empty string on any failure.
    ///
    /// A single corrupted or unreadable field must never poison the
    /// rest of the record; the failure is logged and the field comes
    /// back empty.
    pub fn decrypt_or_default(&self, field: &'static str, envelope: &str) -> String {
        match self.decrypt(envelope) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                tracing::warn!(field, error = %e, "Field decryption failed, degrading to empty");
                String::new()
            }
        }
    }
}
