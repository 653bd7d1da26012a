//! Authenticated encryption of the serialized safe.
//!
//! AES-256-GCM with a fresh random 96-bit nonce per call. The envelope is the
//! `(ciphertext, nonce)` pair; the GCM tag is carried at the end of the
//! ciphertext. Both fields are always produced and replaced together.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::error::{AuthFailure, CryptoError};
use super::kdf::SymmetricKey;

/// Nonce length in bytes (96 bits for AES-GCM)
pub const NONCE_LENGTH: usize = 12;

/// GCM authentication tag length in bytes
pub const TAG_LENGTH: usize = 16;

/// One encrypted version of a safe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeEnvelope {
    ciphertext: Vec<u8>,
    nonce: [u8; NONCE_LENGTH],
}

/// Base64 wire/storage form of a [`SafeEnvelope`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedEnvelope {
    pub ciphertext: String,
    pub nonce: String,
}

impl EncodedEnvelope {
    /// The placeholder served for accounts with no safe yet.
    pub fn is_empty(&self) -> bool {
        self.ciphertext.is_empty() && self.nonce.is_empty()
    }
}

impl SafeEnvelope {
    pub fn new(ciphertext: Vec<u8>, nonce: [u8; NONCE_LENGTH]) -> Self {
        Self { ciphertext, nonce }
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn nonce(&self) -> &[u8; NONCE_LENGTH] {
        &self.nonce
    }

    pub fn encode(&self) -> EncodedEnvelope {
        EncodedEnvelope {
            ciphertext: BASE64.encode(&self.ciphertext),
            nonce: BASE64.encode(self.nonce),
        }
    }

    /// Parse and shape-check the wire form. Does not touch the tag.
    pub fn decode(encoded: &EncodedEnvelope) -> Result<Self, CryptoError> {
        if encoded.ciphertext.is_empty() || encoded.nonce.is_empty() {
            return Err(CryptoError::invalid("envelope requires ciphertext and nonce"));
        }
        let ciphertext = BASE64.decode(encoded.ciphertext.trim())?;
        let nonce_bytes = BASE64.decode(encoded.nonce.trim())?;
        let nonce: [u8; NONCE_LENGTH] = nonce_bytes.as_slice().try_into().map_err(|_| {
            CryptoError::invalid(format!(
                "nonce must be {} bytes, got {}",
                NONCE_LENGTH,
                nonce_bytes.len()
            ))
        })?;
        if ciphertext.len() < TAG_LENGTH {
            return Err(CryptoError::invalid("ciphertext shorter than the GCM tag"));
        }
        Ok(Self { ciphertext, nonce })
    }
}

/// Encrypt `plaintext` under `key` with a fresh nonce.
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<SafeEnvelope, CryptoError> {
    let mut nonce_bytes = [0u8; NONCE_LENGTH];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::invalid(format!("failed to create cipher: {}", e)))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|_| CryptoError::invalid("plaintext too large to encrypt"))?;

    Ok(SafeEnvelope {
        ciphertext,
        nonce: nonce_bytes,
    })
}

/// Decrypt an envelope. Any tag mismatch is a hard failure.
pub fn decrypt(key: &SymmetricKey, envelope: &SafeEnvelope) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::invalid(format!("failed to create cipher: {}", e)))?;
    cipher
        .decrypt(Nonce::from_slice(&envelope.nonce), envelope.ciphertext.as_slice())
        .map_err(|_| CryptoError::AuthenticationFailure(AuthFailure::AeadTag))
}
