//! Password-based key derivation.
//!
//! PBKDF2-HMAC-SHA256, 100 000 rounds, 16-byte salt, 32-byte output. The
//! parameters are fixed: the key is never stored, so every session must be
//! able to re-derive the exact same bytes from `(password, salt)`.
//!
//! A salt is generated once per account from the OS RNG and never reused for
//! another account. Nothing here enforces uniqueness; account creation does.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::error::CryptoError;
use crate::util::constant_time_eq;

/// Key length in bytes (256 bits for AES-256)
pub const KEY_LENGTH: usize = 32;

/// Salt length in bytes
pub const SALT_LENGTH: usize = 16;

/// PBKDF2 iteration count
pub const PBKDF2_ROUNDS: u32 = 100_000;

const VERIFIER_SCHEME: &str = "pbkdf2";

/// Per-account key-derivation salt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Salt([u8; SALT_LENGTH]);

impl Salt {
    /// Fresh random salt. Call once, at account creation.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SALT_LENGTH];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; SALT_LENGTH] = bytes.try_into().map_err(|_| {
            CryptoError::invalid(format!(
                "salt must be {} bytes, got {}",
                SALT_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = BASE64.decode(encoded.trim())?;
        Self::from_bytes(&bytes)
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; SALT_LENGTH] {
        &self.0
    }
}

/// 256-bit AES key derived from a password. Zeroized on drop, never logged.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_LENGTH]);

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.0
    }
}

impl PartialEq for SymmetricKey {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq(&self.0, &other.0)
    }
}

impl Eq for SymmetricKey {}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey(<redacted>)")
    }
}

/// Derive the safe encryption key from a password and the account salt.
///
/// Any password is accepted, including the empty one; only the salt can be
/// malformed.
pub fn derive_key(password: &str, salt: &Salt) -> Result<SymmetricKey, CryptoError> {
    let mut key = [0u8; KEY_LENGTH];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt.as_bytes(), PBKDF2_ROUNDS, &mut key);
    Ok(SymmetricKey(key))
}

/// Same as [`derive_key`], taking the salt in its base64 wire form.
pub fn derive_key_from_base64(password: &str, salt_b64: &str) -> Result<SymmetricKey, CryptoError> {
    derive_key(password, &Salt::from_base64(salt_b64)?)
}

/// Build an opaque password verifier (`pbkdf2:rounds:hex_salt:hex_hash`).
///
/// Uses its own random salt, never the account's safe salt, so the stored
/// verifier is unrelated to the encryption key.
pub fn password_verifier(password: &str) -> Result<String, CryptoError> {
    let salt = Salt::generate();
    let hash = derive_key(password, &salt)?;
    Ok(format!(
        "{}:{}:{}:{}",
        VERIFIER_SCHEME,
        PBKDF2_ROUNDS,
        hex::encode(salt.as_bytes()),
        hex::encode(hash.as_bytes())
    ))
}

/// Check a password against a verifier produced by [`password_verifier`].
pub fn verify_password(password: &str, verifier: &str) -> Result<bool, CryptoError> {
    let parts: Vec<&str> = verifier.split(':').collect();
    let [scheme, rounds, salt_hex, hash_hex] = parts.as_slice() else {
        return Err(CryptoError::invalid("malformed password verifier"));
    };
    if *scheme != VERIFIER_SCHEME {
        return Err(CryptoError::invalid(format!(
            "unsupported verifier scheme: {}",
            scheme
        )));
    }
    let rounds: u32 = rounds
        .parse()
        .map_err(|_| CryptoError::invalid("invalid verifier round count"))?;
    if rounds != PBKDF2_ROUNDS {
        return Err(CryptoError::invalid(format!(
            "unsupported verifier round count: {}",
            rounds
        )));
    }
    let salt = hex::decode(salt_hex).map_err(|e| CryptoError::invalid(e.to_string()))?;
    let expected = hex::decode(hash_hex).map_err(|e| CryptoError::invalid(e.to_string()))?;
    if expected.len() != KEY_LENGTH {
        return Err(CryptoError::invalid("invalid verifier hash length"));
    }

    let mut actual = vec![0u8; expected.len()];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, rounds, &mut actual);
    let matches = constant_time_eq(&actual, &expected);
    actual.zeroize();
    Ok(matches)
}
