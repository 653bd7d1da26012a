//! Asymmetric identity for the secure-data handshake.
//!
//! The server owns one long-lived RSA keypair (2048-bit, SPKI public /
//! PKCS#8 private), persisted as two PEM files and reloaded on restart.
//! Regenerating it would invalidate every registered counterpart, so a
//! half-present pair is a startup error rather than a reason to regenerate.
//!
//! The counterpart side registers exactly one public key at a time through a
//! [`CounterpartKeys`] slot. [`SingleCounterpart`] is last-write-wins; a
//! per-session or per-account registry can be plugged in behind the same trait.

use std::path::Path;
use std::sync::{PoisonError, RwLock};

use anyhow::{bail, Context};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use zeroize::Zeroizing;

use super::error::CryptoError;

/// Modulus size for generated keypairs
pub const KEY_BITS: usize = 2048;

/// Smallest modulus accepted for any key, ours or a counterpart's
pub const MIN_KEY_BITS: usize = 2048;

pub const PUBLIC_KEY_FILE: &str = "public_key.pem";
pub const PRIVATE_KEY_FILE: &str = "private_key.pem";

const PEM_PREFIX: &str = "-----BEGIN";

/// An RSA keypair. Either side of the channel holds one.
#[derive(Clone)]
pub struct IdentityKeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl std::fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityKeyPair")
            .field("bits", &(self.public.size() * 8))
            .field("private", &"<redacted>")
            .finish()
    }
}

impl IdentityKeyPair {
    pub fn generate() -> Result<Self, CryptoError> {
        Self::generate_with_bits(KEY_BITS)
    }

    pub fn generate_with_bits(bits: usize) -> Result<Self, CryptoError> {
        if bits < MIN_KEY_BITS {
            return Err(CryptoError::invalid(format!(
                "key size must be at least {} bits, got {}",
                MIN_KEY_BITS, bits
            )));
        }
        let private = RsaPrivateKey::new(&mut rand::rngs::OsRng, bits)
            .map_err(|e| CryptoError::invalid(format!("key generation failed: {}", e)))?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    /// Rebuild a keypair from its persisted PEM halves.
    pub fn from_pem(public_pem: &str, private_pem: &str) -> Result<Self, CryptoError> {
        let private = RsaPrivateKey::from_pkcs8_pem(private_pem)
            .map_err(|e| CryptoError::invalid(format!("invalid PKCS#8 private key: {}", e)))?;
        let public = RsaPublicKey::from_public_key_pem(public_pem)
            .map_err(|e| CryptoError::invalid(format!("invalid SPKI public key: {}", e)))?;
        if RsaPublicKey::from(&private) != public {
            return Err(CryptoError::invalid("public and private key do not match"));
        }
        Ok(Self { private, public })
    }

    /// PEM encodings of `(public, private)`.
    pub fn to_pem(&self) -> Result<(String, Zeroizing<String>), CryptoError> {
        let public = self
            .public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::invalid(format!("failed to encode public key: {}", e)))?;
        let private = self
            .private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| CryptoError::invalid(format!("failed to encode private key: {}", e)))?;
        Ok((public, private))
    }

    /// Load the keypair from `dir`, generating and persisting one on first run.
    pub async fn load_or_generate(dir: &Path) -> anyhow::Result<Self> {
        let public_path = dir.join(PUBLIC_KEY_FILE);
        let private_path = dir.join(PRIVATE_KEY_FILE);

        let has_public = fs::try_exists(&public_path)
            .await
            .with_context(|| format!("Failed to check {}", public_path.display()))?;
        let has_private = fs::try_exists(&private_path)
            .await
            .with_context(|| format!("Failed to check {}", private_path.display()))?;

        match (has_public, has_private) {
            (true, true) => {
                let public_pem = fs::read_to_string(&public_path)
                    .await
                    .with_context(|| format!("Failed to read {}", public_path.display()))?;
                let private_pem = Zeroizing::new(
                    fs::read_to_string(&private_path)
                        .await
                        .with_context(|| format!("Failed to read {}", private_path.display()))?,
                );
                let keypair = Self::from_pem(&public_pem, &private_pem)
                    .with_context(|| format!("Invalid identity keypair in {}", dir.display()))?;
                let fingerprint = keypair.fingerprint()?;
                tracing::info!(
                    fingerprint = %fingerprint,
                    "Loaded identity keypair from {}",
                    dir.display()
                );
                Ok(keypair)
            }
            (false, false) => {
                let keypair = tokio::task::spawn_blocking(Self::generate)
                    .await
                    .context("Key generation task failed")??;
                keypair.persist(dir).await?;
                let fingerprint = keypair.fingerprint()?;
                tracing::info!(
                    fingerprint = %fingerprint,
                    "Generated new identity keypair in {}",
                    dir.display()
                );
                Ok(keypair)
            }
            _ => bail!(
                "Only one half of the identity keypair exists in {}; refusing to regenerate",
                dir.display()
            ),
        }
    }

    async fn persist(&self, dir: &Path) -> anyhow::Result<()> {
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create key directory {}", dir.display()))?;
        let (public_pem, private_pem) = self.to_pem()?;

        let mut options = fs::OpenOptions::new();
        options.create_new(true).write(true);
        #[cfg(unix)]
        options.mode(0o600);
        let private_path = dir.join(PRIVATE_KEY_FILE);
        let mut file = options
            .open(&private_path)
            .await
            .with_context(|| format!("Failed to create {}", private_path.display()))?;
        file.write_all(private_pem.as_bytes())
            .await
            .with_context(|| format!("Failed to write {}", private_path.display()))?;
        file.flush().await?;

        let public_path = dir.join(PUBLIC_KEY_FILE);
        fs::write(&public_path, public_pem)
            .await
            .with_context(|| format!("Failed to write {}", public_path.display()))?;
        Ok(())
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    pub(crate) fn private_key(&self) -> &RsaPrivateKey {
        &self.private
    }

    /// Base64 SPKI DER, i.e. the PEM body without markers or line breaks.
    pub fn export_public(&self) -> Result<String, CryptoError> {
        encode_public_key(&self.public)
    }

    pub fn fingerprint(&self) -> Result<String, CryptoError> {
        public_key_fingerprint(&self.public)
    }
}

/// Base64 SPKI DER form of a public key.
pub fn encode_public_key(key: &RsaPublicKey) -> Result<String, CryptoError> {
    let der = key
        .to_public_key_der()
        .map_err(|e| CryptoError::invalid(format!("failed to encode public key: {}", e)))?;
    Ok(BASE64.encode(der.as_bytes()))
}

/// Parse a public key given as bare base64 SPKI DER or as a full PEM block.
pub fn decode_public_key(encoded: &str) -> Result<RsaPublicKey, CryptoError> {
    let trimmed = encoded.trim();
    if trimmed.is_empty() {
        return Err(CryptoError::invalid("public key is required"));
    }

    let key = if trimmed.starts_with(PEM_PREFIX) {
        RsaPublicKey::from_public_key_pem(trimmed)
    } else {
        let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
        let der = BASE64.decode(compact)?;
        RsaPublicKey::from_public_key_der(&der)
    }
    .map_err(|e| CryptoError::invalid(format!("invalid SPKI public key: {}", e)))?;

    let bits = key.size() * 8;
    if bits < MIN_KEY_BITS {
        return Err(CryptoError::invalid(format!(
            "public key must be at least {} bits, got {}",
            MIN_KEY_BITS, bits
        )));
    }
    Ok(key)
}

/// Short hex fingerprint (SHA-256 of the SPKI DER, first 16 bytes). Safe to log.
pub fn public_key_fingerprint(key: &RsaPublicKey) -> Result<String, CryptoError> {
    let der = key
        .to_public_key_der()
        .map_err(|e| CryptoError::invalid(format!("failed to encode public key: {}", e)))?;
    let digest = Sha256::digest(der.as_bytes());
    Ok(hex::encode(&digest[..16]))
}

/// Storage for the counterpart public key(s) used to verify secure payloads.
pub trait CounterpartKeys: Send + Sync {
    /// Replace the active counterpart key.
    fn register(&self, key: RsaPublicKey);

    /// The key secure payloads must be signed with, if any is registered.
    fn current(&self) -> Option<RsaPublicKey>;
}

/// One process-wide counterpart slot, last write wins.
#[derive(Debug, Default)]
pub struct SingleCounterpart {
    slot: RwLock<Option<RsaPublicKey>>,
}

impl CounterpartKeys for SingleCounterpart {
    fn register(&self, key: RsaPublicKey) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(key);
    }

    fn current(&self) -> Option<RsaPublicKey> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// The receiving side's identity: its keypair plus the registered counterpart.
///
/// Owned by the service for its whole lifetime and passed explicitly into
/// channel operations.
#[derive(Debug)]
pub struct ServerIdentity<C = SingleCounterpart> {
    keypair: IdentityKeyPair,
    counterparts: C,
}

impl ServerIdentity<SingleCounterpart> {
    pub fn new(keypair: IdentityKeyPair) -> Self {
        Self::with_counterparts(keypair, SingleCounterpart::default())
    }
}

impl<C: CounterpartKeys> ServerIdentity<C> {
    pub fn with_counterparts(keypair: IdentityKeyPair, counterparts: C) -> Self {
        Self {
            keypair,
            counterparts,
        }
    }

    pub fn keypair(&self) -> &IdentityKeyPair {
        &self.keypair
    }

    pub fn export_public(&self) -> Result<String, CryptoError> {
        self.keypair.export_public()
    }

    /// Register the counterpart key. A malformed key leaves the slot untouched.
    ///
    /// Returns the fingerprint of the registered key.
    pub fn register_counterpart(&self, encoded: &str) -> Result<String, CryptoError> {
        let key = decode_public_key(encoded)?;
        let fingerprint = public_key_fingerprint(&key)?;
        self.counterparts.register(key);
        tracing::info!(fingerprint = %fingerprint, "Registered counterpart public key");
        Ok(fingerprint)
    }

    pub fn counterpart(&self) -> Option<RsaPublicKey> {
        self.counterparts.current()
    }
}
