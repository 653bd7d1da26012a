//! Plaintext safe model and the client-side session that seals it.
//!
//! A [`Safe`] only ever exists in clear inside a [`SafeSession`]; what leaves
//! the client is the [`SafeEnvelope`] produced by [`SafeSession::seal`].

use std::collections::btree_map::{self, BTreeMap};

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::crypto::codec::{self, EncodedEnvelope, SafeEnvelope};
use crate::crypto::kdf::{self, Salt, SymmetricKey};
use crate::crypto::CryptoError;
use crate::service::NewAccount;

/// Identifier of one record, unique within a safe.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Time-ordered id (UUIDv7).
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One stored credential.
///
/// Older clients wrote `website` and `password`; both are accepted on read.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialRecord {
    #[serde(alias = "website")]
    pub site: String,
    pub username: String,
    #[serde(alias = "password")]
    pub secret: String,
    pub note: String,
}

impl CredentialRecord {
    pub fn new(
        site: impl Into<String>,
        username: impl Into<String>,
        secret: impl Into<String>,
        note: impl Into<String>,
    ) -> Self {
        Self {
            site: site.into(),
            username: username.into(),
            secret: secret.into(),
            note: note.into(),
        }
    }
}

impl std::fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("site", &self.site)
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .field("note", &self.note)
            .finish()
    }
}

/// Accepted plaintext shapes. The very first clients sealed `[]` at registration.
#[derive(Deserialize)]
#[serde(untagged)]
enum SafeRepr {
    Records(BTreeMap<RecordId, CredentialRecord>),
    Legacy(Vec<serde::de::IgnoredAny>),
}

/// The decrypted safe: record id → credential.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Safe {
    records: BTreeMap<RecordId, CredentialRecord>,
}

impl Safe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record under a freshly generated id.
    pub fn insert(&mut self, record: CredentialRecord) -> RecordId {
        loop {
            let id = RecordId::generate();
            if let btree_map::Entry::Vacant(slot) = self.records.entry(id.clone()) {
                slot.insert(record);
                return id;
            }
        }
    }

    /// Insert or overwrite the record at `id`, returning the previous one.
    pub fn insert_with_id(
        &mut self,
        id: RecordId,
        record: CredentialRecord,
    ) -> Option<CredentialRecord> {
        self.records.insert(id, record)
    }

    /// Replace an existing record. Returns `None` (and changes nothing) if absent.
    pub fn update(&mut self, id: &RecordId, record: CredentialRecord) -> Option<CredentialRecord> {
        self.records
            .get_mut(id)
            .map(|existing| std::mem::replace(existing, record))
    }

    pub fn remove(&mut self, id: &RecordId) -> Option<CredentialRecord> {
        self.records.remove(id)
    }

    pub fn get(&self, id: &RecordId) -> Option<&CredentialRecord> {
        self.records.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RecordId, &CredentialRecord)> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn to_json(&self) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        serde_json::to_vec(&self.records)
            .map(Zeroizing::new)
            .map_err(|e| CryptoError::invalid(format!("failed to serialize safe: {}", e)))
    }

    /// Parse decrypted safe JSON. Empty input and `[]` are an empty safe.
    pub fn from_json(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        // serde's message may quote plaintext; report the position only.
        match serde_json::from_slice::<SafeRepr>(bytes) {
            Ok(SafeRepr::Records(records)) => Ok(Self { records }),
            Ok(SafeRepr::Legacy(items)) if items.is_empty() => Ok(Self::default()),
            Ok(SafeRepr::Legacy(_)) => Err(CryptoError::DecodeError(
                "safe is a non-empty array, expected an object".to_string(),
            )),
            Err(e) => Err(CryptoError::DecodeError(format!(
                "safe has an unexpected shape (line {}, column {})",
                e.line(),
                e.column()
            ))),
        }
    }
}

/// Client-side unlocked state for one account. Holds the derived key only.
#[derive(Debug)]
pub struct SafeSession {
    account_id: String,
    key: SymmetricKey,
}

impl SafeSession {
    /// Derive the key for `account_id` from its password and stored salt.
    pub fn unlock(
        account_id: impl Into<String>,
        password: &str,
        salt: &Salt,
    ) -> Result<Self, CryptoError> {
        Ok(Self {
            account_id: account_id.into(),
            key: kdf::derive_key(password, salt)?,
        })
    }

    /// Create the material for a new account: fresh salt, password verifier and
    /// a sealed empty safe.
    pub fn register(
        account_id: impl Into<String>,
        password: &str,
    ) -> Result<(Self, NewAccount), CryptoError> {
        let account_id = account_id.into();
        let salt = Salt::generate();
        let session = Self::unlock(account_id.clone(), password, &salt)?;
        let envelope = session.seal(&Safe::new())?;
        let request = NewAccount {
            account_id,
            password_verifier: kdf::password_verifier(password)?,
            salt_base64: salt.to_base64(),
            safe_envelope: Some(envelope.encode()),
        };
        Ok((session, request))
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn seal(&self, safe: &Safe) -> Result<SafeEnvelope, CryptoError> {
        let plaintext = safe.to_json()?;
        codec::encrypt(&self.key, &plaintext)
    }

    pub fn open(&self, envelope: &SafeEnvelope) -> Result<Safe, CryptoError> {
        let plaintext = Zeroizing::new(codec::decrypt(&self.key, envelope)?);
        Safe::from_json(&plaintext)
    }

    /// Open the wire form as served on read; the empty placeholder is an empty safe.
    pub fn open_encoded(&self, encoded: &EncodedEnvelope) -> Result<Safe, CryptoError> {
        if encoded.is_empty() {
            return Ok(Safe::new());
        }
        self.open(&SafeEnvelope::decode(encoded)?)
    }
}
