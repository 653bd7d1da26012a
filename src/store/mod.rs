//! Account storage with pluggable backends.
//!
//! Supports:
//! - `memory`: In-memory storage (non-persistent, for testing)
//! - `file`: JSON snapshot on disk, replaced atomically on every write
//!
//! The store only ever sees ciphertext, the salt and the password verifier.

mod file;
mod memory;

pub use file::FileSafeStore;
pub use memory::InMemorySafeStore;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::EncodedEnvelope;
use crate::util::now_string;

/// Name of the snapshot file inside the data directory.
pub const ACCOUNTS_FILE: &str = "accounts.json";

/// A registered account as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub account_id: String,
    pub password_verifier: String,
    /// Base64 KDF salt, handed back to the client on read.
    pub salt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safe_envelope: Option<EncodedEnvelope>,
    /// Bumped on every envelope write.
    #[serde(default)]
    pub version: u64,
    pub created_at: String,
    pub updated_at: String,
}

impl Account {
    pub fn new(
        account_id: impl Into<String>,
        password_verifier: impl Into<String>,
        salt: impl Into<String>,
        safe_envelope: Option<EncodedEnvelope>,
    ) -> Self {
        let now = now_string();
        Self {
            account_id: account_id.into(),
            password_verifier: password_verifier.into(),
            salt: salt.into(),
            safe_envelope,
            version: 0,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Account already exists: {0}")]
    AlreadyExists(String),

    #[error("Account not found: {0}")]
    NotFound(String),

    #[error("Version conflict: expected {expected}, found {actual}")]
    Conflict { expected: u64, actual: u64 },

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Account store trait - implemented by all storage backends.
#[async_trait]
pub trait SafeStore: Send + Sync {
    /// Whether this store persists data across restarts.
    fn is_persistent(&self) -> bool;

    /// Get a single account by id.
    async fn read_account(&self, account_id: &str) -> Result<Option<Account>, StoreError>;

    async fn account_exists(&self, account_id: &str) -> Result<bool, StoreError> {
        Ok(self.read_account(account_id).await?.is_some())
    }

    /// Insert a new account. Fails with `AlreadyExists` without touching the
    /// stored one.
    async fn create_account(&self, account: Account) -> Result<(), StoreError>;

    /// Replace the safe envelope of an existing account and bump its version.
    ///
    /// With `expected_version` set, the write only happens if the stored
    /// version still matches.
    async fn write_envelope(
        &self,
        account_id: &str,
        envelope: EncodedEnvelope,
        expected_version: Option<u64>,
    ) -> Result<Account, StoreError>;
}

/// Shared write rule for all backends.
fn apply_envelope(
    account: &mut Account,
    envelope: EncodedEnvelope,
    expected_version: Option<u64>,
) -> Result<(), StoreError> {
    if let Some(expected) = expected_version {
        if account.version != expected {
            return Err(StoreError::Conflict {
                expected,
                actual: account.version,
            });
        }
    }
    account.safe_envelope = Some(envelope);
    account.version += 1;
    account.updated_at = now_string();
    Ok(())
}

/// Store backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SafeStoreType {
    Memory,
    #[default]
    File,
}

impl SafeStoreType {
    /// Parse from environment variable value.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Some(Self::Memory),
            "file" | "json" => Some(Self::File),
            _ => None,
        }
    }
}

/// Create an account store based on type and data directory.
pub async fn create_safe_store(
    store_type: SafeStoreType,
    data_dir: PathBuf,
) -> Result<Arc<dyn SafeStore>, StoreError> {
    match store_type {
        SafeStoreType::Memory => Ok(Arc::new(InMemorySafeStore::new())),
        SafeStoreType::File => {
            let store = FileSafeStore::open(data_dir.join(ACCOUNTS_FILE)).await?;
            Ok(Arc::new(store))
        }
    }
}
