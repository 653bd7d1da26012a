//! JSON file-based account store.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use super::{apply_envelope, Account, SafeStore, StoreError};
use crate::crypto::EncodedEnvelope;

#[derive(Debug, Serialize, Deserialize, Default)]
struct AccountSnapshot {
    #[serde(default)]
    accounts: BTreeMap<String, Account>,
}

/// Every mutation is applied to a copy, written to `<file>.tmp`, renamed over
/// the snapshot and only then made visible. A failed write leaves both the
/// file and the in-memory view unchanged.
#[derive(Clone)]
pub struct FileSafeStore {
    path: PathBuf,
    accounts: Arc<RwLock<BTreeMap<String, Account>>>,
}

impl FileSafeStore {
    /// Load the snapshot at `path`, starting empty if it does not exist.
    ///
    /// An unreadable or unparsable snapshot is an error; it is never replaced
    /// with an empty store.
    pub async fn open(path: PathBuf) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                StoreError::Unavailable(format!(
                    "failed to create store dir {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let snapshot = match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<AccountSnapshot>(&bytes).map_err(|e| {
                tracing::error!("Failed to parse account store {}: {}", path.display(), e);
                StoreError::Unavailable(format!(
                    "account store {} is corrupt: {}",
                    path.display(),
                    e
                ))
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => AccountSnapshot::default(),
            Err(err) => {
                return Err(StoreError::Unavailable(format!(
                    "failed to read account store {}: {}",
                    path.display(),
                    err
                )))
            }
        };

        tracing::info!(
            path = %path.display(),
            accounts = snapshot.accounts.len(),
            "Loaded account store"
        );

        Ok(Self {
            path,
            accounts: Arc::new(RwLock::new(snapshot.accounts)),
        })
    }

    async fn persist(&self, accounts: &BTreeMap<String, Account>) -> Result<(), StoreError> {
        let snapshot = AccountSnapshot {
            accounts: accounts.clone(),
        };
        let data = serde_json::to_vec_pretty(&snapshot).map_err(|e| {
            StoreError::Unavailable(format!("failed to serialize account store: {}", e))
        })?;
        let tmp_path = self.path.with_extension("json.tmp");
        let write_err = |e: std::io::Error| {
            StoreError::Unavailable(format!("failed to write account store: {}", e))
        };
        let mut file = fs::File::create(&tmp_path).await.map_err(write_err)?;
        file.write_all(&data).await.map_err(write_err)?;
        file.sync_all().await.map_err(write_err)?;
        drop(file);
        fs::rename(&tmp_path, &self.path).await.map_err(|e| {
            StoreError::Unavailable(format!("failed to finalize account store: {}", e))
        })?;
        Ok(())
    }
}

#[async_trait]
impl SafeStore for FileSafeStore {
    fn is_persistent(&self) -> bool {
        true
    }

    async fn read_account(&self, account_id: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.read().await.get(account_id).cloned())
    }

    async fn create_account(&self, account: Account) -> Result<(), StoreError> {
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&account.account_id) {
            return Err(StoreError::AlreadyExists(account.account_id));
        }
        let mut next = accounts.clone();
        next.insert(account.account_id.clone(), account);
        self.persist(&next).await?;
        *accounts = next;
        Ok(())
    }

    async fn write_envelope(
        &self,
        account_id: &str,
        envelope: EncodedEnvelope,
        expected_version: Option<u64>,
    ) -> Result<Account, StoreError> {
        let mut accounts = self.accounts.write().await;
        let mut updated = accounts
            .get(account_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(account_id.to_string()))?;
        apply_envelope(&mut updated, envelope, expected_version)?;

        let mut next = accounts.clone();
        next.insert(account_id.to_string(), updated.clone());
        self.persist(&next).await?;
        *accounts = next;
        Ok(updated)
    }
}
