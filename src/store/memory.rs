//! In-memory account store (non-persistent).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{apply_envelope, Account, SafeStore, StoreError};
use crate::crypto::EncodedEnvelope;

#[derive(Clone, Default)]
pub struct InMemorySafeStore {
    accounts: Arc<RwLock<HashMap<String, Account>>>,
}

impl InMemorySafeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SafeStore for InMemorySafeStore {
    fn is_persistent(&self) -> bool {
        false
    }

    async fn read_account(&self, account_id: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.read().await.get(account_id).cloned())
    }

    async fn create_account(&self, account: Account) -> Result<(), StoreError> {
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&account.account_id) {
            return Err(StoreError::AlreadyExists(account.account_id));
        }
        accounts.insert(account.account_id.clone(), account);
        Ok(())
    }

    async fn write_envelope(
        &self,
        account_id: &str,
        envelope: EncodedEnvelope,
        expected_version: Option<u64>,
    ) -> Result<Account, StoreError> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(account_id)
            .ok_or_else(|| StoreError::NotFound(account_id.to_string()))?;
        apply_envelope(account, envelope, expected_version)?;
        Ok(account.clone())
    }
}
