//! Account and safe operations on top of a [`SafeStore`].
//!
//! The service validates shapes (base64, salt and nonce lengths) and enforces
//! account rules. It never holds a key and never decrypts a safe.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::{CryptoError, EncodedEnvelope, Salt, SafeEnvelope};
pub use crate::error::ErrorKind;
use crate::store::{Account, SafeStore, StoreError};

/// Registration input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub password_verifier: String,
    #[serde(default)]
    pub salt_base64: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safe_envelope: Option<EncodedEnvelope>,
}

/// What a client needs to unlock and open its safe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeSnapshot {
    pub account_id: String,
    pub salt_base64: String,
    /// Empty strings when no safe has been stored yet.
    pub safe_envelope: EncodedEnvelope,
    pub version: u64,
}

/// Safe write input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeUpdate {
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub ciphertext: String,
    #[serde(default)]
    pub nonce: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<u64>,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Account already exists: {0}")]
    DuplicateAccount(String),

    #[error("Version conflict: expected {expected}, found {actual}")]
    Conflict { expected: u64, actual: u64 },

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Crypto(err) => err.kind(),
            ServiceError::AccountNotFound(_) => ErrorKind::PreconditionFailed,
            ServiceError::DuplicateAccount(_) => ErrorKind::Duplicate,
            ServiceError::Conflict { .. } => ErrorKind::Conflict,
            ServiceError::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_transient()
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AlreadyExists(id) => ServiceError::DuplicateAccount(id),
            StoreError::NotFound(id) => ServiceError::AccountNotFound(id),
            StoreError::Conflict { expected, actual } => ServiceError::Conflict { expected, actual },
            StoreError::Unavailable(msg) => ServiceError::StorageUnavailable(msg),
        }
    }
}

fn invalid(message: &str) -> ServiceError {
    ServiceError::Crypto(CryptoError::InvalidInput(message.to_string()))
}

/// Validate an envelope's wire shape and return its canonical encoding.
fn canonical_envelope(encoded: &EncodedEnvelope) -> Result<EncodedEnvelope, ServiceError> {
    Ok(SafeEnvelope::decode(encoded)?.encode())
}

#[derive(Clone)]
pub struct SafeService {
    store: Arc<dyn SafeStore>,
}

impl SafeService {
    pub fn new(store: Arc<dyn SafeStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn SafeStore> {
        &self.store
    }

    /// Register an account. The verifier is stored as given; the salt and the
    /// optional initial envelope must be well-formed.
    pub async fn create_account(&self, request: NewAccount) -> Result<(), ServiceError> {
        let account_id = request.account_id.trim();
        if account_id.is_empty() {
            return Err(invalid("accountId is required"));
        }
        if request.password_verifier.trim().is_empty() {
            return Err(invalid("passwordVerifier is required"));
        }
        if request.salt_base64.trim().is_empty() {
            return Err(invalid("saltBase64 is required"));
        }
        let salt = Salt::from_base64(request.salt_base64.trim())?;
        let envelope = match request.safe_envelope.as_ref().filter(|e| !e.is_empty()) {
            Some(encoded) => Some(canonical_envelope(encoded)?),
            None => None,
        };

        let account = Account::new(
            account_id,
            request.password_verifier,
            salt.to_base64(),
            envelope,
        );
        self.store.create_account(account).await?;
        tracing::info!(account_id = %account_id, "Registered account");
        Ok(())
    }

    pub async fn read_safe(&self, account_id: &str) -> Result<SafeSnapshot, ServiceError> {
        let account_id = account_id.trim();
        if account_id.is_empty() {
            return Err(invalid("accountId is required"));
        }
        let account = self
            .store
            .read_account(account_id)
            .await?
            .ok_or_else(|| ServiceError::AccountNotFound(account_id.to_string()))?;
        Ok(SafeSnapshot {
            account_id: account.account_id,
            salt_base64: account.salt,
            safe_envelope: account.safe_envelope.unwrap_or_default(),
            version: account.version,
        })
    }

    /// Replace the stored envelope. Returns the new version.
    pub async fn write_safe(&self, update: SafeUpdate) -> Result<u64, ServiceError> {
        let account_id = update.account_id.trim();
        if account_id.is_empty() {
            return Err(invalid("accountId is required"));
        }
        if update.ciphertext.trim().is_empty() || update.nonce.trim().is_empty() {
            return Err(invalid("ciphertext and nonce are required"));
        }
        let envelope = canonical_envelope(&EncodedEnvelope {
            ciphertext: update.ciphertext,
            nonce: update.nonce,
        })?;

        let account = self
            .store
            .write_envelope(account_id, envelope, update.expected_version)
            .await?;
        tracing::info!(
            account_id = %account_id,
            version = account.version,
            "Stored safe"
        );
        Ok(account.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::AuthFailure;
    use crate::safe::{CredentialRecord, RecordId, Safe, SafeSession};
    use crate::store::InMemorySafeStore;

    fn service() -> SafeService {
        SafeService::new(Arc::new(InMemorySafeStore::new()))
    }

    fn update_from(
        account_id: &str,
        envelope: &SafeEnvelope,
        expected_version: Option<u64>,
    ) -> SafeUpdate {
        let encoded = envelope.encode();
        SafeUpdate {
            account_id: account_id.to_string(),
            ciphertext: encoded.ciphertext,
            nonce: encoded.nonce,
            expected_version,
        }
    }

    #[tokio::test]
    async fn register_read_write_cycle() {
        let service = service();
        let (_, request) = SafeSession::register("alice@example.com", "pw1").unwrap();
        service.create_account(request).await.unwrap();

        let snapshot = service.read_safe("alice@example.com").await.unwrap();
        assert_eq!(snapshot.version, 0);
        let salt = Salt::from_base64(&snapshot.salt_base64).unwrap();
        let session = SafeSession::unlock("alice@example.com", "pw1", &salt).unwrap();
        assert!(session
            .open_encoded(&snapshot.safe_envelope)
            .unwrap()
            .is_empty());

        let mut safe = Safe::new();
        safe.insert_with_id(
            RecordId::from("1"),
            CredentialRecord::new("example.com", "alice", "s3cr3t", ""),
        );
        let envelope = session.seal(&safe).unwrap();
        let version = service
            .write_safe(update_from("alice@example.com", &envelope, Some(0)))
            .await
            .unwrap();
        assert_eq!(version, 1);

        let snapshot = service.read_safe("alice@example.com").await.unwrap();
        assert_eq!(snapshot.version, 1);
        assert_eq!(session.open_encoded(&snapshot.safe_envelope).unwrap(), safe);

        let wrong = SafeSession::unlock("alice@example.com", "wrongpw", &salt).unwrap();
        assert!(matches!(
            wrong.open_encoded(&snapshot.safe_envelope),
            Err(CryptoError::AuthenticationFailure(AuthFailure::AeadTag))
        ));
    }

    #[tokio::test]
    async fn account_without_envelope_reads_empty_placeholder() {
        let service = service();
        let (_, mut request) = SafeSession::register("bob@example.com", "pw").unwrap();
        request.safe_envelope = None;
        service.create_account(request).await.unwrap();

        let snapshot = service.read_safe("bob@example.com").await.unwrap();
        assert!(snapshot.safe_envelope.is_empty());
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["safeEnvelope"]["ciphertext"], "");
        assert_eq!(json["safeEnvelope"]["nonce"], "");
    }

    #[tokio::test]
    async fn duplicate_registration_keeps_first_account() {
        let service = service();
        let (_, first) = SafeSession::register("alice@example.com", "pw1").unwrap();
        let first_salt = first.salt_base64.clone();
        service.create_account(first).await.unwrap();

        let (_, second) = SafeSession::register("alice@example.com", "other").unwrap();
        let err = service.create_account(second).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Duplicate);

        let snapshot = service.read_safe("alice@example.com").await.unwrap();
        assert_eq!(snapshot.salt_base64, first_salt);
    }

    #[tokio::test]
    async fn rejects_malformed_registration() {
        let service = service();
        let (_, valid) = SafeSession::register("carol@example.com", "pw").unwrap();

        let missing_id = NewAccount {
            account_id: "  ".to_string(),
            ..valid.clone()
        };
        let short_salt = NewAccount {
            salt_base64: "AAAA".to_string(),
            ..valid.clone()
        };
        let bad_envelope = NewAccount {
            safe_envelope: Some(EncodedEnvelope {
                ciphertext: "AAAA".to_string(),
                nonce: String::new(),
            }),
            ..valid.clone()
        };
        let no_verifier = NewAccount {
            password_verifier: String::new(),
            ..valid
        };

        for request in [missing_id, short_salt, bad_envelope, no_verifier] {
            let err = service.create_account(request).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput);
        }
        assert!(!service
            .store()
            .account_exists("carol@example.com")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn unknown_account_is_not_found() {
        let service = service();
        let err = service.read_safe("nobody@example.com").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);

        let (session, _) = SafeSession::register("nobody@example.com", "pw").unwrap();
        let envelope = session.seal(&Safe::new()).unwrap();
        let err = service
            .write_safe(update_from("nobody@example.com", &envelope, None))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
    }

    #[tokio::test]
    async fn stale_expected_version_conflicts() {
        let service = service();
        let (session, request) = SafeSession::register("dave@example.com", "pw").unwrap();
        service.create_account(request).await.unwrap();
        let envelope = session.seal(&Safe::new()).unwrap();

        service
            .write_safe(update_from("dave@example.com", &envelope, Some(0)))
            .await
            .unwrap();
        let err = service
            .write_safe(update_from("dave@example.com", &envelope, Some(0)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Conflict {
                expected: 0,
                actual: 1
            }
        ));
        assert!(!err.is_retryable());

        // Without an expected version the write is last-write-wins.
        let version = service
            .write_safe(update_from("dave@example.com", &envelope, None))
            .await
            .unwrap();
        assert_eq!(version, 2);
    }

    #[tokio::test]
    async fn write_rejects_malformed_envelope() {
        let service = service();
        let (_, request) = SafeSession::register("erin@example.com", "pw").unwrap();
        service.create_account(request).await.unwrap();

        let err = service
            .write_safe(SafeUpdate {
                account_id: "erin@example.com".to_string(),
                ciphertext: "not base64!".to_string(),
                nonce: "AAAAAAAAAAAAAAAA".to_string(),
                expected_version: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(
            service.read_safe("erin@example.com").await.unwrap().version,
            0
        );
    }

    #[test]
    fn only_storage_errors_are_retryable() {
        assert!(ServiceError::from(StoreError::Unavailable("disk".into())).is_retryable());
        assert!(!ServiceError::from(CryptoError::AuthenticationFailure(AuthFailure::AeadTag))
            .is_retryable());
        assert_eq!(
            ServiceError::from(StoreError::NotFound("x".into())).kind(),
            ErrorKind::PreconditionFailed
        );
    }
}
