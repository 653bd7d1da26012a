//! Error types for the crypto core.

use thiserror::Error;

use crate::error::ErrorKind;

/// Why an authentication check rejected its input.
///
/// Only for logs and debugging. Callers at a protocol boundary must report
/// every variant the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// AES-GCM tag mismatch (wrong key, corrupted or tampered envelope).
    AeadTag,
    /// Signature did not verify under the counterpart public key.
    Signature,
    /// OAEP padding check failed after a valid signature.
    Padding,
}

impl std::fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthFailure::AeadTag => write!(f, "aead tag mismatch"),
            AuthFailure::Signature => write!(f, "signature verification failed"),
            AuthFailure::Padding => write!(f, "oaep padding check failed"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Authentication failed ({0})")]
    AuthenticationFailure(AuthFailure),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Decode error: {0}")]
    DecodeError(String),
}

impl CryptoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CryptoError::InvalidInput(_) => ErrorKind::InvalidInput,
            CryptoError::AuthenticationFailure(_) => ErrorKind::AuthenticationFailure,
            CryptoError::PreconditionFailed(_) => ErrorKind::PreconditionFailed,
            CryptoError::DecodeError(_) => ErrorKind::DecodeError,
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        CryptoError::InvalidInput(message.into())
    }
}

impl From<base64::DecodeError> for CryptoError {
    fn from(err: base64::DecodeError) -> Self {
        CryptoError::InvalidInput(format!("invalid base64: {}", err))
    }
}
