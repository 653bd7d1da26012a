//! Error classification shared by every layer.

/// Coarse error category, stable across the concrete error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed encoding, wrong lengths or missing fields.
    InvalidInput,
    /// Signature or AEAD tag did not verify.
    AuthenticationFailure,
    /// Required state is missing: no counterpart key, unknown account.
    PreconditionFailed,
    /// Decrypted content does not have the expected shape.
    DecodeError,
    /// Account id already taken.
    Duplicate,
    /// Stale `expectedVersion` on a safe write.
    Conflict,
    /// Store I/O failure or corrupt store.
    StorageUnavailable,
}

impl ErrorKind {
    /// Whether retrying the same request later can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorKind::StorageUnavailable)
    }
}
