//! Cryptographic core.
//!
//! - `kdf`: password + salt → AES key (PBKDF2-HMAC-SHA256)
//! - `codec`: AES-256-GCM envelope for the serialized safe
//! - `identity`: RSA keypair persistence and counterpart key registration
//! - `channel`: verify-then-decrypt for signed secure-data payloads
//!
//! Nothing in here logs key material or plaintext.

pub mod channel;
pub mod codec;
mod error;
pub mod identity;
pub mod kdf;

pub use channel::{open_and_verify, seal_and_sign, EncodedPayload, SignedPayload};
pub use codec::{EncodedEnvelope, SafeEnvelope};
pub use error::{AuthFailure, CryptoError};
pub use identity::{CounterpartKeys, IdentityKeyPair, ServerIdentity, SingleCounterpart};
pub use kdf::{derive_key, Salt, SymmetricKey};
