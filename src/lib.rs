//! # Sealed Safe
//!
//! End-to-end encrypted password safe.
//!
//! The server stores each account's safe as an AES-256-GCM envelope keyed
//! from the user's password on the client; it never sees the key or the
//! plaintext. Small payloads can additionally be sent to the server over a
//! signed RSA channel.
//!
//! ```text
//!   client                                   server
//!   ──────                                   ──────
//!   password + salt ─PBKDF2─▶ key
//!   Safe ─AES-GCM(key)─▶ envelope ────────▶ SafeService ─▶ SafeStore
//!   text ─OAEP(server pub)+sign(client)───▶ open_and_verify
//! ```
//!
//! ## Modules
//! - `crypto`: key derivation, envelope codec, RSA identities, signed channel
//! - `safe`: plaintext safe model and the client-side session
//! - `store`: account storage backends
//! - `service`: account and safe operations
//! - `error`: error classification shared by every layer
//! - `api`: HTTP endpoints

pub mod api;
pub mod config;
pub mod crypto;
pub mod error;
pub mod safe;
pub mod service;
pub mod store;
pub mod util;

pub use config::Config;
pub use error::ErrorKind;
pub use safe::{CredentialRecord, Safe, SafeSession};
pub use service::{SafeService, ServiceError};
